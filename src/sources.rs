//! Source adapters.
//!
//! Each adapter implements [`DataChunkSource`](crate::data_chunk_iterator::DataChunkSource) for one kind of backend reader:
//!  - [`SliceableDataChunkSource`]: an in-memory or memory-mapped [`ndarray`] array,
//!  - [`RecordingDataChunkSource`]: an electrophysiology [`RecordingExtractor`], e.g. a memory-mapped [`BinaryRecording`],
//!  - [`ImagingDataChunkSource`]: an optical [`ImagingExtractor`], and
//!  - [`MovieDataChunkSource`]: a [`VideoCapture`] decoder, e.g. a memory-mapped [`RawVideoReader`].

mod imaging;
mod movie;
mod recording;
mod sliceable;

pub use imaging::{ArrayImagingExtractor, ImagingDataChunkSource, ImagingExtractor};
pub use movie::{
    write_raw_video, MovieDataChunkSource, MovieReadMode, RawVideoReader, UnreadableFramePolicy,
    VideoCapture, VideoCaptureContext,
};
pub use recording::{
    BinaryRecording, BinaryRecordingOptions, RecordingDataChunkSource, RecordingExtractor,
    RecordingSourceOptions,
};
pub use sliceable::SliceableDataChunkSource;
