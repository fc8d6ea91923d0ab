use std::{fs::File, marker::PhantomData, path::Path};

use memmap2::Mmap;
use ndarray::{Array2, Axis};

use crate::{
    data_chunk_iterator::SourceError,
    data_type::{little_endian_to_native, Element},
    selection::Selection,
};

use super::RecordingExtractor;

/// Options for opening a [`BinaryRecording`].
#[derive(Clone, Debug, PartialEq)]
pub struct BinaryRecordingOptions {
    /// The number of interleaved channels.
    pub num_channels: usize,
    /// The sampling frequency in Hz.
    pub sampling_frequency: f64,
    /// The number of header bytes preceding the samples.
    pub file_offset: u64,
    /// Per-channel gains. Defaults to 1.
    pub gains: Option<Vec<f64>>,
    /// Per-channel offsets. Defaults to 0.
    pub offsets: Option<Vec<f64>>,
    /// Channel identifiers. Defaults to the channel indices.
    pub channel_ids: Option<Vec<String>>,
}

impl BinaryRecordingOptions {
    /// Create options for a recording with `num_channels` channels sampled at `sampling_frequency`.
    #[must_use]
    pub fn new(num_channels: usize, sampling_frequency: f64) -> Self {
        Self {
            num_channels,
            sampling_frequency,
            file_offset: 0,
            gains: None,
            offsets: None,
            channel_ids: None,
        }
    }
}

/// A single-segment recording stored as a flat binary file of interleaved samples.
///
/// Sample `c` of frame `f` is at byte `file_offset + (f * num_channels + c) * size_of::<T>()`, in little-endian byte order.
/// The file is memory mapped, so reading traces only touches the requested frames.
#[derive(Debug)]
pub struct BinaryRecording<T> {
    mmap: Mmap,
    options: BinaryRecordingOptions,
    num_frames: u64,
    _sample: PhantomData<T>,
}

impl<T: Element> BinaryRecording<T> {
    /// Open a binary recording.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the file cannot be opened or mapped,
    /// or if the channel metadata in `options` is inconsistent.
    pub fn open<P: AsRef<Path>>(
        path: P,
        options: BinaryRecordingOptions,
    ) -> Result<Self, SourceError> {
        if options.num_channels == 0 {
            return Err(SourceError::Other(
                "a binary recording must have at least one channel".to_string(),
            ));
        }
        for (name, len) in [
            ("gains", options.gains.as_ref().map(Vec::len)),
            ("offsets", options.offsets.as_ref().map(Vec::len)),
            ("channel_ids", options.channel_ids.as_ref().map(Vec::len)),
        ] {
            if let Some(len) = len {
                if len != options.num_channels {
                    return Err(SourceError::Other(format!(
                        "{name} has {len} entries for {} channels",
                        options.num_channels
                    )));
                }
            }
        }

        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        let frame_bytes = (options.num_channels * std::mem::size_of::<T>()) as u64;
        let data_bytes = (mmap.len() as u64).saturating_sub(options.file_offset);
        let num_frames = data_bytes / frame_bytes;
        let trailing = data_bytes % frame_bytes;
        if trailing != 0 {
            log::warn!(
                "{} has {trailing} trailing bytes that do not form a complete frame",
                path.as_ref().display()
            );
        }
        log::debug!(
            "opened binary recording {} with {num_frames} frames of {} channels of {}",
            path.as_ref().display(),
            options.num_channels,
            T::DATA_TYPE
        );
        Ok(Self {
            mmap,
            options,
            num_frames,
            _sample: PhantomData,
        })
    }

    fn read_frames(&self, start_frame: u64, end_frame: u64) -> Result<Array2<T>, SourceError> {
        let num_channels = self.options.num_channels;
        if start_frame > end_frame || end_frame > self.num_frames {
            return Err(SourceError::OutOfBounds {
                selection: Selection::new_with_ranges(&[start_frame..end_frame.max(start_frame)]),
                shape: vec![self.num_frames],
            });
        }
        let num_frames = usize::try_from(end_frame - start_frame)
            .map_err(|err| SourceError::Other(err.to_string()))?;
        let frame_bytes = num_channels * std::mem::size_of::<T>();
        let offset = usize::try_from(self.options.file_offset + start_frame * frame_bytes as u64)
            .map_err(|err| SourceError::Other(err.to_string()))?;

        // Copy rather than cast in place, the mapped bytes need not be aligned for T
        let mut samples = vec![T::default(); num_frames * num_channels];
        let bytes = bytemuck::cast_slice_mut::<T, u8>(&mut samples);
        bytes.copy_from_slice(&self.mmap[offset..offset + num_frames * frame_bytes]);
        little_endian_to_native(bytes, T::DATA_TYPE);
        Array2::from_shape_vec((num_frames, num_channels), samples)
            .map_err(|err| SourceError::Other(err.to_string()))
    }
}

impl<T: Element> RecordingExtractor for BinaryRecording<T> {
    type Sample = T;

    fn channel_ids(&self) -> Vec<String> {
        self.options.channel_ids.clone().unwrap_or_else(|| {
            (0..self.options.num_channels)
                .map(|channel| channel.to_string())
                .collect()
        })
    }

    fn num_channels(&self) -> usize {
        self.options.num_channels
    }

    fn num_frames(&self, _segment_index: usize) -> u64 {
        self.num_frames
    }

    fn sampling_frequency(&self) -> f64 {
        self.options.sampling_frequency
    }

    fn channel_gains(&self) -> Vec<f64> {
        self.options
            .gains
            .clone()
            .unwrap_or_else(|| vec![1.0; self.options.num_channels])
    }

    fn channel_offsets(&self) -> Vec<f64> {
        self.options
            .offsets
            .clone()
            .unwrap_or_else(|| vec![0.0; self.options.num_channels])
    }

    fn get_traces(
        &self,
        channel_indices: &[usize],
        start_frame: u64,
        end_frame: u64,
        segment_index: usize,
    ) -> Result<Array2<T>, SourceError> {
        if segment_index != 0 {
            return Err(SourceError::Other(format!(
                "binary recordings have a single segment, got segment index {segment_index}"
            )));
        }
        if let Some(&channel) = channel_indices
            .iter()
            .find(|&&channel| channel >= self.options.num_channels)
        {
            return Err(SourceError::Other(format!(
                "channel index {channel} is out of range for {} channels",
                self.options.num_channels
            )));
        }
        let frames = self.read_frames(start_frame, end_frame)?;
        Ok(frames
            .select(Axis(1), channel_indices)
            .reversed_axes()
            .as_standard_layout()
            .into_owned())
    }
}
