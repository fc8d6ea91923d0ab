//! Behavioural movies.

mod raw_video;
mod video_capture;

pub use raw_video::{write_raw_video, RawVideoReader};
pub use video_capture::{VideoCapture, VideoCaptureContext};

use ndarray::{ArrayD, Axis, IxDyn};

use crate::{
    data_chunk_iterator::{DataChunkSource, SourceError},
    data_type::{DataType, Element},
    selection::Selection,
    ArrayShape,
};

/// How a [`MovieDataChunkSource`] reads frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MovieReadMode {
    /// Decode frames in order from the capture cursor, seeking only if a request does not start at the cursor.
    ///
    /// Selected when the chunk shape is exactly one frame.
    SequentialCursor,
    /// Seek to the first requested frame on every read.
    ///
    /// Selected for any other chunk shape.
    RandomAccess,
}

/// What a [`MovieDataChunkSource`] does with a frame the decoder cannot read.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub enum UnreadableFramePolicy<P> {
    /// Fail the read.
    #[default]
    Fail,
    /// Substitute a frame filled with this value and log a warning.
    FillWith(P),
}

/// A [`DataChunkSource`] over a [`VideoCaptureContext`].
///
/// The array has shape `(frames, height, width[, channels])`.
/// By default chunks and buffers are one frame, which lets the source stream frames from the decoder cursor without seeking.
#[derive(Debug)]
pub struct MovieDataChunkSource<V: VideoCapture> {
    context: VideoCaptureContext<V>,
    frame_shape: ArrayShape,
    frame_count: u64,
    read_mode: MovieReadMode,
    unreadable_frame_policy: UnreadableFramePolicy<V::Pixel>,
}

impl<V: VideoCapture> MovieDataChunkSource<V> {
    /// Create a new movie source.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn new(context: VideoCaptureContext<V>) -> Result<Self, SourceError> {
        let frame_shape = context.frame_shape()?;
        let frame_count = context.frame_count()?;
        Ok(Self {
            context,
            frame_shape,
            frame_count,
            read_mode: MovieReadMode::SequentialCursor,
            unreadable_frame_policy: UnreadableFramePolicy::Fail,
        })
    }

    /// Set the unreadable frame policy.
    #[must_use]
    pub fn with_unreadable_frame_policy(mut self, policy: UnreadableFramePolicy<V::Pixel>) -> Self {
        self.unreadable_frame_policy = policy;
        self
    }

    /// Return the read mode.
    ///
    /// The mode is chosen when a [`DataChunkIterator`](crate::data_chunk_iterator::DataChunkIterator) is created over the source.
    #[must_use]
    pub fn read_mode(&self) -> MovieReadMode {
        self.read_mode
    }

    /// Return the capture context.
    #[must_use]
    pub fn context(&self) -> &VideoCaptureContext<V> {
        &self.context
    }

    /// Release the capture.
    pub fn release(&mut self) {
        self.context.release();
    }

    fn single_frame_shape(&self) -> ArrayShape {
        let mut shape = vec![1];
        shape.extend_from_slice(&self.frame_shape);
        shape
    }

    fn read_frame(&mut self, frame: u64) -> Result<ArrayD<V::Pixel>, SourceError> {
        let capture = self.context.capture_mut();
        let data = match capture.read_frame() {
            Ok(Some(data)) => data,
            Ok(None) => return Err(SourceError::EndOfStream(frame)),
            Err(err) => {
                let UnreadableFramePolicy::FillWith(fill_value) = self.unreadable_frame_policy
                else {
                    return Err(err);
                };
                log::warn!("substituting frame {frame} filled with {fill_value:?}: {err}");
                capture.seek(frame + 1)?;
                let shape: Vec<usize> = self
                    .frame_shape
                    .iter()
                    .map(|&size| usize::try_from(size).unwrap_or(usize::MAX))
                    .collect();
                ArrayD::from_elem(IxDyn(&shape), fill_value)
            }
        };
        if data.shape().len() != self.frame_shape.len()
            || std::iter::zip(data.shape(), &self.frame_shape).any(|(&a, &b)| a as u64 != b)
        {
            return Err(SourceError::UnreadableFrame {
                frame,
                reason: format!(
                    "decoded shape {:?} does not match the frame shape {:?}",
                    data.shape(),
                    self.frame_shape
                ),
            });
        }
        Ok(data)
    }
}

impl<V: VideoCapture> DataChunkSource for MovieDataChunkSource<V> {
    type Element = V::Pixel;

    fn data_type(&self) -> DataType {
        V::Pixel::DATA_TYPE
    }

    fn maxshape(&self) -> ArrayShape {
        let mut maxshape = vec![self.frame_count];
        maxshape.extend_from_slice(&self.frame_shape);
        maxshape
    }

    fn default_chunk_shape(&self) -> Option<ArrayShape> {
        Some(self.single_frame_shape())
    }

    fn default_buffer_shape(&self, chunk_shape: &[u64]) -> Option<ArrayShape> {
        let single_frame_shape = self.single_frame_shape();
        (chunk_shape == single_frame_shape.as_slice()).then_some(single_frame_shape)
    }

    fn prepare(&mut self, chunk_shape: &[u64], _buffer_shape: &[u64]) -> Result<(), SourceError> {
        self.read_mode = if chunk_shape == self.single_frame_shape().as_slice() {
            MovieReadMode::SequentialCursor
        } else {
            MovieReadMode::RandomAccess
        };
        log::debug!("movie source read mode {:?}", self.read_mode);
        Ok(())
    }

    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<V::Pixel>, SourceError> {
        if !self.context.is_opened() {
            return Err(SourceError::Released);
        }
        let maxshape = self.maxshape();
        if !selection.inbounds(&maxshape) {
            return Err(SourceError::OutOfBounds {
                selection: selection.clone(),
                shape: maxshape,
            });
        }
        let frames = selection.to_ranges()[0].clone();
        let seek = match self.read_mode {
            MovieReadMode::SequentialCursor => self.context.position() != frames.start,
            MovieReadMode::RandomAccess => true,
        };
        if seek {
            log::trace!("seeking to frame {}", frames.start);
            self.context.capture_mut().seek(frames.start)?;
        }

        // Crop each frame as it is decoded so only the requested region is retained
        let mut within_frame = selection.to_ranges();
        within_frame.remove(0);
        let within_frame = Selection::new_with_ranges(&within_frame);
        let mut cropped = Vec::with_capacity(selection.shape_usize()[0]);
        for frame in frames {
            let data = self.read_frame(frame)?;
            cropped.push(within_frame.extract_ndarray(&data.view())?);
        }
        let views: Vec<_> = cropped.iter().map(ArrayD::view).collect();
        ndarray::stack(Axis(0), &views).map_err(|err| SourceError::Other(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;
    use crate::data_chunk_iterator::{
        BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions,
    };

    /// An in-memory capture that fails on some frames and counts seeks.
    #[derive(Debug)]
    struct TestCapture {
        frames: ArrayD<u8>,
        position: u64,
        seeks: usize,
        unreadable: Vec<u64>,
        opened: bool,
    }

    impl TestCapture {
        fn new(num_frames: usize, unreadable: Vec<u64>) -> Self {
            let frames = Array::from_shape_fn(vec![num_frames, 2, 3], |index| {
                (index[0] * 10 + index[1] * 3 + index[2]) as u8
            });
            Self {
                frames,
                position: 0,
                seeks: 0,
                unreadable,
                opened: true,
            }
        }
    }

    impl VideoCapture for TestCapture {
        type Pixel = u8;

        fn frame_count(&self) -> u64 {
            self.frames.shape()[0] as u64
        }

        fn frame_shape(&self) -> ArrayShape {
            vec![2, 3]
        }

        fn fps(&self) -> f64 {
            10.0
        }

        fn position(&self) -> u64 {
            self.position
        }

        fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
            self.seeks += 1;
            self.position = frame;
            Ok(())
        }

        fn read_frame(&mut self) -> Result<Option<ArrayD<u8>>, SourceError> {
            let frame = self.position;
            if frame >= self.frame_count() {
                return Ok(None);
            }
            self.position += 1;
            if self.unreadable.contains(&frame) {
                return Err(SourceError::UnreadableFrame {
                    frame,
                    reason: "corrupt".to_string(),
                });
            }
            Ok(Some(
                self.frames
                    .index_axis(Axis(0), usize::try_from(frame).unwrap())
                    .to_owned(),
            ))
        }

        fn release(&mut self) {
            self.opened = false;
        }

        fn is_opened(&self) -> bool {
            self.opened
        }
    }

    #[test]
    fn movie_sequential_cursor() {
        let context = VideoCaptureContext::new(TestCapture::new(5, vec![])).unwrap();
        let source = MovieDataChunkSource::new(context).unwrap();
        assert_eq!(source.maxshape(), vec![5, 2, 3]);
        assert_eq!(source.default_chunk_shape(), Some(vec![1, 2, 3]));
        assert_eq!(source.default_buffer_shape(&[1, 2, 3]), Some(vec![1, 2, 3]));
        assert_eq!(source.default_buffer_shape(&[2, 2, 3]), None);
        let mut iterator = DataChunkIterator::new(source).unwrap();
        assert_eq!(iterator.buffer_shape(), &[1, 2, 3]);
        assert_eq!(iterator.num_buffers(), 5);
        assert_eq!(
            iterator.source().read_mode(),
            MovieReadMode::SequentialCursor
        );
        for frame in 0..5u64 {
            let chunk = iterator.next().unwrap().unwrap();
            assert_eq!(chunk.selection().start(), &[frame, 0, 0]);
            assert_eq!(chunk.data()[[0, 1, 2]], (frame * 10 + 5) as u8);
        }
        assert!(iterator.next().is_none());
        assert_eq!(iterator.source().context().position(), 5);
        let mut source = iterator.into_source();
        assert_eq!(source.context.capture_mut().seeks, 0);
    }

    #[test]
    fn movie_random_access() {
        let context = VideoCaptureContext::new(TestCapture::new(4, vec![])).unwrap();
        let source = MovieDataChunkSource::new(context).unwrap();
        let options = DataChunkIteratorOptions::default()
            .with_buffer(BufferSpec::BufferShape(vec![2, 1, 3]))
            .with_chunk(ChunkSpec::ChunkShape(vec![2, 1, 3]));
        let iterator = DataChunkIterator::new_with_options(source, &options).unwrap();
        assert_eq!(iterator.source().read_mode(), MovieReadMode::RandomAccess);
        let selections: Vec<_> = iterator
            .map(|chunk| {
                let (selection, data) = chunk.unwrap().into_parts();
                assert_eq!(data.shape(), &[2, 1, 3]);
                let row = selection.start()[1] as u8;
                let frame = selection.start()[0] as u8;
                assert_eq!(data[[1, 0, 0]], (frame + 1) * 10 + row * 3);
                selection
            })
            .collect();
        assert_eq!(selections.len(), 4);
    }

    #[test]
    fn movie_unreadable_frame() {
        let context = VideoCaptureContext::new(TestCapture::new(3, vec![1])).unwrap();
        let mut source = MovieDataChunkSource::new(context).unwrap();
        let err = source
            .get_data(&Selection::new_with_ranges(&[0..3, 0..2, 0..3]))
            .unwrap_err();
        assert!(matches!(err, SourceError::UnreadableFrame { frame: 1, .. }));

        let context = VideoCaptureContext::new(TestCapture::new(3, vec![1])).unwrap();
        let mut source = MovieDataChunkSource::new(context)
            .unwrap()
            .with_unreadable_frame_policy(UnreadableFramePolicy::FillWith(255));
        let data = source
            .get_data(&Selection::new_with_ranges(&[0..3, 0..2, 0..3]))
            .unwrap();
        assert_eq!(data[[0, 0, 1]], 1);
        assert!(data.index_axis(Axis(0), 1).iter().all(|&v| v == 255));
        assert_eq!(data[[2, 0, 1]], 21);
    }

    #[test]
    fn movie_end_of_stream() {
        let mut context = VideoCaptureContext::new(TestCapture::new(3, vec![])).unwrap();
        // Claim more frames than the decoder can produce
        context.set_frame_count(4);
        let mut source = MovieDataChunkSource::new(context).unwrap();
        let err = source
            .get_data(&Selection::new_with_ranges(&[2..4, 0..2, 0..3]))
            .unwrap_err();
        assert!(matches!(err, SourceError::EndOfStream(3)));
    }

    #[test]
    fn movie_released() {
        let context = VideoCaptureContext::new(TestCapture::new(3, vec![])).unwrap();
        let mut source = MovieDataChunkSource::new(context).unwrap();
        source.release();
        assert!(matches!(
            source.get_data(&Selection::new_with_ranges(&[0..1, 0..2, 0..3])),
            Err(SourceError::Released)
        ));
    }

    #[test]
    fn capture_context_stub_and_release() {
        let mut context = VideoCaptureContext::new(TestCapture::new(6, vec![])).unwrap();
        assert_eq!(context.frame_count().unwrap(), 6);
        context.set_frame_count(3);
        assert_eq!(context.timestamps().unwrap(), vec![0.0, 0.1, 0.2]);
        assert!(matches!(context.frame(3), Err(SourceError::OutOfBounds { .. })));
        assert_eq!(context.frame(2).unwrap()[[0, 0]], 20);
        assert_eq!(context.frame(0).unwrap()[[0, 0]], 0);

        let frames: Vec<_> = context.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(frames.len(), 2);
        assert!(!context.is_opened());
        assert!(context.next().is_none());
        assert!(matches!(context.fps(), Err(SourceError::Released)));
        assert!(matches!(context.frame_count(), Err(SourceError::Released)));
        assert!(matches!(context.data_type(), Err(SourceError::Released)));
        context.release();
    }
}
