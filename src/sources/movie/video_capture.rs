use ndarray::ArrayD;

use crate::{
    config::global_config,
    data_chunk_iterator::SourceError,
    data_type::{DataType, Element},
    selection::Selection,
    ArrayShape,
};

/// A video decoder with a frame cursor.
///
/// Most codecs are forward sequential, so [`seek`](VideoCapture::seek) may be much more expensive than [`read_frame`](VideoCapture::read_frame).
pub trait VideoCapture {
    /// The element type of a pixel.
    type Pixel: Element;

    /// Return the number of frames in the video.
    fn frame_count(&self) -> u64;

    /// Return the shape of a frame, `(height, width)` or `(height, width, channels)`.
    fn frame_shape(&self) -> ArrayShape;

    /// Return the frame rate in frames per second.
    fn fps(&self) -> f64;

    /// Return the index of the frame the next [`read_frame`](VideoCapture::read_frame) returns.
    fn position(&self) -> u64;

    /// Move the cursor to `frame`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the decoder cannot seek to `frame`.
    fn seek(&mut self, frame: u64) -> Result<(), SourceError>;

    /// Decode the frame at the cursor and advance the cursor.
    ///
    /// Returns [`None`] at the end of the stream.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the frame cannot be decoded.
    fn read_frame(&mut self) -> Result<Option<ArrayD<Self::Pixel>>, SourceError>;

    /// Release the decoder. Must be idempotent.
    fn release(&mut self);

    /// Returns true if the decoder has not been released.
    fn is_opened(&self) -> bool;
}

/// A scoped handle to a [`VideoCapture`].
///
/// The capture is released when the context is dropped, on [`release`](VideoCaptureContext::release),
/// or once iterating the context has yielded its last frame.
/// Any use after release is a [`SourceError::Released`] error.
///
/// The frame count can be reduced with [`set_frame_count`](VideoCaptureContext::set_frame_count),
/// which is how stub mode truncates a video for fast smoke tests.
#[derive(Debug)]
pub struct VideoCaptureContext<V: VideoCapture> {
    capture: V,
    frame_count: u64,
    exhausted: bool,
}

impl<V: VideoCapture> VideoCaptureContext<V> {
    /// Create a new context over `capture`.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if `capture` is not opened.
    pub fn new(capture: V) -> Result<Self, SourceError> {
        if !capture.is_opened() {
            return Err(SourceError::Released);
        }
        let frame_count = capture.frame_count();
        Ok(Self {
            capture,
            frame_count,
            exhausted: false,
        })
    }

    /// Create a new context over `capture`, truncated to the configured stub frame count if `stub` is true.
    ///
    /// See [`Config::stub_frame_count`](crate::config::Config::stub_frame_count).
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if `capture` is not opened.
    pub fn new_with_stub(capture: V, stub: bool) -> Result<Self, SourceError> {
        let mut context = Self::new(capture)?;
        if stub {
            let stub_frame_count = global_config().stub_frame_count();
            context.frame_count = context.frame_count.min(stub_frame_count);
        }
        Ok(context)
    }

    fn check_opened(&self) -> Result<(), SourceError> {
        if self.capture.is_opened() {
            Ok(())
        } else {
            Err(SourceError::Released)
        }
    }

    /// Return the number of frames.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn frame_count(&self) -> Result<u64, SourceError> {
        self.check_opened()?;
        Ok(self.frame_count)
    }

    /// Set the number of frames, e.g. to truncate the video.
    pub fn set_frame_count(&mut self, frame_count: u64) {
        self.frame_count = frame_count;
    }

    /// Return the frame rate in frames per second.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn fps(&self) -> Result<f64, SourceError> {
        self.check_opened()?;
        Ok(self.capture.fps())
    }

    /// Return the frame shape.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn frame_shape(&self) -> Result<ArrayShape, SourceError> {
        self.check_opened()?;
        Ok(self.capture.frame_shape())
    }

    /// Return the data type of a pixel.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn data_type(&self) -> Result<DataType, SourceError> {
        self.check_opened()?;
        Ok(V::Pixel::DATA_TYPE)
    }

    /// Return the timestamp of each frame in seconds, `frame / fps`.
    ///
    /// # Errors
    /// Returns [`SourceError::Released`] if the capture has been released.
    pub fn timestamps(&self) -> Result<Vec<f64>, SourceError> {
        let fps = self.fps()?;
        #[allow(clippy::cast_precision_loss)]
        Ok((0..self.frame_count).map(|frame| frame as f64 / fps).collect())
    }

    /// Return the frame at index `frame`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the capture has been released, `frame` is beyond the frame count, or the frame cannot be decoded.
    pub fn frame(&mut self, frame: u64) -> Result<ArrayD<V::Pixel>, SourceError> {
        self.check_opened()?;
        if frame >= self.frame_count {
            return Err(SourceError::OutOfBounds {
                selection: Selection::new_with_ranges(&[frame..frame + 1]),
                shape: vec![self.frame_count],
            });
        }
        if self.capture.position() != frame {
            self.capture.seek(frame)?;
        }
        self.capture
            .read_frame()?
            .ok_or(SourceError::EndOfStream(frame))
    }

    /// Return the index of the next frame to be read.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.capture.position()
    }

    /// Return a mutable reference to the capture.
    pub fn capture_mut(&mut self) -> &mut V {
        &mut self.capture
    }

    /// Release the capture. Calling this more than once has no effect.
    pub fn release(&mut self) {
        self.capture.release();
    }

    /// Returns true if the capture has not been released.
    #[must_use]
    pub fn is_opened(&self) -> bool {
        self.capture.is_opened()
    }
}

impl<V: VideoCapture> Iterator for VideoCaptureContext<V> {
    type Item = Result<ArrayD<V::Pixel>, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if let Err(err) = self.check_opened() {
            return Some(Err(err));
        }
        let frame = self.capture.position();
        if frame >= self.frame_count {
            self.exhausted = true;
            self.release();
            return None;
        }
        match self.capture.read_frame() {
            Ok(Some(data)) => Some(Ok(data)),
            Ok(None) => {
                self.exhausted = true;
                self.release();
                Some(Err(SourceError::EndOfStream(frame)))
            }
            Err(err) => Some(Err(err)),
        }
    }
}

impl<V: VideoCapture> Drop for VideoCaptureContext<V> {
    fn drop(&mut self) {
        self.capture.release();
    }
}
