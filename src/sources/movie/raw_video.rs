use std::{fs::File, io::Write, marker::PhantomData, path::Path};

use memmap2::Mmap;
use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::{
    data_chunk_iterator::SourceError,
    data_type::{little_endian_to_native, Element},
    num_elements,
    selection::Selection,
    ArrayShape,
};

use super::VideoCapture;

/// A [`VideoCapture`] over a memory-mapped file of concatenated raw frames.
///
/// Frames are stored in row-major order in little-endian byte order, with no header.
/// Use [`write_raw_video`] to produce such a file.
#[derive(Debug)]
pub struct RawVideoReader<T> {
    mmap: Option<Mmap>,
    frame_shape: ArrayShape,
    fps: f64,
    frame_count: u64,
    position: u64,
    _pixel: PhantomData<T>,
}

impl<T: Element> RawVideoReader<T> {
    /// Open a raw video file with frames of shape `frame_shape` played at `fps`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the file cannot be opened or mapped, the frame shape is empty or has a zero dimension,
    /// or the file size is not a whole number of frames.
    pub fn open<P: AsRef<Path>>(
        path: P,
        frame_shape: ArrayShape,
        fps: f64,
    ) -> Result<Self, SourceError> {
        if !(2..=3).contains(&frame_shape.len()) || frame_shape.contains(&0) {
            return Err(SourceError::Other(format!(
                "frame shape {frame_shape:?} must be (height, width) or (height, width, channels) with no zero dimensions"
            )));
        }
        let file = File::open(path.as_ref())?;
        let mmap = unsafe { Mmap::map(&file)? };
        let frame_bytes = num_elements(&frame_shape) * std::mem::size_of::<T>() as u64;
        let len = mmap.len() as u64;
        if len % frame_bytes != 0 {
            return Err(SourceError::Other(format!(
                "{} has {len} bytes, which is not a multiple of the frame size {frame_bytes}",
                path.as_ref().display()
            )));
        }
        Ok(Self {
            mmap: Some(mmap),
            frame_shape,
            fps,
            frame_count: len / frame_bytes,
            position: 0,
            _pixel: PhantomData,
        })
    }

    fn frame_bytes(&self) -> usize {
        usize::try_from(num_elements(&self.frame_shape)).unwrap_or(usize::MAX)
            * std::mem::size_of::<T>()
    }
}

impl<T: Element> VideoCapture for RawVideoReader<T> {
    type Pixel = T;

    fn frame_count(&self) -> u64 {
        self.frame_count
    }

    fn frame_shape(&self) -> ArrayShape {
        self.frame_shape.clone()
    }

    fn fps(&self) -> f64 {
        self.fps
    }

    fn position(&self) -> u64 {
        self.position
    }

    fn seek(&mut self, frame: u64) -> Result<(), SourceError> {
        if self.mmap.is_none() {
            return Err(SourceError::Released);
        }
        if frame > self.frame_count {
            return Err(SourceError::OutOfBounds {
                selection: Selection::new_with_ranges(&[frame..frame + 1]),
                shape: vec![self.frame_count],
            });
        }
        self.position = frame;
        Ok(())
    }

    fn read_frame(&mut self) -> Result<Option<ArrayD<T>>, SourceError> {
        let frame_bytes = self.frame_bytes();
        let Some(mmap) = &self.mmap else {
            return Err(SourceError::Released);
        };
        if self.position >= self.frame_count {
            return Ok(None);
        }
        let offset = usize::try_from(self.position)
            .map_err(|err| SourceError::Other(err.to_string()))?
            * frame_bytes;
        let mut pixels = vec![T::default(); frame_bytes / std::mem::size_of::<T>()];
        let bytes = bytemuck::cast_slice_mut::<T, u8>(&mut pixels);
        bytes.copy_from_slice(&mmap[offset..offset + frame_bytes]);
        little_endian_to_native(bytes, T::DATA_TYPE);
        let shape: Vec<usize> = self
            .frame_shape
            .iter()
            .map(|&size| usize::try_from(size).unwrap_or(usize::MAX))
            .collect();
        let frame = ArrayD::from_shape_vec(IxDyn(&shape), pixels)
            .map_err(|err| SourceError::Other(err.to_string()))?;
        self.position += 1;
        Ok(Some(frame))
    }

    fn release(&mut self) {
        self.mmap = None;
    }

    fn is_opened(&self) -> bool {
        self.mmap.is_some()
    }
}

/// Write `frames`, an array of shape `(frames, height, width[, channels])`, as a raw video file readable by [`RawVideoReader`].
///
/// # Errors
/// Returns an [`std::io::Error`] if the file cannot be written.
pub fn write_raw_video<T: Element, P: AsRef<Path>>(
    path: P,
    frames: &ArrayViewD<T>,
) -> Result<(), std::io::Error> {
    let frames = frames.as_standard_layout();
    let pixels = frames
        .as_slice()
        .ok_or_else(|| std::io::Error::other("frames are not contiguous"))?;
    let mut bytes = bytemuck::cast_slice::<T, u8>(pixels).to_vec();
    little_endian_to_native(&mut bytes, T::DATA_TYPE);
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    file.flush()
}
