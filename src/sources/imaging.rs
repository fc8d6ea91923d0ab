//! Optical imaging stacks.

use ndarray::{ArrayD, ArrayViewD, IxDyn};

use crate::{
    data_chunk_iterator::{DataChunkSource, SourceError},
    data_type::Element,
    selection::Selection,
    ArrayShape,
};

/// A reader of optical imaging video, such as a two-photon or one-photon calcium imaging stack.
pub trait ImagingExtractor {
    /// The element type of a pixel.
    type Pixel: Element;

    /// Return the number of frames.
    fn num_frames(&self) -> u64;

    /// Return the `(rows, columns)` of each frame.
    fn image_size(&self) -> (u64, u64);

    /// Return the number of channels per pixel.
    fn num_channels(&self) -> u64 {
        1
    }

    /// Returns true if the video returned by [`get_video`](ImagingExtractor::get_video) has a channel axis.
    ///
    /// By default only multi-channel video has a channel axis.
    fn has_channel_axis(&self) -> bool {
        self.num_channels() > 1
    }

    /// Return the sampling frequency in Hz.
    fn sampling_frequency(&self) -> f64;

    /// Read frames `start_frame..end_frame`.
    ///
    /// The video has shape `(frames, rows, columns, channels)` if the extractor [has a channel axis](ImagingExtractor::has_channel_axis), otherwise `(frames, rows, columns)`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the frames cannot be read.
    fn get_video(
        &self,
        start_frame: u64,
        end_frame: u64,
    ) -> Result<ArrayD<Self::Pixel>, SourceError>;
}

/// An [`ImagingExtractor`] over an in-memory video of shape `(frames, rows, columns[, channels])`.
#[derive(Clone, Debug)]
pub struct ArrayImagingExtractor<T> {
    video: ArrayD<T>,
    sampling_frequency: f64,
}

impl<T: Element> ArrayImagingExtractor<T> {
    /// Create a new in-memory imaging extractor.
    ///
    /// # Errors
    /// Returns [`SourceError::Other`] if `video` is not 3 or 4 dimensional.
    pub fn new(video: ArrayD<T>, sampling_frequency: f64) -> Result<Self, SourceError> {
        if !(3..=4).contains(&video.ndim()) {
            return Err(SourceError::Other(format!(
                "imaging video must have shape (frames, rows, columns[, channels]), got {:?}",
                video.shape()
            )));
        }
        Ok(Self {
            video,
            sampling_frequency,
        })
    }

    /// Return the video.
    #[must_use]
    pub fn video(&self) -> ArrayViewD<T> {
        self.video.view()
    }
}

impl<T: Element> ImagingExtractor for ArrayImagingExtractor<T> {
    type Pixel = T;

    fn num_frames(&self) -> u64 {
        self.video.shape()[0] as u64
    }

    fn image_size(&self) -> (u64, u64) {
        (self.video.shape()[1] as u64, self.video.shape()[2] as u64)
    }

    fn num_channels(&self) -> u64 {
        self.video
            .shape()
            .get(3)
            .map_or(1, |&channels| channels as u64)
    }

    fn has_channel_axis(&self) -> bool {
        self.video.ndim() == 4
    }

    fn sampling_frequency(&self) -> f64 {
        self.sampling_frequency
    }

    fn get_video(&self, start_frame: u64, end_frame: u64) -> Result<ArrayD<T>, SourceError> {
        let mut ranges = vec![start_frame..end_frame];
        ranges.extend(self.video.shape()[1..].iter().map(|&size| 0..size as u64));
        let selection = Selection::new_with_ranges(&ranges);
        Ok(selection.extract_ndarray(&self.video.view())?)
    }
}

/// A [`DataChunkSource`] over an [`ImagingExtractor`].
///
/// The array has shape `(frames, columns, rows)`, or `(frames, columns, rows, channels)` if the extractor has a channel axis.
/// The row and column axes are swapped relative to the extractor, matching the width-before-height layout of stored imaging series.
pub struct ImagingDataChunkSource<I> {
    imaging: I,
}

impl<I: ImagingExtractor> ImagingDataChunkSource<I> {
    /// Create a new imaging source.
    #[must_use]
    pub fn new(imaging: I) -> Self {
        Self { imaging }
    }

    /// Return the imaging extractor.
    #[must_use]
    pub fn imaging(&self) -> &I {
        &self.imaging
    }

    /// Consume the source and return the imaging extractor.
    #[must_use]
    pub fn into_imaging(self) -> I {
        self.imaging
    }
}

impl<I: ImagingExtractor> DataChunkSource for ImagingDataChunkSource<I> {
    type Element = I::Pixel;

    fn maxshape(&self) -> ArrayShape {
        let (rows, columns) = self.imaging.image_size();
        let mut maxshape = vec![self.imaging.num_frames(), columns, rows];
        if self.imaging.has_channel_axis() {
            maxshape.push(self.imaging.num_channels());
        }
        maxshape
    }

    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<I::Pixel>, SourceError> {
        let maxshape = self.maxshape();
        if !selection.inbounds(&maxshape) {
            return Err(SourceError::OutOfBounds {
                selection: selection.clone(),
                shape: maxshape,
            });
        }
        let frames = selection.to_ranges()[0].clone();
        let video = self.imaging.get_video(frames.start, frames.end)?;
        let axes: Vec<usize> = match video.ndim() {
            3 => vec![0, 2, 1],
            4 => vec![0, 2, 1, 3],
            ndim => {
                return Err(SourceError::Other(format!(
                    "imaging extractor returned a video with {ndim} dimensions"
                )))
            }
        };
        let video = video.permuted_axes(IxDyn(&axes));

        // The frame range has already been applied
        let mut ranges = selection.to_ranges();
        ranges[0] = 0..frames.end - frames.start;
        Ok(Selection::new_with_ranges(&ranges).extract_ndarray(&video.view())?)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array;

    use super::*;
    use crate::data_chunk_iterator::{
        BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions,
    };

    fn video() -> ArrayD<u16> {
        // 6 frames of 4 rows by 5 columns
        Array::from_iter(0..120u16)
            .into_shape_with_order(vec![6, 4, 5])
            .unwrap()
    }

    #[test]
    fn imaging_source_maxshape() {
        let imaging = ArrayImagingExtractor::new(video(), 30.0).unwrap();
        assert_eq!(imaging.image_size(), (4, 5));
        assert_eq!(imaging.num_channels(), 1);
        let source = ImagingDataChunkSource::new(imaging);
        assert_eq!(source.maxshape(), vec![6, 5, 4]);

        let multi = Array::<u8, _>::zeros(vec![2, 3, 4, 2]);
        let source = ImagingDataChunkSource::new(ArrayImagingExtractor::new(multi, 30.0).unwrap());
        assert_eq!(source.maxshape(), vec![2, 4, 3, 2]);

        assert!(ArrayImagingExtractor::new(Array::<u8, _>::zeros(vec![2, 3]), 30.0).is_err());
    }

    #[test]
    fn imaging_source_single_channel_axis() {
        let video = Array::from_iter(0..120u16)
            .into_shape_with_order(vec![6, 4, 5, 1])
            .unwrap();
        let imaging = ArrayImagingExtractor::new(video.clone(), 30.0).unwrap();
        assert_eq!(imaging.num_channels(), 1);
        assert!(imaging.has_channel_axis());
        let source = ImagingDataChunkSource::new(imaging);
        assert_eq!(source.maxshape(), vec![6, 5, 4, 1]);

        let mut output = ArrayD::<u16>::zeros(vec![6, 5, 4, 1]);
        for chunk in DataChunkIterator::new(source).unwrap() {
            let (selection, data) = chunk.unwrap().into_parts();
            selection.view_mut(output.view_mut()).unwrap().assign(&data);
        }
        assert_eq!(output, video.permuted_axes(IxDyn(&[0, 2, 1, 3])));
    }

    #[test]
    fn imaging_source_transposes() {
        let imaging = ArrayImagingExtractor::new(video(), 30.0).unwrap();
        let mut source = ImagingDataChunkSource::new(imaging);
        let data = source
            .get_data(&Selection::new_with_ranges(&[1..2, 3..5, 0..2]))
            .unwrap();
        assert_eq!(data.shape(), &[1, 2, 2]);
        // frame 1, column 3, rows 0..2 then column 4, rows 0..2
        assert_eq!(
            data.iter().copied().collect::<Vec<_>>(),
            vec![23, 28, 24, 29]
        );
    }

    #[test]
    fn imaging_iterator_round_trip() {
        let video = video();
        let expected = video.clone().permuted_axes(IxDyn(&[0, 2, 1]));
        let source = ImagingDataChunkSource::new(ArrayImagingExtractor::new(video, 30.0).unwrap());
        let options = DataChunkIteratorOptions::default()
            .with_buffer(BufferSpec::BufferShape(vec![4, 5, 2]))
            .with_chunk(ChunkSpec::ChunkShape(vec![2, 5, 2]));
        let iterator = DataChunkIterator::new_with_options(source, &options).unwrap();
        assert_eq!(iterator.num_buffers(), 4);
        let mut output = ArrayD::<u16>::zeros(vec![6, 5, 4]);
        for chunk in iterator {
            let (selection, data) = chunk.unwrap().into_parts();
            selection.view_mut(output.view_mut()).unwrap().assign(&data);
        }
        assert_eq!(output, expected);
    }
}
