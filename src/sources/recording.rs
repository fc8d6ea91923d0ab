//! Electrophysiology recordings.

mod binary_recording;

pub use binary_recording::{BinaryRecording, BinaryRecordingOptions};

use std::marker::PhantomData;

use ndarray::{Array2, ArrayD};
use num::{NumCast, ToPrimitive};

use crate::{
    data_chunk_iterator::{DataChunkIteratorCreateError, DataChunkSource, SourceError},
    data_type::{DataType, Element},
    selection::Selection,
    ArrayShape,
};

/// A reader of multi-channel electrophysiology traces.
pub trait RecordingExtractor {
    /// The element type of the raw samples.
    type Sample: Element;

    /// Return the channel identifiers.
    fn channel_ids(&self) -> Vec<String>;

    /// Return the number of channels.
    fn num_channels(&self) -> usize {
        self.channel_ids().len()
    }

    /// Return the number of segments.
    fn num_segments(&self) -> usize {
        1
    }

    /// Return the number of frames (samples per channel) in `segment_index`.
    fn num_frames(&self, segment_index: usize) -> u64;

    /// Return the sampling frequency in Hz.
    fn sampling_frequency(&self) -> f64;

    /// Return the per-channel gains converting raw samples to microvolts.
    fn channel_gains(&self) -> Vec<f64> {
        vec![1.0; self.num_channels()]
    }

    /// Return the per-channel offsets (in microvolts) applied after the gains.
    fn channel_offsets(&self) -> Vec<f64> {
        vec![0.0; self.num_channels()]
    }

    /// Read frames `start_frame..end_frame` of `segment_index` for the channels at `channel_indices`.
    ///
    /// Traces are returned channel-major, with shape `(channel_indices.len(), end_frame - start_frame)`.
    ///
    /// # Errors
    /// Returns a [`SourceError`] if the traces cannot be read.
    fn get_traces(
        &self,
        channel_indices: &[usize],
        start_frame: u64,
        end_frame: u64,
        segment_index: usize,
    ) -> Result<Array2<Self::Sample>, SourceError>;
}

/// Options for a [`RecordingDataChunkSource`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RecordingSourceOptions {
    /// The segment to read.
    pub segment_index: usize,
    /// Convert samples to microvolts with the channel gains and offsets.
    pub return_scaled: bool,
    /// A per-channel offset added to every sample after conversion, typically to shift unsigned samples into a signed range.
    pub unsigned_coercion: Option<Vec<i64>>,
}

/// A [`DataChunkSource`] over one segment of a [`RecordingExtractor`].
///
/// The array has shape `(frames, channels)`.
/// Samples are converted to the output element type `T` after the optional scaling and coercion offset, and a sample that `T` cannot represent is an error.
pub struct RecordingDataChunkSource<R: RecordingExtractor, T = <R as RecordingExtractor>::Sample> {
    recording: R,
    options: RecordingSourceOptions,
    gains: Vec<f64>,
    offsets: Vec<f64>,
    _output: PhantomData<T>,
}

impl<R: RecordingExtractor, T: Element> RecordingDataChunkSource<R, T> {
    /// Create a new recording source.
    ///
    /// # Errors
    /// Returns [`DataChunkIteratorCreateError::InvalidSource`] if the segment does not exist,
    /// or the gains, offsets or unsigned coercion do not have one entry per channel.
    pub fn new(
        recording: R,
        options: RecordingSourceOptions,
    ) -> Result<Self, DataChunkIteratorCreateError> {
        let num_channels = recording.num_channels();
        if options.segment_index >= recording.num_segments() {
            return Err(DataChunkIteratorCreateError::InvalidSource(format!(
                "segment index {} is out of range for a recording with {} segments",
                options.segment_index,
                recording.num_segments()
            )));
        }
        if let Some(unsigned_coercion) = &options.unsigned_coercion {
            if unsigned_coercion.len() != num_channels {
                return Err(DataChunkIteratorCreateError::InvalidSource(format!(
                    "unsigned coercion has {} entries for {num_channels} channels",
                    unsigned_coercion.len()
                )));
            }
        }
        let gains = recording.channel_gains();
        let offsets = recording.channel_offsets();
        if gains.len() != num_channels || offsets.len() != num_channels {
            return Err(DataChunkIteratorCreateError::InvalidSource(format!(
                "recording has {} gains and {} offsets for {num_channels} channels",
                gains.len(),
                offsets.len()
            )));
        }
        Ok(Self {
            recording,
            options,
            gains,
            offsets,
            _output: PhantomData,
        })
    }

    /// Return the recording.
    #[must_use]
    pub fn recording(&self) -> &R {
        &self.recording
    }

    /// Consume the source and return the recording.
    #[must_use]
    pub fn into_recording(self) -> R {
        self.recording
    }

    /// Return the options.
    #[must_use]
    pub fn options(&self) -> &RecordingSourceOptions {
        &self.options
    }

    fn convert(&self, sample: R::Sample, channel: usize) -> Result<T, SourceError> {
        let coercion = self
            .options
            .unsigned_coercion
            .as_ref()
            .map_or(0, |coercion| coercion[channel]);
        let converted = if self.options.return_scaled {
            let value = sample.to_f64().unwrap_or(f64::NAN) * self.gains[channel]
                + self.offsets[channel];
            #[allow(clippy::cast_precision_loss)]
            let value = value + coercion as f64;
            <T as NumCast>::from(value).ok_or(value)
        } else if coercion == 0 {
            <T as NumCast>::from(sample).ok_or_else(|| sample.to_f64().unwrap_or(f64::NAN))
        } else if R::Sample::DATA_TYPE.is_integer() {
            let value = sample
                .to_i128()
                .map(|sample| sample + <i128 as From<i64>>::from(coercion));
            value
                .and_then(<T as NumCast>::from)
                .ok_or_else(|| value.and_then(|value| value.to_f64()).unwrap_or(f64::NAN))
        } else {
            #[allow(clippy::cast_precision_loss)]
            let value = sample.to_f64().unwrap_or(f64::NAN) + coercion as f64;
            <T as NumCast>::from(value).ok_or(value)
        };
        converted.map_err(|value| SourceError::NotRepresentable {
            value,
            data_type: T::DATA_TYPE,
        })
    }
}

impl<R: RecordingExtractor, T: Element> DataChunkSource for RecordingDataChunkSource<R, T> {
    type Element = T;

    fn data_type(&self) -> DataType {
        T::DATA_TYPE
    }

    fn maxshape(&self) -> ArrayShape {
        vec![
            self.recording.num_frames(self.options.segment_index),
            self.recording.num_channels() as u64,
        ]
    }

    fn get_data(&mut self, selection: &Selection) -> Result<ArrayD<T>, SourceError> {
        let maxshape = self.maxshape();
        if !selection.inbounds(&maxshape) {
            return Err(SourceError::OutOfBounds {
                selection: selection.clone(),
                shape: maxshape,
            });
        }
        let frames = selection.to_ranges()[0].clone();
        let channels = selection.to_ranges()[1].clone();
        let channel_indices: Vec<usize> = (channels.start..channels.end)
            .map(|channel| usize::try_from(channel).unwrap_or(usize::MAX))
            .collect();
        let traces = self.recording.get_traces(
            &channel_indices,
            frames.start,
            frames.end,
            self.options.segment_index,
        )?;
        let expected = (channel_indices.len(), selection.shape_usize()[0]);
        if traces.dim() != expected {
            return Err(SourceError::Other(format!(
                "recording returned traces with shape {:?} for channels {channels:?} and frames {frames:?}, expected {expected:?}",
                traces.dim()
            )));
        }

        let shape = selection.shape_usize();
        let mut data = Array2::<T>::default((shape[0], shape[1]));
        for ((frame, column), value) in data.indexed_iter_mut() {
            *value = self.convert(traces[[column, frame]], channel_indices[column])?;
        }
        Ok(data.into_dyn())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::Array2;

    use super::*;
    use crate::data_chunk_iterator::{
        BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions,
    };

    /// An in-memory recording with traces stored channel-major.
    pub(crate) struct TestRecording<S> {
        pub(crate) traces: Vec<Array2<S>>,
        pub(crate) gains: Vec<f64>,
        pub(crate) offsets: Vec<f64>,
    }

    impl<S: Element> RecordingExtractor for TestRecording<S> {
        type Sample = S;

        fn channel_ids(&self) -> Vec<String> {
            (0..self.traces[0].nrows()).map(|i| format!("ch{i}")).collect()
        }

        fn num_segments(&self) -> usize {
            self.traces.len()
        }

        fn num_frames(&self, segment_index: usize) -> u64 {
            self.traces[segment_index].ncols() as u64
        }

        fn sampling_frequency(&self) -> f64 {
            30_000.0
        }

        fn channel_gains(&self) -> Vec<f64> {
            self.gains.clone()
        }

        fn channel_offsets(&self) -> Vec<f64> {
            self.offsets.clone()
        }

        fn get_traces(
            &self,
            channel_indices: &[usize],
            start_frame: u64,
            end_frame: u64,
            segment_index: usize,
        ) -> Result<Array2<S>, SourceError> {
            let traces = &self.traces[segment_index];
            let start = usize::try_from(start_frame).unwrap();
            let end = usize::try_from(end_frame).unwrap();
            Ok(traces
                .select(ndarray::Axis(0), channel_indices)
                .slice(ndarray::s![.., start..end])
                .to_owned())
        }
    }

    fn recording_u16() -> TestRecording<u16> {
        // channel c, frame f holds 100 * c + f
        let traces = Array2::from_shape_fn((3, 50), |(c, f)| (100 * c + f) as u16);
        TestRecording {
            traces: vec![traces.clone(), traces.mapv(|v| v + 1000)],
            gains: vec![0.5, 1.0, 2.0],
            offsets: vec![0.0, -10.0, 10.0],
        }
    }

    #[test]
    fn recording_source_transposes() {
        let options = RecordingSourceOptions::default();
        let source: RecordingDataChunkSource<_> =
            RecordingDataChunkSource::new(recording_u16(), options).unwrap();
        assert_eq!(source.maxshape(), vec![50, 3]);
        assert_eq!(source.data_type(), DataType::UInt16);
        let mut source = source;
        let data = source
            .get_data(&Selection::new_with_ranges(&[10..12, 1..3]))
            .unwrap();
        assert_eq!(data.shape(), &[2, 2]);
        assert_eq!(
            data.iter().copied().collect::<Vec<_>>(),
            vec![110, 210, 111, 211]
        );
    }

    #[test]
    fn recording_source_segment_and_coercion() {
        let options = RecordingSourceOptions {
            segment_index: 1,
            return_scaled: false,
            unsigned_coercion: Some(vec![-1000, -1000, -1000]),
        };
        let mut source: RecordingDataChunkSource<_, i16> =
            RecordingDataChunkSource::new(recording_u16(), options).unwrap();
        assert_eq!(source.data_type(), DataType::Int16);
        let data = source
            .get_data(&Selection::new_with_ranges(&[0..1, 0..3]))
            .unwrap();
        assert_eq!(
            data.iter().copied().collect::<Vec<_>>(),
            vec![0i16, 100, 200]
        );
    }

    #[test]
    fn recording_source_scaled() {
        let options = RecordingSourceOptions {
            return_scaled: true,
            ..Default::default()
        };
        let mut source: RecordingDataChunkSource<_, f32> =
            RecordingDataChunkSource::new(recording_u16(), options).unwrap();
        let data = source
            .get_data(&Selection::new_with_ranges(&[4..5, 0..3]))
            .unwrap();
        assert_eq!(
            data.iter().copied().collect::<Vec<_>>(),
            vec![2.0f32, 94.0, 418.0]
        );
    }

    #[test]
    fn recording_source_not_representable() {
        let options = RecordingSourceOptions::default();
        let mut source: RecordingDataChunkSource<_, i8> =
            RecordingDataChunkSource::new(recording_u16(), options).unwrap();
        let err = source
            .get_data(&Selection::new_with_ranges(&[0..1, 2..3]))
            .unwrap_err();
        assert_eq!(err.to_string(), "value 200 is not representable as int8");
    }

    #[test]
    fn recording_source_invalid() {
        let options = RecordingSourceOptions {
            segment_index: 2,
            ..Default::default()
        };
        assert!(RecordingDataChunkSource::<_, u16>::new(recording_u16(), options).is_err());
        let options = RecordingSourceOptions {
            unsigned_coercion: Some(vec![0]),
            ..Default::default()
        };
        assert!(RecordingDataChunkSource::<_, u16>::new(recording_u16(), options).is_err());
    }

    #[test]
    fn recording_iterator_round_trip() {
        let recording = recording_u16();
        let expected = recording.traces[0].t().to_owned().into_dyn();
        let source: RecordingDataChunkSource<_> =
            RecordingDataChunkSource::new(recording, RecordingSourceOptions::default()).unwrap();
        let options = DataChunkIteratorOptions::default()
            .with_buffer(BufferSpec::BufferShape(vec![20, 2]))
            .with_chunk(ChunkSpec::ChunkShape(vec![10, 1]));
        let iterator = DataChunkIterator::new_with_options(source, &options).unwrap();
        assert_eq!(iterator.num_buffers(), 6);
        let mut output = ndarray::ArrayD::<u16>::zeros(vec![50, 3]);
        for chunk in iterator {
            let (selection, data) = chunk.unwrap().into_parts();
            selection.view_mut(output.view_mut()).unwrap().assign(&data);
        }
        assert_eq!(output, expected);
    }
}
