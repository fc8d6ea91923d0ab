//! NWB-style files on a chunked [storage](crate::storage) backend.
//!
//! An [`NwbFile`] is a hierarchy of groups and [chunked datasets](crate::dataset::ChunkedDataset):
//! ```text
//! /                           NWBFile (identifier, session_description, session_start_time)
//! ├── acquisition/
//! │   └── ElectricalSeries/   neurodata_type, description, comments
//! │       ├── data            unit, conversion, resolution
//! │       ├── electrodes
//! │       └── starting_time   rate, unit (or timestamps)
//! └── processing/
//!     └── ophys/              ProcessingModule
//!         └── TwoPhotonSeries/
//! ```
//!
//! The `data` dataset of a series is written by consuming a [`DataChunkIterator`], one buffer at a time.

mod time_series;

pub use time_series::{check_regular_timestamps, SeriesTiming, SeriesType, TimeSeries};

use std::sync::Arc;

use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;

use crate::{
    data_chunk_iterator::{DataChunkIterator, DataChunkSource},
    data_type::Element,
    dataset::{
        Attributes, ChunkedDataset, DataChunksWritten, DatasetBuilder, DatasetCreateError,
        DatasetError,
    },
    selection::Selection,
    storage::{meta_key, node_exists, ReadableStorageTraits, StorageError, WritableStorageTraits},
};

/// The NWB schema version recorded in the root group.
pub const NWB_VERSION: &str = "2.7.0";

/// The namespace of the neurodata types written by this module.
pub const NWB_NAMESPACE: &str = "core";

/// The largest chunk of a timestamps or index dataset, in elements.
const MAX_VECTOR_CHUNK: u64 = 1 << 20;

/// An NWB file error.
#[derive(Debug, Error)]
pub enum NwbError {
    /// A storage error.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A dataset read or write error.
    #[error(transparent)]
    Dataset(#[from] DatasetError),
    /// A dataset creation error.
    #[error(transparent)]
    DatasetCreate(#[from] DatasetCreateError),
    /// Group metadata that cannot be parsed or serialised.
    #[error("invalid group metadata: {0}")]
    Json(#[from] serde_json::Error),
    /// The root group is missing or is not an `NWBFile`.
    #[error("no NWBFile root group in the store")]
    NotAnNwbFile,
    /// A group that does not exist.
    #[error("group {0} does not exist")]
    MissingGroup(String),
    /// A node that already exists.
    #[error("node {0} already exists")]
    NodeExists(String),
    /// A series that cannot be written.
    #[error("invalid series {name}: {reason}")]
    InvalidSeries {
        /// The series name.
        name: String,
        /// Why the series is invalid.
        reason: String,
    },
}

/// The session level metadata of an [`NwbFile`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NwbFileMetadata {
    /// A unique identifier of the file.
    pub identifier: String,
    /// A description of the session.
    pub session_description: String,
    /// The session start time, as an ISO 8601 string.
    pub session_start_time: String,
}

#[derive(Serialize, Deserialize)]
struct GroupMetadata {
    zarr_format: u64,
    node_type: String,
    #[serde(default)]
    attributes: Attributes,
}

impl GroupMetadata {
    fn new(attributes: Attributes) -> Self {
        Self {
            zarr_format: 3,
            node_type: "group".to_string(),
            attributes,
        }
    }
}

fn attributes(value: serde_json::Value) -> Attributes {
    match value {
        serde_json::Value::Object(map) => map,
        _ => Attributes::new(),
    }
}

/// An NWB file in a storage backend.
#[derive(Debug)]
pub struct NwbFile<TStorage: ?Sized> {
    storage: Arc<TStorage>,
    metadata: NwbFileMetadata,
}

impl<TStorage: ?Sized> NwbFile<TStorage> {
    /// Return the session metadata.
    #[must_use]
    pub fn metadata(&self) -> &NwbFileMetadata {
        &self.metadata
    }

    /// Return the storage backend.
    #[must_use]
    pub fn storage(&self) -> &Arc<TStorage> {
        &self.storage
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits> NwbFile<TStorage> {
    /// Open an existing NWB file.
    ///
    /// # Errors
    /// Returns [`NwbError::NotAnNwbFile`] if the root group is missing or is not an `NWBFile`.
    pub fn open(storage: Arc<TStorage>) -> Result<Self, NwbError> {
        let attributes = read_group_attributes(&*storage, "/")?
            .ok_or(NwbError::NotAnNwbFile)?;
        if attributes.get("neurodata_type") != Some(&json!("NWBFile")) {
            return Err(NwbError::NotAnNwbFile);
        }
        let metadata = serde_json::from_value(serde_json::Value::Object(attributes))
            .map_err(|_| NwbError::NotAnNwbFile)?;
        Ok(Self { storage, metadata })
    }

    /// Return the attributes of the group at `path`.
    ///
    /// # Errors
    /// Returns [`NwbError::MissingGroup`] if there is no group at `path`.
    pub fn group_attributes(&self, path: &str) -> Result<Attributes, NwbError> {
        read_group_attributes(&*self.storage, path)?
            .ok_or_else(|| NwbError::MissingGroup(path.to_string()))
    }

    /// Open the dataset at `path`, such as `/acquisition/ElectricalSeries/data`.
    ///
    /// # Errors
    /// Returns a [`DatasetCreateError`] if there is no valid dataset at `path`.
    pub fn dataset(&self, path: &str) -> Result<ChunkedDataset<TStorage>, NwbError> {
        Ok(ChunkedDataset::open(self.storage.clone(), path)?)
    }

    /// Return the timestamps of the series at `series_path`, in seconds.
    ///
    /// Regularly sampled series are expanded from `starting_time` and its `rate` to `num_samples` timestamps.
    ///
    /// # Errors
    /// Returns an [`NwbError`] if the series has neither a `starting_time` nor a `timestamps` dataset.
    pub fn timestamps(&self, series_path: &str) -> Result<Vec<f64>, NwbError> {
        let starting_time = format!("{series_path}/starting_time");
        if node_exists(&*self.storage, &starting_time)? {
            let dataset = self.dataset(&starting_time)?;
            let rate = dataset
                .attributes()
                .get("rate")
                .and_then(serde_json::Value::as_f64)
                .unwrap_or(1.0);
            let start = dataset
                .retrieve_array_ndarray::<f64>()?
                .first()
                .copied()
                .unwrap_or(0.0);
            let num_samples = self
                .dataset(&format!("{series_path}/data"))?
                .shape()
                .first()
                .copied()
                .unwrap_or(0);
            #[allow(clippy::cast_precision_loss)]
            Ok((0..num_samples)
                .map(|sample| start + sample as f64 / rate)
                .collect())
        } else {
            let timestamps = self.dataset(&format!("{series_path}/timestamps"))?;
            Ok(timestamps
                .retrieve_array_ndarray::<f64>()?
                .into_iter()
                .collect())
        }
    }
}

impl<TStorage: ?Sized + ReadableStorageTraits + WritableStorageTraits> NwbFile<TStorage> {
    /// Create a new NWB file with empty `acquisition` and `processing` groups.
    ///
    /// # Errors
    /// Returns [`NwbError::NodeExists`] if the store already holds a root group.
    pub fn create(storage: Arc<TStorage>, metadata: NwbFileMetadata) -> Result<Self, NwbError> {
        if node_exists(&*storage, "/")? {
            return Err(NwbError::NodeExists("/".to_string()));
        }
        let mut root = attributes(json!({
            "neurodata_type": "NWBFile",
            "namespace": NWB_NAMESPACE,
            "nwb_version": NWB_VERSION,
        }));
        root.extend(attributes(serde_json::to_value(&metadata)?));
        write_group(&*storage, "/", root)?;
        write_group(&*storage, "/acquisition", Attributes::new())?;
        write_group(&*storage, "/processing", Attributes::new())?;
        Ok(Self { storage, metadata })
    }

    /// Create a processing module named `name`.
    ///
    /// # Errors
    /// Returns [`NwbError::NodeExists`] if the module already exists.
    pub fn create_processing_module(&self, name: &str, description: &str) -> Result<(), NwbError> {
        let path = format!("/processing/{name}");
        if node_exists(&*self.storage, &path)? {
            return Err(NwbError::NodeExists(path));
        }
        let attributes = attributes(json!({
            "neurodata_type": "ProcessingModule",
            "namespace": NWB_NAMESPACE,
            "description": description,
        }));
        write_group(&*self.storage, &path, attributes)
    }

    /// Write `series` to the `acquisition` group, consuming `iterator` for its data.
    ///
    /// Returns the path of the series group.
    ///
    /// # Errors
    /// Returns an [`NwbError`] if the series does not match the iterator, it already exists, or writing fails.
    pub fn add_acquisition<S: DataChunkSource>(
        &self,
        series: &TimeSeries,
        iterator: DataChunkIterator<S>,
    ) -> Result<String, NwbError> {
        self.add_series("/acquisition", series, iterator)
    }

    /// Write `series` to the processing module `module`, consuming `iterator` for its data.
    ///
    /// Returns the path of the series group.
    ///
    /// # Errors
    /// Returns [`NwbError::MissingGroup`] if the module does not exist, or any error of [`add_acquisition`](NwbFile::add_acquisition).
    pub fn add_to_processing_module<S: DataChunkSource>(
        &self,
        module: &str,
        series: &TimeSeries,
        iterator: DataChunkIterator<S>,
    ) -> Result<String, NwbError> {
        let module = format!("/processing/{module}");
        if !node_exists(&*self.storage, &module)? {
            return Err(NwbError::MissingGroup(module));
        }
        self.add_series(&module, series, iterator)
    }

    /// Write an [`ImageSeries`](SeriesType::ImageSeries) whose frames are held in external movie files.
    ///
    /// `starting_frame` is the index of the first frame of each external file in the series.
    ///
    /// # Errors
    /// Returns [`NwbError::InvalidSeries`] if the series is not an `ImageSeries` or `external_file` and `starting_frame` differ in length.
    pub fn add_external_image_series(
        &self,
        series: &TimeSeries,
        external_file: &[String],
        starting_frame: &[u64],
    ) -> Result<String, NwbError> {
        if *series.series_type() != SeriesType::ImageSeries {
            return Err(invalid_series(series, "external files require an ImageSeries"));
        }
        if external_file.len() != starting_frame.len() {
            return Err(invalid_series(
                series,
                format!(
                    "{} external files with {} starting frames",
                    external_file.len(),
                    starting_frame.len()
                ),
            ));
        }
        let path = self.create_series_group(
            "/acquisition",
            series,
            attributes(json!({"format": "external", "external_file": external_file})),
        )?;
        self.write_vector(
            &format!("{path}/starting_frame"),
            starting_frame,
            Attributes::new(),
        )?;
        self.write_timing(&path, series)?;
        log::info!(
            "wrote {} {path} with {} external files",
            series.series_type(),
            external_file.len()
        );
        Ok(path)
    }

    fn add_series<S: DataChunkSource>(
        &self,
        parent: &str,
        series: &TimeSeries,
        iterator: DataChunkIterator<S>,
    ) -> Result<String, NwbError> {
        validate_series(series, iterator.maxshape())?;
        let mut group_attributes = Attributes::new();
        if let SeriesType::TwoPhotonSeries { imaging_plane } = series.series_type() {
            group_attributes.insert("imaging_plane".to_string(), json!(imaging_plane));
        }
        let path = self.create_series_group(parent, series, group_attributes)?;

        let mut builder = DatasetBuilder::from_iterator(&iterator);
        if let Some(compression) = series.compression() {
            builder.compression(compression);
        }
        builder.attributes(attributes(json!({
            "unit": series.unit(),
            "conversion": series.conversion(),
            "resolution": -1.0,
        })));
        let data = builder.build(self.storage.clone(), &format!("{path}/data"))?;
        data.store_metadata()?;
        let DataChunksWritten {
            num_buffers,
            num_elements,
        } = data.write_data_chunks(iterator)?;

        if let SeriesType::ElectricalSeries { electrodes } = series.series_type() {
            self.write_vector(
                &format!("{path}/electrodes"),
                electrodes,
                attributes(json!({
                    "neurodata_type": "DynamicTableRegion",
                    "namespace": NWB_NAMESPACE,
                    "description": "the electrodes of each channel",
                })),
            )?;
        }
        self.write_timing(&path, series)?;
        log::info!(
            "wrote {} {path} {:?} {} ({num_buffers} buffers, {num_elements} elements)",
            series.series_type(),
            data.shape(),
            data.data_type(),
        );
        Ok(path)
    }

    fn create_series_group(
        &self,
        parent: &str,
        series: &TimeSeries,
        extra_attributes: Attributes,
    ) -> Result<String, NwbError> {
        let name = series.name();
        if name.is_empty() || name.contains('/') {
            return Err(invalid_series(series, "names must be non-empty and must not contain /"));
        }
        let path = format!("{parent}/{name}");
        if node_exists(&*self.storage, &path)? {
            return Err(NwbError::NodeExists(path));
        }
        let mut attributes = attributes(json!({
            "neurodata_type": series.series_type().to_string(),
            "namespace": NWB_NAMESPACE,
            "description": series.description(),
            "comments": series.comments(),
        }));
        attributes.extend(extra_attributes);
        write_group(&*self.storage, &path, attributes)?;
        Ok(path)
    }

    fn write_timing(&self, path: &str, series: &TimeSeries) -> Result<(), NwbError> {
        match series.timing() {
            SeriesTiming::Rate {
                rate,
                starting_time,
            } => self.write_vector(
                &format!("{path}/starting_time"),
                &[*starting_time],
                attributes(json!({"rate": rate, "unit": "seconds"})),
            ),
            SeriesTiming::Timestamps(timestamps) => self.write_vector(
                &format!("{path}/timestamps"),
                timestamps,
                attributes(json!({"interval": 1, "unit": "seconds"})),
            ),
        }
    }

    fn write_vector<T: Element>(
        &self,
        path: &str,
        values: &[T],
        attributes: Attributes,
    ) -> Result<(), NwbError> {
        let length = values.len() as u64;
        let mut builder = DatasetBuilder::new(
            vec![length],
            T::DATA_TYPE,
            vec![length.clamp(1, MAX_VECTOR_CHUNK)],
        );
        let dataset = builder
            .attributes(attributes)
            .build(self.storage.clone(), path)?;
        dataset.store_metadata()?;
        if length > 0 {
            let values = ArrayD::from_shape_vec(vec![values.len()], values.to_vec())
                .map_err(|err| StorageError::Other(err.to_string()))?;
            let selection = Selection::new_with_shape(vec![length]);
            dataset.store_selection_ndarray(&selection, values.view())?;
        }
        Ok(())
    }
}

fn invalid_series(series: &TimeSeries, reason: impl Into<String>) -> NwbError {
    NwbError::InvalidSeries {
        name: series.name().to_string(),
        reason: reason.into(),
    }
}

fn validate_series(series: &TimeSeries, maxshape: &[u64]) -> Result<(), NwbError> {
    let (min, max) = match series.series_type() {
        SeriesType::TimeSeries => (1, usize::MAX),
        SeriesType::ElectricalSeries { .. } => (2, 2),
        SeriesType::ImageSeries | SeriesType::TwoPhotonSeries { .. } => (3, 4),
    };
    if maxshape.len() < min || maxshape.len() > max {
        return Err(invalid_series(
            series,
            format!(
                "{} data cannot have shape {maxshape:?}",
                series.series_type()
            ),
        ));
    }
    if let SeriesType::ElectricalSeries { electrodes } = series.series_type() {
        if electrodes.len() as u64 != maxshape[1] {
            return Err(invalid_series(
                series,
                format!(
                    "{} electrodes for {} channels",
                    electrodes.len(),
                    maxshape[1]
                ),
            ));
        }
    }
    if let SeriesTiming::Timestamps(timestamps) = series.timing() {
        if timestamps.len() as u64 != maxshape[0] {
            return Err(invalid_series(
                series,
                format!(
                    "{} timestamps for {} samples",
                    timestamps.len(),
                    maxshape[0]
                ),
            ));
        }
    }
    Ok(())
}

fn read_group_attributes<TStorage: ?Sized + ReadableStorageTraits>(
    storage: &TStorage,
    path: &str,
) -> Result<Option<Attributes>, NwbError> {
    let Some(bytes) = storage.get(&meta_key(path)?)? else {
        return Ok(None);
    };
    let metadata: GroupMetadata = serde_json::from_slice(&bytes)?;
    Ok((metadata.node_type == "group").then_some(metadata.attributes))
}

fn write_group<TStorage: ?Sized + WritableStorageTraits>(
    storage: &TStorage,
    path: &str,
    attributes: Attributes,
) -> Result<(), NwbError> {
    let metadata = serde_json::to_vec_pretty(&GroupMetadata::new(attributes))?;
    storage.set(&meta_key(path)?, &metadata)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::error::Error;

    use ndarray::Array;

    use crate::{
        data_chunk_iterator::{BufferSpec, ChunkSpec, DataChunkIteratorOptions},
        data_type::DataType,
        sources::SliceableDataChunkSource,
        storage::store::MemoryStore,
    };

    use super::*;

    fn file() -> Result<NwbFile<MemoryStore>, NwbError> {
        NwbFile::create(
            Arc::new(MemoryStore::new()),
            NwbFileMetadata {
                identifier: "7f1c".to_string(),
                session_description: "test session".to_string(),
                session_start_time: "2024-01-01T00:00:00+00:00".to_string(),
            },
        )
    }

    fn traces(frames: usize, channels: usize) -> Result<ArrayD<i16>, Box<dyn Error>> {
        Ok(Array::from_iter(0..i16::try_from(frames * channels)?)
            .into_shape_with_order((frames, channels))?
            .into_dyn())
    }

    fn iterator(
        data: &ArrayD<i16>,
    ) -> Result<DataChunkIterator<SliceableDataChunkSource<'_, i16>>, Box<dyn Error>> {
        let options = DataChunkIteratorOptions::default()
            .with_buffer(BufferSpec::BufferShape(vec![10, data.shape()[1] as u64]))
            .with_chunk(ChunkSpec::ChunkShape(vec![5, 1]));
        Ok(DataChunkIterator::new_with_options(
            SliceableDataChunkSource::new(data),
            &options,
        )?)
    }

    #[test]
    fn nwb_file_create_open() -> Result<(), Box<dyn Error>> {
        let file = file()?;
        assert!(matches!(
            NwbFile::create(file.storage().clone(), file.metadata().clone()),
            Err(NwbError::NodeExists(_))
        ));
        let reopened = NwbFile::open(file.storage().clone())?;
        assert_eq!(reopened.metadata(), file.metadata());
        let root = reopened.group_attributes("/")?;
        assert_eq!(root["nwb_version"], NWB_VERSION);
        assert!(reopened.group_attributes("/acquisition")?.is_empty());
        assert!(matches!(
            NwbFile::open(Arc::new(MemoryStore::new())),
            Err(NwbError::NotAnNwbFile)
        ));
        Ok(())
    }

    #[test]
    fn nwb_electrical_series() -> Result<(), Box<dyn Error>> {
        let file = file()?;
        let series = TimeSeries::new(
            "ElectricalSeries",
            SeriesType::ElectricalSeries {
                electrodes: vec![0, 1, 2],
            },
            SeriesTiming::Rate {
                rate: 1000.0,
                starting_time: 0.5,
            },
        )
        .with_conversion(1e-6);
        let data = traces(25, 3)?;
        let path = file.add_acquisition(&series, iterator(&data)?)?;
        assert_eq!(path, "/acquisition/ElectricalSeries");

        let attributes = file.group_attributes(&path)?;
        assert_eq!(attributes["neurodata_type"], "ElectricalSeries");
        assert_eq!(attributes["description"], "no description");

        let dataset = file.dataset("/acquisition/ElectricalSeries/data")?;
        assert_eq!(dataset.attributes()["conversion"], 1e-6);
        assert_eq!(dataset.attributes()["unit"], "volts");
        assert_eq!(dataset.data_type(), DataType::Int16);
        assert_eq!(dataset.retrieve_array_ndarray::<i16>()?, data);

        let electrodes = file.dataset("/acquisition/ElectricalSeries/electrodes")?;
        let electrodes = electrodes.retrieve_array_ndarray::<u64>()?;
        assert_eq!(electrodes.as_slice(), Some([0, 1, 2].as_slice()));

        let timestamps = file.timestamps(&path)?;
        assert_eq!(timestamps.len(), 25);
        assert_eq!(timestamps[0], 0.5);
        assert!((timestamps[10] - 0.51).abs() < 1e-12);

        assert!(matches!(
            file.add_acquisition(&series, iterator(&data)?),
            Err(NwbError::NodeExists(_))
        ));
        Ok(())
    }

    #[test]
    fn nwb_timestamps_and_processing() -> Result<(), Box<dyn Error>> {
        let file = file()?;
        let timestamps: Vec<f64> = (0..20).map(|i| f64::from(i * i)).collect();
        let series = TimeSeries::new(
            "Fluorescence",
            SeriesType::TimeSeries,
            SeriesTiming::from_timestamps(timestamps.clone()),
        );
        let data = traces(20, 2)?;
        assert!(matches!(
            file.add_to_processing_module("ophys", &series, iterator(&data)?),
            Err(NwbError::MissingGroup(_))
        ));
        file.create_processing_module("ophys", "optical physiology")?;
        let path = file.add_to_processing_module("ophys", &series, iterator(&data)?)?;
        assert_eq!(path, "/processing/ophys/Fluorescence");
        assert_eq!(
            file.group_attributes("/processing/ophys")?["neurodata_type"],
            "ProcessingModule"
        );
        assert_eq!(file.timestamps(&path)?, timestamps);
        Ok(())
    }

    #[test]
    fn nwb_invalid_series() -> Result<(), Box<dyn Error>> {
        let file = file()?;
        let data = traces(20, 2)?;
        let electrodes = TimeSeries::new(
            "ElectricalSeries",
            SeriesType::ElectricalSeries {
                electrodes: vec![0],
            },
            SeriesTiming::Rate {
                rate: 1.0,
                starting_time: 0.0,
            },
        );
        assert!(matches!(
            file.add_acquisition(&electrodes, iterator(&data)?),
            Err(NwbError::InvalidSeries { .. })
        ));
        let timestamps = TimeSeries::new(
            "TimeSeries",
            SeriesType::TimeSeries,
            SeriesTiming::Timestamps(vec![0.0, 1.0, 3.0]),
        );
        assert!(matches!(
            file.add_acquisition(&timestamps, iterator(&data)?),
            Err(NwbError::InvalidSeries { .. })
        ));
        let movie = TimeSeries::new(
            "Movie",
            SeriesType::ImageSeries,
            SeriesTiming::Rate {
                rate: 30.0,
                starting_time: 0.0,
            },
        );
        assert!(matches!(
            file.add_acquisition(&movie, iterator(&data)?),
            Err(NwbError::InvalidSeries { .. })
        ));
        // Nothing is written for a rejected series
        assert!(!node_exists(&**file.storage(), "/acquisition/ElectricalSeries")?);
        Ok(())
    }

    #[test]
    fn nwb_external_image_series() -> Result<(), Box<dyn Error>> {
        let file = file()?;
        let series = TimeSeries::new(
            "BehaviorMovie",
            SeriesType::ImageSeries,
            SeriesTiming::Rate {
                rate: 30.0,
                starting_time: 0.0,
            },
        );
        let external_file = vec!["a.avi".to_string(), "b.avi".to_string()];
        let path = file.add_external_image_series(&series, &external_file, &[0, 300])?;
        let attributes = file.group_attributes(&path)?;
        assert_eq!(attributes["format"], "external");
        assert_eq!(attributes["external_file"], json!(["a.avi", "b.avi"]));
        let starting_frame = file.dataset(&format!("{path}/starting_frame"))?;
        let starting_frame = starting_frame.retrieve_array_ndarray::<u64>()?;
        assert_eq!(starting_frame.as_slice(), Some([0, 300].as_slice()));
        assert!(matches!(
            file.add_external_image_series(
                &TimeSeries::new("Other", SeriesType::ImageSeries, series.timing().clone()),
                &external_file,
                &[0]
            ),
            Err(NwbError::InvalidSeries { .. })
        ));
        Ok(())
    }
}
