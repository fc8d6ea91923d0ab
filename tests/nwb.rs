use std::{error::Error, sync::Arc};

use ndarray::{Array, Array2, ArrayD};
use nwbconv::{
    data_chunk_iterator::{BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions},
    dataset::Compression,
    nwb::{NwbFile, NwbFileMetadata, SeriesTiming, SeriesType, TimeSeries},
    sources::{
        write_raw_video, ArrayImagingExtractor, ImagingDataChunkSource, MovieDataChunkSource,
        RawVideoReader, SliceableDataChunkSource, VideoCaptureContext,
    },
    storage::{
        node_exists,
        store::{FilesystemStore, MemoryStore},
    },
};

fn metadata() -> NwbFileMetadata {
    NwbFileMetadata {
        identifier: "b7f3d0c2".to_string(),
        session_description: "open field with two-photon imaging".to_string(),
        session_start_time: "2024-03-05T14:30:00+01:00".to_string(),
    }
}

#[test]
fn nwb_file_on_disk() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let store = Arc::new(FilesystemStore::new(dir.path().join("session.nwb.zarr"))?);
    let file = NwbFile::create(store.clone(), metadata())?;

    // Electrophysiology
    #[allow(clippy::cast_possible_truncation)]
    let traces = Array2::from_shape_fn((3000, 8), |(f, c)| ((f * 8 + c) % 4096) as i16).into_dyn();
    let iterator = DataChunkIterator::new_with_options(
        SliceableDataChunkSource::new(&traces),
        &DataChunkIteratorOptions::default()
            .with_buffer(BufferSpec::BufferShape(vec![1000, 8]))
            .with_chunk(ChunkSpec::ChunkShape(vec![500, 8])),
    )?;
    assert_eq!(iterator.num_buffers(), 3);
    let ecephys = TimeSeries::new(
        "ElectricalSeriesRaw",
        SeriesType::ElectricalSeries {
            electrodes: (0..8).collect(),
        },
        SeriesTiming::from_timestamps((0..3000).map(|i| f64::from(i) / 30_000.0).collect()),
    )
    .with_conversion(0.195e-6)
    .with_compression(Compression::Zstd { level: 3 });
    let ecephys_path = file.add_acquisition(&ecephys, iterator)?;

    // Behaviour movie
    let movie_path = dir.path().join("behavior.raw");
    #[allow(clippy::cast_possible_truncation)]
    let frames =
        Array::from_shape_fn((12, 16, 24, 3), |(f, y, x, c)| (f + y + x + c) as u8).into_dyn();
    write_raw_video(&movie_path, &frames.view())?;
    let reader = RawVideoReader::<u8>::open(&movie_path, vec![16, 24, 3], 30.0)?;
    let context = VideoCaptureContext::new(reader)?;
    let timestamps = context.timestamps()?;
    let movie = MovieDataChunkSource::new(context)?;
    let behavior = TimeSeries::new(
        "BehaviorMovie",
        SeriesType::ImageSeries,
        SeriesTiming::from_timestamps(timestamps),
    );
    let movie_series_path = file.add_acquisition(&behavior, DataChunkIterator::new(movie)?)?;

    // Imaging
    #[allow(clippy::cast_possible_truncation)]
    let video: ArrayD<u16> =
        Array::from_shape_fn((20, 6, 10), |(t, y, x)| (t * 100 + y * 10 + x) as u16).into_dyn();
    let imaging = ImagingDataChunkSource::new(ArrayImagingExtractor::new(video.clone(), 15.0)?);
    file.create_processing_module("ophys", "optical physiology processed data")?;
    let two_photon = TimeSeries::new(
        "TwoPhotonSeries",
        SeriesType::TwoPhotonSeries {
            imaging_plane: "ImagingPlane".to_string(),
        },
        SeriesTiming::Rate {
            rate: 15.0,
            starting_time: 0.0,
        },
    );
    let ophys_path =
        file.add_to_processing_module("ophys", &two_photon, DataChunkIterator::new(imaging)?)?;
    drop(file);

    // Reopen from disk
    assert!(dir.path().join("session.nwb.zarr/zarr.json").is_file());
    assert!(dir
        .path()
        .join("session.nwb.zarr/acquisition/ElectricalSeriesRaw/data/zarr.json")
        .is_file());
    let file = NwbFile::open(Arc::new(FilesystemStore::new(dir.path().join("session.nwb.zarr"))?))?;
    assert_eq!(file.metadata(), &metadata());

    let data = file.dataset(&format!("{ecephys_path}/data"))?;
    assert_eq!(data.compression(), Compression::Zstd { level: 3 });
    assert_eq!(data.chunk_shape(), &[500, 8]);
    assert_eq!(data.retrieve_array_ndarray::<i16>()?, traces);
    // Regular timestamps are stored as a rate
    assert!(node_exists(&**file.storage(), &format!("{ecephys_path}/starting_time"))?);
    assert!(!node_exists(&**file.storage(), &format!("{ecephys_path}/timestamps"))?);
    let starting_time = file.dataset(&format!("{ecephys_path}/starting_time"))?;
    let rate = starting_time.attributes()["rate"].as_f64();
    assert!((rate.unwrap_or_default() - 30_000.0).abs() < 1e-6);

    let data = file.dataset(&format!("{movie_series_path}/data"))?;
    assert_eq!(data.chunk_shape(), &[1, 16, 24, 3]);
    assert_eq!(data.retrieve_array_ndarray::<u8>()?, frames);
    assert_eq!(file.timestamps(&movie_series_path)?.len(), 12);

    assert_eq!(
        file.group_attributes(&ophys_path)?["imaging_plane"],
        "ImagingPlane"
    );
    let data = file.dataset(&format!("{ophys_path}/data"))?;
    assert_eq!(data.shape(), &[20, 10, 6]);
    assert_eq!(
        data.retrieve_array_ndarray::<u16>()?,
        video.permuted_axes(vec![0, 2, 1])
    );
    Ok(())
}

#[test]
fn nwb_failed_iterator_reports_selection() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let movie_path = dir.path().join("behavior.raw");
    write_raw_video(&movie_path, &ArrayD::<u8>::zeros(vec![5, 4, 4]).view())?;
    let reader = RawVideoReader::<u8>::open(&movie_path, vec![4, 4], 30.0)?;
    let mut context = VideoCaptureContext::new(reader)?;
    // Claim more frames than the file holds
    context.set_frame_count(8);
    let movie = MovieDataChunkSource::new(context)?;

    let file = NwbFile::create(Arc::new(MemoryStore::new()), metadata())?;
    let behavior = TimeSeries::new(
        "BehaviorMovie",
        SeriesType::ImageSeries,
        SeriesTiming::Rate {
            rate: 30.0,
            starting_time: 0.0,
        },
    );
    let options = DataChunkIteratorOptions::default()
        .with_buffer(BufferSpec::BufferShape(vec![1, 4, 4]));
    let iterator = DataChunkIterator::new_with_options(movie, &options)?;
    let error = file
        .add_acquisition(&behavior, iterator)
        .err()
        .map(|error| error.to_string())
        .unwrap_or_default();
    assert!(error.contains("(5..6, 0..4, 0..4)"), "{error}");
    assert!(error.contains("end of stream"), "{error}");
    Ok(())
}
