use std::{error::Error, sync::Arc};

use ndarray::{Array, ArrayD, Dimension};
use nwbconv::{
    data_chunk_iterator::{BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions},
    dataset::DatasetBuilder,
    sources::{ArrayImagingExtractor, ImagingDataChunkSource, ImagingExtractor},
    storage::store::MemoryStore,
};

/// Frame `t`, row `y`, column `x`, channel `c` holds a value unique to its position.
fn video(shape: &[usize]) -> ArrayD<u16> {
    #[allow(clippy::cast_possible_truncation)]
    Array::from_shape_fn(shape, |index| {
        index
            .slice()
            .iter()
            .fold(0, |value, &i| value * 16 + i as u16)
    })
}

fn write_and_read(
    video: ArrayD<u16>,
    options: &DataChunkIteratorOptions,
) -> Result<ArrayD<u16>, Box<dyn Error>> {
    let imaging = ArrayImagingExtractor::new(video, 15.0)?;
    let source = ImagingDataChunkSource::new(imaging);
    let iterator = DataChunkIterator::new_with_options(source, options)?;
    let dataset =
        DatasetBuilder::from_iterator(&iterator).build(Arc::new(MemoryStore::new()), "/imaging")?;
    dataset.store_metadata()?;
    dataset.write_data_chunks(iterator)?;
    Ok(dataset.retrieve_array_ndarray::<u16>()?)
}

#[test]
fn imaging_round_trip_orientation() -> Result<(), Box<dyn Error>> {
    // 6 frames of 5 rows by 9 columns, so a swapped orientation cannot go unnoticed
    let video = video(&[6, 5, 9]);
    let imaging = ArrayImagingExtractor::new(video.clone(), 15.0)?;
    assert_eq!(imaging.image_size(), (5, 9));
    let options = DataChunkIteratorOptions::default()
        .with_buffer(BufferSpec::BufferShape(vec![2, 9, 5]))
        .with_chunk(ChunkSpec::ChunkShape(vec![1, 3, 5]));
    let stored = write_and_read(video.clone(), &options)?;
    assert_eq!(stored.shape(), &[6, 9, 5]);
    assert_eq!(stored, video.permuted_axes(vec![0, 2, 1]));
    Ok(())
}

#[test]
fn imaging_round_trip_multichannel() -> Result<(), Box<dyn Error>> {
    let video = video(&[4, 3, 7, 2]);
    let stored = write_and_read(video.clone(), &DataChunkIteratorOptions::default())?;
    assert_eq!(stored.shape(), &[4, 7, 3, 2]);
    for t in 0..4 {
        for y in 0..3 {
            for x in 0..7 {
                for c in 0..2 {
                    assert_eq!(stored[[t, x, y, c]], video[[t, y, x, c]]);
                }
            }
        }
    }
    Ok(())
}

#[test]
fn imaging_invalid_video() {
    assert!(ArrayImagingExtractor::new(ArrayD::<u16>::zeros(vec![4, 3]), 15.0).is_err());
    assert!(ArrayImagingExtractor::new(ArrayD::<u16>::zeros(vec![4, 3, 2, 1, 1]), 15.0).is_err());
}
