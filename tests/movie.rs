use std::{error::Error, path::Path, sync::Arc};

use ndarray::{Array, ArrayD, Axis};
use nwbconv::{
    data_chunk_iterator::{BufferSpec, ChunkSpec, DataChunkIterator, DataChunkIteratorOptions},
    dataset::{Compression, DatasetBuilder},
    sources::{
        write_raw_video, MovieDataChunkSource, MovieReadMode, RawVideoReader, VideoCaptureContext,
    },
    storage::store::MemoryStore,
};

const FRAME_SHAPE: [usize; 3] = [100, 200, 3];

fn frames(num_frames: usize) -> ArrayD<u8> {
    let shape = [num_frames, FRAME_SHAPE[0], FRAME_SHAPE[1], FRAME_SHAPE[2]];
    #[allow(clippy::cast_possible_truncation)]
    Array::from_shape_fn(shape, |(f, y, x, c)| (f * 7 + y + x * 3 + c) as u8).into_dyn()
}

fn movie_source(
    path: &Path,
    stub: bool,
) -> Result<MovieDataChunkSource<RawVideoReader<u8>>, Box<dyn Error>> {
    let reader = RawVideoReader::<u8>::open(path, vec![100, 200, 3], 30.0)?;
    let context = VideoCaptureContext::new_with_stub(reader, stub)?;
    Ok(MovieDataChunkSource::new(context)?)
}

#[test]
fn movie_yields_one_chunk_per_frame() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movie.raw");
    let frames = frames(30);
    write_raw_video(&path, &frames.view())?;

    let iterator = DataChunkIterator::new(movie_source(&path, false)?)?;
    assert_eq!(iterator.maxshape(), &[30, 100, 200, 3]);
    assert_eq!(iterator.chunk_shape(), &[1, 100, 200, 3]);
    assert_eq!(iterator.buffer_shape(), &[1, 100, 200, 3]);
    assert_eq!(iterator.num_buffers(), 30);
    assert_eq!(
        iterator.source().read_mode(),
        MovieReadMode::SequentialCursor
    );

    let mut num_chunks = 0;
    for (frame, data_chunk) in iterator.enumerate() {
        let data_chunk = data_chunk?;
        assert_eq!(data_chunk.selection().start(), &[frame as u64, 0, 0, 0]);
        assert_eq!(data_chunk.data().shape(), &[1, 100, 200, 3]);
        assert_eq!(
            data_chunk.data().index_axis(Axis(0), 0),
            frames.index_axis(Axis(0), frame)
        );
        num_chunks += 1;
    }
    assert_eq!(num_chunks, 30);
    Ok(())
}

#[test]
fn movie_stub_truncates_frames() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movie.raw");
    let frames = frames(30);
    write_raw_video(&path, &frames.view())?;

    let iterator = DataChunkIterator::new(movie_source(&path, true)?)?;
    assert_eq!(iterator.maxshape(), &[10, 100, 200, 3]);
    let data_chunks = iterator.collect::<Result<Vec<_>, _>>()?;
    assert_eq!(data_chunks.len(), 10);
    assert_eq!(
        data_chunks[9].data().index_axis(Axis(0), 0),
        frames.index_axis(Axis(0), 9)
    );
    Ok(())
}

#[test]
fn movie_random_access_to_dataset() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movie.raw");
    let frames = frames(7);
    write_raw_video(&path, &frames.view())?;

    let options = DataChunkIteratorOptions::default()
        .with_buffer(BufferSpec::BufferShape(vec![4, 100, 200, 3]))
        .with_chunk(ChunkSpec::ChunkShape(vec![2, 50, 100, 3]));
    let iterator = DataChunkIterator::new_with_options(movie_source(&path, false)?, &options)?;
    assert_eq!(iterator.source().read_mode(), MovieReadMode::RandomAccess);

    let dataset = DatasetBuilder::from_iterator(&iterator)
        .compression(Compression::default())
        .build(Arc::new(MemoryStore::new()), "/movie")?;
    dataset.store_metadata()?;
    let written = dataset.write_data_chunks(iterator)?;
    assert_eq!(written.num_buffers, 2);
    assert_eq!(dataset.retrieve_array_ndarray::<u8>()?, frames);
    Ok(())
}

#[test]
fn movie_context_metadata() -> Result<(), Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("movie.raw");
    write_raw_video(&path, &frames(3).view())?;

    let reader = RawVideoReader::<u8>::open(&path, vec![100, 200, 3], 25.0)?;
    let mut context = VideoCaptureContext::new(reader)?;
    assert_eq!(context.frame_count()?, 3);
    assert_eq!(context.fps()?, 25.0);
    assert_eq!(context.frame_shape()?, vec![100, 200, 3]);
    assert_eq!(context.timestamps()?, vec![0.0, 0.04, 0.08]);
    assert_eq!(context.frame(2)?.shape(), &FRAME_SHAPE);
    assert!(context.frame(3).is_err());
    context.release();
    assert!(context.frame_count().is_err());
    Ok(())
}
