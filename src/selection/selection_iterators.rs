mod buffer_tiles_iterator;
mod chunks_iterator;
mod indices_iterator;

pub use buffer_tiles_iterator::BufferTilesIterator;
pub use chunks_iterator::ChunksIterator;
pub use indices_iterator::IndicesIterator;

#[cfg(test)]
mod tests {
    use crate::selection::Selection;

    #[test]
    fn selection_iter_indices() {
        let selection = Selection::new_with_ranges(&[1..3, 1..3]);
        let mut iter = selection.iter_indices();
        assert_eq!(iter.size_hint(), (4, Some(4)));
        assert_eq!(iter.next(), Some(vec![1, 1]));
        assert_eq!(iter.next(), Some(vec![1, 2]));
        assert_eq!(iter.size_hint(), (2, Some(2)));
        assert_eq!(iter.next(), Some(vec![2, 1]));
        assert_eq!(iter.next(), Some(vec![2, 2]));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn selection_iter_indices_empty() {
        let selection = Selection::new_with_ranges(&[1..3, 1..1]);
        let mut iter = selection.iter_indices();
        assert_eq!(iter.size_hint(), (0, Some(0)));
        assert_eq!(iter.next(), None);
    }

    #[test]
    fn selection_iter_chunks() {
        let selection = Selection::new_with_ranges(&[1..5, 1..5]);
        assert!(selection.iter_chunks(&[2]).is_err());
        assert!(selection.iter_chunks(&[2, 0]).is_err());
        let mut iter = selection.iter_chunks(&[2, 2]).unwrap();
        assert_eq!(iter.size_hint(), (9, Some(9)));
        assert_eq!(
            iter.next(),
            Some((vec![0, 0], Selection::new_with_ranges(&[0..2, 0..2])))
        );
        assert_eq!(
            iter.next(),
            Some((vec![0, 1], Selection::new_with_ranges(&[0..2, 2..4])))
        );
        assert_eq!(
            iter.next(),
            Some((vec![0, 2], Selection::new_with_ranges(&[0..2, 4..6])))
        );
        assert_eq!(
            iter.next(),
            Some((vec![1, 0], Selection::new_with_ranges(&[2..4, 0..2])))
        );
        assert_eq!(iter.count(), 5);
    }

    #[test]
    fn selection_iter_chunks_empty() {
        let selection = Selection::new_with_ranges(&[0..0, 0..5]);
        let iter = selection.iter_chunks(&[2, 2]).unwrap();
        assert_eq!(iter.count(), 0);
    }
}
