use itertools::{EitherOrBoth::*, Itertools};
use std::cmp::max;

use super::error::{Result, TensorError};

/// Walks every index of a shape in row-major order.
///
/// A scalar shape `[]` yields the single empty index, a shape with a zero
/// dimension yields nothing.
pub struct IndexIterator {
    index: Vec<usize>,
    dimensions: Vec<usize>,
    first: bool,
    exhausted: bool,
}

impl IndexIterator {
    pub fn new(dimensions: Vec<usize>) -> IndexIterator {
        IndexIterator {
            index: vec![0; dimensions.len()],
            first: true,
            exhausted: dimensions.contains(&0),
            dimensions,
        }
    }
}

impl Iterator for IndexIterator {
    type Item = Vec<usize>;
    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }
        if self.first {
            self.first = false;
        } else if !increment_index(&mut self.index, &self.dimensions) {
            self.exhausted = true;
            return None;
        }
        Some(self.index.clone())
    }
}

pub fn increment_index(index: &mut [usize], shape: &[usize]) -> bool {
    for i in (0..index.len()).rev() {
        if index[i] + 1 < shape[i] {
            index[i] += 1;
            reset_trailing_indices(index, i);
            return true;
        }
    }
    false
}

fn reset_trailing_indices(index: &mut [usize], position: usize) {
    for idx in index.iter_mut().skip(position + 1) {
        *idx = 0;
    }
}

/// The shape two tensors broadcast to, aligning trailing dimensions.
/// `None` when a pair of dimensions differs and neither is 1.
pub fn broadcast_shape(left: &[usize], right: &[usize]) -> Option<Vec<usize>> {
    let mut shape = Vec::with_capacity(max(left.len(), right.len()));
    for pair in left.iter().rev().zip_longest(right.iter().rev()) {
        let dim = match pair {
            Both(&l, &r) if l == r || r == 1 => l,
            Both(&l, &r) if l == 1 => r,
            Both(_, _) => return None,
            Left(&l) => l,
            Right(&r) => r,
        };
        shape.push(dim);
    }
    shape.reverse();
    Some(shape)
}

/// Flat offset of `index` into a tensor of `shape`, where `index` may come from a
/// larger broadcast shape: missing leading dims and size-1 dims read element 0.
pub(in crate::tensor) fn broadcast_offset(index: &[usize], shape: &[usize]) -> usize {
    let mut offset = 0;
    let mut stride = 1;
    for (&idx, &dim) in index.iter().rev().zip(shape.iter().rev()) {
        if dim != 1 {
            offset += idx * stride;
        }
        stride *= dim;
    }
    offset
}

/// Strict flat offset: `index` must have one in-bounds entry per dimension.
pub(in crate::tensor) fn flat_offset(index: &[usize], shape: &[usize]) -> Result<usize> {
    let out_of_bounds = || TensorError::IndexOutOfBounds {
        index: index.to_vec(),
        shape: shape.to_vec(),
    };
    if index.len() != shape.len() {
        return Err(out_of_bounds());
    }
    let mut offset = 0;
    for (&idx, &dim) in index.iter().zip(shape.iter()) {
        if idx >= dim {
            return Err(out_of_bounds());
        }
        offset = offset * dim + idx;
    }
    Ok(offset)
}

#[test]
fn test_increment_index() {
    let mut index = vec![0, 0, 0];
    let dimensions = vec![2, 3, 2];
    let indices = vec![
        [0, 0, 1].to_vec(),
        [0, 1, 0].to_vec(),
        [0, 1, 1].to_vec(),
        [0, 2, 0].to_vec(),
        [0, 2, 1].to_vec(),
        [1, 0, 0].to_vec(),
        [1, 0, 1].to_vec(),
        [1, 1, 0].to_vec(),
        [1, 1, 1].to_vec(),
        [1, 2, 0].to_vec(),
        [1, 2, 1].to_vec(),
    ];
    for expected_idx in indices.into_iter() {
        let valid = increment_index(&mut index, &dimensions);
        assert!(valid);
        assert_eq!(index, expected_idx);
    }
    assert!(!increment_index(&mut index, &dimensions));
}

#[test]
fn test_index_iterator() {
    let index_iter = IndexIterator::new(vec![2, 2, 2]);
    assert_eq!(
        index_iter.collect::<Vec<_>>(),
        vec![
            [0, 0, 0].to_vec(),
            [0, 0, 1].to_vec(),
            [0, 1, 0].to_vec(),
            [0, 1, 1].to_vec(),
            [1, 0, 0].to_vec(),
            [1, 0, 1].to_vec(),
            [1, 1, 0].to_vec(),
            [1, 1, 1].to_vec(),
        ]
    );
}

#[test]
fn test_index_iterator_edge_shapes() {
    assert_eq!(
        IndexIterator::new(vec![]).collect::<Vec<_>>(),
        vec![Vec::<usize>::new()]
    );
    assert_eq!(IndexIterator::new(vec![3, 0]).count(), 0);
    assert_eq!(IndexIterator::new(vec![0, 3]).count(), 0);
    assert_eq!(IndexIterator::new(vec![2, 0, 4]).count(), 0);
    assert_eq!(IndexIterator::new(vec![1]).count(), 1);

    let mut iter = IndexIterator::new(vec![2]);
    assert_eq!(iter.by_ref().count(), 2);
    assert_eq!(iter.next(), None);
}

#[test]
fn test_broadcast_shape() {
    assert_eq!(broadcast_shape(&[4], &[4]), Some(vec![4]));
    assert_eq!(broadcast_shape(&[], &[2, 3]), Some(vec![2, 3]));
    assert_eq!(broadcast_shape(&[1, 3], &[2, 1]), Some(vec![2, 3]));
    assert_eq!(broadcast_shape(&[4, 4], &[2, 4, 4]), Some(vec![2, 4, 4]));
    assert_eq!(broadcast_shape(&[4], &[3]), None);
    assert_eq!(broadcast_shape(&[2, 3], &[3, 3]), None);
}

#[test]
fn test_broadcast_offset() {
    // [2, 3] row-major
    assert_eq!(broadcast_offset(&[1, 2], &[2, 3]), 5);
    // [1, 3] broadcast along the first axis
    assert_eq!(broadcast_offset(&[1, 2], &[1, 3]), 2);
    // scalar
    assert_eq!(broadcast_offset(&[1, 2], &[]), 0);
    // missing leading dim
    assert_eq!(broadcast_offset(&[4, 1, 2], &[2, 3]), 5);
}

#[test]
fn test_flat_offset() {
    assert_eq!(flat_offset(&[2, 2, 3], &[3, 3, 4]).unwrap(), 35);
    assert_eq!(flat_offset(&[], &[]).unwrap(), 0);
    assert!(flat_offset(&[0, 3], &[3, 3]).is_err());
    assert!(flat_offset(&[0], &[3, 3]).is_err());
}
