//! Contiguous, order-preserving batching.

use crate::error::{PipelineError, Result};

/// A contiguous chunk of the input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch<T> {
    /// 0-based offset of the first item in the original collection
    pub start: usize,
    pub items: Vec<T>,
}

impl<T> Batch<T> {
    /// 1-based inclusive range covered by this batch, for progress lines.
    pub fn label(&self) -> String {
        format!("{}-{}", self.start + 1, self.start + self.items.len())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Split `items` into chunks of `size`, the last one holding the remainder.
///
/// Every element lands in exactly one batch and batch order follows input order.
pub fn batches<T: Clone>(items: &[T], size: usize) -> Result<Vec<Batch<T>>> {
    if size == 0 {
        return Err(PipelineError::Input("batch size must be positive".into()));
    }

    Ok(items
        .chunks(size)
        .enumerate()
        .map(|(i, chunk)| Batch {
            start: i * size,
            items: chunk.to_vec(),
        })
        .collect())
}
