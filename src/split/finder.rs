use crate::store::{DocumentStore, DocumentStream, KeyValue, Range};

use anyhow::{bail, Result};
use std::sync::Arc;

/// How the split boundaries are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplitStrategy {
    /// Read every value of the split field, sorted, and divide by index.
    /// Exact balance, but holds the whole key set in memory; suitable for
    /// small collections only.
    Sample,
    /// Derive a target chunk size from collection statistics and ask the
    /// store for split keys. Scales to large collections; the effective
    /// range count may differ from the request.
    SplitVector,
}

/// Divides a collection into a set of approximately equal ranges of the
/// split field, which tile the key space: the first range is unbounded
/// below, the last unbounded above, and adjacent ranges share a bound.
pub struct SplitFinder {
    store: Arc<dyn DocumentStore>,
    collection: String,
    split_field: String,
    ranges: Vec<Range>,
}

impl SplitFinder {
    pub async fn new(
        store: Arc<dyn DocumentStore>,
        collection: &str,
        split_field: &str,
        num_ranges: usize,
        strategy: SplitStrategy,
    ) -> Result<Self> {
        let boundaries = match strategy {
            SplitStrategy::Sample => {
                Self::sampled_boundaries(&*store, collection, split_field, num_ranges).await?
            }
            SplitStrategy::SplitVector => {
                Self::split_vector_boundaries(&*store, collection, split_field, num_ranges).await?
            }
        };
        Ok(Self {
            store,
            collection: collection.to_string(),
            split_field: split_field.to_string(),
            ranges: Self::tile(boundaries),
        })
    }

    async fn sampled_boundaries(
        store: &dyn DocumentStore,
        collection: &str,
        split_field: &str,
        num_ranges: usize,
    ) -> Result<Vec<KeyValue>> {
        if num_ranges <= 1 {
            return Ok(Vec::new());
        }
        let values = store.project_sorted(collection, split_field).await?;
        if values.is_empty() {
            tracing::debug!("collection '{}' is empty, emitting one range", collection);
            return Ok(Vec::new());
        }
        // A collection smaller than the requested range count cannot fill
        // every range.
        let num_ranges = num_ranges.min(values.len());
        if num_ranges <= 1 {
            return Ok(Vec::new());
        }
        let step = values.len() / num_ranges;
        let mut boundaries = Vec::with_capacity(num_ranges - 1);
        for i in 1..num_ranges {
            let boundary = values[i * step].clone();
            // Repeated key values would produce an empty [x, x) range.
            if boundaries.last() != Some(&boundary) {
                boundaries.push(boundary);
            }
        }
        Ok(boundaries)
    }

    async fn split_vector_boundaries(
        store: &dyn DocumentStore,
        collection: &str,
        split_field: &str,
        num_ranges: usize,
    ) -> Result<Vec<KeyValue>> {
        if num_ranges <= 1 {
            return Ok(Vec::new());
        }
        let stats = store.collection_stats(collection).await?;
        if stats.count == 0 {
            tracing::debug!("collection '{}' is empty, emitting one range", collection);
            return Ok(Vec::new());
        }
        let chunk_size = 2 * stats.count * stats.avg_obj_size / num_ranges as u64;
        let boundaries = store
            .split_vector(collection, split_field, chunk_size.max(1))
            .await?;
        Ok(boundaries)
    }

    /// Builds the tiling from interior boundaries. An empty boundary list
    /// yields the single unbounded range.
    fn tile(boundaries: Vec<KeyValue>) -> Vec<Range> {
        if boundaries.is_empty() {
            return vec![Range::unbounded()];
        }
        let mut ranges = Vec::with_capacity(boundaries.len() + 1);
        let mut lower: Option<KeyValue> = None;
        for boundary in boundaries {
            ranges.push(Range::new(lower.clone(), Some(boundary.clone())));
            lower = Some(boundary);
        }
        ranges.push(Range::new(lower, None));
        ranges
    }

    /// The effective number of ranges, which may differ from the requested
    /// count.
    pub fn num_ranges(&self) -> usize {
        self.ranges.len()
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn lower_bound(&self, num_range: usize) -> Result<&Option<KeyValue>> {
        Ok(&self.range(num_range)?.lower)
    }

    pub fn upper_bound(&self, num_range: usize) -> Result<&Option<KeyValue>> {
        Ok(&self.range(num_range)?.upper)
    }

    fn range(&self, num_range: usize) -> Result<&Range> {
        match self.ranges.get(num_range) {
            Some(range) => Ok(range),
            None => bail!(
                "numRange is {}, must be in range [0..{})",
                num_range,
                self.ranges.len()
            ),
        }
    }

    /// Cursor over the documents of the nth range, ascending by the split
    /// field.
    pub async fn find_range(&self, num_range: usize) -> Result<DocumentStream> {
        let range = self.range(num_range)?.clone();
        let cursor = self
            .store
            .find_range(&self.collection, &self.split_field, &range)
            .await?;
        Ok(cursor)
    }
}
