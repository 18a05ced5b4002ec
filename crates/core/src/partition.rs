//! Disjoint, batch-aligned dataset partitioning.
//!
//! Every group produced here has a row count that is an exact multiple of
//! the batch size. Rows that do not fit are dropped rather than padded.

use rand::seq::SliceRandom;
use rand::Rng;

use crate::dataset::Dataset;
use crate::error::{MiaError, Result};

/// Row indices of the two groups produced by one split.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartitionIndices {
    /// Rows taken from the tail of the permutation.
    pub kept: Vec<usize>,
    /// Rows taken from the head of the permutation.
    pub split: Vec<usize>,
}

/// Result of [`split_to_be_divisible`].
#[derive(Clone, Debug)]
pub struct Split {
    /// The larger remainder group (for example the target pool).
    pub kept: Dataset,
    /// The `fraction` group (for example the shadow pool).
    pub split: Dataset,
    /// Source row indices for both groups.
    pub indices: PartitionIndices,
}

/// Group sizes `(kept, split)` for `total` rows.
///
/// `split = floor(total * fraction)` rounded down to a multiple of
/// `batch_size`; `kept` is the remaining row count, rounded down likewise.
pub fn partition_sizes(total: usize, fraction: f64, batch_size: usize) -> (usize, usize) {
    if batch_size == 0 {
        return (0, 0);
    }
    let raw = (total as f64 * fraction).floor() as usize;
    let split = raw - raw % batch_size;
    let rest = total - split;
    let kept = rest - rest % batch_size;
    (kept, split)
}

fn validate(fraction: f64, batch_size: usize) -> Result<()> {
    if !fraction.is_finite() || fraction <= 0.0 || fraction >= 1.0 {
        return Err(MiaError::invalid(format!(
            "fraction must be in (0, 1), got {fraction}"
        )));
    }
    if batch_size == 0 {
        return Err(MiaError::invalid("batch_size must be positive"));
    }
    Ok(())
}

/// Draw one permutation of `0..total` and carve out both groups.
///
/// The split group is the first `split` permuted indices and the kept group
/// is the last `kept` permuted indices. When `batch_size > total` both
/// groups are empty.
pub fn permutation_split<R: Rng + ?Sized>(
    total: usize,
    fraction: f64,
    batch_size: usize,
    rng: &mut R,
) -> Result<PartitionIndices> {
    validate(fraction, batch_size)?;
    let (kept_count, split_count) = partition_sizes(total, fraction, batch_size);

    let mut permuted: Vec<usize> = (0..total).collect();
    permuted.shuffle(rng);

    let split = permuted[..split_count].to_vec();
    let kept = permuted[total - kept_count..].to_vec();
    Ok(PartitionIndices { kept, split })
}

/// Split a dataset into two disjoint groups sized to multiples of `batch_size`.
pub fn split_to_be_divisible<R: Rng + ?Sized>(
    dataset: &Dataset,
    fraction: f64,
    batch_size: usize,
    rng: &mut R,
) -> Result<Split> {
    let indices = permutation_split(dataset.len(), fraction, batch_size, rng)?;
    tracing::debug!(
        total = dataset.len(),
        kept = indices.kept.len(),
        split = indices.split.len(),
        dropped = dataset.len() - indices.kept.len() - indices.split.len(),
        "partitioned dataset"
    );
    Ok(Split {
        kept: dataset.select(&indices.kept),
        split: dataset.select(&indices.split),
        indices,
    })
}

/// Draw pairwise-disjoint index groups of the requested sizes, without
/// replacement, from `0..total`.
pub fn sample_disjoint<R: Rng + ?Sized>(
    total: usize,
    sizes: &[usize],
    rng: &mut R,
) -> Result<Vec<Vec<usize>>> {
    let requested: usize = sizes.iter().sum();
    if requested > total {
        return Err(MiaError::insufficient("disjoint sample", requested, total));
    }
    let drawn = rand::seq::index::sample(rng, total, requested).into_vec();
    let mut groups = Vec::with_capacity(sizes.len());
    let mut start = 0usize;
    for &size in sizes {
        groups.push(drawn[start..start + size].to_vec());
        start += size;
    }
    Ok(groups)
}
