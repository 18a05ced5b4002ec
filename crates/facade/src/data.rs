//! Input tables: the adult-income census file and a synthetic stand-in.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};

use mia_privacy_core::{Dataset, MiaError, Result, Scalar};

/// Column names of the adult table, label last.
pub const ADULT_COLUMNS: [&str; 15] = [
    "Age",
    "Workclass",
    "fnlwgt",
    "Education",
    "Education-num",
    "Marital-status",
    "Occupation",
    "Relationship",
    "Race",
    "Sex",
    "Capital-gain",
    "Capital-loss",
    "Hours-per-week",
    "Native-country",
    "Salary",
];

const NUMERIC: [usize; 6] = [0, 2, 4, 10, 11, 12];
const LABEL: usize = 14;

/// Read the adult table from `path`. See [`parse_adult`].
pub fn load_adult(path: impl AsRef<Path>) -> Result<Dataset> {
    let path = path.as_ref();
    let text = fs::read_to_string(path).map_err(|source| MiaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let data = parse_adult(&text)?;
    tracing::info!(path = %path.display(), rows = data.len(), "loaded adult table");
    Ok(data)
}

/// Parse comma-separated adult rows.
///
/// Fields are trimmed. A first line whose `Age` field is not numeric is taken
/// as a header and skipped, as are blank lines. Categorical columns and the
/// `Salary` label are coded by the sorted order of their distinct values.
pub fn parse_adult(text: &str) -> Result<Dataset> {
    let mut rows: Vec<(usize, Vec<&str>)> = Vec::new();
    let mut first = true;
    for (idx, line) in text.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        // Only the first non-blank line may be a header.
        let header = std::mem::take(&mut first) && fields[0].parse::<f64>().is_err();
        if header {
            tracing::debug!(line = line_no, "skipping header");
            continue;
        }
        if fields.len() != ADULT_COLUMNS.len() {
            return Err(MiaError::parse(
                line_no,
                format!("expected {} fields, found {}", ADULT_COLUMNS.len(), fields.len()),
            ));
        }
        rows.push((line_no, fields));
    }

    let mut vocab: BTreeMap<usize, BTreeMap<&str, usize>> = BTreeMap::new();
    for col in (0..ADULT_COLUMNS.len()).filter(|c| !NUMERIC.contains(c)) {
        let distinct: BTreeSet<&str> = rows.iter().map(|(_, f)| f[col]).collect();
        let codes = distinct.into_iter().enumerate().map(|(code, v)| (v, code)).collect();
        vocab.insert(col, codes);
    }

    let width = ADULT_COLUMNS.len() - 1;
    let mut features = Array2::<Scalar>::zeros((rows.len(), width));
    let mut labels = Array1::<usize>::zeros(rows.len());
    for (r, (line_no, fields)) in rows.iter().enumerate() {
        for (col, &raw) in fields.iter().enumerate() {
            let value = match vocab.get(&col) {
                Some(codes) => codes[raw],
                None => {
                    let v = raw.parse::<f64>().map_err(|e| {
                        MiaError::parse(*line_no, format!("{}: {e}", ADULT_COLUMNS[col]))
                    })?;
                    features[[r, col]] = v;
                    continue;
                }
            };
            if col == LABEL {
                labels[r] = value;
            } else {
                features[[r, col]] = value as Scalar;
            }
        }
    }
    Dataset::new(features, labels)
}

/// A learnable two-class table: standard-normal features labeled by the sign
/// of a fixed linear score plus a little label noise.
pub fn synthetic_dataset<R: Rng + ?Sized>(
    rows: usize,
    num_features: usize,
    rng: &mut R,
) -> Result<Dataset> {
    if num_features == 0 {
        return Err(MiaError::invalid("num_features must be positive"));
    }
    let weights: Vec<Scalar> = (0..num_features)
        .map(|j| if j % 2 == 0 { 1.0 } else { -0.5 })
        .collect();
    let mut features = Array2::<Scalar>::zeros((rows, num_features));
    let mut labels = Array1::<usize>::zeros(rows);
    for (mut row, label) in features.rows_mut().into_iter().zip(labels.iter_mut()) {
        row.mapv_inplace(|_| StandardNormal.sample(&mut *rng));
        let noise: Scalar = StandardNormal.sample(rng);
        let score = row.iter().zip(&weights).map(|(x, w)| x * w).sum::<Scalar>() + 0.3 * noise;
        *label = usize::from(score > 0.0);
    }
    Dataset::new(features, labels)
}
