//! Stratified train/test partition over a continuous target

use crate::error::{PipelineError, Result};
use crate::parsing::Dataset;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Fewest rows a dataset may have and still be split meaningfully
pub const MIN_ROWS: usize = 10;

/// Upper bound on the number of target quantile bins
const MAX_BINS: usize = 5;

/// A partition of a dataset's rows into disjoint training and test sets
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    train: Vec<usize>,
    test: Vec<usize>,
    ratio: f64,
    seed: u64,
}

#[derive(Serialize)]
struct Assignment {
    row: usize,
    subset: &'static str,
}

impl Split {
    /// Partition `dataset` so that roughly `ratio` of the rows are used for
    /// training. Rows are binned by target quantile and each bin contributes
    /// proportionally, so both subsets keep the target's distribution.
    pub fn stratified(dataset: &Dataset, ratio: f64, seed: u64) -> Result<Split> {
        if !(ratio > 0.0 && ratio < 1.0) {
            return Err(PipelineError::Configuration(format!(
                "split ratio {} is outside (0, 1)",
                ratio
            )));
        }
        let n = dataset.n_rows();
        if n < MIN_ROWS {
            return Err(PipelineError::Configuration(format!(
                "need at least {} rows to split, got {}",
                MIN_ROWS, n
            )));
        }

        let target = dataset.target();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| target[a].total_cmp(&target[b]).then(a.cmp(&b)));

        let n_bins = (n / 2).clamp(1, MAX_BINS);
        let bins: Vec<&[usize]> = (0..n_bins)
            .map(|b| &order[b * n / n_bins..(b + 1) * n / n_bins])
            .collect();

        let n_train = ((ratio * n as f64).round() as usize).clamp(1, n - 1);
        let quotas = allocate(&bins.iter().map(|b| b.len()).collect::<Vec<_>>(), ratio, n_train);

        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut train = Vec::with_capacity(n_train);
        let mut test = Vec::with_capacity(n - n_train);

        for (bin, quota) in bins.iter().zip(quotas) {
            let mut rows = bin.to_vec();
            rows.shuffle(&mut rng);
            train.extend_from_slice(&rows[..quota]);
            test.extend_from_slice(&rows[quota..]);
        }

        train.sort_unstable();
        test.sort_unstable();

        info!(
            rows = n,
            train = train.len(),
            test = test.len(),
            bins = n_bins,
            seed,
            "split dataset"
        );

        Ok(Split {
            train,
            test,
            ratio,
            seed,
        })
    }

    pub fn train_indices(&self) -> &[usize] {
        &self.train
    }

    pub fn test_indices(&self) -> &[usize] {
        &self.test
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn train_set(&self, dataset: &Dataset) -> Dataset {
        dataset.subset(&self.train)
    }

    pub fn test_set(&self, dataset: &Dataset) -> Dataset {
        dataset.subset(&self.test)
    }

    /// Persist which original row landed in which subset as `row,subset` CSV
    pub fn write_assignments(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)?;
        let mut rows: Vec<Assignment> = self
            .train
            .iter()
            .map(|&row| Assignment {
                row,
                subset: "train",
            })
            .chain(self.test.iter().map(|&row| Assignment {
                row,
                subset: "test",
            }))
            .collect();
        rows.sort_by_key(|a| a.row);

        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;

        Ok(())
    }
}

/// Largest-remainder allocation of `total` training rows across bins
fn allocate(bin_sizes: &[usize], ratio: f64, total: usize) -> Vec<usize> {
    let exact: Vec<f64> = bin_sizes.iter().map(|&s| s as f64 * ratio).collect();
    let mut quotas: Vec<usize> = exact
        .iter()
        .zip(bin_sizes)
        .map(|(e, &s)| (e.floor() as usize).min(s))
        .collect();

    let mut by_remainder: Vec<usize> = (0..bin_sizes.len()).collect();
    by_remainder.sort_by(|&a, &b| {
        let ra = exact[a] - exact[a].floor();
        let rb = exact[b] - exact[b].floor();
        rb.total_cmp(&ra).then(a.cmp(&b))
    });

    let mut assigned: usize = quotas.iter().sum();
    while assigned < total {
        let before = assigned;
        for &b in &by_remainder {
            if assigned == total {
                break;
            }
            if quotas[b] < bin_sizes[b] {
                quotas[b] += 1;
                assigned += 1;
            }
        }
        if assigned == before {
            break;
        }
    }
    while assigned > total {
        let before = assigned;
        for &b in by_remainder.iter().rev() {
            if assigned == total {
                break;
            }
            if quotas[b] > 0 {
                quotas[b] -= 1;
                assigned -= 1;
            }
        }
        if assigned == before {
            break;
        }
    }

    quotas
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{Array1, Array2};

    fn dataset(n: usize) -> Dataset {
        let data = Array2::from_shape_fn((n, 2), |(i, j)| (i * (j + 1)) as f64);
        let target = Array1::from_shape_fn(n, |i| ((i * 7919) % 101) as f64);
        Dataset::new(vec!["a".into(), "b".into()], data, target).unwrap()
    }

    #[test]
    fn rejects_bad_ratio() {
        let ds = dataset(20);
        for ratio in [0.0, 1.0, -0.2, 1.5, f64::NAN] {
            let err = Split::stratified(&ds, ratio, 1).unwrap_err();
            assert!(matches!(err, PipelineError::Configuration(_)));
        }
    }

    #[test]
    fn rejects_tiny_dataset() {
        let err = Split::stratified(&dataset(9), 0.8, 1).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn eighty_twenty() {
        let split = Split::stratified(&dataset(100), 0.8, 101).unwrap();
        assert_eq!(split.train_indices().len(), 80);
        assert_eq!(split.test_indices().len(), 20);
        assert_eq!(split.ratio(), 0.8);
        assert_eq!(split.seed(), 101);
    }

    #[test]
    fn every_bin_is_represented_in_test() {
        let ds = dataset(100);
        let split = Split::stratified(&ds, 0.8, 7).unwrap();
        let target = ds.target();
        let mut sorted: Vec<f64> = target.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));
        let median = sorted[50];

        let low = split.test_indices().iter().filter(|&&i| target[i] < median).count();
        let high = split.test_indices().len() - low;
        assert!(low >= 8 && high >= 8, "low {} high {}", low, high);
    }

    #[test]
    fn allocation_hits_total() {
        assert_eq!(allocate(&[3, 3, 4], 0.5, 5).iter().sum::<usize>(), 5);
        assert_eq!(allocate(&[2, 2, 2, 2, 2], 0.01, 1).iter().sum::<usize>(), 1);
        assert_eq!(allocate(&[2, 2, 2, 2, 2], 0.99, 9).iter().sum::<usize>(), 9);
    }

    #[test]
    fn assignments_round_trip_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("split.csv");
        let split = Split::stratified(&dataset(12), 0.75, 3).unwrap();
        split.write_assignments(&path).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let rows: Vec<(usize, String)> = reader
            .records()
            .map(|r| {
                let r = r.unwrap();
                (r[0].parse().unwrap(), r[1].to_string())
            })
            .collect();

        assert_eq!(rows.len(), 12);
        for (row, subset) in rows {
            let expected = if split.train_indices().contains(&row) { "train" } else { "test" };
            assert_eq!(subset, expected);
        }
    }
}
