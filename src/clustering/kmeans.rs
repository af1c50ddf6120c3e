//! Mini-batch k-means.
//!
//! Centres are seeded with k-means++ on a random sample, then refined with
//! small random batches where each centre moves toward its members with a
//! learning rate of `1 / count`. Training stops after `max_iter` passes over
//! the data, or earlier once the smoothed batch inertia stops improving.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::utils::squared_distance;

/// Fitted cluster centres.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KMeansModel {
    pub centers: Vec<Vec<f32>>,
}

impl KMeansModel {
    pub fn n_clusters(&self) -> usize {
        self.centers.len()
    }

    /// Index of the closest centre and the squared distance to it.
    pub fn nearest(&self, point: &[f32]) -> (usize, f32) {
        nearest_center(&self.centers, point)
    }

    /// Assigns every point to its closest centre.
    pub fn predict(&self, data: &[Vec<f32>]) -> Vec<usize> {
        data.par_iter().map(|p| self.nearest(p).0).collect()
    }

    /// Sum of squared distances from each point to its closest centre.
    pub fn inertia(&self, data: &[Vec<f32>]) -> f32 {
        data.par_iter().map(|p| self.nearest(p).1).sum()
    }
}

fn nearest_center(centers: &[Vec<f32>], point: &[f32]) -> (usize, f32) {
    let mut best = (0, f32::INFINITY);
    for (idx, center) in centers.iter().enumerate() {
        let dist = squared_distance(center, point);
        if dist < best.1 {
            best = (idx, dist);
        }
    }
    best
}

#[derive(Debug, Clone)]
pub struct MiniBatchKMeans {
    pub n_clusters: usize,
    pub batch_size: usize,
    /// Passes over the full data set.
    pub max_iter: usize,
    pub seed: u64,
    /// Consecutive batches without inertia improvement before stopping.
    pub max_no_improvement: usize,
    /// Mean squared centre shift below which training stops; 0 disables.
    pub tol: f32,
}

impl Default for MiniBatchKMeans {
    fn default() -> Self {
        Self {
            n_clusters: 50,
            batch_size: 1000,
            max_iter: 100,
            seed: 42,
            max_no_improvement: 10,
            tol: 0.0,
        }
    }
}

impl MiniBatchKMeans {
    pub fn new(n_clusters: usize) -> Self {
        Self {
            n_clusters,
            ..Self::default()
        }
    }

    /// Fits the centres and returns the label of every input point.
    pub fn fit_predict(&self, data: &[Vec<f32>]) -> AppResult<(Vec<usize>, KMeansModel)> {
        let model = self.fit(data)?;
        let labels = model.predict(data);
        Ok((labels, model))
    }

    pub fn fit(&self, data: &[Vec<f32>]) -> AppResult<KMeansModel> {
        self.train(data).map(|(model, _)| model)
    }

    /// Fits the centres and returns how many mini-batch steps ran.
    fn train(&self, data: &[Vec<f32>]) -> AppResult<(KMeansModel, usize)> {
        let dim = validate_input(data)?;
        if self.n_clusters == 0 {
            return Err(AppError::BadRequest(
                "Number of clusters must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(AppError::BadRequest(
                "Batch size must be at least 1".to_string(),
            ));
        }

        let n = data.len();
        let k = if self.n_clusters > n {
            tracing::warn!(
                requested = self.n_clusters,
                samples = n,
                "More clusters requested than samples, clamping"
            );
            n
        } else {
            self.n_clusters
        };

        let mut rng = StdRng::seed_from_u64(self.seed);

        let init_size = (3 * self.batch_size).max(k).min(n);
        let sample: Vec<&[f32]> = rand::seq::index::sample(&mut rng, n, init_size)
            .into_iter()
            .map(|i| data[i].as_slice())
            .collect();
        let mut centers = kmeans_plus_plus(&sample, k, &mut rng);

        let batch_size = self.batch_size.min(n);
        let n_steps = (self.max_iter * n).div_ceil(batch_size);
        let alpha = ((batch_size as f32) * 2.0 / (n as f32 + 1.0)).min(1.0);

        let mut counts = vec![0_u64; k];
        let mut ewa_inertia: Option<f32> = None;
        let mut best_inertia = f32::INFINITY;
        let mut no_improvement = 0;
        let mut steps_run = 0;

        for step in 0..n_steps {
            steps_run = step + 1;
            let batch: Vec<&[f32]> = (0..batch_size)
                .map(|_| data[rng.gen_range(0..n)].as_slice())
                .collect();

            let assignments: Vec<(usize, f32)> = batch
                .par_iter()
                .map(|p| nearest_center(&centers, p))
                .collect();
            let batch_inertia =
                assignments.iter().map(|(_, d)| d).sum::<f32>() / batch_size as f32;

            let previous = centers.clone();
            for (point, (label, _)) in batch.iter().zip(&assignments) {
                counts[*label] += 1;
                let lr = 1.0 / counts[*label] as f32;
                for (c, x) in centers[*label].iter_mut().zip(point.iter()) {
                    *c += lr * (x - *c);
                }
            }

            let shift = previous
                .iter()
                .zip(&centers)
                .map(|(old, new)| squared_distance(old, new))
                .sum::<f32>()
                / (k * dim) as f32;

            let smoothed = ewa_inertia.map_or(batch_inertia, |ewa| {
                ewa.mul_add(1.0 - alpha, batch_inertia * alpha)
            });
            ewa_inertia = Some(smoothed);

            if self.tol > 0.0 && shift <= self.tol {
                tracing::debug!(step, shift, "Converged on centre shift");
                break;
            }

            if smoothed < best_inertia {
                best_inertia = smoothed;
                no_improvement = 0;
            } else {
                no_improvement += 1;
            }
            if no_improvement >= self.max_no_improvement {
                tracing::debug!(step, ewa_inertia = smoothed, "Converged on smoothed inertia");
                break;
            }
        }

        tracing::info!(
            clusters = k,
            samples = n,
            steps = steps_run,
            max_steps = n_steps,
            "Mini-batch k-means finished"
        );

        Ok((KMeansModel { centers }, steps_run))
    }
}

fn validate_input(data: &[Vec<f32>]) -> AppResult<usize> {
    let Some(first) = data.first() else {
        return Err(AppError::BadRequest(
            "Cannot cluster an empty data set".to_string(),
        ));
    };
    let dim = first.len();
    if dim == 0 {
        return Err(AppError::BadRequest(
            "Cannot cluster zero-length vectors".to_string(),
        ));
    }
    if let Some(pos) = data.iter().position(|v| v.len() != dim) {
        return Err(AppError::BadRequest(format!(
            "Inconsistent vector dimensions: row 0 has {dim}, row {pos} has {}",
            data[pos].len()
        )));
    }
    Ok(dim)
}

/// k-means++ seeding: each new centre is drawn with probability proportional
/// to its squared distance from the closest centre chosen so far.
fn kmeans_plus_plus(sample: &[&[f32]], k: usize, rng: &mut StdRng) -> Vec<Vec<f32>> {
    let mut centers = Vec::with_capacity(k);
    centers.push(sample[rng.gen_range(0..sample.len())].to_vec());

    let mut closest: Vec<f32> = sample
        .iter()
        .map(|p| squared_distance(&centers[0], p))
        .collect();

    while centers.len() < k {
        let total: f32 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f32>() * total;
            closest
                .iter()
                .position(|d| {
                    target -= d;
                    target <= 0.0
                })
                .unwrap_or(sample.len() - 1)
        } else {
            // Every sample coincides with a centre already.
            rng.gen_range(0..sample.len())
        };

        let center = sample[chosen].to_vec();
        for (d, p) in closest.iter_mut().zip(sample) {
            *d = d.min(squared_distance(&center, p));
        }
        centers.push(center);
    }

    centers
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Three tight blobs around distinct corners.
    fn blobs() -> Vec<Vec<f32>> {
        let anchors = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let mut data = Vec::new();
        for anchor in anchors {
            for i in 0..20 {
                let jitter = (i as f32) * 0.01;
                data.push(vec![anchor[0] + jitter, anchor[1] - jitter]);
            }
        }
        data
    }

    fn config(k: usize) -> MiniBatchKMeans {
        MiniBatchKMeans {
            n_clusters: k,
            batch_size: 16,
            max_iter: 20,
            ..MiniBatchKMeans::default()
        }
    }

    #[test]
    fn test_default_parameters() {
        let km = MiniBatchKMeans::default();
        assert_eq!(km.n_clusters, 50);
        assert_eq!(km.batch_size, 1000);
        assert_eq!(km.max_iter, 100);
        assert_eq!(km.seed, 42);
    }

    #[test]
    fn test_separates_blobs() {
        let data = blobs();
        let (labels, model) = config(3).fit_predict(&data).unwrap();

        assert_eq!(labels.len(), data.len());
        assert_eq!(model.n_clusters(), 3);
        for blob in labels.chunks(20) {
            assert!(blob.iter().all(|l| *l == blob[0]));
        }
        assert_ne!(labels[0], labels[20]);
        assert_ne!(labels[0], labels[40]);
        assert_ne!(labels[20], labels[40]);
    }

    #[test]
    fn test_same_seed_is_deterministic() {
        let data = blobs();
        let (a, model_a) = config(3).fit_predict(&data).unwrap();
        let (b, model_b) = config(3).fit_predict(&data).unwrap();
        assert_eq!(a, b);
        assert_eq!(model_a, model_b);
    }

    #[test]
    fn test_clamps_clusters_to_samples() {
        let data = vec![vec![0.0, 1.0], vec![1.0, 0.0]];
        let (labels, model) = config(5).fit_predict(&data).unwrap();
        assert_eq!(model.n_clusters(), 2);
        assert_ne!(labels[0], labels[1]);
    }

    #[test]
    fn test_identical_points() {
        let data = vec![vec![1.0, 1.0]; 10];
        let (labels, model) = config(3).fit_predict(&data).unwrap();
        assert_eq!(labels.len(), 10);
        assert!(model.inertia(&data) < 1e-6);
    }

    // ============ 조기 종료 테스트 ============

    #[test]
    fn test_stops_when_inertia_stops_improving() {
        let data = vec![vec![1.0, 1.0]; 10];
        let km = MiniBatchKMeans {
            max_no_improvement: 3,
            ..config(2)
        };
        let (_, steps) = km.train(&data).unwrap();
        // First step sets the best inertia, the next three fail to beat it.
        assert_eq!(steps, 4);
    }

    #[test]
    fn test_stops_on_centre_shift_tolerance() {
        let data = vec![vec![1.0, 1.0]; 10];
        let km = MiniBatchKMeans {
            max_no_improvement: usize::MAX,
            tol: 1e-4,
            ..config(2)
        };
        let (_, steps) = km.train(&data).unwrap();
        assert_eq!(steps, 1);
    }

    #[test]
    fn test_runs_every_step_without_early_stop() {
        let data = blobs();
        let km = MiniBatchKMeans {
            max_no_improvement: usize::MAX,
            ..config(3)
        };
        let (_, steps) = km.train(&data).unwrap();
        // max_iter * n / batch_size = 20 * 60 / 16, rounded up.
        assert_eq!(steps, 75);
    }

    #[test]
    fn test_empty_input_is_error() {
        assert!(matches!(
            config(3).fit_predict(&[]),
            Err(AppError::BadRequest(_))
        ));
    }

    #[test]
    fn test_inconsistent_dimensions_is_error() {
        let data = vec![vec![0.0, 1.0], vec![1.0]];
        assert!(config(1).fit_predict(&data).is_err());
    }

    #[test]
    fn test_zero_clusters_is_error() {
        assert!(config(0).fit_predict(&blobs()).is_err());
    }

    #[test]
    fn test_model_roundtrips_through_json() {
        let model = KMeansModel {
            centers: vec![vec![0.5, -0.5]],
        };
        let json = serde_json::to_string(&model).unwrap();
        assert_eq!(serde_json::from_str::<KMeansModel>(&json).unwrap(), model);
    }
}
