use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::{rngs::StdRng, Rng, SeedableRng};

pub const KMEANS_SEED: u64 = 42;
const N_INIT: usize = 4;
const MAX_ITER: usize = 300;

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub assignments: Vec<usize>,
    pub centroids: Array2<f64>,
    pub inertia: f64,
}

/// Column-wise z-score using the population variance. Zero variance columns
/// become all zeros.
pub fn standardize(data: &Array2<f64>) -> Array2<f64> {
    let mut out = data.clone();
    let n = data.nrows();
    if n == 0 {
        return out;
    }
    for mut column in out.axis_iter_mut(Axis(1)) {
        let mean = column.sum() / n as f64;
        let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();
        column.mapv_inplace(|v| if std > 0.0 { (v - mean) / std } else { 0.0 });
    }
    out
}

fn squared_distance(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: ArrayView1<f64>, centroids: &Array2<f64>) -> (usize, f64) {
    centroids
        .outer_iter()
        .enumerate()
        .map(|(idx, c)| (idx, squared_distance(point, c)))
        .fold((0, f64::INFINITY), |best, cur| if cur.1 < best.1 { cur } else { best })
}

/// k-means++ seeding.
fn init_plusplus(data: &Array2<f64>, k: usize, rng: &mut StdRng) -> Array2<f64> {
    let n = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));
    centroids.row_mut(0).assign(&data.row(rng.gen_range(0..n)));

    let mut min_dist: Array1<f64> = data
        .outer_iter()
        .map(|p| squared_distance(p, centroids.row(0)))
        .collect();

    for c in 1..k {
        let total = min_dist.sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = n - 1;
            for (idx, d) in min_dist.iter().enumerate() {
                if target < *d {
                    chosen = idx;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            // Every point already sits on a centroid
            rng.gen_range(0..n)
        };
        centroids.row_mut(c).assign(&data.row(chosen));
        for (idx, p) in data.outer_iter().enumerate() {
            min_dist[idx] = min_dist[idx].min(squared_distance(p, centroids.row(c)));
        }
    }
    centroids
}

fn lloyd(data: &Array2<f64>, mut centroids: Array2<f64>) -> KMeansResult {
    let k = centroids.nrows();
    let mut assignments = vec![usize::MAX; data.nrows()];

    for _ in 0..MAX_ITER {
        let mut changed = false;
        for (idx, p) in data.outer_iter().enumerate() {
            let (cluster, _) = nearest(p, &centroids);
            if assignments[idx] != cluster {
                assignments[idx] = cluster;
                changed = true;
            }
        }
        if !changed {
            break;
        }

        let mut sums = Array2::<f64>::zeros(centroids.raw_dim());
        let mut counts = vec![0usize; k];
        for (p, &cluster) in data.outer_iter().zip(assignments.iter()) {
            let mut row = sums.row_mut(cluster);
            row += &p;
            counts[cluster] += 1;
        }
        for (cluster, count) in counts.into_iter().enumerate() {
            // Empty clusters keep their previous centroid
            if count > 0 {
                let mean = &sums.row(cluster) / count as f64;
                centroids.row_mut(cluster).assign(&mean);
            }
        }
    }

    let inertia = data
        .outer_iter()
        .zip(assignments.iter())
        .map(|(p, &cluster)| squared_distance(p, centroids.row(cluster)))
        .sum();
    KMeansResult {
        assignments,
        centroids,
        inertia,
    }
}

/// Lloyd k-means with k-means++ seeding, keeping the best of a few
/// restarts. Deterministic for a given `seed`.
///
/// `k` is clamped to `[1, n]`. Empty input yields no assignments.
pub fn kmeans(data: &Array2<f64>, k: usize, seed: u64) -> KMeansResult {
    let n = data.nrows();
    if n == 0 {
        return KMeansResult {
            assignments: Vec::new(),
            centroids: Array2::zeros((0, data.ncols())),
            inertia: 0.0,
        };
    }
    let k = k.clamp(1, n);
    let mut rng = StdRng::seed_from_u64(seed);

    let mut best: Option<KMeansResult> = None;
    for _ in 0..N_INIT {
        let run = lloyd(data, init_plusplus(data, k, &mut rng));
        if best.as_ref().map_or(true, |b| run.inertia < b.inertia) {
            best = Some(run);
        }
    }
    best.unwrap_or_else(|| lloyd(data, init_plusplus(data, k, &mut rng)))
}
