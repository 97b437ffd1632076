//! Density-based clustering of feature centroids

/// Label of points that belong to no cluster
pub const NOISE: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster id per point, [`NOISE`] for outliers
    pub labels: Vec<i64>,
    /// Points with at least `min_samples` points (themselves included) within `eps`
    pub core_sample_indices: Vec<usize>,
    pub clusters: usize,
}

impl Clustering {
    /// Coordinates of the core samples
    pub fn components(&self, points: &[(f64, f64)]) -> Vec<[f64; 2]> {
        self.core_sample_indices
            .iter()
            .map(|i| [points[*i].0, points[*i].1])
            .collect()
    }
}

/// DBSCAN over Euclidean distance. Border points join the first cluster
/// that reaches them.
pub fn dbscan(points: &[(f64, f64)], eps: f64, min_samples: usize) -> Clustering {
    let neighbourhoods: Vec<Vec<usize>> = points
        .iter()
        .map(|(xi, yi)| {
            points
                .iter()
                .enumerate()
                .filter(|(_, (xj, yj))| (xi - xj).hypot(yi - yj) <= eps)
                .map(|(j, _)| j)
                .collect()
        })
        .collect();
    let core: Vec<bool> = neighbourhoods.iter().map(|n| n.len() >= min_samples).collect();

    let mut labels = vec![NOISE; points.len()];
    let mut clusters = 0usize;
    for start in 0..points.len() {
        if !core[start] || labels[start] != NOISE {
            continue;
        }
        let label = clusters as i64;
        clusters += 1;
        labels[start] = label;
        let mut frontier = vec![start];
        while let Some(point) = frontier.pop() {
            for &next in &neighbourhoods[point] {
                if labels[next] != NOISE {
                    continue;
                }
                labels[next] = label;
                if core[next] {
                    frontier.push(next);
                }
            }
        }
    }

    Clustering {
        labels,
        core_sample_indices: (0..points.len()).filter(|i| core[*i]).collect(),
        clusters,
    }
}
