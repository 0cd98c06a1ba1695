//! Distance functions used by the bundled vector stores.

use serde::{Deserialize, Serialize};

/// How the distance between two embeddings is measured. Lower is closer for
/// every metric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    L2,
    /// `1 - cosine_similarity`.
    Cosine,
    /// `1 - dot_product`, for embeddings that are already normalized.
    Ip,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            Self::L2 => a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum(),
            Self::Cosine => 1.0 - cosine_similarity(a, b),
            Self::Ip => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_is_squared_euclidean() {
        assert_eq!(DistanceMetric::L2.distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(DistanceMetric::L2.distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn cosine_ignores_magnitude() {
        let d = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[5.0, 0.0]);
        assert!(d.abs() < 1e-6);
        let orthogonal = DistanceMetric::Cosine.distance(&[1.0, 0.0], &[0.0, 1.0]);
        assert!((orthogonal - 1.0).abs() < 1e-6);
        assert_eq!(DistanceMetric::Cosine.distance(&[0.0, 0.0], &[1.0, 1.0]), 1.0);
    }

    #[test]
    fn metric_names_round_trip_through_json() {
        assert_eq!(serde_json::to_string(&DistanceMetric::Ip).unwrap(), "\"ip\"");
        let metric: DistanceMetric = serde_json::from_str("\"cosine\"").unwrap();
        assert_eq!(metric, DistanceMetric::Cosine);
    }
}
