//! Customer segmentation.
//!
//! Every active opportunity is described by three features (expected revenue,
//! win probability, creation timestamp). The features are standardized and
//! clustered with k-means into three groups, which are then labelled A/B/C.

use crate::db_storage::OpportunityStore;
use crate::errors::AppError;
use crate::models::{Segment, SegmentationRow};
use linfa::traits::{Fit, Predict, Transformer};
use linfa::DatasetBase;
use linfa_clustering::KMeans;
use linfa_preprocessing::linear_scaling::LinearScaler;
use ndarray::{Array1, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::cmp::Ordering;

pub const N_CLUSTERS: usize = 3;
pub const RANDOM_STATE: u64 = 42;
pub const N_RUNS: usize = 10;
pub const MAX_ITERATIONS: u64 = 300;
pub const TOLERANCE: f64 = 1e-4;

/// Cluster rank (0 = lowest value) to segment.
const SEGMENT_MAP: [Segment; N_CLUSTERS] = [Segment::C, Segment::B, Segment::A];

/// One row per opportunity: expected revenue, probability, creation timestamp.
pub fn feature_matrix(rows: &[SegmentationRow]) -> Array2<f64> {
    Array2::from_shape_fn((rows.len(), 3), |(i, j)| match j {
        0 => rows[i].expected_revenue,
        1 => rows[i].probability,
        _ => rows[i].create_date.timestamp() as f64,
    })
}

/// Scales every column to zero mean and unit variance.
pub fn standardize(features: Array2<f64>) -> Result<Array2<f64>, AppError> {
    let dataset = DatasetBase::from(features);
    let scaler = LinearScaler::standard()
        .fit(&dataset)
        .map_err(|e| AppError::Internal(format!("Feature scaling failed: {}", e)))?;

    let mut scaled = scaler.transform(dataset.records);
    // Constant columns come back as 0
    scaled.mapv_inplace(|v| if v.is_finite() { v } else { 0.0 });
    Ok(scaled)
}

/// Number of distinct rows, by sorting and deduplicating.
pub fn count_distinct(features: &Array2<f64>) -> usize {
    let mut rows: Vec<Vec<f64>> = features.outer_iter().map(|r| r.to_vec()).collect();
    rows.sort_by(|a, b| {
        a.iter()
            .zip(b)
            .map(|(x, y)| x.total_cmp(y))
            .find(|o| o.is_ne())
            .unwrap_or(Ordering::Equal)
    });
    rows.dedup();
    rows.len()
}

/// Seeded k-means over the rows of `features`. Returns the label of each row
/// and the centroids.
pub fn cluster(
    features: &Array2<f64>,
    n_clusters: usize,
) -> Result<(Array1<usize>, Array2<f64>), AppError> {
    let dataset = DatasetBase::from(features.clone());
    let model = KMeans::params_with_rng(n_clusters, StdRng::seed_from_u64(RANDOM_STATE))
        .n_runs(N_RUNS)
        .max_n_iterations(MAX_ITERATIONS)
        .tolerance(TOLERANCE)
        .fit(&dataset)
        .map_err(|e| AppError::Internal(format!("k-means failed: {}", e)))?;

    let labels: Array1<usize> = model.predict(features);
    Ok((labels, model.centroids().clone()))
}

/// Clusters the rows and returns one segment per row, in input order.
///
/// The number of clusters is capped at the number of distinct rows. Clusters
/// are ranked by the revenue and probability coordinates of their centroid
/// before the rank is mapped to a segment, so the highest-value cluster is
/// always `A`.
pub fn segment_rows(rows: &[SegmentationRow]) -> Result<Vec<(i64, Segment)>, AppError> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }

    let features = feature_matrix(rows);
    let k = N_CLUSTERS.min(count_distinct(&features));
    if k == 1 {
        return Ok(rows.iter().map(|r| (r.id, Segment::A)).collect());
    }

    let scaled = standardize(features)?;
    let (labels, centroids) = cluster(&scaled, k)?;

    let value = |c: usize| centroids[[c, 0]] + centroids[[c, 1]];
    let mut order: Vec<usize> = (0..centroids.nrows()).collect();
    order.sort_by(|a, b| value(*a).total_cmp(&value(*b)).then(a.cmp(b)));

    let offset = N_CLUSTERS - order.len();
    let mut segment_of_cluster = vec![Segment::C; order.len()];
    for (rank, cluster) in order.into_iter().enumerate() {
        segment_of_cluster[cluster] = SEGMENT_MAP[rank + offset];
    }

    rows.iter()
        .zip(labels.iter())
        .map(|(row, label)| {
            segment_of_cluster
                .get(*label)
                .map(|segment| (row.id, *segment))
                .ok_or_else(|| {
                    AppError::Internal(format!("k-means returned unknown cluster {}", label))
                })
        })
        .collect()
}

/// Segments every qualifying opportunity in the store.
///
/// Returns the number of records written.
pub async fn perform_customer_segmentation(store: &dyn OpportunityStore) -> Result<usize, AppError> {
    let rows = store.segmentation_rows().await?;
    if rows.is_empty() {
        tracing::info!("No opportunities to segment");
        return Ok(0);
    }

    let assignments = segment_rows(&rows)?;
    let updated = store.save_segments(&assignments).await?;

    let count = |s: Segment| assignments.iter().filter(|(_, seg)| *seg == s).count();
    tracing::info!(
        "Segmented {} opportunities (A: {}, B: {}, C: {})",
        updated,
        count(Segment::A),
        count(Segment::B),
        count(Segment::C)
    );

    Ok(updated)
}
