use crate::db_storage::OpportunityStore;
use crate::errors::AppError;
use crate::models::{Opportunity, OpportunityPatch};

/// Revenue at which the revenue factor saturates.
pub const REVENUE_NORMALIZER: f64 = 10_000.0;
pub const PROBABILITY_WEIGHT: f64 = 0.7;
pub const REVENUE_WEIGHT: f64 = 0.3;

/// Heuristic deal score from win probability and expected revenue.
pub fn deal_score(probability: f64, expected_revenue: f64) -> f64 {
    let revenue_factor = (expected_revenue / REVENUE_NORMALIZER).min(1.0);
    (probability * PROBABILITY_WEIGHT + revenue_factor * REVENUE_WEIGHT) * 100.0
}

/// Scores each record and writes the result back. Returns the number scored.
pub async fn predict_lead_score(
    store: &dyn OpportunityStore,
    records: &mut [Opportunity],
) -> Result<usize, AppError> {
    for record in records.iter_mut() {
        let patch = OpportunityPatch {
            deal_score: Some(deal_score(record.probability, record.expected_revenue)),
            ..Default::default()
        };
        store.apply_patch(record.id, &patch).await?;
        record.apply(&patch);
        tracing::debug!(
            "Opportunity {} deal score: {:.2}",
            record.id,
            record.deal_score.unwrap_or_default()
        );
    }

    Ok(records.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_score_formula() {
        assert_eq!(deal_score(0.0, 0.0), 0.0);
        assert_eq!(deal_score(50.0, 5_000.0), (50.0 * 0.7 + 0.5 * 0.3) * 100.0);
        assert_eq!(deal_score(100.0, 10_000.0), (100.0 * 0.7 + 0.3) * 100.0);
    }

    #[test]
    fn test_revenue_factor_saturates() {
        assert_eq!(deal_score(20.0, 10_000.0), deal_score(20.0, 2_000_000.0));
    }

    #[test]
    fn test_negative_revenue_is_not_clamped_below() {
        assert!(deal_score(0.0, -10_000.0) < 0.0);
    }
}
