use crate::db_storage::OpportunityStore;
use crate::errors::AppError;
use crate::llm_client::TextGenerator;
use crate::models::{Opportunity, OpportunityPatch};
use crate::prompts::{next_action_prompt, NEXT_ACTION_SYSTEM};

/// Written in place of a recommendation when the text generator fails.
pub const RECOMMENDATION_ERROR: &str = "Error generating recommendation";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecommendationOutcome {
    pub generated: usize,
    pub failed: usize,
}

/// Asks the text generator for a next best action for every record.
///
/// A failed call is logged and replaced by [`RECOMMENDATION_ERROR`]; the
/// remaining records are still processed. Store errors abort the batch.
pub async fn generate_next_action(
    store: &dyn OpportunityStore,
    generator: &dyn TextGenerator,
    records: &mut [Opportunity],
) -> Result<RecommendationOutcome, AppError> {
    let mut outcome = RecommendationOutcome::default();

    for record in records.iter_mut() {
        let prompt = next_action_prompt(record);

        let text = match generator.generate(NEXT_ACTION_SYSTEM, &prompt).await {
            Ok(text) => {
                outcome.generated += 1;
                text
            }
            Err(e) => {
                tracing::error!("OpenAI API call failed for opportunity {}: {}", record.id, e);
                outcome.failed += 1;
                RECOMMENDATION_ERROR.to_string()
            }
        };

        let patch = OpportunityPatch {
            recommended_action: Some(text),
            ..Default::default()
        };
        store.apply_patch(record.id, &patch).await?;
        record.apply(&patch);
    }

    tracing::info!(
        "Next best action: {} generated, {} failed",
        outcome.generated,
        outcome.failed
    );
    Ok(outcome)
}
