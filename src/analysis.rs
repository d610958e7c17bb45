//! AI analysis orchestration.
//!
//! One run segments every opportunity, then scores, recommends and suggests
//! gifts for the selected records, and finally stamps `last_updated`.

use crate::db_storage::OpportunityStore;
use crate::errors::AppError;
use crate::gifts;
use crate::llm_client::TextGenerator;
use crate::models::{
    ActionResponse, AnalysisSummary, GiftRunOutcome, GiftStatus, Opportunity, OpportunityPatch,
    SegmentSummary,
};
use crate::recommendation::generate_next_action;
use crate::scoring::predict_lead_score;
use crate::segmentation::perform_customer_segmentation;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::Instrument;
use uuid::Uuid;

#[derive(Clone)]
pub struct AnalysisService {
    store: Arc<dyn OpportunityStore>,
    generator: Arc<dyn TextGenerator>,
    /// Held while suggesting gifts, so a scheduled run and a manual action
    /// never ask for the same gift twice.
    gift_lock: Arc<Mutex<()>>,
}

impl AnalysisService {
    pub fn new(store: Arc<dyn OpportunityStore>, generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            store,
            generator,
            gift_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Loads the selected records, failing if any id is unknown.
    async fn load_selection(&self, ids: &[i64]) -> Result<Vec<Opportunity>, AppError> {
        let records = self.store.fetch_by_ids(ids).await?;
        if records.len() < dedup(ids).len() {
            let missing: Vec<String> = dedup(ids)
                .into_iter()
                .filter(|id| !records.iter().any(|r| r.id == *id))
                .map(|id| id.to_string())
                .collect();
            return Err(AppError::NotFound(format!(
                "Opportunities not found: {}",
                missing.join(", ")
            )));
        }
        Ok(records)
    }

    /// Runs the full analysis for the selected records.
    ///
    /// Segmentation always covers every qualifying opportunity in the store.
    /// Any error aborts the run and is returned after being logged.
    pub async fn run_ai_analysis(&self, ids: &[i64]) -> Result<AnalysisSummary, AppError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("ai_analysis", %run_id, selected = ids.len());

        let result = self.run_steps(run_id, ids).instrument(span).await;
        if let Err(ref e) = result {
            tracing::error!("AI Analysis failed (run {}): {}", run_id, e);
        }
        result
    }

    async fn run_steps(&self, run_id: Uuid, ids: &[i64]) -> Result<AnalysisSummary, AppError> {
        tracing::info!("Starting AI analysis");

        // 1. Customer segmentation
        let segmented = perform_customer_segmentation(self.store.as_ref()).await?;

        // Loaded after segmentation so the gift prompt sees the new segment
        let mut records = self.load_selection(ids).await?;

        // 2. Deal scoring
        let scored = predict_lead_score(self.store.as_ref(), &mut records).await?;

        // 3. Next best action
        let recommendations =
            generate_next_action(self.store.as_ref(), self.generator.as_ref(), &mut records)
                .await?;

        // 4. Gifts for won deals
        let mut won: Vec<Opportunity> = records
            .iter()
            .filter(|r| r.is_won() && r.gift.status == GiftStatus::Pending)
            .cloned()
            .collect();
        let gift_outcome = if won.is_empty() {
            GiftRunOutcome::default()
        } else {
            let _guard = self.gift_lock.lock().await;
            gifts::generate_gift_suggestion(self.store.as_ref(), self.generator.as_ref(), &mut won)
                .await?
        };

        // 5. Timestamp
        let finished_at = Utc::now();
        let stamp = OpportunityPatch {
            last_updated: Some(finished_at),
            ..Default::default()
        };
        for record in &records {
            self.store.apply_patch(record.id, &stamp).await?;
        }

        tracing::info!("AI analysis finished for {} opportunities", records.len());

        Ok(AnalysisSummary {
            success: true,
            run_id,
            segmented,
            scored,
            recommendations: recommendations.generated,
            recommendation_failures: recommendations.failed,
            gifts_suggested: gift_outcome.suggested,
            gift_failures: gift_outcome.failed,
            finished_at,
        })
    }

    /// Scheduled entry point: analyses every qualifying opportunity.
    pub async fn run_scheduled(&self) -> Result<AnalysisSummary, AppError> {
        let ids = self.store.qualifying_ids().await?;
        tracing::info!("Scheduled AI analysis over {} opportunities", ids.len());
        self.run_ai_analysis(&ids).await
    }

    pub async fn suggest_gifts(&self, ids: &[i64]) -> Result<GiftRunOutcome, AppError> {
        let mut records = self.load_selection(ids).await?;
        let _guard = self.gift_lock.lock().await;
        gifts::generate_gift_suggestion(self.store.as_ref(), self.generator.as_ref(), &mut records)
            .await
    }

    pub async fn mark_gifts_sent(&self, ids: &[i64]) -> Result<ActionResponse, AppError> {
        let mut records = self.load_selection(ids).await?;
        let today = Utc::now().date_naive();
        let (updated, skipped) =
            gifts::mark_gift_sent(self.store.as_ref(), &mut records, today).await?;
        tracing::info!("Marked {} gift(s) as sent, {} skipped", updated, skipped.len());
        Ok(ActionResponse {
            success: true,
            updated,
            skipped,
        })
    }

    pub async fn decline_gifts(&self, ids: &[i64]) -> Result<ActionResponse, AppError> {
        let mut records = self.load_selection(ids).await?;
        let (updated, skipped) = gifts::decline_gift(self.store.as_ref(), &mut records).await?;
        tracing::info!("Declined {} gift(s), {} skipped", updated, skipped.len());
        Ok(ActionResponse {
            success: true,
            updated,
            skipped,
        })
    }

    pub async fn opportunity(&self, id: i64) -> Result<Opportunity, AppError> {
        self.store
            .fetch_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Opportunity {} not found", id)))
    }

    pub async fn segment_report(&self) -> Result<Vec<SegmentSummary>, AppError> {
        self.store.segment_report().await
    }
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    let mut unique = ids.to_vec();
    unique.sort_unstable();
    unique.dedup();
    unique
}
