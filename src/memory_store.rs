use crate::db_storage::{complete_report, OpportunityStore};
use crate::errors::AppError;
use crate::models::{
    GiftState, GiftStatus, Opportunity, OpportunityPatch, Segment, SegmentSummary, SegmentationRow,
};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Opportunity store kept in process memory. Used by tests and local runs.
#[derive(Default)]
pub struct InMemoryOpportunityStore {
    records: RwLock<BTreeMap<i64, Opportunity>>,
}

impl InMemoryOpportunityStore {
    pub fn new(records: impl IntoIterator<Item = Opportunity>) -> Self {
        Self {
            records: RwLock::new(records.into_iter().map(|o| (o.id, o)).collect()),
        }
    }

    pub async fn insert(&self, opportunity: Opportunity) {
        self.records
            .write()
            .await
            .insert(opportunity.id, opportunity);
    }

    pub async fn get(&self, id: i64) -> Option<Opportunity> {
        self.records.read().await.get(&id).cloned()
    }

    pub async fn all(&self) -> Vec<Opportunity> {
        self.records.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl OpportunityStore for InMemoryOpportunityStore {
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Opportunity>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|o| ids.contains(&o.id))
            .cloned()
            .collect())
    }

    async fn qualifying_ids(&self) -> Result<Vec<i64>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|o| o.is_qualifying())
            .map(|o| o.id)
            .collect())
    }

    async fn segmentation_rows(&self) -> Result<Vec<SegmentationRow>, AppError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .filter(|o| o.is_qualifying())
            .map(SegmentationRow::from)
            .collect())
    }

    async fn save_segments(&self, assignments: &[(i64, Segment)]) -> Result<usize, AppError> {
        let mut records = self.records.write().await;
        let mut updated = 0;
        for (id, segment) in assignments {
            if let Some(record) = records.get_mut(id).filter(|o| o.record_type == "opportunity") {
                record.segment = Some(*segment);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn apply_patch(&self, id: i64, patch: &OpportunityPatch) -> Result<(), AppError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Opportunity {} not found", id)))?;
        record.apply(patch);
        Ok(())
    }

    async fn update_gift(
        &self,
        id: i64,
        expected: GiftStatus,
        gift: &GiftState,
    ) -> Result<bool, AppError> {
        let mut records = self.records.write().await;
        match records.get_mut(&id) {
            Some(record) if record.gift.status == expected => {
                record.gift = gift.clone();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn segment_report(&self) -> Result<Vec<SegmentSummary>, AppError> {
        let records = self.records.read().await;
        let mut summaries = Vec::new();

        for segment in Segment::ALL {
            let members: Vec<&Opportunity> = records
                .values()
                .filter(|o| o.is_qualifying() && o.segment == Some(segment))
                .collect();
            if members.is_empty() {
                continue;
            }

            let scores: Vec<f64> = members.iter().filter_map(|o| o.deal_score).collect();
            let average_deal_score = if scores.is_empty() {
                None
            } else {
                Some(scores.iter().sum::<f64>() / scores.len() as f64)
            };

            summaries.push(SegmentSummary {
                segment,
                label: segment.label().to_string(),
                opportunities: members.len() as i64,
                average_deal_score,
                total_expected_revenue: members.iter().map(|o| o.expected_revenue).sum(),
            });
        }

        Ok(complete_report(summaries))
    }
}
