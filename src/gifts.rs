//! Gift workflow for won deals.
//!
//! A won opportunity (probability 100) with a pending gift gets an AI gift
//! suggestion and a budget. Sales then marks the gift as sent or declined.

use crate::db_storage::OpportunityStore;
use crate::errors::AppError;
use crate::llm_client::TextGenerator;
use crate::models::{GiftRunOutcome, GiftState, GiftStatus, Opportunity};
use crate::prompts::{gift_prompt, GIFT_SYSTEM};
use chrono::NaiveDate;

/// Share of expected revenue spent on the gift.
pub const GIFT_RATE: f64 = 0.05;
/// Upper bound of a gift budget, in the revenue currency.
pub const GIFT_CAP: f64 = 1_000_000.0;

/// Written in place of a suggestion when the text generator fails.
pub const GIFT_ERROR: &str = "Lỗi khi tạo đề xuất quà tặng";

pub fn gift_budget(expected_revenue: f64) -> f64 {
    (expected_revenue * GIFT_RATE).min(GIFT_CAP)
}

/// Won deal with revenue and no gift handled yet.
pub fn is_gift_eligible(record: &Opportunity) -> bool {
    record.is_won() && record.expected_revenue != 0.0 && record.gift.status == GiftStatus::Pending
}

/// Suggests a gift for each eligible record.
///
/// Each record is re-read before the text generator is called, so a gift
/// suggested elsewhere since the selection was loaded is skipped. The result
/// is only written while the stored status is still `pending`.
///
/// On success the suggestion, the budget and status `suggested` are stored.
/// A failed call stores [`GIFT_ERROR`] as the suggestion and leaves the status
/// `pending` so the record is retried on the next run.
pub async fn generate_gift_suggestion(
    store: &dyn OpportunityStore,
    generator: &dyn TextGenerator,
    records: &mut [Opportunity],
) -> Result<GiftRunOutcome, AppError> {
    let mut outcome = GiftRunOutcome::default();

    for record in records.iter_mut() {
        if !is_gift_eligible(record) {
            outcome.skipped.push(record.id);
            continue;
        }

        match store.fetch_by_id(record.id).await? {
            Some(current) if is_gift_eligible(&current) => *record = current,
            _ => {
                tracing::info!(
                    "Opportunity {}: gift already handled, skipping suggestion",
                    record.id
                );
                outcome.skipped.push(record.id);
                continue;
            }
        }

        let budget = gift_budget(record.expected_revenue);
        let prompt = gift_prompt(record, budget);

        let (gift, generated) = match generator.generate(GIFT_SYSTEM, &prompt).await {
            Ok(text) => (
                GiftState {
                    status: GiftStatus::Suggested,
                    suggested_gift: Some(text),
                    gift_value: budget,
                    gift_sent_date: record.gift.gift_sent_date,
                },
                true,
            ),
            Err(e) => {
                tracing::error!(
                    "OpenAI API call failed for gift suggestion on opportunity {}: {}",
                    record.id,
                    e
                );
                (
                    GiftState {
                        suggested_gift: Some(GIFT_ERROR.to_string()),
                        ..record.gift.clone()
                    },
                    false,
                )
            }
        };

        if !store
            .update_gift(record.id, GiftStatus::Pending, &gift)
            .await?
        {
            tracing::warn!(
                "Opportunity {}: gift status changed during suggestion, result discarded",
                record.id
            );
            outcome.skipped.push(record.id);
            continue;
        }

        record.gift = gift;
        if generated {
            outcome.suggested += 1;
        } else {
            outcome.failed += 1;
        }
    }

    tracing::info!(
        "Gift suggestions: {} suggested, {} failed, {} skipped",
        outcome.suggested,
        outcome.failed,
        outcome.skipped.len()
    );
    Ok(outcome)
}

/// Applies a manual gift transition to each record whose status allows it.
///
/// The write is conditional on the status the check ran against; a record
/// changed concurrently is skipped.
///
/// Returns `(updated, skipped_ids)`.
async fn transition_gifts(
    store: &dyn OpportunityStore,
    records: &mut [Opportunity],
    next: GiftStatus,
    update: impl Fn(&GiftState) -> GiftState,
) -> Result<(usize, Vec<i64>), AppError> {
    let mut updated = 0;
    let mut skipped = Vec::new();

    for record in records.iter_mut() {
        if let Err(reason) = record.gift.status.transition(next) {
            tracing::warn!("Opportunity {}: {}", record.id, reason);
            skipped.push(record.id);
            continue;
        }

        let gift = update(&record.gift);
        if !store
            .update_gift(record.id, record.gift.status, &gift)
            .await?
        {
            tracing::warn!(
                "Opportunity {}: gift status changed since it was loaded, not moving to {}",
                record.id,
                next
            );
            skipped.push(record.id);
            continue;
        }

        record.gift = gift;
        updated += 1;
    }

    Ok((updated, skipped))
}

/// `suggested -> sent`, stamping the sent date.
pub async fn mark_gift_sent(
    store: &dyn OpportunityStore,
    records: &mut [Opportunity],
    today: NaiveDate,
) -> Result<(usize, Vec<i64>), AppError> {
    transition_gifts(store, records, GiftStatus::Sent, |gift| GiftState {
        status: GiftStatus::Sent,
        gift_sent_date: Some(today),
        ..gift.clone()
    })
    .await
}

/// `suggested -> declined`, clearing the suggestion and its value.
pub async fn decline_gift(
    store: &dyn OpportunityStore,
    records: &mut [Opportunity],
) -> Result<(usize, Vec<i64>), AppError> {
    transition_gifts(store, records, GiftStatus::Declined, |gift| GiftState {
        status: GiftStatus::Declined,
        suggested_gift: None,
        gift_value: 0.0,
        gift_sent_date: gift.gift_sent_date,
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_budget() {
        assert_eq!(gift_budget(0.0), 0.0);
        assert_eq!(gift_budget(1_000.0), 1_000.0 * 0.05);
        assert_eq!(gift_budget(20_000_000.0), GIFT_CAP);
        assert_eq!(gift_budget(500_000_000.0), GIFT_CAP);
    }
}
