use crate::errors::AppError;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Domain Models ============

/// Ordinal customer tier assigned by clustering. `A` is the highest value tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Segment {
    A,
    B,
    C,
}

impl Segment {
    pub const ALL: [Segment; 3] = [Segment::A, Segment::B, Segment::C];

    pub fn as_str(&self) -> &'static str {
        match self {
            Segment::A => "A",
            Segment::B => "B",
            Segment::C => "C",
        }
    }

    /// Human readable label used in prompts and reports.
    pub fn label(&self) -> &'static str {
        match self {
            Segment::A => "Segment A - High Value",
            Segment::B => "Segment B - Medium Value",
            Segment::C => "Segment C - Low Value",
        }
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Segment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "A" | "a" => Ok(Segment::A),
            "B" | "b" => Ok(Segment::B),
            "C" | "c" => Ok(Segment::C),
            other => Err(format!("unknown segment '{}'", other)),
        }
    }
}

/// Gift workflow state of an opportunity.
///
/// `Pending -> Suggested` happens automatically once a deal is won,
/// `Suggested -> Sent` and `Suggested -> Declined` are manual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GiftStatus {
    #[default]
    Pending,
    Suggested,
    Sent,
    Declined,
}

impl GiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            GiftStatus::Pending => "pending",
            GiftStatus::Suggested => "suggested",
            GiftStatus::Sent => "sent",
            GiftStatus::Declined => "declined",
        }
    }

    pub fn can_transition_to(&self, next: GiftStatus) -> bool {
        matches!(
            (self, next),
            (GiftStatus::Pending, GiftStatus::Suggested)
                | (GiftStatus::Suggested, GiftStatus::Sent)
                | (GiftStatus::Suggested, GiftStatus::Declined)
        )
    }

    /// Validates a status change, returning the new status.
    pub fn transition(&self, next: GiftStatus) -> Result<GiftStatus, AppError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(AppError::InvalidGiftTransition {
                from: *self,
                to: next,
            })
        }
    }
}

impl fmt::Display for GiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GiftStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "pending" => Ok(GiftStatus::Pending),
            "suggested" => Ok(GiftStatus::Suggested),
            "sent" => Ok(GiftStatus::Sent),
            "declined" => Ok(GiftStatus::Declined),
            other => Err(format!("unknown gift status '{}'", other)),
        }
    }
}

/// Gift fields of an opportunity. They are written together.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GiftState {
    pub status: GiftStatus,
    pub suggested_gift: Option<String>,
    pub gift_value: f64,
    pub gift_sent_date: Option<NaiveDate>,
}

/// A CRM opportunity with the AI fields layered onto it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub id: i64,
    pub name: String,
    /// `lead` or `opportunity`.
    pub record_type: String,
    pub active: bool,
    /// Win probability in percent (0-100).
    pub probability: f64,
    pub expected_revenue: f64,
    pub create_date: DateTime<Utc>,
    pub customer_name: Option<String>,
    pub customer_industry: Option<String>,
    pub stage_name: Option<String>,
    pub activity_deadline: Option<NaiveDate>,

    pub segment: Option<Segment>,
    pub deal_score: Option<f64>,
    pub recommended_action: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
    pub gift: GiftState,
}

impl Opportunity {
    /// Records considered by segmentation and the scheduled run.
    pub fn is_qualifying(&self) -> bool {
        self.active && self.record_type == "opportunity"
    }

    pub fn is_won(&self) -> bool {
        self.probability == 100.0
    }

    pub fn apply(&mut self, patch: &OpportunityPatch) {
        if let Some(segment) = patch.segment {
            self.segment = Some(segment);
        }
        if let Some(score) = patch.deal_score {
            self.deal_score = Some(score);
        }
        if let Some(ref action) = patch.recommended_action {
            self.recommended_action = Some(action.clone());
        }
        if let Some(at) = patch.last_updated {
            self.last_updated = Some(at);
        }
    }
}

/// Partial write of the AI fields. `None` leaves a field untouched.
///
/// Gift fields are not part of a patch; they go through
/// `OpportunityStore::update_gift`, which checks the stored status first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OpportunityPatch {
    pub segment: Option<Segment>,
    pub deal_score: Option<f64>,
    pub recommended_action: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl OpportunityPatch {
    pub fn is_empty(&self) -> bool {
        *self == OpportunityPatch::default()
    }
}

/// Feature row fed into segmentation.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationRow {
    pub id: i64,
    pub expected_revenue: f64,
    pub probability: f64,
    pub create_date: DateTime<Utc>,
}

impl From<&Opportunity> for SegmentationRow {
    fn from(o: &Opportunity) -> Self {
        Self {
            id: o.id,
            expected_revenue: o.expected_revenue,
            probability: o.probability,
            create_date: o.create_date,
        }
    }
}

// ============ API Models ============

/// Record selection for the manual actions.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SelectionRequest {
    pub ids: Vec<i64>,
}

/// Response of a manual gift action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    pub updated: usize,
    /// Records left untouched because their state did not allow the action.
    #[serde(default)]
    pub skipped: Vec<i64>,
}

/// Outcome of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub success: bool,
    pub run_id: Uuid,
    pub segmented: usize,
    pub scored: usize,
    pub recommendations: usize,
    pub recommendation_failures: usize,
    pub gifts_suggested: usize,
    pub gift_failures: usize,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of the gift suggestion routine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GiftRunOutcome {
    pub suggested: usize,
    pub failed: usize,
    pub skipped: Vec<i64>,
}

/// One line of the segment report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub label: String,
    pub opportunities: i64,
    pub average_deal_score: Option<f64>,
    pub total_expected_revenue: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gift_transitions() {
        assert!(GiftStatus::Pending.can_transition_to(GiftStatus::Suggested));
        assert!(GiftStatus::Suggested.can_transition_to(GiftStatus::Sent));
        assert!(GiftStatus::Suggested.can_transition_to(GiftStatus::Declined));

        assert!(!GiftStatus::Pending.can_transition_to(GiftStatus::Sent));
        assert!(!GiftStatus::Pending.can_transition_to(GiftStatus::Declined));
        assert!(!GiftStatus::Sent.can_transition_to(GiftStatus::Declined));
        assert!(!GiftStatus::Declined.can_transition_to(GiftStatus::Suggested));
        assert!(GiftStatus::Sent.transition(GiftStatus::Pending).is_err());
    }

    #[test]
    fn test_status_and_segment_parsing() {
        for status in [
            GiftStatus::Pending,
            GiftStatus::Suggested,
            GiftStatus::Sent,
            GiftStatus::Declined,
        ] {
            assert_eq!(status.as_str().parse::<GiftStatus>(), Ok(status));
        }
        assert_eq!("b".parse::<Segment>(), Ok(Segment::B));
        assert!("D".parse::<Segment>().is_err());
    }

    #[test]
    fn test_gift_status_serializes_lowercase() {
        let json = serde_json::to_string(&GiftStatus::Suggested).unwrap();
        assert_eq!(json, "\"suggested\"");
    }

    #[test]
    fn test_empty_patch() {
        assert!(OpportunityPatch::default().is_empty());
        let patch = OpportunityPatch {
            deal_score: Some(1.0),
            ..Default::default()
        };
        assert!(!patch.is_empty());
    }
}
