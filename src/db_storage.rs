use crate::errors::{AppError, ResultExt};
use crate::models::{
    GiftState, GiftStatus, Opportunity, OpportunityPatch, Segment, SegmentSummary, SegmentationRow,
};
use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Access to CRM opportunity records.
///
/// The records are owned by the CRM; this service only reads the fields it needs
/// and writes back the AI columns.
#[async_trait]
pub trait OpportunityStore: Send + Sync {
    /// Loads the given records, in ascending id order. Unknown ids are ignored.
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Opportunity>, AppError>;

    async fn fetch_by_id(&self, id: i64) -> Result<Option<Opportunity>, AppError> {
        Ok(self.fetch_by_ids(&[id]).await?.into_iter().next())
    }

    /// Ids of every active record of type `opportunity`.
    async fn qualifying_ids(&self) -> Result<Vec<i64>, AppError>;

    /// Segmentation features of every active record of type `opportunity`.
    async fn segmentation_rows(&self) -> Result<Vec<SegmentationRow>, AppError>;

    /// Writes segment labels, returning the number of records updated.
    async fn save_segments(&self, assignments: &[(i64, Segment)]) -> Result<usize, AppError>;

    async fn apply_patch(&self, id: i64, patch: &OpportunityPatch) -> Result<(), AppError>;

    /// Writes the gift fields only if the stored status is still `expected`.
    ///
    /// Returns `false`, leaving the record untouched, when another writer
    /// changed the status since the record was loaded.
    async fn update_gift(
        &self,
        id: i64,
        expected: GiftStatus,
        gift: &GiftState,
    ) -> Result<bool, AppError>;

    async fn segment_report(&self) -> Result<Vec<SegmentSummary>, AppError>;
}

/// Fills in segments with no records so the report always has A, B and C.
pub fn complete_report(mut found: Vec<SegmentSummary>) -> Vec<SegmentSummary> {
    for segment in Segment::ALL {
        if !found.iter().any(|s| s.segment == segment) {
            found.push(SegmentSummary {
                segment,
                label: segment.label().to_string(),
                opportunities: 0,
                average_deal_score: None,
                total_expected_revenue: 0.0,
            });
        }
    }
    found.sort_by_key(|s| s.segment);
    found
}

pub const DEFAULT_LANGUAGE: &str = "en_US";

/// Text of a name column that is either plain text or a translatable `jsonb`
/// object keyed by language. Uses the language bound as `$2`, then `en_US`.
fn translated(column: &str) -> String {
    format!(
        "CASE jsonb_typeof(to_jsonb({c})) \
            WHEN 'object' THEN COALESCE(to_jsonb({c}) ->> $2::text, to_jsonb({c}) ->> '{en}') \
            ELSE to_jsonb({c}) #>> '{{}}' \
         END",
        c = column,
        en = DEFAULT_LANGUAGE
    )
}

/// Opportunities with their joins. Expects the ids as `$1` and the language as `$2`.
fn select_opportunities() -> String {
    format!(
        r#"
    SELECT l.id::int8 AS id,
           COALESCE(l.name, '') AS name,
           COALESCE(l.type, 'lead') AS record_type,
           COALESCE(l.active, true) AS active,
           COALESCE(l.probability, 0)::float8 AS probability,
           COALESCE(l.expected_revenue, 0)::numeric AS expected_revenue,
           COALESCE(l.create_date, NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC' AS create_date,
           p.name::text AS customer_name,
           {industry} AS customer_industry,
           {stage} AS stage_name,
           (SELECT MIN(a.date_deadline) FROM mail_activity a
             WHERE a.res_model = 'crm.lead' AND a.res_id = l.id) AS activity_deadline,
           l.customer_segment::text AS customer_segment,
           l.deal_score::float8 AS deal_score,
           l.ai_next_action,
           l.last_ai_update::timestamp AT TIME ZONE 'UTC' AS last_ai_update,
           COALESCE(l.gift_status, 'pending')::text AS gift_status,
           COALESCE(l.gift_value, 0)::float8 AS gift_value,
           l.suggested_gift,
           l.gift_sent_date
    FROM crm_lead l
    LEFT JOIN res_partner p ON p.id = l.partner_id
    LEFT JOIN res_partner_industry i ON i.id = p.industry_id
    LEFT JOIN crm_stage s ON s.id = l.stage_id
    WHERE l.id = ANY($1::int8[])
    ORDER BY l.id
"#,
        industry = translated("i.name"),
        stage = translated("s.name"),
    )
}

#[derive(Debug, FromRow)]
struct OpportunityRow {
    id: i64,
    name: String,
    record_type: String,
    active: bool,
    probability: f64,
    expected_revenue: BigDecimal,
    create_date: DateTime<Utc>,
    customer_name: Option<String>,
    customer_industry: Option<String>,
    stage_name: Option<String>,
    activity_deadline: Option<NaiveDate>,
    customer_segment: Option<String>,
    deal_score: Option<f64>,
    ai_next_action: Option<String>,
    last_ai_update: Option<DateTime<Utc>>,
    gift_status: String,
    gift_value: f64,
    suggested_gift: Option<String>,
    gift_sent_date: Option<NaiveDate>,
}

impl TryFrom<OpportunityRow> for Opportunity {
    type Error = AppError;

    fn try_from(row: OpportunityRow) -> Result<Self, Self::Error> {
        let segment = match row.customer_segment.as_deref() {
            None | Some("") => None,
            Some(raw) => match Segment::from_str(raw) {
                Ok(segment) => Some(segment),
                Err(e) => {
                    tracing::warn!("Opportunity {}: {}, treating as unsegmented", row.id, e);
                    None
                }
            },
        };
        let status = row.gift_status.parse::<GiftStatus>().map_err(|e| {
            AppError::Internal(format!("Opportunity {}: {}", row.id, e))
        })?;

        Ok(Opportunity {
            id: row.id,
            name: row.name,
            record_type: row.record_type,
            active: row.active,
            probability: row.probability,
            expected_revenue: row.expected_revenue.to_f64().unwrap_or(0.0),
            create_date: row.create_date,
            customer_name: row.customer_name,
            customer_industry: row.customer_industry,
            stage_name: row.stage_name,
            activity_deadline: row.activity_deadline,
            segment,
            deal_score: row.deal_score,
            recommended_action: row.ai_next_action,
            last_updated: row.last_ai_update,
            gift: GiftState {
                status,
                suggested_gift: row.suggested_gift,
                gift_value: row.gift_value,
                gift_sent_date: row.gift_sent_date,
            },
        })
    }
}

/// Postgres implementation over the CRM tables (`crm_lead` and its joins).
#[derive(Clone)]
pub struct PgOpportunityStore {
    pool: PgPool,
    /// Language used for translatable names such as stages and industries.
    language: String,
}

impl PgOpportunityStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

#[async_trait]
impl OpportunityStore for PgOpportunityStore {
    async fn fetch_by_ids(&self, ids: &[i64]) -> Result<Vec<Opportunity>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let query = select_opportunities();
        let rows = sqlx::query_as::<_, OpportunityRow>(&query)
            .bind(ids)
            .bind(&self.language)
            .fetch_all(&self.pool)
            .await
            .context("fetching opportunities")?;

        rows.into_iter().map(Opportunity::try_from).collect()
    }

    async fn qualifying_ids(&self) -> Result<Vec<i64>, AppError> {
        let ids: Vec<(i64,)> = sqlx::query_as(
            "SELECT id::int8 FROM crm_lead
             WHERE type = 'opportunity' AND COALESCE(active, true)
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("listing opportunities")?;

        Ok(ids.into_iter().map(|(id,)| id).collect())
    }

    async fn segmentation_rows(&self) -> Result<Vec<SegmentationRow>, AppError> {
        let rows: Vec<(i64, BigDecimal, f64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT id::int8,
                    COALESCE(expected_revenue, 0)::numeric,
                    COALESCE(probability, 0)::float8,
                    COALESCE(create_date, NOW() AT TIME ZONE 'UTC') AT TIME ZONE 'UTC'
             FROM crm_lead
             WHERE type = 'opportunity' AND COALESCE(active, true)
             ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .context("loading segmentation features")?;

        Ok(rows
            .into_iter()
            .map(
                |(id, expected_revenue, probability, create_date)| SegmentationRow {
                    id,
                    expected_revenue: expected_revenue.to_f64().unwrap_or(0.0),
                    probability,
                    create_date,
                },
            )
            .collect())
    }

    async fn save_segments(&self, assignments: &[(i64, Segment)]) -> Result<usize, AppError> {
        if assignments.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = assignments.iter().map(|(id, _)| *id).collect();
        let segments: Vec<String> = assignments
            .iter()
            .map(|(_, s)| s.as_str().to_string())
            .collect();

        // One statement for the whole batch
        let result = sqlx::query(
            "UPDATE crm_lead l
             SET customer_segment = v.segment,
                 write_date = NOW() AT TIME ZONE 'UTC'
             FROM UNNEST($1::int8[], $2::text[]) AS v(id, segment)
             WHERE l.id = v.id
               AND l.type = 'opportunity'",
        )
        .bind(&ids)
        .bind(&segments)
        .execute(&self.pool)
        .await
        .context("saving customer segments")?;

        Ok(result.rows_affected() as usize)
    }

    async fn apply_patch(&self, id: i64, patch: &OpportunityPatch) -> Result<(), AppError> {
        if patch.is_empty() {
            return Ok(());
        }

        // crm_lead stores naive UTC timestamps
        let result = sqlx::query(
            "UPDATE crm_lead
             SET customer_segment = COALESCE($2, customer_segment),
                 deal_score = COALESCE($3, deal_score),
                 ai_next_action = COALESCE($4, ai_next_action),
                 last_ai_update = COALESCE($5::timestamptz AT TIME ZONE 'UTC', last_ai_update),
                 write_date = NOW() AT TIME ZONE 'UTC'
             WHERE id = $1",
        )
        .bind(id)
        .bind(patch.segment.map(|s| s.as_str()))
        .bind(patch.deal_score)
        .bind(patch.recommended_action.as_deref())
        .bind(patch.last_updated)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating AI fields of opportunity {}", id))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Opportunity {} not found", id)));
        }
        Ok(())
    }

    async fn update_gift(
        &self,
        id: i64,
        expected: GiftStatus,
        gift: &GiftState,
    ) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE crm_lead
             SET gift_status = $3,
                 suggested_gift = $4,
                 gift_value = $5::float8,
                 gift_sent_date = $6,
                 write_date = NOW() AT TIME ZONE 'UTC'
             WHERE id = $1
               AND COALESCE(gift_status, 'pending') = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(gift.status.as_str())
        .bind(gift.suggested_gift.as_deref())
        .bind(gift.gift_value)
        .bind(gift.gift_sent_date)
        .execute(&self.pool)
        .await
        .with_context(|| format!("updating gift fields of opportunity {}", id))?;

        Ok(result.rows_affected() == 1)
    }

    async fn segment_report(&self) -> Result<Vec<SegmentSummary>, AppError> {
        let rows: Vec<(String, i64, Option<f64>, BigDecimal)> = sqlx::query_as(
            "SELECT customer_segment,
                    COUNT(*),
                    AVG(deal_score)::float8,
                    COALESCE(SUM(expected_revenue), 0)::numeric
             FROM crm_lead
             WHERE type = 'opportunity'
               AND COALESCE(active, true)
               AND customer_segment IS NOT NULL
             GROUP BY customer_segment",
        )
        .fetch_all(&self.pool)
        .await
        .context("building segment report")?;

        let mut summaries = Vec::with_capacity(rows.len());
        for (raw, opportunities, average_deal_score, revenue) in rows {
            let Ok(segment) = raw.parse::<Segment>() else {
                tracing::warn!("Skipping unknown segment '{}' in report", raw);
                continue;
            };
            summaries.push(SegmentSummary {
                segment,
                label: segment.label().to_string(),
                opportunities,
                average_deal_score,
                total_expected_revenue: revenue.to_f64().unwrap_or(0.0),
            });
        }

        Ok(complete_report(summaries))
    }
}
