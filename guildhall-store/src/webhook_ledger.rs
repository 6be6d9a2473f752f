use async_trait::async_trait;
use chrono::{DateTime, Utc};
use guildhall_core::repository::{LedgerClaim, RepoResult, WebhookLedger};
use sqlx::PgPool;

/// `processed_webhook_events` backed ledger. Claims are a single
/// insert-if-absent, so concurrent deliveries of one event race safely.
pub struct StoreWebhookLedger {
    pool: PgPool,
}

impl StoreWebhookLedger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookLedger for StoreWebhookLedger {
    async fn claim(
        &self,
        provider: &str,
        event_id: &str,
        event_type: &str,
        stale_before: DateTime<Utc>,
    ) -> RepoResult<LedgerClaim> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO processed_webhook_events (provider, event_id, event_type, status, claimed_at)
            VALUES ($1, $2, $3, 'processing', NOW())
            ON CONFLICT (provider, event_id) DO NOTHING
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(event_type)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            return Ok(LedgerClaim::Claimed);
        }

        // Take over a claim whose holder never finished.
        let taken = sqlx::query(
            r#"
            UPDATE processed_webhook_events SET claimed_at = NOW()
            WHERE provider = $1 AND event_id = $2 AND status = 'processing' AND claimed_at < $3
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .bind(stale_before)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if taken == 1 {
            return Ok(LedgerClaim::Claimed);
        }

        let status: Option<(String,)> = sqlx::query_as(
            "SELECT status FROM processed_webhook_events WHERE provider = $1 AND event_id = $2",
        )
        .bind(provider)
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(match status {
            Some((s,)) if s == "processed" => LedgerClaim::AlreadyProcessed,
            Some(_) => LedgerClaim::InProgress,
            // Released between our insert and select; the retry will claim it.
            None => LedgerClaim::InProgress,
        })
    }

    async fn complete(&self, provider: &str, event_id: &str) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE processed_webhook_events SET status = 'processed', processed_at = NOW()
            WHERE provider = $1 AND event_id = $2
            "#,
        )
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn release(&self, provider: &str, event_id: &str) -> RepoResult<()> {
        sqlx::query(
            "DELETE FROM processed_webhook_events WHERE provider = $1 AND event_id = $2 AND status = 'processing'",
        )
        .bind(provider)
        .bind(event_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
