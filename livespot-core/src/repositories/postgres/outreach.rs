// File: livespot-core/src/repositories/postgres/outreach.rs

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};

use livespot_common::error::Error;
use livespot_common::models::{NewOutreachRecord, OutreachRecord, OutreachStatus};
use livespot_common::traits::repository_traits::OutreachRepository;

pub struct PostgresOutreachRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresOutreachRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn record_from_row(r: &PgRow) -> Result<OutreachRecord, Error> {
    let status_str: String = r.try_get("status")?;
    let status = OutreachStatus::from_str(&status_str).map_err(Error::Parse)?;
    Ok(OutreachRecord {
        id: r.try_get("id")?,
        account_id: r.try_get("account_id")?,
        user_name: r.try_get("user_name")?,
        message: r.try_get("message")?,
        cast_name: r.try_get("cast_name")?,
        status,
        campaign: r.try_get("campaign")?,
        target_user_id: r.try_get("target_user_id")?,
        attempts: r.try_get("attempts")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        sent_at: r.try_get::<Option<DateTime<Utc>>, _>("sent_at")?,
        error: r.try_get("error")?,
        sent_via: r.try_get("sent_via")?,
    })
}

#[async_trait]
impl OutreachRepository for PostgresOutreachRepository {
    async fn enqueue(&self, record: &NewOutreachRecord) -> Result<i64, Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO dm_send_log (account_id, cast_name, user_name, message, status, campaign, template_name)
            VALUES ($1, $2, $3, $4, 'queued', NULLIF($5, ''), $6)
            RETURNING id
            "#,
        )
            .bind(&record.account_id)
            .bind(&record.cast_name)
            .bind(&record.user_name)
            .bind(&record.message)
            .bind(&record.campaign)
            .bind(&record.template_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("id")?)
    }

    async fn fetch_queued(&self, created_before: DateTime<Utc>, limit: i64) -> Result<Vec<OutreachRecord>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, user_name, message, cast_name, status, campaign,
                   target_user_id, attempts, created_at, sent_at, error, sent_via
            FROM dm_send_log
            WHERE status = 'queued'
              AND created_at < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
            "#,
        )
            .bind(created_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(record_from_row).collect()
    }

    async fn claim(&self, id: i64) -> Result<bool, Error> {
        let done = sqlx::query(
            r#"
            UPDATE dm_send_log
            SET status = 'sending', sent_via = 'api'
            WHERE id = $1 AND status = 'queued'
            "#,
        )
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() == 1)
    }

    async fn mark_success(&self, id: i64, target_user_id: Option<&str>) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE dm_send_log
            SET status = 'success',
                sent_via = 'api',
                sent_at = now(),
                error = NULL,
                target_user_id = COALESCE($2, target_user_id)
            WHERE id = $1
            "#,
        )
            .bind(id)
            .bind(target_user_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn mark_error(&self, id: i64, detail: &str) -> Result<(), Error> {
        self.mark_blocked(id, OutreachStatus::Error, detail).await
    }

    async fn mark_blocked(&self, id: i64, status: OutreachStatus, detail: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE dm_send_log
            SET status = $2, sent_via = 'api', error = $3
            WHERE id = $1
            "#,
        )
            .bind(id)
            .bind(status.to_string())
            .bind(detail)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn requeue(&self, id: i64) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE dm_send_log
            SET status = 'queued', attempts = attempts + 1
            WHERE id = $1
            "#,
        )
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn count_sent_since(&self, account_id: &str, since: DateTime<Utc>) -> Result<i64, Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM dm_send_log
            WHERE account_id = $1
              AND status = 'success'
              AND sent_at >= $2
            "#,
        )
            .bind(account_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }

    async fn has_recent_success(
        &self,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM dm_send_log
                WHERE account_id = $1
                  AND cast_name = $2
                  AND user_name = $3
                  AND status = 'success'
                  AND sent_at >= $4
            ) AS hit
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(user_name)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("hit")?)
    }

    async fn queue_count(&self, account_id: &str) -> Result<i64, Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM dm_send_log
            WHERE account_id = $1 AND status = 'queued'
            "#,
        )
            .bind(account_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }
}
