// File: livespot-core/src/repositories/postgres/triggers.rs

use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Pool, Postgres, Row};
use tracing::warn;
use uuid::Uuid;

use livespot_common::error::Error;
use livespot_common::models::{ActionType, Trigger, TriggerLogEntry, TriggerType};
use livespot_common::traits::repository_traits::TriggerRepository;

pub struct PostgresTriggerRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresTriggerRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TriggerRepository for PostgresTriggerRepository {
    async fn list_enabled_triggers(&self) -> Result<Vec<Trigger>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT id, account_id, trigger_name, trigger_type, cast_name,
                   condition_config, action_type, message_template, scenario_id,
                   target_segments, cooldown_hours, daily_limit, enabled, priority
            FROM dm_triggers
            WHERE enabled = TRUE
            ORDER BY priority ASC, created_at ASC
            "#,
        )
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            let id: Uuid = r.try_get("id")?;
            let type_str: String = r.try_get("trigger_type")?;
            let Ok(trigger_type) = TriggerType::from_str(&type_str) else {
                warn!("[DB] trigger {} has unknown type '{}'; ignored", id, type_str);
                continue;
            };
            let action_str: String = r.try_get("action_type")?;
            let action_type = ActionType::from_str(&action_str).unwrap_or(ActionType::DirectDm);

            out.push(Trigger {
                id,
                account_id: r.try_get("account_id")?,
                name: r.try_get("trigger_name")?,
                trigger_type,
                cast_name: r.try_get("cast_name")?,
                condition_config: r.try_get::<Value, _>("condition_config")?,
                action_type,
                message_template: r.try_get("message_template")?,
                scenario_id: r.try_get("scenario_id")?,
                target_segments: r.try_get("target_segments")?,
                cooldown_hours: r.try_get("cooldown_hours")?,
                daily_limit: r.try_get("daily_limit")?,
                enabled: r.try_get("enabled")?,
                priority: r.try_get("priority")?,
            });
        }
        Ok(out)
    }

    async fn has_fired_for_user_since(
        &self,
        trigger_id: Uuid,
        user_name: &str,
        since: DateTime<Utc>,
    ) -> Result<bool, Error> {
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM dm_trigger_logs
                WHERE trigger_id = $1
                  AND username = $2
                  AND status IN ('dm_queued', 'scenario_enrolled')
                  AND triggered_at >= $3
            ) AS fired
            "#,
        )
            .bind(trigger_id)
            .bind(user_name)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("fired")?)
    }

    async fn count_fired_since(&self, trigger_id: Uuid, since: DateTime<Utc>) -> Result<i64, Error> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) AS cnt
            FROM dm_trigger_logs
            WHERE trigger_id = $1
              AND status IN ('dm_queued', 'scenario_enrolled')
              AND triggered_at >= $2
            "#,
        )
            .bind(trigger_id)
            .bind(since)
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get("cnt")?)
    }

    async fn insert_trigger_log(&self, entry: &TriggerLogEntry) -> Result<(), Error> {
        sqlx::query(
            r#"
            INSERT INTO dm_trigger_logs (
                trigger_id, account_id, cast_name, username, status,
                dm_send_log_id, enrollment_id, error_message, metadata, triggered_at
            )
            VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10)
            "#,
        )
            .bind(entry.trigger_id)
            .bind(&entry.account_id)
            .bind(&entry.cast_name)
            .bind(&entry.user_name)
            .bind(entry.action_taken.to_string())
            .bind(entry.outreach_id)
            .bind(entry.enrollment_id)
            .bind(&entry.error_message)
            .bind(&entry.metadata)
            .bind(entry.triggered_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn enroll_scenario(
        &self,
        scenario_id: Uuid,
        account_id: &str,
        cast_name: &str,
        user_name: &str,
    ) -> Result<Option<Uuid>, Error> {
        let row = sqlx::query(
            r#"
            INSERT INTO dm_scenario_enrollments (id, scenario_id, account_id, cast_name, username)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (scenario_id, username, cast_name) DO NOTHING
            RETURNING id
            "#,
        )
            .bind(Uuid::new_v4())
            .bind(scenario_id)
            .bind(account_id)
            .bind(cast_name)
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(Some(r.try_get("id")?)),
            None => Ok(None),
        }
    }
}
