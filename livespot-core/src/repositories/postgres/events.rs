// File: livespot-core/src/repositories/postgres/events.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use livespot_common::error::Error;
use livespot_common::models::{NormalizedMessage, NormalizedSession, NormalizedViewer};
use livespot_common::traits::repository_traits::EventRepository;

pub struct PostgresEventRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresEventRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventRepository for PostgresEventRepository {
    async fn insert_messages(&self, messages: &[NormalizedMessage]) -> Result<(), Error> {
        if messages.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for m in messages {
            sqlx::query(
                r#"
                INSERT INTO spy_messages (
                    account_id, cast_name, message_time, msg_type, user_name,
                    message, tokens, is_vip, session_id, user_league, user_level, metadata
                )
                VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
                "#,
            )
                .bind(&m.account_id)
                .bind(&m.cast_name)
                .bind(m.message_time)
                .bind(m.kind.to_string())
                .bind(&m.user_name)
                .bind(&m.message)
                .bind(m.tokens)
                .bind(m.is_vip)
                .bind(m.session_id)
                .bind(&m.user_league)
                .bind(m.user_level)
                .bind(Value::Object(m.metadata.clone()))
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn upsert_viewers(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Option<Uuid>,
        viewers: &[NormalizedViewer],
    ) -> Result<(), Error> {
        if viewers.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for v in viewers {
            sqlx::query(
                r#"
                INSERT INTO spy_viewers (
                    account_id, cast_name, session_id, user_name, user_id_stripchat,
                    league, level, is_fan_club, is_new_user
                )
                VALUES ($1,$2,$3,$4,NULLIF($5, ''),$6,$7,$8,$9)
                ON CONFLICT (account_id, cast_name,
                             (COALESCE(session_id, '00000000-0000-0000-0000-000000000000'::uuid)),
                             (lower(user_name)))
                DO UPDATE SET
                    visit_count = spy_viewers.visit_count + 1,
                    last_seen_at = now(),
                    league = COALESCE(NULLIF(EXCLUDED.league, ''), spy_viewers.league),
                    level = GREATEST(spy_viewers.level, EXCLUDED.level),
                    is_fan_club = spy_viewers.is_fan_club OR EXCLUDED.is_fan_club,
                    user_id_stripchat = COALESCE(EXCLUDED.user_id_stripchat, spy_viewers.user_id_stripchat)
                "#,
            )
                .bind(account_id)
                .bind(cast_name)
                .bind(session_id)
                .bind(&v.user_name)
                .bind(&v.user_id)
                .bind(&v.league)
                .bind(v.level)
                .bind(v.is_fan_club)
                .bind(v.is_new)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn open_session(&self, session: &NormalizedSession) -> Result<Uuid, Error> {
        let inserted = sqlx::query(
            r#"
            INSERT INTO sessions (session_id, account_id, cast_name, started_at, ended_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            RETURNING session_id
            "#,
        )
            .bind(session.session_id)
            .bind(session.account_id)
            .bind(&session.cast_name)
            .bind(session.started_at)
            .bind(session.ended_at)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = inserted {
            return Ok(r.try_get("session_id")?);
        }

        // Unique conflict: reuse whichever session is still open for the cast.
        let active = sqlx::query(
            r#"
            SELECT session_id FROM sessions
            WHERE account_id = $1 AND cast_name = $2 AND ended_at IS NULL
            ORDER BY started_at DESC
            LIMIT 1
            "#,
        )
            .bind(session.account_id)
            .bind(&session.cast_name)
            .fetch_optional(&self.pool)
            .await?;

        match active {
            Some(r) => Ok(r.try_get("session_id")?),
            None => Ok(session.session_id),
        }
    }

    async fn close_session(&self, session_id: Uuid, ended_at: DateTime<Utc>) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = GREATEST($2, started_at)
            WHERE session_id = $1
            "#,
        )
            .bind(session_id)
            .bind(ended_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn close_stale_sessions(&self, account_id: &str, cast_name: &str) -> Result<u64, Error> {
        let done = sqlx::query(
            r#"
            UPDATE sessions
            SET ended_at = GREATEST(now(), started_at)
            WHERE account_id::text = $1
              AND cast_name = $2
              AND ended_at IS NULL
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected())
    }
}
