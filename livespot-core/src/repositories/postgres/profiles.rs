// File: livespot-core/src/repositories/postgres/profiles.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use livespot_common::error::Error;
use livespot_common::models::{SegmentMember, SessionTipTotal, SpyProfileRow};
use livespot_common::traits::repository_traits::ProfileRepository;

pub struct PostgresProfileRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresProfileRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn profile_from_row(r: &PgRow) -> Result<SpyProfileRow, Error> {
    Ok(SpyProfileRow {
        user_name: r.try_get("user_name")?,
        cast_name: r.try_get("cast_name")?,
        total_tokens: r.try_get("total_tokens")?,
        message_count: r.try_get("message_count")?,
        last_seen: r.try_get::<Option<DateTime<Utc>>, _>("last_seen")?,
    })
}

fn tip_from_row(r: &PgRow) -> Result<SessionTipTotal, Error> {
    Ok(SessionTipTotal {
        user_name: r.try_get("user_name")?,
        tokens: r.try_get("tokens")?,
    })
}

fn names(rows: Vec<PgRow>) -> Result<Vec<String>, Error> {
    rows.iter()
        .map(|r| r.try_get::<String, _>("user_name").map_err(Error::from))
        .collect()
}

#[async_trait]
impl ProfileRepository for PostgresProfileRepository {
    async fn known_viewers(&self, account_id: &str, cast_name: &str) -> Result<Vec<String>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_name FROM spy_user_profiles
            WHERE account_id = $1 AND cast_name = $2 AND is_registered_cast = TRUE
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .fetch_all(&self.pool)
            .await?;
        names(rows)
    }

    async fn session_viewers(&self, account_id: &str, cast_name: &str, session_id: Uuid) -> Result<Vec<String>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT user_name FROM spy_viewers
            WHERE account_id = $1 AND cast_name = $2 AND session_id = $3
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        names(rows)
    }

    async fn session_tippers(&self, account_id: &str, cast_name: &str, session_id: Uuid) -> Result<Vec<String>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT user_name FROM spy_messages
            WHERE account_id = $1 AND cast_name = $2 AND session_id = $3 AND tokens > 0
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        names(rows)
    }

    async fn session_token_totals(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_name, SUM(tokens)::BIGINT AS tokens
            FROM spy_messages
            WHERE account_id = $1 AND cast_name = $2 AND session_id = $3 AND tokens > 0
            GROUP BY user_name
            ORDER BY tokens DESC
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(tip_from_row).collect()
    }

    async fn session_tip_events(
        &self,
        account_id: &str,
        cast_name: &str,
        session_id: Uuid,
    ) -> Result<Vec<SessionTipTotal>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_name, tokens
            FROM spy_messages
            WHERE account_id = $1 AND cast_name = $2 AND session_id = $3 AND tokens > 0
            ORDER BY message_time ASC
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(session_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(tip_from_row).collect()
    }

    async fn own_profiles_for_users(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        user_names: &[String],
        min_total_tokens: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        if user_names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT user_name, cast_name, total_tokens, message_count, last_seen
            FROM spy_user_profiles
            WHERE account_id = $1
              AND is_registered_cast = TRUE
              AND ($2::TEXT IS NULL OR cast_name = $2)
              AND user_name = ANY($3)
              AND total_tokens >= $4
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(user_names)
            .bind(min_total_tokens)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn dormant_own_profiles(
        &self,
        account_id: &str,
        cast_name: Option<&str>,
        min_total_tokens: i64,
        last_seen_before: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_name, cast_name, total_tokens, message_count, last_seen
            FROM spy_user_profiles
            WHERE account_id = $1
              AND is_registered_cast = TRUE
              AND ($2::TEXT IS NULL OR cast_name = $2)
              AND total_tokens >= $3
              AND last_seen < $4
            ORDER BY total_tokens DESC
            LIMIT $5
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .bind(min_total_tokens)
            .bind(last_seen_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn competitor_spenders(
        &self,
        account_id: &str,
        min_total_tokens: i64,
        limit: i64,
    ) -> Result<Vec<SpyProfileRow>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT user_name, cast_name, total_tokens, message_count, last_seen
            FROM spy_user_profiles
            WHERE account_id = $1
              AND is_registered_cast = FALSE
              AND total_tokens >= $2
            ORDER BY total_tokens DESC
            LIMIT $3
            "#,
        )
            .bind(account_id)
            .bind(min_total_tokens)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn own_visits(&self, account_id: &str, cast_names: &[String], min_visits: i64) -> Result<Vec<SpyProfileRow>, Error> {
        if cast_names.is_empty() {
            return Ok(Vec::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT user_name, cast_name, total_tokens, message_count, last_seen
            FROM spy_user_profiles
            WHERE account_id = $1
              AND is_registered_cast = TRUE
              AND cast_name = ANY($2)
              AND message_count >= $3
            "#,
        )
            .bind(account_id)
            .bind(cast_names)
            .bind(min_visits)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(profile_from_row).collect()
    }

    async fn user_segments(&self, account_id: &str, cast_name: &str) -> Result<Vec<SegmentMember>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT segment_id, user_name, total_coins
            FROM user_segments
            WHERE account_id = $1 AND cast_name = $2
            "#,
        )
            .bind(account_id)
            .bind(cast_name)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(SegmentMember {
                segment_id: r.try_get("segment_id")?,
                user_name: r.try_get("user_name")?,
                total_coins: r.try_get("total_coins")?,
            });
        }
        Ok(out)
    }
}
