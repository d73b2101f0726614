// File: livespot-core/src/repositories/postgres/casts.rs

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Pool, Postgres, Row};

use livespot_common::error::Error;
use livespot_common::models::{PlatformSession, RegisteredCast};
use livespot_common::traits::repository_traits::CastRepository;

pub struct PostgresCastRepository {
    pub pool: Pool<Postgres>,
}

impl PostgresCastRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

/// `cookies_json` is a flat `name -> value` object; non-string values are stringified.
fn cookie_jar(value: &Value) -> BTreeMap<String, String> {
    value
        .as_object()
        .map(|obj| {
            obj.iter()
                .map(|(k, v)| {
                    let text = match v {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), text)
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl CastRepository for PostgresCastRepository {
    async fn registered_casts(&self, account_id: &str) -> Result<Vec<RegisteredCast>, Error> {
        let rows = sqlx::query(
            r#"
            SELECT account_id, cast_name, stripchat_user_id, is_active
            FROM registered_casts
            WHERE account_id = $1 AND is_active = TRUE
            ORDER BY cast_name
            "#,
        )
            .bind(account_id)
            .fetch_all(&self.pool)
            .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            out.push(RegisteredCast {
                account_id: r.try_get("account_id")?,
                cast_name: r.try_get("cast_name")?,
                platform_user_id: r.try_get("stripchat_user_id")?,
                is_active: r.try_get("is_active")?,
            });
        }
        Ok(out)
    }

    async fn active_session(&self, account_id: &str) -> Result<Option<PlatformSession>, Error> {
        let row = sqlx::query(
            r#"
            SELECT account_id, stripchat_user_id, session_cookie, csrf_token, cookies_json
            FROM stripchat_sessions
            WHERE account_id = $1 AND is_valid = TRUE
            ORDER BY updated_at DESC
            LIMIT 1
            "#,
        )
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(r) = row {
            let cookies: Value = r.try_get("cookies_json")?;
            Ok(Some(PlatformSession {
                account_id: r.try_get("account_id")?,
                platform_user_id: r.try_get("stripchat_user_id")?,
                session_cookie: r.try_get("session_cookie")?,
                csrf_token: r.try_get("csrf_token")?,
                cookies: cookie_jar(&cookies),
            }))
        } else {
            Ok(None)
        }
    }

    async fn mark_session_invalid(&self, account_id: &str) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE stripchat_sessions
            SET is_valid = FALSE, updated_at = now()
            WHERE account_id = $1 AND is_valid = TRUE
            "#,
        )
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn cached_user_id(&self, user_name: &str) -> Result<Option<String>, Error> {
        let row = sqlx::query(
            r#"
            SELECT user_id_stripchat FROM paid_users
            WHERE user_name = $1 AND user_id_stripchat IS NOT NULL AND user_id_stripchat <> ''
            LIMIT 1
            "#,
        )
            .bind(user_name)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(r) => Ok(r.try_get("user_id_stripchat")?),
            None => Ok(None),
        }
    }

    async fn user_levels(&self, account_id: &str, user_names: &[String]) -> Result<HashMap<String, i64>, Error> {
        if user_names.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = sqlx::query(
            r#"
            SELECT user_name, MAX(user_level)::BIGINT AS user_level
            FROM paid_users
            WHERE account_id = $1 AND user_name = ANY($2)
            GROUP BY user_name
            "#,
        )
            .bind(account_id)
            .bind(user_names)
            .fetch_all(&self.pool)
            .await?;

        let mut out = HashMap::with_capacity(rows.len());
        for r in rows {
            out.insert(r.try_get("user_name")?, r.try_get("user_level")?);
        }
        Ok(out)
    }

    async fn raise_user_level(&self, account_id: &str, user_name: &str, level: i64) -> Result<(), Error> {
        sqlx::query(
            r#"
            UPDATE paid_users
            SET user_level = $3, updated_at = now()
            WHERE account_id = $1 AND user_name = $2 AND user_level < $3
            "#,
        )
            .bind(account_id)
            .bind(user_name)
            .bind(level)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
