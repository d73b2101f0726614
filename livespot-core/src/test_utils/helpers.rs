// File: livespot-core/src/test_utils/helpers.rs

use chrono::Utc;
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use livespot_common::models::{ActionType, Trigger, TriggerType, DEFAULT_TRIGGER_PRIORITY};
use crate::db::Database;
use crate::Error;

/// Pool for database-backed tests. Reads `TEST_DATABASE_URL`,
/// else uses `postgres://postgres@localhost/livespot_test`.
pub async fn create_test_db_pool() -> Result<Pool<Postgres>, Error> {
    let url = std::env::var("TEST_DATABASE_URL")
        .unwrap_or_else(|_| "postgres://postgres@localhost/livespot_test".to_string());

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await?;
    Ok(pool)
}

/// Connects, migrates and empties the tables tests write to.
pub async fn setup_test_database() -> Result<Database, Error> {
    let pool = create_test_db_pool().await?;
    let db = Database::from_pool(pool);
    db.migrate().await?;
    sqlx::query(
        "TRUNCATE dm_trigger_logs, dm_scenario_enrollments, dm_send_log, spy_messages, spy_viewers, \
         sessions, spy_user_profiles, user_segments, paid_users, stripchat_sessions, registered_casts, \
         dm_triggers CASCADE",
    )
    .execute(db.pool())
    .await?;
    Ok(db)
}

/// A direct-DM trigger with no cooldown history, generous limits and no segment filter.
pub fn sample_trigger(account_id: &str, trigger_type: TriggerType) -> Trigger {
    Trigger {
        id: Uuid::new_v4(),
        account_id: account_id.to_string(),
        name: format!("{} test", trigger_type),
        trigger_type,
        cast_name: None,
        condition_config: json!({}),
        action_type: ActionType::DirectDm,
        message_template: Some("Hi {username}, thanks for visiting {cast_name}!".to_string()),
        scenario_id: None,
        target_segments: Vec::new(),
        cooldown_hours: 24,
        daily_limit: 100,
        enabled: true,
        priority: DEFAULT_TRIGGER_PRIORITY,
    }
}

pub fn hours_ago(hours: i64) -> chrono::DateTime<Utc> {
    Utc::now() - chrono::Duration::hours(hours)
}
