//! Process configuration read from the environment (after `.env` is loaded).

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_WS_URL: &str = "wss://websocket-sp-v6.stripchat.com/connection/websocket";
pub const DEFAULT_MODEL: &str = "Risa_06";

/// Whitelist used while test mode is on and `DM_WHITELIST` is unset.
pub const DEFAULT_WHITELIST: &[&str] = &["pojipojipoji", "kantou1234", "Nekomeem34"];

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub static_jwt: Option<String>,
    pub static_cf_clearance: Option<String>,
    pub ws_url: String,
    pub model: String,
    pub capture_command: Option<String>,
    pub capture_timeout: Duration,
    pub state_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct OutreachConfig {
    pub test_mode: bool,
    pub whitelist: Vec<String>,
    pub send_interval: Duration,
    pub daily_limit: i64,
    pub user_cooldown_hours: i64,
    pub poll_interval: Duration,
    pub batch_size: i64,
    pub max_attempts: i32,
}

/// Result-set caps per evaluator. Flood prevention only; the numbers are tunable.
#[derive(Debug, Clone)]
pub struct EvaluatorCaps {
    pub first_visit: usize,
    pub vip_no_tip: usize,
    pub churn_risk: usize,
    pub competitor_outflow: usize,
    pub cross_promotion: usize,
    pub post_session: usize,
    pub segment_upgrade: usize,
}

impl Default for EvaluatorCaps {
    fn default() -> Self {
        Self {
            first_visit: 50,
            vip_no_tip: 50,
            churn_risk: 50,
            competitor_outflow: 30,
            cross_promotion: 20,
            post_session: 50,
            segment_upgrade: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PollConfig {
    pub status_interval: Duration,
    pub viewer_interval: Duration,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub auth: AuthConfig,
    pub outreach: OutreachConfig,
    pub caps: EvaluatorCaps,
    pub poll: PollConfig,
}

impl AppConfig {
    pub fn from_env() -> Self {
        let caps = EvaluatorCaps::default();
        Self {
            auth: AuthConfig {
                static_jwt: env_opt("STRIPCHAT_JWT"),
                static_cf_clearance: env_opt("STRIPCHAT_CF_CLEARANCE"),
                ws_url: env_opt("STRIPCHAT_WS_URL").unwrap_or_else(|| DEFAULT_WS_URL.to_string()),
                model: env_opt("STRIPCHAT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
                capture_command: env_opt("AUTH_CAPTURE_COMMAND"),
                capture_timeout: Duration::from_secs(env_num("AUTH_CAPTURE_TIMEOUT_SECS", 90)),
                state_dir: PathBuf::from(env_opt("AUTH_STATE_DIR").unwrap_or_else(|| ".auth".to_string())),
            },
            outreach: OutreachConfig {
                test_mode: test_mode_from(env_opt("DM_TEST_MODE").as_deref()),
                whitelist: whitelist_from(env_opt("DM_WHITELIST").as_deref()),
                send_interval: Duration::from_millis(env_num("DM_SEND_INTERVAL_MS", 3000)),
                daily_limit: env_num("DM_DAILY_LIMIT", 5000),
                user_cooldown_hours: env_num("DM_USER_COOLDOWN_HOURS", 24),
                poll_interval: Duration::from_secs(env_num("DM_POLL_INTERVAL_SECS", 10)),
                batch_size: env_num("DM_BATCH_SIZE", 20),
                max_attempts: env_num("DM_MAX_ATTEMPTS", 3),
            },
            caps: EvaluatorCaps {
                first_visit: env_num("TRIGGER_CAP_FIRST_VISIT", caps.first_visit),
                vip_no_tip: env_num("TRIGGER_CAP_VIP", caps.vip_no_tip),
                churn_risk: env_num("TRIGGER_CAP_CHURN", caps.churn_risk),
                competitor_outflow: env_num("TRIGGER_CAP_COMPETITOR", caps.competitor_outflow),
                cross_promotion: env_num("TRIGGER_CAP_CROSS", caps.cross_promotion),
                post_session: env_num("TRIGGER_CAP_POST_SESSION", caps.post_session),
                segment_upgrade: env_num("TRIGGER_CAP_SEGMENT", caps.segment_upgrade),
            },
            poll: PollConfig {
                status_interval: Duration::from_secs(env_num("STATUS_POLL_SECS", 180)),
                viewer_interval: Duration::from_secs(env_num("VIEWER_POLL_SECS", 60)),
            },
        }
    }
}

/// Test mode stays on unless explicitly switched off.
pub fn test_mode_from(raw: Option<&str>) -> bool {
    match raw.map(|s| s.trim().to_lowercase()) {
        Some(v) => !matches!(v.as_str(), "false" | "off" | "0"),
        None => true,
    }
}

pub fn whitelist_from(raw: Option<&str>) -> Vec<String> {
    match raw {
        Some(list) if !list.trim().is_empty() => list
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
        _ => DEFAULT_WHITELIST.iter().map(|s| s.to_string()).collect(),
    }
}

fn env_opt(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_num<T: std::str::FromStr>(key: &str, default: T) -> T {
    env_opt(key).and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
