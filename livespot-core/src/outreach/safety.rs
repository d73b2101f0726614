// livespot-core/src/outreach/safety.rs

use std::collections::{HashMap, HashSet};

use tracing::warn;

use livespot_common::error::SafetyViolation;
use livespot_common::models::RegisteredCast;

use crate::config::OutreachConfig;

/// Prefixes that legitimate campaign submitters use.
const CAMPAIGN_PREFIXES: &[&str] = &["pipe", "seq", "bulk", "trigger_"];

/// Campaign tags must come from a known submission flow. `TEST` is allowed
/// for end-to-end checks.
pub fn is_valid_campaign(campaign: &str) -> bool {
    if campaign.is_empty() {
        return false;
    }
    campaign == "TEST"
        || CAMPAIGN_PREFIXES.iter().any(|p| campaign.starts_with(p))
        || campaign.contains("_sched_")
}

/// Pre-send guardrails: mandatory campaign tag, then the test-mode whitelist.
///
/// Cast identity is checked separately through [`CastIdentity`] because it
/// depends on the account's live platform session.
#[derive(Debug, Clone)]
pub struct SafetyGate {
    test_mode: bool,
    whitelist: HashSet<String>,
}

impl SafetyGate {
    pub fn new<I, S>(test_mode: bool, whitelist: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            test_mode,
            whitelist: whitelist.into_iter().map(Into::into).collect(),
        }
    }

    pub fn from_config(config: &OutreachConfig) -> Self {
        Self::new(config.test_mode, config.whitelist.iter().cloned())
    }

    pub fn test_mode(&self) -> bool {
        self.test_mode
    }

    pub fn whitelist(&self) -> impl Iterator<Item = &String> {
        self.whitelist.iter()
    }

    pub fn check_campaign(campaign: Option<&str>) -> Result<&str, SafetyViolation> {
        match campaign.map(str::trim) {
            Some(c) if !c.is_empty() => Ok(c),
            _ => Err(SafetyViolation::CampaignRequired),
        }
    }

    /// Whitelist membership is exact-case.
    pub fn check_test_mode(&self, user_name: &str) -> Result<(), SafetyViolation> {
        if !self.test_mode || self.whitelist.contains(user_name) {
            return Ok(());
        }
        Err(SafetyViolation::TestModeBlocked {
            user_name: user_name.to_string(),
        })
    }

    /// First failure wins: campaign, then test mode.
    pub fn guard_send(&self, user_name: &str, campaign: Option<&str>) -> Result<(), SafetyViolation> {
        Self::check_campaign(campaign)?;
        self.check_test_mode(user_name)
    }
}

/// Registered cast → platform user id, paired with the user id the account's
/// logged-in session acts as.
#[derive(Debug, Clone, Default)]
pub struct CastIdentity {
    casts: HashMap<String, String>,
    session_user_id: Option<String>,
}

impl CastIdentity {
    pub fn new(casts: &[RegisteredCast], session_user_id: Option<&str>) -> Self {
        let casts = casts
            .iter()
            .filter(|c| c.is_active)
            .filter_map(|c| {
                c.platform_user_id
                    .as_ref()
                    .filter(|id| !id.is_empty())
                    .map(|id| (c.cast_name.clone(), id.clone()))
            })
            .collect();
        Self {
            casts,
            session_user_id: session_user_id.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// Passes (with a warning) when the cast is unregistered or no session
    /// identity is known.
    pub fn verify(&self, cast_name: &str) -> Result<(), SafetyViolation> {
        if cast_name.is_empty() {
            return Ok(());
        }
        let Some(expected) = self.casts.get(cast_name) else {
            warn!("[Outreach] cast '{}' has no registered platform id; identity unchecked", cast_name);
            return Ok(());
        };
        let Some(actual) = self.session_user_id.as_ref() else {
            warn!("[Outreach] no session identity known; cast '{}' unchecked", cast_name);
            return Ok(());
        };
        if expected != actual {
            return Err(SafetyViolation::IdentityMismatch {
                cast_name: cast_name.to_string(),
                expected: expected.clone(),
                actual: actual.clone(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cast(name: &str, id: Option<&str>) -> RegisteredCast {
        RegisteredCast {
            account_id: "acct".into(),
            cast_name: name.into(),
            platform_user_id: id.map(str::to_string),
            is_active: true,
        }
    }

    #[test]
    fn campaign_formats() {
        for ok in ["TEST", "pipe3_x", "seq_welcome", "bulk_0301", "trigger_first_visit_abcd1234", "x_sched_y"] {
            assert!(is_valid_campaign(ok), "{ok}");
        }
        for bad in ["", "test", "manual", "trigger"] {
            assert!(!is_valid_campaign(bad), "{bad}");
        }
    }

    #[test]
    fn missing_campaign_wins_over_test_mode() {
        let gate = SafetyGate::new(true, ["alice"]);
        assert_eq!(gate.guard_send("mallory", None), Err(SafetyViolation::CampaignRequired));
        assert_eq!(gate.guard_send("mallory", Some("   ")), Err(SafetyViolation::CampaignRequired));
        let err = gate.guard_send("mallory", Some("TEST")).unwrap_err();
        assert_eq!(err.code(), "TEST_MODE_BLOCKED");
        assert!(gate.guard_send("alice", Some("TEST")).is_ok());
    }

    #[test]
    fn whitelist_is_case_sensitive() {
        let gate = SafetyGate::new(true, ["Nekomeem34"]);
        assert!(gate.check_test_mode("Nekomeem34").is_ok());
        assert!(gate.check_test_mode("nekomeem34").is_err());
    }

    #[test]
    fn test_mode_off_allows_anyone() {
        let gate = SafetyGate::new(false, Vec::<String>::new());
        assert!(gate.guard_send("anyone", Some("bulk_1")).is_ok());
    }

    #[test]
    fn identity_mismatch_is_rejected() {
        let identity = CastIdentity::new(&[cast("risa", Some("100")), cast("hana", Some("200"))], Some("100"));
        assert!(identity.verify("risa").is_ok());
        let err = identity.verify("hana").unwrap_err();
        assert_eq!(err.code(), "CAST_IDENTITY_MISMATCH");
    }

    #[test]
    fn unknown_identity_passes() {
        let identity = CastIdentity::new(&[cast("risa", None)], Some("100"));
        assert!(identity.verify("risa").is_ok());
        assert!(identity.verify("unregistered").is_ok());

        let no_session = CastIdentity::new(&[cast("risa", Some("100"))], None);
        assert!(no_session.verify("risa").is_ok());
    }
}
