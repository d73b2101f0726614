// livespot-core/src/tasks/mod.rs

pub mod cast_monitors;
pub mod credential_refresh;
pub mod outreach_worker;
pub mod profile_flush;
pub mod trigger_dispatch;
pub mod trigger_schedule;
