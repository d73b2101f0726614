// src/repositories/postgres/mod.rs

pub mod casts;
pub mod events;
pub mod outreach;
pub mod profiles;
pub mod triggers;

pub use casts::PostgresCastRepository;
pub use events::PostgresEventRepository;
pub use outreach::PostgresOutreachRepository;
pub use profiles::PostgresProfileRepository;
pub use triggers::PostgresTriggerRepository;
