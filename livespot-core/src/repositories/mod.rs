// src/repositories/mod.rs

pub mod postgres;

pub use postgres::{
    PostgresCastRepository, PostgresEventRepository, PostgresOutreachRepository, PostgresProfileRepository,
    PostgresTriggerRepository,
};
