// src/lib.rs

pub mod auth;
pub mod config;
pub mod db;
pub mod eventbus;
pub mod extract;
pub mod ingest;
pub mod normalizer;
pub mod outreach;
pub mod parsers;
pub mod platforms;
pub mod profiles;
pub mod repositories;
pub mod retry;
pub mod store;
pub mod tasks;
pub mod test_utils;
pub mod ticket_show;
pub mod triggers;
pub mod utils;

pub use db::Database;
pub use livespot_common::error::Error;
