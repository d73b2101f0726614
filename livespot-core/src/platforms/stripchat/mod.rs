//! Stripchat live-stream plumbing: the Centrifugo-style websocket client,
//! its frame codec and the public REST polls.

pub mod client;
pub mod frames;
pub mod rest;

pub use client::{StreamClient, StreamClientConfig, StreamEvent, StreamTarget};
pub use rest::{CastStatus, PlatformRest, StatusResult};

pub const ORIGIN: &str = "https://stripchat.com";
