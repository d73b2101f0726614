// livespot-core/src/platforms/mod.rs

pub mod stripchat;
