//! Per-cast ingestion: stream events, viewer polls and live/offline
//! transitions turned into stored rows and bus events.

pub mod batch_writer;
pub mod monitor;

pub use batch_writer::BatchWriter;
pub use monitor::{session_id_for, CastMonitor, MonitorDeps, StatusChange};
