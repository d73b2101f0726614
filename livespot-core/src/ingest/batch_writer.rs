// livespot-core/src/ingest/batch_writer.rs

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use livespot_common::models::NormalizedMessage;
use livespot_common::traits::EventRepository;
use crate::Error;

pub const DEFAULT_CAPACITY: usize = 500;
pub const FLUSH_INTERVAL: Duration = Duration::from_secs(30);

/// Buffers message rows and writes them in batches.
pub struct BatchWriter {
    repo: Arc<dyn EventRepository>,
    buffer: Mutex<Vec<NormalizedMessage>>,
    capacity: usize,
    /// Serializes flushes so a timed flush and a size flush never interleave.
    flushing: tokio::sync::Mutex<()>,
}

impl BatchWriter {
    pub fn new(repo: Arc<dyn EventRepository>) -> Self {
        Self::with_capacity(repo, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(repo: Arc<dyn EventRepository>, capacity: usize) -> Self {
        Self {
            repo,
            buffer: Mutex::new(Vec::with_capacity(capacity)),
            capacity: capacity.max(1),
            flushing: tokio::sync::Mutex::new(()),
        }
    }

    pub fn pending(&self) -> usize {
        self.buffer.lock().len()
    }

    /// Adds a row; flushes once the buffer reaches capacity.
    pub async fn push(&self, message: NormalizedMessage) {
        let full = {
            let mut buf = self.buffer.lock();
            buf.push(message);
            buf.len() >= self.capacity
        };
        if full {
            if let Err(e) = self.flush().await {
                warn!("[DB] size-triggered flush failed: {}", e);
            }
        }
    }

    /// Writes everything buffered. On failure the rows go back to the front
    /// of the buffer while it stays under twice the capacity; beyond that they
    /// are dropped.
    pub async fn flush(&self) -> Result<usize, Error> {
        let _guard = self.flushing.lock().await;
        let batch: Vec<NormalizedMessage> = std::mem::take(&mut *self.buffer.lock());
        if batch.is_empty() {
            return Ok(0);
        }

        match self.repo.insert_messages(&batch).await {
            Ok(()) => {
                debug!("[DB] flushed {} messages", batch.len());
                Ok(batch.len())
            }
            Err(e) => {
                let mut buf = self.buffer.lock();
                if buf.len() + batch.len() < self.capacity * 2 {
                    let newer = std::mem::take(&mut *buf);
                    *buf = batch;
                    buf.extend(newer);
                    warn!("[DB] flush failed, {} rows kept for retry: {}", buf.len(), e);
                } else {
                    error!("[DB] flush failed, buffer over limit; dropped {} rows: {}", batch.len(), e);
                }
                Err(e)
            }
        }
    }

    /// Flushes on a fixed interval until shutdown, then once more.
    pub async fn run(self: Arc<Self>, mut shutdown_rx: watch::Receiver<bool>) {
        let mut ticker = interval(FLUSH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.flush().await {
                        warn!("[DB] periodic flush failed: {}", e);
                    }
                }
                res = shutdown_rx.changed() => {
                    if res.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        match self.flush().await {
            Ok(n) => info!("[DB] final flush wrote {} messages", n),
            Err(e) => error!("[DB] final flush failed: {}", e),
        }
    }
}
