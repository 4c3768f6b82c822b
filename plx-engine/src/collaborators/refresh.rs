//! Refresh scheduling for cached integration data

use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{CacheKey, RefreshScheduler};
use crate::error::{Error, Result};

/// Request to re-fetch one cache slot periodically
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshRequest {
    pub key: CacheKey,
    pub options: Map<String, Value>,
    pub interval: Duration,
}

/// Drops every request
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRefreshScheduler;

impl RefreshScheduler for NoopRefreshScheduler {
    fn schedule(&self, _request: RefreshRequest) -> Result<()> {
        Ok(())
    }
}

/// Hands requests to an external worker over a bounded channel
///
/// Never blocks: a full queue fails the request.
#[derive(Debug, Clone)]
pub struct ChannelRefreshScheduler {
    tx: mpsc::Sender<RefreshRequest>,
}

impl ChannelRefreshScheduler {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<RefreshRequest>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl RefreshScheduler for ChannelRefreshScheduler {
    fn schedule(&self, request: RefreshRequest) -> Result<()> {
        self.tx.try_send(request).map_err(|e| match e {
            TrySendError::Full(_) => Error::Internal("refresh queue is full".to_string()),
            TrySendError::Closed(_) => Error::Internal("refresh queue is closed".to_string()),
        })
    }
}
