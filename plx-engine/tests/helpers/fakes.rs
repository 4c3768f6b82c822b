//! Fake collaborators

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};

use plx_engine::collaborators::{FetchError, IntegrationFetcher};
use plx_engine::schema::IntegrationDescriptor;

#[derive(Debug, Clone)]
pub enum FetchBehaviour {
    Respond(Value),
    Fail(FetchError),
    /// Respond after a delay
    Slow(Duration, Value),
}

/// Fetcher returning a canned result and counting calls
#[derive(Debug, Clone)]
pub struct FakeFetcher {
    behaviour: FetchBehaviour,
    calls: Arc<AtomicUsize>,
}

impl FakeFetcher {
    pub fn new(behaviour: FetchBehaviour) -> Self {
        Self {
            behaviour,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IntegrationFetcher for FakeFetcher {
    async fn fetch(
        &self,
        _integration: &IntegrationDescriptor,
        _credentials: Option<&Value>,
        _options: &Map<String, Value>,
    ) -> Result<Value, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behaviour {
            FetchBehaviour::Respond(value) => Ok(value.clone()),
            FetchBehaviour::Fail(err) => Err(err.clone()),
            FetchBehaviour::Slow(delay, value) => {
                tokio::time::sleep(*delay).await;
                Ok(value.clone())
            }
        }
    }
}
