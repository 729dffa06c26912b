//! Scriptable provider used by engine tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::{Operation, Provider, ProviderRequest};
use crate::error::ProviderError;
use crate::resource::Outputs;

/// A provider call boundary observed by [`RecordingProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The call started.
    Started(String, Operation),
    /// The call returned.
    Finished(String, Operation),
}

/// Records every call and replays scripted failures.
#[derive(Debug, Clone, Default)]
pub struct RecordingProvider {
    events: Arc<Mutex<Vec<Event>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    failures: Arc<Mutex<HashMap<String, VecDeque<ProviderError>>>>,
    delays: Arc<HashMap<String, Duration>>,
}

impl RecordingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next calls for `name` fail with `errors`, in order.
    pub fn fail(self, name: &str, errors: Vec<ProviderError>) -> Self {
        self.failures
            .lock()
            .expect("failures lock")
            .insert(name.to_string(), errors.into());
        self
    }

    /// Makes every call for `name` take `delay`.
    pub fn delay(mut self, name: &str, delay: Duration) -> Self {
        Arc::make_mut(&mut self.delays).insert(name.to_string(), delay);
        self
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("events lock").clone()
    }

    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().expect("requests lock").clone()
    }

    /// Names of the resources the provider was called for, in call order.
    pub fn calls(&self) -> Vec<(String, Operation)> {
        self.requests()
            .into_iter()
            .map(|r| (r.name, r.operation))
            .collect()
    }

    /// Position of an event in the log.
    pub fn position(&self, event: &Event) -> Option<usize> {
        self.events().iter().position(|e| e == event)
    }
}

#[async_trait]
impl Provider for RecordingProvider {
    async fn apply(&self, request: &ProviderRequest) -> Result<Outputs, ProviderError> {
        self.events
            .lock()
            .expect("events lock")
            .push(Event::Started(request.name.clone(), request.operation));
        self.requests
            .lock()
            .expect("requests lock")
            .push(request.clone());

        if let Some(delay) = self.delays.get(&request.name) {
            tokio::time::sleep(*delay).await;
        }

        let failure = self
            .failures
            .lock()
            .expect("failures lock")
            .get_mut(&request.name)
            .and_then(VecDeque::pop_front);

        self.events
            .lock()
            .expect("events lock")
            .push(Event::Finished(request.name.clone(), request.operation));

        if let Some(error) = failure {
            return Err(error);
        }

        if request.operation == Operation::Delete {
            return Ok(Outputs::new());
        }

        let mut outputs: Outputs = request.properties.clone();
        outputs.insert(
            String::from("id"),
            Value::String(format!("{}-id", request.name)),
        );
        Ok(outputs)
    }
}
