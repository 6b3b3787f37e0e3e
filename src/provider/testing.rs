//! Instrumented in-memory provider for tests.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::error::{ProviderError, ProviderResult};
use crate::model::Attributes;
use crate::planner::AttributeChange;

use super::adapter::{Created, Provider, ResourceSchema};

/// One recorded provider call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// `create`, `read`, `update` or `destroy`.
    pub op: &'static str,
    /// The `name` attribute for create, otherwise the remote id.
    pub subject: String,
}

/// Provider that keeps remote objects in memory and records every call.
///
/// Remote ids have the form `<name>-<n>`. Created objects report `id` and
/// `arn` as computed attributes.
#[derive(Debug)]
pub struct RecordingProvider {
    schema: ResourceSchema,
    delay: Duration,
    remote: Mutex<BTreeMap<String, Attributes>>,
    calls: Mutex<Vec<Call>>,
    failing: Mutex<BTreeSet<(&'static str, String)>>,
    counter: AtomicUsize,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

impl RecordingProvider {
    pub fn new(schema: ResourceSchema) -> Self {
        Self {
            schema,
            delay: Duration::ZERO,
            remote: Mutex::new(BTreeMap::new()),
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(BTreeSet::new()),
            counter: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// Every attribute updatable in place.
    pub fn updatable() -> Self {
        Self::new(ResourceSchema::updatable_by_default())
    }

    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Makes every mutation of objects with this name fail.
    pub fn fail_on(&self, name: &str) {
        for op in ["create", "update", "destroy"] {
            self.fail_op(op, name);
        }
    }

    /// Makes one kind of mutation fail for objects with this name.
    pub fn fail_op(&self, op: &'static str, name: &str) {
        self.failing.lock().unwrap().insert((op, name.to_string()));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded operations, ignoring reads.
    pub fn mutations(&self) -> Vec<(&'static str, String)> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != "read")
            .map(|c| (c.op, c.subject))
            .collect()
    }

    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn remote_count(&self) -> usize {
        self.remote.lock().unwrap().len()
    }

    /// Removes a remote object behind the engine's back.
    pub fn forget(&self, remote_id: &str) {
        self.remote.lock().unwrap().remove(remote_id);
    }

    fn record(&self, op: &'static str, subject: &str) {
        self.calls.lock().unwrap().push(Call {
            op,
            subject: subject.to_string(),
        });
    }

    /// `subject` is a name for creates and `<name>-<n>` otherwise.
    fn is_failing(&self, op: &str, subject: &str) -> bool {
        self.failing.lock().unwrap().iter().any(|(failing_op, name)| {
            *failing_op == op && (subject == name || subject.starts_with(&format!("{name}-")))
        })
    }

    async fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

fn name_of(attributes: &Attributes) -> String {
    attributes
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string()
}

fn with_computed(remote_id: &str, attributes: &Attributes) -> Attributes {
    let mut result = attributes.clone();
    result.insert(String::from("id"), Value::String(remote_id.to_string()));
    result.insert(String::from("arn"), Value::String(format!("arn:test:{remote_id}")));
    result
}

#[async_trait]
impl Provider for RecordingProvider {
    fn schema(&self) -> ResourceSchema {
        self.schema.clone()
    }

    async fn create(&self, attributes: &Attributes) -> ProviderResult<Created> {
        let name = name_of(attributes);
        self.record("create", &name);
        self.enter().await;

        let result = if self.is_failing("create", &name) {
            Err(ProviderError::rejected(format!("create of {name} refused")))
        } else {
            let n = self.counter.fetch_add(1, Ordering::SeqCst);
            let remote_id = format!("{name}-{n}");
            let recorded = with_computed(&remote_id, attributes);
            self.remote.lock().unwrap().insert(remote_id.clone(), recorded.clone());
            Ok(Created {
                remote_id,
                attributes: recorded,
            })
        };

        self.leave();
        result
    }

    async fn read(&self, remote_id: &str) -> ProviderResult<Option<Attributes>> {
        self.record("read", remote_id);
        Ok(self.remote.lock().unwrap().get(remote_id).cloned())
    }

    async fn update(
        &self,
        remote_id: &str,
        attributes: &Attributes,
        _changes: &[AttributeChange],
    ) -> ProviderResult<Attributes> {
        self.record("update", remote_id);
        self.enter().await;

        let result = if self.is_failing("update", remote_id) {
            Err(ProviderError::rejected(format!("update of {remote_id} refused")))
        } else {
            let recorded = with_computed(remote_id, attributes);
            self.remote
                .lock()
                .unwrap()
                .insert(remote_id.to_string(), recorded.clone());
            Ok(recorded)
        };

        self.leave();
        result
    }

    async fn destroy(&self, remote_id: &str) -> ProviderResult<()> {
        self.record("destroy", remote_id);
        self.enter().await;

        let result = if self.is_failing("destroy", remote_id) {
            Err(ProviderError::rejected(format!("destroy of {remote_id} refused")))
        } else if self.remote.lock().unwrap().remove(remote_id).is_some() {
            Ok(())
        } else {
            Err(ProviderError::NotFound {
                remote_id: remote_id.to_string(),
            })
        };

        self.leave();
        result
    }
}
