//! Test Support
//!
//! An in-memory [`CloudProvider`] with scripted faults, for exercising the
//! scheduler without a live account. Resources, snapshots, and audit events
//! are loaded up front; faults are queued per call site and consumed in
//! order, so a test can script "throttled twice, then succeed" exactly.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use parking_lot::Mutex;

use crate::provider::{
    AuditEvent, CloudProvider, ConfigSnapshot, EventPredicate, ProviderError, ResourceHandle,
    ResourceType,
};

/// How many times each provider method was invoked.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CallCounts {
    pub list_resources: u32,
    pub get_current_state: u32,
    pub search_historical_events: u32,
}

#[derive(Default)]
struct Inner {
    resources: BTreeMap<ResourceType, Vec<ResourceHandle>>,
    snapshots: BTreeMap<String, ConfigSnapshot>,
    events: Vec<AuditEvent>,
    state_faults: BTreeMap<String, VecDeque<ProviderError>>,
    search_faults: VecDeque<ProviderError>,
    denied_types: BTreeSet<ResourceType>,
    calls: CallCounts,
}

/// Scripted in-memory provider.
#[derive(Default)]
pub struct StaticProvider {
    inner: Mutex<Inner>,
    /// Artificial latency per `get_current_state` call.
    state_delay: Option<Duration>,
}

impl StaticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource, visible to `list_resources`.
    pub fn with_resource(self, resource_type: ResourceType, id: impl Into<String>) -> Self {
        self.inner
            .lock()
            .resources
            .entry(resource_type)
            .or_default()
            .push(ResourceHandle::new(resource_type, id));
        self
    }

    /// Register the account pseudo-resource.
    pub fn with_account(self) -> Self {
        self.with_resource(ResourceType::Account, "account")
    }

    /// Set the snapshot returned for a resource id.
    pub fn with_snapshot(self, id: impl Into<String>, snapshot: ConfigSnapshot) -> Self {
        self.inner.lock().snapshots.insert(id.into(), snapshot);
        self
    }

    /// Add an audit event to the searchable history.
    pub fn with_event(self, event: AuditEvent) -> Self {
        self.inner.lock().events.push(event);
        self
    }

    /// Deny `list_resources` for a whole resource type.
    pub fn with_denied_type(self, resource_type: ResourceType) -> Self {
        self.inner.lock().denied_types.insert(resource_type);
        self
    }

    /// Queue a fault for the next `get_current_state` call on a resource.
    /// Queued faults are consumed in order before real data is served.
    pub fn with_state_fault(self, id: impl Into<String>, fault: ProviderError) -> Self {
        self.inner
            .lock()
            .state_faults
            .entry(id.into())
            .or_default()
            .push_back(fault);
        self
    }

    /// Queue `count` copies of the same fault for a resource.
    pub fn with_repeated_state_fault(
        self,
        id: impl Into<String>,
        fault: ProviderError,
        count: usize,
    ) -> Self {
        let id = id.into();
        let mut this = self;
        for _ in 0..count {
            this = this.with_state_fault(id.clone(), fault.clone());
        }
        this
    }

    /// Queue a fault for the next historical search.
    pub fn with_search_fault(self, fault: ProviderError) -> Self {
        self.inner.lock().search_faults.push_back(fault);
        self
    }

    /// Sleep this long inside every `get_current_state` call.
    pub fn with_state_delay(mut self, delay: Duration) -> Self {
        self.state_delay = Some(delay);
        self
    }

    pub fn call_counts(&self) -> CallCounts {
        self.inner.lock().calls
    }
}

#[async_trait]
impl CloudProvider for StaticProvider {
    async fn list_resources(
        &self,
        resource_type: ResourceType,
    ) -> Result<Vec<ResourceHandle>, ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.list_resources += 1;
        if inner.denied_types.contains(&resource_type) {
            return Err(ProviderError::PermissionDenied(format!(
                "list {resource_type}"
            )));
        }
        Ok(inner
            .resources
            .get(&resource_type)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_current_state(
        &self,
        resource: &ResourceHandle,
    ) -> Result<ConfigSnapshot, ProviderError> {
        if let Some(delay) = self.state_delay {
            tokio::time::sleep(delay).await;
        }
        let mut inner = self.inner.lock();
        inner.calls.get_current_state += 1;
        if let Some(queue) = inner.state_faults.get_mut(&resource.id) {
            if let Some(fault) = queue.pop_front() {
                return Err(fault);
            }
        }
        inner
            .snapshots
            .get(&resource.id)
            .cloned()
            .ok_or_else(|| ProviderError::Network(format!("no snapshot for {}", resource.id)))
    }

    async fn search_historical_events(
        &self,
        predicate: &EventPredicate,
        lookback: ChronoDuration,
    ) -> Result<Vec<AuditEvent>, ProviderError> {
        let mut inner = self.inner.lock();
        inner.calls.search_historical_events += 1;
        if let Some(fault) = inner.search_faults.pop_front() {
            return Err(fault);
        }
        let cutoff = chrono::Utc::now() - lookback;
        Ok(inner
            .events
            .iter()
            .filter(|e| predicate.matches(e) && e.occurred_at >= cutoff)
            .cloned()
            .collect())
    }
}

/// A minimal audit event for tests.
pub fn audit_event(action: impl Into<String>, actor: impl Into<String>) -> AuditEvent {
    AuditEvent {
        action: action.into(),
        actor: actor.into(),
        account: "123456789012".to_string(),
        resource: None,
        occurred_at: chrono::Utc::now(),
        source_ip: Some("198.51.100.7".to_string()),
    }
}
