//! Evaluation Scheduler
//!
//! The engine turns a catalog plus a [`CloudProvider`] into a [`RunReport`]:
//!
//! 1. Validate coverage; controls with gaps never reach execution.
//! 2. Resolve duplicate identities into canonical controls.
//! 3. Fan each canonical control out into work units, one per in-scope
//!    resource, and execute them on a bounded worker pool.
//!
//! Every work unit runs under a wall-clock budget; exceeding it records
//! ERRORED with no retry. Transient provider faults inside a unit are
//! retried with capped exponential backoff and jitter, up to the configured
//! attempt limit. Permission and capability faults are recorded as SKIPPED
//! so a partially-permitted run still completes with a faithful report.
//!
//! Cancellation is cooperative: in-flight units run to completion and their
//! results are kept; units not yet dispatched never start.

mod backoff;
mod config;
#[cfg(test)]
mod run_tests;

pub use backoff::RetryPolicy;
pub use config::{RunConfig, RunFilter};

use std::future::Future;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::catalog::{Catalog, Severity};
use crate::coverage;
use crate::identity::{resolve_identities, CanonicalTechnicalControl};
use crate::interrogators::{evaluate_state, event_predicate, target_resource_type, StateFinding};
use crate::provider::{CloudProvider, ProviderError, ResourceHandle};
use crate::reconcile::effective_severity;
use crate::registry::{CheckHandle, InterrogatorRegistry};
use crate::report::{
    Evidence, RunReport, RunSummary, StandardCitation, Violation, WorkOutcome, WorkUnitStatus,
};

// ============================================================================
// Cancellation
// ============================================================================

/// Create a linked cancel handle/signal pair for one run.
pub fn cancellation() -> (CancelHandle, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelHandle { tx }, CancelSignal { rx })
}

/// Caller-side handle that requests cooperative cancellation.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    /// Stop dispatching new work units. In-flight units finish and their
    /// results are kept.
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Engine-side view of a cancellation request.
#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelSignal {
    /// A signal that never fires, for uninterrupted runs.
    pub fn never() -> Self {
        // A dropped sender can no longer flip the value; the receiver keeps
        // reporting false.
        let (_tx, rx) = watch::channel(false);
        Self { rx }
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }
}

// ============================================================================
// Engine
// ============================================================================

/// One fully-dispatchable unit of evaluation work.
struct WorkUnit {
    canonical_id: String,
    service: String,
    severity: Severity,
    handle: CheckHandle,
    resource: ResourceHandle,
    standards: Vec<StandardCitation>,
}

/// Shared state every worker appends into.
struct RunState {
    violations: Mutex<Vec<Violation>>,
}

/// The evaluation engine: catalog in, report out.
pub struct Engine {
    catalog: Catalog,
    registry: InterrogatorRegistry,
    provider: Arc<dyn CloudProvider>,
    config: RunConfig,
    retry_policy: RetryPolicy,
}

impl Engine {
    pub fn new(catalog: Catalog, provider: Arc<dyn CloudProvider>) -> Self {
        Self {
            catalog,
            registry: InterrogatorRegistry::new(),
            provider,
            config: RunConfig::default(),
            retry_policy: RetryPolicy::default(),
        }
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// The canonical controls this engine would evaluate, after identity
    /// resolution but before filtering.
    pub fn canonical_controls(&self) -> Vec<CanonicalTechnicalControl> {
        resolve_identities(&self.catalog)
    }

    /// Run every eligible control to completion.
    pub async fn run(&self) -> RunReport {
        self.run_with_cancellation(CancelSignal::never()).await
    }

    /// Run with a cooperative cancellation signal.
    pub async fn run_with_cancellation(&self, cancel: CancelSignal) -> RunReport {
        let started_at = Utc::now();

        let coverage_report = coverage::validate(&self.catalog, &self.registry);
        let canonical = resolve_identities(&self.catalog);

        let eligible: Vec<(CanonicalTechnicalControl, CheckHandle, Severity)> = canonical
            .into_iter()
            .filter(|c| self.matches_filter(c))
            .filter_map(|c| {
                // Coverage gaps were already reported; a control that does
                // not resolve is excluded here, never fatal.
                let handle = self.registry.resolve(&c.check).ok()?;
                let severity = effective_severity(&c);
                Some((c, handle, severity))
            })
            .collect();

        info!(
            controls = eligible.len(),
            workers = self.config.workers,
            gaps = coverage_report.gaps.len(),
            "starting evaluation run"
        );

        let state = Arc::new(RunState {
            violations: Mutex::new(Vec::new()),
        });
        let semaphore = Arc::new(Semaphore::new(self.config.workers));
        let mut tasks: JoinSet<WorkOutcome> = JoinSet::new();
        let mut controls_evaluated = 0usize;
        let mut immediate_outcomes: Vec<WorkOutcome> = Vec::new();

        'dispatch: for (control, handle, severity) in eligible {
            if cancel.is_cancelled() {
                info!("cancellation requested, dispatch stopped");
                break;
            }
            controls_evaluated += 1;

            let resources = match self.list_for_control(&handle).await {
                Ok(resources) => resources,
                Err(err) => {
                    immediate_outcomes.push(inventory_outcome(&control, err));
                    continue;
                }
            };

            let standards: Vec<StandardCitation> = control
                .standards
                .iter()
                .map(|s| StandardCitation {
                    standard: s.standard.clone(),
                    external_control_id: s.external_control_id.clone(),
                })
                .collect();

            for resource in resources {
                if cancel.is_cancelled() {
                    info!("cancellation requested, dispatch stopped");
                    break 'dispatch;
                }
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break 'dispatch,
                };

                let unit = WorkUnit {
                    canonical_id: control.canonical_id.clone(),
                    service: control.service.clone(),
                    severity,
                    handle: handle.clone(),
                    resource,
                    standards: standards.clone(),
                };
                let provider = Arc::clone(&self.provider);
                let state = Arc::clone(&state);
                let config = self.config.clone();
                let policy = self.retry_policy;

                tasks.spawn(async move {
                    let _permit = permit;
                    run_work_unit(unit, provider, state, config, policy).await
                });
            }
        }

        let mut outcomes = immediate_outcomes;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => warn!(error = %err, "work unit task failed to join"),
            }
        }
        // Keep the report stable regardless of completion order.
        outcomes.sort_by(|a, b| {
            (&a.canonical_control_id, &a.resource).cmp(&(&b.canonical_control_id, &b.resource))
        });

        let violations = state.violations.lock().clone();
        let summary = RunSummary::from_results(controls_evaluated, &outcomes, &violations);
        let finished_at = Utc::now();

        info!(
            passed = summary.passed,
            failed = summary.failed,
            skipped = summary.skipped,
            errored = summary.errored,
            violations = summary.violations,
            "evaluation run finished"
        );

        RunReport {
            started_at,
            finished_at,
            violations,
            outcomes,
            coverage: coverage_report,
            summary,
        }
    }

    fn matches_filter(&self, control: &CanonicalTechnicalControl) -> bool {
        let filter = &self.config.filter;
        if !filter.matches_service(&control.service) {
            return false;
        }
        if !filter.control_ids.is_empty()
            && !filter.control_ids.iter().any(|id| control.cites_control(id))
        {
            return false;
        }
        if let Some(standard) = &filter.standard {
            return control.standards.iter().any(|s| &s.standard == standard);
        }
        true
    }

    async fn list_for_control(
        &self,
        handle: &CheckHandle,
    ) -> Result<Vec<ResourceHandle>, ProviderError> {
        let resource_type = target_resource_type(handle);
        let provider = Arc::clone(&self.provider);
        call_with_retry(&self.retry_policy, self.config.retry_limit, || {
            let provider = Arc::clone(&provider);
            async move { provider.list_resources(resource_type).await }
        })
        .await
    }
}

/// Outcome for a control whose inventory listing failed.
fn inventory_outcome(control: &CanonicalTechnicalControl, err: ProviderError) -> WorkOutcome {
    let status = if err.is_transient() {
        WorkUnitStatus::Errored
    } else {
        WorkUnitStatus::Skipped
    };
    warn!(
        control_id = %control.canonical_id,
        error = %err,
        "resource inventory unavailable"
    );
    WorkOutcome {
        canonical_control_id: control.canonical_id.clone(),
        service: control.service.clone(),
        resource: "<inventory>".to_string(),
        status,
        reason: Some(format!("inventory listing failed: {err}")),
    }
}

// ============================================================================
// Work unit execution
// ============================================================================

async fn run_work_unit(
    unit: WorkUnit,
    provider: Arc<dyn CloudProvider>,
    state: Arc<RunState>,
    config: RunConfig,
    policy: RetryPolicy,
) -> WorkOutcome {
    debug!(
        control_id = %unit.canonical_id,
        resource = %unit.resource,
        check = %unit.handle.kind,
        "work unit started"
    );

    let budget = config.work_unit_timeout;
    match tokio::time::timeout(
        budget,
        evaluate_unit(&unit, provider, &state, &config, policy),
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!(
                control_id = %unit.canonical_id,
                resource = %unit.resource,
                budget_secs = budget.as_secs(),
                "work unit exceeded its wall-clock budget"
            );
            let mut reason = format!("exceeded {}s wall-clock budget", budget.as_secs());
            let resource = unit.resource.to_string();
            let recorded = state
                .violations
                .lock()
                .iter()
                .any(|v| v.canonical_control_id == unit.canonical_id && v.resource == resource);
            if recorded {
                reason.push_str("; violations recorded before the deadline are kept");
            }
            unit.outcome(WorkUnitStatus::Errored, Some(reason))
        }
    }
}

impl WorkUnit {
    fn outcome(&self, status: WorkUnitStatus, reason: Option<String>) -> WorkOutcome {
        WorkOutcome {
            canonical_control_id: self.canonical_id.clone(),
            service: self.service.clone(),
            resource: self.resource.to_string(),
            status,
            reason,
        }
    }

    fn provider_fault(&self, phase: &str, err: ProviderError) -> WorkOutcome {
        let status = if err.is_transient() {
            WorkUnitStatus::Errored
        } else {
            WorkUnitStatus::Skipped
        };
        self.outcome(status, Some(format!("{phase}: {err}")))
    }
}

async fn evaluate_unit(
    unit: &WorkUnit,
    provider: Arc<dyn CloudProvider>,
    state: &RunState,
    config: &RunConfig,
    policy: RetryPolicy,
) -> WorkOutcome {
    let snapshot = {
        let provider = Arc::clone(&provider);
        let resource = unit.resource.clone();
        match call_with_retry(&policy, config.retry_limit, move || {
            let provider = Arc::clone(&provider);
            let resource = resource.clone();
            async move { provider.get_current_state(&resource).await }
        })
        .await
        {
            Ok(snapshot) => snapshot,
            Err(err) => return unit.provider_fault("current-state read failed", err),
        }
    };

    let mut failed = false;
    if let StateFinding::Violation { evidence } = evaluate_state(&unit.handle, &snapshot) {
        failed = true;
        state.violations.lock().push(Violation {
            canonical_control_id: unit.canonical_id.clone(),
            severity: unit.severity,
            resource: unit.resource.to_string(),
            evidence: Evidence::CurrentState { fields: evidence },
            standards: unit.standards.clone(),
        });
    }

    let run_historical = config.historical && !(config.fail_fast_historical && failed);
    if run_historical {
        if let Some(predicate) = event_predicate(&unit.handle) {
            let lookback = chrono::Duration::days(config.lookback_days);
            let provider = Arc::clone(&provider);
            let search = call_with_retry(&policy, config.retry_limit, move || {
                let provider = Arc::clone(&provider);
                let predicate = predicate.clone();
                async move {
                    provider
                        .search_historical_events(&predicate, lookback)
                        .await
                }
            })
            .await;

            match search {
                Ok(events) => {
                    for event in events {
                        failed = true;
                        state.violations.lock().push(Violation {
                            canonical_control_id: unit.canonical_id.clone(),
                            severity: unit.severity,
                            resource: unit.resource.to_string(),
                            evidence: Evidence::HistoricalEvent {
                                action: event.action,
                                actor: event.actor,
                                occurred_at: event.occurred_at,
                                source_ip: event.source_ip,
                            },
                            standards: unit.standards.clone(),
                        });
                    }
                }
                // A unit that already found a violation stays FAILED; the
                // fault is carried in the reason instead of overriding.
                Err(err) if failed => {
                    return unit.outcome(
                        WorkUnitStatus::Failed,
                        Some(format!("historical search failed: {err}")),
                    );
                }
                Err(err) => return unit.provider_fault("historical search failed", err),
            }
        }
    }

    if failed {
        unit.outcome(WorkUnitStatus::Failed, None)
    } else {
        unit.outcome(WorkUnitStatus::Passed, None)
    }
}

// ============================================================================
// Retry
// ============================================================================

/// Run a provider call, retrying transient faults up to `retry_limit` total
/// attempts with jittered exponential backoff. Non-transient faults and
/// exhaustion return the last error unchanged.
async fn call_with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    retry_limit: u32,
    mut call: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ProviderError>>,
{
    let mut attempt = 0u32;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < retry_limit.max(1) => {
                let delay = policy.delay(attempt);
                debug!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient provider fault, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_retry_gives_up_after_limit() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO);

        let result: Result<(), ProviderError> = call_with_retry(&policy, 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::Throttled) }
        })
        .await;

        assert_eq!(result, Err(ProviderError::Throttled));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_retry_stops_on_permanent_fault() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO);

        let result: Result<(), ProviderError> = call_with_retry(&policy, 5, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(ProviderError::PermissionDenied("iam:GetAccountSummary".into())) }
        })
        .await;

        assert!(matches!(result, Err(ProviderError::PermissionDenied(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_fault() {
        let calls = AtomicU32::new(0);
        let policy = RetryPolicy::new(Duration::ZERO, Duration::ZERO);

        let result = call_with_retry(&policy, 5, || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(ProviderError::Network("connection reset".into()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_cancel_signal_observes_handle() {
        let (handle, signal) = cancellation();
        assert!(!signal.is_cancelled());
        handle.cancel();
        assert!(signal.is_cancelled());
    }

    #[test]
    fn test_never_signal_stays_live() {
        let signal = CancelSignal::never();
        assert!(!signal.is_cancelled());
        let clone = signal.clone();
        drop(signal);
        assert!(!clone.is_cancelled());
    }
}
