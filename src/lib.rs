//! # Parapet
//!
//! Control mapping and evaluation engine for cloud compliance standards.
//!
//! Parapet ingests control catalogs contributed by multiple standards,
//! resolves them against a closed registry of interrogation archetypes, and
//! evaluates the resulting canonical controls against a cloud account
//! through a pluggable provider interface.
//!
//! ## Pipeline
//!
//! - **Catalog ingestion**: declarative control definitions grouped by
//!   service, each naming an interrogation (archetype, operation,
//!   parameters) and the standards that cite it
//! - **Coverage validation**: every control must map to a registered
//!   operation with schema-valid parameters; gaps are reported, never fatal
//! - **Identity resolution**: controls from different standards that invoke
//!   the same check with equal normalized parameters merge into one
//!   canonical technical control
//! - **Severity reconciliation**: the effective severity of a canonical
//!   control is the maximum over baselines and standard overrides
//! - **Evaluation**: a bounded worker pool fans canonical controls out over
//!   in-scope resources, with per-unit timeouts, retried transient faults,
//!   and cooperative cancellation
//!
//! ## Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use parapet::{Catalog, Engine, RunConfig};
//! use parapet::observability::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     parapet::observability::init(ObservabilityConfig::from_env())?;
//!
//!     let catalog = Catalog::from_files(&["catalogs/cis_v3_0.json"])?;
//!     let provider = Arc::new(MyProvider::connect().await?);
//!
//!     let engine = Engine::new(catalog, provider)
//!         .with_config(RunConfig::from_env());
//!     let report = engine.run().await;
//!     println!("{report}");
//!     Ok(())
//! }
//! ```

pub mod catalog;
pub mod coverage;
pub mod engine;
pub mod identity;
pub mod interrogators;
pub mod observability;
pub mod provider;
pub mod reconcile;
pub mod registry;
pub mod report;
pub mod testing;

// Re-exports
pub use catalog::{Catalog, CatalogError, ControlDefinition, Interrogation, ParamValue, Severity};
pub use coverage::{validate as validate_coverage, CoverageGap, CoverageReport, GapReason};
pub use engine::{cancellation, CancelHandle, CancelSignal, Engine, RetryPolicy, RunConfig, RunFilter};
pub use identity::{resolve_identities, CanonicalTechnicalControl};
pub use provider::{CloudProvider, ConfigSnapshot, ProviderError, ResourceHandle, ResourceType};
pub use reconcile::effective_severity;
pub use registry::{Archetype, CheckHandle, CheckKind, InterrogatorRegistry, ResolveError};
pub use report::{Evidence, RunReport, Violation, WorkOutcome, WorkUnitStatus};
