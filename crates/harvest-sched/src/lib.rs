//! Harvest historical-data collection orchestrator
//!
//! A *collection* asks for up to a year of historical data from a saved
//! workflow. It is split into calendar weeks, and each week is one workflow
//! execution. This crate owns the lifecycle of those collections:
//!
//! 1. **Creation**: [`CollectionService::start_backfill`] plans the weeks and
//!    persists everything as `pending`
//! 2. **Claiming**: the [`Orchestrator`] polls the store and claims work with
//!    a single conditional status write, so several processes may share a
//!    database
//! 3. **Execution**: a runner walks the weeks oldest first under a global
//!    call-spacing limiter and a week semaphore, persisting progress after
//!    every week
//! 4. **Recovery**: recently failed collections are re-queued a bounded number
//!    of times, and `running` collections nobody touched for a day are failed
//!
//! # Running the Orchestrator
//!
//! ```ignore
//! use std::sync::Arc;
//! use harvest_sched::{Orchestrator, OrchestratorConfig, SqliteStore};
//!
//! let store = Arc::new(SqliteStore::open("./harvest.db")?);
//! let orchestrator = Arc::new(Orchestrator::new(
//!     OrchestratorConfig::default(),
//!     store,
//!     workflow,
//! )?);
//!
//! orchestrator.start();
//! tokio::signal::ctrl_c().await?;
//! orchestrator.stop().await;
//! ```
//!
//! # Controlling Collections
//!
//! ```ignore
//! use harvest_sched::{BackfillRequest, CollectionService};
//!
//! let service = CollectionService::new(store);
//! let collection = service
//!     .start_backfill(BackfillRequest::new("wf-1", "inst-1", "user-1", end_date))
//!     .await?;
//!
//! service.pause(collection.public_id.as_str()).await?;
//! let progress = service.progress(collection.public_id.as_str()).await?;
//! println!("{}%", progress.progress_percentage);
//! ```

pub mod claim;
pub mod collection;
pub mod config;
pub mod error;
pub mod executor;
pub mod limits;
pub mod orchestrator;
pub mod persistence;
pub mod rate_limit;
pub mod runner;
pub mod service;
pub mod sweeps;
pub mod week;

// Re-exports
pub use claim::{ClaimCoordinator, ClaimGuard};
pub use collection::{
    Collection, CollectionFilter, CollectionId, CollectionStatus, CollectionType,
    CollectionUpdate, MAX_TARGET_WEEKS, PublicId, progress_percentage,
};
pub use config::OrchestratorConfig;
pub use error::{SchedError, SchedResult};
pub use executor::{WeekExecutor, checksum_rows};
pub use limits::ConcurrencyLimits;
pub use orchestrator::{IterationReport, Orchestrator};
pub use persistence::{SqliteStore, StateStore};
pub use rate_limit::RateLimiter;
pub use runner::{CollectionRunner, RunOutcome};
pub use service::{
    BackfillRequest, CollectionProgress, CollectionService, WeekCounts, WeekProgress,
};
pub use sweeps::RecoverySweeps;
pub use week::{Week, WeekId, WeekStatus, WeekUpdate, plan_weeks};
