//! Collection
//!
//! A [`Collector`] is one stat source. The [`CollectorManager`] owns the
//! registered collectors and calls each of them once per tick.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────┐  tick   ┌──────────────┐  update   ┌──────────────┐
//! │ CollectorManager │────────▶│  Collector   │──────────▶│   Registry   │
//! │   (scheduler)    │         │ (per source) │           │ (named store)│
//! └──────────────────┘         └──────────────┘           └──────────────┘
//!                                     │ on_err
//!                                     ▼
//!                              ┌──────────────┐
//!                              │ ErrorLedger  │
//!                              └──────────────┘
//! ```

use async_trait::async_trait;

mod base;
mod errors;
mod manager;

pub use base::CollectorBase;
pub use errors::{ErrorLedger, ErrorRecord};
pub use manager::{CollectorManager, ManagerConfig, ManagerState, ShutdownHandle};

/// A schedulable stat source
#[async_trait]
pub trait Collector: Send + Sync {
    /// Namespace of this collector's metrics. Fixed after registration.
    fn prefix(&self) -> &str;

    /// Perform exactly one sampling pass.
    ///
    /// Failures go to the collector's error ledger; they never stop the
    /// scheduler.
    async fn collect(&self);
}
