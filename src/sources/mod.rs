//! Stat sources
//!
//! Concrete [`Collector`](crate::collector::Collector) implementations. Each
//! source owns a [`CollectorBase`](crate::collector::CollectorBase) and its
//! own `[collector.*]` configuration section.

pub mod nginx;
pub mod process;
pub mod procfs;
pub mod system;

pub use nginx::{parse_stub_status, NginxCollector, NginxConfig, StubStatus};
pub use process::{ProcessCollector, ProcessConfig};
pub use system::{SystemCollector, SystemConfig};
