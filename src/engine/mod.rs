// Engine: the versioned cache worker and its three lifecycle handlers.

pub mod activator;
pub mod installer;
pub mod interceptor;
pub mod lifecycle;
pub mod stats;
pub mod worker;

pub use activator::ActivateReport;
pub use installer::InstallReport;
pub use interceptor::{FetchError, Interception};
pub use lifecycle::{LifecycleError, WorkerState};
pub use worker::{CacheWorker, ClientControl, ClientFlags};
