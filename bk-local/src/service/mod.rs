//! Service Module
//!
//! In-memory state of the local control plane. Each container guards its
//! data with its own mutex; when a caller needs more than one, locks are
//! taken in the order pool -> scheduler -> queue.

pub mod agent_pool;
pub mod ingest;
pub mod log_sink;
pub mod meta_data;
pub mod scheduler;
pub mod step_queue;

pub use agent_pool::{AgentPool, AgentPoolError};
pub use ingest::UploadIngester;
pub use log_sink::{InMemoryLogSink, LogSink, StdoutLogSink};
pub use meta_data::MetaDataStore;
pub use scheduler::{Scheduler, SchedulerError};
pub use step_queue::{StepEntry, StepQueue};

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks a container mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
