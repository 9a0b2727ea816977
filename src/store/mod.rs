//! Session store: scheduling, dedup, ordering, and progress persistence.

mod dedup;
mod error;
mod retry;
mod scheduler;
mod session_log;
mod session_store;

pub use dedup::BoundedIdSet;
pub use error::StoreError;
pub use retry::{RetryPolicy, DEFAULT_BASE_DELAY, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DELAY};
pub use scheduler::{Debounce, FlushScheduler, Throttle};
pub use session_log::CallPair;
pub use session_store::{FlushReport, SessionStore, StoreConfig, StoreEvent};
