//! Cooperative per-core scheduler with work stealing.

pub(crate) mod local_queue;
pub(crate) mod stealing;
pub mod worker;

pub(crate) use local_queue::{LocalQueue, Stealer};
pub use worker::{Parker, WorkerShared};
