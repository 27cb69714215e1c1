//! Synchronization primitives for cooperative tasks.
//!
//! Every blocking operation here suspends the calling task at a scheduler
//! yield point; none of them block the worker thread. These are the
//! suspension points of the runtime, together with the blocking delegate
//! operations and message-pool backpressure.

pub mod completion;
pub mod full_empty;
pub mod global_completion;
pub mod semaphore;

pub use completion::CompletionEvent;
pub use full_empty::FullEmpty;
pub use global_completion::GlobalCompletionEvent;
pub use semaphore::Semaphore;
