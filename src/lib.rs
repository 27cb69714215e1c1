//! Farspace: a partitioned global address space runtime for one process.
//!
//! # Overview
//!
//! Farspace slices a set of worker cores' memory into one global address
//! space. A 64-bit [`addr::GlobalAddress`] names bytes on any core, either
//! directly (core plus offset) or through a block-cyclic linear mapping
//! that stripes arrays across the cluster. Operations on remote memory
//! never dereference: they *delegate*, shipping a small closure to the
//! owning core as an active message and suspending the calling task until
//! the owner replies.
//!
//! # Core guarantees
//!
//! - **Owner-computes**: every access to a byte executes on the core that
//!   owns it, under that core's arena lock; delegates against the same
//!   address serialize.
//! - **Cooperative tasks**: blocking operations suspend the task, never
//!   the worker thread; a worker multiplexes many tasks and steals from
//!   idle siblings.
//! - **Bounded messaging**: each core's message pool caps in-flight
//!   messages; senders feel backpressure as suspension, not failure.
//! - **Fail-stop**: a panic on any worker aborts the process; there is no
//!   partial-cluster recovery.
//!
//! # Module structure
//!
//! - [`types`]: core identifiers
//! - [`addr`]: global addresses, the packed layout, typed pointers
//! - [`codec`]: the [`codec::Plain`] fixed-size byte encoding
//! - [`config`]: runtime configuration and validation
//! - [`heap`]: per-core arenas and the global allocators
//! - [`message`]: active messages, handler contexts, the bounded pool
//! - [`transport`]: the fabric carrying frames between cores
//! - [`delegate`]: one-sided get/put/call operations
//! - [`sync`]: full/empty cells, completion events, semaphores
//! - [`runtime`]: workers, scheduler, and the [`runtime::Runtime`] entry
//! - [`par`]: parallel loop helpers
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_possible_truncation)]

pub mod addr;
pub mod codec;
pub mod config;
pub mod delegate;
pub mod error;
pub mod heap;
pub mod message;
pub mod par;
pub mod runtime;
pub mod sync;
pub mod transport;
pub mod types;
pub mod util;

#[doc(hidden)]
pub mod test_utils;

pub use addr::{AddressLayout, GlobalAddress, GlobalPtr};
pub use codec::Plain;
pub use config::RuntimeConfig;
pub use error::{AllocError, ConfigError};
pub use heap::SymmetricPtr;
pub use message::{ActiveMessage, HandlerCx, MessagePool};
pub use par::forall;
pub use runtime::{yield_now, Cx, JoinHandle, Runtime};
pub use sync::{CompletionEvent, FullEmpty, GlobalCompletionEvent, Semaphore};
pub use transport::{FabricStats, InProcessFabric, Transport};
pub use types::{Core, TaskId};
