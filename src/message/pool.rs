//! Fixed-capacity message pool with credit-based backpressure.
//!
//! Each core owns one pool. Enqueueing a remote message first takes a
//! credit from the pool's semaphore, suspending the sender when the pool is
//! full; the credit travels with the frame and returns when the destination
//! has executed the handler. A [`CompletionEvent`] mirrors the credits so a
//! sender can quiesce with [`MessagePool::block_until_all_sent`].
//!
//! Messages addressed to the enqueueing core never touch the transport or
//! the credit supply: they execute immediately, inline.

use std::sync::Arc;

use crate::message::{ActiveMessage, Frame, HandlerCx, Payload};
use crate::runtime::cx::Cx;
use crate::sync::{CompletionEvent, Semaphore};
use crate::transport::Transport;
use crate::types::Core;

#[derive(Debug)]
struct PoolShared {
    credits: Semaphore,
    outstanding: CompletionEvent,
}

/// Per-core pool of in-flight message slots.
pub struct MessagePool {
    core: Core,
    capacity: u64,
    inline_max: usize,
    shared: Arc<PoolShared>,
    transport: Arc<dyn Transport>,
}

impl MessagePool {
    /// Creates a pool with `capacity` in-flight slots for `core`.
    #[must_use]
    pub fn new(
        core: Core,
        capacity: u64,
        inline_max: usize,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            core,
            capacity,
            inline_max,
            shared: Arc::new(PoolShared {
                credits: Semaphore::new(capacity),
                outstanding: CompletionEvent::new(),
            }),
            transport,
        }
    }

    /// Pool capacity in messages.
    #[must_use]
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Credits currently available.
    #[must_use]
    pub fn free_slots(&self) -> u64 {
        self.shared.credits.value()
    }

    /// Messages enqueued but not yet executed by their destination.
    #[must_use]
    pub fn in_flight(&self) -> i64 {
        self.shared.outstanding.count()
    }

    /// Builds a message with no payload.
    pub fn allocate(
        &self,
        dest: Core,
        handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static,
    ) -> ActiveMessage {
        ActiveMessage::new(dest, handler)
    }

    /// Builds a message carrying `bytes`, inline or heap by size.
    pub fn allocate_with_payload(
        &self,
        dest: Core,
        bytes: &[u8],
        handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static,
    ) -> ActiveMessage {
        ActiveMessage::with_payload(dest, Payload::from_bytes(bytes, self.inline_max), handler)
    }

    /// Sends a message, suspending while the pool is out of credits.
    ///
    /// A message for the local core executes before this returns, bypassing
    /// the transport and the credit supply entirely.
    pub async fn enqueue(&self, cx: &Cx, msg: ActiveMessage) {
        let ActiveMessage {
            dest,
            handler,
            payload,
        } = msg;

        if dest == self.core {
            tracing::trace!(core = %self.core, "local message short-circuit");
            let frame = Frame {
                origin: self.core,
                handler,
                payload,
                credit: None,
            };
            frame.execute(cx);
            return;
        }

        self.shared.credits.decrement(1).await;
        self.shared.outstanding.enroll(1);
        tracing::trace!(
            origin = %self.core,
            dest = %dest,
            payload_len = payload.len(),
            "message enqueued",
        );
        let frame = Frame {
            origin: self.core,
            handler,
            payload,
            credit: Some(CreditGuard {
                shared: Arc::clone(&self.shared),
            }),
        };
        self.transport.send(dest, frame);
    }

    /// Suspends until every message this pool has sent was executed by its
    /// destination.
    pub async fn block_until_all_sent(&self) {
        self.shared.outstanding.wait().await;
    }
}

impl Drop for MessagePool {
    fn drop(&mut self) {
        let in_flight = self.shared.outstanding.count();
        if in_flight != 0 {
            tracing::warn!(
                core = %self.core,
                in_flight,
                "message pool dropped with messages still in flight",
            );
        }
    }
}

impl std::fmt::Debug for MessagePool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessagePool")
            .field("core", &self.core)
            .field("capacity", &self.capacity)
            .field("free_slots", &self.free_slots())
            .field("in_flight", &self.in_flight())
            .finish_non_exhaustive()
    }
}

/// Credit held by an in-flight frame; dropping it after execution returns
/// the pool slot and retires the outstanding count.
#[derive(Debug)]
pub struct CreditGuard {
    shared: Arc<PoolShared>,
}

impl Drop for CreditGuard {
    fn drop(&mut self) {
        self.shared.credits.increment(1);
        self.shared.outstanding.complete(1);
    }
}
