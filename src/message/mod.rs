//! Active messages: small relocatable units of code plus data.
//!
//! An [`ActiveMessage`] pairs a destination core with a handler closure and
//! an optional payload. Payloads at or under the configured inline
//! threshold ride in a small stack buffer; larger ones take the heap path —
//! the path is chosen by size, automatically, and oversizing is never an
//! allocation failure.
//!
//! A message moves through its lifecycle exactly once: created, enqueued,
//! sent, executed. Ownership enforces the exactly-once property — the
//! handler is an `FnOnce` consumed at execution.
//!
//! Handlers run on the destination core's worker while it holds that core's
//! arena lock, so a handler is atomic with respect to every other handler
//! and bulk operation on the same core. Handlers are synchronous closures:
//! they structurally cannot suspend, which is the "must not block" contract
//! of delegate closures.

pub mod pool;

pub use pool::{CreditGuard, MessagePool};

use smallvec::SmallVec;

use crate::codec::Plain;
use crate::runtime::cx::Cx;
use crate::transport::Transport;
use crate::types::Core;

/// Inline payload capacity carried without heap allocation.
const INLINE_BUF: usize = 64;

/// Payload bytes of an active message.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Small payload stored inline in the message.
    Inline(SmallVec<[u8; INLINE_BUF]>),
    /// Oversize payload on the heap; allocated once, freed after execution.
    Heap(Vec<u8>),
}

impl Payload {
    /// An empty inline payload.
    #[must_use]
    pub fn empty() -> Self {
        Self::Inline(SmallVec::new())
    }

    /// Chooses the inline or heap path for `bytes` by the configured
    /// threshold.
    #[must_use]
    pub fn from_bytes(bytes: &[u8], inline_max: usize) -> Self {
        if bytes.len() <= inline_max {
            Self::Inline(SmallVec::from_slice(bytes))
        } else {
            Self::Heap(bytes.to_vec())
        }
    }

    /// Payload bytes.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            Self::Inline(buf) => buf,
            Self::Heap(buf) => buf,
        }
    }

    /// Payload length in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    /// True when the payload is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }

    /// True when the payload took the heap path.
    #[must_use]
    pub fn is_heap(&self) -> bool {
        matches!(self, Self::Heap(_))
    }
}

/// Handler closure executed on the destination core.
pub type FrameHandler = Box<dyn FnOnce(&mut HandlerCx<'_>) + Send + 'static>;

/// A message as carried by the transport: handler, payload, origin, and
/// the pool credit released once the destination has executed it.
pub struct Frame {
    pub(crate) origin: Core,
    pub(crate) handler: FrameHandler,
    pub(crate) payload: Payload,
    pub(crate) credit: Option<CreditGuard>,
}

impl Frame {
    /// Builds a frame without a pool credit (replies, broadcasts).
    #[must_use]
    pub fn reply(origin: Core, handler: FrameHandler, payload: Payload) -> Self {
        Self {
            origin,
            handler,
            payload,
            credit: None,
        }
    }

    /// Executes the frame on `cx`'s core, under the arena lock, then
    /// releases the pool credit (if any).
    pub fn execute(self, cx: &Cx) {
        let Self {
            origin,
            handler,
            payload,
            credit,
        } = self;
        cx.local_heap().with_arena(|arena| {
            let mut hcx = HandlerCx {
                cx,
                origin,
                arena,
                payload: payload.as_slice(),
            };
            handler(&mut hcx);
        });
        // Credit drop signals the source pool: slot free, message consumed.
        drop(credit);
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("origin", &self.origin)
            .field("payload_len", &self.payload.len())
            .field("carries_credit", &self.credit.is_some())
            .finish_non_exhaustive()
    }
}

/// An active message ready for enqueue.
pub struct ActiveMessage {
    pub(crate) dest: Core,
    pub(crate) handler: FrameHandler,
    pub(crate) payload: Payload,
}

impl ActiveMessage {
    /// Creates a message with no payload.
    pub fn new(dest: Core, handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static) -> Self {
        Self {
            dest,
            handler: Box::new(handler),
            payload: Payload::empty(),
        }
    }

    /// Creates a message carrying `payload`.
    pub fn with_payload(
        dest: Core,
        payload: Payload,
        handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static,
    ) -> Self {
        Self {
            dest,
            handler: Box::new(handler),
            payload,
        }
    }

    /// Destination core.
    #[must_use]
    pub fn dest(&self) -> Core {
        self.dest
    }
}

impl std::fmt::Debug for ActiveMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActiveMessage")
            .field("dest", &self.dest)
            .field("payload_len", &self.payload.len())
            .finish_non_exhaustive()
    }
}

/// Runs `f` as if it were a message handler on the local core, under the
/// local arena lock. This is the short-circuit path for locally addressed
/// operations; it never touches the transport.
pub(crate) fn run_local<R>(
    cx: &Cx,
    payload: &[u8],
    f: impl FnOnce(&mut HandlerCx<'_>) -> R,
) -> R {
    cx.local_heap().with_arena(|arena| {
        let mut hcx = HandlerCx {
            cx,
            origin: cx.core(),
            arena,
            payload,
        };
        f(&mut hcx)
    })
}

/// Execution context handed to a message handler on the destination core.
///
/// Grants access to the executing core's arena bytes (exclusively — the
/// arena lock is held for the handler's duration), the message payload, and
/// the reply path back to the origin.
pub struct HandlerCx<'a> {
    cx: &'a Cx,
    origin: Core,
    arena: &'a mut [u8],
    payload: &'a [u8],
}

impl HandlerCx<'_> {
    /// The core executing this handler.
    #[must_use]
    pub fn core(&self) -> Core {
        self.cx.core()
    }

    /// The core that sent the message.
    #[must_use]
    pub fn origin(&self) -> Core {
        self.origin
    }

    /// The executing core's capability context, for spawning follow-up
    /// tasks. Handlers themselves must not suspend.
    #[must_use]
    pub fn cx(&self) -> &Cx {
        self.cx
    }

    /// The message payload.
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        self.payload
    }

    /// A byte range of the local arena.
    #[must_use]
    pub fn bytes(&self, offset: u64, len: usize) -> &[u8] {
        let offset = offset as usize;
        &self.arena[offset..offset + len]
    }

    /// A mutable byte range of the local arena.
    pub fn bytes_mut(&mut self, offset: u64, len: usize) -> &mut [u8] {
        let offset = offset as usize;
        &mut self.arena[offset..offset + len]
    }

    /// Decodes a `T` from the local arena.
    #[must_use]
    pub fn read_plain<T: Plain>(&self, offset: u64) -> T {
        T::read_from(self.bytes(offset, T::SIZE))
    }

    /// Encodes a `T` into the local arena.
    pub fn write_plain<T: Plain>(&mut self, offset: u64, value: T) {
        value.write_to(self.bytes_mut(offset, T::SIZE));
    }

    /// Sends a reply frame to the message's origin.
    pub fn reply(&self, handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static) {
        self.reply_with_payload(Payload::empty(), handler);
    }

    /// Sends a reply frame carrying a payload to the message's origin.
    pub fn reply_with_payload(
        &self,
        payload: Payload,
        handler: impl FnOnce(&mut HandlerCx<'_>) + Send + 'static,
    ) {
        let frame = Frame::reply(self.cx.core(), Box::new(handler), payload);
        self.cx.transport().send(self.origin, frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_chooses_inline_path_under_threshold() {
        let payload = Payload::from_bytes(&[1, 2, 3], 8);
        assert!(!payload.is_heap());
        assert_eq!(payload.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn payload_chooses_heap_path_over_threshold() {
        let bytes = vec![0xabu8; 100];
        let payload = Payload::from_bytes(&bytes, 8);
        assert!(payload.is_heap());
        assert_eq!(payload.len(), 100);
    }

    #[test]
    fn oversize_payload_never_fails() {
        // Far above any inline capacity; must take the heap path, not error.
        let bytes = vec![7u8; 1 << 20];
        let payload = Payload::from_bytes(&bytes, 1024);
        assert!(payload.is_heap());
        assert_eq!(payload.len(), 1 << 20);
    }
}
