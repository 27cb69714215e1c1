//! One-sided operations on global memory.
//!
//! Every delegate operation executes on the core that owns the addressed
//! bytes; the data never races because only the owner touches it, and the
//! whole handler runs under the owner's arena lock. The caller suspends
//! until the owner's reply (blocking variants) or fires-and-continues
//! against a [`GlobalCompletionEvent`] (async variants, completed at the
//! origin once the owner has applied the effect).
//!
//! Locally addressed operations short-circuit: they run inline under the
//! local arena lock and never touch the transport or the message pool.

use std::ops::Add;
use std::sync::Arc;

use crate::addr::{GlobalAddress, GlobalPtr};
use crate::codec::Plain;
use crate::message::{run_local, HandlerCx};
use crate::runtime::cx::Cx;
use crate::sync::{FullEmpty, GlobalCompletionEvent};
use crate::types::Core;

/// Reads `len` bytes at `src`, suspending until they arrive.
///
/// The range must lie within a single owner's block; zero-length reads
/// complete immediately.
pub async fn get_bytes(cx: &Cx, src: GlobalAddress, len: usize) -> Vec<u8> {
    if len == 0 {
        return Vec::new();
    }
    let layout = cx.layout();
    debug_assert!(
        layout.single_owner(src, len as u64),
        "get range spans multiple owners"
    );
    let owner = layout.core_of(src);
    let local = layout.pointer_of(src);
    if owner == cx.core() {
        return run_local(cx, &[], |hcx| hcx.bytes(local, len).to_vec());
    }

    tracing::trace!(origin = %cx.core(), owner = %owner, len, "remote get");
    let cell = Arc::new(FullEmpty::new());
    let reply_cell = Arc::clone(&cell);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let bytes = hcx.bytes(local, len).to_vec();
        hcx.reply(move |_| reply_cell.write_xf(bytes));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await
}

/// Writes `bytes` at `dest`, suspending until the owner has applied them.
///
/// The range must lie within a single owner's block; zero-length writes
/// complete immediately.
pub async fn put_bytes(cx: &Cx, dest: GlobalAddress, bytes: &[u8]) {
    if bytes.is_empty() {
        return;
    }
    let layout = cx.layout();
    debug_assert!(
        layout.single_owner(dest, bytes.len() as u64),
        "put range spans multiple owners"
    );
    let owner = layout.core_of(dest);
    let local = layout.pointer_of(dest);
    if owner == cx.core() {
        run_local(cx, &[], |hcx| {
            hcx.bytes_mut(local, bytes.len()).copy_from_slice(bytes);
        });
        return;
    }

    tracing::trace!(origin = %cx.core(), owner = %owner, len = bytes.len(), "remote put");
    let len = bytes.len();
    let cell = Arc::new(FullEmpty::new());
    let ack = Arc::clone(&cell);
    let msg = cx.pool().allocate_with_payload(owner, bytes, move |hcx| {
        let data = hcx.payload().to_vec();
        hcx.bytes_mut(local, len).copy_from_slice(&data);
        hcx.reply(move |_| ack.write_xf(()));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await;
}

/// Reads one `T` at `ptr`.
pub async fn read<T: Plain>(cx: &Cx, ptr: GlobalPtr<T>) -> T {
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    if owner == cx.core() {
        return run_local(cx, &[], |hcx| hcx.read_plain::<T>(local));
    }

    let cell = Arc::new(FullEmpty::new());
    let reply_cell = Arc::clone(&cell);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let value = hcx.read_plain::<T>(local);
        hcx.reply(move |_| reply_cell.write_xf(value));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await
}

/// Writes one `T` at `ptr`, suspending until applied.
pub async fn write<T: Plain>(cx: &Cx, ptr: GlobalPtr<T>, value: T) {
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    if owner == cx.core() {
        run_local(cx, &[], |hcx| hcx.write_plain(local, value));
        return;
    }

    let cell = Arc::new(FullEmpty::new());
    let ack = Arc::clone(&cell);
    let msg = cx.pool().allocate(owner, move |hcx| {
        hcx.write_plain(local, value);
        hcx.reply(move |_| ack.write_xf(()));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await;
}

/// Atomically adds `delta` to the `T` at `ptr`, returning the prior value.
///
/// Atomic because it executes on the owner under the arena lock, like
/// every other delegate against that address.
pub async fn fetch_add<T>(cx: &Cx, ptr: GlobalPtr<T>, delta: T) -> T
where
    T: Plain + Add<Output = T>,
{
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    let apply = move |hcx: &mut HandlerCx<'_>| {
        let old = hcx.read_plain::<T>(local);
        hcx.write_plain(local, old + delta);
        old
    };
    if owner == cx.core() {
        return run_local(cx, &[], apply);
    }

    let cell = Arc::new(FullEmpty::new());
    let reply_cell = Arc::clone(&cell);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let old = apply(hcx);
        hcx.reply(move |_| reply_cell.write_xf(old));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await
}

/// Atomically replaces the `T` at `ptr` with `value` if it equals
/// `expected`. Returns true when the swap happened.
pub async fn compare_swap<T>(cx: &Cx, ptr: GlobalPtr<T>, expected: T, value: T) -> bool
where
    T: Plain + PartialEq,
{
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    let apply = move |hcx: &mut HandlerCx<'_>| {
        let current = hcx.read_plain::<T>(local);
        if current == expected {
            hcx.write_plain(local, value);
            true
        } else {
            false
        }
    };
    if owner == cx.core() {
        return run_local(cx, &[], apply);
    }

    let cell = Arc::new(FullEmpty::new());
    let reply_cell = Arc::clone(&cell);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let swapped = apply(hcx);
        hcx.reply(move |_| reply_cell.write_xf(swapped));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await
}

/// Runs `f` on `dest` and returns its result, suspending until the reply.
///
/// The closure runs under `dest`'s arena lock and must not block; it is
/// handed a [`HandlerCx`] rather than a task context, so it structurally
/// cannot suspend.
pub async fn call<F, R>(cx: &Cx, dest: Core, f: F) -> R
where
    F: FnOnce(&mut HandlerCx<'_>) -> R + Send + 'static,
    R: Send + 'static,
{
    if dest == cx.core() {
        return run_local(cx, &[], f);
    }

    tracing::trace!(origin = %cx.core(), dest = %dest, "remote call");
    let cell = Arc::new(FullEmpty::new());
    let reply_cell = Arc::clone(&cell);
    let msg = cx.pool().allocate(dest, move |hcx| {
        let value = f(hcx);
        hcx.reply(move |_| reply_cell.write_xf(value));
    });
    cx.pool().enqueue(cx, msg).await;
    cell.read_fe().await
}

/// Writes one `T` at `ptr` without waiting for the reply, completing
/// `event` at the origin once the owner has applied the write.
///
/// The caller must have a matching wait on `event`; enrollment happens
/// here, before the message leaves, so the event cannot satisfy early.
pub async fn write_async<T: Plain>(
    cx: &Cx,
    event: &Arc<GlobalCompletionEvent>,
    ptr: GlobalPtr<T>,
    value: T,
) {
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    if owner == cx.core() {
        run_local(cx, &[], |hcx| hcx.write_plain(local, value));
        return;
    }

    let origin = cx.core();
    event.enroll(origin, 1);
    let event = Arc::clone(event);
    let msg = cx.pool().allocate(owner, move |hcx| {
        hcx.write_plain(local, value);
        hcx.reply(move |_| event.complete(origin, 1));
    });
    cx.pool().enqueue(cx, msg).await;
}

/// Reads one `T` at `ptr` without waiting, delivering the value into
/// `target` and completing `event` at the origin once it has arrived.
///
/// `event` satisfies only after `target` is full, so a waiter that has seen
/// satisfaction may read the cell without suspending.
pub async fn read_async<T: Plain>(
    cx: &Cx,
    event: &Arc<GlobalCompletionEvent>,
    ptr: GlobalPtr<T>,
    target: Arc<FullEmpty<T>>,
) {
    let layout = cx.layout();
    let addr = ptr.addr();
    let owner = layout.core_of(addr);
    let local = layout.pointer_of(addr);
    if owner == cx.core() {
        let value = run_local(cx, &[], |hcx| hcx.read_plain::<T>(local));
        target.write_xf(value);
        return;
    }

    let origin = cx.core();
    event.enroll(origin, 1);
    let event = Arc::clone(event);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let value = hcx.read_plain::<T>(local);
        hcx.reply(move |_| {
            target.write_xf(value);
            event.complete(origin, 1);
        });
    });
    cx.pool().enqueue(cx, msg).await;
}

/// Reads `len` bytes at `src` without waiting, delivering them into
/// `target` and completing `event` at the origin once they have arrived.
///
/// Zero-length reads fill `target` immediately and skip the event.
pub async fn get_bytes_async(
    cx: &Cx,
    event: &Arc<GlobalCompletionEvent>,
    src: GlobalAddress,
    len: usize,
    target: Arc<FullEmpty<Vec<u8>>>,
) {
    if len == 0 {
        target.write_xf(Vec::new());
        return;
    }
    let layout = cx.layout();
    debug_assert!(
        layout.single_owner(src, len as u64),
        "get range spans multiple owners"
    );
    let owner = layout.core_of(src);
    let local = layout.pointer_of(src);
    if owner == cx.core() {
        let bytes = run_local(cx, &[], |hcx| hcx.bytes(local, len).to_vec());
        target.write_xf(bytes);
        return;
    }

    let origin = cx.core();
    event.enroll(origin, 1);
    let event = Arc::clone(event);
    let msg = cx.pool().allocate(owner, move |hcx| {
        let bytes = hcx.bytes(local, len).to_vec();
        hcx.reply(move |_| {
            target.write_xf(bytes);
            event.complete(origin, 1);
        });
    });
    cx.pool().enqueue(cx, msg).await;
}

/// Writes `bytes` at `dest` without waiting, completing `event` at the
/// origin once the owner has applied them.
///
/// Zero-length writes complete immediately and skip the event.
pub async fn put_bytes_async(
    cx: &Cx,
    event: &Arc<GlobalCompletionEvent>,
    dest: GlobalAddress,
    bytes: &[u8],
) {
    if bytes.is_empty() {
        return;
    }
    let layout = cx.layout();
    debug_assert!(
        layout.single_owner(dest, bytes.len() as u64),
        "put range spans multiple owners"
    );
    let owner = layout.core_of(dest);
    let local = layout.pointer_of(dest);
    if owner == cx.core() {
        run_local(cx, &[], |hcx| {
            hcx.bytes_mut(local, bytes.len()).copy_from_slice(bytes);
        });
        return;
    }

    let origin = cx.core();
    event.enroll(origin, 1);
    let event = Arc::clone(event);
    let len = bytes.len();
    let msg = cx.pool().allocate_with_payload(owner, bytes, move |hcx| {
        let data = hcx.payload().to_vec();
        hcx.bytes_mut(local, len).copy_from_slice(&data);
        hcx.reply(move |_| event.complete(origin, 1));
    });
    cx.pool().enqueue(cx, msg).await;
}

/// Runs `f` on `dest` without waiting for a result, completing `event` at
/// the origin once `f` has executed.
pub async fn call_async<F>(cx: &Cx, event: &Arc<GlobalCompletionEvent>, dest: Core, f: F)
where
    F: FnOnce(&mut HandlerCx<'_>) + Send + 'static,
{
    if dest == cx.core() {
        run_local(cx, &[], f);
        return;
    }

    let origin = cx.core();
    event.enroll(origin, 1);
    let event = Arc::clone(event);
    let msg = cx.pool().allocate(dest, move |hcx| {
        f(hcx);
        hcx.reply(move |_| event.complete(origin, 1));
    });
    cx.pool().enqueue(cx, msg).await;
}

/// Retires `n` completions against `core`'s shard of `event`, from any
/// core.
pub async fn complete_on(cx: &Cx, event: &Arc<GlobalCompletionEvent>, core: Core, n: u64) {
    if core == cx.core() {
        event.complete(core, n);
        return;
    }

    let event = Arc::clone(event);
    let msg = cx
        .pool()
        .allocate(core, move |hcx| event.complete(hcx.core(), n));
    cx.pool().enqueue(cx, msg).await;
}
