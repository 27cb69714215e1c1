//! Parallel loop helpers.

use std::future::Future;
use std::ops::Range;
use std::sync::Arc;

use crate::runtime::cx::Cx;
use crate::sync::CompletionEvent;

/// Spawns one task per index of `range` on the calling core and suspends
/// until all of them finish.
///
/// `f` is invoked once per index with a clone of the calling context; the
/// futures it builds run as ordinary tasks, so idle sibling workers may
/// steal them.
pub async fn forall<F, Fut>(cx: &Cx, range: Range<u64>, f: F)
where
    F: Fn(Cx, u64) -> Fut,
    Fut: Future<Output = ()> + Send + 'static,
{
    let total = range.end.saturating_sub(range.start);
    if total == 0 {
        return;
    }
    let done = Arc::new(CompletionEvent::new());
    done.enroll(total);
    for index in range {
        let done = Arc::clone(&done);
        let body = f(cx.clone(), index);
        let _task = cx.spawn(async move {
            body.await;
            done.complete(1);
        });
    }
    done.wait().await;
}
