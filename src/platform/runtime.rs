use std::future::Future;
use std::task::Poll;

/// Platform-independent helper to spawn an async task that runs in the background.
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + 'static,
{
    wasm_bindgen_futures::spawn_local(future);
}

/// Platform-independent helper to spawn an async task that runs in the background.
///
/// The future is dropped when no tokio runtime is reachable from the calling thread;
/// callers must then drive the work themselves (see `Document::flush_mutations`).
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(handle) = tokio::runtime::Handle::try_current() {
        handle.spawn(future);
    }
}

#[cfg(all(target_arch = "wasm32", not(feature = "wasm-web")))]
pub fn spawn_detached<F>(future: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    drop(future);
}

/// Returns `true` when [`spawn_detached`] has an executor to hand work to.
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub fn has_executor() -> bool {
    true
}

/// Returns `true` when [`spawn_detached`] has an executor to hand work to.
#[cfg(not(target_arch = "wasm32"))]
pub fn has_executor() -> bool {
    tokio::runtime::Handle::try_current().is_ok()
}

#[cfg(all(target_arch = "wasm32", not(feature = "wasm-web")))]
pub fn has_executor() -> bool {
    false
}

/// Current wall-clock time in epoch milliseconds, as `Date.now()` reports it.
#[cfg(all(target_arch = "wasm32", feature = "wasm-web"))]
pub fn now_millis() -> i64 {
    js_sys::Date::now() as i64
}

/// Current wall-clock time in epoch milliseconds, as `Date.now()` reports it.
#[cfg(not(all(target_arch = "wasm32", feature = "wasm-web")))]
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Yields once to the executor so tasks queued behind the caller get a chance to run.
pub async fn yield_now() {
    let mut yielded = false;
    futures::future::poll_fn(|cx| {
        if yielded {
            Poll::Ready(())
        } else {
            yielded = true;
            cx.waker().wake_by_ref();
            Poll::Pending
        }
    })
    .await
}
