use tokio::sync::oneshot;

/// Run CPU-bound work on the rayon pool and await it without blocking the I/O loop.
///
/// Returns `None` if the closure panicked.
pub async fn offload<T, F>(work: F) -> Option<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    rayon::spawn(move || {
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(work));
        if let Ok(value) = result {
            let _ = tx.send(value);
        }
    });
    rx.await.ok()
}
