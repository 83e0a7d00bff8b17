// ABOUTME: Trailing-edge debouncer turning a burst of triggers into one batch
//
// The window opens on the first trigger and is never extended: everything that
// arrives before it closes is delivered together at the window's end.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};

/// Spawn a task that batches `input` into windows of `window`.
///
/// The task ends once `input` is closed (after flushing a pending batch) or the
/// returned receiver is dropped.
pub fn debounce<T: Send + 'static>(
    window: Duration,
    mut input: mpsc::UnboundedReceiver<T>,
) -> mpsc::UnboundedReceiver<Vec<T>> {
    let (tx, rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        while let Some(first) = input.recv().await {
            let deadline = Instant::now() + window;
            let mut batch = vec![first];
            let mut closed = false;

            loop {
                tokio::select! {
                    _ = sleep_until(deadline) => break,
                    next = input.recv(), if !closed => match next {
                        Some(item) => batch.push(item),
                        None => closed = true,
                    },
                }
            }

            if tx.send(batch).is_err() || closed {
                break;
            }
        }
    });

    rx
}
