//! Size- and time-bounded batching over a bounded queue

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

/// Capacity of the queue returned by [`batched`].
const OUTPUT_CAPACITY: usize = 16;

/// Group items from `input` into batches on `output`, preserving arrival order.
///
/// A batch is emitted when:
/// - the buffer already holds `capacity - 1` items and another one arrives
///   (the buffer is emitted first, then the new item is kept),
/// - `timeout` elapses since the previous flush and the buffer is not empty,
/// - `input` closes, after which `output` is closed as well.
///
/// Empty batches are never sent. Returns early if `output` has no receiver.
pub async fn run_batcher<T>(
    mut input: mpsc::Receiver<T>,
    output: mpsc::Sender<Vec<T>>,
    capacity: usize,
    timeout: Duration,
) {
    let threshold = capacity.max(2) - 1;
    let mut buffer: Vec<T> = Vec::with_capacity(threshold);

    let deadline = sleep(timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            item = input.recv() => match item {
                Some(item) => {
                    if buffer.len() >= threshold {
                        tracing::trace!("Batch full ({}), forcing flush", buffer.len());
                        if !flush(&output, &mut buffer).await {
                            return;
                        }
                        deadline.as_mut().reset(Instant::now() + timeout);
                    }
                    buffer.push(item);
                }
                None => {
                    if !buffer.is_empty() {
                        flush(&output, &mut buffer).await;
                    }
                    return;
                }
            },
            _ = &mut deadline => {
                if !buffer.is_empty() && !flush(&output, &mut buffer).await {
                    return;
                }
                deadline.as_mut().reset(Instant::now() + timeout);
            }
        }
    }
}

/// Spawn [`run_batcher`] and return the receiving end of its output.
pub fn batched<T: Send + 'static>(
    input: mpsc::Receiver<T>,
    capacity: usize,
    timeout: Duration,
) -> mpsc::Receiver<Vec<T>> {
    let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
    tokio::spawn(run_batcher(input, tx, capacity, timeout));
    rx
}

async fn flush<T>(output: &mpsc::Sender<Vec<T>>, buffer: &mut Vec<T>) -> bool {
    let batch = std::mem::replace(buffer, Vec::with_capacity(buffer.capacity()));
    output.send(batch).await.is_ok()
}
