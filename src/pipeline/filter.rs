//! Predicate filter over a bounded queue

use tokio::sync::mpsc;

const OUTPUT_CAPACITY: usize = 64;

/// Forward the items of `input` that satisfy `predicate`, dropping the rest.
///
/// Stops when `input` closes or `output` loses its receiver.
pub async fn run_filter<T, F>(mut input: mpsc::Receiver<T>, output: mpsc::Sender<T>, predicate: F)
where
    F: Fn(&T) -> bool,
{
    while let Some(item) = input.recv().await {
        if predicate(&item) && output.send(item).await.is_err() {
            return;
        }
    }
}

/// Spawn [`run_filter`] and return the receiving end of its output.
pub fn filtered<T, F>(input: mpsc::Receiver<T>, predicate: F) -> mpsc::Receiver<T>
where
    T: Send + 'static,
    F: Fn(&T) -> bool + Send + 'static,
{
    let (tx, rx) = mpsc::channel(OUTPUT_CAPACITY);
    tokio::spawn(run_filter(input, tx, predicate));
    rx
}
