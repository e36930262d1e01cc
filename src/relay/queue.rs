//! Cancellation-aware helpers over the relay's bounded queues

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receive the next item from `rx`.
///
/// Once `ct` fires the queue is closed, so producers blocked on it are
/// released, and what is already buffered is still handed out before `None`.
pub(crate) async fn recv_or_close<T>(
    rx: &mut mpsc::Receiver<T>,
    ct: &CancellationToken,
) -> Option<T> {
    if !ct.is_cancelled() {
        tokio::select! {
            biased;
            _ = ct.cancelled() => {}
            item = rx.recv() => return item,
        }
    }

    rx.close();
    rx.recv().await
}

/// Send `item` unless `ct` fires first. Returns `false` if the item was not
/// delivered because of cancellation or a closed queue.
pub(crate) async fn send_or_cancel<T>(
    tx: &mpsc::Sender<T>,
    item: T,
    ct: &CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = ct.cancelled() => false,
        res = tx.send(item) => res.is_ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancel_closes_queue_but_drains_buffer() {
        let (tx, mut rx) = mpsc::channel(4);
        let ct = CancellationToken::new();
        tx.send(1).await.unwrap();
        tx.send(2).await.unwrap();
        ct.cancel();

        assert_eq!(recv_or_close(&mut rx, &ct).await, Some(1));
        assert!(tx.is_closed());
        assert!(tx.send(3).await.is_err());
        assert_eq!(recv_or_close(&mut rx, &ct).await, Some(2));
        assert_eq!(recv_or_close(&mut rx, &ct).await, None);
    }

    #[tokio::test]
    async fn test_send_gives_up_on_cancel_when_full() {
        let (tx, _rx) = mpsc::channel(1);
        let ct = CancellationToken::new();
        assert!(send_or_cancel(&tx, 1, &ct).await);

        let waiter = {
            let tx = tx.clone();
            let ct = ct.clone();
            tokio::spawn(async move { send_or_cancel(&tx, 2, &ct).await })
        };
        ct.cancel();

        assert!(!waiter.await.unwrap());
    }
}
