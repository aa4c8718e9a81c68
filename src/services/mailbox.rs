//! Single-slot hand-off between the capture worker and its consumer
//!
//! Built on a `watch` channel holding one optional value. Queue depth is 1
//! with a drop-oldest policy: publishing while the slot still holds an
//! unconsumed value replaces it. The producer never blocks.
//!
//! Taking the value does not notify, so only publishes and closure wake the
//! consumer. Dropping the `Publisher` closes the slot, including when the
//! producer thread unwinds.

use std::sync::Arc;
use tokio::sync::watch;

struct Slot<T> {
    value: Option<T>,
    closed: bool,
}

/// Create a connected publisher / subscriber pair
pub fn mailbox<T>() -> (Publisher<T>, Subscriber<T>) {
    let (tx, rx) = watch::channel(Slot { value: None, closed: false });
    let tx = Arc::new(tx);
    (Publisher { tx: tx.clone() }, Subscriber { tx, rx })
}

/// Producer side, owned by the capture worker
pub struct Publisher<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
}

impl<T> Publisher<T> {
    /// Store `value`, replacing any unconsumed one
    ///
    /// Returns true if a previous value was dropped.
    pub fn publish(&self, value: T) -> bool {
        let mut dropped = false;
        self.tx.send_modify(|slot| dropped = slot.value.replace(value).is_some());
        dropped
    }

    /// Mark the producer side as finished and wake the consumer
    pub fn close(&self) {
        self.tx.send_if_modified(|slot| !std::mem::replace(&mut slot.closed, true));
    }
}

impl<T> Drop for Publisher<T> {
    fn drop(&mut self) {
        self.close();
    }
}

/// Consumer side
pub struct Subscriber<T> {
    tx: Arc<watch::Sender<Slot<T>>>,
    rx: watch::Receiver<Slot<T>>,
}

impl<T> Subscriber<T> {
    /// Take the current value without waiting
    pub fn take(&self) -> Option<T> {
        let mut taken = None;
        self.tx.send_if_modified(|slot| {
            taken = slot.value.take();
            false
        });
        taken
    }

    /// Wait for the next value
    ///
    /// Returns None once the slot is closed and drained.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(value) = self.take() {
                return Some(value);
            }
            if self.is_closed() {
                return None;
            }
            if self.rx.changed().await.is_err() {
                return self.take();
            }
        }
    }

    /// True once closed, even if a final value is still waiting
    pub fn is_closed(&self) -> bool {
        self.rx.borrow().closed
    }

    /// Closed with nothing left to consume
    pub fn is_drained(&self) -> bool {
        let slot = self.rx.borrow();
        slot.closed && slot.value.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn test_publish_overwrites_unconsumed() {
        let (publisher, subscriber) = mailbox();

        assert!(!publisher.publish(1));
        assert!(publisher.publish(2));
        assert!(publisher.publish(3));

        assert_eq!(subscriber.take(), Some(3));
        assert_eq!(subscriber.take(), None);
    }

    #[test]
    fn test_publish_after_take_drops_nothing() {
        let (publisher, subscriber) = mailbox();
        publisher.publish("a");
        subscriber.take();
        assert!(!publisher.publish("b"));
    }

    #[tokio::test]
    async fn test_recv_waits_for_value() {
        let (_publisher, mut subscriber) = mailbox::<u32>();
        assert!(timeout(Duration::from_millis(20), subscriber.recv()).await.is_err());
    }

    #[tokio::test]
    async fn test_recv_across_threads() {
        let (publisher, mut subscriber) = mailbox();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            publisher.publish(42u32);
        });

        assert_eq!(timeout(Duration::from_secs(5), subscriber.recv()).await.unwrap(), Some(42));
        handle.join().unwrap();
    }

    #[tokio::test]
    async fn test_close_drains_last_value_then_ends() {
        let (publisher, mut subscriber) = mailbox();
        publisher.publish(7);
        publisher.close();

        assert!(subscriber.is_closed());
        assert!(!subscriber.is_drained());
        assert_eq!(subscriber.recv().await, Some(7));
        assert_eq!(subscriber.recv().await, None);
        assert!(subscriber.is_drained());
    }

    #[tokio::test]
    async fn test_dropping_publisher_wakes_waiter() {
        let (publisher, mut subscriber) = mailbox::<u32>();

        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            drop(publisher);
        });

        assert_eq!(timeout(Duration::from_secs(5), subscriber.recv()).await.unwrap(), None);
        assert!(subscriber.is_drained());
        handle.join().unwrap();
    }

    #[test]
    fn test_publisher_closes_on_panic_unwind() {
        let (publisher, subscriber) = mailbox::<u32>();

        let result = thread::spawn(move || {
            let _publisher = publisher;
            panic!("producer failed");
        })
        .join();

        assert!(result.is_err());
        assert!(subscriber.is_drained());
    }
}
