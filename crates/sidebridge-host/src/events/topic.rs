//! Typed publish/subscribe topic with revocable subscriptions.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::mpsc;

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Entry<T> {
    id: u64,
    active: Arc<AtomicBool>,
    callback: Callback<T>,
}

impl<T> Clone for Entry<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            active: Arc::clone(&self.active),
            callback: Arc::clone(&self.callback),
        }
    }
}

struct Registry<T> {
    next_id: u64,
    entries: Vec<Entry<T>>,
}

fn lock<T>(registry: &Mutex<Registry<T>>) -> MutexGuard<'_, Registry<T>> {
    // Callbacks never run under the lock, so a poisoned registry is still consistent.
    registry.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Outcome of one [`Topic::publish`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub panicked: usize,
}

/// A named channel with an ordered set of subscribers.
///
/// Delivery is synchronous, in registration order. The subscriber list
/// is snapshotted before delivery, so callbacks may subscribe or
/// unsubscribe (themselves included) while an event is in flight.
pub struct Topic<T> {
    name: &'static str,
    registry: Arc<Mutex<Registry<T>>>,
}

impl<T: 'static> Topic<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            registry: Arc::new(Mutex::new(Registry {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Register `callback` and return the handle that revokes it.
    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> Subscription {
        let active = Arc::new(AtomicBool::new(true));
        let id = {
            let mut registry = lock(&self.registry);
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.push(Entry {
                id,
                active: Arc::clone(&active),
                callback: Arc::new(callback),
            });
            id
        };

        let registry: Weak<Mutex<Registry<T>>> = Arc::downgrade(&self.registry);
        Subscription {
            channel: self.name,
            cancel: Arc::new(move || {
                if !active.swap(false, Ordering::AcqRel) {
                    return;
                }
                if let Some(registry) = registry.upgrade() {
                    lock(&registry).entries.retain(|entry| entry.id != id);
                }
            }),
        }
    }

    /// Forward every event into an unbounded channel.
    ///
    /// For async consumers and for work too slow to run inline with
    /// delivery. Events published after the receiver is dropped are
    /// discarded.
    pub fn subscribe_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<T>)
    where
        T: Clone + Send,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscription = self.subscribe(move |event: &T| {
            let _ = tx.send(event.clone());
        });
        (subscription, rx)
    }

    /// Deliver `event` to every current subscriber.
    ///
    /// A panicking subscriber is counted and skipped; the remaining
    /// subscribers still receive the event.
    pub fn publish(&self, event: &T) -> Delivery {
        let snapshot: Vec<Entry<T>> = lock(&self.registry).entries.clone();
        let mut delivery = Delivery::default();
        for entry in snapshot {
            // Revoked by an earlier subscriber during this same delivery.
            if !entry.active.load(Ordering::Acquire) {
                continue;
            }
            match catch_unwind(AssertUnwindSafe(|| (entry.callback)(event))) {
                Ok(()) => delivery.delivered += 1,
                Err(_) => {
                    tracing::error!(channel = self.name, "Subscriber panicked during delivery");
                    delivery.panicked += 1;
                }
            }
        }
        delivery
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.registry).entries.len()
    }
}

impl<T> std::fmt::Debug for Topic<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Topic").field("name", &self.name).finish_non_exhaustive()
    }
}

/// Handle returned by every subscribe function.
///
/// Dropping the handle keeps the subscription alive; call
/// [`Subscription::unsubscribe`] to revoke it. Clones share the same
/// registration.
#[derive(Clone)]
#[must_use = "keep the handle to be able to unsubscribe"]
pub struct Subscription {
    channel: &'static str,
    cancel: Arc<dyn Fn() + Send + Sync>,
}

impl Subscription {
    /// Remove this registration. Safe to call any number of times,
    /// including from inside the subscribed callback.
    ///
    /// Once this returns, no delivery starts calling the callback, and
    /// deliveries on the calling thread skip it even mid-fan-out. A call
    /// already running on another thread is not waited for.
    pub fn unsubscribe(&self) {
        (self.cancel)();
    }

    pub const fn channel(&self) -> &'static str {
        self.channel
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("channel", &self.channel)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&log);
        (log, move |entry: &str| sink.lock().unwrap().push(entry.to_string()))
    }

    #[test]
    fn delivers_in_registration_order() {
        let topic = Topic::<u32>::new("numbers");
        let (log, record) = recorder();
        let r1 = record.clone();
        let _a = topic.subscribe(move |n| r1(&format!("a{n}")));
        let _b = topic.subscribe(move |n| record(&format!("b{n}")));

        topic.publish(&1);
        topic.publish(&2);
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "a2", "b2"]);
    }

    #[test]
    fn unsubscribe_is_idempotent_and_targeted() {
        let topic = Topic::<u32>::new("numbers");
        let (log, record) = recorder();
        let r1 = record.clone();
        let a = topic.subscribe(move |n| r1(&format!("a{n}")));
        let _b = topic.subscribe(move |n| record(&format!("b{n}")));

        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(topic.subscriber_count(), 1);

        topic.publish(&7);
        assert_eq!(*log.lock().unwrap(), vec!["b7"]);
    }

    #[test]
    fn callback_can_unsubscribe_itself() {
        let topic = Arc::new(Topic::<u32>::new("numbers"));
        let (log, record) = recorder();
        let slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let own = Arc::clone(&slot);
        let sub = topic.subscribe(move |n| {
            record(&format!("once{n}"));
            if let Some(sub) = own.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        *slot.lock().unwrap() = Some(sub);

        topic.publish(&1);
        topic.publish(&2);
        assert_eq!(*log.lock().unwrap(), vec!["once1"]);
        assert_eq!(topic.subscriber_count(), 0);
    }

    #[test]
    fn revoked_mid_delivery_is_not_called() {
        let topic = Topic::<u32>::new("numbers");
        let (log, record) = recorder();
        let victim: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));

        let target = Arc::clone(&victim);
        let _killer = topic.subscribe(move |_| {
            if let Some(sub) = target.lock().unwrap().as_ref() {
                sub.unsubscribe();
            }
        });
        let sub = topic.subscribe(move |n| record(&format!("victim{n}")));
        *victim.lock().unwrap() = Some(sub);

        topic.publish(&1);
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn panicking_subscriber_does_not_stop_others() {
        let topic = Topic::<u32>::new("numbers");
        let (log, record) = recorder();
        let _bad = topic.subscribe(|_| panic!("subscriber bug"));
        let _good = topic.subscribe(move |n| record(&format!("good{n}")));

        let delivery = topic.publish(&3);
        assert_eq!(delivery, Delivery { delivered: 1, panicked: 1 });
        assert_eq!(*log.lock().unwrap(), vec!["good3"]);
    }

    #[test]
    fn unsubscribe_after_topic_dropped_is_harmless() {
        let topic = Topic::<u32>::new("numbers");
        let sub = topic.subscribe(|_| {});
        drop(topic);
        sub.unsubscribe();
    }

    #[tokio::test]
    async fn channel_subscription_forwards_events() {
        let topic = Topic::<String>::new("text");
        let (sub, mut rx) = topic.subscribe_channel();
        topic.publish(&"hello".to_string());
        sub.unsubscribe();
        topic.publish(&"ignored".to_string());

        assert_eq!(rx.recv().await.as_deref(), Some("hello"));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn unsubscribe_from_another_thread_during_delivery() {
        use std::sync::mpsc as std_mpsc;

        let topic = Arc::new(Topic::<u32>::new("numbers"));
        let (log, record) = recorder();
        let (entered_tx, entered_rx) = std_mpsc::channel();
        let (release_tx, release_rx) = std_mpsc::channel::<()>();
        let entered_tx = Mutex::new(entered_tx);
        let release_rx = Mutex::new(release_rx);

        let sub = topic.subscribe(move |n| {
            record(&format!("slow{n}"));
            entered_tx.lock().unwrap().send(()).unwrap();
            let _ = release_rx.lock().unwrap().recv();
        });

        let publisher = {
            let topic = Arc::clone(&topic);
            std::thread::spawn(move || topic.publish(&1))
        };
        entered_rx.recv().unwrap();
        // Returns without waiting for the in-flight call.
        sub.unsubscribe();
        assert_eq!(topic.subscriber_count(), 0);
        release_tx.send(()).unwrap();
        assert_eq!(publisher.join().unwrap().delivered, 1);

        assert_eq!(topic.publish(&2).delivered, 0);
        assert_eq!(*log.lock().unwrap(), vec!["slow1"]);
    }
}
