//! Renderer-facing event surface: one subscribe function per channel.

use std::path::PathBuf;

use sidebridge_core::protocol::{
    ChannelEvent, ChatMessage, ConnectionStatus, Room, User, channels,
};
use tokio::sync::mpsc;
use tracing::warn;

use super::topic::{Delivery, Subscription, Topic};
use super::types::{Diagnostic, LogLine, WorkerLifecycle};

/// Publish/subscribe hub between the worker bridge and the UI.
///
/// Every channel has its own [`Topic`]; `on_event` additionally sees
/// every structured event regardless of channel.
#[derive(Debug)]
pub struct EventBridge {
    rooms_updated: Topic<Vec<Room>>,
    myrooms_updated: Topic<Vec<Room>>,
    users_updated: Topic<Vec<User>>,
    connection_success: Topic<()>,
    connection_status: Topic<ConnectionStatus>,
    message_received: Topic<ChatMessage>,
    song_received: Topic<PathBuf>,
    any_event: Topic<ChannelEvent>,
    worker_log: Topic<LogLine>,
    lifecycle: Topic<WorkerLifecycle>,
    diagnostic: Topic<Diagnostic>,
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            rooms_updated: Topic::new(channels::ROOMS_UPDATED),
            myrooms_updated: Topic::new(channels::MYROOMS_UPDATED),
            users_updated: Topic::new(channels::USERS_UPDATED),
            connection_success: Topic::new(channels::CONNECTION_SUCCESS),
            connection_status: Topic::new(channels::CONNECTION_STATUS),
            message_received: Topic::new(channels::MESSAGE_RECEIVED),
            song_received: Topic::new(channels::SONG_RECEIVED),
            any_event: Topic::new("event"),
            worker_log: Topic::new(channels::WORKER_LOG),
            lifecycle: Topic::new(channels::WORKER_LIFECYCLE),
            diagnostic: Topic::new(channels::DIAGNOSTIC),
        }
    }

    pub fn on_rooms_updated(&self, f: impl Fn(&Vec<Room>) + Send + Sync + 'static) -> Subscription {
        self.rooms_updated.subscribe(f)
    }

    pub fn on_my_rooms_updated(
        &self,
        f: impl Fn(&Vec<Room>) + Send + Sync + 'static,
    ) -> Subscription {
        self.myrooms_updated.subscribe(f)
    }

    pub fn on_userlist_updated(
        &self,
        f: impl Fn(&Vec<User>) + Send + Sync + 'static,
    ) -> Subscription {
        self.users_updated.subscribe(f)
    }

    pub fn on_connection_success(&self, f: impl Fn() + Send + Sync + 'static) -> Subscription {
        self.connection_success.subscribe(move |_: &()| f())
    }

    pub fn on_connection_status(
        &self,
        f: impl Fn(&ConnectionStatus) + Send + Sync + 'static,
    ) -> Subscription {
        self.connection_status.subscribe(f)
    }

    pub fn on_message_received(
        &self,
        f: impl Fn(&ChatMessage) + Send + Sync + 'static,
    ) -> Subscription {
        self.message_received.subscribe(f)
    }

    pub fn on_song_received(&self, f: impl Fn(&PathBuf) + Send + Sync + 'static) -> Subscription {
        self.song_received.subscribe(f)
    }

    /// Every structured event, whatever its channel.
    pub fn on_event(&self, f: impl Fn(&ChannelEvent) + Send + Sync + 'static) -> Subscription {
        self.any_event.subscribe(f)
    }

    pub fn on_worker_log(&self, f: impl Fn(&LogLine) + Send + Sync + 'static) -> Subscription {
        self.worker_log.subscribe(f)
    }

    pub fn on_lifecycle(
        &self,
        f: impl Fn(&WorkerLifecycle) + Send + Sync + 'static,
    ) -> Subscription {
        self.lifecycle.subscribe(f)
    }

    pub fn on_diagnostic(&self, f: impl Fn(&Diagnostic) + Send + Sync + 'static) -> Subscription {
        self.diagnostic.subscribe(f)
    }

    pub fn event_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<ChannelEvent>) {
        self.any_event.subscribe_channel()
    }

    pub fn lifecycle_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<WorkerLifecycle>) {
        self.lifecycle.subscribe_channel()
    }

    pub fn diagnostic_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<Diagnostic>) {
        self.diagnostic.subscribe_channel()
    }

    pub fn log_channel(&self) -> (Subscription, mpsc::UnboundedReceiver<LogLine>) {
        self.worker_log.subscribe_channel()
    }

    /// Deliver a decoded event to its channel, then to `on_event` subscribers.
    pub fn publish_event(&self, event: &ChannelEvent) {
        let delivery = match event {
            ChannelEvent::RoomsUpdated(rooms) => self.rooms_updated.publish(rooms),
            ChannelEvent::MyRoomsUpdated(rooms) => self.myrooms_updated.publish(rooms),
            ChannelEvent::UsersUpdated(users) => self.users_updated.publish(users),
            ChannelEvent::ConnectionSuccess => self.connection_success.publish(&()),
            ChannelEvent::ConnectionStatus(status) => self.connection_status.publish(status),
            ChannelEvent::MessageReceived(msg) => self.message_received.publish(msg),
            ChannelEvent::SongReceived(path) => self.song_received.publish(path),
        };
        self.report_panics(event.channel(), delivery);
        let delivery = self.any_event.publish(event);
        self.report_panics(self.any_event.name(), delivery);
    }

    pub fn publish_log(&self, line: &LogLine) {
        let delivery = self.worker_log.publish(line);
        self.report_panics(self.worker_log.name(), delivery);
    }

    pub fn publish_lifecycle(&self, event: &WorkerLifecycle) {
        let delivery = self.lifecycle.publish(event);
        self.report_panics(self.lifecycle.name(), delivery);
    }

    pub fn publish_diagnostic(&self, diagnostic: &Diagnostic) {
        let delivery = self.diagnostic.publish(diagnostic);
        if delivery.panicked > 0 {
            // Not re-published, to avoid feeding a failing subscriber its own report.
            warn!(count = delivery.panicked, "Diagnostic subscriber panicked");
        }
    }

    fn report_panics(&self, channel: &str, delivery: Delivery) {
        if delivery.panicked > 0 {
            self.publish_diagnostic(&Diagnostic::SubscriberPanicked {
                channel: channel.to_string(),
                count: delivery.panicked,
            });
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn event_reaches_its_channel_and_the_catch_all() {
        let bridge = EventBridge::new();
        let rooms = Arc::new(AtomicUsize::new(0));
        let users = Arc::new(AtomicUsize::new(0));
        let any = Arc::new(AtomicUsize::new(0));

        let r = Arc::clone(&rooms);
        let _s1 = bridge.on_rooms_updated(move |list| {
            r.fetch_add(list.len(), Ordering::SeqCst);
        });
        let u = Arc::clone(&users);
        let _s2 = bridge.on_userlist_updated(move |_| {
            u.fetch_add(1, Ordering::SeqCst);
        });
        let a = Arc::clone(&any);
        let _s3 = bridge.on_event(move |_| {
            a.fetch_add(1, Ordering::SeqCst);
        });

        bridge.publish_event(&ChannelEvent::RoomsUpdated(vec![Room {
            name: "General".into(),
            users: 3,
            id: None,
        }]));

        assert_eq!(rooms.load(Ordering::SeqCst), 1);
        assert_eq!(users.load(Ordering::SeqCst), 0);
        assert_eq!(any.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn connection_success_callback_takes_no_payload() {
        let bridge = EventBridge::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let sub = bridge.on_connection_success(move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        bridge.publish_event(&ChannelEvent::ConnectionSuccess);
        sub.unsubscribe();
        bridge.publish_event(&ChannelEvent::ConnectionSuccess);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn subscriber_panic_becomes_a_diagnostic() {
        let bridge = EventBridge::new();
        let (_diag_sub, mut diagnostics) = bridge.diagnostic_channel();
        let _bad = bridge.on_song_received(|_| panic!("renderer bug"));

        bridge.publish_event(&ChannelEvent::SongReceived(PathBuf::from("/tmp/a.wav")));

        assert_eq!(
            diagnostics.try_recv().unwrap(),
            Diagnostic::SubscriberPanicked {
                channel: channels::SONG_RECEIVED.to_string(),
                count: 1
            }
        );
    }
}
