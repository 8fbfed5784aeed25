use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;

use common::crypto::PublicKey;
use common::notify::{Notification, NotificationReceiver};

/// Registry of locally connected client sessions interested in
/// notifications
///
/// Keyed by client public identity so the sender's own session can be
/// skipped during fan-out.
#[derive(Debug, Clone, Default)]
pub struct Subscribers {
    inner: Arc<Mutex<HashMap<String, flume::Sender<Notification>>>>,
}

impl Subscribers {
    /// Register a client session; returns the receiving end it should drain.
    pub fn subscribe(&self, client: &PublicKey) -> flume::Receiver<Notification> {
        let (tx, rx) = flume::unbounded();
        self.inner.lock().insert(client.to_hex(), tx);
        rx
    }

    pub fn unsubscribe(&self, client: &PublicKey) {
        self.inner.lock().remove(&client.to_hex());
    }

    /// Deliver a notification to every subscriber except the sender.
    ///
    /// Best-effort: sessions whose receiver is gone are dropped from the
    /// registry. Returns how many sessions were reached.
    fn deliver(&self, notification: &Notification) -> usize {
        let sender_key = notification.sender.to_hex();
        let mut delivered = 0;

        let mut subscribers = self.inner.lock();
        subscribers.retain(|key, tx| {
            if *key == sender_key {
                return true;
            }
            match tx.send(notification.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => {
                    tracing::debug!("dropping disconnected subscriber {}", key);
                    false
                }
            }
        });

        delivered
    }
}

/// Minimal delivery loop - drains the notification channel and fans out
///
/// Processes push notifications fire-and-forget; everything about actually
/// reaching the user's other clients lives here, off their critical path.
pub struct NotificationCoordinator {
    subscribers: Subscribers,
}

impl NotificationCoordinator {
    pub fn new(subscribers: Subscribers) -> Self {
        Self { subscribers }
    }

    /// Run the delivery loop until the channel drains or shutdown fires.
    pub async fn run(self, receiver: NotificationReceiver, mut shutdown: watch::Receiver<bool>) {
        tracing::info!("notification coordinator started");

        loop {
            tokio::select! {
                notification = receiver.recv() => {
                    match notification {
                        Some(notification) => {
                            let reached = self.subscribers.deliver(&notification);
                            tracing::debug!(
                                "delivered {:?} from {} to {} session(s)",
                                notification.event,
                                notification.sender,
                                reached
                            );
                        }
                        None => {
                            tracing::info!("all notification dispatchers dropped");
                            break;
                        }
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("notification coordinator shutting down");
                    break;
                }
            }
        }

        tracing::info!("notification coordinator stopped");
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::crypto::SecretKey;
    use common::notify::{ClientEvent, NotificationDispatcher};

    #[tokio::test]
    async fn test_fan_out_skips_the_sender() {
        let subscribers = Subscribers::default();
        let alice_desktop = SecretKey::generate().public();
        let alice_laptop = SecretKey::generate().public();

        let desktop_rx = subscribers.subscribe(&alice_desktop);
        let laptop_rx = subscribers.subscribe(&alice_laptop);

        let (dispatcher, receiver) = NotificationDispatcher::new();
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let coordinator = NotificationCoordinator::new(subscribers.clone());
        let worker = tokio::spawn(coordinator.run(receiver, shutdown_rx));

        dispatcher.dispatch(Notification {
            sender: alice_desktop,
            event: ClientEvent::FileDeleted {
                name: "old".to_string(),
            },
        });

        let delivered = laptop_rx.recv_async().await.unwrap();
        assert_eq!(delivered.sender, alice_desktop);
        assert!(desktop_rx.try_recv().is_err());

        drop(dispatcher);
        worker.await.unwrap();
    }

    #[tokio::test]
    async fn test_disconnected_subscribers_are_pruned() {
        let subscribers = Subscribers::default();
        let sender = SecretKey::generate().public();
        let gone = SecretKey::generate().public();
        let alive = SecretKey::generate().public();

        drop(subscribers.subscribe(&gone));
        let alive_rx = subscribers.subscribe(&alive);

        let reached = subscribers.deliver(&Notification {
            sender,
            event: ClientEvent::ProfileUpdated,
        });

        assert_eq!(reached, 1);
        assert!(alive_rx.try_recv().is_ok());
        assert_eq!(subscribers.inner.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_the_loop() {
        let subscribers = Subscribers::default();
        let (_dispatcher, receiver) = NotificationDispatcher::new();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let coordinator = NotificationCoordinator::new(subscribers);
        let worker = tokio::spawn(coordinator.run(receiver, shutdown_rx));

        shutdown_tx.send(true).unwrap();
        worker.await.unwrap();
    }
}
