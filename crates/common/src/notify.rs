//! Notification side channel between a user's clients
//!
//! A lightweight fire-and-forget queue using flume channels. Processes push
//! a [`Notification`] on certain successful transitions (e.g. a file was
//! deleted); delivery to the user's other clients is strictly best-effort
//! and failure to notify never fails the process that sent it.

use serde::{Deserialize, Serialize};

use crate::crypto::PublicKey;

/// What happened, as told to the user's other clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientEvent {
    /// A file or empty folder was removed from the profile.
    FileDeleted { name: String },
    /// The profile changed in a way worth re-fetching for.
    ProfileUpdated,
}

/// A best-effort message to a user's other clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    /// Public identity of the acting client.
    pub sender: PublicKey,
    pub event: ClientEvent,
}

/// Sending half of the notification channel
///
/// Cheap to clone; hand one to every process that may notify.
#[derive(Debug, Clone)]
pub struct NotificationDispatcher {
    tx: flume::Sender<Notification>,
}

impl NotificationDispatcher {
    /// Create a new dispatcher and receiver pair
    ///
    /// The dispatcher can be cloned and shared; the receiver should be given
    /// to the delivery worker.
    pub fn new() -> (Self, NotificationReceiver) {
        let (tx, rx) = flume::unbounded();
        (Self { tx }, NotificationReceiver { rx })
    }

    /// Push a notification, fire-and-forget.
    ///
    /// A dropped receiver is logged and otherwise ignored; the sender's
    /// process carries on regardless.
    pub fn dispatch(&self, notification: Notification) {
        tracing::debug!("dispatching notification: {:?}", notification.event);
        if self.tx.send(notification).is_err() {
            tracing::warn!("notification receiver dropped; notification lost");
        }
    }
}

/// Receiving half of the notification channel
#[derive(Debug)]
pub struct NotificationReceiver {
    rx: flume::Receiver<Notification>,
}

impl NotificationReceiver {
    /// Receive the next notification.
    ///
    /// Returns `None` when all dispatchers have been dropped.
    pub async fn recv(&self) -> Option<Notification> {
        self.rx.recv_async().await.ok()
    }

    /// Try to receive a notification without blocking.
    pub fn try_recv(&self) -> Option<Notification> {
        self.rx.try_recv().ok()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::SecretKey;

    #[tokio::test]
    async fn test_dispatch_and_receive() {
        let (dispatcher, receiver) = NotificationDispatcher::new();
        let sender = SecretKey::generate().public();

        dispatcher.dispatch(Notification {
            sender,
            event: ClientEvent::FileDeleted {
                name: "old".to_string(),
            },
        });

        let notification = receiver.recv().await.unwrap();
        assert_eq!(notification.sender, sender);
        assert_eq!(
            notification.event,
            ClientEvent::FileDeleted {
                name: "old".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_dispatch_after_receiver_dropped_is_silent() {
        let (dispatcher, receiver) = NotificationDispatcher::new();
        drop(receiver);

        // Must not panic or error; the loss is logged and swallowed
        dispatcher.dispatch(Notification {
            sender: SecretKey::generate().public(),
            event: ClientEvent::ProfileUpdated,
        });
    }

    #[test]
    fn test_try_recv_empty() {
        let (_dispatcher, receiver) = NotificationDispatcher::new();
        assert!(receiver.try_recv().is_none());
    }
}
