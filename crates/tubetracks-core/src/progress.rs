//! Progress notifications for a download session.
//!
//! The [`ProgressChannel`] fans every [`DownloadEvent`] out to all of its
//! subscribers in publish order:
//! - Listener callbacks run synchronously on the publishing task
//! - Channel subscribers receive events through an unbounded `mpsc` queue
//!
//! The channel is closed when the session ends; channel subscribers then see
//! the end of their stream.

use std::path::PathBuf;
use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::source::PlaylistReference;

/// A playlist item that was converted successfully.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedFile {
    /// Item title.
    pub title: String,
    /// Number of completed conversions, this one included.
    pub sequence_number: u64,
    /// Path of the written file.
    pub path: PathBuf,
    /// Uploader of the item, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    /// Item duration in seconds, when the source knows it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<u64>,
}

/// A playlist item that could not be fetched or converted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemFailure {
    /// Reference of the failed item.
    pub reference: PlaylistReference,
    /// Item title, when the item was resolved before failing.
    pub title: Option<String>,
    /// Error description.
    pub error: String,
}

/// Event types emitted by a download session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DownloadEvent {
    /// An item was converted and written to disk.
    FileDownloaded(DownloadedFile),
    /// An item was skipped because of an error.
    ItemFailed(ItemFailure),
}

type Listener = Box<dyn Fn(&DownloadEvent) + Send + Sync>;

enum Subscriber {
    Listener(Listener),
    Channel(mpsc::UnboundedSender<DownloadEvent>),
}

/// Publish/subscribe hub owned by a download session.
#[derive(Default)]
pub struct ProgressChannel {
    subscribers: RwLock<Vec<Subscriber>>,
}

impl ProgressChannel {
    /// Create a channel with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback for every event.
    pub fn subscribe_listener(&self, listener: impl Fn(&DownloadEvent) + Send + Sync + 'static) {
        self.push(Subscriber::Listener(Box::new(listener)));
    }

    /// Register a queue receiving every event published from now on.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<DownloadEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(Subscriber::Channel(tx));
        rx
    }

    /// Deliver `event` to every subscriber.
    pub fn publish(&self, event: &DownloadEvent) {
        let subscribers = self
            .subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        for subscriber in subscribers.iter() {
            match subscriber {
                Subscriber::Listener(listener) => listener(event),
                Subscriber::Channel(tx) => {
                    if tx.send(event.clone()).is_err() {
                        debug!("Progress subscriber dropped its receiver");
                    }
                }
            }
        }
    }

    /// Drop every subscriber; channel receivers observe end of stream.
    pub fn close(&self) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Number of registered subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn push(&self, subscriber: Subscriber) {
        self.subscribers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscriber);
    }
}

impl std::fmt::Debug for ProgressChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressChannel")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn downloaded(title: &str, sequence_number: u64) -> DownloadEvent {
        DownloadEvent::FileDownloaded(DownloadedFile {
            title: title.to_string(),
            sequence_number,
            path: PathBuf::from(format!("/music/{title}.mp3")),
            channel: None,
            duration_secs: None,
        })
    }

    #[test]
    fn test_every_listener_sees_every_event_in_order() {
        let channel = ProgressChannel::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));

        for seen in [Arc::clone(&first), Arc::clone(&second)] {
            channel.subscribe_listener(move |event| {
                if let DownloadEvent::FileDownloaded(file) = event {
                    seen.lock().unwrap().push(file.sequence_number);
                }
            });
        }

        for n in 1..=3 {
            channel.publish(&downloaded("track", n));
        }

        assert_eq!(*first.lock().unwrap(), [1, 2, 3]);
        assert_eq!(*second.lock().unwrap(), [1, 2, 3]);
    }

    #[tokio::test]
    async fn test_channel_subscriber_receives_then_closes() {
        let channel = ProgressChannel::new();
        let mut rx = channel.subscribe();

        channel.publish(&downloaded("One", 1));
        channel.publish(&downloaded("Two", 2));
        channel.close();

        assert_eq!(rx.recv().await, Some(downloaded("One", 1)));
        assert_eq!(rx.recv().await, Some(downloaded("Two", 2)));
        assert_eq!(rx.recv().await, None);
        assert_eq!(channel.subscriber_count(), 0);
    }

    #[test]
    fn test_dropped_receiver_does_not_break_publishing() {
        let channel = ProgressChannel::new();
        drop(channel.subscribe());
        let count = Arc::new(Mutex::new(0));
        let seen = Arc::clone(&count);
        channel.subscribe_listener(move |_| *seen.lock().unwrap() += 1);

        channel.publish(&downloaded("One", 1));
        assert_eq!(*count.lock().unwrap(), 1);
    }

    #[test]
    fn test_event_json_shape() {
        let json = serde_json::to_value(downloaded("One", 1)).unwrap();
        assert_eq!(json["type"], "file_downloaded");
        assert_eq!(json["data"]["sequence_number"], 1);
        assert_eq!(json["data"]["title"], "One");
        assert!(json["data"].get("channel").is_none());
    }
}
