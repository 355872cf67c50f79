//! In-process topic bus with bounded replay buffers

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Per-subscriber delivery queue depth; overflowing events are dropped
/// for that subscriber, never blocking the publisher.
pub const SUBSCRIBER_QUEUE_DEPTH: usize = 100;

/// Per-topic replay behaviour.
#[derive(Debug, Clone, Copy)]
pub struct TopicConfig {
    /// How many past events the topic retains.
    pub buffer_size: usize,
    /// Replay the whole buffer to new subscribers, or just the latest.
    pub replay_all: bool,
}

impl TopicConfig {
    /// Latest-only topics keep a single event and replay it.
    pub fn latest_only() -> Self {
        TopicConfig {
            buffer_size: 1,
            replay_all: false,
        }
    }
}

impl Default for TopicConfig {
    fn default() -> Self {
        TopicConfig {
            buffer_size: 16,
            replay_all: false,
        }
    }
}

/// One published event as seen by subscribers. Versions are per-topic,
/// monotone and gap-free.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub topic: String,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: serde_json::Value,
    pub version: u64,
}

struct Subscriber {
    id: u64,
    tx: mpsc::Sender<Event>,
}

#[derive(Default)]
struct TopicState {
    next_version: u64,
    buffer: VecDeque<Event>,
    subscribers: Vec<Subscriber>,
}

struct Topic {
    config: TopicConfig,
    state: Mutex<TopicState>,
}

/// The bus. Publishing never blocks and never awaits; all locking is
/// short and internal.
pub struct Broker {
    topics: DashMap<String, Arc<Topic>>,
    next_subscriber: AtomicU64,
}

impl Broker {
    pub fn new() -> Self {
        Broker {
            topics: DashMap::new(),
            next_subscriber: AtomicU64::new(0),
        }
    }

    /// Declare a topic's configuration; idempotent for existing topics.
    pub fn register_topic(&self, name: &str, config: TopicConfig) {
        self.topics.entry(name.to_string()).or_insert_with(|| {
            Arc::new(Topic {
                config,
                state: Mutex::new(TopicState::default()),
            })
        });
    }

    fn topic(&self, name: &str) -> Arc<Topic> {
        self.topics
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(Topic {
                    config: TopicConfig::default(),
                    state: Mutex::new(TopicState::default()),
                })
            })
            .clone()
    }

    /// Assign the next version, append to the replay buffer, and hand the
    /// event to every live subscriber. A full subscriber queue drops the
    /// event for that subscriber only.
    pub fn publish(&self, topic_name: &str, event_type: &str, data: serde_json::Value) -> u64 {
        let topic = self.topic(topic_name);
        let Ok(mut state) = topic.state.lock() else {
            return 0;
        };
        let version = state.next_version;
        state.next_version += 1;

        let event = Event {
            topic: topic_name.to_string(),
            event_type: event_type.to_string(),
            data,
            version,
        };
        state.buffer.push_back(event.clone());
        while state.buffer.len() > topic.config.buffer_size {
            state.buffer.pop_front();
        }

        state.subscribers.retain(|subscriber| {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(
                        topic = topic_name,
                        subscriber = subscriber.id,
                        "subscriber queue full, dropping event {version}"
                    );
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
        version
    }

    /// Register a subscriber and, under the same lock, snapshot the
    /// replay buffer so no publish can slip between replay and live
    /// delivery. Dropping the subscription unsubscribes.
    pub fn subscribe(&self, topic_name: &str) -> Subscription {
        let topic = self.topic(topic_name);
        let id = self.next_subscriber.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_DEPTH);

        {
            let Ok(mut state) = topic.state.lock() else {
                return Subscription { id, topic, rx };
            };
            let replay: Vec<Event> = if topic.config.replay_all {
                state.buffer.iter().cloned().collect()
            } else {
                state.buffer.back().cloned().into_iter().collect()
            };
            for event in replay {
                // Queue depth always exceeds replay length; a failure
                // here means the receiver is already gone.
                let _ = tx.try_send(event);
            }
            state.subscribers.push(Subscriber { id, tx });
        }
        Subscription { id, topic, rx }
    }

    /// Close every subscriber channel on every topic.
    pub fn close(&self) {
        for entry in self.topics.iter() {
            if let Ok(mut state) = entry.value().state.lock() {
                state.subscribers.clear();
            }
        }
    }
}

impl Default for Broker {
    fn default() -> Self {
        Broker::new()
    }
}

/// A live subscription; receive events via `recv`. Dropping it removes
/// the subscriber and closes the channel.
pub struct Subscription {
    id: u64,
    topic: Arc<Topic>,
    rx: mpsc::Receiver<Event>,
}

impl Subscription {
    pub async fn recv(&mut self) -> Option<Event> {
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Ok(mut state) = self.topic.state.lock() {
            state.subscribers.retain(|s| s.id != self.id);
        }
    }
}
