//! Topic-addressed message transport.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use tokio::sync::{RwLock, mpsc};

use crate::codec::{FramedCodec, MessageCodec};
use crate::error::{MessagingError, Result};
use crate::message::SagaMessage;
use crate::topic::Topic;

/// Records each topic keeps for inspection by default.
pub const DEFAULT_RETENTION: usize = 1024;

/// A stream of decoded records from one topic. Records that fail to decode
/// are yielded as errors so the consumer can log and skip them.
pub type MessageStream = BoxStream<'static, Result<SagaMessage>>;

/// A topic-addressed message log.
///
/// Records on a topic reach each subscriber in publish order, at least
/// once.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Appends `message` as one record to `topic`.
    async fn publish(&self, topic: Topic, message: &SagaMessage) -> Result<()>;

    /// Consumes records of `topic` from the subscriber's position on.
    async fn subscribe(&self, topic: Topic) -> Result<MessageStream>;

    /// Flushes pending records and ends every subscription.
    async fn close(&self);
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn publish(&self, topic: Topic, message: &SagaMessage) -> Result<()> {
        (**self).publish(topic, message).await
    }

    async fn subscribe(&self, topic: Topic) -> Result<MessageStream> {
        (**self).subscribe(topic).await
    }

    async fn close(&self) {
        (**self).close().await
    }
}

/// Per-topic handle: the most recent records plus one queue per subscriber.
struct TopicHandle {
    retained: VecDeque<Bytes>,
    subscribers: Vec<mpsc::UnboundedSender<Bytes>>,
}

impl TopicHandle {
    fn new() -> Self {
        Self {
            retained: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }
}

/// In-process transport.
///
/// Every subscriber owns an unbounded queue, so a slow consumer delays its
/// own records but never loses them. Each topic also keeps its last
/// `retention` records, inspectable through [`InMemoryTransport::published`].
/// Topic handles are created on first use and reused.
#[derive(Clone)]
pub struct InMemoryTransport {
    codec: Arc<dyn MessageCodec>,
    topics: Arc<RwLock<HashMap<Topic, TopicHandle>>>,
    retention: usize,
    closed: Arc<AtomicBool>,
}

impl Default for InMemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTransport {
    /// Creates a transport using the framed codec.
    pub fn new() -> Self {
        Self::with_codec(Arc::new(FramedCodec))
    }

    /// Creates a transport using `codec` for every record.
    pub fn with_codec(codec: Arc<dyn MessageCodec>) -> Self {
        Self {
            codec,
            topics: Arc::new(RwLock::new(HashMap::new())),
            retention: DEFAULT_RETENTION,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Keeps at most `retention` records per topic for inspection. Zero
    /// keeps none.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Retained raw records of `topic`, oldest first.
    pub async fn records(&self, topic: Topic) -> Vec<Bytes> {
        self.topics
            .read()
            .await
            .get(&topic)
            .map(|handle| handle.retained.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Retained messages of `topic`, decoded, oldest first.
    pub async fn published(&self, topic: Topic) -> Result<Vec<SagaMessage>> {
        self.records(topic)
            .await
            .iter()
            .map(|record| self.codec.decode(record))
            .collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl Transport for InMemoryTransport {
    #[tracing::instrument(skip(self, message), fields(%topic, name = %message.name, saga_id = %message.saga_id))]
    async fn publish(&self, topic: Topic, message: &SagaMessage) -> Result<()> {
        self.ensure_open()?;
        let record = self.codec.encode(message)?;

        let mut topics = self.topics.write().await;
        let handle = topics.entry(topic).or_insert_with(TopicHandle::new);
        if self.retention > 0 {
            if handle.retained.len() == self.retention {
                handle.retained.pop_front();
            }
            handle.retained.push_back(record.clone());
        }
        // Subscribers whose stream was dropped go away here.
        handle
            .subscribers
            .retain(|subscriber| subscriber.send(record.clone()).is_ok());

        metrics::counter!("transport_records_published_total", "topic" => topic.to_string())
            .increment(1);
        tracing::debug!(receivers = handle.subscribers.len(), "record published");
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<MessageStream> {
        self.ensure_open()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        self.topics
            .write()
            .await
            .entry(topic)
            .or_insert_with(TopicHandle::new)
            .subscribers
            .push(sender);
        let codec = self.codec.clone();

        let stream = stream::unfold(receiver, move |mut receiver| {
            let codec = codec.clone();
            async move {
                let record = receiver.recv().await?;
                Some((codec.decode(&record), receiver))
            }
        });

        tracing::info!(%topic, "subscribed");
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        // Dropping the senders ends every subscription once it drains.
        self.topics.write().await.clear();
        tracing::info!("in-memory transport closed");
    }
}
