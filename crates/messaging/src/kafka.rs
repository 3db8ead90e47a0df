//! Kafka transport.
//!
//! Each saga topic maps to one Kafka topic of the same name. Records are
//! keyed by saga id, so all records of one saga land on one partition and
//! keep their order. Every subscription is its own consumer in the group
//! `{group_prefix}.{topic}`; processes sharing a prefix split a topic's
//! partitions between them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream;
use rdkafka::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};

use crate::codec::{FramedCodec, MessageCodec};
use crate::error::{MessagingError, Result};
use crate::message::SagaMessage;
use crate::topic::Topic;
use crate::transport::{MessageStream, Transport};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);
const FLUSH_TIMEOUT: Duration = Duration::from_secs(10);
const RECEIVE_BACKOFF: Duration = Duration::from_millis(500);

/// Connection settings for [`KafkaTransport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KafkaTransportConfig {
    /// Comma-separated bootstrap servers.
    pub bootstrap_servers: String,
    /// Prefix of every consumer group id (default `checkout`).
    pub group_prefix: String,
    /// Security protocol (PLAINTEXT, SSL, SASL_PLAINTEXT, SASL_SSL).
    pub security_protocol: Option<String>,
}

impl KafkaTransportConfig {
    pub fn new(bootstrap_servers: impl Into<String>) -> Self {
        Self {
            bootstrap_servers: bootstrap_servers.into(),
            group_prefix: "checkout".to_string(),
            security_protocol: None,
        }
    }

    pub fn with_group_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.group_prefix = prefix.into();
        self
    }

    pub fn with_security_protocol(mut self, protocol: impl Into<String>) -> Self {
        self.security_protocol = Some(protocol.into());
        self
    }

    /// Consumer group reading `topic`.
    pub fn group_for(&self, topic: Topic) -> String {
        format!("{}.{}", self.group_prefix, topic)
    }

    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        self.apply_security(&mut config);
        config
    }

    /// Offsets are stored only once the next record is requested, that is
    /// after the previous one was handled, and committed in the background.
    fn consumer_config(&self, topic: Topic) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", self.group_for(topic));
        config.set("enable.auto.commit", "true");
        config.set("enable.auto.offset.store", "false");
        config.set("auto.offset.reset", "earliest");
        self.apply_security(&mut config);
        config
    }

    fn apply_security(&self, config: &mut ClientConfig) {
        if let Some(ref protocol) = self.security_protocol {
            config.set("security.protocol", protocol);
        }
    }
}

/// Transport over a Kafka cluster.
pub struct KafkaTransport {
    codec: Arc<dyn MessageCodec>,
    config: KafkaTransportConfig,
    producer: FutureProducer,
    closed: AtomicBool,
}

impl KafkaTransport {
    /// Connects a producer using the framed codec.
    pub fn new(config: KafkaTransportConfig) -> Result<Self> {
        Self::with_codec(config, Arc::new(FramedCodec))
    }

    pub fn with_codec(config: KafkaTransportConfig, codec: Arc<dyn MessageCodec>) -> Result<Self> {
        let producer: FutureProducer = config
            .producer_config()
            .create()
            .map_err(|e| MessagingError::Broker(format!("failed to create Kafka producer: {e}")))?;

        tracing::info!(bootstrap_servers = %config.bootstrap_servers, "connected to Kafka");
        Ok(Self {
            codec,
            config,
            producer,
            closed: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &KafkaTransportConfig {
        &self.config
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(MessagingError::Closed);
        }
        Ok(())
    }
}

/// Where a subscription stands: the partition and offset of the record it
/// handed out last, not yet stored.
struct Cursor {
    consumer: StreamConsumer,
    handled: Option<(i32, i64)>,
}

#[async_trait]
impl Transport for KafkaTransport {
    #[tracing::instrument(skip(self, message), fields(%topic, name = %message.name, saga_id = %message.saga_id))]
    async fn publish(&self, topic: Topic, message: &SagaMessage) -> Result<()> {
        self.ensure_open()?;
        let record = self.codec.encode(message)?;
        let name = topic.to_string();
        let key = message.saga_id.to_string();

        let (partition, offset) = self
            .producer
            .send(
                FutureRecord::to(&name).key(&key).payload(record.as_ref()),
                SEND_TIMEOUT,
            )
            .await
            .map_err(|(e, _)| MessagingError::Broker(format!("failed to publish: {e}")))?;

        metrics::counter!("transport_records_published_total", "topic" => name).increment(1);
        tracing::debug!(partition, offset, "record published");
        Ok(())
    }

    async fn subscribe(&self, topic: Topic) -> Result<MessageStream> {
        self.ensure_open()?;
        let consumer: StreamConsumer = self
            .config
            .consumer_config(topic)
            .create()
            .map_err(|e| MessagingError::Broker(format!("failed to create Kafka consumer: {e}")))?;
        let name = topic.to_string();
        consumer
            .subscribe(&[name.as_str()])
            .map_err(|e| MessagingError::Broker(format!("failed to subscribe to {name}: {e}")))?;

        let codec = self.codec.clone();
        let cursor = Cursor {
            consumer,
            handled: None,
        };
        let stream = stream::unfold(cursor, move |mut cursor| {
            let codec = codec.clone();
            let name = name.clone();
            async move {
                if let Some((partition, offset)) = cursor.handled.take() {
                    if let Err(e) = cursor.consumer.store_offset(&name, partition, offset + 1) {
                        tracing::warn!(topic = %name, partition, offset, error = %e, "failed to store offset");
                    }
                }

                loop {
                    let received = match cursor.consumer.recv().await {
                        Ok(record) => {
                            let decoded = match record.payload() {
                                Some(payload) => codec.decode(payload),
                                None => Err(MessagingError::Malformed("empty record".to_string())),
                            };
                            Some((decoded, record.partition(), record.offset()))
                        }
                        Err(e) => {
                            tracing::error!(topic = %name, error = %e, "Kafka consumer error");
                            None
                        }
                    };

                    match received {
                        Some((decoded, partition, offset)) => {
                            cursor.handled = Some((partition, offset));
                            return Some((decoded, cursor));
                        }
                        None => tokio::time::sleep(RECEIVE_BACKOFF).await,
                    }
                }
            }
        });

        tracing::info!(%topic, group = %self.config.group_for(topic), "subscribed to Kafka topic");
        Ok(Box::pin(stream))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let producer = self.producer.clone();
        match tokio::task::spawn_blocking(move || producer.flush(FLUSH_TIMEOUT)).await {
            Ok(Ok(())) => tracing::info!("Kafka transport closed"),
            Ok(Err(e)) => tracing::error!(error = %e, "failed to flush Kafka producer"),
            Err(e) => tracing::error!(error = %e, "Kafka flush task failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topic::Service;

    #[test]
    fn test_group_per_topic() {
        let config = KafkaTransportConfig::new("localhost:9092");
        assert_eq!(config.group_for(Topic::ack(Service::Stock)), "checkout.stock-ack");

        let config = config.with_group_prefix("shop");
        assert_eq!(config.group_for(Topic::syn(Service::Payment)), "shop.payment-syn");
    }

    #[test]
    fn test_producer_config() {
        let config = KafkaTransportConfig::new("broker:9092").producer_config();
        assert_eq!(config.get("bootstrap.servers"), Some("broker:9092"));
        assert_eq!(config.get("acks"), Some("all"));
        assert_eq!(config.get("enable.idempotence"), Some("true"));
        assert_eq!(config.get("security.protocol"), None);
    }

    #[test]
    fn test_consumer_stores_offsets_after_handling() {
        let config = KafkaTransportConfig::new("broker:9092")
            .with_security_protocol("SASL_SSL")
            .consumer_config(Topic::ack(Service::Order));
        assert_eq!(config.get("group.id"), Some("checkout.order-ack"));
        assert_eq!(config.get("enable.auto.offset.store"), Some("false"));
        assert_eq!(config.get("auto.offset.reset"), Some("earliest"));
        assert_eq!(config.get("security.protocol"), Some("SASL_SSL"));
    }
}
