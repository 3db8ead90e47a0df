//! Topic listeners: one task per subscribed topic, each feeding decoded
//! messages to a [`MessageHandler`] and publishing its reply.

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::message::SagaMessage;
use crate::topic::Topic;
use crate::transport::Transport;

/// What a handler wants sent after processing a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub message: SagaMessage,
    /// `None` for a terminal message, which is never forwarded.
    pub topic: Option<Topic>,
}

impl Reply {
    /// A reply published to `topic`.
    pub fn to(topic: Topic, message: SagaMessage) -> Self {
        Self {
            message,
            topic: Some(topic),
        }
    }

    /// A terminal reply that stays local.
    pub fn terminal(message: SagaMessage) -> Self {
        Self {
            message,
            topic: None,
        }
    }
}

/// Consumer of saga messages.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message; `None` means nothing to send.
    async fn handle(&self, message: SagaMessage) -> Option<Reply>;
}

#[async_trait]
impl<H: MessageHandler + ?Sized> MessageHandler for Arc<H> {
    async fn handle(&self, message: SagaMessage) -> Option<Reply> {
        (**self).handle(message).await
    }
}

/// A set of running topic listeners sharing one shutdown signal.
pub struct ListenerGroup {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl ListenerGroup {
    /// Subscribes to every topic and spawns one listener task per topic.
    ///
    /// Subscriptions are established before this returns, so nothing
    /// published afterwards is missed.
    pub async fn spawn<T, H>(transport: Arc<T>, topics: &[Topic], handler: Arc<H>) -> Result<Self>
    where
        T: Transport + ?Sized + 'static,
        H: MessageHandler + ?Sized + 'static,
    {
        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::with_capacity(topics.len());

        for &topic in topics {
            let mut stream = transport.subscribe(topic).await?;
            let mut stop = shutdown.subscribe();
            let transport = transport.clone();
            let handler = handler.clone();

            tasks.push(tokio::spawn(async move {
                tracing::info!(%topic, "listener started");
                loop {
                    let next = tokio::select! {
                        _ = stop.changed() => break,
                        next = stream.next() => next,
                    };
                    let message = match next {
                        Some(Ok(message)) => message,
                        Some(Err(e)) => {
                            metrics::counter!("listener_decode_errors_total", "topic" => topic.to_string())
                                .increment(1);
                            tracing::warn!(%topic, error = %e, "dropping undecodable record");
                            continue;
                        }
                        None => break,
                    };

                    let Some(reply) = handler.handle(message).await else {
                        continue;
                    };
                    let Some(destination) = reply.topic else {
                        continue;
                    };
                    if let Err(e) = transport.publish(destination, &reply.message).await {
                        tracing::error!(%topic, %destination, error = %e, "failed to publish reply");
                    }
                }
                tracing::info!(%topic, "listener stopped");
            }));
        }

        Ok(Self { shutdown, tasks })
    }

    /// Number of running listener tasks.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Stops every listener and waits for the tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for result in futures_util::future::join_all(self.tasks).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "listener task failed");
            }
        }
    }
}
