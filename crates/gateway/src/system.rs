//! Process wiring: transport, saga log, orchestrator and participants.

use std::sync::Arc;

use messaging::{InMemoryTransport, ListenerGroup, Service, Topic, Transport};
use saga::{
    CompletionNotifier, HttpReleaseNotifier, OrderService, Orchestrator, Participant,
    PaymentService, Recovery, RoutingTables, StockService,
};
use saga_log::{SagaLogStore, ShardedSagaLog};

use crate::bridge::GatewayBridge;
use crate::config::Config;
use crate::error::Result;

/// The saga log as the gateway sees it, whatever its partitions are.
pub type SagaLog = Arc<dyn SagaLogStore>;

const DATABASE_POOL_SIZE: u32 = 10;

/// Opens the saga log: PostgreSQL partitions when database URLs are
/// configured, in-memory partitions otherwise.
pub async fn open_saga_log(config: &Config) -> Result<SagaLog> {
    if config.saga_log_database_urls.is_empty() {
        tracing::info!(partitions = config.shards.saga_log, "using in-memory saga log");
        return Ok(Arc::new(ShardedSagaLog::in_memory(config.shards.saga_log)?));
    }

    let log = ShardedSagaLog::connect(&config.saga_log_database_urls, DATABASE_POOL_SIZE).await?;
    log.run_migrations().await?;
    tracing::info!(partitions = log.partition_count(), "using PostgreSQL saga log");
    Ok(Arc::new(log))
}

/// Opens the message transport: Kafka when bootstrap servers are
/// configured, in-process otherwise.
pub fn open_transport(config: &Config) -> Result<Arc<dyn Transport>> {
    match &config.kafka_bootstrap_servers {
        None => {
            tracing::info!("using in-process transport");
            Ok(Arc::new(InMemoryTransport::new()))
        }
        #[cfg(feature = "kafka")]
        Some(servers) => {
            let kafka = messaging::KafkaTransport::new(
                messaging::KafkaTransportConfig::new(servers.as_str())
                    .with_group_prefix(config.kafka_group_prefix.as_str()),
            )?;
            tracing::info!(%servers, "using Kafka transport");
            Ok(Arc::new(kafka))
        }
        #[cfg(not(feature = "kafka"))]
        Some(_) => Err(crate::error::GatewayError::Unsupported(
            "KAFKA_BOOTSTRAP_SERVERS is set but the gateway was built without the kafka feature"
                .to_string(),
        )),
    }
}

/// Everything behind the HTTP boundary, running.
pub struct CheckoutSystem {
    pub transport: Arc<dyn Transport>,
    pub orchestrator: Arc<Orchestrator<SagaLog>>,
    pub stock: Arc<StockService>,
    pub payment: Arc<PaymentService>,
    pub orders: Arc<OrderService>,
    listeners: Vec<ListenerGroup>,
}

impl CheckoutSystem {
    /// Opens the configured saga log and starts the system on it.
    pub async fn start(config: &Config, bridge: Arc<GatewayBridge>) -> Result<Self> {
        let log = open_saga_log(config).await?;
        Self::with_log(config, log, bridge).await
    }

    /// Opens the configured transport, starts every listener, then resumes
    /// sagas left unfinished in `log`.
    ///
    /// Terminal outcomes go to `bridge`, or to the configured release
    /// callback when there is one.
    #[tracing::instrument(skip_all)]
    pub async fn with_log(config: &Config, log: SagaLog, bridge: Arc<GatewayBridge>) -> Result<Self> {
        let transport = open_transport(config)?;

        let notifier: Arc<dyn CompletionNotifier> = match &config.release_callback_url {
            Some(url) => {
                tracing::info!(%url, "releasing checkouts through HTTP callback");
                Arc::new(HttpReleaseNotifier::new(url.as_str())?)
            }
            None => bridge,
        };
        let orchestrator = Arc::new(Orchestrator::new(log, RoutingTables::checkout(), notifier));

        let stock = Arc::new(StockService::new(config.shards.stock)?);
        let payment = Arc::new(PaymentService::new(config.shards.payment)?);
        let orders = Arc::new(OrderService::new(config.shards.order, transport.clone())?);

        let listeners = vec![
            ListenerGroup::spawn(transport.clone(), &Topic::all_ack(), orchestrator.clone()).await?,
            ListenerGroup::spawn(
                transport.clone(),
                &[Topic::syn(Service::Stock)],
                Arc::new(Participant::new(stock.clone())),
            )
            .await?,
            ListenerGroup::spawn(
                transport.clone(),
                &[Topic::syn(Service::Payment)],
                Arc::new(Participant::new(payment.clone())),
            )
            .await?,
            ListenerGroup::spawn(
                transport.clone(),
                &[Topic::syn(Service::Order)],
                Arc::new(Participant::new(orders.clone())),
            )
            .await?,
        ];

        let report = Recovery::new(orchestrator.as_ref(), transport.as_ref()).run().await?;
        if report.resent + report.redriven > 0 {
            tracing::info!(?report, "resumed interrupted sagas");
        }

        Ok(Self {
            transport,
            orchestrator,
            stock,
            payment,
            orders,
            listeners,
        })
    }

    /// Stops every listener and closes the transport.
    pub async fn shutdown(self) {
        for group in self.listeners {
            group.shutdown().await;
        }
        self.transport.close().await;
        tracing::info!("checkout system stopped");
    }
}
