//! PostgreSQL integration tests
//!
//! These tests share one PostgreSQL container. Run with:
//!
//! ```bash
//! cargo test -p saga-log --test postgres_integration
//! ```

use std::sync::Arc;

use common::{SagaId, shard_of};
use messaging::{MessageName, OrderPayload, SagaMessage};
use saga_log::{
    PostgresSagaLog, SagaIdSequence, SagaLogError, SagaLogStore, SagaLogStoreExt, ShardedSagaLog,
};
use serial_test::serial;
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    host: String,
    port: u16,
}

impl ContainerInfo {
    fn url(&self, database: &str) -> String {
        format!(
            "postgres://postgres:postgres@{}:{}/{}",
            self.host, self.port, database
        )
    }
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();
            let host = container.get_host().await.unwrap().to_string();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            // One database per partition of the sharded tests.
            let admin = PgPool::connect(&format!(
                "postgres://postgres:postgres@{host}:{port}/postgres"
            ))
            .await
            .unwrap();
            for i in 0..3 {
                sqlx::query(&format!("CREATE DATABASE saga_log_{i}"))
                    .execute(&admin)
                    .await
                    .unwrap();
            }
            admin.close().await;

            Arc::new(ContainerInfo {
                container,
                host,
                port,
            })
        })
        .await
        .clone()
}

async fn connect(database: &str) -> PgPool {
    let info = get_container_info().await;
    sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.url(database))
        .await
        .unwrap()
}

/// A fresh single-partition log with cleared tables.
async fn get_test_log() -> PostgresSagaLog {
    let log = PostgresSagaLog::new(connect("postgres").await);
    log.run_migrations().await.unwrap();
    sqlx::query("TRUNCATE TABLE messages, sagas")
        .execute(log.pool())
        .await
        .unwrap();
    log
}

fn message(name: MessageName, saga_id: SagaId) -> SagaMessage {
    SagaMessage::new(
        name,
        saga_id,
        OrderPayload {
            order_id: "order-1".into(),
            user_id: "user-1".into(),
            items: vec!["item_a".into(), "item_b".into()],
            total_cost: 20,
            paid: false,
        },
    )
}

#[tokio::test]
#[serial]
async fn migrations_seed_vocabulary() {
    let log = get_test_log().await;

    let types: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_types")
        .fetch_one(log.pool())
        .await
        .unwrap();
    let events: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM message_events")
        .fetch_one(log.pool())
        .await
        .unwrap();
    assert_eq!(types, 3);
    assert_eq!(events, 7);

    // Idempotent on restart.
    log.run_migrations().await.unwrap();
}

#[tokio::test]
#[serial]
async fn append_and_read_back_entries() {
    let log = get_test_log().await;
    let saga = log.create_saga().await.unwrap().id;

    log.append_message(&message(MessageName::START_CHECKOUT_SAGA, saga))
        .await
        .unwrap();
    log.append_message(&message(MessageName::START_SUBTRACT_STOCK, saga))
        .await
        .unwrap();
    log.append_message(&message(MessageName::END_SUBTRACT_STOCK, saga))
        .await
        .unwrap();

    let entries = log.entries(saga).await.unwrap();
    let names: Vec<_> = entries.iter().map(|e| e.name().unwrap()).collect();
    assert_eq!(
        names,
        vec![
            MessageName::START_CHECKOUT_SAGA,
            MessageName::START_SUBTRACT_STOCK,
            MessageName::END_SUBTRACT_STOCK,
        ]
    );

    let latest = log.latest_message(saga).await.unwrap().unwrap();
    assert_eq!(latest, message(MessageName::END_SUBTRACT_STOCK, saga));
}

#[tokio::test]
#[serial]
async fn append_to_unknown_saga_fails() {
    let log = get_test_log().await;
    let result = log
        .append_message(&message(MessageName::START_CHECKOUT_SAGA, SagaId::new(424242)))
        .await;
    assert!(matches!(result, Err(SagaLogError::SagaNotFound(id)) if id == SagaId::new(424242)));
}

#[tokio::test]
#[serial]
async fn latest_entries_returns_one_row_per_saga() {
    let log = get_test_log().await;
    let a = log.create_saga().await.unwrap().id;
    let b = log.create_saga().await.unwrap().id;

    log.append_message(&message(MessageName::START_CHECKOUT_SAGA, a))
        .await
        .unwrap();
    log.append_message(&message(MessageName::START_CHECKOUT_SAGA, b))
        .await
        .unwrap();
    log.append_message(&message(MessageName::ABORT_CHECKOUT_SAGA, a))
        .await
        .unwrap();

    let latest = log.latest_entries().await.unwrap();
    assert_eq!(latest.len(), 2);
    let of_a = latest.iter().find(|e| e.saga_id == a).unwrap();
    assert_eq!(of_a.name().unwrap(), MessageName::ABORT_CHECKOUT_SAGA);
    let of_b = latest.iter().find(|e| e.saga_id == b).unwrap();
    assert_eq!(of_b.name().unwrap(), MessageName::START_CHECKOUT_SAGA);
}

#[tokio::test]
#[serial]
async fn sharded_log_allocates_ids_that_route_home() {
    let mut pools = Vec::new();
    for i in 0..3 {
        let pool = connect(&format!("saga_log_{i}")).await;
        pools.push(pool);
    }
    let log = ShardedSagaLog::postgres(pools).unwrap();
    log.run_migrations().await.unwrap();

    for n in 0..6 {
        let id = log.create_saga().await.unwrap().id;
        assert!(id.as_i64() > 0);
        let owner = log.partition_for(id);
        log.append_message(&message(MessageName::START_CHECKOUT_SAGA, id))
            .await
            .unwrap();
        assert_eq!(owner.entries(id).await.unwrap().len(), 1);
        assert_eq!(shard_of(&id, 3), n % 3);
    }
}

#[tokio::test]
#[serial]
async fn partition_sequence_starts_at_its_residue() {
    let pool = connect("postgres").await;
    sqlx::query("DROP SEQUENCE IF EXISTS saga_id_seq")
        .execute(&pool)
        .await
        .unwrap();

    let log = PostgresSagaLog::with_sequence(pool, SagaIdSequence::for_partition(1, 4));
    log.run_migrations().await.unwrap();
    sqlx::query("TRUNCATE TABLE messages, sagas")
        .execute(log.pool())
        .await
        .unwrap();

    let first = log.create_saga().await.unwrap().id;
    let second = log.create_saga().await.unwrap().id;
    assert_eq!(first, SagaId::new(5));
    assert_eq!(second, SagaId::new(9));

    // Leave the default single-partition sequence for the other tests.
    sqlx::query("DROP SEQUENCE saga_id_seq")
        .execute(log.pool())
        .await
        .unwrap();
}
