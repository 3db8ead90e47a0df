use async_trait::async_trait;
use common::SagaId;
use sqlx::{PgPool, Row, postgres::PgRow};

use crate::{
    NewLogEntry, Result, SagaIdSequence, SagaLogEntry, SagaLogError, SagaRecord,
    store::SagaLogStore,
};

const SAGA_FK_CONSTRAINT: &str = "messages_saga_id_fkey";

/// PostgreSQL-backed saga log partition.
#[derive(Clone)]
pub struct PostgresSagaLog {
    pool: PgPool,
    sequence: SagaIdSequence,
}

impl PostgresSagaLog {
    /// Creates an unpartitioned saga log.
    pub fn new(pool: PgPool) -> Self {
        Self::with_sequence(pool, SagaIdSequence::single())
    }

    /// Creates the log for one partition; `sequence` decides which saga ids
    /// it allocates.
    pub fn with_sequence(pool: PgPool, sequence: SagaIdSequence) -> Self {
        Self { pool, sequence }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the schema migrations and creates this partition's id sequence.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        self.ensure_id_sequence().await
    }

    /// Creates the saga id sequence if it does not exist yet. An existing
    /// sequence is left untouched so restarts keep allocating fresh ids.
    pub async fn ensure_id_sequence(&self) -> Result<()> {
        // DDL takes no bind parameters; both values are integers.
        let ddl = format!(
            "CREATE SEQUENCE IF NOT EXISTS saga_id_seq START WITH {} INCREMENT BY {} MINVALUE 1",
            self.sequence.start(),
            self.sequence.step()
        );
        sqlx::query(&ddl).execute(&self.pool).await?;
        Ok(())
    }

    fn row_to_entry(row: PgRow) -> Result<SagaLogEntry> {
        Ok(SagaLogEntry {
            id: row.try_get("id")?,
            saga_id: SagaId::new(row.try_get("saga_id")?),
            message_type: row.try_get("message_type")?,
            message_event: row.try_get("message_event")?,
            payload: row.try_get("saga_contents")?,
            timestamp: row.try_get("timestamp")?,
        })
    }
}

#[async_trait]
impl SagaLogStore for PostgresSagaLog {
    async fn create_saga(&self) -> Result<SagaRecord> {
        let row = sqlx::query(
            r#"
            INSERT INTO sagas (id)
            VALUES (nextval('saga_id_seq'))
            RETURNING id, created_at
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(SagaRecord {
            id: SagaId::new(row.try_get("id")?),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn append(&self, entry: NewLogEntry) -> Result<SagaLogEntry> {
        let saga_id = entry.saga_id;
        let row = sqlx::query(
            r#"
            INSERT INTO messages (saga_id, message_type, message_event, saga_contents)
            VALUES ($1, $2, $3, $4)
            RETURNING id, saga_id, message_type, message_event, saga_contents, timestamp
            "#,
        )
        .bind(saga_id.as_i64())
        .bind(entry.message_type)
        .bind(entry.message_event)
        .bind(&entry.payload)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some(SAGA_FK_CONSTRAINT)
            {
                return SagaLogError::SagaNotFound(saga_id);
            }
            SagaLogError::Database(e)
        })?;

        Self::row_to_entry(row)
    }

    async fn latest_entry(&self, saga_id: SagaId) -> Result<Option<SagaLogEntry>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT id, saga_id, message_type, message_event, saga_contents, timestamp
            FROM messages
            WHERE saga_id = $1
            ORDER BY timestamp DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(saga_id.as_i64())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_entry).transpose()
    }

    async fn entries(&self, saga_id: SagaId) -> Result<Vec<SagaLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, saga_id, message_type, message_event, saga_contents, timestamp
            FROM messages
            WHERE saga_id = $1
            ORDER BY timestamp ASC, id ASC
            "#,
        )
        .bind(saga_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }

    async fn latest_entries(&self) -> Result<Vec<SagaLogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT ON (saga_id)
                id, saga_id, message_type, message_event, saga_contents, timestamp
            FROM messages
            ORDER BY saga_id ASC, timestamp DESC, id DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_entry).collect()
    }
}
