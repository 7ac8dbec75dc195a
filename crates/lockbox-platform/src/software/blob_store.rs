// SPDX-License-Identifier: MIT OR Apache-2.0
//
// Software protected blob stores.
//
// `MemoryBlobStore` keeps records in process memory for tests and
// short-lived processes; `SqliteBlobStore` persists them in a SQLite
// database with upsert semantics.
//
// Schema:
//   protected_blobs(
//     service    TEXT NOT NULL,    -- vault namespace
//     account    TEXT NOT NULL,    -- record key within the namespace
//     payload    BLOB NOT NULL,    -- opaque bytes (ciphertext or plaintext)
//     policy     TEXT NOT NULL,    -- access-control tag recorded at put
//     created_at TEXT NOT NULL,    -- RFC 3339
//     updated_at TEXT NOT NULL,    -- RFC 3339
//     PRIMARY KEY (service, account)
//   )

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use lockbox_core::{AccessPolicy, Result, StoreError};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, instrument};

use crate::traits::ProtectedBlobStore;

/// Convert a `rusqlite::Error` into a write failure.
fn write_err(e: rusqlite::Error) -> StoreError {
    StoreError::StoreWriteFailed(e.to_string())
}

/// Convert a read-side `rusqlite::Error`.  The taxonomy has no store-read
/// member, so the detail string names the blob read to keep diagnostics
/// pointed at this store.
fn read_err(e: rusqlite::Error) -> StoreError {
    StoreError::KeyRetrievalFailed(format!("blob read failed: {e}"))
}

/// Stable tag for the access-control column.
fn policy_tag(policy: AccessPolicy) -> &'static str {
    match policy {
        AccessPolicy::None => "none",
        AccessPolicy::Presence => "presence",
        AccessPolicy::BiometryCurrentSet => "biometry-current-set",
        AccessPolicy::BiometryWithFallback => "biometry-with-fallback",
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

struct MemoryRecord {
    payload: Vec<u8>,
    policy: AccessPolicy,
}

/// Volatile [`ProtectedBlobStore`] backed by a hash map.
pub struct MemoryBlobStore {
    records: tokio::sync::Mutex<HashMap<(String, String), MemoryRecord>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self {
            records: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Access policy recorded for a record, if one exists.  The store does
    /// not enforce the policy itself; it is kept for inspection the same way
    /// the durable store persists it.
    pub async fn policy_of(&self, service: &str, account: &str) -> Option<AccessPolicy> {
        let records = self.records.lock().await;
        records
            .get(&(service.to_owned(), account.to_owned()))
            .map(|record| record.policy)
    }
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProtectedBlobStore for MemoryBlobStore {
    async fn put(
        &self,
        service: &str,
        account: &str,
        bytes: &[u8],
        policy: AccessPolicy,
    ) -> Result<()> {
        let mut records = self.records.lock().await;
        records.insert(
            (service.to_owned(), account.to_owned()),
            MemoryRecord {
                payload: bytes.to_vec(),
                policy,
            },
        );
        Ok(())
    }

    async fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>> {
        let records = self.records.lock().await;
        Ok(records
            .get(&(service.to_owned(), account.to_owned()))
            .map(|record| record.payload.clone()))
    }

    async fn contains(&self, service: &str, account: &str) -> Result<bool> {
        let records = self.records.lock().await;
        Ok(records.contains_key(&(service.to_owned(), account.to_owned())))
    }

    async fn delete(&self, service: &str, account: &str) -> Result<bool> {
        let mut records = self.records.lock().await;
        Ok(records
            .remove(&(service.to_owned(), account.to_owned()))
            .is_some())
    }
}

// ---------------------------------------------------------------------------
// SQLite-backed store
// ---------------------------------------------------------------------------

/// Durable [`ProtectedBlobStore`] backed by SQLite.
///
/// For processes that want keychain-shaped storage without an OS keychain.
/// Upserts go through `ON CONFLICT` so a record can never be duplicated for
/// the same (service, account) pair.
pub struct SqliteBlobStore {
    conn: Mutex<Connection>,
}

impl SqliteBlobStore {
    /// Open (or create) the blob database at `path`.
    ///
    /// The `protected_blobs` table is created automatically if it does not
    /// already exist.  WAL mode is enabled for better concurrent-read
    /// performance.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(write_err)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")
            .map_err(write_err)?;
        Self::init(conn)
    }

    /// Open an in-memory blob database (useful for tests).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(write_err)?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS protected_blobs (
                service    TEXT NOT NULL,
                account    TEXT NOT NULL,
                payload    BLOB NOT NULL,
                policy     TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (service, account)
            );",
        )
        .map_err(write_err)?;

        debug!("blob store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        // Poisoning only happens if a previous holder panicked; propagating
        // the inner guard keeps the store usable.
        match self.conn.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl ProtectedBlobStore for SqliteBlobStore {
    #[instrument(skip(self, bytes), fields(%service, %account, payload_len = bytes.len()))]
    async fn put(
        &self,
        service: &str,
        account: &str,
        bytes: &[u8],
        policy: AccessPolicy,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let conn = self.lock_conn();
        conn.execute(
            "INSERT INTO protected_blobs (service, account, payload, policy, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT (service, account) DO UPDATE SET
                 payload    = excluded.payload,
                 policy     = excluded.policy,
                 updated_at = excluded.updated_at",
            params![service, account, bytes, policy_tag(policy), now],
        )
        .map_err(write_err)?;

        debug!("record upserted");
        Ok(())
    }

    async fn get(&self, service: &str, account: &str) -> Result<Option<Vec<u8>>> {
        let conn = self.lock_conn();
        conn.query_row(
            "SELECT payload FROM protected_blobs WHERE service = ?1 AND account = ?2",
            params![service, account],
            |row| row.get(0),
        )
        .optional()
        .map_err(read_err)
    }

    async fn contains(&self, service: &str, account: &str) -> Result<bool> {
        let conn = self.lock_conn();
        conn.query_row(
            "SELECT 1 FROM protected_blobs WHERE service = ?1 AND account = ?2",
            params![service, account],
            |_| Ok(()),
        )
        .optional()
        .map(|row| row.is_some())
        .map_err(read_err)
    }

    #[instrument(skip(self), fields(%service, %account))]
    async fn delete(&self, service: &str, account: &str) -> Result<bool> {
        let conn = self.lock_conn();
        let affected = conn
            .execute(
                "DELETE FROM protected_blobs WHERE service = ?1 AND account = ?2",
                params![service, account],
            )
            .map_err(|e| StoreError::StoreDeleteFailed(e.to_string()))?;

        debug!(affected, "record delete");
        Ok(affected > 0)
    }
}
