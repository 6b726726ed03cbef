//! SQLite storage backend

use super::traits::{OpenStore, ScanStore, StorageError, StorageResult, StoreCounts, StoreTx};
use crate::model::{
    Message, MessageId, MessageType, Node, NodeId, NodeUpdate, Property, PropertyId, Tag, TagId,
    Url, UrlId,
};
use chrono::{DateTime, Duration as ChronoDuration, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction, TransactionBehavior};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::warn;

/// Busy timeout used when the caller does not configure one
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// SQLite-backed scan store
///
/// One database file holds entities, edge tables and node history.
/// Thread-safe via internal mutex on the connection; each unit of work holds
/// the lock for the lifetime of its transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a store with an explicit busy timeout
    pub fn open_with_timeout(path: impl AsRef<Path>, busy_timeout: Duration) -> StorageResult<Self> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Initialize the database schema
    fn init_schema(conn: &Connection) -> StorageResult<()> {
        conn.execute_batch(
            r#"
            PRAGMA foreign_keys = ON;

            -- WAL lets readers proceed while a pass holds the write lock
            PRAGMA journal_mode = WAL;

            CREATE TABLE IF NOT EXISTS properties (
                property_id INTEGER PRIMARY KEY AUTOINCREMENT,
                property_name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS urls (
                url_id INTEGER PRIMARY KEY AUTOINCREMENT,
                url TEXT NOT NULL,
                url_property_id INTEGER NOT NULL REFERENCES properties(property_id),
                UNIQUE (url, url_property_id)
            );

            CREATE TABLE IF NOT EXISTS messages (
                message_id INTEGER PRIMARY KEY AUTOINCREMENT,
                message TEXT NOT NULL,
                message_type TEXT NOT NULL
                    CHECK (message_type IN ('violation', 'pass', 'error')),
                UNIQUE (message, message_type)
            );

            CREATE TABLE IF NOT EXISTS tags (
                tag_id INTEGER PRIMARY KEY AUTOINCREMENT,
                tag TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS nodes (
                node_id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_html TEXT NOT NULL UNIQUE,
                node_targets TEXT NOT NULL,
                node_equalified INTEGER NOT NULL DEFAULT 0
            );

            -- Append-only; update_id gives the per-node order
            CREATE TABLE IF NOT EXISTS node_updates (
                update_id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL REFERENCES nodes(node_id),
                node_equalified INTEGER NOT NULL,
                update_date TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_node_updates_node
                ON node_updates(node_id, update_id);

            CREATE TABLE IF NOT EXISTS message_nodes (
                message_id INTEGER NOT NULL REFERENCES messages(message_id),
                node_id INTEGER NOT NULL REFERENCES nodes(node_id),
                PRIMARY KEY (message_id, node_id)
            );
            CREATE INDEX IF NOT EXISTS idx_message_nodes_node ON message_nodes(node_id);

            CREATE TABLE IF NOT EXISTS message_tags (
                message_id INTEGER NOT NULL REFERENCES messages(message_id),
                tag_id INTEGER NOT NULL REFERENCES tags(tag_id),
                PRIMARY KEY (message_id, tag_id)
            );
            CREATE INDEX IF NOT EXISTS idx_message_tags_tag ON message_tags(tag_id);

            CREATE TABLE IF NOT EXISTS message_urls (
                message_id INTEGER NOT NULL REFERENCES messages(message_id),
                url_id INTEGER NOT NULL REFERENCES urls(url_id),
                PRIMARY KEY (message_id, url_id)
            );

            CREATE TABLE IF NOT EXISTS node_urls (
                node_id INTEGER NOT NULL REFERENCES nodes(node_id),
                url_id INTEGER NOT NULL REFERENCES urls(url_id),
                PRIMARY KEY (node_id, url_id)
            );
            CREATE INDEX IF NOT EXISTS idx_node_urls_url ON node_urls(url_id);

            CREATE TABLE IF NOT EXISTS message_properties (
                message_id INTEGER NOT NULL REFERENCES messages(message_id),
                property_id INTEGER NOT NULL REFERENCES properties(property_id),
                PRIMARY KEY (message_id, property_id)
            );
            "#,
        )?;

        Ok(())
    }

    fn lock(&self) -> StorageResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("connection mutex poisoned".to_string()))
    }

    /// Row counts of every table, read outside any unit of work
    pub fn counts(&self) -> StorageResult<StoreCounts> {
        let conn = self.lock()?;
        let count = |table: &str| -> StorageResult<usize> {
            let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
            Ok(n as usize)
        };

        Ok(StoreCounts {
            properties: count("properties")?,
            urls: count("urls")?,
            messages: count("messages")?,
            tags: count("tags")?,
            nodes: count("nodes")?,
            node_updates: count("node_updates")?,
            message_nodes: count("message_nodes")?,
            message_tags: count("message_tags")?,
            message_urls: count("message_urls")?,
            node_urls: count("node_urls")?,
            message_properties: count("message_properties")?,
        })
    }
}

impl OpenStore for SqliteStore {
    fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_timeout(path, DEFAULT_BUSY_TIMEOUT)
    }

    fn open_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl ScanStore for SqliteStore {
    fn atomically<T, E, F>(&self, work: F) -> Result<T, E>
    where
        F: FnOnce(&dyn StoreTx) -> Result<T, E>,
        E: From<StorageError>,
    {
        let mut conn = self.lock()?;
        // IMMEDIATE takes the write lock up front so two passes cannot both
        // read stale edge sets and then collide on commit.
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StorageError::from)?;
        let scope = SqliteTx { tx };

        match work(&scope) {
            Ok(value) => {
                scope.tx.commit().map_err(StorageError::from)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = scope.tx.rollback() {
                    warn!(error = %rollback_err, "rollback failed; dropping transaction");
                }
                Err(err)
            }
        }
    }
}

/// One open transaction on a [`SqliteStore`]
struct SqliteTx<'conn> {
    tx: Transaction<'conn>,
}

fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::DateParse(format!("{raw}: {e}")))
}

impl SqliteTx<'_> {
    fn id_set<T: Ord>(
        &self,
        sql: &str,
        key: i64,
        wrap: impl Fn(i64) -> T,
    ) -> StorageResult<BTreeSet<T>> {
        let mut stmt = self.tx.prepare_cached(sql)?;
        let ids = stmt
            .query_map(params![key], |row| row.get::<_, i64>(0))?
            .map(|r| r.map(&wrap))
            .collect::<Result<BTreeSet<_>, _>>()?;
        Ok(ids)
    }

    fn count(&self, sql: &str, key: i64) -> StorageResult<usize> {
        let n: i64 = self.tx.query_row(sql, params![key], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn write(&self, sql: &str, a: i64, b: i64) -> StorageResult<bool> {
        let rows = self.tx.prepare_cached(sql)?.execute(params![a, b])?;
        Ok(rows > 0)
    }
}

impl StoreTx for SqliteTx<'_> {
    // === Properties ===

    fn create_property(&self, name: &str) -> StorageResult<PropertyId> {
        self.tx.execute(
            "INSERT INTO properties (property_name) VALUES (?1)",
            params![name],
        )?;
        Ok(PropertyId::from_raw(self.tx.last_insert_rowid()))
    }

    fn property_exists(&self, id: PropertyId) -> StorageResult<bool> {
        Ok(self.count("SELECT COUNT(*) FROM properties WHERE property_id = ?1", id.get())? > 0)
    }

    fn list_properties(&self) -> StorageResult<Vec<Property>> {
        let mut stmt = self
            .tx
            .prepare("SELECT property_id, property_name FROM properties ORDER BY property_id")?;
        let properties = stmt
            .query_map([], |row| {
                Ok(Property {
                    id: PropertyId::from_raw(row.get(0)?),
                    name: row.get(1)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(properties)
    }

    // === Entities ===

    fn find_message(&self, text: &str, message_type: MessageType) -> StorageResult<Option<MessageId>> {
        let id = self
            .tx
            .prepare_cached("SELECT message_id FROM messages WHERE message = ?1 AND message_type = ?2")?
            .query_row(params![text, message_type.as_str()], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(MessageId::from_raw))
    }

    fn insert_message(&self, text: &str, message_type: MessageType) -> StorageResult<MessageId> {
        self.tx
            .prepare_cached("INSERT INTO messages (message, message_type) VALUES (?1, ?2)")?
            .execute(params![text, message_type.as_str()])?;
        Ok(MessageId::from_raw(self.tx.last_insert_rowid()))
    }

    fn find_tag(&self, text: &str) -> StorageResult<Option<TagId>> {
        let id = self
            .tx
            .prepare_cached("SELECT tag_id FROM tags WHERE tag = ?1")?
            .query_row(params![text], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(TagId::from_raw))
    }

    fn insert_tag(&self, text: &str) -> StorageResult<TagId> {
        self.tx
            .prepare_cached("INSERT INTO tags (tag) VALUES (?1)")?
            .execute(params![text])?;
        Ok(TagId::from_raw(self.tx.last_insert_rowid()))
    }

    fn find_node(&self, html: &str) -> StorageResult<Option<NodeId>> {
        let id = self
            .tx
            .prepare_cached("SELECT node_id FROM nodes WHERE node_html = ?1")?
            .query_row(params![html], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(NodeId::from_raw))
    }

    fn insert_node(&self, html: &str, targets: &[String]) -> StorageResult<NodeId> {
        let targets_json = serde_json::to_string(targets)?;
        self.tx
            .prepare_cached(
                "INSERT INTO nodes (node_html, node_targets, node_equalified) VALUES (?1, ?2, 0)",
            )?
            .execute(params![html, targets_json])?;
        Ok(NodeId::from_raw(self.tx.last_insert_rowid()))
    }

    fn find_url(&self, url: &str, property: PropertyId) -> StorageResult<Option<UrlId>> {
        let id = self
            .tx
            .prepare_cached("SELECT url_id FROM urls WHERE url = ?1 AND url_property_id = ?2")?
            .query_row(params![url, property.get()], |row| row.get::<_, i64>(0))
            .optional()?;
        Ok(id.map(UrlId::from_raw))
    }

    fn insert_url(&self, url: &str, property: PropertyId) -> StorageResult<UrlId> {
        self.tx
            .prepare_cached("INSERT INTO urls (url, url_property_id) VALUES (?1, ?2)")?
            .execute(params![url, property.get()])?;
        Ok(UrlId::from_raw(self.tx.last_insert_rowid()))
    }

    fn load_node(&self, id: NodeId) -> StorageResult<Option<Node>> {
        let row: Option<(String, String, bool)> = self
            .tx
            .query_row(
                "SELECT node_html, node_targets, node_equalified FROM nodes WHERE node_id = ?1",
                params![id.get()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        match row {
            Some((html, targets_json, equalified)) => Ok(Some(Node {
                id,
                html,
                targets: serde_json::from_str(&targets_json)?,
                equalified,
            })),
            None => Ok(None),
        }
    }

    fn load_tag(&self, id: TagId) -> StorageResult<Option<Tag>> {
        let text: Option<String> = self
            .tx
            .query_row("SELECT tag FROM tags WHERE tag_id = ?1", params![id.get()], |row| row.get(0))
            .optional()?;
        Ok(text.map(|text| Tag { id, text }))
    }

    fn load_message(&self, id: MessageId) -> StorageResult<Option<Message>> {
        let row: Option<(String, String)> = self
            .tx
            .query_row(
                "SELECT message, message_type FROM messages WHERE message_id = ?1",
                params![id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        match row {
            Some((text, raw_type)) => {
                let message_type = MessageType::parse(&raw_type).ok_or_else(|| {
                    StorageError::Corrupt(format!("message {id} has unknown type `{raw_type}`"))
                })?;
                Ok(Some(Message {
                    id,
                    text,
                    message_type,
                }))
            }
            None => Ok(None),
        }
    }

    fn load_url(&self, id: UrlId) -> StorageResult<Option<Url>> {
        let row: Option<(String, i64)> = self
            .tx
            .query_row(
                "SELECT url, url_property_id FROM urls WHERE url_id = ?1",
                params![id.get()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(row.map(|(url, property)| Url {
            id,
            url,
            property_id: PropertyId::from_raw(property),
        }))
    }

    // === Message edges ===

    fn message_node_ids(&self, message: MessageId) -> StorageResult<BTreeSet<NodeId>> {
        self.id_set(
            "SELECT node_id FROM message_nodes WHERE message_id = ?1",
            message.get(),
            NodeId::from_raw,
        )
    }

    fn link_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool> {
        self.write(
            "INSERT OR IGNORE INTO message_nodes (message_id, node_id) VALUES (?1, ?2)",
            message.get(),
            node.get(),
        )
    }

    fn unlink_message_node(&self, message: MessageId, node: NodeId) -> StorageResult<bool> {
        self.write(
            "DELETE FROM message_nodes WHERE message_id = ?1 AND node_id = ?2",
            message.get(),
            node.get(),
        )
    }

    fn message_tag_ids(&self, message: MessageId) -> StorageResult<BTreeSet<TagId>> {
        self.id_set(
            "SELECT tag_id FROM message_tags WHERE message_id = ?1",
            message.get(),
            TagId::from_raw,
        )
    }

    fn link_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool> {
        self.write(
            "INSERT OR IGNORE INTO message_tags (message_id, tag_id) VALUES (?1, ?2)",
            message.get(),
            tag.get(),
        )
    }

    fn unlink_message_tag(&self, message: MessageId, tag: TagId) -> StorageResult<bool> {
        self.write(
            "DELETE FROM message_tags WHERE message_id = ?1 AND tag_id = ?2",
            message.get(),
            tag.get(),
        )
    }

    // === Append-only edges ===

    fn link_message_url(&self, message: MessageId, url: UrlId) -> StorageResult<bool> {
        self.write(
            "INSERT OR IGNORE INTO message_urls (message_id, url_id) VALUES (?1, ?2)",
            message.get(),
            url.get(),
        )
    }

    fn link_message_property(&self, message: MessageId, property: PropertyId) -> StorageResult<bool> {
        self.write(
            "INSERT OR IGNORE INTO message_properties (message_id, property_id) VALUES (?1, ?2)",
            message.get(),
            property.get(),
        )
    }

    fn link_node_url(&self, node: NodeId, url: UrlId) -> StorageResult<bool> {
        self.write(
            "INSERT OR IGNORE INTO node_urls (node_id, url_id) VALUES (?1, ?2)",
            node.get(),
            url.get(),
        )
    }

    fn node_ids_for_url(&self, url: UrlId) -> StorageResult<BTreeSet<NodeId>> {
        self.id_set(
            "SELECT node_id FROM node_urls WHERE url_id = ?1",
            url.get(),
            NodeId::from_raw,
        )
    }

    // === Node status history ===

    fn latest_node_update(&self, node: NodeId) -> StorageResult<Option<NodeUpdate>> {
        let row: Option<(bool, String)> = self
            .tx
            .prepare_cached(
                "SELECT node_equalified, update_date FROM node_updates
                 WHERE node_id = ?1 ORDER BY update_id DESC LIMIT 1",
            )?
            .query_row(params![node.get()], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()?;

        match row {
            Some((equalified, date)) => Ok(Some(NodeUpdate {
                node_id: node,
                equalified,
                timestamp: parse_timestamp(&date)?,
            })),
            None => Ok(None),
        }
    }

    fn node_updates(&self, node: NodeId) -> StorageResult<Vec<NodeUpdate>> {
        let mut stmt = self.tx.prepare(
            "SELECT node_equalified, update_date FROM node_updates
             WHERE node_id = ?1 ORDER BY update_id",
        )?;
        let rows = stmt
            .query_map(params![node.get()], |row| {
                Ok((row.get::<_, bool>(0)?, row.get::<_, String>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(equalified, date)| -> StorageResult<NodeUpdate> {
                Ok(NodeUpdate {
                    node_id: node,
                    equalified,
                    timestamp: parse_timestamp(&date)?,
                })
            })
            .collect()
    }

    fn append_node_update(
        &self,
        node: NodeId,
        equalified: bool,
        at: DateTime<Utc>,
    ) -> StorageResult<NodeUpdate> {
        // Stored at microsecond precision; compare at the same precision
        let at = at.trunc_subsecs(6);
        let timestamp = match self.latest_node_update(node)? {
            Some(prev) if at <= prev.timestamp => prev.timestamp + ChronoDuration::microseconds(1),
            _ => at,
        };

        self.tx
            .prepare_cached(
                "INSERT INTO node_updates (node_id, node_equalified, update_date) VALUES (?1, ?2, ?3)",
            )?
            .execute(params![node.get(), equalified, format_timestamp(&timestamp)])?;

        Ok(NodeUpdate {
            node_id: node,
            equalified,
            timestamp,
        })
    }

    fn set_node_equalified(&self, node: NodeId, equalified: bool) -> StorageResult<()> {
        let rows = self.tx.execute(
            "UPDATE nodes SET node_equalified = ?2 WHERE node_id = ?1",
            params![node.get(), equalified],
        )?;
        if rows == 0 {
            return Err(StorageError::Corrupt(format!("node {node} does not exist")));
        }
        Ok(())
    }

    // === Orphan checks ===

    fn tag_reference_count(&self, tag: TagId) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM message_tags WHERE tag_id = ?1", tag.get())
    }

    fn node_reference_count(&self, node: NodeId) -> StorageResult<usize> {
        self.count("SELECT COUNT(*) FROM message_nodes WHERE node_id = ?1", node.get())
    }

    fn delete_tag(&self, tag: TagId) -> StorageResult<bool> {
        let rows = self
            .tx
            .execute("DELETE FROM tags WHERE tag_id = ?1", params![tag.get()])?;
        Ok(rows > 0)
    }
}
