// Dweve GraphStore - Property Graph Import Orchestration
//
// Copyright (c) 2025 Dweve IP B.V. and individual contributors.
//
// SPDX-License-Identifier: Apache-2.0
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License in the LICENSE file at the
// root of this repository or at: http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Lazy table creation, catalog introspection and schema snapshots.
//!
//! Every entity type lives in its own node table with a fixed layout
//! (`id`, `type`, `properties`); every `(source, relationship, target)`
//! triple lives in its own relationship table named
//! `{REL}_{Source}_{Target}`, with a digest suffix whenever a part contains
//! `_` so that distinct triples never share a table. The [`SchemaManager`] remembers which tables it
//! has created so repeated imports issue no DDL. The cache is advisory:
//! [`SchemaManager::refresh_schema`] replaces it with what the engine reports.

use crate::config::TypeConsistency;
use crate::connection::Connection;
use crate::cypher::templates::{self, CHUNK_TABLE, MENTIONS};
use crate::cypher::{relationship_label, relationship_table, table_name};
use crate::error::{ErrorKind, GraphStoreError, Result};
use crate::executor::Executor;
use crate::mapping::{EngineType, PropertyConverter};
use graphstore_core::{GraphDocument, TableKind};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;
use std::hash::Hasher;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{RwLock, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use xxhash_rust::xxh64::Xxh64;

/// Keys stored as columns rather than inside the properties map.
pub const RESERVED_NODE_KEYS: &[&str] = &["id", "type"];

const NODE_COLUMNS: &[(&str, &str)] = &[
    ("id", "STRING"),
    ("type", "STRING"),
    ("properties", "MAP(STRING, STRING)"),
];

const CHUNK_COLUMNS: &[(&str, &str)] = &[
    ("id", "STRING"),
    ("text", "STRING"),
    ("type", "STRING"),
    ("properties", "MAP(STRING, STRING)"),
];

/// One column of a node table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertyInfo {
    /// Column name.
    pub name: String,
    /// Engine type name, e.g. `STRING`.
    #[serde(rename = "type")]
    pub data_type: String,
}

impl PropertyInfo {
    /// Create a column description.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
        }
    }

    fn fixed(columns: &[(&str, &str)]) -> Vec<Self> {
        columns.iter().map(|(n, t)| Self::new(*n, *t)).collect()
    }
}

/// A node table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    /// Table name.
    pub label: String,
    /// Columns in catalog order.
    pub properties: Vec<PropertyInfo>,
}

/// A relationship table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipTypeInfo {
    /// Relationship label without the endpoint suffix.
    pub name: String,
    /// Source node table.
    pub source_type: String,
    /// Target node table.
    pub target_type: String,
    /// Physical table name.
    pub table: String,
}

/// Structured view of the engine schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    /// Node tables sorted by label.
    pub node_types: Vec<NodeTypeInfo>,
    /// Relationship tables sorted by name, then endpoints.
    pub relationship_types: Vec<RelationshipTypeInfo>,
    /// Built from the local table cache because the catalog was unreachable.
    #[serde(default)]
    pub degraded: bool,
}

impl SchemaSnapshot {
    /// Number of node and relationship tables.
    pub fn total_tables(&self) -> usize {
        self.node_types.len() + self.relationship_types.len()
    }

    /// Human-readable schema text.
    ///
    /// ```text
    /// Node properties:
    ///   Person:
    ///     - id: STRING
    ///
    /// Relationship properties:
    ///   KNOWS: Person -> Person
    ///
    /// Relationships:
    ///   (:Person)-[:KNOWS]->(:Person)
    /// ```
    pub fn describe(&self) -> String {
        let mut out = String::from("Node properties:\n");
        for node in &self.node_types {
            let _ = writeln!(out, "  {}:", node.label);
            for prop in &node.properties {
                let _ = writeln!(out, "    - {}: {}", prop.name, prop.data_type);
            }
        }

        out.push_str("\nRelationship properties:\n");
        for rel in &self.relationship_types {
            let _ = writeln!(out, "  {}: {} -> {}", rel.name, rel.source_type, rel.target_type);
        }

        out.push_str("\nRelationships:\n");
        for rel in &self.relationship_types {
            let _ = writeln!(
                out,
                "  (:{})-[:{}]->(:{})",
                rel.source_type, rel.name, rel.target_type
            );
        }
        out
    }

    /// Stable fingerprint, `v` followed by 16 hex digits.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Xxh64::new(0);
        hasher.write_u64(self.node_types.len() as u64);
        for node in &self.node_types {
            hasher.write(node.label.as_bytes());
            hasher.write_u64(node.properties.len() as u64);
            for prop in &node.properties {
                hasher.write(prop.name.as_bytes());
                hasher.write(prop.data_type.as_bytes());
            }
        }
        hasher.write_u64(self.relationship_types.len() as u64);
        for rel in &self.relationship_types {
            hasher.write(rel.name.as_bytes());
            hasher.write(rel.source_type.as_bytes());
            hasher.write(rel.target_type.as_bytes());
            hasher.write(rel.table.as_bytes());
        }
        format!("v{:016x}", hasher.finish())
    }

    fn sort(&mut self) {
        self.node_types.sort_by(|a, b| a.label.cmp(&b.label));
        self.relationship_types.sort_by(|a, b| {
            (&a.name, &a.source_type, &a.target_type).cmp(&(&b.name, &b.source_type, &b.target_type))
        });
    }
}

/// Cache key for a relationship table: the ordered endpoint triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipKey {
    /// Sanitized relationship label.
    pub rel_type: String,
    /// Sanitized source table.
    pub source: String,
    /// Sanitized target table.
    pub target: String,
}

impl RelationshipKey {
    /// Build a key from raw labels.
    pub fn new(rel_type: &str, source: &str, target: &str) -> Self {
        Self {
            rel_type: table_name(rel_type),
            source: table_name(source),
            target: table_name(target),
        }
    }

    /// Physical table name.
    pub fn table(&self) -> String {
        relationship_table(&self.rel_type, &self.source, &self.target)
    }
}

#[derive(Debug, Default)]
struct TableCache {
    node_tables: BTreeSet<String>,
    relationship_tables: BTreeSet<RelationshipKey>,
    chunk_table: bool,
    /// Entity table -> whether its mentions table could be created.
    mentions: BTreeMap<String, bool>,
}

#[derive(Debug, Clone)]
struct CachedSchema {
    snapshot: SchemaSnapshot,
    description: String,
    version: String,
}

fn schema_error(table: &str, err: GraphStoreError) -> GraphStoreError {
    match err {
        GraphStoreError::QueryExecution { message, .. } => GraphStoreError::Schema {
            table: table.to_string(),
            message,
        },
        other => other,
    }
}

/// Creates tables on demand and answers schema questions.
pub struct SchemaManager {
    connection: Arc<Connection>,
    cache: RwLock<TableCache>,
    stale: AtomicBool,
    snapshot: parking_lot::RwLock<Option<CachedSchema>>,
}

impl std::fmt::Debug for SchemaManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaManager")
            .field("stale", &self.stale.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl SchemaManager {
    /// Create a manager with an empty cache.
    pub fn new(connection: Arc<Connection>) -> Self {
        Self {
            connection,
            cache: RwLock::new(TableCache::default()),
            stale: AtomicBool::new(false),
            snapshot: parking_lot::RwLock::new(None),
        }
    }

    async fn is_cached(&self, check: impl FnOnce(&TableCache) -> bool) -> bool {
        if self.stale.load(Ordering::Acquire) {
            return false;
        }
        check(&*self.cache.read().await)
    }

    async fn lock_for_ddl(&self) -> RwLockWriteGuard<'_, TableCache> {
        let mut cache = self.cache.write().await;
        if self.stale.swap(false, Ordering::AcqRel) {
            *cache = TableCache::default();
        }
        cache
    }

    fn table_created(&self, table: &str) {
        self.snapshot.write().take();
        info!(table, "created table");
    }

    /// Make sure the node table for `label` exists.
    ///
    /// Returns true when DDL was issued.
    pub async fn ensure_node_table(&self, label: &str, exec: &mut dyn Executor) -> Result<bool> {
        self.ensure_node_table_named(&table_name(label), exec).await
    }

    /// [`ensure_node_table`](Self::ensure_node_table) for a resolved table name.
    pub(crate) async fn ensure_node_table_named(
        &self,
        table: &str,
        exec: &mut dyn Executor,
    ) -> Result<bool> {
        if self.is_cached(|c| c.node_tables.contains(table)).await {
            return Ok(false);
        }

        let mut cache = self.lock_for_ddl().await;
        if cache.node_tables.contains(table) {
            return Ok(false);
        }
        exec.execute(templates::create_node_table(table))
            .await
            .map_err(|e| schema_error(table, e))?;
        cache.node_tables.insert(table.to_string());
        drop(cache);

        self.table_created(table);
        Ok(true)
    }

    /// Make sure the relationship table for the triple exists, creating the
    /// endpoint node tables first.
    ///
    /// Returns true when DDL was issued for the relationship table.
    pub async fn ensure_relationship_table(
        &self,
        rel_type: &str,
        source_label: &str,
        target_label: &str,
        exec: &mut dyn Executor,
    ) -> Result<bool> {
        let key = RelationshipKey::new(rel_type, source_label, target_label);
        self.ensure_relationship_key(&key, exec).await
    }

    /// [`ensure_relationship_table`](Self::ensure_relationship_table) for a
    /// resolved key.
    pub(crate) async fn ensure_relationship_key(
        &self,
        key: &RelationshipKey,
        exec: &mut dyn Executor,
    ) -> Result<bool> {
        if self.is_cached(|c| c.relationship_tables.contains(key)).await {
            return Ok(false);
        }

        self.ensure_node_table_named(&key.source, exec).await?;
        self.ensure_node_table_named(&key.target, exec).await?;

        let table = key.table();
        let mut cache = self.lock_for_ddl().await;
        if cache.relationship_tables.contains(key) {
            return Ok(false);
        }
        exec.execute(templates::create_rel_table(&table, &key.source, &key.target))
            .await
            .map_err(|e| schema_error(&table, e))?;
        cache.relationship_tables.insert(key.clone());
        drop(cache);

        self.table_created(&table);
        Ok(true)
    }

    /// Make sure the chunk table exists. Failures are logged, not returned.
    pub async fn ensure_chunk_table(&self, exec: &mut dyn Executor) -> bool {
        if self.is_cached(|c| c.chunk_table).await {
            return true;
        }

        let mut cache = self.lock_for_ddl().await;
        if cache.chunk_table {
            return true;
        }
        if exec
            .execute_best_effort(templates::create_chunk_table())
            .await
            .is_none()
        {
            warn!("chunk table unavailable, source attribution skipped");
            return false;
        }
        cache.chunk_table = true;
        drop(cache);

        self.table_created(CHUNK_TABLE);
        true
    }

    /// Make sure the `MENTIONS` table from chunks to `entity_label` exists.
    ///
    /// Failure is logged and remembered; later calls for the same type return
    /// false without touching the engine until the cache is invalidated.
    pub async fn ensure_mentions_table(&self, entity_label: &str, exec: &mut dyn Executor) -> bool {
        self.ensure_mentions_table_named(&table_name(entity_label), exec)
            .await
    }

    /// [`ensure_mentions_table`](Self::ensure_mentions_table) for a resolved
    /// entity table name.
    pub(crate) async fn ensure_mentions_table_named(
        &self,
        entity: &str,
        exec: &mut dyn Executor,
    ) -> bool {
        if !self.stale.load(Ordering::Acquire) {
            if let Some(available) = self.cache.read().await.mentions.get(entity) {
                return *available;
            }
        }

        let mut cache = self.lock_for_ddl().await;
        if let Some(available) = cache.mentions.get(entity) {
            return *available;
        }
        let table = relationship_table(MENTIONS, CHUNK_TABLE, entity);
        let available = exec
            .execute_best_effort(templates::create_rel_table(&table, CHUNK_TABLE, entity))
            .await
            .is_some();
        cache.mentions.insert(entity.to_string(), available);
        drop(cache);

        if available {
            self.table_created(&table);
        } else {
            warn!(entity = %entity, "mentions table unavailable, attribution skipped for this type");
        }
        available
    }

    /// Forget every cached table and snapshot.
    pub fn invalidate_cache(&self) {
        self.stale.store(true, Ordering::Release);
        self.snapshot.write().take();
        debug!("schema cache invalidated");
    }

    /// Read the schema from the engine catalog.
    ///
    /// A table whose columns cannot be read is left out. When the catalog
    /// itself is unreachable the snapshot is built from the local cache and
    /// marked degraded. A successful read replaces the local cache.
    pub async fn introspect(&self, cancel: &CancellationToken) -> Result<SchemaSnapshot> {
        let tables = match self.connection.list_tables(cancel).await {
            Ok(tables) => tables,
            Err(e) if e.kind() == ErrorKind::Cancellation => return Err(e),
            Err(e) => {
                warn!(error = %e, "catalog unavailable, describing cached tables");
                return Ok(self.degraded_snapshot().await);
            }
        };

        let mut snapshot = SchemaSnapshot::default();
        let mut cache = TableCache::default();

        for table in tables {
            match table.kind {
                TableKind::Node => {
                    if table.name == CHUNK_TABLE {
                        cache.chunk_table = true;
                    }
                    cache.node_tables.insert(table.name.clone());

                    let columns = match self.connection.table_properties(&table.name, cancel).await {
                        Ok(columns) => columns,
                        Err(e) if e.kind() == ErrorKind::Cancellation => return Err(e),
                        Err(e) => {
                            warn!(table = %table.name, error = %e, "skipping table with unreadable columns");
                            continue;
                        }
                    };
                    snapshot.node_types.push(NodeTypeInfo {
                        label: table.name,
                        properties: columns
                            .into_iter()
                            .map(|c| PropertyInfo::new(c.name, c.data_type))
                            .collect(),
                    });
                }
                TableKind::Relationship { from, to } => {
                    let name = relationship_label(&table.name, &from, &to)
                        .unwrap_or_else(|| table.name.clone());

                    if name == MENTIONS && from == CHUNK_TABLE {
                        cache.mentions.insert(to.clone(), true);
                    } else {
                        cache.relationship_tables.insert(RelationshipKey {
                            rel_type: name.clone(),
                            source: from.clone(),
                            target: to.clone(),
                        });
                    }
                    snapshot.relationship_types.push(RelationshipTypeInfo {
                        name,
                        source_type: from,
                        target_type: to,
                        table: table.name,
                    });
                }
            }
        }
        snapshot.sort();

        let mut guard = self.cache.write().await;
        self.stale.store(false, Ordering::Release);
        *guard = cache;
        Ok(snapshot)
    }

    async fn degraded_snapshot(&self) -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot {
            degraded: true,
            ..SchemaSnapshot::default()
        };
        if self.stale.load(Ordering::Acquire) {
            return snapshot;
        }

        let cache = self.cache.read().await;
        for table in &cache.node_tables {
            if table != CHUNK_TABLE {
                snapshot.node_types.push(NodeTypeInfo {
                    label: table.clone(),
                    properties: PropertyInfo::fixed(NODE_COLUMNS),
                });
            }
        }
        if cache.chunk_table {
            snapshot.node_types.push(NodeTypeInfo {
                label: CHUNK_TABLE.to_string(),
                properties: PropertyInfo::fixed(CHUNK_COLUMNS),
            });
        }
        for key in &cache.relationship_tables {
            snapshot.relationship_types.push(RelationshipTypeInfo {
                name: key.rel_type.clone(),
                source_type: key.source.clone(),
                target_type: key.target.clone(),
                table: key.table(),
            });
        }
        for (entity, _) in cache.mentions.iter().filter(|(_, available)| **available) {
            snapshot.relationship_types.push(RelationshipTypeInfo {
                name: MENTIONS.to_string(),
                source_type: CHUNK_TABLE.to_string(),
                target_type: entity.clone(),
                table: relationship_table(MENTIONS, CHUNK_TABLE, entity),
            });
        }
        snapshot.sort();
        snapshot
    }

    /// Introspect and cache the snapshot, its description and version.
    ///
    /// Degraded snapshots are returned but not cached.
    pub async fn refresh_schema(&self, cancel: &CancellationToken) -> Result<SchemaSnapshot> {
        let snapshot = self.introspect(cancel).await?;
        if !snapshot.degraded {
            let cached = CachedSchema {
                description: snapshot.describe(),
                version: snapshot.fingerprint(),
                snapshot: snapshot.clone(),
            };
            info!(
                version = %cached.version,
                tables = snapshot.total_tables(),
                "schema refreshed"
            );
            *self.snapshot.write() = Some(cached);
        }
        Ok(snapshot)
    }

    async fn cached(&self, cancel: &CancellationToken) -> Result<CachedSchema> {
        if let Some(cached) = self.snapshot.read().clone() {
            return Ok(cached);
        }
        let snapshot = self.refresh_schema(cancel).await?;
        Ok(CachedSchema {
            description: snapshot.describe(),
            version: snapshot.fingerprint(),
            snapshot,
        })
    }

    /// Schema description, refreshing when nothing is cached.
    pub async fn schema(&self, cancel: &CancellationToken) -> Result<String> {
        self.cached(cancel).await.map(|c| c.description)
    }

    /// Structured schema, refreshing when nothing is cached.
    pub async fn structured_schema(&self, cancel: &CancellationToken) -> Result<SchemaSnapshot> {
        self.cached(cancel).await.map(|c| c.snapshot)
    }

    /// Schema fingerprint, refreshing when nothing is cached.
    pub async fn schema_version(&self, cancel: &CancellationToken) -> Result<String> {
        self.cached(cancel).await.map(|c| c.version)
    }

    /// Whether the catalog lists a table with this name (or its sanitized form).
    pub async fn table_exists(&self, name: &str, cancel: &CancellationToken) -> Result<bool> {
        let sanitized = table_name(name);
        Ok(self
            .connection
            .list_tables(cancel)
            .await?
            .iter()
            .any(|t| t.name == name || t.name == sanitized))
    }

    /// All table names in the catalog, sorted.
    pub async fn table_names(&self, cancel: &CancellationToken) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .connection
            .list_tables(cancel)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        names.sort();
        Ok(names)
    }

    /// Whether the engine schema differs from the cached snapshot.
    ///
    /// Refreshes the cache. With no snapshot cached there is nothing to
    /// compare against and the answer is `true`. A degraded read cannot be
    /// compared and is a connection error.
    pub async fn schema_changed(&self, cancel: &CancellationToken) -> Result<bool> {
        let previous = self.snapshot.read().as_ref().map(|c| c.version.clone());
        let current = self.refresh_schema(cancel).await?;
        if current.degraded {
            return Err(GraphStoreError::Connection(
                "catalog unavailable, schema cannot be compared".to_string(),
            ));
        }
        let changed = previous.map_or(true, |version| version != current.fingerprint());
        debug!(changed, "schema compared");
        Ok(changed)
    }

    /// Check that the catalog lists at least one table and that every table
    /// answers a count query. Returns the number of tables checked.
    pub async fn validate_schema(&self, cancel: &CancellationToken) -> Result<usize> {
        let tables = self.connection.list_tables(cancel).await?;
        if tables.is_empty() {
            return Err(GraphStoreError::Schema {
                table: String::new(),
                message: "no tables found in database".to_string(),
            });
        }

        let timeout = self.connection.default_timeout();
        for table in &tables {
            let statement = match table.kind {
                TableKind::Node => templates::count_nodes(&table.name),
                TableKind::Relationship { .. } => templates::count_relationships(&table.name),
            };
            self.connection
                .query_count(&statement, cancel, timeout)
                .await
                .map_err(|e| schema_error(&table.name, e))?;
        }
        info!(tables = tables.len(), "schema validated");
        Ok(tables.len())
    }

    /// Columns of one node table.
    pub async fn node_table_properties(
        &self,
        label: &str,
        cancel: &CancellationToken,
    ) -> Result<Vec<PropertyInfo>> {
        let columns = self
            .connection
            .table_properties(&table_name(label), cancel)
            .await?;
        Ok(columns
            .into_iter()
            .map(|c| PropertyInfo::new(c.name, c.data_type))
            .collect())
    }
}

/// A property key seen with two different engine types under one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyTypeConflict {
    /// Document where the second type appeared.
    pub document: usize,
    /// Node or relationship table.
    pub label: String,
    /// Property key.
    pub key: String,
    /// Type seen first.
    pub expected: EngineType,
    /// Type seen later.
    pub found: EngineType,
}

/// Property types observed per table across a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTypes {
    /// Table -> key -> first observed type.
    pub types: BTreeMap<String, BTreeMap<String, EngineType>>,
    /// Every later observation that disagreed.
    pub conflicts: Vec<PropertyTypeConflict>,
}

/// Collect property types per table across `documents`.
///
/// Under [`TypeConsistency::Strict`] the first conflict is a validation
/// error. Under [`TypeConsistency::Coerce`] conflicts are reported and the
/// values are stored as text like every other property.
pub fn infer_property_types(
    documents: &[GraphDocument],
    converter: &PropertyConverter,
    policy: TypeConsistency,
) -> Result<PropertyTypes> {
    let mut report = PropertyTypes::default();

    let observe = |report: &mut PropertyTypes,
                       document: usize,
                       label: String,
                       keys: Vec<String>,
                       types: Vec<EngineType>|
     -> Result<()> {
        let seen = report.types.entry(label.clone()).or_default();
        for (key, ty) in keys.into_iter().zip(types) {
            match seen.get(&key) {
                Some(expected) if *expected != ty => {
                    if policy == TypeConsistency::Strict {
                        return Err(GraphStoreError::Validation {
                            document,
                            message: format!(
                                "property '{}' of '{}' is {} but was {} earlier in the batch",
                                key, label, ty, expected
                            ),
                        });
                    }
                    report.conflicts.push(PropertyTypeConflict {
                        document,
                        label: label.clone(),
                        key,
                        expected: *expected,
                        found: ty,
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(key, ty);
                }
            }
        }
        Ok(())
    };

    for (index, doc) in documents.iter().enumerate() {
        for node in &doc.nodes {
            let columns = converter
                .to_property_columns(&node.properties, RESERVED_NODE_KEYS)
                .map_err(|e| GraphStoreError::conversion(format!("node '{}'", node.id), e))?;
            observe(&mut report, index, table_name(&node.node_type), columns.keys, columns.types)?;
        }
        for rel in &doc.relationships {
            let columns = converter
                .to_property_columns(&rel.properties, &[])
                .map_err(|e| GraphStoreError::conversion(rel.describe(), e))?;
            let key = RelationshipKey::new(&rel.rel_type, &rel.source.node_type, &rel.target.node_type);
            observe(&mut report, index, key.table(), columns.keys, columns.types)?;
        }
    }

    for conflict in &report.conflicts {
        warn!(
            table = %conflict.label,
            key = %conflict.key,
            expected = %conflict.expected,
            found = %conflict.found,
            "property type conflict, storing as text"
        );
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::cypher::relationship_table_name;
    use crate::executor::DirectExecutor;
    use graphstore_core::{GraphEngine, Node, Relationship, SourceDocument, Value};
    use graphstore_test::MemoryEngine;
    use std::time::Duration;

    fn setup() -> (Arc<MemoryEngine>, Arc<Connection>, SchemaManager) {
        let engine = Arc::new(MemoryEngine::new());
        let connection = Arc::new(Connection::new(
            Arc::clone(&engine) as Arc<dyn GraphEngine>,
            Duration::from_secs(5),
            RetryPolicy::none(),
        ));
        let schema = SchemaManager::new(Arc::clone(&connection));
        (engine, connection, schema)
    }

    #[tokio::test]
    async fn test_node_table_created_once() {
        let (engine, connection, schema) = setup();
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        assert!(schema.ensure_node_table("Person", &mut exec).await.unwrap());
        assert!(!schema.ensure_node_table("Person", &mut exec).await.unwrap());
        assert_eq!(engine.count_executed("CREATE NODE TABLE"), 1);
    }

    #[tokio::test]
    async fn test_relationship_table_creates_endpoints() {
        let (engine, connection, schema) = setup();
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        assert!(schema
            .ensure_relationship_table("WORKS_AT", "Person", "Company", &mut exec)
            .await
            .unwrap());
        assert!(engine.has_table("Person"));
        assert!(engine.has_table("Company"));
        assert!(engine.has_table(&relationship_table_name("WORKS_AT", "Person", "Company")));

        assert!(schema
            .ensure_relationship_table("WORKS_AT", "Person", "Person", &mut exec)
            .await
            .unwrap());
        assert_eq!(engine.count_executed("CREATE REL TABLE"), 2);
    }

    #[tokio::test]
    async fn test_ddl_failure_is_schema_error() {
        let (engine, connection, schema) = setup();
        engine.fail_matching("CREATE NODE TABLE IF NOT EXISTS Broken");
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        let err = schema.ensure_node_table("Broken", &mut exec).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Schema);
        // not cached, so a retry issues DDL again
        engine.clear_failures();
        assert!(schema.ensure_node_table("Broken", &mut exec).await.unwrap());
    }

    #[tokio::test]
    async fn test_mentions_failure_is_remembered() {
        let (engine, connection, schema) = setup();
        engine.fail_matching("MENTIONS_Chunk_Person");
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        assert!(schema.ensure_chunk_table(&mut exec).await);
        schema.ensure_node_table("Person", &mut exec).await.unwrap();
        assert!(!schema.ensure_mentions_table("Person", &mut exec).await);
        assert!(!schema.ensure_mentions_table("Person", &mut exec).await);
        assert_eq!(engine.count_executed("MENTIONS_Chunk_Person"), 1);
    }

    #[tokio::test]
    async fn test_invalidate_reissues_ddl() {
        let (engine, connection, schema) = setup();
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        schema.ensure_node_table("Person", &mut exec).await.unwrap();
        schema.invalidate_cache();
        assert!(schema.ensure_node_table("Person", &mut exec).await.unwrap());
        assert_eq!(engine.count_executed("CREATE NODE TABLE"), 2);
    }

    #[tokio::test]
    async fn test_introspection_and_description() {
        let (_engine, connection, schema) = setup();
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());
        schema
            .ensure_relationship_table("KNOWS", "Person", "Person", &mut exec)
            .await
            .unwrap();

        let snapshot = schema.refresh_schema(&CancellationToken::new()).await.unwrap();
        assert!(!snapshot.degraded);
        assert_eq!(snapshot.node_types.len(), 1);
        assert_eq!(snapshot.relationship_types[0].name, "KNOWS");
        assert_eq!(snapshot.relationship_types[0].table, "KNOWS_Person_Person");

        let text = schema.schema(&CancellationToken::new()).await.unwrap();
        assert!(text.starts_with("Node properties:\n  Person:\n    - id: STRING\n"));
        assert!(text.contains("\nRelationship properties:\n  KNOWS: Person -> Person\n"));
        assert!(text.ends_with("\nRelationships:\n  (:Person)-[:KNOWS]->(:Person)\n"));
    }

    #[tokio::test]
    async fn test_version_tracks_schema() {
        let (_engine, connection, schema) = setup();
        let cancel = CancellationToken::new();
        let mut exec = DirectExecutor::new(&connection, cancel.clone());

        schema.ensure_node_table("Person", &mut exec).await.unwrap();
        let v1 = schema.schema_version(&cancel).await.unwrap();
        assert_eq!(v1, schema.schema_version(&cancel).await.unwrap());
        assert_eq!(v1.len(), 17);

        schema.ensure_node_table("Company", &mut exec).await.unwrap();
        let v2 = schema.schema_version(&cancel).await.unwrap();
        assert_ne!(v1, v2);
    }

    #[tokio::test]
    async fn test_degraded_snapshot_from_cache() {
        let (engine, connection, schema) = setup();
        let cancel = CancellationToken::new();
        let mut exec = DirectExecutor::new(&connection, cancel.clone());
        schema
            .ensure_relationship_table("KNOWS", "Person", "Person", &mut exec)
            .await
            .unwrap();

        engine.fail_catalog(true);
        let snapshot = schema.refresh_schema(&cancel).await.unwrap();
        assert!(snapshot.degraded);
        assert_eq!(snapshot.node_types[0].label, "Person");
        assert_eq!(snapshot.node_types[0].properties.len(), 3);
        assert_eq!(snapshot.relationship_types[0].table, "KNOWS_Person_Person");
    }

    #[tokio::test]
    async fn test_table_lookup_helpers() {
        let (_engine, connection, schema) = setup();
        let cancel = CancellationToken::new();
        let mut exec = DirectExecutor::new(&connection, cancel.clone());
        schema.ensure_node_table("Person", &mut exec).await.unwrap();

        assert!(schema.table_exists("Person", &cancel).await.unwrap());
        assert!(!schema.table_exists("Company", &cancel).await.unwrap());
        assert_eq!(schema.table_names(&cancel).await.unwrap(), vec!["Person"]);
        let columns = schema.node_table_properties("Person", &cancel).await.unwrap();
        assert_eq!(columns[2], PropertyInfo::new("properties", "MAP(STRING, STRING)"));
    }

    #[tokio::test]
    async fn test_schema_changed_tracks_new_tables() {
        let (_engine, connection, schema) = setup();
        let cancel = CancellationToken::new();
        let mut exec = DirectExecutor::new(&connection, cancel.clone());
        schema.ensure_node_table("Person", &mut exec).await.unwrap();

        assert!(schema.schema_changed(&cancel).await.unwrap());
        assert!(!schema.schema_changed(&cancel).await.unwrap());

        schema.ensure_node_table("Company", &mut exec).await.unwrap();
        assert!(schema.schema_changed(&cancel).await.unwrap());
        assert!(!schema.schema_changed(&cancel).await.unwrap());
    }

    #[tokio::test]
    async fn test_schema_changed_needs_catalog() {
        let (engine, _connection, schema) = setup();
        let cancel = CancellationToken::new();
        schema.refresh_schema(&cancel).await.unwrap();

        engine.fail_catalog(true);
        let err = schema.schema_changed(&cancel).await.unwrap_err();
        assert!(matches!(err, GraphStoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_validate_schema_counts_every_table() {
        let (engine, connection, schema) = setup();
        let cancel = CancellationToken::new();

        let err = schema.validate_schema(&cancel).await.unwrap_err();
        assert!(err.to_string().contains("no tables"));

        let mut exec = DirectExecutor::new(&connection, cancel.clone());
        schema
            .ensure_relationship_table("KNOWS", "Person", "Person", &mut exec)
            .await
            .unwrap();
        drop(exec);

        assert_eq!(schema.validate_schema(&cancel).await.unwrap(), 2);
        assert_eq!(engine.count_executed("MATCH (n:Person) RETURN count(n)"), 1);
        assert_eq!(
            engine.count_executed("MATCH ()-[r:KNOWS_Person_Person]->() RETURN count(r)"),
            1
        );
    }

    #[tokio::test]
    async fn test_validate_schema_names_failing_table() {
        let (engine, connection, schema) = setup();
        let cancel = CancellationToken::new();
        let mut exec = DirectExecutor::new(&connection, cancel.clone());
        schema.ensure_node_table("Person", &mut exec).await.unwrap();
        drop(exec);

        engine.fail_matching("MATCH (n:Person) RETURN count(n)");
        match schema.validate_schema(&cancel).await.unwrap_err() {
            GraphStoreError::Schema { table, .. } => assert_eq!(table, "Person"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relationship_key_table_name() {
        let key = RelationshipKey::new("KNOWS", "Person", "Person");
        assert_eq!(key.table(), "KNOWS_Person_Person");

        let spaced = RelationshipKey::new("WORKS AT", "Person", "Company");
        assert_eq!(spaced.rel_type, table_name("WORKS AT"));
        assert_eq!(spaced.table(), relationship_table_name("WORKS AT", "Person", "Company"));
    }

    #[tokio::test]
    async fn test_overlapping_triples_get_their_own_tables() {
        let (engine, connection, schema) = setup();
        let mut exec = DirectExecutor::new(&connection, CancellationToken::new());

        assert!(schema
            .ensure_relationship_table("R", "X_Y", "Z", &mut exec)
            .await
            .unwrap());
        assert!(schema
            .ensure_relationship_table("R_X", "Y", "Z", &mut exec)
            .await
            .unwrap());
        assert_eq!(engine.count_executed("CREATE REL TABLE"), 2);

        let snapshot = schema.refresh_schema(&CancellationToken::new()).await.unwrap();
        let mut triples: Vec<_> = snapshot
            .relationship_types
            .iter()
            .map(|r| (r.name.as_str(), r.source_type.as_str(), r.target_type.as_str()))
            .collect();
        triples.sort();
        assert_eq!(triples, vec![("R", "X_Y", "Z"), ("R_X", "Y", "Z")]);
    }

    fn doc_with_age(age: Value) -> GraphDocument {
        GraphDocument::new(SourceDocument::new("")).with_node(
            Node::new("a", "Person").with_property("age", age),
        )
    }

    #[test]
    fn test_property_type_conflicts() {
        let docs = vec![doc_with_age(Value::from(30i64)), doc_with_age(Value::from("thirty"))];
        let converter = PropertyConverter::default();

        let report = infer_property_types(&docs, &converter, TypeConsistency::Coerce).unwrap();
        assert_eq!(report.conflicts.len(), 1);
        assert_eq!(report.conflicts[0].expected, EngineType::Int64);
        assert_eq!(report.conflicts[0].found, EngineType::String);

        let err = infer_property_types(&docs, &converter, TypeConsistency::Strict).unwrap_err();
        match err {
            GraphStoreError::Validation { document, message } => {
                assert_eq!(document, 1);
                assert!(message.contains("'age'"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_relationship_properties_grouped_by_triple() {
        let alice = Node::new("alice", "Person");
        let acme = Node::new("acme", "Company");
        let doc = GraphDocument::new(SourceDocument::new(""))
            .with_relationship(
                Relationship::new(alice.clone(), "LIKES", alice.clone()).with_property("w", 1i64),
            )
            .with_relationship(Relationship::new(alice, "LIKES", acme).with_property("w", "high"));

        let report =
            infer_property_types(&[doc], &PropertyConverter::default(), TypeConsistency::Strict)
                .unwrap();
        assert!(report.conflicts.is_empty());
        assert_eq!(report.types.len(), 2);
    }
}
