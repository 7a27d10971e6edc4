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

//! Statement templates for the fixed Kuzu table layout.
//!
//! Every node table shares one shape: `id` primary key, `type`, and a
//! `MAP(STRING, STRING)` property bag. Relationship tables carry only the
//! property bag. All writes are `MERGE`s keyed on `id`.
//!
//! Table arguments are physical table names as produced by
//! [`table_name`](super::table_name) and
//! [`relationship_table_name`](super::relationship_table_name).

use super::escape::escape_identifier;
use super::statements::{CypherStatement, StatementType};
use graphstore_core::EngineValue;
use std::collections::BTreeMap;

/// Node table holding source text for attribution.
pub const CHUNK_TABLE: &str = "Chunk";

/// Relationship label linking a chunk to the entities extracted from it.
pub const MENTIONS: &str = "MENTIONS";

/// `type` value stored on chunk nodes.
pub const CHUNK_NODE_TYPE: &str = "text_chunk";

/// Column receiving merged-row counts from relationship writes.
pub const MERGED_COLUMN: &str = "merged";

/// `CREATE NODE TABLE IF NOT EXISTS` for an entity table.
pub fn create_node_table(table: &str) -> CypherStatement {
    CypherStatement::new(
        format!(
            "CREATE NODE TABLE IF NOT EXISTS {} (id STRING, type STRING, properties MAP(STRING, STRING), PRIMARY KEY(id))",
            escape_identifier(table)
        ),
        StatementType::Schema,
    )
    .with_comment(format!("Node table {}", table))
}

/// `CREATE NODE TABLE IF NOT EXISTS` for the chunk table.
pub fn create_chunk_table() -> CypherStatement {
    CypherStatement::new(
        format!(
            "CREATE NODE TABLE IF NOT EXISTS {} (id STRING, text STRING, type STRING, properties MAP(STRING, STRING), PRIMARY KEY(id))",
            CHUNK_TABLE
        ),
        StatementType::Schema,
    )
    .with_comment("Chunk table for source attribution")
}

/// `CREATE REL TABLE IF NOT EXISTS` for one endpoint pair.
pub fn create_rel_table(table: &str, from: &str, to: &str) -> CypherStatement {
    CypherStatement::new(
        format!(
            "CREATE REL TABLE IF NOT EXISTS {} (FROM {} TO {}, properties MAP(STRING, STRING))",
            escape_identifier(table),
            escape_identifier(from),
            escape_identifier(to)
        ),
        StatementType::Schema,
    )
    .with_comment(format!("Relationship table {} ({} -> {})", table, from, to))
}

fn string_list(items: Vec<String>) -> EngineValue {
    EngineValue::List(items.into_iter().map(EngineValue::String).collect())
}

/// Merge one node by id.
pub fn merge_node(
    table: &str,
    id: &str,
    node_type: &str,
    prop_keys: Vec<String>,
    prop_vals: Vec<String>,
) -> CypherStatement {
    CypherStatement::new(
        format!(
            "MERGE (n:{} {{id: $id}}) SET n.type = $node_type, n.properties = map($prop_keys, $prop_vals)",
            escape_identifier(table)
        ),
        StatementType::UpsertNode,
    )
    .with_param("id", id)
    .with_param("node_type", node_type)
    .with_param("prop_keys", string_list(prop_keys))
    .with_param("prop_vals", string_list(prop_vals))
}

/// One row of a batched node merge.
pub fn node_row(
    id: &str,
    node_type: &str,
    prop_keys: Vec<String>,
    prop_vals: Vec<String>,
) -> EngineValue {
    let mut row = BTreeMap::new();
    row.insert("id".to_string(), EngineValue::from(id));
    row.insert("node_type".to_string(), EngineValue::from(node_type));
    row.insert("prop_keys".to_string(), string_list(prop_keys));
    row.insert("prop_vals".to_string(), string_list(prop_vals));
    EngineValue::Struct(row)
}

/// Merge a list of [`node_row`]s into one table.
pub fn merge_node_rows(table: &str, rows: Vec<EngineValue>) -> CypherStatement {
    CypherStatement::new(
        format!(
            "UNWIND $rows AS row MERGE (n:{} {{id: row.id}}) SET n.type = row.node_type, n.properties = map(row.prop_keys, row.prop_vals)",
            escape_identifier(table)
        ),
        StatementType::UpsertNode,
    )
    .with_param("rows", EngineValue::List(rows))
}

/// Merge one relationship between existing endpoints.
///
/// Returns a single `merged` count, zero when an endpoint is missing.
pub fn merge_relationship(
    rel_table: &str,
    source_table: &str,
    target_table: &str,
    source_id: &str,
    target_id: &str,
    prop_keys: Vec<String>,
    prop_vals: Vec<String>,
) -> CypherStatement {
    CypherStatement::new(
        format!(
            "MATCH (s:{} {{id: $source_id}}), (t:{} {{id: $target_id}}) MERGE (s)-[r:{}]->(t) SET r.properties = map($prop_keys, $prop_vals) RETURN count(r) AS {}",
            escape_identifier(source_table),
            escape_identifier(target_table),
            escape_identifier(rel_table),
            MERGED_COLUMN
        ),
        StatementType::UpsertRelationship,
    )
    .with_param("source_id", source_id)
    .with_param("target_id", target_id)
    .with_param("prop_keys", string_list(prop_keys))
    .with_param("prop_vals", string_list(prop_vals))
}

/// One row of a batched relationship merge.
pub fn relationship_row(
    source_id: &str,
    target_id: &str,
    prop_keys: Vec<String>,
    prop_vals: Vec<String>,
) -> EngineValue {
    let mut row = BTreeMap::new();
    row.insert("source_id".to_string(), EngineValue::from(source_id));
    row.insert("target_id".to_string(), EngineValue::from(target_id));
    row.insert("prop_keys".to_string(), string_list(prop_keys));
    row.insert("prop_vals".to_string(), string_list(prop_vals));
    EngineValue::Struct(row)
}

/// Merge a list of [`relationship_row`]s for one `(source, rel, target)` table.
pub fn merge_relationship_rows(
    rel_table: &str,
    source_table: &str,
    target_table: &str,
    rows: Vec<EngineValue>,
) -> CypherStatement {
    CypherStatement::new(
        format!(
            "UNWIND $rows AS row MATCH (s:{} {{id: row.source_id}}), (t:{} {{id: row.target_id}}) MERGE (s)-[r:{}]->(t) SET r.properties = map(row.prop_keys, row.prop_vals) RETURN count(r) AS {}",
            escape_identifier(source_table),
            escape_identifier(target_table),
            escape_identifier(rel_table),
            MERGED_COLUMN
        ),
        StatementType::UpsertRelationship,
    )
    .with_param("rows", EngineValue::List(rows))
}

/// Merge the chunk node for a source document.
pub fn merge_chunk(
    id: &str,
    text: &str,
    prop_keys: Vec<String>,
    prop_vals: Vec<String>,
) -> CypherStatement {
    CypherStatement::new(
        format!(
            "MERGE (c:{} {{id: $id}}) SET c.text = $text, c.type = $chunk_type, c.properties = map($prop_keys, $prop_vals)",
            CHUNK_TABLE
        ),
        StatementType::Attribution,
    )
    .with_param("id", id)
    .with_param("text", text)
    .with_param("chunk_type", CHUNK_NODE_TYPE)
    .with_param("prop_keys", string_list(prop_keys))
    .with_param("prop_vals", string_list(prop_vals))
}

/// Link a chunk to every listed node of one entity table.
pub fn link_mentions(
    mentions_table: &str,
    entity_table: &str,
    chunk_id: &str,
    node_ids: Vec<String>,
) -> CypherStatement {
    CypherStatement::new(
        format!(
            "MATCH (c:{} {{id: $chunk_id}}) UNWIND $node_ids AS node_id MATCH (n:{} {{id: node_id}}) MERGE (c)-[:{}]->(n)",
            CHUNK_TABLE,
            escape_identifier(entity_table),
            escape_identifier(mentions_table)
        ),
        StatementType::Attribution,
    )
    .with_param("chunk_id", chunk_id)
    .with_param("node_ids", string_list(node_ids))
}

/// Open a native transaction.
pub fn begin_transaction(read_only: bool) -> CypherStatement {
    let query = if read_only {
        "BEGIN TRANSACTION READ ONLY"
    } else {
        "BEGIN TRANSACTION"
    };
    CypherStatement::new(query, StatementType::TransactionControl)
}

/// Commit the native transaction.
pub fn commit() -> CypherStatement {
    CypherStatement::new("COMMIT", StatementType::TransactionControl)
}

/// Roll back the native transaction.
pub fn rollback() -> CypherStatement {
    CypherStatement::new("ROLLBACK", StatementType::TransactionControl)
}

/// Liveness check.
pub fn health_check() -> CypherStatement {
    CypherStatement::query("RETURN 1 AS health_check")
}

/// Column name of the counting templates.
pub const COUNT_COLUMN: &str = "count";

/// Count the rows of a node table.
pub fn count_nodes(table: &str) -> CypherStatement {
    CypherStatement::query(format!(
        "MATCH (n:{}) RETURN count(n) AS {}",
        escape_identifier(table),
        COUNT_COLUMN
    ))
}

/// Count the edges of a relationship table.
pub fn count_relationships(table: &str) -> CypherStatement {
    CypherStatement::query(format!(
        "MATCH ()-[r:{}]->() RETURN count(r) AS {}",
        escape_identifier(table),
        COUNT_COLUMN
    ))
}
