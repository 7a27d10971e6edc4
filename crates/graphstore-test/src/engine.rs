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

//! An in-memory engine that understands the statements the store emits.
//!
//! Statements are recognized by shape, not parsed. Anything else that reads
//! (`MATCH`/`RETURN`) yields no rows; anything else that writes is rejected.
//! DDL is applied immediately and survives `ROLLBACK`; row data is restored.

use graphstore_core::{
    ColumnInfo, EngineCapabilities, EngineError, EngineValue, GraphEngine, QueryResult, Row,
    TableInfo,
};
use parking_lot::Mutex;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

type Params = BTreeMap<String, EngineValue>;
type EngineResult<T> = Result<T, EngineError>;

const LABEL: &str = r"(`[^`]+`|\w+)";

/// A stored node row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredNode {
    /// Primary key.
    pub id: String,
    /// The `type` column.
    pub node_type: String,
    /// The `properties` map.
    pub properties: BTreeMap<String, String>,
    /// The `text` column of chunk nodes.
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default)]
struct NodeTable {
    columns: Vec<ColumnInfo>,
    rows: BTreeMap<String, StoredNode>,
}

#[derive(Debug, Clone)]
struct RelTable {
    from: String,
    to: String,
    edges: BTreeMap<(String, String), BTreeMap<String, String>>,
}

#[derive(Debug, Clone, Default)]
struct Data {
    nodes: BTreeMap<String, NodeTable>,
    rels: BTreeMap<String, RelTable>,
}

#[derive(Debug, Default)]
struct State {
    data: Data,
    snapshot: Option<Data>,
    executed: Vec<String>,
    failures: Vec<String>,
    failing_columns: Vec<String>,
    catalog_down: bool,
    delay: Duration,
    max_threads: usize,
    timeout: Option<Duration>,
}

struct Patterns {
    create_node: Regex,
    create_rel: Regex,
    merge_node: Regex,
    merge_node_rows: Regex,
    merge_rel: Regex,
    merge_rel_rows: Regex,
    merge_chunk: Regex,
    link_mentions: Regex,
    count_nodes: Regex,
    count_rels: Regex,
    list_nodes: Regex,
    list_rels: Regex,
}

fn pattern(template: &str) -> Regex {
    let source = format!("^{}$", template.replace("{L}", LABEL));
    match Regex::new(&source) {
        Ok(re) => re,
        Err(e) => panic!("bad statement pattern {}: {}", source, e),
    }
}

impl Patterns {
    fn new() -> Self {
        Self {
            create_node: pattern(r"CREATE NODE TABLE IF NOT EXISTS {L} \((.*)\)"),
            create_rel: pattern(
                r"CREATE REL TABLE IF NOT EXISTS {L} \(FROM {L} TO {L}, properties MAP\(STRING, STRING\)\)",
            ),
            merge_node: pattern(
                r"MERGE \(n:{L} \{id: \$id\}\) SET n\.type = \$node_type, n\.properties = map\(\$prop_keys, \$prop_vals\)",
            ),
            merge_node_rows: pattern(
                r"UNWIND \$rows AS row MERGE \(n:{L} \{id: row\.id\}\) SET n\.type = row\.node_type, n\.properties = map\(row\.prop_keys, row\.prop_vals\)",
            ),
            merge_rel: pattern(
                r"MATCH \(s:{L} \{id: \$source_id\}\), \(t:{L} \{id: \$target_id\}\) MERGE \(s\)-\[r:{L}\]->\(t\) SET r\.properties = map\(\$prop_keys, \$prop_vals\) RETURN count\(r\) AS (\w+)",
            ),
            merge_rel_rows: pattern(
                r"UNWIND \$rows AS row MATCH \(s:{L} \{id: row\.source_id\}\), \(t:{L} \{id: row\.target_id\}\) MERGE \(s\)-\[r:{L}\]->\(t\) SET r\.properties = map\(row\.prop_keys, row\.prop_vals\) RETURN count\(r\) AS (\w+)",
            ),
            merge_chunk: pattern(
                r"MERGE \(c:{L} \{id: \$id\}\) SET c\.text = \$text, c\.type = \$chunk_type, c\.properties = map\(\$prop_keys, \$prop_vals\)",
            ),
            link_mentions: pattern(
                r"MATCH \(c:{L} \{id: \$chunk_id\}\) UNWIND \$node_ids AS node_id MATCH \(n:{L} \{id: node_id\}\) MERGE \(c\)-\[:{L}\]->\(n\)",
            ),
            count_nodes: pattern(r"MATCH \(n:{L}\) RETURN count\(n\) AS (\w+)"),
            count_rels: pattern(r"MATCH \(\)-\[r:{L}\]->\(\) RETURN count\(r\) AS (\w+)"),
            list_nodes: pattern(
                r"MATCH \(n:{L}\) RETURN n\.id AS id, n\.type AS type, n\.properties AS properties",
            ),
            list_rels: pattern(
                r"MATCH \(s\)-\[r:{L}\]->\(t\) RETURN s\.id AS source, t\.id AS target, r\.properties AS properties",
            ),
        }
    }
}

fn label(caps: &Captures<'_>, index: usize) -> String {
    caps.get(index)
        .map(|m| m.as_str().trim_matches('`').to_string())
        .unwrap_or_default()
}

fn query_error(message: impl Into<String>) -> EngineError {
    EngineError::Query(message.into())
}

fn string_field(value: &EngineValue, name: &str) -> EngineResult<String> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| query_error(format!("{} must be a STRING", name)))
}

fn string_list(value: Option<&EngineValue>, name: &str) -> EngineResult<Vec<String>> {
    let items = value
        .and_then(EngineValue::as_list)
        .ok_or_else(|| query_error(format!("{} must be a LIST", name)))?;
    items.iter().map(|item| string_field(item, name)).collect()
}

fn param<'p>(params: &'p Params, name: &str) -> EngineResult<&'p EngineValue> {
    params
        .get(name)
        .ok_or_else(|| query_error(format!("missing parameter ${}", name)))
}

fn build_map(keys: Vec<String>, values: Vec<String>) -> EngineResult<BTreeMap<String, String>> {
    if keys.len() != values.len() {
        return Err(query_error("map keys and values differ in length"));
    }
    Ok(keys.into_iter().zip(values).collect())
}

fn map_value(map: &BTreeMap<String, String>) -> EngineValue {
    EngineValue::Struct(
        map.iter()
            .map(|(k, v)| (k.clone(), EngineValue::from(v.as_str())))
            .collect(),
    )
}

fn count_row(column: &str, count: u64) -> Row {
    let mut row = Row::new();
    row.insert(column.to_string(), EngineValue::UInt(count));
    row
}

fn node_columns(definition: &str) -> Vec<ColumnInfo> {
    let mut columns = vec![ColumnInfo::new("id", "STRING")];
    if definition.contains("text STRING") {
        columns.push(ColumnInfo::new("text", "STRING"));
    }
    columns.push(ColumnInfo::new("type", "STRING"));
    columns.push(ColumnInfo::new("properties", "MAP(STRING, STRING)"));
    columns
}

impl Data {
    fn node_table(&mut self, name: &str) -> EngineResult<&mut NodeTable> {
        self.nodes
            .get_mut(name)
            .ok_or_else(|| query_error(format!("Binder exception: table {} does not exist", name)))
    }

    fn rel_table(&mut self, name: &str) -> EngineResult<&mut RelTable> {
        self.rels
            .get_mut(name)
            .ok_or_else(|| query_error(format!("Binder exception: table {} does not exist", name)))
    }

    fn has_node(&self, table: &str, id: &str) -> bool {
        self.nodes
            .get(table)
            .map_or(false, |t| t.rows.contains_key(id))
    }

    fn upsert_node(&mut self, table: &str, node: StoredNode) -> EngineResult<()> {
        let target = self.node_table(table)?;
        target.rows.insert(node.id.clone(), node);
        Ok(())
    }

    /// Returns 1 when both endpoints exist and the edge was merged.
    fn merge_edge(
        &mut self,
        rel: &str,
        source: (&str, &str),
        target: (&str, &str),
        properties: BTreeMap<String, String>,
    ) -> EngineResult<u64> {
        if !self.nodes.contains_key(source.0) {
            return Err(query_error(format!("Binder exception: table {} does not exist", source.0)));
        }
        if !self.nodes.contains_key(target.0) {
            return Err(query_error(format!("Binder exception: table {} does not exist", target.0)));
        }
        let found = self.has_node(source.0, source.1) && self.has_node(target.0, target.1);
        let table = self.rel_table(rel)?;
        if table.from != source.0 || table.to != target.0 {
            return Err(query_error(format!(
                "relationship table {} connects {} to {}",
                rel, table.from, table.to
            )));
        }
        if !found {
            return Ok(0);
        }
        table
            .edges
            .insert((source.1.to_string(), target.1.to_string()), properties);
        Ok(1)
    }

    /// Keep tables, restore rows.
    fn restore_rows(&mut self, snapshot: Data) {
        for (name, table) in self.nodes.iter_mut() {
            table.rows = snapshot
                .nodes
                .get(name)
                .map(|t| t.rows.clone())
                .unwrap_or_default();
        }
        for (name, table) in self.rels.iter_mut() {
            table.edges = snapshot
                .rels
                .get(name)
                .map(|t| t.edges.clone())
                .unwrap_or_default();
        }
    }
}

/// In-memory [`GraphEngine`] with failure injection.
pub struct MemoryEngine {
    state: Mutex<State>,
    patterns: Patterns,
    capabilities: EngineCapabilities,
    connection_failures: AtomicUsize,
    reconnects: AtomicUsize,
    interrupt_requested: AtomicBool,
    interrupted: AtomicBool,
}

impl Default for MemoryEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemoryEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryEngine")
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl MemoryEngine {
    /// Engine with native transactions and serialized queries.
    pub fn new() -> Self {
        Self::with_capabilities(EngineCapabilities {
            transactions: true,
            concurrent_queries: false,
        })
    }

    /// Engine without native transactions; `BEGIN` and friends still parse.
    pub fn without_transactions() -> Self {
        Self::with_capabilities(EngineCapabilities {
            transactions: false,
            concurrent_queries: false,
        })
    }

    /// Engine with explicit capabilities.
    pub fn with_capabilities(capabilities: EngineCapabilities) -> Self {
        Self {
            state: Mutex::new(State::default()),
            patterns: Patterns::new(),
            capabilities,
            connection_failures: AtomicUsize::new(0),
            reconnects: AtomicUsize::new(0),
            interrupt_requested: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
        }
    }

    // --- Failure injection ---

    /// Fail every statement containing `fragment`.
    pub fn fail_matching(&self, fragment: impl Into<String>) {
        self.state.lock().failures.push(fragment.into());
    }

    /// Remove injected statement failures.
    pub fn clear_failures(&self) {
        self.state.lock().failures.clear();
    }

    /// Fail the next `count` statements with a connection error.
    pub fn fail_connections(&self, count: usize) {
        self.connection_failures.store(count, Ordering::SeqCst);
    }

    /// Make catalog listing fail.
    pub fn fail_catalog(&self, down: bool) {
        self.state.lock().catalog_down = down;
    }

    /// Make column listing fail for one table.
    pub fn fail_table_properties(&self, table: impl Into<String>) {
        self.state.lock().failing_columns.push(table.into());
    }

    /// Hold every statement this long before executing it.
    pub fn set_delay(&self, delay: Duration) {
        self.state.lock().delay = delay;
    }

    // --- Inspection ---

    /// Every statement received, in order.
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().executed.clone()
    }

    /// Statements received that contain `fragment`.
    pub fn count_executed(&self, fragment: &str) -> usize {
        self.state
            .lock()
            .executed
            .iter()
            .filter(|q| q.contains(fragment))
            .count()
    }

    /// Whether an interrupt was ever requested.
    pub fn was_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    /// Number of reconnects requested.
    pub fn reconnect_count(&self) -> usize {
        self.reconnects.load(Ordering::SeqCst)
    }

    /// Value passed to [`GraphEngine::set_max_threads`], zero if never set.
    pub fn max_threads(&self) -> usize {
        self.state.lock().max_threads
    }

    /// Value passed to [`GraphEngine::set_timeout`].
    pub fn timeout(&self) -> Option<Duration> {
        self.state.lock().timeout
    }

    /// Whether a node or relationship table exists.
    pub fn has_table(&self, name: &str) -> bool {
        let state = self.state.lock();
        state.data.nodes.contains_key(name) || state.data.rels.contains_key(name)
    }

    /// Whether a native transaction is open.
    pub fn in_transaction(&self) -> bool {
        self.state.lock().snapshot.is_some()
    }

    /// Rows of a node table, ordered by id.
    pub fn nodes(&self, table: &str) -> Vec<StoredNode> {
        self.state
            .lock()
            .data
            .nodes
            .get(table)
            .map(|t| t.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// One node row.
    pub fn node(&self, table: &str, id: &str) -> Option<StoredNode> {
        self.state
            .lock()
            .data
            .nodes
            .get(table)
            .and_then(|t| t.rows.get(id).cloned())
    }

    /// Number of rows in a node table.
    pub fn node_count(&self, table: &str) -> usize {
        self.state
            .lock()
            .data
            .nodes
            .get(table)
            .map_or(0, |t| t.rows.len())
    }

    /// `(source id, target id)` pairs of a relationship table, ordered.
    pub fn edges(&self, table: &str) -> Vec<(String, String)> {
        self.state
            .lock()
            .data
            .rels
            .get(table)
            .map(|t| t.edges.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Properties of one edge.
    pub fn edge_properties(
        &self,
        table: &str,
        source: &str,
        target: &str,
    ) -> Option<BTreeMap<String, String>> {
        self.state
            .lock()
            .data
            .rels
            .get(table)
            .and_then(|t| t.edges.get(&(source.to_string(), target.to_string())).cloned())
    }

    /// Total rows across every node table.
    pub fn total_nodes(&self) -> usize {
        self.state.lock().data.nodes.values().map(|t| t.rows.len()).sum()
    }

    /// Total edges across every relationship table.
    pub fn total_edges(&self) -> usize {
        self.state.lock().data.rels.values().map(|t| t.edges.len()).sum()
    }

    fn wait(&self, delay: Duration) -> EngineResult<()> {
        let started = Instant::now();
        while started.elapsed() < delay {
            if self.interrupt_requested.swap(false, Ordering::SeqCst) {
                return Err(EngineError::Interrupted);
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        Ok(())
    }

    fn dispatch(&self, state: &mut State, query: &str, params: &Params) -> EngineResult<Vec<Row>> {
        let p = &self.patterns;
        let data = &mut state.data;

        if let Some(caps) = p.create_node.captures(query) {
            let table = label(&caps, 1);
            data.nodes.entry(table).or_insert_with(|| NodeTable {
                columns: node_columns(&caps[2]),
                rows: BTreeMap::new(),
            });
            return Ok(Vec::new());
        }

        if let Some(caps) = p.create_rel.captures(query) {
            let (table, from, to) = (label(&caps, 1), label(&caps, 2), label(&caps, 3));
            for endpoint in [&from, &to] {
                if !data.nodes.contains_key(endpoint) {
                    return Err(query_error(format!(
                        "Binder exception: table {} does not exist",
                        endpoint
                    )));
                }
            }
            data.rels.entry(table).or_insert_with(|| RelTable {
                from,
                to,
                edges: BTreeMap::new(),
            });
            return Ok(Vec::new());
        }

        if let Some(caps) = p.merge_node.captures(query) {
            let node = StoredNode {
                id: string_field(param(params, "id")?, "id")?,
                node_type: string_field(param(params, "node_type")?, "node_type")?,
                properties: build_map(
                    string_list(params.get("prop_keys"), "prop_keys")?,
                    string_list(params.get("prop_vals"), "prop_vals")?,
                )?,
                text: None,
            };
            data.upsert_node(&label(&caps, 1), node)?;
            return Ok(Vec::new());
        }

        if let Some(caps) = p.merge_node_rows.captures(query) {
            let table = label(&caps, 1);
            let rows = param(params, "rows")?
                .as_list()
                .ok_or_else(|| query_error("rows must be a LIST"))?;
            for row in rows {
                let field = |name: &str| row.get(name).ok_or_else(|| query_error(format!("row.{} missing", name)));
                let node = StoredNode {
                    id: string_field(field("id")?, "id")?,
                    node_type: string_field(field("node_type")?, "node_type")?,
                    properties: build_map(
                        string_list(row.get("prop_keys"), "prop_keys")?,
                        string_list(row.get("prop_vals"), "prop_vals")?,
                    )?,
                    text: None,
                };
                data.upsert_node(&table, node)?;
            }
            return Ok(Vec::new());
        }

        if let Some(caps) = p.merge_rel.captures(query) {
            let (source, target, rel) = (label(&caps, 1), label(&caps, 2), label(&caps, 3));
            let source_id = string_field(param(params, "source_id")?, "source_id")?;
            let target_id = string_field(param(params, "target_id")?, "target_id")?;
            let properties = build_map(
                string_list(params.get("prop_keys"), "prop_keys")?,
                string_list(params.get("prop_vals"), "prop_vals")?,
            )?;
            let merged = data.merge_edge(
                &rel,
                (&source, &source_id),
                (&target, &target_id),
                properties,
            )?;
            return Ok(vec![count_row(&caps[4], merged)]);
        }

        if let Some(caps) = p.merge_rel_rows.captures(query) {
            let (source, target, rel) = (label(&caps, 1), label(&caps, 2), label(&caps, 3));
            let rows = param(params, "rows")?
                .as_list()
                .ok_or_else(|| query_error("rows must be a LIST"))?;
            let mut merged = 0;
            for row in rows {
                let field = |name: &str| row.get(name).ok_or_else(|| query_error(format!("row.{} missing", name)));
                let source_id = string_field(field("source_id")?, "source_id")?;
                let target_id = string_field(field("target_id")?, "target_id")?;
                let properties = build_map(
                    string_list(row.get("prop_keys"), "prop_keys")?,
                    string_list(row.get("prop_vals"), "prop_vals")?,
                )?;
                merged += data.merge_edge(
                    &rel,
                    (&source, &source_id),
                    (&target, &target_id),
                    properties,
                )?;
            }
            return Ok(vec![count_row(&caps[4], merged)]);
        }

        if let Some(caps) = p.merge_chunk.captures(query) {
            let node = StoredNode {
                id: string_field(param(params, "id")?, "id")?,
                node_type: string_field(param(params, "chunk_type")?, "chunk_type")?,
                properties: build_map(
                    string_list(params.get("prop_keys"), "prop_keys")?,
                    string_list(params.get("prop_vals"), "prop_vals")?,
                )?,
                text: Some(string_field(param(params, "text")?, "text")?),
            };
            data.upsert_node(&label(&caps, 1), node)?;
            return Ok(Vec::new());
        }

        if let Some(caps) = p.link_mentions.captures(query) {
            let (chunk_table, entity, mentions) = (label(&caps, 1), label(&caps, 2), label(&caps, 3));
            let chunk_id = string_field(param(params, "chunk_id")?, "chunk_id")?;
            for node_id in string_list(params.get("node_ids"), "node_ids")? {
                data.merge_edge(
                    &mentions,
                    (&chunk_table, &chunk_id),
                    (&entity, &node_id),
                    BTreeMap::new(),
                )?;
            }
            return Ok(Vec::new());
        }

        if let Some(caps) = p.count_nodes.captures(query) {
            let count = data.nodes.get(&label(&caps, 1)).map_or(0, |t| t.rows.len());
            return Ok(vec![count_row(&caps[2], count as u64)]);
        }

        if let Some(caps) = p.count_rels.captures(query) {
            let count = data.rels.get(&label(&caps, 1)).map_or(0, |t| t.edges.len());
            return Ok(vec![count_row(&caps[2], count as u64)]);
        }

        if let Some(caps) = p.list_nodes.captures(query) {
            let rows = data
                .nodes
                .get(&label(&caps, 1))
                .map(|t| {
                    t.rows
                        .values()
                        .map(|node| {
                            let mut row = Row::new();
                            row.insert("id".to_string(), EngineValue::from(node.id.as_str()));
                            row.insert("type".to_string(), EngineValue::from(node.node_type.as_str()));
                            row.insert("properties".to_string(), map_value(&node.properties));
                            row
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok(rows);
        }

        if let Some(caps) = p.list_rels.captures(query) {
            let rows = data
                .rels
                .get(&label(&caps, 1))
                .map(|t| {
                    t.edges
                        .iter()
                        .map(|((source, target), properties)| {
                            let mut row = Row::new();
                            row.insert("source".to_string(), EngineValue::from(source.as_str()));
                            row.insert("target".to_string(), EngineValue::from(target.as_str()));
                            row.insert("properties".to_string(), map_value(properties));
                            row
                        })
                        .collect()
                })
                .unwrap_or_default();
            return Ok(rows);
        }

        match query {
            "BEGIN TRANSACTION" | "BEGIN TRANSACTION READ ONLY" => {
                if state.snapshot.is_some() {
                    return Err(query_error("a transaction is already active"));
                }
                state.snapshot = Some(state.data.clone());
                Ok(Vec::new())
            }
            "COMMIT" => {
                state
                    .snapshot
                    .take()
                    .map(|_| Vec::new())
                    .ok_or_else(|| query_error("no active transaction"))
            }
            "ROLLBACK" => {
                let snapshot = state
                    .snapshot
                    .take()
                    .ok_or_else(|| query_error("no active transaction"))?;
                state.data.restore_rows(snapshot);
                Ok(Vec::new())
            }
            "RETURN 1 AS health_check" => {
                let mut row = Row::new();
                row.insert("health_check".to_string(), EngineValue::Int(1));
                Ok(vec![row])
            }
            _ if query.starts_with("MATCH") || query.starts_with("RETURN") => Ok(Vec::new()),
            _ => Err(query_error(format!("Parser exception: unsupported statement: {}", query))),
        }
    }
}

impl GraphEngine for MemoryEngine {
    fn execute(&self, query: &str, params: &Params) -> EngineResult<QueryResult> {
        let started = Instant::now();

        let (delay, injected) = {
            let mut state = self.state.lock();
            state.executed.push(query.to_string());
            let injected = state.failures.iter().any(|f| query.contains(f.as_str()));
            (state.delay, injected)
        };

        let pending = self.connection_failures.load(Ordering::SeqCst);
        if pending > 0 {
            self.connection_failures.store(pending - 1, Ordering::SeqCst);
            return Err(EngineError::Connection("connection reset by peer".to_string()));
        }
        if injected {
            return Err(query_error(format!("injected failure: {}", query)));
        }
        self.wait(delay)?;

        let mut state = self.state.lock();
        let rows = self.dispatch(&mut state, query, params)?;
        let mut result = QueryResult::with_rows(rows);
        result.execution_time_ms = started.elapsed().as_secs_f64() * 1000.0;
        Ok(result)
    }

    fn list_tables(&self) -> EngineResult<Vec<TableInfo>> {
        let state = self.state.lock();
        if state.catalog_down {
            return Err(query_error("catalog unavailable"));
        }
        let nodes = state.data.nodes.keys().map(TableInfo::node);
        let rels = state
            .data
            .rels
            .iter()
            .map(|(name, t)| TableInfo::relationship(name, &t.from, &t.to));
        Ok(nodes.chain(rels).collect())
    }

    fn table_properties(&self, table: &str) -> EngineResult<Vec<ColumnInfo>> {
        let state = self.state.lock();
        if state.catalog_down || state.failing_columns.iter().any(|t| t == table) {
            return Err(query_error(format!("cannot read columns of {}", table)));
        }
        if let Some(t) = state.data.nodes.get(table) {
            return Ok(t.columns.clone());
        }
        if state.data.rels.contains_key(table) {
            return Ok(vec![ColumnInfo::new("properties", "MAP(STRING, STRING)")]);
        }
        Err(query_error(format!("Binder exception: table {} does not exist", table)))
    }

    fn interrupt(&self) {
        self.interrupt_requested.store(true, Ordering::SeqCst);
        self.interrupted.store(true, Ordering::SeqCst);
    }

    fn set_max_threads(&self, threads: usize) {
        self.state.lock().max_threads = threads;
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = Some(timeout);
    }

    fn reconnect(&self) -> EngineResult<()> {
        self.reconnects.fetch_add(1, Ordering::SeqCst);
        // A new connection does not inherit the old one's transaction.
        let mut state = self.state.lock();
        if let Some(snapshot) = state.snapshot.take() {
            state.data.restore_rows(snapshot);
        }
        Ok(())
    }

    fn capabilities(&self) -> EngineCapabilities {
        self.capabilities
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, EngineValue)]) -> Params {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn strings(items: &[&str]) -> EngineValue {
        EngineValue::List(items.iter().map(|s| EngineValue::from(*s)).collect())
    }

    #[test]
    fn test_node_lifecycle() {
        let engine = MemoryEngine::new();
        engine
            .execute(
                "CREATE NODE TABLE IF NOT EXISTS Person (id STRING, type STRING, properties MAP(STRING, STRING), PRIMARY KEY(id))",
                &Params::new(),
            )
            .unwrap();
        engine
            .execute(
                "MERGE (n:Person {id: $id}) SET n.type = $node_type, n.properties = map($prop_keys, $prop_vals)",
                &params(&[
                    ("id", EngineValue::from("alice")),
                    ("node_type", EngineValue::from("Person")),
                    ("prop_keys", strings(&["age"])),
                    ("prop_vals", strings(&["30"])),
                ]),
            )
            .unwrap();
        let node = engine.node("Person", "alice").unwrap();
        assert_eq!(node.properties.get("age").map(String::as_str), Some("30"));

        let result = engine
            .execute("MATCH (n:Person) RETURN count(n) AS c", &Params::new())
            .unwrap();
        assert_eq!(result.scalar("c"), Some(&EngineValue::UInt(1)));
    }

    #[test]
    fn test_rel_table_requires_endpoints() {
        let engine = MemoryEngine::new();
        let err = engine
            .execute(
                "CREATE REL TABLE IF NOT EXISTS KNOWS_Person_Person (FROM Person TO Person, properties MAP(STRING, STRING))",
                &Params::new(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
    }

    #[test]
    fn test_rollback_restores_rows_keeps_tables() {
        let engine = MemoryEngine::new();
        engine.execute("BEGIN TRANSACTION", &Params::new()).unwrap();
        engine
            .execute(
                "CREATE NODE TABLE IF NOT EXISTS `Order` (id STRING, type STRING, properties MAP(STRING, STRING), PRIMARY KEY(id))",
                &Params::new(),
            )
            .unwrap();
        engine
            .execute(
                "MERGE (n:`Order` {id: $id}) SET n.type = $node_type, n.properties = map($prop_keys, $prop_vals)",
                &params(&[
                    ("id", EngineValue::from("o1")),
                    ("node_type", EngineValue::from("Order")),
                    ("prop_keys", strings(&[])),
                    ("prop_vals", strings(&[])),
                ]),
            )
            .unwrap();
        engine.execute("ROLLBACK", &Params::new()).unwrap();
        assert!(engine.has_table("Order"));
        assert_eq!(engine.node_count("Order"), 0);
        assert!(!engine.in_transaction());
    }

    #[test]
    fn test_unknown_write_rejected() {
        let engine = MemoryEngine::new();
        assert!(engine.execute("DROP TABLE Person", &Params::new()).is_err());
        let result = engine
            .execute("MATCH (n:Nothing) RETURN n", &Params::new())
            .unwrap();
        assert_eq!(result.row_count(), 0);
    }

    #[test]
    fn test_reconnect_drops_open_transaction() {
        let engine = MemoryEngine::new();
        engine
            .execute(
                "CREATE NODE TABLE IF NOT EXISTS Person (id STRING, type STRING, properties MAP(STRING, STRING), PRIMARY KEY(id))",
                &Params::new(),
            )
            .unwrap();
        engine.execute("BEGIN TRANSACTION", &Params::new()).unwrap();
        engine
            .execute(
                "MERGE (n:Person {id: $id}) SET n.type = $node_type, n.properties = map($prop_keys, $prop_vals)",
                &params(&[
                    ("id", EngineValue::from("alice")),
                    ("node_type", EngineValue::from("Person")),
                    ("prop_keys", strings(&[])),
                    ("prop_vals", strings(&[])),
                ]),
            )
            .unwrap();

        engine.reconnect().unwrap();
        assert!(!engine.in_transaction());
        assert_eq!(engine.node_count("Person"), 0);
        assert!(engine.execute("ROLLBACK", &Params::new()).is_err());
    }

    #[test]
    fn test_connection_failures_are_consumed() {
        let engine = MemoryEngine::new();
        engine.fail_connections(1);
        assert!(matches!(
            engine.execute("RETURN 1 AS health_check", &Params::new()),
            Err(EngineError::Connection(_))
        ));
        assert!(engine.execute("RETURN 1 AS health_check", &Params::new()).is_ok());
    }
}
