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

//! Counting helpers for assertions over document batches.

use graphstore_core::GraphDocument;
use std::collections::{BTreeMap, BTreeSet};

/// Total nodes across documents, duplicates included.
pub fn count_nodes(docs: &[GraphDocument]) -> usize {
    docs.iter().map(|d| d.nodes.len()).sum()
}

/// Total relationships across documents, duplicates included.
pub fn count_relationships(docs: &[GraphDocument]) -> usize {
    docs.iter().map(|d| d.relationships.len()).sum()
}

/// Distinct `(type, id)` pairs across documents.
///
/// Relationship endpoints are not counted; only declared nodes are.
pub fn distinct_node_ids(docs: &[GraphDocument]) -> BTreeSet<(String, String)> {
    docs.iter()
        .flat_map(|d| d.nodes.iter())
        .map(|n| (n.node_type.clone(), n.id.clone()))
        .collect()
}

/// Declared nodes per type, duplicates included.
pub fn count_by_type(docs: &[GraphDocument]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for node in docs.iter().flat_map(|d| d.nodes.iter()) {
        *counts.entry(node.node_type.clone()).or_insert(0) += 1;
    }
    counts
}
