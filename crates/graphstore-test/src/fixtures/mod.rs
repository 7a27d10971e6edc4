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

//! Canonical graph documents.
//!
//! Every fixture is deterministic. Use [`all`] to run a check over the whole
//! set, or [`builders`] to assemble a one-off document.

pub mod builders;
mod documents;

pub use documents::*;

use crate::FixtureList;

/// Returns every fixture as `(name, generator)` pairs.
pub fn all() -> FixtureList {
    vec![
        ("alice_knows_bob", alice_knows_bob),
        ("org_chart", org_chart),
        ("typed_properties", typed_properties),
        ("untitled", untitled),
        ("keyword_labels", keyword_labels),
        ("dangling_relationship", dangling_relationship),
    ]
}
