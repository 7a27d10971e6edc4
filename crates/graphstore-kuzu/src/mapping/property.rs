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

//! Property map conversion and the text encoding used for stored properties.

use super::types::EngineType;
use super::value::{json_to_value, TypeConverter};
use crate::error::ConversionError;
use graphstore_core::{EngineValue, Value};
use std::collections::BTreeMap;

/// Properties flattened into the parallel key and value lists a
/// `MAP(STRING, STRING)` column is built from.
///
/// `types` records the engine type each value converted to, index for index,
/// so callers can detect per-key type conflicts.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyColumns {
    /// Property names, sorted.
    pub keys: Vec<String>,
    /// Encoded values.
    pub values: Vec<String>,
    /// Engine type of each value before encoding.
    pub types: Vec<EngineType>,
}

impl PropertyColumns {
    /// Number of stored properties.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Applies a [`TypeConverter`] across whole property maps.
#[derive(Debug, Clone, Default)]
pub struct PropertyConverter {
    converter: TypeConverter,
}

impl PropertyConverter {
    /// Wrap a type converter.
    pub fn new(converter: TypeConverter) -> Self {
        Self { converter }
    }

    /// The underlying type converter.
    pub fn type_converter(&self) -> &TypeConverter {
        &self.converter
    }

    /// Convert every property. The first failure aborts and names its key.
    pub fn convert_properties(
        &self,
        properties: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, EngineValue>, ConversionError> {
        properties
            .iter()
            .map(|(key, value)| {
                self.converter
                    .to_engine_value(value)
                    .map(|(converted, _)| (key.clone(), converted))
                    .map_err(|e| e.at_key(key))
            })
            .collect()
    }

    /// Check that every property converts.
    pub fn validate_property_types(
        &self,
        properties: &BTreeMap<String, Value>,
    ) -> Result<(), ConversionError> {
        self.convert_properties(properties).map(|_| ())
    }

    /// Encode one value as stored text.
    ///
    /// Lists and maps become JSON, scalars their plain text, and null the
    /// literal `null`.
    pub fn serialize_complex_property(&self, value: &Value) -> Result<String, ConversionError> {
        let (converted, _) = self.converter.to_engine_value(value)?;
        encode(&converted)
    }

    /// Decode JSON text produced by [`serialize_complex_property`].
    ///
    /// [`serialize_complex_property`]: Self::serialize_complex_property
    pub fn deserialize_complex_property(&self, text: &str) -> Result<Value, ConversionError> {
        serde_json::from_str::<serde_json::Value>(text)
            .map(json_to_value)
            .map_err(|e| ConversionError::new(format!("invalid JSON property: {}", e)))
    }

    /// The parallel key and value lists for `map(keys, values)`.
    pub fn to_property_map(
        &self,
        properties: &BTreeMap<String, Value>,
        reserved: &[&str],
    ) -> Result<(Vec<String>, Vec<String>), ConversionError> {
        self.to_property_columns(properties, reserved)
            .map(|columns| (columns.keys, columns.values))
    }

    /// Flatten properties for storage, leaving out `reserved` keys and nulls.
    pub fn to_property_columns(
        &self,
        properties: &BTreeMap<String, Value>,
        reserved: &[&str],
    ) -> Result<PropertyColumns, ConversionError> {
        let mut columns = PropertyColumns::default();
        for (key, value) in properties {
            if reserved.contains(&key.as_str()) || value.is_null() {
                continue;
            }
            let (converted, ty) = self
                .converter
                .to_engine_value(value)
                .map_err(|e| e.at_key(key))?;
            if converted.is_null() {
                continue;
            }
            columns.keys.push(key.clone());
            columns.values.push(encode(&converted).map_err(|e| e.at_key(key))?);
            columns.types.push(ty);
        }
        Ok(columns)
    }
}

fn encode(value: &EngineValue) -> Result<String, ConversionError> {
    match value {
        EngineValue::Null => Ok("null".to_string()),
        EngineValue::Bool(b) => Ok(b.to_string()),
        EngineValue::Int(n) => Ok(n.to_string()),
        EngineValue::UInt(n) => Ok(n.to_string()),
        EngineValue::Float(f) => Ok(f.to_string()),
        EngineValue::String(s) => Ok(s.clone()),
        EngineValue::List(_) | EngineValue::Struct(_) => {
            serde_json::to_string(value).map_err(|e| ConversionError::new(e.to_string()))
        }
    }
}
