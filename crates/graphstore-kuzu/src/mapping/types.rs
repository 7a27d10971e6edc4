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

//! Engine column type tags.

use crate::error::ConversionError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A Kuzu column type.
///
/// `Any` marks a null whose column type is not known.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EngineType {
    /// Untyped null marker.
    Any,
    /// `BOOL`.
    Bool,
    /// `INT8`.
    Int8,
    /// `INT16`.
    Int16,
    /// `INT32`.
    Int32,
    /// `INT64`.
    Int64,
    /// `UINT8`.
    UInt8,
    /// `UINT16`.
    UInt16,
    /// `UINT32`.
    UInt32,
    /// `UINT64`.
    UInt64,
    /// `FLOAT`, single precision.
    Float,
    /// `DOUBLE`.
    Double,
    /// `STRING`.
    String,
    /// `DATE`.
    Date,
    /// `TIMESTAMP`.
    Timestamp,
    /// `INTERVAL`.
    Interval,
    /// `LIST` or `T[]`.
    List,
    /// `STRUCT(...)`.
    Struct,
    /// `MAP(K, V)`.
    Map,
    /// `UNION(...)`.
    Union,
    /// `NODE`.
    Node,
    /// `REL`.
    Rel,
    /// `RECURSIVE_REL`, a path.
    RecursiveRel,
}

impl EngineType {
    /// Lists, structs and maps.
    pub fn is_composite(self) -> bool {
        matches!(self, Self::List | Self::Struct | Self::Map)
    }

    /// Any fixed-width integer type.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Int8
                | Self::Int16
                | Self::Int32
                | Self::Int64
                | Self::UInt8
                | Self::UInt16
                | Self::UInt32
                | Self::UInt64
        )
    }

    /// The name Kuzu uses in DDL and catalog output.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Any => "ANY",
            Self::Bool => "BOOL",
            Self::Int8 => "INT8",
            Self::Int16 => "INT16",
            Self::Int32 => "INT32",
            Self::Int64 => "INT64",
            Self::UInt8 => "UINT8",
            Self::UInt16 => "UINT16",
            Self::UInt32 => "UINT32",
            Self::UInt64 => "UINT64",
            Self::Float => "FLOAT",
            Self::Double => "DOUBLE",
            Self::String => "STRING",
            Self::Date => "DATE",
            Self::Timestamp => "TIMESTAMP",
            Self::Interval => "INTERVAL",
            Self::List => "LIST",
            Self::Struct => "STRUCT",
            Self::Map => "MAP",
            Self::Union => "UNION",
            Self::Node => "NODE",
            Self::Rel => "REL",
            Self::RecursiveRel => "RECURSIVE_REL",
        }
    }
}

impl fmt::Display for EngineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineType {
    type Err = ConversionError;

    /// Parse a catalog type name such as `INT64`, `STRING[]` or
    /// `MAP(STRING, STRING)`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_ascii_uppercase();
        if name.ends_with(']') {
            return Ok(Self::List);
        }
        let head = name.split('(').next().unwrap_or_default().trim();
        Ok(match head {
            "ANY" => Self::Any,
            "BOOL" | "BOOLEAN" => Self::Bool,
            "INT8" => Self::Int8,
            "INT16" => Self::Int16,
            "INT32" | "INT" => Self::Int32,
            "INT64" | "SERIAL" => Self::Int64,
            "UINT8" => Self::UInt8,
            "UINT16" => Self::UInt16,
            "UINT32" => Self::UInt32,
            "UINT64" => Self::UInt64,
            "FLOAT" => Self::Float,
            "DOUBLE" => Self::Double,
            "STRING" => Self::String,
            "DATE" => Self::Date,
            "TIMESTAMP" => Self::Timestamp,
            "INTERVAL" => Self::Interval,
            "LIST" => Self::List,
            "STRUCT" => Self::Struct,
            "MAP" => Self::Map,
            "UNION" => Self::Union,
            "NODE" => Self::Node,
            "REL" => Self::Rel,
            "RECURSIVE_REL" => Self::RecursiveRel,
            _ => return Err(ConversionError::new(format!("unknown engine type '{}'", s))),
        })
    }
}
