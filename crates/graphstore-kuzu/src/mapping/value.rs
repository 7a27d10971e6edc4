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

//! Bidirectional conversion between host values and engine values.

use super::types::EngineType;
use crate::config::ConverterConfig;
use crate::error::ConversionError;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use graphstore_core::{EngineValue, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::{self, Write as _};

/// An engine value and the column type it should be stored as.
pub type Converted = Result<(EngineValue, EngineType), ConversionError>;

/// Convert parsed JSON into a host value.
///
/// Integers that fit `i64` become `Int64`, larger ones `UInt64`; all other
/// numbers become `Float64`.
pub fn json_to_value(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else if let Some(u) = n.as_u64() {
                Value::UInt64(u)
            } else {
                n.as_f64().map_or(Value::Null, Value::Float64)
            }
        }
        serde_json::Value::String(s) => Value::String(s),
        serde_json::Value::Array(items) => Value::List(items.into_iter().map(json_to_value).collect()),
        serde_json::Value::Object(fields) => Value::Map(
            fields
                .into_iter()
                .map(|(k, v)| (k, json_to_value(v)))
                .collect(),
        ),
    }
}

fn looks_like_json(s: &str) -> bool {
    let trimmed = s.trim();
    (trimmed.starts_with('{') && trimmed.ends_with('}'))
        || (trimmed.starts_with('[') && trimmed.ends_with(']'))
}

fn render<T: fmt::Display>(formatted: T, what: &str) -> Result<String, ConversionError> {
    let mut out = String::new();
    write!(out, "{}", formatted)
        .map_err(|_| ConversionError::new(format!("invalid {} format", what)))?;
    Ok(out)
}

fn mismatch(value: &EngineValue, declared: EngineType) -> ConversionError {
    ConversionError::new(format!("cannot read {:?} as {}", value, declared))
}

fn narrow<T: TryFrom<i64>>(n: i64, declared: EngineType) -> Result<T, ConversionError> {
    T::try_from(n).map_err(|_| ConversionError::new(format!("value {} overflows {}", n, declared)))
}

fn narrow_unsigned<T: TryFrom<u64>>(n: u64, declared: EngineType) -> Result<T, ConversionError> {
    T::try_from(n).map_err(|_| ConversionError::new(format!("value {} overflows {}", n, declared)))
}

/// Maps host [`Value`]s to engine values and back.
///
/// Strings are promoted when [`ConverterConfig::infer_string_types`] is set:
/// a string parsing under the date format becomes `DATE`, one parsing under
/// the timestamp format becomes `TIMESTAMP`, and a JSON object or array is
/// converted recursively. The checks run in that order and any parse failure
/// keeps the plain string.
///
/// # Examples
///
/// ```
/// use graphstore_core::{EngineValue, Value};
/// use graphstore_kuzu::mapping::{EngineType, TypeConverter};
///
/// let converter = TypeConverter::default();
/// let (value, ty) = converter.to_engine_value(&Value::from("2024-03-01")).unwrap();
/// assert_eq!(ty, EngineType::Date);
/// assert_eq!(value, EngineValue::from("2024-03-01"));
///
/// let back = converter.from_engine_value(&value, ty).unwrap();
/// assert!(matches!(back, Value::Date(_)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct TypeConverter {
    config: ConverterConfig,
}

impl TypeConverter {
    /// Create a converter with the given configuration.
    pub fn new(config: ConverterConfig) -> Self {
        Self { config }
    }

    /// Homogeneous lists and no string promotion.
    pub fn strict() -> Self {
        Self::new(ConverterConfig::strict())
    }

    /// The active configuration.
    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Convert a host value into an engine value and its column type.
    ///
    /// Null converts to [`EngineValue::Null`] tagged [`EngineType::Any`].
    pub fn to_engine_value(&self, value: &Value) -> Converted {
        match value {
            Value::Null => Ok((EngineValue::Null, EngineType::Any)),
            Value::Bool(b) => Ok((EngineValue::Bool(*b), EngineType::Bool)),
            Value::Int8(n) => Ok((EngineValue::Int(i64::from(*n)), EngineType::Int8)),
            Value::Int16(n) => Ok((EngineValue::Int(i64::from(*n)), EngineType::Int16)),
            Value::Int32(n) => Ok((EngineValue::Int(i64::from(*n)), EngineType::Int32)),
            Value::Int64(n) => Ok((EngineValue::Int(*n), EngineType::Int64)),
            Value::UInt8(n) => Ok((EngineValue::UInt(u64::from(*n)), EngineType::UInt8)),
            Value::UInt16(n) => Ok((EngineValue::UInt(u64::from(*n)), EngineType::UInt16)),
            Value::UInt32(n) => Ok((EngineValue::UInt(u64::from(*n)), EngineType::UInt32)),
            Value::UInt64(n) => Ok((EngineValue::UInt(*n), EngineType::UInt64)),
            Value::Float32(f) => Ok((EngineValue::Float(f64::from(*f)), EngineType::Float)),
            Value::Float64(f) => Ok((EngineValue::Float(*f), EngineType::Double)),
            Value::String(s) => self.convert_string(s),
            Value::Date(d) => Ok((EngineValue::String(self.format_date(d)?), EngineType::Date)),
            Value::Timestamp(ts) => self.convert_timestamp(ts),
            Value::List(items) => self.convert_list(items),
            Value::Map(fields) => self.convert_map(fields),
        }
    }

    /// Convert any serializable value through its serde representation.
    ///
    /// Struct fields become struct entries named as serde names them, so
    /// `#[serde(rename)]` applies. `None` becomes null. Values serde cannot
    /// represent as JSON degrade to their `Debug` text.
    pub fn to_engine_serializable<T>(&self, value: &T) -> Converted
    where
        T: Serialize + fmt::Debug + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(json) => self.to_engine_value(&json_to_value(json)),
            Err(_) => Ok((EngineValue::String(format!("{:?}", value)), EngineType::String)),
        }
    }

    fn convert_string(&self, s: &str) -> Converted {
        if self.config.infer_string_types {
            if let Some(date) = self.parse_date(s) {
                return Ok((EngineValue::String(self.format_date(&date)?), EngineType::Date));
            }
            if let Some(ts) = self.parse_timestamp(s) {
                return self.convert_timestamp(&ts);
            }
            if looks_like_json(s) {
                if let Ok(json) = serde_json::from_str::<serde_json::Value>(s) {
                    return self.to_engine_value(&json_to_value(json));
                }
            }
        }
        Ok((EngineValue::String(s.to_string()), EngineType::String))
    }

    fn convert_timestamp(&self, ts: &DateTime<FixedOffset>) -> Converted {
        if ts.num_seconds_from_midnight() == 0 && ts.nanosecond() == 0 {
            let date = self.format_date(&ts.date_naive())?;
            return Ok((EngineValue::String(date), EngineType::Date));
        }
        let text = render(ts.format(&self.config.timestamp_format), "timestamp")?;
        Ok((EngineValue::String(text), EngineType::Timestamp))
    }

    fn convert_list(&self, items: &[Value]) -> Converted {
        let mut converted = Vec::with_capacity(items.len());
        let mut element_type: Option<EngineType> = None;

        for (index, item) in items.iter().enumerate() {
            let (value, ty) = self
                .to_engine_value(item)
                .map_err(|e| e.at_index(index))?;

            if self.config.strict && ty != EngineType::Any {
                match element_type {
                    Some(expected) if expected != ty => {
                        return Err(ConversionError::new(format!(
                            "inconsistent list element types: expected {}, found {}",
                            expected, ty
                        ))
                        .at_index(index));
                    }
                    None => element_type = Some(ty),
                    _ => {}
                }
            }
            converted.push(value);
        }

        Ok((EngineValue::List(converted), EngineType::List))
    }

    fn convert_map(&self, fields: &BTreeMap<String, Value>) -> Converted {
        let mut converted = BTreeMap::new();
        for (key, item) in fields {
            let (value, _) = self.to_engine_value(item).map_err(|e| e.at_key(key))?;
            converted.insert(key.clone(), value);
        }
        Ok((EngineValue::Struct(converted), EngineType::Struct))
    }

    fn format_date(&self, date: &NaiveDate) -> Result<String, ConversionError> {
        render(date.format(&self.config.date_format), "date")
    }

    fn parse_date(&self, s: &str) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(s, &self.config.date_format).ok()
    }

    fn parse_timestamp(&self, s: &str) -> Option<DateTime<FixedOffset>> {
        let format = &self.config.timestamp_format;
        DateTime::parse_from_str(s, format).ok().or_else(|| {
            NaiveDateTime::parse_from_str(s, format)
                .ok()
                .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
        })
    }

    /// Convert an engine value back into a host value of the declared type.
    ///
    /// Integer targets are range-checked; a value that does not fit the
    /// declared width is an error rather than a silent wrap. `LIST` and
    /// `STRUCT`/`MAP` accept structured values or JSON text.
    pub fn from_engine_value(
        &self,
        value: &EngineValue,
        declared: EngineType,
    ) -> Result<Value, ConversionError> {
        if value.is_null() {
            return Ok(Value::Null);
        }

        match declared {
            EngineType::Any => Ok(infer_value(value)),
            EngineType::String => self.read_text(value).map(Value::String),
            EngineType::Bool => read_bool(value, declared).map(Value::Bool),
            EngineType::Int8 => narrow(read_signed(value, declared)?, declared).map(Value::Int8),
            EngineType::Int16 => narrow(read_signed(value, declared)?, declared).map(Value::Int16),
            EngineType::Int32 => narrow(read_signed(value, declared)?, declared).map(Value::Int32),
            EngineType::Int64 => read_signed(value, declared).map(Value::Int64),
            EngineType::UInt8 => {
                narrow_unsigned(read_unsigned(value, declared)?, declared).map(Value::UInt8)
            }
            EngineType::UInt16 => {
                narrow_unsigned(read_unsigned(value, declared)?, declared).map(Value::UInt16)
            }
            EngineType::UInt32 => {
                narrow_unsigned(read_unsigned(value, declared)?, declared).map(Value::UInt32)
            }
            EngineType::UInt64 => read_unsigned(value, declared).map(Value::UInt64),
            EngineType::Float => read_float(value, declared).map(|f| Value::Float32(f as f32)),
            EngineType::Double => read_float(value, declared).map(Value::Float64),
            EngineType::Date => self.read_date(value, declared).map(Value::Date),
            EngineType::Timestamp => self.read_timestamp(value, declared).map(Value::Timestamp),
            EngineType::List => self.read_list(value, declared),
            EngineType::Struct | EngineType::Map => self.read_struct(value, declared),
            EngineType::Interval
            | EngineType::Union
            | EngineType::Node
            | EngineType::Rel
            | EngineType::RecursiveRel => Err(ConversionError::new(format!(
                "unsupported engine type {}",
                declared
            ))),
        }
    }

    fn read_text(&self, value: &EngineValue) -> Result<String, ConversionError> {
        match value {
            EngineValue::String(s) => Ok(s.clone()),
            EngineValue::Bool(b) => Ok(b.to_string()),
            EngineValue::Int(n) => Ok(n.to_string()),
            EngineValue::UInt(n) => Ok(n.to_string()),
            EngineValue::Float(f) => Ok(f.to_string()),
            EngineValue::Null => Ok(String::new()),
            EngineValue::List(_) | EngineValue::Struct(_) => serde_json::to_string(value)
                .map_err(|e| ConversionError::new(e.to_string())),
        }
    }

    fn read_date(&self, value: &EngineValue, declared: EngineType) -> Result<NaiveDate, ConversionError> {
        let text = value.as_str().ok_or_else(|| mismatch(value, declared))?;
        self.parse_date(text)
            .or_else(|| self.parse_timestamp(text).map(|ts| ts.date_naive()))
            .ok_or_else(|| {
                ConversionError::new(format!(
                    "'{}' does not match date format '{}'",
                    text, self.config.date_format
                ))
            })
    }

    fn read_timestamp(
        &self,
        value: &EngineValue,
        declared: EngineType,
    ) -> Result<DateTime<FixedOffset>, ConversionError> {
        let text = value.as_str().ok_or_else(|| mismatch(value, declared))?;
        self.parse_timestamp(text)
            .or_else(|| {
                self.parse_date(text)
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
            })
            .ok_or_else(|| {
                ConversionError::new(format!(
                    "'{}' does not match timestamp format '{}'",
                    text, self.config.timestamp_format
                ))
            })
    }

    fn read_list(&self, value: &EngineValue, declared: EngineType) -> Result<Value, ConversionError> {
        match value {
            EngineValue::List(items) => items
                .iter()
                .enumerate()
                .map(|(i, item)| {
                    self.from_engine_value(item, EngineType::Any)
                        .map_err(|e| e.at_index(i))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(Value::List),
            EngineValue::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json @ serde_json::Value::Array(_)) => Ok(json_to_value(json)),
                _ => Err(ConversionError::new(format!("'{}' is not a JSON array", s))),
            },
            other => Err(mismatch(other, declared)),
        }
    }

    fn read_struct(&self, value: &EngineValue, declared: EngineType) -> Result<Value, ConversionError> {
        match value {
            EngineValue::Struct(fields) => fields
                .iter()
                .map(|(k, v)| {
                    self.from_engine_value(v, EngineType::Any)
                        .map(|converted| (k.clone(), converted))
                        .map_err(|e| e.at_key(k))
                })
                .collect::<Result<BTreeMap<_, _>, _>>()
                .map(Value::Map),
            EngineValue::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
                Ok(json @ serde_json::Value::Object(_)) => Ok(json_to_value(json)),
                _ => Err(ConversionError::new(format!("'{}' is not a JSON object", s))),
            },
            other => Err(mismatch(other, declared)),
        }
    }
}

fn infer_value(value: &EngineValue) -> Value {
    match value {
        EngineValue::Null => Value::Null,
        EngineValue::Bool(b) => Value::Bool(*b),
        EngineValue::Int(n) => Value::Int64(*n),
        EngineValue::UInt(n) => Value::UInt64(*n),
        EngineValue::Float(f) => Value::Float64(*f),
        EngineValue::String(s) => Value::String(s.clone()),
        EngineValue::List(items) => Value::List(items.iter().map(infer_value).collect()),
        EngineValue::Struct(fields) => Value::Map(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), infer_value(v)))
                .collect(),
        ),
    }
}

fn read_bool(value: &EngineValue, declared: EngineType) -> Result<bool, ConversionError> {
    match value {
        EngineValue::Bool(b) => Ok(*b),
        EngineValue::Int(n) => Ok(*n != 0),
        EngineValue::UInt(n) => Ok(*n != 0),
        EngineValue::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "1" => Ok(true),
            "false" | "f" | "0" => Ok(false),
            _ => Err(ConversionError::new(format!("'{}' is not a boolean", s))),
        },
        other => Err(mismatch(other, declared)),
    }
}

fn read_signed(value: &EngineValue, declared: EngineType) -> Result<i64, ConversionError> {
    match value {
        EngineValue::Int(n) => Ok(*n),
        EngineValue::UInt(n) => narrow_unsigned(*n, declared),
        EngineValue::Float(f) => {
            if f.fract() == 0.0 && *f >= i64::MIN as f64 && *f < i64::MAX as f64 {
                Ok(*f as i64)
            } else {
                Err(ConversionError::new(format!(
                    "{} is not representable as {}",
                    f, declared
                )))
            }
        }
        EngineValue::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| ConversionError::new(format!("'{}' is not an integer: {}", s, e))),
        other => Err(mismatch(other, declared)),
    }
}

fn read_unsigned(value: &EngineValue, declared: EngineType) -> Result<u64, ConversionError> {
    match value {
        EngineValue::UInt(n) => Ok(*n),
        EngineValue::Int(n) => u64::try_from(*n)
            .map_err(|_| ConversionError::new(format!("value {} overflows {}", n, declared))),
        EngineValue::Float(f) => {
            if f.fract() == 0.0 && *f >= 0.0 && *f < u64::MAX as f64 {
                Ok(*f as u64)
            } else {
                Err(ConversionError::new(format!(
                    "{} is not representable as {}",
                    f, declared
                )))
            }
        }
        EngineValue::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| ConversionError::new(format!("'{}' is not an unsigned integer: {}", s, e))),
        other => Err(mismatch(other, declared)),
    }
}

fn read_float(value: &EngineValue, declared: EngineType) -> Result<f64, ConversionError> {
    match value {
        EngineValue::Float(f) => Ok(*f),
        EngineValue::Int(n) => Ok(*n as f64),
        EngineValue::UInt(n) => Ok(*n as f64),
        EngineValue::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|e| ConversionError::new(format!("'{}' is not a number: {}", s, e))),
        other => Err(mismatch(other, declared)),
    }
}
