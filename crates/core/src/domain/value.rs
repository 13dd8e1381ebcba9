use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::DomainError;

/// Dotted path into an entity document, e.g. `ispInfo.renewalDate`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath(String);

impl FieldPath {
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        let valid = !trimmed.is_empty()
            && trimmed.split('.').all(|segment| {
                !segment.is_empty()
                    && segment.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
            });
        if !valid {
            return Err(DomainError::InvalidFieldPath { path: raw.to_string() });
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('.')
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(value: FieldPath) -> Self {
        value.0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Integer,
    Bool,
    Date,
    TextList,
}

/// A path that participates in change proposals, with its declared value type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrackedField {
    pub path: &'static str,
    pub kind: FieldKind,
}

impl TrackedField {
    pub const fn new(path: &'static str, kind: FieldKind) -> Self {
        Self { path, kind }
    }

    pub fn field_path(&self) -> FieldPath {
        FieldPath(self.path.to_string())
    }
}

pub fn find_tracked<'a>(fields: &'a [TrackedField], path: &FieldPath) -> Option<&'a TrackedField> {
    fields.iter().find(|field| field.path == path.as_str())
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    #[default]
    Absent,
    Text(String),
    Decimal(Decimal),
    Integer(i64),
    Bool(bool),
    Date(NaiveDate),
    TextList(Vec<String>),
}

impl FieldValue {
    /// `Absent` and the empty string both mean "keep the persisted value".
    pub fn is_unset(&self) -> bool {
        match self {
            Self::Absent => true,
            Self::Text(text) => text.is_empty(),
            _ => false,
        }
    }

    pub fn from_json(kind: FieldKind, path: &FieldPath, value: &Value) -> Result<Self, DomainError> {
        let malformed = |reason: &str| DomainError::MalformedField {
            path: path.to_string(),
            reason: reason.to_string(),
        };

        if value.is_null() {
            return Ok(Self::Absent);
        }
        if kind != FieldKind::Text && value.as_str().is_some_and(|raw| raw.trim().is_empty()) {
            return Ok(Self::Absent);
        }

        match kind {
            FieldKind::Text => match value {
                Value::String(text) => Ok(Self::Text(text.clone())),
                Value::Number(number) => Ok(Self::Text(number.to_string())),
                Value::Bool(flag) => Ok(Self::Text(flag.to_string())),
                _ => Err(malformed("expected text")),
            },
            FieldKind::Decimal => {
                let raw = match value {
                    Value::String(text) => text.trim().to_string(),
                    Value::Number(number) => number.to_string(),
                    _ => return Err(malformed("expected a decimal number")),
                };
                Decimal::from_str(&raw)
                    .or_else(|_| Decimal::from_scientific(&raw))
                    .map(Self::Decimal)
                    .map_err(|_| malformed("expected a decimal number"))
            }
            FieldKind::Integer => match value {
                Value::Number(number) => {
                    number.as_i64().map(Self::Integer).ok_or_else(|| malformed("expected an integer"))
                }
                Value::String(text) => text
                    .trim()
                    .parse::<i64>()
                    .map(Self::Integer)
                    .map_err(|_| malformed("expected an integer")),
                _ => Err(malformed("expected an integer")),
            },
            FieldKind::Bool => match value {
                Value::Bool(flag) => Ok(Self::Bool(*flag)),
                Value::String(text) => text
                    .trim()
                    .to_ascii_lowercase()
                    .parse::<bool>()
                    .map(Self::Bool)
                    .map_err(|_| malformed("expected true or false")),
                _ => Err(malformed("expected true or false")),
            },
            FieldKind::Date => match value {
                Value::String(text) => parse_date(text.trim())
                    .map(Self::Date)
                    .ok_or_else(|| malformed("expected a date (YYYY-MM-DD or RFC 3339)")),
                _ => Err(malformed("expected a date (YYYY-MM-DD or RFC 3339)")),
            },
            FieldKind::TextList => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| item.as_str().map(str::to_string))
                    .collect::<Option<Vec<_>>>()
                    .map(Self::TextList)
                    .ok_or_else(|| malformed("expected a list of strings")),
                _ => Err(malformed("expected a list of strings")),
            },
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Self::Absent => Value::Null,
            Self::Text(text) => Value::String(text.clone()),
            Self::Decimal(amount) => Value::String(amount.normalize().to_string()),
            Self::Integer(number) => Value::from(*number),
            Self::Bool(flag) => Value::Bool(*flag),
            Self::Date(date) => Value::String(date.format("%Y-%m-%d").to_string()),
            Self::TextList(items) => {
                Value::Array(items.iter().cloned().map(Value::String).collect())
            }
        }
    }
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|stamp| stamp.date_naive()))
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<Decimal> for FieldValue {
    fn from(value: Decimal) -> Self {
        Self::Decimal(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<NaiveDate> for FieldValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(value: Vec<String>) -> Self {
        Self::TextList(value)
    }
}

/// Sparse, path-keyed set of field values.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChangeSet(BTreeMap<FieldPath, FieldValue>);

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: &str, value: impl Into<FieldValue>) -> Result<Self, DomainError> {
        self.0.insert(FieldPath::parse(path)?, value.into());
        Ok(self)
    }

    pub fn insert(&mut self, path: FieldPath, value: FieldValue) -> Option<FieldValue> {
        self.0.insert(path, value)
    }

    pub fn get(&self, path: &FieldPath) -> Option<&FieldValue> {
        self.0.get(path)
    }

    pub fn value_at(&self, path: &str) -> Option<&FieldValue> {
        FieldPath::parse(path).ok().and_then(|path| self.0.get(&path))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldPath, &FieldValue)> {
        self.0.iter()
    }

    pub fn paths(&self) -> impl Iterator<Item = &FieldPath> {
        self.0.keys()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Renders the change set in nested-object shape; `a.b` becomes `{"a": {"b": ..}}`.
    pub fn to_nested_json(&self) -> Value {
        let mut root = Value::Object(Map::new());
        for (path, value) in &self.0 {
            write_path(&mut root, path, value.to_json());
        }
        root
    }

    /// Extracts the tracked fields present in a nested JSON payload. Omitted paths are skipped.
    pub fn from_payload(fields: &[TrackedField], payload: &Value) -> Result<Self, DomainError> {
        let mut changes = Self::new();
        for field in fields {
            let path = field.field_path();
            if let Some(raw) = read_path(payload, &path) {
                let value = FieldValue::from_json(field.kind, &path, raw)?;
                changes.insert(path, value);
            }
        }
        Ok(changes)
    }
}

impl FromIterator<(FieldPath, FieldValue)> for ChangeSet {
    fn from_iter<T: IntoIterator<Item = (FieldPath, FieldValue)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Walks `path` through nested objects; any missing or non-object hop yields `None`.
pub fn read_path<'a>(document: &'a Value, path: &FieldPath) -> Option<&'a Value> {
    path.segments().try_fold(document, |current, segment| current.as_object()?.get(segment))
}

/// Writes `value` at `path`, creating (or replacing non-object) intermediate nodes.
pub fn write_path(document: &mut Value, path: &FieldPath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    let Some((leaf, parents)) = segments.split_last() else {
        return;
    };

    let mut current = document;
    for segment in parents {
        let Some(map) = ensure_object(current) else {
            return;
        };
        current = map.entry((*segment).to_string()).or_insert(Value::Null);
    }

    if let Some(map) = ensure_object(current) {
        map.insert((*leaf).to_string(), value);
    }
}

fn ensure_object(value: &mut Value) -> Option<&mut Map<String, Value>> {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    value.as_object_mut()
}
