//! Document model for the path engine: scalar values, container handles and
//! the ordered value sequences produced by evaluation.
//!
//! Containers are immutable, self-describing trees behind cheap `Arc`
//! handles. Every container records its preorder position within the
//! document it was built from; `.keyvalue()` derives object identities from
//! the distance between a container and its base object, so positions must
//! be stable and unique per document.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime};
use rust_decimal::Decimal;
use smallvec::SmallVec;

use crate::engine::runtime::{Error, ErrorCode};

/// A single SQL/JSON item.
///
/// Arrays and objects are only ever observed through [`JsonbValue::Binary`];
/// scalar extraction is eager, so a `Binary` handle never wraps a top-level
/// scalar once it has crossed an engine boundary.
#[derive(Debug, Clone)]
pub enum JsonbValue {
    Null,
    Bool(bool),
    Numeric(Decimal),
    String(String),
    Datetime(JsonbDatetime),
    Binary(JsonbContainer),
}

/// Datetime item produced by the `.datetime()` family of methods.
///
/// The optional precision argument of those methods is applied when the
/// value is constructed; comparison and encoding operate on the stored
/// value as-is.
#[derive(Debug, Clone, PartialEq)]
pub enum JsonbDatetime {
    Date(NaiveDate),
    Time(NaiveTime),
    TimeTz(NaiveTime, FixedOffset),
    Timestamp(NaiveDateTime),
    TimestampTz(DateTime<FixedOffset>),
}

/// Kind classification with binary containers resolved to their concrete
/// container kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonbType {
    Null,
    Bool,
    Numeric,
    String,
    Datetime,
    Array,
    Object,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
    Scalar,
}

#[derive(Debug)]
enum Entry {
    Null,
    Bool(bool),
    Numeric(Decimal),
    String(String),
    Container(JsonbContainer),
}

#[derive(Debug)]
enum ContainerBody {
    Object(Vec<(String, Entry)>),
    Array(Vec<Entry>),
    /// Root pseudo-container holding a lone scalar document.
    Scalar(Entry),
}

#[derive(Debug)]
struct ContainerData {
    position: u64,
    body: ContainerBody,
}

/// Opaque handle onto an undecoded container within a document.
#[derive(Debug, Clone)]
pub struct JsonbContainer {
    data: Arc<ContainerData>,
}

/// A complete document: a container tree with stable positions.
#[derive(Debug, Clone, PartialEq)]
pub struct Jsonb {
    root: JsonbContainer,
}

impl JsonbValue {
    /// Kind of this item, resolving binary handles through the container
    /// inspector. Scalar pseudo-containers never appear here.
    pub fn jsonb_type(&self) -> JsonbType {
        match self {
            JsonbValue::Null => JsonbType::Null,
            JsonbValue::Bool(_) => JsonbType::Bool,
            JsonbValue::Numeric(_) => JsonbType::Numeric,
            JsonbValue::String(_) => JsonbType::String,
            JsonbValue::Datetime(_) => JsonbType::Datetime,
            JsonbValue::Binary(c) => match c.kind() {
                ContainerKind::Object => JsonbType::Object,
                ContainerKind::Array => JsonbType::Array,
                ContainerKind::Scalar => {
                    // Scalars are extracted eagerly; a scalar handle here is
                    // a construction bug, not an input condition.
                    unreachable!("scalar container observed at engine boundary")
                }
            },
        }
    }

    /// Name of the item type as reported by the `.type()` method. The exact
    /// spellings are part of the public contract.
    pub fn type_name(&self) -> &'static str {
        match self {
            JsonbValue::Null => "null",
            JsonbValue::Bool(_) => "boolean",
            JsonbValue::Numeric(_) => "number",
            JsonbValue::String(_) => "string",
            JsonbValue::Datetime(JsonbDatetime::Date(_)) => "date",
            JsonbValue::Datetime(JsonbDatetime::Time(_)) => "time without time zone",
            JsonbValue::Datetime(JsonbDatetime::TimeTz(..)) => "time with time zone",
            JsonbValue::Datetime(JsonbDatetime::Timestamp(_)) => "timestamp without time zone",
            JsonbValue::Datetime(JsonbDatetime::TimestampTz(_)) => "timestamp with time zone",
            JsonbValue::Binary(c) => match c.kind() {
                ContainerKind::Object => "object",
                _ => "array",
            },
        }
    }

    pub(crate) fn as_numeric(&self) -> Option<&Decimal> {
        match self {
            JsonbValue::Numeric(n) => Some(n),
            _ => None,
        }
    }

    pub(crate) fn as_string(&self) -> Option<&str> {
        match self {
            JsonbValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Size of an array item, or `None` if the item is not an array.
    pub(crate) fn array_size(&self) -> Option<usize> {
        match self {
            JsonbValue::Binary(c) if c.kind() == ContainerKind::Array => Some(c.len()),
            _ => None,
        }
    }

    /// Convert to a `serde_json` value. Datetimes render as their ISO
    /// encodings; numbers degrade to f64 when they carry a fraction.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            JsonbValue::Null => serde_json::Value::Null,
            JsonbValue::Bool(b) => serde_json::Value::Bool(*b),
            JsonbValue::Numeric(n) => decimal_to_json(n),
            JsonbValue::String(s) => serde_json::Value::String(s.clone()),
            JsonbValue::Datetime(dt) => serde_json::Value::String(dt.to_string()),
            JsonbValue::Binary(c) => c.to_json(),
        }
    }
}

fn decimal_to_json(n: &Decimal) -> serde_json::Value {
    use rust_decimal::prelude::ToPrimitive;
    if n.fract().is_zero() {
        if let Some(i) = n.to_i64() {
            return serde_json::Value::Number(serde_json::Number::from(i));
        }
    }
    match n.to_f64().and_then(serde_json::Number::from_f64) {
        Some(num) => serde_json::Value::Number(num),
        None => serde_json::Value::String(n.to_string()),
    }
}

impl PartialEq for JsonbValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (JsonbValue::Null, JsonbValue::Null) => true,
            (JsonbValue::Bool(a), JsonbValue::Bool(b)) => a == b,
            (JsonbValue::Numeric(a), JsonbValue::Numeric(b)) => a == b,
            (JsonbValue::String(a), JsonbValue::String(b)) => a == b,
            (JsonbValue::Datetime(a), JsonbValue::Datetime(b)) => a == b,
            (JsonbValue::Binary(a), JsonbValue::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for JsonbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonbValue::Numeric(n) => write!(f, "{n}"),
            JsonbValue::Datetime(dt) => write!(f, "\"{dt}\""),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl JsonbContainer {
    pub fn kind(&self) -> ContainerKind {
        match &self.data.body {
            ContainerBody::Object(_) => ContainerKind::Object,
            ContainerBody::Array(_) => ContainerKind::Array,
            ContainerBody::Scalar(_) => ContainerKind::Scalar,
        }
    }

    /// Number of entries: key-value pairs for objects, elements for arrays.
    pub fn len(&self) -> usize {
        match &self.data.body {
            ContainerBody::Object(pairs) => pairs.len(),
            ContainerBody::Array(elems) => elems.len(),
            ContainerBody::Scalar(_) => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Preorder position of this container within its document.
    pub(crate) fn position(&self) -> u64 {
        self.data.position
    }

    /// Values of the container in its native order: member values for
    /// objects, elements for arrays.
    pub fn items(&self) -> Vec<JsonbValue> {
        match &self.data.body {
            ContainerBody::Object(pairs) => pairs.iter().map(|(_, e)| e.to_value()).collect(),
            ContainerBody::Array(elems) => elems.iter().map(Entry::to_value).collect(),
            ContainerBody::Scalar(e) => vec![e.to_value()],
        }
    }

    /// Key-value pairs of an object container in native key order.
    pub fn entries(&self) -> Vec<(String, JsonbValue)> {
        match &self.data.body {
            ContainerBody::Object(pairs) => pairs
                .iter()
                .map(|(k, e)| (k.clone(), e.to_value()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Look up an object member by key.
    pub fn find_key(&self, key: &str) -> Option<JsonbValue> {
        match &self.data.body {
            ContainerBody::Object(pairs) => pairs
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, e)| e.to_value()),
            _ => None,
        }
    }

    /// Array element at `index`, if present.
    pub fn element(&self, index: usize) -> Option<JsonbValue> {
        match &self.data.body {
            ContainerBody::Array(elems) => elems.get(index).map(Entry::to_value),
            _ => None,
        }
    }

    fn scalar(&self) -> Option<JsonbValue> {
        match &self.data.body {
            ContainerBody::Scalar(e) => Some(e.to_value()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match &self.data.body {
            ContainerBody::Object(pairs) => {
                let mut map = serde_json::Map::new();
                for (k, e) in pairs {
                    map.insert(k.clone(), e.to_value().to_json());
                }
                serde_json::Value::Object(map)
            }
            ContainerBody::Array(elems) => {
                serde_json::Value::Array(elems.iter().map(|e| e.to_value().to_json()).collect())
            }
            ContainerBody::Scalar(e) => e.to_value().to_json(),
        }
    }
}

impl PartialEq for JsonbContainer {
    fn eq(&self, other: &Self) -> bool {
        // Structural equality; positions are an identity detail, not part
        // of the value.
        match (&self.data.body, &other.data.body) {
            (ContainerBody::Object(a), ContainerBody::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|((ka, ea), (kb, eb))| ka == kb && ea.to_value() == eb.to_value())
            }
            (ContainerBody::Array(a), ContainerBody::Array(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(ea, eb)| ea.to_value() == eb.to_value())
            }
            (ContainerBody::Scalar(a), ContainerBody::Scalar(b)) => a.to_value() == b.to_value(),
            _ => false,
        }
    }
}

impl Entry {
    fn to_value(&self) -> JsonbValue {
        match self {
            Entry::Null => JsonbValue::Null,
            Entry::Bool(b) => JsonbValue::Bool(*b),
            Entry::Numeric(n) => JsonbValue::Numeric(*n),
            Entry::String(s) => JsonbValue::String(s.clone()),
            Entry::Container(c) => JsonbValue::Binary(c.clone()),
        }
    }

    fn from_value(v: JsonbValue, next_position: &mut u64) -> Entry {
        match v {
            JsonbValue::Null => Entry::Null,
            JsonbValue::Bool(b) => Entry::Bool(b),
            JsonbValue::Numeric(n) => Entry::Numeric(n),
            JsonbValue::String(s) => Entry::String(s),
            // Datetimes serialize to their ISO string form when placed into
            // a container, matching the binary format which has no datetime
            // scalar kind.
            JsonbValue::Datetime(dt) => Entry::String(dt.to_string()),
            JsonbValue::Binary(c) => Entry::Container(reposition(&c, next_position)),
        }
    }
}

fn reposition(container: &JsonbContainer, next_position: &mut u64) -> JsonbContainer {
    let position = *next_position;
    *next_position += 1;
    let body = match &container.data.body {
        ContainerBody::Object(pairs) => ContainerBody::Object(
            pairs
                .iter()
                .map(|(k, e)| (k.clone(), Entry::from_value(e.to_value(), next_position)))
                .collect(),
        ),
        ContainerBody::Array(elems) => ContainerBody::Array(
            elems
                .iter()
                .map(|e| Entry::from_value(e.to_value(), next_position))
                .collect(),
        ),
        ContainerBody::Scalar(e) => {
            ContainerBody::Scalar(Entry::from_value(e.to_value(), next_position))
        }
    };
    JsonbContainer {
        data: Arc::new(ContainerData { position, body }),
    }
}

/// Canonical object key order of the binary format: shorter keys first,
/// ties broken bytewise.
fn key_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.as_bytes().cmp(b.as_bytes()))
}

/// Build a fresh single-object document, as used by `.keyvalue()`.
pub(crate) fn build_object(fields: Vec<(String, JsonbValue)>) -> JsonbValue {
    let mut next = 1u64;
    let mut entries: Vec<(String, Entry)> = fields
        .into_iter()
        .map(|(k, v)| (k, Entry::from_value(v, &mut next)))
        .collect();
    entries.sort_by(|(a, _), (b, _)| key_order(a, b));
    JsonbValue::Binary(JsonbContainer {
        data: Arc::new(ContainerData {
            position: 0,
            body: ContainerBody::Object(entries),
        }),
    })
}

/// Build a fresh array document from a sequence of items.
pub(crate) fn build_array(items: Vec<JsonbValue>) -> JsonbValue {
    let mut next = 1u64;
    let elems = items
        .into_iter()
        .map(|v| Entry::from_value(v, &mut next))
        .collect();
    JsonbValue::Binary(JsonbContainer {
        data: Arc::new(ContainerData {
            position: 0,
            body: ContainerBody::Array(elems),
        }),
    })
}

impl Jsonb {
    /// The document as an engine value: a lone scalar is extracted, any
    /// other document becomes a binary handle on the root container.
    pub fn root_value(&self) -> JsonbValue {
        match self.root.scalar() {
            Some(v) => v,
            None => JsonbValue::Binary(self.root.clone()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.root.to_json()
    }
}

impl TryFrom<serde_json::Value> for Jsonb {
    type Error = Error;

    fn try_from(value: serde_json::Value) -> Result<Self, Error> {
        let mut next = 0u64;
        let root = match &value {
            serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                build_from_json(&value, &mut next)?
            }
            _ => {
                let entry = entry_from_json(&value, &mut next)?;
                JsonbContainer {
                    data: Arc::new(ContainerData {
                        position: 0,
                        body: ContainerBody::Scalar(entry),
                    }),
                }
            }
        };
        Ok(Jsonb { root })
    }
}

impl FromStr for Jsonb {
    type Err = Error;

    fn from_str(text: &str) -> Result<Self, Error> {
        let value: serde_json::Value = serde_json::from_str(text).map_err(|e| {
            Error::new(ErrorCode::InvalidDocument, format!("invalid JSON input: {e}"))
        })?;
        Jsonb::try_from(value)
    }
}

fn build_from_json(value: &serde_json::Value, next: &mut u64) -> Result<JsonbContainer, Error> {
    let position = *next;
    *next += 1;
    let body = match value {
        serde_json::Value::Object(map) => {
            let mut pairs = Vec::with_capacity(map.len());
            for (k, v) in map {
                pairs.push((k.clone(), entry_from_json(v, next)?));
            }
            pairs.sort_by(|(a, _), (b, _)| key_order(a, b));
            ContainerBody::Object(pairs)
        }
        serde_json::Value::Array(elems) => {
            let mut out = Vec::with_capacity(elems.len());
            for v in elems {
                out.push(entry_from_json(v, next)?);
            }
            ContainerBody::Array(out)
        }
        _ => unreachable!("scalar passed to container builder"),
    };
    Ok(JsonbContainer {
        data: Arc::new(ContainerData { position, body }),
    })
}

fn entry_from_json(value: &serde_json::Value, next: &mut u64) -> Result<Entry, Error> {
    Ok(match value {
        serde_json::Value::Null => Entry::Null,
        serde_json::Value::Bool(b) => Entry::Bool(*b),
        serde_json::Value::Number(n) => Entry::Numeric(parse_json_number(n)?),
        serde_json::Value::String(s) => Entry::String(s.clone()),
        serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
            Entry::Container(build_from_json(value, next)?)
        }
    })
}

fn parse_json_number(n: &serde_json::Number) -> Result<Decimal, Error> {
    let text = n.to_string();
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .map_err(|_| {
            Error::new(
                ErrorCode::NumericOutOfRange,
                format!("number {text} is out of range for the document number type"),
            )
        })
}

/// Ordered sequence of items with a single-element fast path.
#[derive(Debug, Clone, Default)]
pub struct ValueList {
    items: SmallVec<[JsonbValue; 1]>,
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, value: JsonbValue) {
        self.items.push(value);
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn head(&self) -> Option<&JsonbValue> {
        self.items.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, JsonbValue> {
        self.items.iter()
    }

    pub fn into_vec(self) -> Vec<JsonbValue> {
        self.items.into_vec()
    }
}

impl IntoIterator for ValueList {
    type Item = JsonbValue;
    type IntoIter = smallvec::IntoIter<[JsonbValue; 1]>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.into_iter()
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a JsonbValue;
    type IntoIter = std::slice::Iter<'a, JsonbValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl FromIterator<JsonbValue> for ValueList {
    fn from_iter<T: IntoIterator<Item = JsonbValue>>(iter: T) -> Self {
        ValueList {
            items: iter.into_iter().collect(),
        }
    }
}
