use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, FixedOffset, Local, NaiveDateTime, SecondsFormat, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::debug;
use zbus::zvariant::{OwnedValue, Structure, Value};

// ----- Reserved hint keys -----
pub const HINT_CATEGORY: &str = "category";
pub const HINT_URGENCY: &str = "urgency";
pub const HINT_TRANSIENT: &str = "transient";
pub const HINT_ITEM_COUNT: &str = "x-nemo-item-count";
pub const HINT_TIMESTAMP: &str = "x-nemo-timestamp";
pub const HINT_PREVIEW_BODY: &str = "x-nemo-preview-body";
pub const HINT_PREVIEW_SUMMARY: &str = "x-nemo-preview-summary";
pub const HINT_SUB_TEXT: &str = "x-nemo-sub-text";
pub const HINT_REMOTE_ACTION_PREFIX: &str = "x-nemo-remote-action-";
pub const HINT_REMOTE_ACTION_ICON_PREFIX: &str = "x-nemo-remote-action-icon-";
pub const HINT_REMOTE_ACTION_INPUT_PREFIX: &str = "x-nemo-remote-action-input-";
pub const HINT_REMOTE_ACTION_TYPE_PREFIX: &str = "x-nemo-remote-action-type-";
pub const HINT_ORIGIN: &str = "x-nemo-origin";
pub const HINT_OWNER: &str = "x-nemo-owner";
pub const HINT_MAX_CONTENT_LINES: &str = "x-nemo-max-content-lines";
pub const HINT_PROGRESS: &str = "x-nemo-progress";
pub const HINT_SOUND_FILE: &str = "sound-file";
pub const HINT_SOUND_NAME: &str = "sound-name";
pub const HINT_IMAGE_DATA: &str = "image-data";
pub const HINT_IMAGE_PATH: &str = "image-path";

/// Raw image as carried by the `image-data` hint, `(iiibiiay)` on the wire.
///
/// Pixel layout is left to the producer.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageData {
    pub width: i32,
    pub height: i32,
    pub rowstride: i32,
    pub has_alpha: bool,
    pub bits_per_sample: i32,
    pub channels: i32,
    pub data: Vec<u8>,
}

/// A dynamically typed hint value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HintValue {
    Bool(bool),
    Byte(u8),
    Int(i32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    Bytes(Vec<u8>),
    List(Vec<HintValue>),
    Map(BTreeMap<String, HintValue>),
    Image(ImageData),
}
impl HintValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Lossy conversion to text. Scalars are formatted, containers yield `None`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::DateTime(dt) => Some(format_timestamp(dt)),
            Self::Bool(b) => Some(b.to_string()),
            Self::Byte(v) => Some(v.to_string()),
            Self::Int(v) => Some(v.to_string()),
            Self::UInt(v) => Some(v.to_string()),
            Self::Int64(v) => Some(v.to_string()),
            Self::UInt64(v) => Some(v.to_string()),
            Self::Double(v) => Some(v.to_string()),
            _ => None,
        }
    }

    pub fn to_int(&self) -> Option<i64> {
        match self {
            Self::Bool(b) => Some(i64::from(*b)),
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::UInt(v) => Some(i64::from(*v)),
            Self::Int64(v) => Some(*v),
            Self::UInt64(v) => i64::try_from(*v).ok(),
            Self::Double(v) if v.is_finite() => Some(v.trunc() as i64),
            Self::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn to_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::String(s) => s.trim().parse().ok(),
            other => other.to_int().map(|v| v as f64),
        }
    }

    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            Self::String(s) => match s.trim() {
                "true" | "1" => Some(true),
                "false" | "0" | "" => Some(false),
                _ => None,
            },
            other => other.to_int().map(|v| v != 0),
        }
    }

    pub fn to_datetime(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::DateTime(dt) => Some(*dt),
            Self::String(s) => parse_timestamp(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, HintValue>> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[HintValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn to_string_list(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.iter().filter_map(HintValue::to_text).collect(),
            Self::String(s) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::String(s) => s.is_empty(),
            Self::Bytes(b) => b.is_empty(),
            Self::List(items) => items.is_empty(),
            Self::Map(m) => m.is_empty(),
            _ => false,
        }
    }

    /// Converts into the zvariant value sent over D-Bus.
    ///
    /// Date-times travel as ISO-8601 strings, lists as `av`, maps as `a{sv}`.
    pub fn to_value(&self) -> Value<'static> {
        match self {
            Self::Bool(b) => Value::Bool(*b),
            Self::Byte(v) => Value::U8(*v),
            Self::Int(v) => Value::I32(*v),
            Self::UInt(v) => Value::U32(*v),
            Self::Int64(v) => Value::I64(*v),
            Self::UInt64(v) => Value::U64(*v),
            Self::Double(v) => Value::F64(*v),
            Self::String(s) => Value::from(s.clone()),
            Self::DateTime(dt) => Value::from(format_timestamp(dt)),
            Self::Bytes(b) => Value::from(b.clone()),
            Self::List(items) => Value::from(
                items
                    .iter()
                    .map(HintValue::to_value)
                    .collect::<Vec<Value<'static>>>(),
            ),
            Self::Map(m) => Value::from(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_value()))
                    .collect::<HashMap<String, Value<'static>>>(),
            ),
            Self::Image(img) => Value::Structure(Structure::from((
                img.width,
                img.height,
                img.rowstride,
                img.has_alpha,
                img.bits_per_sample,
                img.channels,
                img.data.clone(),
            ))),
        }
    }

    /// Converts a received zvariant value. File descriptors are not representable.
    pub fn from_value(value: &Value<'_>) -> Option<Self> {
        let hint = match value {
            Value::Bool(b) => Self::Bool(*b),
            Value::U8(v) => Self::Byte(*v),
            Value::I16(v) => Self::Int(i32::from(*v)),
            Value::U16(v) => Self::UInt(u32::from(*v)),
            Value::I32(v) => Self::Int(*v),
            Value::U32(v) => Self::UInt(*v),
            Value::I64(v) => Self::Int64(*v),
            Value::U64(v) => Self::UInt64(*v),
            Value::F64(v) => Self::Double(*v),
            Value::Str(s) => Self::String(s.as_str().to_owned()),
            Value::ObjectPath(p) => Self::String(p.as_str().to_owned()),
            Value::Signature(s) => Self::String(s.to_string()),
            Value::Value(inner) => return Self::from_value(inner),
            Value::Array(array) => {
                let items: Vec<&Value<'_>> = array.iter().collect();
                if !items.is_empty() && items.iter().all(|v| matches!(v, Value::U8(_))) {
                    Self::Bytes(
                        items
                            .into_iter()
                            .filter_map(|v| match v {
                                Value::U8(b) => Some(*b),
                                _ => None,
                            })
                            .collect(),
                    )
                } else {
                    Self::List(items.into_iter().filter_map(Self::from_value).collect())
                }
            }
            Value::Dict(dict) => Self::Map(
                dict.iter()
                    .filter_map(|(k, v)| {
                        let key = Self::from_value(k)?.to_text()?;
                        Some((key, Self::from_value(v)?))
                    })
                    .collect(),
            ),
            Value::Structure(structure) => image_from_fields(structure.fields())
                .map(Self::Image)
                .unwrap_or_else(|| {
                    Self::List(
                        structure
                            .fields()
                            .iter()
                            .filter_map(Self::from_value)
                            .collect(),
                    )
                }),
            _ => {
                debug!("Dropping hint value without a portable representation");
                return None;
            }
        };
        Some(hint)
    }
}

fn image_from_fields(fields: &[Value<'_>]) -> Option<ImageData> {
    match fields {
        [
            Value::I32(width),
            Value::I32(height),
            Value::I32(rowstride),
            Value::Bool(has_alpha),
            Value::I32(bits_per_sample),
            Value::I32(channels),
            Value::Array(data),
        ] => Some(ImageData {
            width: *width,
            height: *height,
            rowstride: *rowstride,
            has_alpha: *has_alpha,
            bits_per_sample: *bits_per_sample,
            channels: *channels,
            data: data
                .iter()
                .filter_map(|v| match v {
                    Value::U8(b) => Some(*b),
                    _ => None,
                })
                .collect(),
        }),
        _ => None,
    }
}

/// Formats a timestamp the way it is stored in the `x-nemo-timestamp` hint.
pub fn format_timestamp(dt: &DateTime<FixedOffset>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Parses an ISO-8601 timestamp. Strings without an offset are taken as local time.
pub fn parse_timestamp(s: &str) -> Option<DateTime<FixedOffset>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt);
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|dt| dt.fixed_offset())
}

impl From<bool> for HintValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}
impl From<u8> for HintValue {
    fn from(value: u8) -> Self {
        Self::Byte(value)
    }
}
impl From<i32> for HintValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}
impl From<u32> for HintValue {
    fn from(value: u32) -> Self {
        Self::UInt(value)
    }
}
impl From<i64> for HintValue {
    fn from(value: i64) -> Self {
        Self::Int64(value)
    }
}
impl From<u64> for HintValue {
    fn from(value: u64) -> Self {
        Self::UInt64(value)
    }
}
impl From<f64> for HintValue {
    fn from(value: f64) -> Self {
        Self::Double(value)
    }
}
impl From<&str> for HintValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}
impl From<String> for HintValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}
impl From<DateTime<FixedOffset>> for HintValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        Self::DateTime(value)
    }
}
impl From<Vec<u8>> for HintValue {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}
impl From<Vec<String>> for HintValue {
    fn from(value: Vec<String>) -> Self {
        Self::List(value.into_iter().map(Self::String).collect())
    }
}
impl From<Vec<HintValue>> for HintValue {
    fn from(value: Vec<HintValue>) -> Self {
        Self::List(value)
    }
}
impl From<BTreeMap<String, HintValue>> for HintValue {
    fn from(value: BTreeMap<String, HintValue>) -> Self {
        Self::Map(value)
    }
}
impl From<ImageData> for HintValue {
    fn from(value: ImageData) -> Self {
        Self::Image(value)
    }
}

/// String-keyed hint map with typed accessors for the reserved keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Hints {
    inner: HashMap<String, HintValue>,
}
impl Hints {
    pub fn new() -> Self {
        Self::default()
    }

    // Getters
    pub fn get(&self, key: &str) -> Option<&HintValue> {
        self.inner.get(key)
    }
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }
    pub fn len(&self) -> usize {
        self.inner.len()
    }
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Text value of `key`, empty when absent or not representable as text.
    pub fn string(&self, key: &str) -> String {
        self.get(key).and_then(HintValue::to_text).unwrap_or_default()
    }
    pub fn int(&self, key: &str) -> i64 {
        self.get(key).and_then(HintValue::to_int).unwrap_or_default()
    }
    pub fn double(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(HintValue::to_double)
    }
    pub fn bool(&self, key: &str) -> bool {
        self.get(key).and_then(HintValue::to_bool).unwrap_or_default()
    }
    pub fn datetime(&self, key: &str) -> Option<DateTime<FixedOffset>> {
        self.get(key).and_then(HintValue::to_datetime)
    }
    pub fn image(&self, key: &str) -> Option<&ImageData> {
        match self.get(key) {
            Some(HintValue::Image(img)) => Some(img),
            _ => None,
        }
    }

    // Inserts
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<HintValue>) -> Option<HintValue> {
        self.inner.insert(key.into(), value.into())
    }
    pub fn remove(&mut self, key: &str) -> Option<HintValue> {
        self.inner.remove(key)
    }
    pub fn extend(&mut self, other: Hints) {
        self.inner.extend(other.inner);
    }

    // Iterators
    pub fn iter(&self) -> impl Iterator<Item = (&String, &HintValue)> {
        self.inner.iter()
    }
    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }

    /// Hints in the shape expected by the `Notify` call.
    pub fn to_wire(&self) -> HashMap<String, Value<'static>> {
        self.inner
            .iter()
            .map(|(k, v)| (k.clone(), v.to_value()))
            .collect()
    }

    /// Builds hints from a received `a{sv}`. Values that cannot be represented are dropped.
    pub fn from_wire(map: &HashMap<String, OwnedValue>) -> Self {
        let inner = map
            .iter()
            .filter_map(|(k, v)| {
                let value = HintValue::from_value(v);
                if value.is_none() {
                    debug!(hint = %k, "Ignoring unsupported hint value");
                }
                value.map(|v| (k.clone(), v))
            })
            .collect();
        Self { inner }
    }
}
impl FromIterator<(String, HintValue)> for Hints {
    fn from_iter<T: IntoIterator<Item = (String, HintValue)>>(iter: T) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}
impl IntoIterator for Hints {
    type Item = (String, HintValue);
    type IntoIter = std::collections::hash_map::IntoIter<String, HintValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.inner.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_keys_read_as_defaults() {
        let hints = Hints::new();
        assert!(hints.get(HINT_CATEGORY).is_none());
        assert_eq!(hints.string(HINT_CATEGORY), "");
        assert_eq!(hints.int(HINT_ITEM_COUNT), 0);
        assert!(!hints.bool(HINT_TRANSIENT));
        assert!(hints.double(HINT_PROGRESS).is_none());
    }

    #[test]
    fn scalar_conversions_are_lenient() {
        let mut hints = Hints::new();
        hints.insert(HINT_ITEM_COUNT, "12");
        hints.insert(HINT_URGENCY, 2u8);
        hints.insert(HINT_TRANSIENT, 1i32);
        hints.insert(HINT_PROGRESS, 3i32);

        assert_eq!(hints.int(HINT_ITEM_COUNT), 12);
        assert_eq!(hints.int(HINT_URGENCY), 2);
        assert!(hints.bool(HINT_TRANSIENT));
        assert_eq!(hints.double(HINT_PROGRESS), Some(3.0));
        assert_eq!(hints.string(HINT_URGENCY), "2");
    }

    #[test]
    fn timestamps_parse_with_and_without_offset() {
        let with_offset = parse_timestamp("2013-02-20T18:21:00+02:00").unwrap();
        assert_eq!(with_offset.offset().local_minus_utc(), 7200);
        assert_eq!(format_timestamp(&with_offset), "2013-02-20T18:21:00+02:00");

        let local = parse_timestamp("2013-02-20T18:21:00").unwrap();
        assert_eq!(local.naive_local().to_string(), "2013-02-20 18:21:00");

        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn datetime_hint_is_sent_as_string() {
        let dt = parse_timestamp("2020-01-01T00:00:00Z").unwrap();
        let value = HintValue::DateTime(dt).to_value();
        assert_eq!(
            HintValue::from_value(&value),
            Some(HintValue::String("2020-01-01T00:00:00Z".into()))
        );
    }

    #[test]
    fn nested_values_survive_wire_conversion() {
        let mut input = BTreeMap::new();
        input.insert("label".to_string(), HintValue::from("Reply"));
        input.insert("editable".to_string(), HintValue::from(true));
        input.insert(
            "choices".to_string(),
            HintValue::from(vec!["Yes".to_string(), "No".to_string()]),
        );
        let original = HintValue::Map(input);

        let value = original.to_value();
        assert_eq!(HintValue::from_value(&value), Some(original));
    }

    #[test]
    fn image_data_survives_wire_conversion() {
        let img = ImageData {
            width: 1,
            height: 1,
            rowstride: 4,
            has_alpha: true,
            bits_per_sample: 8,
            channels: 4,
            data: vec![1, 2, 3, 4],
        };
        let value = HintValue::Image(img.clone()).to_value();
        assert_eq!(HintValue::from_value(&value), Some(HintValue::Image(img)));
    }

    #[test]
    fn from_wire_keeps_unknown_keys() {
        let mut map = HashMap::new();
        map.insert(
            "x-custom".to_string(),
            OwnedValue::try_from(Value::from("opaque")).unwrap(),
        );
        map.insert(
            HINT_URGENCY.to_string(),
            OwnedValue::try_from(Value::U8(2)).unwrap(),
        );

        let hints = Hints::from_wire(&map);
        assert_eq!(hints.get("x-custom"), Some(&HintValue::from("opaque")));
        assert_eq!(hints.int(HINT_URGENCY), 2);
    }
}
