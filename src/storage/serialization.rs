/// Serialization handler
///
/// Hosts sometimes store values that are already serialized blobs in the classic
/// length-prefixed grammar (`a:1:{i:0;s:3:"foo";}`). Writing them verbatim would make
/// row files unreadable, so on write they are decomposed into a JSON tree wrapped in a
/// `{ "value": .., "_serialized": true }` envelope, and on read the exact original
/// string is regenerated.
///
/// Only a fixed set of shapes is understood: scalars, arrays (integer or string keys)
/// and object records whose class is on the allow-list. Anything else, including any
/// value that would not re-encode byte-for-byte, is stored as the original string.

use crate::core::{DatabaseError, Value};
use nom::{
    branch::alt,
    bytes::complete::{tag, take, take_while1},
    character::complete::{char, digit1, one_of},
    combinator::{map, map_res, opt, recognize, value},
    sequence::{delimited, pair, terminated},
    IResult,
};
use std::collections::HashSet;

pub const SERIALIZED_MARKER: &str = "_serialized";
const ENVELOPE_VALUE: &str = "value";
const CLASS_KEY: &str = "_class";
const FIELDS_KEY: &str = "_fields";

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayKey {
    Int(i64),
    Str(String),
}

/// A decoded serialized value.
///
/// Hosts that want a structured value persisted build one of these explicitly and
/// store `encode()`; nothing is reconstructed by reflection.
#[derive(Debug, Clone, PartialEq)]
pub enum SerializedValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<(ArrayKey, SerializedValue)>),
    Object {
        class: String,
        fields: Vec<(String, SerializedValue)>,
    },
}

type Input<'a> = &'a [u8];

fn integer(input: Input) -> IResult<Input, i64> {
    map_res(recognize(pair(opt(one_of("+-")), digit1)), |b: Input| {
        std::str::from_utf8(b)
            .map_err(|_| ())
            .and_then(|s| s.parse::<i64>().map_err(|_| ()))
    })(input)
}

fn length(input: Input) -> IResult<Input, usize> {
    map_res(digit1, |b: Input| {
        std::str::from_utf8(b)
            .map_err(|_| ())
            .and_then(|s| s.parse::<usize>().map_err(|_| ()))
    })(input)
}

fn float(input: Input) -> IResult<Input, f64> {
    map_res(take_while1(|c| c != b';'), |b: Input| {
        match std::str::from_utf8(b).map_err(|_| ())? {
            "INF" => Ok(f64::INFINITY),
            "-INF" => Ok(f64::NEG_INFINITY),
            "NAN" => Ok(f64::NAN),
            s => s.parse::<f64>().map_err(|_| ()),
        }
    })(input)
}

/// `<len>:"<bytes>"` where len counts bytes.
fn counted_string(input: Input) -> IResult<Input, String> {
    let (input, len) = length(input)?;
    let (input, _) = tag(":\"")(input)?;
    let (input, bytes) = map_res(take(len), |b: Input| std::str::from_utf8(b).map(str::to_string))(input)?;
    let (input, _) = char('"')(input)?;
    Ok((input, bytes))
}

fn string_value(input: Input) -> IResult<Input, String> {
    delimited(tag("s:"), counted_string, char(';'))(input)
}

fn array_key(input: Input) -> IResult<Input, ArrayKey> {
    alt((
        map(delimited(tag("i:"), integer, char(';')), ArrayKey::Int),
        map(string_value, ArrayKey::Str),
    ))(input)
}

fn array(input: Input) -> IResult<Input, SerializedValue> {
    let (mut input, n) = delimited(tag("a:"), length, tag(":{"))(input)?;
    let mut entries = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        let (rest, key) = array_key(input)?;
        let (rest, item) = serialized(rest)?;
        entries.push((key, item));
        input = rest;
    }
    let (input, _) = char('}')(input)?;
    Ok((input, SerializedValue::Array(entries)))
}

fn object(input: Input) -> IResult<Input, SerializedValue> {
    let (input, class) = delimited(tag("O:"), counted_string, char(':'))(input)?;
    let (mut input, n) = terminated(length, tag(":{"))(input)?;
    let mut fields = Vec::with_capacity(n.min(1024));
    for _ in 0..n {
        let (rest, name) = string_value(input)?;
        let (rest, item) = serialized(rest)?;
        fields.push((name, item));
        input = rest;
    }
    let (input, _) = char('}')(input)?;
    Ok((input, SerializedValue::Object { class, fields }))
}

fn serialized(input: Input) -> IResult<Input, SerializedValue> {
    alt((
        value(SerializedValue::Null, tag("N;")),
        map(
            delimited(tag("b:"), alt((value(true, char('1')), value(false, char('0')))), char(';')),
            SerializedValue::Bool,
        ),
        map(delimited(tag("i:"), integer, char(';')), SerializedValue::Int),
        map(delimited(tag("d:"), float, char(';')), SerializedValue::Float),
        map(string_value, SerializedValue::Str),
        array,
        object,
    ))(input)
}

fn format_float(f: f64) -> String {
    if f.is_nan() {
        "NAN".to_string()
    } else if f.is_infinite() {
        if f > 0.0 { "INF" } else { "-INF" }.to_string()
    } else {
        format!("{f}")
    }
}

impl SerializedValue {
    /// Parses a complete serialized string; trailing input is an error.
    pub fn parse(input: &str) -> Result<Self, DatabaseError> {
        match serialized(input.as_bytes()) {
            Ok((rest, value)) if rest.is_empty() => Ok(value),
            Ok((rest, _)) => Err(DatabaseError::ParseError(format!(
                "{} trailing bytes after serialized value",
                rest.len()
            ))),
            Err(e) => Err(DatabaseError::ParseError(format!("not a serialized value: {e:?}"))),
        }
    }

    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        self.encode_into(&mut out);
        out
    }

    fn encode_into(&self, out: &mut String) {
        match self {
            Self::Null => out.push_str("N;"),
            Self::Bool(b) => out.push_str(if *b { "b:1;" } else { "b:0;" }),
            Self::Int(i) => out.push_str(&format!("i:{i};")),
            Self::Float(f) => out.push_str(&format!("d:{};", format_float(*f))),
            Self::Str(s) => out.push_str(&format!("s:{}:\"{s}\";", s.len())),
            Self::Array(entries) => {
                out.push_str(&format!("a:{}:{{", entries.len()));
                for (key, item) in entries {
                    match key {
                        ArrayKey::Int(i) => out.push_str(&format!("i:{i};")),
                        ArrayKey::Str(s) => out.push_str(&format!("s:{}:\"{s}\";", s.len())),
                    }
                    item.encode_into(out);
                }
                out.push('}');
            }
            Self::Object { class, fields } => {
                out.push_str(&format!("O:{}:\"{class}\":{}:{{", class.len(), fields.len()));
                for (name, item) in fields {
                    out.push_str(&format!("s:{}:\"{name}\";", name.len()));
                    item.encode_into(out);
                }
                out.push('}');
            }
        }
    }

    /// JSON tree for this value, or `None` if it contains a class outside `allowed`.
    fn to_tree(&self, allowed: &HashSet<String>) -> Option<serde_json::Value> {
        Some(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(f) => serde_json::Value::Number(serde_json::Number::from_f64(*f)?),
            Self::Str(s) => serde_json::Value::String(s.clone()),
            Self::Array(entries) => {
                let is_list = entries
                    .iter()
                    .enumerate()
                    .all(|(idx, (key, _))| matches!(key, ArrayKey::Int(k) if usize::try_from(*k).ok() == Some(idx)));
                if is_list {
                    serde_json::Value::Array(
                        entries.iter().map(|(_, v)| v.to_tree(allowed)).collect::<Option<_>>()?,
                    )
                } else {
                    let mut map = serde_json::Map::new();
                    for (key, item) in entries {
                        let key = match key {
                            ArrayKey::Int(i) => i.to_string(),
                            ArrayKey::Str(s) => s.clone(),
                        };
                        map.insert(key, item.to_tree(allowed)?);
                    }
                    serde_json::Value::Object(map)
                }
            }
            Self::Object { class, fields } => {
                if !allowed.contains(class) {
                    return None;
                }
                let mut map = serde_json::Map::new();
                for (name, item) in fields {
                    map.insert(name.clone(), item.to_tree(allowed)?);
                }
                let mut record = serde_json::Map::new();
                record.insert(CLASS_KEY.to_string(), serde_json::Value::String(class.clone()));
                record.insert(FIELDS_KEY.to_string(), serde_json::Value::Object(map));
                serde_json::Value::Object(record)
            }
        })
    }

    fn from_tree(tree: &serde_json::Value) -> Self {
        match tree {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::Array(
                items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| (ArrayKey::Int(idx as i64), Self::from_tree(item)))
                    .collect(),
            ),
            serde_json::Value::Object(map) => {
                if let (2, Some(serde_json::Value::String(class)), Some(serde_json::Value::Object(fields))) =
                    (map.len(), map.get(CLASS_KEY), map.get(FIELDS_KEY))
                {
                    return Self::Object {
                        class: class.clone(),
                        fields: fields.iter().map(|(k, v)| (k.clone(), Self::from_tree(v))).collect(),
                    };
                }
                Self::Array(
                    map.iter()
                        .map(|(key, item)| {
                            let key = match key.parse::<i64>() {
                                Ok(i) if i.to_string() == *key => ArrayKey::Int(i),
                                _ => ArrayKey::Str(key.clone()),
                            };
                            (key, Self::from_tree(item))
                        })
                        .collect(),
                )
            }
        }
    }
}

/// Converts values between their in-memory form and the stored JSON form.
#[derive(Debug, Clone)]
pub struct SerializationHandler {
    allowed_classes: HashSet<String>,
}

impl Default for SerializationHandler {
    fn default() -> Self {
        Self::new(["stdClass".to_string()])
    }
}

impl SerializationHandler {
    pub fn new(allowed_classes: impl IntoIterator<Item = String>) -> Self {
        Self {
            allowed_classes: allowed_classes.into_iter().collect(),
        }
    }

    /// Strict check: the whole string must be one serialized value.
    #[must_use]
    pub fn is_serialized(s: &str) -> bool {
        let bytes = s.as_bytes();
        if bytes.len() < 2 || !matches!(bytes[0], b'N' | b'b' | b'i' | b'd' | b's' | b'a' | b'O') {
            return false;
        }
        matches!(serialized(bytes), Ok((rest, _)) if rest.is_empty())
    }

    /// Envelope for a serialized string, or the string itself when it cannot be
    /// decomposed faithfully.
    #[must_use]
    pub fn to_json(&self, s: &str) -> serde_json::Value {
        let opaque = || serde_json::Value::String(s.to_string());
        let Ok(parsed) = SerializedValue::parse(s) else {
            return opaque();
        };
        let Some(tree) = parsed.to_tree(&self.allowed_classes) else {
            tracing::debug!("serialized value kept opaque: class not allowed or non-finite float");
            return opaque();
        };
        if SerializedValue::from_tree(&tree).encode() != s {
            tracing::debug!("serialized value kept opaque: not reproducible from its tree");
            return opaque();
        }

        let mut envelope = serde_json::Map::new();
        envelope.insert(ENVELOPE_VALUE.to_string(), tree);
        envelope.insert(SERIALIZED_MARKER.to_string(), serde_json::Value::Bool(true));
        serde_json::Value::Object(envelope)
    }

    /// Regenerates the serialized string from an envelope; `None` for any other JSON.
    #[must_use]
    pub fn from_json(json: &serde_json::Value) -> Option<String> {
        let map = json.as_object()?;
        if map.len() != 2 || map.get(SERIALIZED_MARKER) != Some(&serde_json::Value::Bool(true)) {
            return None;
        }
        map.get(ENVELOPE_VALUE).map(|tree| SerializedValue::from_tree(tree).encode())
    }

    /// Stored form of a column value.
    #[must_use]
    pub fn encode_value(&self, value: &Value) -> serde_json::Value {
        match value {
            Value::Text(s) if Self::is_serialized(s) => self.to_json(s),
            other => other.to_json(),
        }
    }

    /// In-memory form of a stored column value.
    #[must_use]
    pub fn decode_value(json: &serde_json::Value) -> Value {
        Self::from_json(json).map_or_else(|| Value::from_json(json), Value::Text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn handler() -> SerializationHandler {
        SerializationHandler::default()
    }

    fn round_trip(s: &str) -> String {
        SerializationHandler::from_json(&handler().to_json(s)).unwrap_or_else(|| {
            handler().to_json(s).as_str().map(str::to_string).unwrap()
        })
    }

    #[test]
    fn test_is_serialized() {
        assert!(SerializationHandler::is_serialized("N;"));
        assert!(SerializationHandler::is_serialized("b:1;"));
        assert!(SerializationHandler::is_serialized("i:-42;"));
        assert!(SerializationHandler::is_serialized("d:0.5;"));
        assert!(SerializationHandler::is_serialized("s:5:\"hello\";"));
        assert!(SerializationHandler::is_serialized("a:2:{i:0;s:1:\"a\";i:1;b:0;}"));
        assert!(SerializationHandler::is_serialized("O:8:\"stdClass\":1:{s:1:\"x\";i:1;}"));

        assert!(!SerializationHandler::is_serialized("hello"));
        assert!(!SerializationHandler::is_serialized("s:5:\"hell\";"));
        assert!(!SerializationHandler::is_serialized("i:1;extra"));
        assert!(!SerializationHandler::is_serialized(""));
    }

    #[test]
    fn test_envelope_shape() {
        let json = handler().to_json("a:2:{s:4:\"name\";s:3:\"Bob\";s:4:\"tags\";a:2:{i:0;s:1:\"x\";i:1;s:1:\"y\";}}");
        assert_eq!(
            json,
            json!({"value": {"name": "Bob", "tags": ["x", "y"]}, "_serialized": true})
        );
    }

    #[test]
    fn test_round_trip_is_exact() {
        let samples = [
            "N;",
            "b:0;",
            "i:123;",
            "d:1.5;",
            "d:2;",
            "s:0:\"\";",
            "s:6:\"héllo\";",
            "s:7:\"a\"b;c:d\";",
            "a:0:{}",
            "a:3:{i:0;i:1;i:1;i:2;i:2;i:3;}",
            "a:2:{i:5;s:1:\"a\";i:9;s:1:\"b\";}",
            "a:1:{s:13:\"administrator\";b:1;}",
            "a:1:{s:1:\"7\";i:1;}",
            "O:8:\"stdClass\":2:{s:1:\"a\";i:1;s:1:\"b\";a:1:{i:0;N;}}",
            "O:7:\"WP_User\":1:{s:2:\"ID\";i:1;}",
            "d:1.0E+25;",
            "d:INF;",
        ];
        for s in samples {
            assert_eq!(round_trip(s), s, "sample {s}");
        }
    }

    #[test]
    fn test_disallowed_class_stays_opaque() {
        let s = "a:1:{i:0;O:7:\"WP_User\":1:{s:2:\"ID\";i:1;}}";
        assert_eq!(handler().to_json(s), json!(s));

        let permissive = SerializationHandler::new(["WP_User".to_string()]);
        let json = permissive.to_json(s);
        assert_eq!(json["value"][0]["_class"], json!("WP_User"));
        assert_eq!(SerializationHandler::from_json(&json).unwrap(), s);
    }

    #[test]
    fn test_ambiguous_string_key_stays_opaque() {
        // "7" as a string key would come back as integer key 7
        assert_eq!(handler().to_json("a:1:{s:1:\"7\";i:1;}"), json!("a:1:{s:1:\"7\";i:1;}"));
    }

    #[test]
    fn test_value_encoding() {
        let h = handler();
        let stored = h.encode_value(&Value::from("a:1:{i:0;s:1:\"x\";}"));
        assert_eq!(stored, json!({"value": ["x"], "_serialized": true}));
        assert_eq!(
            SerializationHandler::decode_value(&stored),
            Value::from("a:1:{i:0;s:1:\"x\";}")
        );

        assert_eq!(h.encode_value(&Value::from("plain")), json!("plain"));
        assert_eq!(h.encode_value(&Value::Integer(3)), json!(3));
        assert_eq!(SerializationHandler::decode_value(&json!({"other": 1})), Value::Text("{\"other\":1}".into()));
    }

    #[test]
    fn test_explicit_host_value() {
        let value = SerializedValue::Object {
            class: "stdClass".to_string(),
            fields: vec![("count".to_string(), SerializedValue::Int(2))],
        };
        let encoded = value.encode();
        assert_eq!(encoded, "O:8:\"stdClass\":1:{s:5:\"count\";i:2;}");
        assert_eq!(SerializedValue::parse(&encoded).unwrap(), value);
    }
}
