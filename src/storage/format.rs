/// Physical encodings for a single stored document.
///
/// Every file the engine writes (a row, a schema, a meta record, an index) is one
/// JSON-shaped mapping. `Json` writes it pretty-printed for humans and version
/// control; `Binary` writes a bincode image of the same tree, which loads faster
/// but is opaque to other tools. Both round-trip the same logical mapping.

use crate::core::DatabaseError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// The logical content of one file.
pub type Document = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    #[default]
    Json,
    Binary,
}

impl FileFormat {
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Binary => "bin",
        }
    }
}

/// bincode cannot drive `serde_json::Value` (it needs `deserialize_any`),
/// so the binary encoding goes through this explicit tree.
#[derive(Debug, Serialize, Deserialize)]
enum Node {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Str(String),
    List(Vec<Node>),
    Map(Vec<(String, Node)>),
}

impl From<&serde_json::Value> for Node {
    fn from(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_u64().map(Self::UInt))
                .unwrap_or_else(|| Self::Float(n.as_f64().unwrap_or_default())),
            serde_json::Value::String(s) => Self::Str(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from).collect()),
            serde_json::Value::Object(map) => {
                Self::Map(map.iter().map(|(k, v)| (k.clone(), Self::from(v))).collect())
            }
        }
    }
}

impl From<Node> for serde_json::Value {
    fn from(node: Node) -> Self {
        match node {
            Node::Null => Self::Null,
            Node::Bool(b) => Self::Bool(b),
            Node::Int(i) => Self::from(i),
            Node::UInt(u) => Self::from(u),
            Node::Float(f) => serde_json::Number::from_f64(f).map_or(Self::Null, Self::Number),
            Node::Str(s) => Self::String(s),
            Node::List(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Node::Map(entries) => {
                Self::Object(entries.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FormatHandler {
    format: FileFormat,
}

impl FormatHandler {
    #[must_use]
    pub const fn new(format: FileFormat) -> Self {
        Self { format }
    }

    #[must_use]
    pub const fn format(&self) -> FileFormat {
        self.format
    }

    #[must_use]
    pub const fn extension(&self) -> &'static str {
        self.format.extension()
    }

    /// `<dir>/<stem>.<ext>`, with the stem made safe for use as a file name.
    #[must_use]
    pub fn path_for(&self, dir: &Path, stem: &str) -> PathBuf {
        dir.join(format!("{}.{}", encode_stem(stem), self.extension()))
    }

    /// Reads one document. A missing file is `Ok(None)`.
    pub fn read(&self, path: &Path) -> Result<Option<Document>, DatabaseError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let value = match self.format {
            FileFormat::Json => serde_json::from_slice::<serde_json::Value>(&bytes)?,
            FileFormat::Binary => serde_json::Value::from(bincode::deserialize::<Node>(&bytes)?),
        };

        match value {
            serde_json::Value::Object(map) => Ok(Some(map)),
            other => Err(DatabaseError::Storage(format!(
                "{} does not contain a mapping (found {})",
                path.display(),
                json_kind(&other)
            ))),
        }
    }

    /// Writes one document, creating parent directories as needed.
    pub fn write(&self, path: &Path, document: &Document) -> Result<(), DatabaseError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let bytes = match self.format {
            FileFormat::Json => {
                let mut out = serde_json::to_vec_pretty(document)?;
                out.push(b'\n');
                out
            }
            FileFormat::Binary => {
                let node = Node::Map(document.iter().map(|(k, v)| (k.clone(), Node::from(v))).collect());
                bincode::serialize(&node)?
            }
        };
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn read_as<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>, DatabaseError> {
        self.read(path)?
            .map(|doc| serde_json::from_value(serde_json::Value::Object(doc)))
            .transpose()
            .map_err(DatabaseError::from)
    }

    pub fn write_as<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), DatabaseError> {
        match serde_json::to_value(value)? {
            serde_json::Value::Object(doc) => self.write(path, &doc),
            other => Err(DatabaseError::Storage(format!(
                "refusing to write {} to {}: not a mapping",
                json_kind(&other),
                path.display()
            ))),
        }
    }

    /// Deletes a file. Returns false if it did not exist.
    pub fn remove(&self, path: &Path) -> Result<bool, DatabaseError> {
        match fs::remove_file(path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Decoded stems of every file in `dir` carrying this format's extension.
    pub fn list_stems(&self, dir: &Path) -> Result<Vec<String>, DatabaseError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut stems = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(self.extension()) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                stems.push(decode_stem(stem));
            }
        }
        stems.sort();
        Ok(stems)
    }
}

const fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "an array",
        serde_json::Value::Object(_) => "a mapping",
    }
}

/// Percent-encodes every byte outside `[A-Za-z0-9_.-]` (and a leading dot).
#[must_use]
pub fn encode_stem(stem: &str) -> String {
    let mut out = String::with_capacity(stem.len());
    for (i, byte) in stem.bytes().enumerate() {
        let safe = byte.is_ascii_alphanumeric() || byte == b'_' || byte == b'-' || (byte == b'.' && i > 0);
        if safe {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    if out.is_empty() {
        out.push_str("%00");
    }
    out
}

#[must_use]
pub fn decode_stem(stem: &str) -> String {
    if stem == "%00" {
        return String::new();
    }
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let decoded = std::str::from_utf8(&bytes[i + 1..i + 3])
                .ok()
                .and_then(|hex| u8::from_str_radix(hex, 16).ok());
            if let Some(byte) = decoded {
                out.push(byte);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
