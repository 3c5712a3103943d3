//! Core types and constants for the PTL compiler

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Compiled artifact format version, stored with every persisted template.
pub const ARTIFACT_VERSION: u32 = 1;

/// Default bound on markup nesting depth. Adversarial input must not drive
/// unbounded recursion in the parser or renderer.
pub const MAX_NESTING_DEPTH: usize = 32;

/// Default bound on raw source length in bytes.
pub const MAX_SOURCE_LEN: usize = 256 * 1024;

/// Maximum number of actions under a single trigger.
pub const MAX_ACTIONS_PER_HANDLER: usize = 64;

/// A runtime value flowing through expressions, variables and the renderer.
///
/// `Empty` is the defined "missing" sentinel: undefined paths, failed finds
/// and uninitialized lookups all resolve to it instead of raising. It renders
/// as the empty string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
}

impl Value {
    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    /// Truthiness for conditional branches: Empty, false, 0, "" and [] are
    /// falsy; everything else is truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Empty => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::Array(items) => !items.is_empty(),
            Value::Object(_) => true,
        }
    }

    /// Numeric view used by arithmetic and Sum: non-numeric values are None.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Field access on objects; anything else yields Empty.
    pub fn field(&self, name: &str) -> Value {
        match self {
            Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Empty),
            _ => Value::Empty,
        }
    }

    /// Index access on arrays (also accepts string keys against objects).
    pub fn index(&self, key: &Value) -> Value {
        match (self, key) {
            (Value::Array(items), Value::Number(n)) => {
                if *n < 0.0 || n.fract() != 0.0 {
                    return Value::Empty;
                }
                items.get(*n as usize).cloned().unwrap_or(Value::Empty)
            }
            (Value::Object(map), Value::String(k)) => {
                map.get(k).cloned().unwrap_or(Value::Empty)
            }
            _ => Value::Empty,
        }
    }

    /// String form used by interpolation output. Whole numbers print without
    /// a trailing `.0`.
    pub fn render_string(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|v| v.render_string())
                .collect::<Vec<_>>()
                .join(", "),
            Value::Object(_) => "[object]".to_string(),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render_string())
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Empty,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(items) => {
                Value::Array(items.into_iter().map(Value::from).collect())
            }
            serde_json::Value::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from(v))).collect(),
            ),
        }
    }
}

pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{}", n)
    }
}

/// Declared type of a page variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VarType {
    String,
    Number,
    Boolean,
    Array,
}

impl VarType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(VarType::String),
            "number" => Some(VarType::Number),
            "boolean" => Some(VarType::Boolean),
            "array" => Some(VarType::Array),
            _ => None,
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Empty) => true,
            (VarType::String, Value::String(_)) => true,
            (VarType::Number, Value::Number(_)) => true,
            (VarType::Boolean, Value::Bool(_)) => true,
            (VarType::Array, Value::Array(_)) => true,
            _ => false,
        }
    }
}

impl fmt::Display for VarType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            VarType::String => "string",
            VarType::Number => "number",
            VarType::Boolean => "boolean",
            VarType::Array => "array",
        };
        write!(f, "{}", name)
    }
}

/// Path from the tree root to a node: child indices at each level.
pub type NodePath = Vec<usize>;

/// One interactive region of a compiled template.
///
/// The island owns a contiguous subtree (rooted at `path`), the variable
/// names its rendering reads, and the handler ids living inside it. Nodes
/// outside every island are static and never re-render after first paint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Island {
    pub id: usize,
    pub path: NodePath,
    pub variables: BTreeSet<String>,
    pub handlers: Vec<usize>,
}

/// The persisted compilation artifact. Immutable once stored; editing a
/// template produces a new artifact with a new fingerprint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub version: u32,
    pub tree: Vec<crate::ast::Node>,
    pub islands: Vec<Island>,
    pub source_text: String,
    pub fingerprint: String,
    pub compiled_at: u64,
}

impl CompiledTemplate {
    pub fn new(tree: Vec<crate::ast::Node>, islands: Vec<Island>, source_text: String) -> Self {
        let fingerprint = source_fingerprint(&source_text);
        let compiled_at = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Self {
            version: ARTIFACT_VERSION,
            tree,
            islands,
            source_text,
            fingerprint,
            compiled_at,
        }
    }
}

/// Content identity of a template source, used to detect unchanged edits and
/// to key caches.
pub fn source_fingerprint(source: &str) -> String {
    hex::encode(md5::compute(source.as_bytes()).0)
}
