//! Statement AST consumed by the binder.
//!
//! The textual grammar lives elsewhere; this module only describes the parsed
//! shape. Every node is serde-(de)serializable so statements can be carried in
//! JSON or YAML configuration as-is:
//!
//! ```json
//! {
//!   "function": "delete_key",
//!   "arguments": [
//!     {"path": {"fields": ["attributes"]}},
//!     {"string": "http.request.header.authorization"}
//!   ],
//!   "where": {"compare": {"left": {"path": {"fields": ["name"]}}, "op": "eq", "right": {"string": "GET"}}}
//! }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// One statement: a function invocation with an optional guard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementAst {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentAst>,
    #[serde(default, rename = "where", skip_serializing_if = "Option::is_none")]
    pub condition: Option<ConditionAst>,
}

impl StatementAst {
    pub fn new(function: impl Into<String>, arguments: Vec<ArgumentAst>) -> Self {
        Self {
            function: function.into(),
            arguments,
            condition: None,
        }
    }

    pub fn with_condition(mut self, condition: ConditionAst) -> Self {
        self.condition = Some(condition);
        self
    }
}

impl fmt::Display for StatementAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_call(f, &self.function, &self.arguments)?;
        if let Some(condition) = &self.condition {
            write!(f, " where {condition}")?;
        }
        Ok(())
    }
}

/// A function argument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgumentAst {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    String(String),
    List(Vec<ArgumentAst>),
    Path(PathAst),
    Call(CallAst),
}

impl ArgumentAst {
    pub fn path(path: PathAst) -> Self {
        ArgumentAst::Path(path)
    }

    pub fn string(s: impl Into<String>) -> Self {
        ArgumentAst::String(s.into())
    }

    pub fn call(function: impl Into<String>, arguments: Vec<ArgumentAst>) -> Self {
        ArgumentAst::Call(CallAst {
            function: function.into(),
            arguments,
        })
    }

    pub(crate) fn describe(&self) -> &'static str {
        match self {
            ArgumentAst::Nil => "nil",
            ArgumentAst::Bool(_) => "bool literal",
            ArgumentAst::Int(_) => "int literal",
            ArgumentAst::Double(_) => "double literal",
            ArgumentAst::String(_) => "string literal",
            ArgumentAst::List(_) => "list",
            ArgumentAst::Path(_) => "path",
            ArgumentAst::Call(_) => "function call",
        }
    }
}

impl From<&str> for ArgumentAst {
    fn from(s: &str) -> Self {
        ArgumentAst::String(s.to_string())
    }
}

impl From<PathAst> for ArgumentAst {
    fn from(path: PathAst) -> Self {
        ArgumentAst::Path(path)
    }
}

impl fmt::Display for ArgumentAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgumentAst::Nil => f.write_str("nil"),
            ArgumentAst::Bool(b) => write!(f, "{b}"),
            ArgumentAst::Int(i) => write!(f, "{i}"),
            ArgumentAst::Double(d) => write!(f, "{d}"),
            ArgumentAst::String(s) => write!(f, "{s:?}"),
            ArgumentAst::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            ArgumentAst::Path(path) => write!(f, "{path}"),
            ArgumentAst::Call(call) => write_call(f, &call.function, &call.arguments),
        }
    }
}

/// A nested function call used as an argument value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallAst {
    pub function: String,
    #[serde(default)]
    pub arguments: Vec<ArgumentAst>,
}

/// Dot-separated field segments followed by optional key selectors,
/// e.g. `resource.attributes["host.name"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathAst {
    pub fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<Key>,
}

impl PathAst {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            keys: Vec::new(),
        }
    }

    /// Appends a key selector.
    pub fn key(mut self, key: impl Into<Key>) -> Self {
        self.keys.push(key.into());
        self
    }

    /// The dotted field name without key selectors.
    pub fn name(&self) -> String {
        self.fields.join(".")
    }
}

impl fmt::Display for PathAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())?;
        for key in &self.keys {
            write!(f, "{key}")?;
        }
        Ok(())
    }
}

/// A map key or slice index selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Key {
    String(String),
    Int(i64),
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key::String(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key::String(s)
    }
}

impl From<i64> for Key {
    fn from(i: i64) -> Self {
        Key::Int(i)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::String(s) => write!(f, "[{s:?}]"),
            Key::Int(i) => write!(f, "[{i}]"),
        }
    }
}

/// Guard expression attached to a statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionAst {
    Compare {
        left: ArgumentAst,
        op: CompareOp,
        right: ArgumentAst,
    },
    And(Vec<ConditionAst>),
    Or(Vec<ConditionAst>),
    Not(Box<ConditionAst>),
    /// A bare argument that must evaluate to a boolean.
    Value(ArgumentAst),
}

impl ConditionAst {
    pub fn compare(left: impl Into<ArgumentAst>, op: CompareOp, right: impl Into<ArgumentAst>) -> Self {
        ConditionAst::Compare {
            left: left.into(),
            op,
            right: right.into(),
        }
    }
}

impl fmt::Display for ConditionAst {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionAst::Compare { left, op, right } => write!(f, "{left} {op} {right}"),
            ConditionAst::And(items) => write_joined(f, items, " and "),
            ConditionAst::Or(items) => write_joined(f, items, " or "),
            ConditionAst::Not(inner) => write!(f, "not ({inner})"),
            ConditionAst::Value(arg) => write!(f, "{arg}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    #[serde(alias = "==")]
    Eq,
    #[serde(alias = "!=")]
    Ne,
    #[serde(alias = "<")]
    Lt,
    #[serde(alias = "<=")]
    Le,
    #[serde(alias = ">")]
    Gt,
    #[serde(alias = ">=")]
    Ge,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        })
    }
}

fn write_call(f: &mut fmt::Formatter<'_>, function: &str, arguments: &[ArgumentAst]) -> fmt::Result {
    write!(f, "{function}(")?;
    for (i, arg) in arguments.iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{arg}")?;
    }
    f.write_str(")")
}

fn write_joined(f: &mut fmt::Formatter<'_>, items: &[ConditionAst], sep: &str) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "({item})")?;
    }
    Ok(())
}
