//! Value codec
//!
//! MycoKV stores strings, numbers, booleans and null. On the wire a string
//! is wrapped in double quotes, everything else is a bare literal. Wildcard
//! reads come back as a JSON tree of those values.

use crate::error::ValueTypeError;
use crate::protocol::trim_line;
use nom::{
    character::complete::{char, digit1},
    combinator::{all_consuming, opt, recognize},
    sequence::{pair, tuple},
    IResult,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Reserved child key holding the value of a node that also has children
pub const NODE_VALUE_KEY: &str = "_";

/// A single stored value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

/// One level of a wildcard result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Node {
    Value(Value),
    Branch(Tree),
}

pub type Tree = BTreeMap<String, Node>;

/// Outcome of decoding a wildcard response
#[derive(Debug, Clone, PartialEq)]
pub enum Nested {
    Tree(Tree),
    /// The response was not a JSON object; kept verbatim
    Raw(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n.into())
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Int(n.into())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Float(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl TryFrom<serde_json::Value> for Value {
    type Error = ValueTypeError;

    fn try_from(json: serde_json::Value) -> Result<Self, Self::Error> {
        match json {
            serde_json::Value::Null => Ok(Value::Null),
            serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
            serde_json::Value::String(s) => Ok(Value::String(s)),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| ValueTypeError::unsupported(&n)),
            },
            other => Err(ValueTypeError::unsupported(other)),
        }
    }
}

/// Encode a value into its wire form
///
/// Strings are quoted but not escaped, so an embedded `"` is sent as is.
/// Line terminators would split the command frame and are rejected.
pub fn encode_value(value: &Value) -> Result<String, ValueTypeError> {
    match value {
        Value::Null => Ok("null".to_string()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Int(n) => Ok(n.to_string()),
        Value::Float(n) => {
            if !n.is_finite() {
                return Err(ValueTypeError::new(
                    n,
                    "MycoKV numbers must be finite.",
                ));
            }
            let text = n.to_string();
            if text.contains('.') {
                Ok(text)
            } else {
                Ok(format!("{}.0", text))
            }
        }
        Value::String(s) => {
            if s.contains(|c| c == '\n' || c == '\r') {
                return Err(ValueTypeError::new(
                    s,
                    "MycoKV strings may not contain line breaks.",
                ));
            }
            Ok(format!("\"{}\"", s))
        }
    }
}

/// Decode a response line into a value
///
/// Precedence: `null`, booleans, integers, decimals, then anything else is
/// a string with one surrounding pair of quotes removed.
pub fn decode_value(raw: &str) -> Value {
    let text = trim_line(raw);
    match text {
        "null" => return Value::Null,
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        _ => {}
    }

    if let Ok((_, digits)) = all_consuming(integer)(text) {
        return match digits.parse::<i64>() {
            Ok(n) => Value::Int(n),
            Err(_) => digits
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::String(digits.to_string())),
        };
    }

    if let Ok((_, digits)) = all_consuming(decimal)(text) {
        if let Ok(n) = digits.parse::<f64>() {
            return Value::Float(n);
        }
    }

    Value::String(unquote(text).to_string())
}

/// Decode a wildcard response, keeping the raw text when it is not a tree
pub fn decode_nested(raw: &str) -> Nested {
    let text = trim_line(raw);
    match serde_json::from_str::<Tree>(text) {
        Ok(tree) => Nested::Tree(tree),
        Err(_) => Nested::Raw(text.to_string()),
    }
}

fn integer(input: &str) -> IResult<&str, &str> {
    recognize(pair(opt(char('-')), digit1))(input)
}

fn decimal(input: &str) -> IResult<&str, &str> {
    recognize(tuple((opt(char('-')), digit1, char('.'), digit1)))(input)
}

fn unquote(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text)
}
