//! Field predicates for filtering stored documents.
//!
//! A predicate is written as `field=value`, `field<value`, `field>value` or
//! `field^value` (not equal). It is evaluated against every field of a JSON value;
//! fields of nested objects are visited as well, and the elements of an array count
//! as values of the field holding the array.

use std::{cmp::Ordering, fmt, str::FromStr};

use serde_json::Value;

use crate::{error::Result, Error};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Lt,
    Gt,
}

impl Op {
    fn symbol(self) -> char {
        match self {
            Op::Eq => '=',
            Op::Ne => '^',
            Op::Lt => '<',
            Op::Gt => '>',
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Predicate {
    field: String,
    op: Op,
    value: String,
}

impl Predicate {
    pub fn new(field: impl Into<String>, op: Op, value: impl Into<String>) -> Predicate {
        Predicate {
            field: field.into(),
            op,
            value: value.into(),
        }
    }

    pub fn equals(field: impl Into<String>, value: impl Into<String>) -> Predicate {
        Self::new(field, Op::Eq, value)
    }

    pub fn not_equals(field: impl Into<String>, value: impl Into<String>) -> Predicate {
        Self::new(field, Op::Ne, value)
    }

    pub fn less_than(field: impl Into<String>, value: impl Into<String>) -> Predicate {
        Self::new(field, Op::Lt, value)
    }

    pub fn greater_than(field: impl Into<String>, value: impl Into<String>) -> Predicate {
        Self::new(field, Op::Gt, value)
    }

    /// Parses a predicate, splitting at the first operator character.
    pub fn parse(s: &str) -> Result<Predicate> {
        let Some(pos) = s.find(&['=', '<', '>', '^'][..]) else {
            return Err(Error::InvalidPredicate(s.to_string()));
        };
        let op = match s.as_bytes()[pos] {
            b'=' => Op::Eq,
            b'<' => Op::Lt,
            b'>' => Op::Gt,
            _ => Op::Ne,
        };
        let field = &s[..pos];
        if field.is_empty() {
            return Err(Error::InvalidPredicate(s.to_string()));
        }
        Ok(Self::new(field, op, &s[pos + 1..]))
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn op(&self) -> Op {
        self.op
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    /// Evaluates the predicate against an encoded JSON value.
    pub fn matches(&self, value: &[u8]) -> Result<bool> {
        let value: Value = serde_json::from_slice(value).map_err(Error::Decode)?;
        Ok(self.matches_fields(&fields(&value)))
    }

    fn matches_fields(&self, fields: &[(&str, String)]) -> bool {
        let mut candidates = fields
            .iter()
            .filter(|(name, _)| *name == self.field)
            .map(|(_, v)| v.as_str())
            .peekable();
        match self.op {
            Op::Eq => candidates.any(|v| v == self.value),
            // The field has to exist, and none of its values may be equal
            Op::Ne => candidates.peek().is_some() && candidates.all(|v| v != self.value),
            Op::Lt => candidates.any(|v| compare(v, &self.value) == Ordering::Less),
            Op::Gt => candidates.any(|v| compare(v, &self.value) == Ordering::Greater),
        }
    }
}

/// Evaluates all predicates against an encoded JSON value.
pub fn matches_all(predicates: &[Predicate], value: &[u8]) -> Result<bool> {
    let value: Value = serde_json::from_slice(value).map_err(Error::Decode)?;
    let fields = fields(&value);
    Ok(predicates.iter().all(|p| p.matches_fields(&fields)))
}

impl FromStr for Predicate {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Predicate::parse(s)
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.field, self.op.symbol(), self.value)
    }
}

/// Numbers compare by value, everything else byte by byte.
fn compare(a: &str, b: &str) -> Ordering {
    match (a.parse::<f64>(), b.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => a.as_bytes().cmp(b.as_bytes()),
    }
}

fn fields(value: &Value) -> Vec<(&str, String)> {
    let mut result = Vec::new();
    collect_fields(value, None, &mut result);
    result
}

fn collect_fields<'a>(
    value: &'a Value,
    name: Option<&'a str>,
    result: &mut Vec<(&'a str, String)>,
) {
    match value {
        Value::Object(map) => {
            for (k, v) in map {
                collect_fields(v, Some(k.as_str()), result);
            }
        }
        Value::Array(values) => {
            for v in values {
                collect_fields(v, name, result);
            }
        }
        Value::String(s) => {
            if let Some(name) = name {
                result.push((name, s.clone()));
            }
        }
        scalar => {
            if let Some(name) = name {
                result.push((name, scalar.to_string()));
            }
        }
    }
}
