use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

/// Value produced by one area for one frame.
///
/// The variant is fixed by the area kind: gaze, detector-bool and
/// classifier-bool areas produce `Bool`, detector-count areas produce
/// `Count`, classifier areas produce `Label` and sensor areas pass their
/// backend reading through as `Reading`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassificationValue {
    Bool(bool),
    Count(i64),
    Label(String),
    Reading(serde_json::Value),
}

impl ClassificationValue {
    /// Empty labels and null readings carry no information and are kept out
    /// of history.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Label(label) => label.is_empty(),
            Self::Reading(value) => value.is_null(),
            _ => false,
        }
    }

    /// Integer view used by the group aggregates.
    ///
    /// Booleans map to 0/1, labels must parse as integers, numeric readings
    /// are truncated toward zero. Anything else is an error.
    pub fn as_number(&self) -> Result<i64> {
        match self {
            Self::Bool(b) => Ok(i64::from(*b)),
            Self::Count(n) => Ok(*n),
            Self::Label(label) => parse_integer(label),
            Self::Reading(value) => reading_as_number(value),
        }
    }
}

impl From<bool> for ClassificationValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ClassificationValue {
    fn from(value: i64) -> Self {
        Self::Count(value)
    }
}

impl From<&str> for ClassificationValue {
    fn from(value: &str) -> Self {
        Self::Label(value.to_string())
    }
}

impl From<String> for ClassificationValue {
    fn from(value: String) -> Self {
        Self::Label(value)
    }
}

fn parse_integer(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| anyhow!("classification {:?} is not numeric", raw))
}

fn reading_as_number(value: &serde_json::Value) -> Result<i64> {
    match value {
        serde_json::Value::Bool(b) => Ok(i64::from(*b)),
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(i)
            } else if let Some(f) = n.as_f64() {
                Ok(f.trunc() as i64)
            } else {
                Err(anyhow!("reading {} is out of integer range", n))
            }
        }
        serde_json::Value::String(s) => parse_integer(s),
        other => Err(anyhow!("reading {} is not numeric", other)),
    }
}
