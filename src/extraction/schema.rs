//! CAD-RADS 2.0 output schema
//!
//! Seven fields, always handled in the order below. The order is significant:
//! it drives the prompt's output example, the output table columns and the
//! composite label.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel meaning "does not apply"
pub const ABSENT: &str = "No";

/// One of the seven fields an extraction must populate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Field {
    #[serde(rename = "Category for stenosis severity")]
    Stenosis,
    #[serde(rename = "Category for plaque burden")]
    PlaqueBurden,
    #[serde(rename = "Modifier N")]
    NonDiagnostic,
    #[serde(rename = "Modifier HRP")]
    HighRiskPlaque,
    #[serde(rename = "Modifier S")]
    Stent,
    #[serde(rename = "Modifier G")]
    Graft,
    #[serde(rename = "Modifier E")]
    Exception,
}

impl Field {
    /// Canonical field order
    pub const ALL: [Field; 7] = [
        Field::Stenosis,
        Field::PlaqueBurden,
        Field::NonDiagnostic,
        Field::HighRiskPlaque,
        Field::Stent,
        Field::Graft,
        Field::Exception,
    ];

    /// Exact, case-sensitive key used in model output and table columns
    pub fn key(self) -> &'static str {
        match self {
            Field::Stenosis => "Category for stenosis severity",
            Field::PlaqueBurden => "Category for plaque burden",
            Field::NonDiagnostic => "Modifier N",
            Field::HighRiskPlaque => "Modifier HRP",
            Field::Stent => "Modifier S",
            Field::Graft => "Modifier G",
            Field::Exception => "Modifier E",
        }
    }

    /// Legal values, as listed to the model
    pub fn domain(self) -> &'static [&'static str] {
        match self {
            Field::Stenosis => &["0", "1", "2", "3", "4A", "4B", "5", "N"],
            Field::PlaqueBurden => &["No", "P1", "P2", "P3", "P4"],
            Field::NonDiagnostic => &["No", "N"],
            Field::HighRiskPlaque => &["No", "HRP"],
            Field::Stent => &["No", "S"],
            Field::Graft => &["No", "G"],
            Field::Exception => &["No", "E"],
        }
    }

    pub fn absent_token(self) -> &'static str {
        ABSENT
    }

    pub fn allows(self, value: &str) -> bool {
        self.domain().contains(&value)
    }

    /// Position in [`Field::ALL`]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// One string per [`Field`], in canonical order.
///
/// Accepted results are produced by the validator. [`ClassificationResult::empty`]
/// is the fallback for records whose extraction never succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ClassificationResult {
    values: [String; 7],
}

impl ClassificationResult {
    /// All fields set to `""`
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_values(values: [String; 7]) -> Self {
        Self { values }
    }

    pub fn get(&self, field: Field) -> &str {
        &self.values[field.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.values.iter().all(|v| v.is_empty())
    }

    /// `(field, value)` pairs in canonical order
    pub fn iter(&self) -> impl Iterator<Item = (Field, &str)> {
        Field::ALL
            .into_iter()
            .zip(self.values.iter().map(String::as_str))
    }
}

impl From<[&str; 7]> for ClassificationResult {
    fn from(values: [&str; 7]) -> Self {
        Self {
            values: values.map(str::to_string),
        }
    }
}
