use super::retry::{Classification, ExtractionStatus};
use super::schema::{ClassificationResult, Field};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Column holding the composite label
pub const FINAL_CATEGORY_COLUMN: &str = "Final category";

/// Opaque scalar record identifier, written back as read
///
/// Integers that fit `i64` land in `Integer`; floats and larger integers keep
/// their exact JSON representation in `Number`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Integer(i64),
    Number(serde_json::Number),
    Bool(bool),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordId::Integer(n) => write!(f, "{}", n),
            RecordId::Number(n) => write!(f, "{}", n),
            RecordId::Bool(b) => write!(f, "{}", b),
            RecordId::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordId {
    fn from(n: i64) -> Self {
        RecordId::Integer(n)
    }
}

impl From<&str> for RecordId {
    fn from(s: &str) -> Self {
        RecordId::Text(s.to_string())
    }
}

/// Output column names in table order: `id`, `report`, the field keys,
/// `Final category`
pub fn output_columns() -> impl Iterator<Item = &'static str> {
    ["id", "report"]
        .into_iter()
        .chain(Field::ALL.into_iter().map(Field::key))
        .chain([FINAL_CATEGORY_COLUMN])
}

/// One input row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputRecord {
    pub id: RecordId,
    #[serde(rename = "report")]
    pub text: String,
}

impl InputRecord {
    pub fn new(id: impl Into<RecordId>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// One output row: the input, the seven fields and the composite label
#[derive(Debug, Clone, PartialEq)]
pub struct OutputRecord {
    pub id: RecordId,
    pub report: String,
    pub result: ClassificationResult,
    pub final_category: String,
    pub attempts: u32,
    pub status: ExtractionStatus,
}

impl OutputRecord {
    pub fn new(input: InputRecord, classification: Classification) -> Self {
        let final_category = classification.final_category();
        Self {
            id: input.id,
            report: input.text,
            result: classification.result,
            final_category,
            attempts: classification.attempts,
            status: classification.status,
        }
    }
}

impl Serialize for OutputRecord {
    /// Columns: `id`, `report`, the field keys in canonical order, `Final category`
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(Field::ALL.len() + 3))?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("report", &self.report)?;
        for (field, value) in self.result.iter() {
            map.serialize_entry(field.key(), value)?;
        }
        map.serialize_entry(FINAL_CATEGORY_COLUMN, &self.final_category)?;
        map.end()
    }
}
