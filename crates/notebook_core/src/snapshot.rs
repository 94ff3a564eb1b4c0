//! nbformat v4 shaped document snapshots.
//!
//! These are plain serde records exchanged through the document-model
//! capability. Typed model fields (tags, trust, kernelspec, ...) travel
//! inside the `metadata` objects the way nbformat stores them.

use crate::cell::CellType;
use crate::outputs::OutputRecord;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

/// One serialized cell.
///
/// Code cells always serialize `execution_count` (possibly null) and
/// `outputs`; markdown and raw cells never do.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CellSnapshot {
    pub cell_type: CellType,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(deserialize_with = "multiline_string")]
    pub source: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
    #[serde(default)]
    pub execution_count: Option<u32>,
    #[serde(default)]
    pub outputs: Vec<OutputRecord>,
}

impl Serialize for CellSnapshot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let is_code = self.cell_type == CellType::Code;
        let len = 3 + usize::from(self.id.is_some()) + if is_code { 2 } else { 0 };
        let mut map = serializer.serialize_map(Some(len))?;
        map.serialize_entry("cell_type", &self.cell_type)?;
        if let Some(id) = &self.id {
            map.serialize_entry("id", id)?;
        }
        map.serialize_entry("metadata", &self.metadata)?;
        map.serialize_entry("source", &self.source)?;
        if is_code {
            map.serialize_entry("execution_count", &self.execution_count)?;
            map.serialize_entry("outputs", &self.outputs)?;
        }
        map.end()
    }
}

/// One serialized notebook.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotebookSnapshot {
    #[serde(default)]
    pub metadata: Map<String, Value>,
    pub nbformat: u32,
    pub nbformat_minor: u32,
    #[serde(default)]
    pub cells: Vec<CellSnapshot>,
}

// nbformat multiline strings: one string or a list of lines.
pub(crate) fn multiline_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Multiline {
        Joined(String),
        Lines(Vec<String>),
    }

    Ok(match Multiline::deserialize(deserializer)? {
        Multiline::Joined(text) => text,
        Multiline::Lines(lines) => lines.concat(),
    })
}
