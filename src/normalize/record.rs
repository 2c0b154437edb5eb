//! Raw annotation records as handed over by language adapters.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer};

use crate::model::Origin;

/// Flat key/value map of one annotation, all values as strings.
pub type RawValues = BTreeMap<String, String>;

/// One extracted annotation: a field declaration or a lineage override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct RawRecord {
    /// Explicit field id; inferred from `field` when absent.
    #[serde(default)]
    pub field_id: Option<String>,
    /// Raw key/value pairs.
    #[serde(default, deserialize_with = "scalar_map")]
    pub values: RawValues,
    /// Source file, relative to the project root.
    #[serde(default)]
    pub file: Option<String>,
    /// 1-based line.
    #[serde(default)]
    pub line: Option<u32>,
}

impl RawRecord {
    /// Convenience constructor used by callers that build records in memory.
    #[must_use]
    pub fn new<K, V>(values: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            field_id: None,
            values: values.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
            file: None,
            line: None,
        }
    }

    /// Sets the declaration site.
    #[must_use]
    pub fn at(mut self, file: &str, line: u32) -> Self {
        self.file = Some(file.to_string());
        self.line = Some(line);
        self
    }

    /// Declaration site, with the path in forward-slash form.
    #[must_use]
    pub fn origin(&self) -> Option<Origin> {
        self.file.as_ref().map(|file| Origin {
            file: file.replace('\\', "/"),
            line: self.line.unwrap_or_default(),
        })
    }

    /// Non-empty trimmed value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
    }
}

/// An adapter output file: field annotations plus lineage overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnnotationDocument {
    /// Field annotations.
    #[serde(default)]
    pub fields: Vec<RawRecord>,
    /// Override annotations.
    #[serde(default)]
    pub overrides: Vec<RawRecord>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    List(Vec<Scalar>),
}

impl Scalar {
    fn into_text(self) -> String {
        match self {
            Scalar::Text(s) => s,
            Scalar::Int(i) => i.to_string(),
            Scalar::Float(f) => f.to_string(),
            Scalar::Bool(b) => b.to_string(),
            Scalar::List(items) => {
                items.into_iter().map(Scalar::into_text).collect::<Vec<_>>().join(",")
            }
        }
    }
}

/// Accepts string, number, boolean and list values, flattening them to text.
pub(crate) fn scalar_map<'de, D>(deserializer: D) -> Result<RawValues, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: BTreeMap<String, Option<Scalar>> = BTreeMap::deserialize(deserializer)?;
    Ok(raw.into_iter().filter_map(|(k, v)| v.map(|v| (k, v.into_text()))).collect())
}
