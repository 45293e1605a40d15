use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

/// A primitive value extracted from a page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Number(value.into())
    }
}

/// One structured record, field order preserved
///
/// The first field is always `url`, the page the record was extracted from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtractedRecord {
    fields: IndexMap<String, FieldValue>,
}

impl ExtractedRecord {
    /// Starts a record for the given page
    pub fn new(url: &Url) -> Self {
        let mut fields = IndexMap::new();
        fields.insert("url".to_string(), FieldValue::String(url.to_string()));
        Self { fields }
    }

    /// Appends a field; `url` and repeated names are ignored
    pub(crate) fn push(&mut self, name: String, value: FieldValue) {
        if name != "url" && !self.fields.contains_key(&name) {
            self.fields.insert(name, value);
        }
    }

    pub fn url(&self) -> Option<&str> {
        match self.fields.get("url") {
            Some(FieldValue::String(url)) => Some(url),
            _ => None,
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Field names in order
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
