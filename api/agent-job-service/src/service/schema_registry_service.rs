use crate::module::agent_job::schema::InputSchemaField;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    String,
    Number,
    Boolean,
    Object,
    Any,
}

impl ValueType {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" | "bool" => Ok(Self::Boolean),
            "object" => Ok(Self::Object),
            "any" => Ok(Self::Any),
            other => Err(format!("unsupported value type: {other}")),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::Any => "any",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Any => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaField {
    pub key: String,
    pub value_type: ValueType,
    pub required: bool,
}

#[derive(Debug, Deserialize)]
struct SchemaFieldFile {
    key: String,
    value: String,
    #[serde(default)]
    optional: bool,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SchemaFile {
    Wrapped { input_data: Vec<SchemaFieldFile> },
    Bare(Vec<SchemaFieldFile>),
}

/// Declarative input schema of this service. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    fields: Vec<SchemaField>,
    allow_extra_keys: bool,
}

impl SchemaRegistry {
    pub fn new(fields: Vec<SchemaField>, allow_extra_keys: bool) -> Result<Self, String> {
        let mut seen = HashSet::new();
        for field in &fields {
            if field.key.trim().is_empty() {
                return Err("schema field key cannot be empty".to_string());
            }
            if !seen.insert(field.key.as_str()) {
                return Err(format!("duplicate schema field: {}", field.key));
            }
        }
        Ok(Self {
            fields,
            allow_extra_keys,
        })
    }

    /// Inline form: `text:string,option?:any`. A `?` suffix on the key marks it optional.
    pub fn from_inline(raw: &str, allow_extra_keys: bool) -> Result<Self, String> {
        let mut fields = Vec::new();
        for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (key, value_type) = entry
                .split_once(':')
                .ok_or_else(|| format!("expected key:type, got {entry:?}"))?;
            let key = key.trim();
            let (key, required) = match key.strip_suffix('?') {
                Some(k) => (k, false),
                None => (key, true),
            };
            fields.push(SchemaField {
                key: key.to_string(),
                value_type: ValueType::parse(value_type)?,
                required,
            });
        }
        Self::new(fields, allow_extra_keys)
    }

    /// JSON form: `[{"key": "text", "value": "string"}]`, optionally wrapped in `{"input_data": [...]}`.
    pub fn from_json(raw: &str, allow_extra_keys: bool) -> Result<Self, String> {
        let parsed: SchemaFile =
            serde_json::from_str(raw).map_err(|e| format!("schema parse failed: {e}"))?;
        let entries = match parsed {
            SchemaFile::Wrapped { input_data } => input_data,
            SchemaFile::Bare(entries) => entries,
        };
        let fields = entries
            .into_iter()
            .map(|f| {
                Ok(SchemaField {
                    key: f.key,
                    value_type: ValueType::parse(&f.value)?,
                    required: !f.optional,
                })
            })
            .collect::<Result<Vec<_>, String>>()?;
        Self::new(fields, allow_extra_keys)
    }

    pub fn from_json_file(path: &str, allow_extra_keys: bool) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| format!("failed to read schema file {path}: {e}"))?;
        Self::from_json(&raw, allow_extra_keys)
    }

    pub fn fields(&self) -> &[SchemaField] {
        &self.fields
    }

    pub fn allows_extra_keys(&self) -> bool {
        self.allow_extra_keys
    }

    pub fn get_schema(&self) -> Vec<InputSchemaField> {
        self.fields
            .iter()
            .map(|f| InputSchemaField {
                key: f.key.clone(),
                value: f.value_type.as_str().to_string(),
                optional: !f.required,
            })
            .collect()
    }

    pub fn validate(&self, doc: &Map<String, Value>) -> Result<(), String> {
        for field in &self.fields {
            match doc.get(&field.key) {
                None if field.required => {
                    return Err(format!("missing required key: {}", field.key));
                }
                None => {}
                Some(value) if !field.value_type.matches(value) => {
                    return Err(format!(
                        "key {} must be of type {}",
                        field.key,
                        field.value_type.as_str()
                    ));
                }
                Some(_) => {}
            }
        }
        if !self.allow_extra_keys {
            if let Some(unknown) = doc
                .keys()
                .find(|k| !self.fields.iter().any(|f| &f.key == *k))
            {
                return Err(format!("unknown key: {unknown}"));
            }
        }
        Ok(())
    }

    /// Merges `extra` over `existing` (later values win, nothing is removed) and validates the result.
    pub fn merge_and_validate(
        &self,
        existing: &Map<String, Value>,
        extra: &Map<String, Value>,
    ) -> Result<Map<String, Value>, String> {
        let mut merged = existing.clone();
        for (key, value) in extra {
            merged.insert(key.clone(), value.clone());
        }
        self.validate(&merged)?;
        Ok(merged)
    }
}
