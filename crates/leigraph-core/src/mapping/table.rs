use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use leigraph_parser::{RecordKind, SourceRecord};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::entity::EntityKey;
use crate::mapping::{MappingError, Transform};

const GLEIF_TABLE: &str = include_str!("../../config/gleif.toml");

/// Static field-mapping table, one section per record kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingTable {
    #[serde(default)]
    pub registration: RecordMapping,
    #[serde(default)]
    pub relationship: RecordMapping,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RecordMapping {
    #[serde(default)]
    pub entities: Vec<EntityRule>,
    #[serde(default)]
    pub relationships: Vec<RelationshipRule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeySpec {
    pub prefix: String,
    pub fields: Vec<String>,
    /// Replace the joined components with their SHA-256 digest.
    #[serde(default)]
    pub hash: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EntityRule {
    pub schema: String,
    pub key: KeySpec,
    pub when: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RelationshipRule {
    pub schema: String,
    pub key: KeySpec,
    pub source: KeySpec,
    pub target: KeySpec,
    pub label: PropertySpec,
    pub when: Option<String>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PropertySpec {
    pub field: Option<String>,
    #[serde(default)]
    pub fields: Vec<String>,
    pub value: Option<String>,
    pub key: Option<KeySpec>,
    /// Join the values of `fields` into a single value.
    pub join: Option<String>,
    pub when: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub transforms: Vec<Transform>,
    /// Exact-match lookup on the trimmed source value; a hit skips `transforms`.
    #[serde(default)]
    pub map: BTreeMap<String, String>,
}

impl MappingTable {
    /// The built-in table for GLEIF LEI-CDF and RR-CDF records.
    pub fn gleif() -> Result<Self, MappingError> {
        Self::from_toml_str(GLEIF_TABLE)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, MappingError> {
        let table: MappingTable =
            toml::from_str(content).map_err(|err| MappingError::Config(err.to_string()))?;
        table.validate()?;
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self, MappingError> {
        let content = fs::read_to_string(path).map_err(|err| {
            MappingError::Config(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn for_kind(&self, kind: RecordKind) -> &RecordMapping {
        match kind {
            RecordKind::Registration => &self.registration,
            RecordKind::Relationship => &self.relationship,
        }
    }

    pub fn validate(&self) -> Result<(), MappingError> {
        for kind in [RecordKind::Registration, RecordKind::Relationship] {
            let mapping = self.for_kind(kind);
            for rule in &mapping.entities {
                let context = format!("{kind} entity {}", rule.schema);
                validate_schema(&rule.schema, &context)?;
                rule.key.validate(&context)?;
                for (name, property) in &rule.properties {
                    property.validate(&format!("{context}.{name}"))?;
                }
            }
            for rule in &mapping.relationships {
                let context = format!("{kind} relationship {}", rule.schema);
                validate_schema(&rule.schema, &context)?;
                rule.key.validate(&context)?;
                rule.source.validate(&format!("{context}.source"))?;
                rule.target.validate(&format!("{context}.target"))?;
                rule.label.validate(&format!("{context}.label"))?;
                if rule.label.key.is_some() {
                    return Err(MappingError::Config(format!(
                        "{context}.label cannot be a derived key"
                    )));
                }
                for (name, property) in &rule.properties {
                    property.validate(&format!("{context}.{name}"))?;
                }
            }
        }
        Ok(())
    }
}

fn validate_schema(schema: &str, context: &str) -> Result<(), MappingError> {
    if schema.trim().is_empty() {
        return Err(MappingError::Config(format!("{context}: schema is empty")));
    }
    Ok(())
}

impl KeySpec {
    fn validate(&self, context: &str) -> Result<(), MappingError> {
        if self.prefix.trim().is_empty() {
            return Err(MappingError::Config(format!("{context}: key prefix is empty")));
        }
        if self.fields.is_empty() {
            return Err(MappingError::Config(format!("{context}: key has no fields")));
        }
        Ok(())
    }

    /// Derives the key from the first value of each field, or returns the
    /// first field the record lacks.
    ///
    /// Components of a multi-field key are joined with `-`; `-` and `%`
    /// inside a component are percent-encoded so that `["a-b", "c"]` and
    /// `["a", "b-c"]` stay distinct. Single-field keys keep the raw value.
    pub fn derive<'a>(&'a self, record: &SourceRecord) -> Result<EntityKey, &'a str> {
        let mut components = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            match record.first(field).map(str::trim) {
                Some(value) if !value.is_empty() => components.push(value),
                _ => return Err(field.as_str()),
            }
        }

        let body = if self.hash {
            format!("{:x}", Sha256::digest(components.join("\u{1f}").as_bytes()))
        } else if components.len() == 1 {
            components[0].to_string()
        } else {
            components
                .iter()
                .map(|component| escape_component(component))
                .collect::<Vec<_>>()
                .join("-")
        };
        Ok(EntityKey::new(format!("{}-{}", self.prefix, body)))
    }
}

fn escape_component(component: &str) -> String {
    component.replace('%', "%25").replace('-', "%2D")
}

impl PropertySpec {
    fn validate(&self, context: &str) -> Result<(), MappingError> {
        let sources = [
            self.field.is_some(),
            !self.fields.is_empty(),
            self.value.is_some(),
            self.key.is_some(),
        ]
        .into_iter()
        .filter(|present| *present)
        .count();
        if sources != 1 {
            return Err(MappingError::Config(format!(
                "{context}: exactly one of field, fields, value or key is required"
            )));
        }
        if self.join.is_some() && self.fields.is_empty() {
            return Err(MappingError::Config(format!(
                "{context}: join only applies to fields"
            )));
        }
        if let Some(key) = &self.key {
            key.validate(context)?;
        }
        Ok(())
    }

    /// The field named in errors when this property has no value.
    pub fn primary_field(&self) -> &str {
        if let Some(field) = &self.field {
            return field;
        }
        if let Some(field) = self.fields.first() {
            return field;
        }
        if let Some(key) = &self.key {
            if let Some(field) = key.fields.first() {
                return field;
            }
        }
        "<constant>"
    }
}
