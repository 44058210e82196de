use leigraph_parser::SourceRecord;
use tracing::debug;

use crate::entity::{Entity, Fragment, Relationship};
use crate::mapping::{
    EntityRule, MappingError, MappingTable, PropertySpec, RelationshipRule, Transform,
};

/// Turns decoded source records into fragments according to a [`MappingTable`].
///
/// Mapping is a pure function of the record: no state is carried between
/// calls, so the same record always yields the same fragments.
#[derive(Debug, Clone)]
pub struct Mapper {
    table: MappingTable,
}

impl Mapper {
    pub fn new(table: MappingTable) -> Result<Self, MappingError> {
        table.validate()?;
        Ok(Self { table })
    }

    pub fn gleif() -> Result<Self, MappingError> {
        Self::new(MappingTable::gleif()?)
    }

    pub fn table(&self) -> &MappingTable {
        &self.table
    }

    /// Entities first, then relationships, each in rule declaration order.
    pub fn map(&self, record: &SourceRecord) -> Result<Vec<Fragment>, MappingError> {
        let rules = self.table.for_kind(record.kind);
        let mut fragments = Vec::with_capacity(rules.entities.len() + rules.relationships.len());

        for rule in &rules.entities {
            if let Some(entity) = map_entity(rule, record)? {
                fragments.push(Fragment::Entity(entity));
            }
        }
        for rule in &rules.relationships {
            if let Some(relationship) = map_relationship(rule, record)? {
                fragments.push(Fragment::Relationship(relationship));
            }
        }
        Ok(fragments)
    }
}

fn applies(when: &Option<String>, record: &SourceRecord) -> bool {
    when.as_deref().map_or(true, |field| record.contains(field))
}

fn map_entity(rule: &EntityRule, record: &SourceRecord) -> Result<Option<Entity>, MappingError> {
    if !applies(&rule.when, record) {
        return Ok(None);
    }
    let rule_context = RuleContext {
        record,
        schema: &rule.schema,
    };
    rule_context.check_required(&rule.required)?;

    let id = rule
        .key
        .derive(record)
        .map_err(|field| rule_context.missing(field))?;
    let mut entity = Entity::new(id, rule.schema.as_str());
    for (name, spec) in &rule.properties {
        for value in rule_context.values(name, spec)? {
            entity.add(name, value);
        }
    }
    Ok(Some(entity))
}

fn map_relationship(
    rule: &RelationshipRule,
    record: &SourceRecord,
) -> Result<Option<Relationship>, MappingError> {
    if !applies(&rule.when, record) {
        return Ok(None);
    }
    let rule_context = RuleContext {
        record,
        schema: &rule.schema,
    };
    rule_context.check_required(&rule.required)?;

    let id = rule
        .key
        .derive(record)
        .map_err(|field| rule_context.missing(field))?;
    let source = rule
        .source
        .derive(record)
        .map_err(|field| rule_context.missing(field))?;
    let target = rule
        .target
        .derive(record)
        .map_err(|field| rule_context.missing(field))?;

    let label = match rule_context.values("label", &rule.label)?.into_iter().next() {
        Some(label) => label,
        None => {
            let field = rule.label.primary_field();
            return Err(if rule.label.value.is_none() && !record.contains(field) {
                rule_context.missing(field)
            } else {
                MappingError::EmptyLabel {
                    kind: record.kind,
                    ordinal: record.ordinal,
                    schema: rule.schema.clone(),
                }
            });
        }
    };

    let mut relationship = Relationship {
        id,
        schema: rule.schema.clone(),
        source,
        target,
        label,
        properties: Default::default(),
    };
    for (name, spec) in &rule.properties {
        for value in rule_context.values(name, spec)? {
            relationship.add(name, value);
        }
    }
    Ok(Some(relationship))
}

struct RuleContext<'a> {
    record: &'a SourceRecord,
    schema: &'a str,
}

impl RuleContext<'_> {
    fn missing(&self, field: &str) -> MappingError {
        MappingError::MissingField {
            kind: self.record.kind,
            ordinal: self.record.ordinal,
            schema: self.schema.to_string(),
            field: field.to_string(),
        }
    }

    fn check_required(&self, fields: &[String]) -> Result<(), MappingError> {
        match fields.iter().find(|field| !self.record.contains(field)) {
            Some(field) => Err(self.missing(field)),
            None => Ok(()),
        }
    }

    fn values(&self, property: &str, spec: &PropertySpec) -> Result<Vec<String>, MappingError> {
        if !applies(&spec.when, self.record) {
            return Ok(Vec::new());
        }

        let mut values = Vec::new();
        for raw in raw_values(spec, self.record) {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(mapped) = spec.map.get(trimmed) {
                if !mapped.is_empty() {
                    values.push(mapped.clone());
                }
                continue;
            }
            match apply_transforms(trimmed, &spec.transforms) {
                Ok(value) if !value.is_empty() => values.push(value),
                Ok(_) => {}
                Err(reason) if spec.required => {
                    return Err(MappingError::InvalidValue {
                        kind: self.record.kind,
                        ordinal: self.record.ordinal,
                        schema: self.schema.to_string(),
                        property: property.to_string(),
                        value: trimmed.to_string(),
                        reason,
                    });
                }
                Err(reason) => {
                    debug!(
                        kind = %self.record.kind,
                        ordinal = self.record.ordinal,
                        schema = self.schema,
                        property,
                        value = trimmed,
                        reason = %reason,
                        "Dropped value rejected by transform"
                    );
                }
            }
        }

        if values.is_empty() && spec.required {
            return Err(self.missing(spec.primary_field()));
        }
        Ok(values)
    }
}

fn raw_values(spec: &PropertySpec, record: &SourceRecord) -> Vec<String> {
    if let Some(field) = &spec.field {
        return record.values(field).to_vec();
    }
    if !spec.fields.is_empty() {
        let collected = spec.fields.iter().flat_map(|field| record.values(field));
        return match &spec.join {
            Some(separator) => {
                let parts: Vec<&str> = collected
                    .map(|value| value.trim())
                    .filter(|value| !value.is_empty())
                    .collect();
                if parts.is_empty() {
                    Vec::new()
                } else {
                    vec![parts.join(separator)]
                }
            }
            None => collected.cloned().collect(),
        };
    }
    if let Some(value) = &spec.value {
        return vec![value.clone()];
    }
    if let Some(key) = &spec.key {
        return key
            .derive(record)
            .map(|key| vec![key.as_str().to_string()])
            .unwrap_or_default();
    }
    Vec::new()
}

fn apply_transforms(value: &str, transforms: &[Transform]) -> Result<String, String> {
    let mut current = value.to_string();
    for transform in transforms {
        current = transform.apply(&current)?;
    }
    Ok(current)
}
