use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identity key shared by every fragment describing the same entity.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Property name -> values. Names serialize sorted; values keep first-seen order.
pub type Properties = BTreeMap<String, Vec<String>>;

fn add_value(properties: &mut Properties, property: &str, value: impl Into<String>) {
    let value = value.into();
    let values = properties.entry(property.to_string()).or_default();
    if !values.contains(&value) {
        values.push(value);
    }
}

fn merge_properties(target: &mut Properties, other: Properties) {
    for (property, values) in other {
        for value in values {
            add_value(target, &property, value);
        }
    }
}

fn sort_values(properties: &mut Properties) {
    for values in properties.values_mut() {
        values.sort();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityKey,
    pub schema: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(id: EntityKey, schema: impl Into<String>) -> Self {
        Self {
            id,
            schema: schema.into(),
            properties: Properties::new(),
        }
    }

    pub fn add(&mut self, property: &str, value: impl Into<String>) {
        add_value(&mut self.properties, property, value);
    }

    pub fn first(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn values(&self, property: &str) -> &[String] {
        self.properties
            .get(property)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: EntityKey,
    pub schema: String,
    pub source: EntityKey,
    pub target: EntityKey,
    pub label: String,
    #[serde(default)]
    pub properties: Properties,
}

impl Relationship {
    pub fn add(&mut self, property: &str, value: impl Into<String>) {
        add_value(&mut self.properties, property, value);
    }

    pub fn first(&self, property: &str) -> Option<&str> {
        self.properties
            .get(property)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn same_edge(&self, other: &Relationship) -> bool {
        self.schema == other.schema
            && self.source == other.source
            && self.target == other.target
            && self.label == other.label
    }
}

/// One line of the fragment stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Fragment {
    Entity(Entity),
    Relationship(Relationship),
}

impl Fragment {
    pub fn key(&self) -> &EntityKey {
        match self {
            Fragment::Entity(entity) => &entity.id,
            Fragment::Relationship(relationship) => &relationship.id,
        }
    }

    pub fn schema(&self) -> &str {
        match self {
            Fragment::Entity(entity) => &entity.schema,
            Fragment::Relationship(relationship) => &relationship.schema,
        }
    }

    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Fragment::Entity(entity) => Some(entity),
            Fragment::Relationship(_) => None,
        }
    }

    pub fn as_relationship(&self) -> Option<&Relationship> {
        match self {
            Fragment::Relationship(relationship) => Some(relationship),
            Fragment::Entity(_) => None,
        }
    }

    /// Folds `other` into `self` when both describe the same record.
    ///
    /// Returns `other` back unchanged if the two disagree on kind, schema or,
    /// for relationships, on endpoints and label.
    pub fn merge(&mut self, other: Fragment) -> Result<(), Fragment> {
        match (self, other) {
            (Fragment::Entity(current), Fragment::Entity(incoming))
                if current.schema == incoming.schema =>
            {
                merge_properties(&mut current.properties, incoming.properties);
                Ok(())
            }
            (Fragment::Relationship(current), Fragment::Relationship(incoming))
                if current.same_edge(&incoming) =>
            {
                merge_properties(&mut current.properties, incoming.properties);
                Ok(())
            }
            (_, incoming) => Err(incoming),
        }
    }

    /// Sorts property values so consolidated output is independent of input order.
    pub fn normalize(&mut self) {
        match self {
            Fragment::Entity(entity) => sort_values(&mut entity.properties),
            Fragment::Relationship(relationship) => sort_values(&mut relationship.properties),
        }
    }
}
