mod mapper;
mod table;
mod transform;

use leigraph_parser::RecordKind;
use thiserror::Error;

pub use mapper::Mapper;
pub use table::{EntityRule, KeySpec, MappingTable, PropertySpec, RecordMapping, RelationshipRule};
pub use transform::Transform;

#[derive(Debug, Error)]
pub enum MappingError {
    #[error("{kind} record {ordinal}: {schema} requires field '{field}'")]
    MissingField {
        kind: RecordKind,
        ordinal: u64,
        schema: String,
        field: String,
    },

    #[error("{kind} record {ordinal}: {schema}.{property} value '{value}' rejected: {reason}")]
    InvalidValue {
        kind: RecordKind,
        ordinal: u64,
        schema: String,
        property: String,
        value: String,
        reason: String,
    },

    #[error("{kind} record {ordinal}: {schema} relationship has no label")]
    EmptyLabel {
        kind: RecordKind,
        ordinal: u64,
        schema: String,
    },

    #[error("invalid mapping table: {0}")]
    Config(String),
}
