use thiserror::Error;

/// Errors raised while mapping typed entities onto graph schema and literals.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MappingError {
    #[error("Invalid name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("Unsupported type for field {entity}.{field}: {declared}")]
    UnsupportedType {
        entity: String,
        field: String,
        declared: String,
    },

    #[error("Unsupported value{}: {kind}", field.as_ref().map(|f| format!(" for field {f}")).unwrap_or_default())]
    UnsupportedValue { field: Option<String>, kind: String },

    #[error("Cannot decode {entity}: {message}")]
    Decode { entity: String, message: String },

    #[error("Cannot encode {entity}: {message}")]
    Encode { entity: String, message: String },

    #[error("Schema name {schema} is claimed by both {first} and {second}")]
    DuplicateSchemaName {
        schema: String,
        first: String,
        second: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl MappingError {
    pub(crate) fn unsupported_value(field: Option<&str>, kind: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            field: field.map(str::to_string),
            kind: kind.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
