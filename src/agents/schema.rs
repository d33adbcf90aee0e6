// src/agents/schema.rs
// Declarative field schemas for agent inputs and outputs

use serde_json::Value;
use thiserror::Error;

/// Expected JSON type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    StringArray,
    Array,
}

impl FieldType {
    fn matches(self, value: &Value) -> bool {
        match self {
            FieldType::String => value.is_string(),
            FieldType::StringArray => value
                .as_array()
                .map_or(false, |items| items.iter().all(Value::is_string)),
            FieldType::Array => value.is_array(),
        }
    }

    fn describe(self) -> &'static str {
        match self {
            FieldType::String => "a string",
            FieldType::StringArray => "an array of strings",
            FieldType::Array => "an array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub kind: FieldType,
    pub non_empty: bool,
}

impl FieldSchema {
    pub const fn new(name: &'static str, kind: FieldType) -> Self {
        Self { name, kind, non_empty: false }
    }

    pub const fn non_empty(mut self) -> Self {
        self.non_empty = true;
        self
    }

    fn check(&self, value: &Value) -> Result<(), SchemaViolation> {
        if !self.kind.matches(value) {
            return Err(SchemaViolation::WrongType {
                field: self.name.to_string(),
                expected: self.kind.describe(),
            });
        }
        if self.non_empty {
            let empty = match value {
                Value::String(s) => s.trim().is_empty(),
                Value::Array(items) => items.is_empty(),
                _ => false,
            };
            if empty {
                return Err(SchemaViolation::EmptyField(self.name.to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("payload is not a JSON object")]
    NotAnObject,
    #[error("missing field `{0}`")]
    MissingField(String),
    #[error("field `{field}` must be {expected}")]
    WrongType { field: String, expected: &'static str },
    #[error("field `{0}` must not be empty")]
    EmptyField(String),
}

/// Object schema. Undeclared fields are ignored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSchema {
    pub fields: Vec<FieldSchema>,
}

impl ObjectSchema {
    pub fn new(fields: &[FieldSchema]) -> Self {
        Self { fields: fields.to_vec() }
    }

    /// Every declared field must be present and well-formed.
    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;
        for field in &self.fields {
            let v = object
                .get(field.name)
                .ok_or_else(|| SchemaViolation::MissingField(field.name.to_string()))?;
            field.check(v)?;
        }
        Ok(())
    }

    /// Declared fields that are present must be well-formed; absent ones are fine.
    pub fn validate_present(&self, value: &Value) -> Result<(), SchemaViolation> {
        let object = value.as_object().ok_or(SchemaViolation::NotAnObject)?;
        for field in &self.fields {
            if let Some(v) = object.get(field.name) {
                field.check(v)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn reasoner_input() -> ObjectSchema {
        ObjectSchema::new(&[
            FieldSchema::new("goal", FieldType::String),
            FieldSchema::new("plan", FieldType::StringArray).non_empty(),
            FieldSchema::new("context", FieldType::String),
        ])
    }

    #[test]
    fn test_valid_payload() {
        let schema = reasoner_input();
        assert!(schema
            .validate(&json!({"goal": "g", "plan": ["a"], "context": "", "extra": 1}))
            .is_ok());
    }

    #[test]
    fn test_violations() {
        let schema = reasoner_input();
        assert_eq!(schema.validate(&json!([1])), Err(SchemaViolation::NotAnObject));
        assert_eq!(
            schema.validate(&json!({"goal": "g", "context": ""})),
            Err(SchemaViolation::MissingField("plan".into()))
        );
        assert!(matches!(
            schema.validate(&json!({"goal": "g", "plan": [1, 2], "context": ""})),
            Err(SchemaViolation::WrongType { .. })
        ));
        assert_eq!(
            schema.validate(&json!({"goal": "g", "plan": [], "context": ""})),
            Err(SchemaViolation::EmptyField("plan".into()))
        );
    }

    #[test]
    fn test_validate_present_ignores_absent_fields() {
        let schema = reasoner_input();
        assert!(schema.validate_present(&json!({"goal": "g"})).is_ok());
        assert!(schema.validate_present(&json!({"goal": 3})).is_err());
    }
}
