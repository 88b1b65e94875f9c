//! Schema-based validation
//!
//! A JSON-Schema-like recursive description of request payloads. Validation
//! never stops at the first problem: every finding is collected into a
//! [`ValidationResult`] with a dotted path (`filters.tags[2]`) to the value
//! that caused it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::validators::redos::cached_pattern;
use crate::DEFAULT_MAX_DEPTH;

/// Supported value types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaType {
    String,
    Integer,
    Number,
    Boolean,
    #[default]
    Object,
    Array,
    Null,
    Any,
}

impl SchemaType {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            SchemaType::String => value.is_string(),
            SchemaType::Integer => value.is_i64() || value.is_u64(),
            SchemaType::Number => value.is_number(),
            SchemaType::Boolean => value.is_boolean(),
            SchemaType::Object => value.is_object(),
            SchemaType::Array => value.is_array(),
            SchemaType::Null => value.is_null(),
            SchemaType::Any => true,
        }
    }

    /// JSON type name of a value, as reported in type-mismatch errors
    pub fn name_of(value: &Value) -> &'static str {
        match value {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(n) if n.is_i64() || n.is_u64() => "integer",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SchemaType::String => "string",
            SchemaType::Integer => "integer",
            SchemaType::Number => "number",
            SchemaType::Boolean => "boolean",
            SchemaType::Object => "object",
            SchemaType::Array => "array",
            SchemaType::Null => "null",
            SchemaType::Any => "any",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ValidationConstraints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_items: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_items: Option<usize>,
}

impl ValidationConstraints {
    pub fn is_empty(&self) -> bool {
        *self == ValidationConstraints::default()
    }
}

/// Schema of a single named property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: SchemaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(flatten)]
    pub constraints: ValidationConstraints,
    /// Nested schema for object-typed properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object: Option<Box<JsonSchema>>,
    /// Item schema for array-typed properties
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
}

/// Root (or nested object) schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSchema {
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_version")]
    pub version: u32,
    #[serde(rename = "type", default)]
    pub schema_type: SchemaType,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    #[serde(default = "default_additional_properties")]
    pub additional_properties: bool,
    /// Constraints applied when the root itself is a scalar or array
    #[serde(flatten)]
    pub constraints: ValidationConstraints,
}

fn default_version() -> u32 {
    1
}

fn default_additional_properties() -> bool {
    true
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationErrorCode {
    MissingRequiredField,
    TypeMismatch,
    StringTooShort,
    StringTooLong,
    NumberTooSmall,
    NumberTooLarge,
    PatternMismatch,
    EnumMismatch,
    TooFewItems,
    TooManyItems,
    AdditionalPropertyNotAllowed,
    MaxDepthExceeded,
    InvalidSchema,
}

impl fmt::Display for ValidationErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_value(self) {
            Ok(Value::String(code)) => write!(f, "{}", code),
            _ => write!(f, "{:?}", self),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationSeverity {
    Warning,
    Error,
    Critical,
}

/// One schema violation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub path: String,
    pub message: String,
    pub code: ValidationErrorCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expected: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual: Option<Value>,
    pub severity: ValidationSeverity,
}

impl ValidationError {
    fn new(path: &str, code: ValidationErrorCode, message: impl Into<String>) -> Self {
        let severity = match code {
            ValidationErrorCode::InvalidSchema => ValidationSeverity::Critical,
            _ => ValidationSeverity::Error,
        };
        Self {
            path: path.to_string(),
            message: message.into(),
            code,
            expected: None,
            actual: None,
            severity,
        }
    }

    fn expected(mut self, expected: Value) -> Self {
        self.expected = Some(expected);
        self
    }

    fn actual(mut self, actual: Value) -> Self {
        self.actual = Some(actual);
        self
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.path.is_empty() {
            write!(f, "[{}] {}", self.code, self.message)
        } else {
            write!(f, "[{}] {}: {}", self.code, self.path, self.message)
        }
    }
}

/// Outcome of validating one value against one schema
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationResult {
    pub schema_id: String,
    pub errors: Vec<ValidationError>,
    /// Declared properties that were present and checked, at any depth
    pub properties_validated: usize,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors_with_code(&self, code: ValidationErrorCode) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter().filter(move |e| e.code == code)
    }
}

struct ValidationContext {
    errors: Vec<ValidationError>,
    properties_validated: usize,
    max_depth: usize,
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", parent, name)
    }
}

impl JsonSchema {
    /// Object schema that accepts anything
    pub fn permissive(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            version: default_version(),
            schema_type: SchemaType::Object,
            required: Vec::new(),
            properties: BTreeMap::new(),
            additional_properties: true,
            constraints: ValidationConstraints::default(),
        }
    }

    pub fn builder(id: impl Into<String>) -> SchemaBuilder {
        SchemaBuilder::new(id)
    }

    /// True when the schema places no requirement on an object payload
    pub fn is_unconstrained(&self) -> bool {
        matches!(self.schema_type, SchemaType::Object | SchemaType::Any)
            && self.required.is_empty()
            && self.properties.is_empty()
            && self.additional_properties
            && self.constraints.is_empty()
    }

    /// Validate a value with the default nesting limit
    pub fn validate(&self, value: &Value) -> ValidationResult {
        self.validate_with_max_depth(value, DEFAULT_MAX_DEPTH)
    }

    pub fn validate_with_max_depth(&self, value: &Value, max_depth: usize) -> ValidationResult {
        let mut ctx = ValidationContext {
            errors: Vec::new(),
            properties_validated: 0,
            max_depth,
        };
        self.validate_node(value, "", 0, &mut ctx);

        if !ctx.errors.is_empty() {
            log::debug!(
                "Schema '{}' rejected payload with {} errors",
                self.id,
                ctx.errors.len()
            );
        }
        ValidationResult {
            schema_id: self.id.clone(),
            errors: ctx.errors,
            properties_validated: ctx.properties_validated,
        }
    }

    fn validate_node(&self, value: &Value, path: &str, depth: usize, ctx: &mut ValidationContext) {
        if depth > ctx.max_depth {
            ctx.errors.push(
                ValidationError::new(
                    path,
                    ValidationErrorCode::MaxDepthExceeded,
                    format!("Nesting exceeds maximum depth of {}", ctx.max_depth),
                )
                .expected(json!(ctx.max_depth)),
            );
            return;
        }

        if !self.schema_type.matches(value) {
            ctx.errors.push(type_mismatch(path, self.schema_type, value));
            return;
        }

        check_constraints(&self.constraints, value, path, ctx);

        let obj = match value.as_object() {
            Some(obj) => obj,
            None => return,
        };

        let mut seen = HashSet::new();
        for name in &self.required {
            if seen.insert(name.as_str()) && !obj.contains_key(name) {
                ctx.errors.push(ValidationError::new(
                    &join_path(path, name),
                    ValidationErrorCode::MissingRequiredField,
                    format!("Required field '{}' is missing", name),
                ));
            }
        }

        for (name, property) in &self.properties {
            if let Some(field_value) = obj.get(name) {
                ctx.properties_validated += 1;
                property.validate_value(field_value, &join_path(path, name), depth + 1, ctx);
            }
        }

        if !self.additional_properties {
            for key in obj.keys() {
                if !self.properties.contains_key(key) {
                    ctx.errors.push(ValidationError::new(
                        &join_path(path, key),
                        ValidationErrorCode::AdditionalPropertyNotAllowed,
                        format!("Property '{}' is not allowed", key),
                    ));
                }
            }
        }
    }
}

impl PropertySchema {
    pub fn string() -> PropertySchemaBuilder {
        PropertySchemaBuilder::new(SchemaType::String)
    }

    pub fn integer() -> PropertySchemaBuilder {
        PropertySchemaBuilder::new(SchemaType::Integer)
    }

    pub fn number() -> PropertySchemaBuilder {
        PropertySchemaBuilder::new(SchemaType::Number)
    }

    pub fn boolean() -> PropertySchemaBuilder {
        PropertySchemaBuilder::new(SchemaType::Boolean)
    }

    pub fn any() -> PropertySchemaBuilder {
        PropertySchemaBuilder::new(SchemaType::Any)
    }

    pub fn object(schema: JsonSchema) -> PropertySchemaBuilder {
        let mut builder = PropertySchemaBuilder::new(SchemaType::Object);
        builder.schema.object = Some(Box::new(schema));
        builder
    }

    pub fn array(items: PropertySchema) -> PropertySchemaBuilder {
        let mut builder = PropertySchemaBuilder::new(SchemaType::Array);
        builder.schema.items = Some(Box::new(items));
        builder
    }

    fn validate_value(&self, value: &Value, path: &str, depth: usize, ctx: &mut ValidationContext) {
        if depth > ctx.max_depth {
            ctx.errors.push(
                ValidationError::new(
                    path,
                    ValidationErrorCode::MaxDepthExceeded,
                    format!("Nesting exceeds maximum depth of {}", ctx.max_depth),
                )
                .expected(json!(ctx.max_depth)),
            );
            return;
        }

        if !self.schema_type.matches(value) {
            ctx.errors.push(type_mismatch(path, self.schema_type, value));
            return;
        }

        check_constraints(&self.constraints, value, path, ctx);

        if let (Some(schema), Value::Object(_)) = (&self.object, value) {
            schema.validate_node(value, path, depth, ctx);
        }

        if let (Some(items), Value::Array(values)) = (&self.items, value) {
            for (idx, item) in values.iter().enumerate() {
                items.validate_value(item, &format!("{}[{}]", path, idx), depth + 1, ctx);
            }
        }
    }
}

fn type_mismatch(path: &str, expected: SchemaType, value: &Value) -> ValidationError {
    let actual = SchemaType::name_of(value);
    ValidationError::new(
        path,
        ValidationErrorCode::TypeMismatch,
        format!("Expected {}, found {}", expected, actual),
    )
    .expected(json!(expected.to_string()))
    .actual(json!(actual))
}

fn check_constraints(
    constraints: &ValidationConstraints,
    value: &Value,
    path: &str,
    ctx: &mut ValidationContext,
) {
    match value {
        Value::String(s) => {
            let length = s.chars().count();
            if let Some(min) = constraints.min_length {
                if length < min {
                    ctx.errors.push(
                        ValidationError::new(
                            path,
                            ValidationErrorCode::StringTooShort,
                            format!("Length {} is below minimum {}", length, min),
                        )
                        .expected(json!(min))
                        .actual(json!(length)),
                    );
                }
            }
            if let Some(max) = constraints.max_length {
                if length > max {
                    ctx.errors.push(
                        ValidationError::new(
                            path,
                            ValidationErrorCode::StringTooLong,
                            format!("Length {} exceeds maximum {}", length, max),
                        )
                        .expected(json!(max))
                        .actual(json!(length)),
                    );
                }
            }
            if let Some(pattern) = &constraints.pattern {
                match cached_pattern(pattern) {
                    Ok(re) if !re.is_match(s) => ctx.errors.push(
                        ValidationError::new(
                            path,
                            ValidationErrorCode::PatternMismatch,
                            "Value does not match the required pattern",
                        )
                        .expected(json!(pattern)),
                    ),
                    Ok(_) => {}
                    Err(e) => ctx.errors.push(ValidationError::new(
                        path,
                        ValidationErrorCode::InvalidSchema,
                        e.to_string(),
                    )),
                }
            }
        }
        Value::Number(n) => {
            if let Some(actual) = n.as_f64() {
                if let Some(min) = constraints.minimum {
                    if actual < min {
                        ctx.errors.push(
                            ValidationError::new(
                                path,
                                ValidationErrorCode::NumberTooSmall,
                                format!("Value {} is below minimum {}", actual, min),
                            )
                            .expected(json!(min))
                            .actual(value.clone()),
                        );
                    }
                }
                if let Some(max) = constraints.maximum {
                    if actual > max {
                        ctx.errors.push(
                            ValidationError::new(
                                path,
                                ValidationErrorCode::NumberTooLarge,
                                format!("Value {} exceeds maximum {}", actual, max),
                            )
                            .expected(json!(max))
                            .actual(value.clone()),
                        );
                    }
                }
            }
        }
        Value::Array(items) => {
            if let Some(min) = constraints.min_items {
                if items.len() < min {
                    ctx.errors.push(
                        ValidationError::new(
                            path,
                            ValidationErrorCode::TooFewItems,
                            format!("{} items is below minimum {}", items.len(), min),
                        )
                        .expected(json!(min))
                        .actual(json!(items.len())),
                    );
                }
            }
            if let Some(max) = constraints.max_items {
                if items.len() > max {
                    ctx.errors.push(
                        ValidationError::new(
                            path,
                            ValidationErrorCode::TooManyItems,
                            format!("{} items exceeds maximum {}", items.len(), max),
                        )
                        .expected(json!(max))
                        .actual(json!(items.len())),
                    );
                }
            }
        }
        _ => {}
    }

    if let Some(allowed) = &constraints.enum_values {
        if !allowed.contains(value) {
            ctx.errors.push(
                ValidationError::new(
                    path,
                    ValidationErrorCode::EnumMismatch,
                    "Value is not one of the allowed values",
                )
                .expected(Value::Array(allowed.clone())),
            );
        }
    }
}

/// Builder for property schemas
#[derive(Debug, Clone)]
pub struct PropertySchemaBuilder {
    schema: PropertySchema,
}

impl PropertySchemaBuilder {
    fn new(schema_type: SchemaType) -> Self {
        Self {
            schema: PropertySchema {
                schema_type,
                description: None,
                constraints: ValidationConstraints::default(),
                object: None,
                items: None,
            },
        }
    }

    pub fn description(mut self, description: &str) -> Self {
        self.schema.description = Some(description.to_string());
        self
    }

    pub fn min_length(mut self, min: usize) -> Self {
        self.schema.constraints.min_length = Some(min);
        self
    }

    pub fn max_length(mut self, max: usize) -> Self {
        self.schema.constraints.max_length = Some(max);
        self
    }

    pub fn minimum(mut self, min: f64) -> Self {
        self.schema.constraints.minimum = Some(min);
        self
    }

    pub fn maximum(mut self, max: f64) -> Self {
        self.schema.constraints.maximum = Some(max);
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.schema.constraints.pattern = Some(pattern.to_string());
        self
    }

    pub fn one_of(mut self, values: Vec<Value>) -> Self {
        self.schema.constraints.enum_values = Some(values);
        self
    }

    pub fn min_items(mut self, min: usize) -> Self {
        self.schema.constraints.min_items = Some(min);
        self
    }

    pub fn max_items(mut self, max: usize) -> Self {
        self.schema.constraints.max_items = Some(max);
        self
    }

    pub fn build(self) -> PropertySchema {
        self.schema
    }
}

/// Builder for object schemas
#[derive(Debug, Clone)]
pub struct SchemaBuilder {
    schema: JsonSchema,
}

impl SchemaBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        let mut schema = JsonSchema::permissive(id);
        schema.additional_properties = false;
        Self { schema }
    }

    pub fn version(mut self, version: u32) -> Self {
        self.schema.version = version;
        self
    }

    pub fn required_property(mut self, name: &str, property: PropertySchema) -> Self {
        self.schema.required.push(name.to_string());
        self.schema.properties.insert(name.to_string(), property);
        self
    }

    pub fn optional_property(mut self, name: &str, property: PropertySchema) -> Self {
        self.schema.properties.insert(name.to_string(), property);
        self
    }

    pub fn additional_properties(mut self, allow: bool) -> Self {
        self.schema.additional_properties = allow;
        self
    }

    pub fn build(self) -> JsonSchema {
        self.schema
    }
}
