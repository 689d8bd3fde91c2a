//! Typed argument schemas for tools.
//!
//! A schema is declared once when the registry is built. It validates raw
//! call arguments (types, required fields, bounds) before a handler runs,
//! fills in defaults, and renders the JSON Schema advertised by `tools/list`.

use crate::error::ToolError;
use serde_json::{json, Map, Value};

/// Declared type of an argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgType {
    String,
    Integer,
    Boolean,
    Object,
    StringArray,
    ObjectArray,
}

impl ArgType {
    fn json_type(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Object => "object",
            Self::StringArray | Self::ObjectArray => "array",
        }
    }

    fn describe(self) -> &'static str {
        match self {
            Self::String => "a string",
            Self::Integer => "an integer",
            Self::Boolean => "a boolean",
            Self::Object => "an object",
            Self::StringArray => "an array of strings",
            Self::ObjectArray => "an array of objects",
        }
    }

    fn accepts(self, value: &Value) -> bool {
        match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::StringArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::ObjectArray => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_object)),
        }
    }
}

/// One declared argument.
#[derive(Debug, Clone)]
pub struct ArgSpec {
    pub name: &'static str,
    pub description: &'static str,
    pub ty: ArgType,
    pub required: bool,
    pub default: Option<Value>,
    pub minimum: Option<i64>,
    pub maximum: Option<i64>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
    /// Keys every element of an object array must carry, with their types.
    pub item_keys: &'static [(&'static str, ArgType)],
}

impl ArgSpec {
    fn new(name: &'static str, ty: ArgType, description: &'static str) -> Self {
        Self {
            name,
            description,
            ty,
            required: false,
            default: None,
            minimum: None,
            maximum: None,
            min_length: None,
            max_length: None,
            min_items: None,
            max_items: None,
            item_keys: &[],
        }
    }

    pub fn string(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::String, description)
    }

    pub fn integer(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Integer, description)
    }

    pub fn boolean(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Boolean, description)
    }

    pub fn object(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::Object, description)
    }

    pub fn string_array(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::StringArray, description)
    }

    pub fn object_array(name: &'static str, description: &'static str) -> Self {
        Self::new(name, ArgType::ObjectArray, description)
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn default(mut self, value: Value) -> Self {
        self.default = Some(value);
        self
    }

    pub fn range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }

    pub fn length(mut self, min: usize, max: usize) -> Self {
        self.min_length = Some(min);
        self.max_length = Some(max);
        self
    }

    pub fn items(mut self, min: usize, max: usize) -> Self {
        self.min_items = Some(min);
        self.max_items = Some(max);
        self
    }

    pub fn item_keys(mut self, keys: &'static [(&'static str, ArgType)]) -> Self {
        self.item_keys = keys;
        self
    }

    fn check(&self, value: &Value) -> Result<(), ToolError> {
        if !self.ty.accepts(value) {
            return Err(ToolError::invalid(
                self.name,
                format!("expected {}", self.ty.describe()),
            ));
        }

        if let Some(n) = value.as_i64() {
            if let Some(min) = self.minimum.filter(|min| n < *min) {
                return Err(ToolError::invalid(self.name, format!("must be at least {min}")));
            }
            if let Some(max) = self.maximum.filter(|max| n > *max) {
                return Err(ToolError::invalid(self.name, format!("must be at most {max}")));
            }
        } else if value.is_u64() {
            // Larger than i64::MAX: over any declared maximum.
            if let Some(max) = self.maximum {
                return Err(ToolError::invalid(self.name, format!("must be at most {max}")));
            }
        }

        if let Some(text) = value.as_str() {
            let len = text.chars().count();
            if let Some(min) = self.min_length {
                if len < min || (min > 0 && text.trim().is_empty()) {
                    return Err(ToolError::invalid(
                        self.name,
                        format!("must be at least {min} non-blank characters"),
                    ));
                }
            }
            if let Some(max) = self.max_length.filter(|max| len > *max) {
                return Err(ToolError::invalid(
                    self.name,
                    format!("must be at most {max} characters"),
                ));
            }
        }

        if let Some(items) = value.as_array() {
            if let Some(min) = self.min_items.filter(|min| items.len() < *min) {
                return Err(ToolError::invalid(
                    self.name,
                    format!("must contain at least {min} items"),
                ));
            }
            if let Some(max) = self.max_items.filter(|max| items.len() > *max) {
                return Err(ToolError::invalid(
                    self.name,
                    format!("must contain at most {max} items, got {}", items.len()),
                ));
            }
            for (idx, item) in items.iter().enumerate() {
                for (key, ty) in self.item_keys {
                    let path = format!("{}[{}].{}", self.name, idx, key);
                    match item.get(*key) {
                        None | Some(Value::Null) => {
                            return Err(ToolError::invalid(path, "missing required property"))
                        }
                        Some(v) if !ty.accepts(v) => {
                            return Err(ToolError::invalid(path, format!("expected {}", ty.describe())))
                        }
                        Some(_) => {}
                    }
                }
            }
        }

        Ok(())
    }

    fn to_json_schema(&self) -> Value {
        let mut prop = json!({
            "type": self.ty.json_type(),
            "description": self.description,
        });
        match self.ty {
            ArgType::StringArray => prop["items"] = json!({ "type": "string" }),
            ArgType::ObjectArray => {
                let mut item = json!({ "type": "object" });
                if !self.item_keys.is_empty() {
                    let props: Map<String, Value> = self
                        .item_keys
                        .iter()
                        .map(|(k, ty)| (k.to_string(), json!({ "type": ty.json_type() })))
                        .collect();
                    item["properties"] = Value::Object(props);
                    item["required"] = json!(self.item_keys.iter().map(|(k, _)| *k).collect::<Vec<_>>());
                }
                prop["items"] = item;
            }
            _ => {}
        }
        if let Some(default) = &self.default {
            prop["default"] = default.clone();
        }
        if let Some(min) = self.minimum {
            prop["minimum"] = json!(min);
        }
        if let Some(max) = self.maximum {
            prop["maximum"] = json!(max);
        }
        if let Some(min) = self.min_length {
            prop["minLength"] = json!(min);
        }
        if let Some(max) = self.max_length {
            prop["maxLength"] = json!(max);
        }
        if let Some(min) = self.min_items {
            prop["minItems"] = json!(min);
        }
        if let Some(max) = self.max_items {
            prop["maxItems"] = json!(max);
        }
        prop
    }
}

/// Ordered argument list of a tool.
#[derive(Debug, Clone, Default)]
pub struct ArgSchema {
    args: Vec<ArgSpec>,
}

impl ArgSchema {
    pub fn new(args: Vec<ArgSpec>) -> Self {
        Self { args }
    }

    pub fn args(&self) -> &[ArgSpec] {
        &self.args
    }

    /// Validate raw arguments and return them with defaults applied.
    ///
    /// Unknown arguments are rejected; `null` counts as absent.
    pub fn validate(&self, raw: &Value) -> Result<Map<String, Value>, ToolError> {
        let empty = Map::new();
        let given = match raw {
            Value::Object(map) => map,
            Value::Null => &empty,
            _ => return Err(ToolError::invalid("arguments", "expected an object")),
        };

        if let Some(unknown) = given
            .keys()
            .find(|key| !self.args.iter().any(|a| a.name == key.as_str()))
        {
            return Err(ToolError::invalid(unknown.as_str(), "unknown argument"));
        }

        let mut out = Map::new();
        for spec in &self.args {
            match given.get(spec.name).filter(|v| !v.is_null()) {
                Some(value) => {
                    spec.check(value)?;
                    out.insert(spec.name.to_string(), value.clone());
                }
                None if spec.required => {
                    return Err(ToolError::invalid(spec.name, "missing required argument"));
                }
                None => {
                    if let Some(default) = &spec.default {
                        out.insert(spec.name.to_string(), default.clone());
                    }
                }
            }
        }
        Ok(out)
    }

    /// JSON Schema object advertised to clients.
    pub fn to_json_schema(&self) -> Value {
        let properties: Map<String, Value> = self
            .args
            .iter()
            .map(|a| (a.name.to_string(), a.to_json_schema()))
            .collect();
        let required: Vec<&str> = self.args.iter().filter(|a| a.required).map(|a| a.name).collect();
        json!({
            "type": "object",
            "properties": properties,
            "required": required,
            "additionalProperties": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn schema() -> ArgSchema {
        ArgSchema::new(vec![
            ArgSpec::string("base_id", "Base").required(),
            ArgSpec::integer("max_records", "Limit").range(1, 100).default(json!(10)),
            ArgSpec::object_array("records", "Items")
                .items(1, 10)
                .item_keys(&[("id", ArgType::String), ("fields", ArgType::Object)]),
        ])
    }

    fn field_of(err: ToolError) -> String {
        assert_eq!(err.kind(), ErrorKind::InvalidArgs);
        match err {
            ToolError::InvalidArgs { field, .. } => field,
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn applies_defaults() {
        let args = schema().validate(&json!({"base_id": "app1"})).unwrap();
        assert_eq!(args["max_records"], json!(10));
        assert!(!args.contains_key("records"));
    }

    #[test]
    fn names_the_offending_field() {
        let s = schema();
        assert_eq!(field_of(s.validate(&json!({})).unwrap_err()), "base_id");
        assert_eq!(
            field_of(s.validate(&json!({"base_id": 5})).unwrap_err()),
            "base_id"
        );
        assert_eq!(
            field_of(s.validate(&json!({"base_id": "a", "max_records": 101})).unwrap_err()),
            "max_records"
        );
        assert_eq!(
            field_of(s.validate(&json!({"base_id": "a", "extra": true})).unwrap_err()),
            "extra"
        );
        assert_eq!(
            field_of(s.validate(&json!({"base_id": "a", "max_records": 2.5})).unwrap_err()),
            "max_records"
        );
    }

    #[test]
    fn checks_array_bounds_and_item_shape() {
        let s = schema();
        let eleven: Vec<Value> = (0..11).map(|i| json!({"id": format!("rec{i}"), "fields": {}})).collect();
        assert_eq!(
            field_of(s.validate(&json!({"base_id": "a", "records": eleven})).unwrap_err()),
            "records"
        );
        assert_eq!(
            field_of(
                s.validate(&json!({"base_id": "a", "records": [{"id": "r1", "fields": {}}, {"fields": {}}]}))
                    .unwrap_err()
            ),
            "records[1].id"
        );
    }

    #[test]
    fn renders_json_schema() {
        let rendered = schema().to_json_schema();
        assert_eq!(rendered["required"], json!(["base_id"]));
        assert_eq!(rendered["properties"]["max_records"]["maximum"], json!(100));
        assert_eq!(
            rendered["properties"]["records"]["items"]["required"],
            json!(["id", "fields"])
        );
    }
}
