//! Input schemas and argument validation.

use serde_json::{Map, Value, json};

use crate::ToolError;

/// Expected type of one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    String,
    Integer { minimum: Option<i64> },
    Boolean,
    /// One of a fixed set of names, matched case-insensitively.
    Enum(&'static [&'static str]),
}

impl ParamKind {
    fn json_type(self) -> &'static str {
        match self {
            ParamKind::String | ParamKind::Enum(_) => "string",
            ParamKind::Integer { .. } => "integer",
            ParamKind::Boolean => "boolean",
        }
    }
}

/// One declared parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub kind: ParamKind,
    pub required: bool,
    pub description: &'static str,
}

impl Param {
    pub const fn required(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: true,
            description,
        }
    }

    pub const fn optional(name: &'static str, kind: ParamKind, description: &'static str) -> Self {
        Self {
            name,
            kind,
            required: false,
            description,
        }
    }

    /// Check one value, returning its normalized form.
    fn check(&self, value: &Value) -> Result<Value, ToolError> {
        match self.kind {
            ParamKind::String => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ToolError::invalid(self.name, "expected a string"))?;
                if self.required && s.trim().is_empty() {
                    return Err(ToolError::invalid(self.name, "must not be empty"));
                }
                Ok(Value::String(s.to_string()))
            }
            ParamKind::Integer { minimum } => {
                let n = value
                    .as_i64()
                    .ok_or_else(|| ToolError::invalid(self.name, "expected an integer"))?;
                if let Some(min) = minimum.filter(|min| n < *min) {
                    return Err(ToolError::invalid(self.name, format!("must be at least {min}")));
                }
                Ok(json!(n))
            }
            ParamKind::Boolean => value
                .as_bool()
                .map(Value::Bool)
                .ok_or_else(|| ToolError::invalid(self.name, "expected a boolean")),
            ParamKind::Enum(members) => {
                let s = value
                    .as_str()
                    .ok_or_else(|| ToolError::invalid(self.name, "expected a string"))?;
                members
                    .iter()
                    .find(|m| m.eq_ignore_ascii_case(s.trim()))
                    .map(|m| Value::String((*m).to_string()))
                    .ok_or_else(|| {
                        ToolError::invalid(
                            self.name,
                            format!("'{s}' is not one of: {}", members.join(", ")),
                        )
                    })
            }
        }
    }

    fn to_schema(&self) -> Value {
        let mut prop = Map::new();
        prop.insert("type".into(), json!(self.kind.json_type()));
        prop.insert("description".into(), json!(self.description));
        match self.kind {
            ParamKind::Enum(members) => {
                prop.insert("enum".into(), json!(members));
            }
            ParamKind::Integer { minimum: Some(min) } => {
                prop.insert("minimum".into(), json!(min));
            }
            _ => {}
        }
        Value::Object(prop)
    }
}

/// Validate `args` against `params`.
///
/// Declared parameters are checked in order, then undeclared fields are
/// rejected in sorted order, so the reported field is reproducible.
pub fn validate(params: &[Param], args: Option<&Value>) -> Result<Arguments, ToolError> {
    let empty = Map::new();
    let input = match args {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(_) => return Err(ToolError::invalid("arguments", "expected an object")),
    };

    let mut values = Map::new();
    for param in params {
        match input.get(param.name) {
            None | Some(Value::Null) => {
                if param.required {
                    return Err(ToolError::invalid(param.name, "missing required field"));
                }
            }
            Some(value) => {
                values.insert(param.name.to_string(), param.check(value)?);
            }
        }
    }

    let mut extra: Vec<&String> = input
        .keys()
        .filter(|k| !params.iter().any(|p| p.name == k.as_str()))
        .collect();
    extra.sort();
    if let Some(field) = extra.first() {
        return Err(ToolError::invalid(field.as_str(), "unknown field"));
    }

    Ok(Arguments(values))
}

/// JSON Schema object describing `params`.
pub fn input_schema(params: &[Param]) -> Value {
    let properties: Map<String, Value> = params
        .iter()
        .map(|p| (p.name.to_string(), p.to_schema()))
        .collect();
    let required: Vec<&str> = params.iter().filter(|p| p.required).map(|p| p.name).collect();

    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false,
    })
}

/// Arguments that passed validation, with enum values canonicalized.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments(Map<String, Value>);

impl Arguments {
    pub fn str(&self, name: &str) -> Option<&str> {
        self.0.get(name).and_then(Value::as_str)
    }

    pub fn integer(&self, name: &str) -> Option<i64> {
        self.0.get(name).and_then(Value::as_i64)
    }

    pub fn require_str(&self, name: &str) -> Result<&str, ToolError> {
        self.str(name)
            .ok_or_else(|| ToolError::invalid(name, "missing required field"))
    }

    pub fn require_integer(&self, name: &str) -> Result<i64, ToolError> {
        self.integer(name)
            .ok_or_else(|| ToolError::invalid(name, "missing required field"))
    }

    /// Parse a validated field into a typed enum.
    pub fn parse<T: std::str::FromStr>(&self, name: &str) -> Result<T, ToolError>
    where
        T::Err: std::fmt::Display,
    {
        self.require_str(name)?
            .parse()
            .map_err(|e: T::Err| ToolError::invalid(name, e.to_string()))
    }
}
