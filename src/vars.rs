//! Typed page-variable store
//!
//! One store per rendered template instance. Variables are declared once at
//! instance initialization from their `initial` attribute, mutated only by
//! the action pipeline, and dropped with the instance. Islands subscribe to
//! the variable names their rendering reads; every successful `set` reports
//! the subscribed island ids so the runtime re-renders them before returning
//! to the caller.

use crate::error::{Result, TemplateError};
use crate::types::{Value, VarType};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct Variable {
    pub name: String,
    pub var_type: VarType,
    pub value: Value,
}

#[derive(Debug, Default)]
pub struct VariableStore {
    variables: HashMap<String, Variable>,
    subscribers: HashMap<String, BTreeSet<usize>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a variable with its initial raw value. Numeric-string and
    /// boolean-string coercion happens here and only here; later writes are
    /// strictly type-checked.
    pub fn declare(&mut self, name: &str, var_type: VarType, initial: Option<String>) -> Result<()> {
        if !valid_name(name) {
            return Err(TemplateError::action(format!(
                "invalid variable name '{}'",
                name
            )));
        }
        if self.variables.contains_key(name) {
            return Err(TemplateError::action(format!(
                "variable '{}' is already declared",
                name
            )));
        }
        let value = match initial {
            Some(raw) => coerce_initial(&raw, var_type).ok_or_else(|| {
                TemplateError::action(format!(
                    "initial value '{}' does not fit declared type {}",
                    raw, var_type
                ))
            })?,
            None => default_value(var_type),
        };
        self.variables.insert(
            name.to_string(),
            Variable {
                name: name.to_string(),
                var_type,
                value,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.variables.get(name).map(|v| &v.value)
    }

    pub fn type_of(&self, name: &str) -> Option<VarType> {
        self.variables.get(name).map(|v| v.var_type)
    }

    pub fn is_declared(&self, name: &str) -> bool {
        self.variables.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.variables.keys().map(|k| k.as_str())
    }

    /// Write a variable. A type-mismatched write is rejected, not coerced.
    /// On success, returns the ids of islands subscribed to this variable so
    /// the caller can re-render them synchronously.
    pub fn set(&mut self, name: &str, value: Value) -> Result<Vec<usize>> {
        let var = self.variables.get_mut(name).ok_or_else(|| {
            TemplateError::action(format!("write to undeclared variable '{}'", name))
        })?;
        if !var.var_type.matches(&value) {
            return Err(TemplateError::action(format!(
                "variable '{}' is declared {} but was written a {}",
                name,
                var.var_type,
                value_shape(&value)
            )));
        }
        var.value = value;
        Ok(self
            .subscribers
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default())
    }

    /// Register an island as a reader of `name`.
    pub fn subscribe(&mut self, name: &str, island_id: usize) {
        self.subscribers
            .entry(name.to_string())
            .or_default()
            .insert(island_id);
    }

    pub fn subscribers_of(&self, name: &str) -> Vec<usize> {
        self.subscribers
            .get(name)
            .map(|ids| ids.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn valid_name(name: &str) -> bool {
    static NAME_RE: std::sync::OnceLock<Regex> = std::sync::OnceLock::new();
    NAME_RE
        .get_or_init(|| Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap())
        .is_match(name)
}

fn default_value(var_type: VarType) -> Value {
    match var_type {
        VarType::String => Value::String(String::new()),
        VarType::Number => Value::Number(0.0),
        VarType::Boolean => Value::Bool(false),
        VarType::Array => Value::Array(Vec::new()),
    }
}

fn coerce_initial(raw: &str, var_type: VarType) -> Option<Value> {
    match var_type {
        VarType::String => Some(Value::String(raw.to_string())),
        VarType::Number => raw.trim().parse::<f64>().ok().map(Value::Number),
        VarType::Boolean => match raw.trim() {
            "true" => Some(Value::Bool(true)),
            "false" => Some(Value::Bool(false)),
            _ => None,
        },
        VarType::Array => {
            // Arrays initialize from a JSON literal, e.g. `[1, 2, 3]`.
            let json: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
            match Value::from(json) {
                Value::Array(items) => Some(Value::Array(items)),
                _ => None,
            }
        }
    }
}

fn value_shape(value: &Value) -> &'static str {
    match value {
        Value::Empty => "empty",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
