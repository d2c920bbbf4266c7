//! The action script language.
//!
//! Generated code is a JSON document: a list of statements (or an object
//! with a `steps` list, or a single statement). Each statement is tagged by
//! `op`:
//!
//! ```json
//! [
//!   {"op": "call", "fn": "tap", "args": ["Login"], "save_as": "tapped"},
//!   {"op": "set", "key": "attempts", "value": 1},
//!   {"op": "assert", "value": "$shared.tapped", "equals": true},
//!   {"op": "return", "value": "$shared.attempts"}
//! ]
//! ```
//!
//! String values are references when they start with `$`: `$shared` is the
//! whole shared context, `$shared.a.b` a path inside it, and `$name` a value
//! binding. `$$` escapes a literal dollar sign.

use serde::Deserialize;
use serde_json::Value;

use super::context::{ActionContext, Binding, SharedContext};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Statement {
    Call {
        #[serde(rename = "fn")]
        function: String,
        #[serde(default)]
        args: Vec<Value>,
        #[serde(default)]
        save_as: Option<String>,
    },
    Set {
        key: String,
        value: Value,
    },
    Remove {
        key: String,
    },
    Assert {
        value: Value,
        #[serde(default)]
        equals: Option<Value>,
        #[serde(default)]
        message: Option<String>,
    },
    Return {
        value: Value,
    },
}

/// A parsed action script
#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub statements: Vec<Statement>,
}

impl Script {
    pub fn parse(code: &str) -> Result<Self, String> {
        let document: Value = serde_json::from_str(code.trim()).map_err(|e| format!("syntax error: {}", e))?;
        let statements = match document {
            Value::Array(_) => serde_json::from_value(document),
            Value::Object(mut map) if map.contains_key("steps") => {
                serde_json::from_value(map.remove("steps").unwrap_or(Value::Null))
            }
            Value::Object(_) => serde_json::from_value(document).map(|s| vec![s]),
            other => return Err(format!("expected a statement list, found {}", type_name(&other))),
        }
        .map_err(|e| format!("invalid statement: {}", e))?;
        Ok(Self { statements })
    }

    /// Run every statement in order, returning the script's result value.
    ///
    /// The result is the `return` value if one runs, otherwise the value of
    /// the last call, otherwise `null`.
    pub async fn run(&self, context: &ActionContext, shared: &mut SharedContext) -> Result<Value, String> {
        let mut last = Value::Null;
        for (index, statement) in self.statements.iter().enumerate() {
            let at = |e: String| format!("statement {}: {}", index + 1, e);
            match statement {
                Statement::Call { function, args, save_as } => {
                    let Some(Binding::Function(f)) = context.get(function) else {
                        return Err(at(format!("'{}' is not an available function", function)));
                    };
                    let args = args
                        .iter()
                        .map(|a| resolve(a, context, shared))
                        .collect::<Result<Vec<_>, _>>()
                        .map_err(at)?;
                    last = f.call(args).await.map_err(|e| at(format!("{} failed: {:#}", function, e)))?;
                    if let Some(key) = save_as {
                        shared.insert(key.clone(), last.clone());
                    }
                }
                Statement::Set { key, value } => {
                    let value = resolve(value, context, shared).map_err(at)?;
                    shared.insert(key.clone(), value);
                }
                Statement::Remove { key } => {
                    shared.remove(key);
                }
                Statement::Assert { value, equals, message } => {
                    let actual = resolve(value, context, shared).map_err(at)?;
                    let passed = match equals {
                        Some(expected) => actual == resolve(expected, context, shared).map_err(at)?,
                        None => truthy(&actual),
                    };
                    if !passed {
                        let detail = message.clone().unwrap_or_else(|| match equals {
                            Some(expected) => format!("expected {} but found {}", expected, actual),
                            None => format!("expected a truthy value but found {}", actual),
                        });
                        return Err(at(format!("assertion failed: {}", detail)));
                    }
                }
                Statement::Return { value } => return resolve(value, context, shared).map_err(at),
            }
        }
        Ok(last)
    }
}

fn resolve(value: &Value, context: &ActionContext, shared: &SharedContext) -> Result<Value, String> {
    match value {
        Value::String(s) => resolve_reference(s, context, shared),
        Value::Array(items) => items.iter().map(|v| resolve(v, context, shared)).collect::<Result<_, _>>().map(Value::Array),
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| resolve(v, context, shared).map(|v| (k.clone(), v)))
            .collect::<Result<_, _>>()
            .map(Value::Object),
        other => Ok(other.clone()),
    }
}

fn resolve_reference(s: &str, context: &ActionContext, shared: &SharedContext) -> Result<Value, String> {
    if let Some(literal) = s.strip_prefix("$$") {
        return Ok(Value::String(format!("${}", literal)));
    }
    let Some(name) = s.strip_prefix('$') else {
        return Ok(Value::String(s.to_string()));
    };
    if name == "shared" {
        return Ok(shared.to_value());
    }
    if let Some(path) = name.strip_prefix("shared.") {
        // missing keys read as null so scripts can test for them
        return Ok(shared.lookup(path).cloned().unwrap_or(Value::Null));
    }
    match context.get(name) {
        Some(Binding::Value(v)) => Ok(v.clone()),
        Some(Binding::Function(_)) => Err(format!("'{}' is a function and cannot be used as a value", name)),
        None => Err(format!("unknown variable '{}'", name)),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
