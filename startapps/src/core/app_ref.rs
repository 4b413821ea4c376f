//! App references: where an app comes from and what it is called.

use serde_json::{Map, Value, json};

use crate::error::{InputError, type_name};

/// A decoded `app` value from the data file.
#[derive(Debug, Clone, PartialEq)]
pub enum AppReference {
    /// `"<dir>/<name>"`: a local app directory.
    Path { dir: String, name: String },
    /// `{source: {...}, name: "..."}`: an app inside an explicit source.
    Structured { source: Map<String, Value>, name: String },
}

impl AppReference {
    /// Validate and normalize a raw reference.
    ///
    /// A path is split at its last `/`: everything before is the source
    /// directory (trailing slashes removed, `/` kept for the filesystem
    /// root), the last component is the app name.
    pub fn decode(raw: &Value) -> Result<Self, InputError> {
        match raw {
            Value::String(path) => {
                let (dir, name) = match path.rfind('/') {
                    Some(idx) => {
                        let head = path[..=idx].trim_end_matches('/');
                        (if head.is_empty() { "/" } else { head }, &path[idx + 1..])
                    }
                    None => ("", path.as_str()),
                };
                if name.is_empty() {
                    return Err(InputError::InvalidReference(format!(
                        "path '{path}' does not end in an app name"
                    )));
                }
                Ok(Self::Path {
                    dir: dir.to_string(),
                    name: name.to_string(),
                })
            }
            Value::Object(map) => {
                let source = match map.get("source") {
                    Some(Value::Object(source)) => source.clone(),
                    Some(other) => {
                        return Err(InputError::InvalidReference(format!(
                            "'source' must be a mapping (got {})",
                            type_name(other)
                        )));
                    }
                    None => {
                        return Err(InputError::InvalidReference(
                            "missing 'source' mapping".to_string(),
                        ));
                    }
                };
                let name = match map.get("name") {
                    Some(Value::String(name)) => name.clone(),
                    Some(other) => {
                        return Err(InputError::InvalidReference(format!(
                            "'name' must be a string (got {})",
                            type_name(other)
                        )));
                    }
                    None => {
                        return Err(InputError::InvalidReference(
                            "missing 'name' string".to_string(),
                        ));
                    }
                };
                Ok(Self::Structured { source, name })
            }
            other => Err(InputError::InvalidReference(format!(
                "expected a path string or a mapping (got {})",
                type_name(other)
            ))),
        }
    }

    /// Source connection spec for this reference.
    pub fn source_spec(&self) -> Value {
        match self {
            Self::Path { dir, .. } => json!({ "type": "local", "path": dir }),
            Self::Structured { source, .. } => Value::Object(source.clone()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Path { name, .. } | Self::Structured { name, .. } => name,
        }
    }
}
