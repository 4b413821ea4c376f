//! Answer validation keyed by question type.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde_json::{Number, Value};
use thiserror::Error;

use crate::core::module::{QuestionSpec, QuestionType};
use crate::error::type_name;

/// A raw answer value that does not fit its question.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

fn invalid(reason: impl Into<String>) -> ValidationError {
    ValidationError(reason.into())
}

/// Checks and normalizes raw answer values.
pub trait AnswerValidator {
    fn validate(&self, question: &QuestionSpec, raw: &Value) -> Result<Value, ValidationError>;
}

/// Validation rules for the built-in question types.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinValidator;

impl AnswerValidator for BuiltinValidator {
    fn validate(&self, question: &QuestionSpec, raw: &Value) -> Result<Value, ValidationError> {
        match question.kind {
            QuestionType::Text | QuestionType::Longtext => text(raw).map(Value::String),
            QuestionType::Email => email(raw).map(Value::String),
            QuestionType::Url => url(raw).map(Value::String),
            QuestionType::YesNo => yes_no(raw).map(|v| Value::String(v.to_string())),
            QuestionType::Choice => choice(question, raw).map(Value::String),
            QuestionType::MultipleChoice => multiple_choice(question, raw),
            QuestionType::Integer => integer(question, raw),
            QuestionType::Real => real(question, raw),
            QuestionType::Date => date(raw).map(Value::String),
            QuestionType::Interstitial => Err(invalid("interstitial questions take no answer")),
            QuestionType::Module | QuestionType::ModuleSet => Err(invalid(format!(
                "{} questions are answered with apps, not values",
                question.kind.as_str()
            ))),
        }
    }
}

fn string(raw: &Value) -> Result<&str, ValidationError> {
    raw.as_str()
        .ok_or_else(|| invalid(format!("invalid data type ({})", type_name(raw))))
}

fn text(raw: &Value) -> Result<String, ValidationError> {
    let value = string(raw)?.trim();
    if value.is_empty() {
        return Err(invalid("value is empty"));
    }
    Ok(value.to_string())
}

fn email(raw: &Value) -> Result<String, ValidationError> {
    let value = text(raw)?;
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !domain.contains('@')
        }
        None => false,
    };
    if !valid || value.chars().any(char::is_whitespace) {
        return Err(invalid(format!("'{value}' is not a valid email address")));
    }
    Ok(value)
}

fn url(raw: &Value) -> Result<String, ValidationError> {
    let value = text(raw)?;
    let host = value
        .strip_prefix("https://")
        .or_else(|| value.strip_prefix("http://"))
        .map(|rest| rest.split(['/', '?', '#']).next().unwrap_or(""));
    match host {
        Some(host) if !host.is_empty() && !value.chars().any(char::is_whitespace) => Ok(value),
        _ => Err(invalid(format!("'{value}' is not a valid http(s) URL"))),
    }
}

fn yes_no(raw: &Value) -> Result<&'static str, ValidationError> {
    match raw {
        Value::Bool(true) => Ok("yes"),
        Value::Bool(false) => Ok("no"),
        Value::String(s) if s == "yes" => Ok("yes"),
        Value::String(s) if s == "no" => Ok("no"),
        other => Err(invalid(format!("expected 'yes' or 'no' (got {other})"))),
    }
}

fn choice(question: &QuestionSpec, raw: &Value) -> Result<String, ValidationError> {
    let value = string(raw)?;
    if !question.choices.iter().any(|c| c.key == value) {
        return Err(invalid(format!("'{value}' is not one of the choices")));
    }
    Ok(value.to_string())
}

fn multiple_choice(question: &QuestionSpec, raw: &Value) -> Result<Value, ValidationError> {
    let items = raw
        .as_array()
        .ok_or_else(|| invalid(format!("expected a list of choices (got {})", type_name(raw))))?;
    let mut seen = HashSet::new();
    let mut keys = Vec::with_capacity(items.len());
    for item in items {
        let key = choice(question, item)?;
        if !seen.insert(key.clone()) {
            return Err(invalid(format!("'{key}' was chosen more than once")));
        }
        keys.push(Value::String(key));
    }
    check_range(question, keys.len() as f64, "number of choices")?;
    Ok(Value::Array(keys))
}

fn integer(question: &QuestionSpec, raw: &Value) -> Result<Value, ValidationError> {
    let value = match raw {
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| invalid(format!("'{n}' is not an integer")))?,
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(format!("'{s}' is not an integer")))?,
        other => return Err(invalid(format!("invalid data type ({})", type_name(other)))),
    };
    check_range(question, value as f64, "value")?;
    Ok(Value::Number(value.into()))
}

fn real(question: &QuestionSpec, raw: &Value) -> Result<Value, ValidationError> {
    let value = match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("'{n}' is not a number")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{s}' is not a number")))?,
        other => return Err(invalid(format!("invalid data type ({})", type_name(other)))),
    };
    check_range(question, value, "value")?;
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| invalid(format!("'{value}' is not a finite number")))
}

fn date(raw: &Value) -> Result<String, ValidationError> {
    let value = text(raw)?;
    let parsed = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .map_err(|err| invalid(format!("'{value}' is not a YYYY-MM-DD date: {err}")))?;
    Ok(parsed.format("%Y-%m-%d").to_string())
}

fn check_range(question: &QuestionSpec, value: f64, what: &str) -> Result<(), ValidationError> {
    if let Some(min) = question.min
        && value < min
    {
        return Err(invalid(format!("{what} must be at least {min}")));
    }
    if let Some(max) = question.max
        && value > max
    {
        return Err(invalid(format!("{what} must be at most {max}")));
    }
    Ok(())
}
