//! Structured, combinable error values
//!
//! [`AppErrors`] carries top-level messages plus per-field messages so that
//! validation steps can accumulate failures before reporting them at once.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};

use serde::{Deserialize, Serialize};

/// A message key with optional arguments (`error.data.exists`, `["a:b"]`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorMessage {
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
}

impl ErrorMessage {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(message: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            message: message.into(),
            args,
        }
    }
}

impl fmt::Display for ErrorMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.args.is_empty() {
            write!(f, "{}", self.message)
        } else {
            write!(f, "{}({})", self.message, self.args.join(", "))
        }
    }
}

/// Whole-entity and per-field error messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppErrors {
    #[serde(default)]
    pub errors: Vec<ErrorMessage>,
    #[serde(default)]
    pub field_errors: BTreeMap<String, Vec<ErrorMessage>>,
}

impl AppErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// A single top-level error
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            errors: vec![ErrorMessage::new(message)],
            field_errors: BTreeMap::new(),
        }
    }

    pub fn error_with_args(message: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            errors: vec![ErrorMessage::with_args(message, args)],
            field_errors: BTreeMap::new(),
        }
    }

    /// A single error attached to `field`
    pub fn field_error(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::field_error_with_args(field, message, Vec::new())
    }

    pub fn field_error_with_args(
        field: impl Into<String>,
        message: impl Into<String>,
        args: Vec<String>,
    ) -> Self {
        let mut field_errors = BTreeMap::new();
        field_errors.insert(field.into(), vec![ErrorMessage::with_args(message, args)]);
        Self {
            errors: Vec::new(),
            field_errors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty() && self.field_errors.values().all(Vec::is_empty)
    }

    /// Union of both error sets; field lists are merged by field name
    pub fn combine(mut self, other: AppErrors) -> Self {
        self.errors.extend(other.errors);
        for (field, messages) in other.field_errors {
            self.field_errors.entry(field).or_default().extend(messages);
        }
        self
    }

    /// `Ok(())` when nothing was accumulated
    pub fn into_result(self) -> Result<(), AppErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl Add for AppErrors {
    type Output = AppErrors;

    fn add(self, rhs: AppErrors) -> AppErrors {
        self.combine(rhs)
    }
}

impl AddAssign for AppErrors {
    fn add_assign(&mut self, rhs: AppErrors) {
        let lhs = std::mem::take(self);
        *self = lhs.combine(rhs);
    }
}

impl fmt::Display for AppErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = self.errors.iter().map(ToString::to_string).collect();
        for (field, messages) in &self.field_errors {
            for message in messages {
                parts.push(format!("{}: {}", field, message));
            }
        }
        write!(f, "{}", parts.join("; "))
    }
}
