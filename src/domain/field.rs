use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::hash::Hash;

/// Value held by an input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    Flag(bool),
    Number(i64),
}

impl FieldValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_owned())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Flag(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Validation {
    Valid,
    Invalid(String),
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validation::Valid)
    }
}

/// Per-field state. `validation` is `None` until the field is first validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentFieldState {
    pub value: FieldValue,
    pub validation: Option<Validation>,
    pub has_focus: bool,
    pub should_highlight_validation_error: bool,
}

impl ComponentFieldState {
    pub fn new(value: impl Into<FieldValue>) -> Self {
        Self {
            value: value.into(),
            validation: None,
            has_focus: false,
            should_highlight_validation_error: false,
        }
    }

    pub fn with_validation(mut self, validation: Validation) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn is_valid(&self) -> bool {
        self.validation.as_ref().is_some_and(Validation::is_valid)
    }
}

/// Identifies a field of a component, in display order.
pub trait FieldId: Debug + Copy + Eq + Hash + Send + Sync + 'static {
    fn all() -> &'static [Self];
}
