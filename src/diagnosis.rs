//! Reasoning-service contract.
//!
//! The service answers with loosely-typed JSON. It is deserialized into
//! [`Diagnosis`] as-is, then [`Diagnosis::usable_corrections`] validates
//! each item into a strict [`Correction`], dropping anything without a line
//! number or replacement text. Only validated corrections become a
//! [`PatchBatch`].

use crate::edit::{EditOperation, PatchBatch};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Failures of the reasoning service itself.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota or rate limit exceeded: {0}")]
    Quota(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed proposal: {0}")]
    Malformed(String),
}

/// Turns (source, error output, file name) into a correction proposal.
pub trait ReasoningService {
    fn analyze(&self, code: &str, error: &str, filename: &str) -> Result<Diagnosis, ServiceError>;
}

impl<T: ReasoningService + ?Sized> ReasoningService for &T {
    fn analyze(&self, code: &str, error: &str, filename: &str) -> Result<Diagnosis, ServiceError> {
        (**self).analyze(code, error, filename)
    }
}

impl<T: ReasoningService + ?Sized> ReasoningService for Box<T> {
    fn analyze(&self, code: &str, error: &str, filename: &str) -> Result<Diagnosis, ServiceError> {
        (**self).analyze(code, error, filename)
    }
}

/// The service's answer, as sent.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Diagnosis {
    #[serde(default)]
    pub corrections: Vec<RawCorrection>,
    #[serde(default)]
    pub type_erreur: Option<String>,
    #[serde(default)]
    pub cause: Option<String>,
    #[serde(default)]
    pub conseil: Option<String>,
}

/// One correction item before validation.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawCorrection {
    #[serde(default, alias = "ligne", deserialize_with = "lenient_line")]
    pub line: Option<usize>,
    #[serde(default)]
    pub code_original: Option<String>,
    #[serde(default)]
    pub code_corrige: Option<String>,
    #[serde(default)]
    pub explication: Option<String>,
}

/// Accept `4`, `"4"` and `null`; anything else counts as missing.
fn lenient_line<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// A validated correction: a positive line number and non-empty replacement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Correction {
    pub line: usize,
    pub original: Option<String>,
    pub replacement: String,
    pub explanation: Option<String>,
}

impl Correction {
    pub fn to_operation(&self) -> EditOperation {
        EditOperation::replace(self.line, self.replacement.clone())
    }
}

impl RawCorrection {
    /// Validate into a [`Correction`], or `None` when a required field is
    /// missing.
    pub fn validate(&self) -> Option<Correction> {
        let line = self.line.filter(|&line| line > 0)?;
        let replacement = self.code_corrige.as_deref().map(str::trim)?;
        if replacement.is_empty() {
            return None;
        }

        Some(Correction {
            line,
            original: self.code_original.clone(),
            replacement: replacement.to_string(),
            explanation: self.explication.clone(),
        })
    }
}

impl Diagnosis {
    /// Parse a JSON answer.
    pub fn from_json(text: &str) -> Result<Self, ServiceError> {
        serde_json::from_str(text).map_err(|e| ServiceError::Malformed(e.to_string()))
    }

    /// Parse a free-form model answer by taking its outermost `{...}` span.
    ///
    /// Models often wrap JSON in prose or code fences.
    pub fn from_response_text(text: &str) -> Result<Self, ServiceError> {
        let trimmed = text.trim();
        match (trimmed.find('{'), trimmed.rfind('}')) {
            (Some(start), Some(end)) if start < end => Self::from_json(&trimmed[start..=end]),
            _ => Self::from_json(trimmed),
        }
    }

    /// Corrections that survive validation, in the service's order.
    pub fn usable_corrections(&self) -> Vec<Correction> {
        self.corrections
            .iter()
            .filter_map(RawCorrection::validate)
            .collect()
    }

    /// Build the patch batch, or `None` when nothing is usable.
    pub fn to_batch(&self) -> Option<PatchBatch> {
        let batch: PatchBatch = self
            .usable_corrections()
            .iter()
            .map(Correction::to_operation)
            .collect();
        (!batch.is_empty()).then_some(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::EditAction;

    #[test]
    fn test_parses_service_answer() {
        let diagnosis = Diagnosis::from_json(
            r#"{
                "type_erreur": "ZeroDivisionError",
                "ligne_erreur": 4,
                "cause": "y is zero",
                "corrections": [
                    {"ligne": 4, "code_original": "print(x / y)",
                     "code_corrige": "print(x / y if y != 0 else 0)",
                     "explication": "guard the division"}
                ],
                "conseil": "validate inputs"
            }"#,
        )
        .unwrap();

        assert_eq!(diagnosis.type_erreur.as_deref(), Some("ZeroDivisionError"));
        assert_eq!(diagnosis.conseil.as_deref(), Some("validate inputs"));
        let corrections = diagnosis.usable_corrections();
        assert_eq!(corrections.len(), 1);
        assert_eq!(corrections[0].line, 4);
        assert_eq!(corrections[0].replacement, "print(x / y if y != 0 else 0)");
    }

    #[test]
    fn test_line_alias_and_string_numbers() {
        let diagnosis = Diagnosis::from_json(
            r#"{"corrections": [
                {"line": 2, "code_corrige": "a"},
                {"ligne": "3", "code_corrige": "b"},
                {"line": "three", "code_corrige": "c"}
            ]}"#,
        )
        .unwrap();

        let lines: Vec<_> = diagnosis.usable_corrections().iter().map(|c| c.line).collect();
        assert_eq!(lines, vec![2, 3]);
    }

    #[test]
    fn test_items_missing_fields_are_dropped() {
        let diagnosis = Diagnosis::from_json(
            r#"{"corrections": [
                {"ligne": 4, "code_original": "x / y"},
                {"code_corrige": "x = 1"},
                {"ligne": 0, "code_corrige": "x = 1"},
                {"ligne": 5, "code_corrige": "   "}
            ]}"#,
        )
        .unwrap();

        assert!(diagnosis.usable_corrections().is_empty());
        assert!(diagnosis.to_batch().is_none());
    }

    #[test]
    fn test_batch_trims_replacement() {
        let diagnosis = Diagnosis::from_json(
            r#"{"corrections": [{"ligne": 7, "code_corrige": "    return 0\n"}]}"#,
        )
        .unwrap();

        let batch = diagnosis.to_batch().unwrap();
        let op = &batch.operations()[0];
        assert_eq!(op.action, EditAction::Replace);
        assert_eq!(op.line, 7);
        assert_eq!(op.content, "return 0");
    }

    #[test]
    fn test_response_text_with_fences() {
        let text = "Here is the fix:\n```json\n{\"corrections\": [{\"ligne\": 1, \"code_corrige\": \"x = {}\"}]}\n```\n";
        let diagnosis = Diagnosis::from_response_text(text).unwrap();
        assert_eq!(diagnosis.usable_corrections()[0].replacement, "x = {}");
    }

    #[test]
    fn test_response_text_without_json() {
        let result = Diagnosis::from_response_text("I cannot help with that.");
        assert!(matches!(result, Err(ServiceError::Malformed(_))));
    }

    #[test]
    fn test_missing_corrections_key_is_empty() {
        let diagnosis = Diagnosis::from_json(r#"{"type_erreur": "NameError"}"#).unwrap();
        assert!(diagnosis.corrections.is_empty());
    }
}
