use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

use crate::Result;

/// Severity of a single validation result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ValidationKind {
    #[default]
    Success = 0,
    /// Passes, but the user should look at it.
    Warning = 1,
    /// Passes, with an observation attached.
    Information = 2,
    /// Fails. The value must be changed.
    Error = 3,
}

impl fmt::Display for ValidationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ValidationKind::Success => "success",
            ValidationKind::Warning => "warning",
            ValidationKind::Information => "information",
            ValidationKind::Error => "error",
        };
        f.write_str(label)
    }
}

/// One outcome produced by a validation rule.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationResult {
    pub kind: ValidationKind,
    pub message: String,
    /// Error returned by the validator itself, if the rule could not run.
    #[serde(skip)]
    pub cause: Option<Arc<anyhow::Error>>,
    /// Free-form payload for presentation layers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl ValidationResult {
    pub fn new(kind: ValidationKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            cause: None,
            extra: None,
        }
    }

    /// Converts an error raised while a validator ran into an `Error` result.
    pub fn from_failure(error: anyhow::Error) -> Self {
        Self {
            kind: ValidationKind::Error,
            message: format!("Exception while validating: {}", error),
            cause: Some(Arc::new(error)),
            extra: None,
        }
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = Some(extra);
        self
    }

    pub fn cause(&self) -> Option<&anyhow::Error> {
        self.cause.as_deref()
    }

    pub fn is_succeeded(&self) -> bool {
        self.kind != ValidationKind::Error
    }
}

/// Ordered results of the last validation pass of one property.
///
/// A collection is succeeded when it holds no `Error` result; warnings and
/// information never fail it.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ValidationResultCollection {
    results: Vec<ValidationResult>,
}

impl ValidationResultCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, result: ValidationResult) {
        self.results.push(result);
    }

    pub fn add(&mut self, kind: ValidationKind, message: impl Into<String>) {
        self.push(ValidationResult::new(kind, message));
    }

    /// Adds a result of `kind` when `condition` holds. Returns whether it did.
    pub fn validate(&mut self, condition: bool, message: impl Into<String>, kind: ValidationKind) -> bool {
        if condition {
            self.add(kind, message);
        }
        condition
    }

    pub fn error(&mut self, condition: bool, message: impl Into<String>) -> bool {
        self.validate(condition, message, ValidationKind::Error)
    }

    pub fn warning(&mut self, condition: bool, message: impl Into<String>) -> bool {
        self.validate(condition, message, ValidationKind::Warning)
    }

    pub fn information(&mut self, condition: bool, message: impl Into<String>) -> bool {
        self.validate(condition, message, ValidationKind::Information)
    }

    /// Runs `validator` against `value` and records its message with `kind`.
    pub fn validate_using<T, V>(
        &mut self,
        validator: &V,
        value: &T,
        message: Option<&str>,
        kind: ValidationKind,
    ) -> bool
    where
        T: ?Sized,
        V: Validator<T> + ?Sized,
    {
        match validator.validate(value, message) {
            Some(failure) => {
                self.add(kind, failure);
                true
            }
            None => false,
        }
    }

    pub fn is_succeeded(&self) -> bool {
        self.results.iter().all(ValidationResult::is_succeeded)
    }

    pub fn has_kind(&self, kind: ValidationKind) -> bool {
        self.results.iter().any(|r| r.kind == kind)
    }

    pub fn error_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| r.kind == ValidationKind::Error)
            .count()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.kind == ValidationKind::Error)
    }

    /// Every result that is not a plain `Success`.
    pub fn non_success(&self) -> impl Iterator<Item = &ValidationResult> {
        self.results.iter().filter(|r| r.kind != ValidationKind::Success)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ValidationResult> {
        self.results.iter()
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn clear(&mut self) {
        self.results.clear();
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

impl std::ops::Index<usize> for ValidationResultCollection {
    type Output = ValidationResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.results[index]
    }
}

impl Extend<ValidationResult> for ValidationResultCollection {
    fn extend<I: IntoIterator<Item = ValidationResult>>(&mut self, iter: I) {
        self.results.extend(iter);
    }
}

impl<'a> IntoIterator for &'a ValidationResultCollection {
    type Item = &'a ValidationResult;
    type IntoIter = std::slice::Iter<'a, ValidationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}

impl IntoIterator for ValidationResultCollection {
    type Item = ValidationResult;
    type IntoIter = std::vec::IntoIter<ValidationResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.into_iter()
    }
}

/// Reusable rule checked against a value.
pub trait Validator<T: ?Sized>: Send + Sync {
    /// Returns the failure message, or `None` when `value` passes.
    /// A caller-supplied `message` replaces the default one.
    fn validate(&self, value: &T, message: Option<&str>) -> Option<String>;
}

/// Values that may carry text (absent text is `None`).
pub trait TextValue {
    fn text(&self) -> Option<&str>;
}

impl TextValue for str {
    fn text(&self) -> Option<&str> {
        Some(self)
    }
}

impl TextValue for String {
    fn text(&self) -> Option<&str> {
        Some(self.as_str())
    }
}

impl TextValue for Option<String> {
    fn text(&self) -> Option<&str> {
        self.as_deref()
    }
}

impl<T: TextValue + ?Sized> TextValue for &T {
    fn text(&self) -> Option<&str> {
        (**self).text()
    }
}

fn failure(message: Option<&str>, default: &str) -> Option<String> {
    Some(message.unwrap_or(default).to_string())
}

/// Fails on `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotNull;

impl<T> Validator<Option<T>> for NotNull {
    fn validate(&self, value: &Option<T>, message: Option<&str>) -> Option<String> {
        match value {
            Some(_) => None,
            None => failure(message, "Value cannot be null"),
        }
    }
}

/// Fails on absent, empty or whitespace-only text.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotEmpty;

impl<V: TextValue + ?Sized> Validator<V> for NotEmpty {
    fn validate(&self, value: &V, message: Option<&str>) -> Option<String> {
        match value.text() {
            Some(text) if !text.trim().is_empty() => None,
            _ => failure(message, "Cannot be empty"),
        }
    }
}

lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
            .expect("email pattern is valid");
}

pub fn is_valid_email(text: &str) -> bool {
    EMAIL_REGEX.is_match(text)
}

pub fn is_valid_url(text: &str) -> bool {
    match url::Url::parse(text) {
        Ok(parsed) => {
            matches!(parsed.scheme(), "http" | "https" | "ftp") && parsed.host_str().is_some()
        }
        Err(_) => false,
    }
}

/// Fails on text that is not an e-mail address. Absent text passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidEmail;

impl<V: TextValue + ?Sized> Validator<V> for ValidEmail {
    fn validate(&self, value: &V, message: Option<&str>) -> Option<String> {
        match value.text() {
            Some(text) if !is_valid_email(text) => failure(message, "Invalid Email format"),
            _ => None,
        }
    }
}

/// Fails on text that is not an absolute http, https or ftp URL. Absent text passes.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidUrl;

impl<V: TextValue + ?Sized> Validator<V> for ValidUrl {
    fn validate(&self, value: &V, message: Option<&str>) -> Option<String> {
        match value.text() {
            Some(text) if !is_valid_url(text) => failure(message, "Invalid Url"),
            _ => None,
        }
    }
}

/// Fails when the value lies outside an inclusive range.
#[derive(Debug, Clone)]
pub struct ValidRange<T> {
    range: RangeInclusive<T>,
}

impl<T> ValidRange<T> {
    pub fn new(range: RangeInclusive<T>) -> Self {
        Self { range }
    }
}

impl<T> Validator<T> for ValidRange<T>
where
    T: PartialOrd + fmt::Display + Send + Sync,
{
    fn validate(&self, value: &T, message: Option<&str>) -> Option<String> {
        if self.range.contains(value) {
            return None;
        }
        Some(match message {
            Some(message) => message.to_string(),
            None => format!(
                "Value out of range: {}..{}",
                self.range.start(),
                self.range.end()
            ),
        })
    }
}

/// Fails when a sequence holds the same item twice.
#[derive(Debug, Clone, Copy, Default)]
pub struct AreDistinct;

impl<T: PartialEq> Validator<[T]> for AreDistinct {
    fn validate(&self, value: &[T], message: Option<&str>) -> Option<String> {
        let repeated = value
            .iter()
            .enumerate()
            .any(|(i, item)| value[..i].contains(item));
        if repeated {
            failure(message, "Repeated items found")
        } else {
            None
        }
    }
}

impl<T: PartialEq> Validator<Vec<T>> for AreDistinct {
    fn validate(&self, value: &Vec<T>, message: Option<&str>) -> Option<String> {
        <Self as Validator<[T]>>::validate(self, value.as_slice(), message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_success_ignores_warnings() {
        let mut results = ValidationResultCollection::new();
        results.warning(true, "looks odd");
        results.information(true, "fyi");
        assert!(results.is_succeeded());
        assert_eq!(results.len(), 2);

        results.error(true, "broken");
        assert!(!results.is_succeeded());
        assert_eq!(results.error_count(), 1);
        assert_eq!(results.non_success().count(), 3);
    }

    #[test]
    fn condition_false_adds_nothing() {
        let mut results = ValidationResultCollection::new();
        assert!(!results.error(false, "never"));
        assert!(results.is_empty());
        assert!(results.is_succeeded());
    }

    #[test]
    fn failure_result_keeps_cause() {
        let result = ValidationResult::from_failure(anyhow::anyhow!("boom"));
        assert_eq!(result.kind, ValidationKind::Error);
        assert_eq!(result.message, "Exception while validating: boom");
        assert_eq!(result.cause().map(|e| e.to_string()), Some("boom".to_string()));
    }

    #[test]
    fn not_null_and_not_empty() {
        assert_eq!(
            NotNull.validate(&None::<String>, None),
            Some("Value cannot be null".to_string())
        );
        assert!(NotNull.validate(&Some(1), None).is_none());

        assert!(NotEmpty.validate("  ", None).is_some());
        assert!(NotEmpty.validate(&None::<String>, Some("required")).as_deref() == Some("required"));
        assert!(NotEmpty.validate(&"abc".to_string(), None).is_none());
    }

    #[test]
    fn email_and_url_formats() {
        assert!(ValidEmail.validate("john@example.com", None).is_none());
        assert_eq!(
            ValidEmail.validate("john@", None),
            Some("Invalid Email format".to_string())
        );
        assert!(ValidEmail.validate(&None::<String>, None).is_none());

        assert!(ValidUrl.validate("https://example.com/a?b=c", None).is_none());
        assert!(ValidUrl.validate("example.com", None).is_some());
        assert!(ValidUrl.validate("mailto:john@example.com", None).is_some());
    }

    #[test]
    fn range_is_inclusive() {
        let range = ValidRange::new(0..=120);
        assert!(range.validate(&0, None).is_none());
        assert!(range.validate(&120, None).is_none());
        assert_eq!(
            range.validate(&121, None),
            Some("Value out of range: 0..120".to_string())
        );
    }

    #[test]
    fn distinct_items() {
        assert!(AreDistinct.validate(&vec![1, 2, 3], None).is_none());
        assert_eq!(
            AreDistinct.validate(&vec![1, 2, 1], None),
            Some("Repeated items found".to_string())
        );
    }

    #[test]
    fn validate_using_records_kind() {
        let mut results = ValidationResultCollection::new();
        results.validate_using(&NotEmpty, "", Some("name required"), ValidationKind::Warning);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ValidationKind::Warning);
        assert_eq!(results[0].message, "name required");
        assert!(results.is_succeeded());
    }

    #[test]
    fn results_serialize_without_cause() {
        let mut results = ValidationResultCollection::new();
        results.push(ValidationResult::from_failure(anyhow::anyhow!("x")));
        let json = results.to_json().unwrap();
        assert!(json.contains("\"kind\":\"Error\""));
        assert!(!json.contains("cause"));
    }
}
