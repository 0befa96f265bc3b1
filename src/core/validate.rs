//! Request-body checks that run before any storage access.
//!
//! Each endpoint deserializes its body into a form struct with optional
//! fields, then turns it into a domain value through [`Validate`]. Every
//! failing field is reported at once, in the order the checks ran.

use std::sync::OnceLock;

use chrono::NaiveDate;
use regex::Regex;

use crate::core::errors::{ApiError, FieldError};

pub trait Validate {
    type Valid;

    fn validate(self) -> Result<Self::Valid, ApiError>;
}

fn email_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Regex should compile")
    })
}

pub fn is_email(value: &str) -> bool {
    email_regex().is_match(value)
}

/// Accumulates field errors for one request body.
#[derive(Debug, Default)]
pub struct Checks {
    errors: Vec<FieldError>,
}

impl Checks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&mut self, param: &str, msg: &str) {
        self.errors.push(FieldError::new(param, msg));
    }

    /// Trimmed, non-empty value or an error for `param`.
    pub fn required(&mut self, param: &str, value: Option<&str>, msg: &str) -> Option<String> {
        match value.map(str::trim).filter(|v| !v.is_empty()) {
            Some(v) => Some(v.to_string()),
            None => {
                self.fail(param, msg);
                None
            }
        }
    }

    /// Lower-cased address if it is syntactically an email.
    pub fn email(&mut self, param: &str, value: Option<&str>, msg: &str) -> Option<String> {
        match value.map(str::trim).filter(|v| is_email(v)) {
            Some(v) => Some(v.to_lowercase()),
            None => {
                self.fail(param, msg);
                None
            }
        }
    }

    /// Non-empty value, returned untrimmed (passwords keep their spaces).
    pub fn present(&mut self, param: &str, value: Option<String>, msg: &str) -> Option<String> {
        match value.filter(|v| !v.is_empty()) {
            Some(v) => Some(v),
            None => {
                self.fail(param, msg);
                None
            }
        }
    }

    pub fn min_len(&mut self, param: &str, value: Option<&str>, min: usize, msg: &str) -> bool {
        if value.map_or(true, |v| v.chars().count() < min) {
            self.fail(param, msg);
            return false;
        }
        true
    }

    pub fn max_len(&mut self, param: &str, value: Option<&str>, max: usize, msg: &str) {
        if value.is_some_and(|v| v.chars().count() > max) {
            self.fail(param, msg);
        }
    }

    pub fn required_date(&mut self, param: &str, value: Option<&str>, msg: &str) -> Option<NaiveDate> {
        let raw = self.required(param, value, msg)?;
        self.parse_date(param, &raw)
    }

    pub fn optional_date(&mut self, param: &str, value: Option<&str>) -> Option<NaiveDate> {
        let raw = value.map(str::trim).filter(|v| !v.is_empty())?;
        self.parse_date(param, raw)
    }

    fn parse_date(&mut self, param: &str, raw: &str) -> Option<NaiveDate> {
        match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            Ok(date) => Some(date),
            Err(_) => {
                self.fail(param, "Date must be formatted as YYYY-MM-DD");
                None
            }
        }
    }

    pub fn finish(self) -> Result<(), ApiError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::Validation(self.errors))
        }
    }
}

/// Trimmed optional text, with blank values treated as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_syntax() {
        assert!(is_email("a@b.com"));
        assert!(is_email("first.last+tag@example.co.uk"));
        assert!(!is_email("a@b"));
        assert!(!is_email("not an email"));
        assert!(!is_email("@b.com"));
        assert!(!is_email(""));
    }

    #[test]
    fn checks_collect_all_failures() {
        let mut checks = Checks::new();
        assert!(checks.required("name", Some("   "), "Name is required").is_none());
        assert!(checks.email("email", Some("nope"), "Please include a valid email").is_none());
        assert_eq!(
            checks.email("email", Some(" Ada@Example.COM "), "unused"),
            Some("ada@example.com".to_string())
        );
        match checks.finish() {
            Err(ApiError::Validation(errors)) => {
                let params: Vec<_> = errors.iter().map(|e| e.param.as_str()).collect();
                assert_eq!(params, ["name", "email"]);
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn dates_must_be_iso() {
        let mut checks = Checks::new();
        assert_eq!(
            checks.required_date("from", Some("2019-06-01"), "From date is required"),
            NaiveDate::from_ymd_opt(2019, 6, 1)
        );
        assert!(checks.optional_date("to", None).is_none());
        assert!(checks.finish().is_ok());

        let mut checks = Checks::new();
        assert!(checks.optional_date("to", Some("06/01/2019")).is_none());
        assert!(checks.finish().is_err());
    }

    #[test]
    fn max_len_counts_chars() {
        let mut checks = Checks::new();
        checks.max_len("text", Some("ééé"), 3, "too long");
        assert!(checks.finish().is_ok());
    }
}
