//! Key pattern filter.
//!
//! A pure predicate over object keys, applied by the object source before a
//! task is enqueued and again by each worker before the remote call. A key
//! passes when it matches the include regex (if any) and does not match the
//! exclude regex (if any).

use fancy_regex::Regex;
use tracing::{debug, warn};

use crate::config::FilterConfig;

const FILTER_NAME: &str = "KeyFilter";

#[derive(Debug, Clone, Default)]
pub struct KeyFilter {
    include_regex: Option<Regex>,
    exclude_regex: Option<Regex>,
}

impl KeyFilter {
    pub fn new(config: &FilterConfig) -> Self {
        Self {
            include_regex: config.include_regex.clone(),
            exclude_regex: config.exclude_regex.clone(),
        }
    }

    pub fn is_match(&self, key: &str) -> bool {
        if let Some(include_regex) = &self.include_regex {
            if !evaluate(include_regex, key) {
                debug!(
                    name = FILTER_NAME,
                    key = key,
                    include_regex = include_regex.as_str(),
                    "object filtered."
                );
                return false;
            }
        }

        if let Some(exclude_regex) = &self.exclude_regex {
            if evaluate(exclude_regex, key) {
                debug!(
                    name = FILTER_NAME,
                    key = key,
                    exclude_regex = exclude_regex.as_str(),
                    "object filtered."
                );
                return false;
            }
        }

        true
    }

    pub fn is_empty(&self) -> bool {
        self.include_regex.is_none() && self.exclude_regex.is_none()
    }
}

// Backtracking limits surface as errors from fancy_regex; treat them as no match.
fn evaluate(regex: &Regex, key: &str) -> bool {
    match regex.is_match(key) {
        Ok(matched) => matched,
        Err(e) => {
            warn!(
                name = FILTER_NAME,
                key = key,
                regex = regex.as_str(),
                error = e.to_string(),
                "regex evaluation failed."
            );
            false
        }
    }
}
