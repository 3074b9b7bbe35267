//! Decoder for header directives.
//!
//! A directive is a JSON document carried in a single request header:
//!
//! ```json
//! {"addHeaders": {"x-tenant": "blue"}, "removeHeaders": ["x-debug"]}
//! ```
//!
//! Anything that is not an object of that shape is rejected with a
//! [`DirectiveError`]; the pipeline treats a rejected payload as absent.
use std::collections::BTreeMap;

use http::{HeaderName, HeaderValue};
use serde::Deserialize;
use thiserror::Error;

use crate::core::model::Mutation;

/// Reasons a directive payload was rejected.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum DirectiveError {
    /// The payload is not a JSON object of the expected shape
    #[error("malformed directive: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The payload is valid JSON but not an object
    #[error("directive must be a JSON object")]
    NotAnObject,
}

#[derive(Debug, Deserialize)]
struct DirectiveDocument {
    #[serde(default, rename = "addHeaders", alias = "add_headers")]
    add_headers: BTreeMap<String, String>,
    #[serde(default, rename = "removeHeaders", alias = "remove_headers")]
    remove_headers: Vec<String>,
}

/// Decoded header instructions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directive {
    /// Headers to append, sorted by key.
    pub add_headers: Vec<(String, String)>,
    /// Headers to remove, first spelling wins for case-insensitive duplicates.
    pub remove_headers: Vec<String>,
}

impl Directive {
    /// Decode a JSON payload, reporting why it was rejected.
    ///
    /// Entries that are not valid header names or values are dropped
    /// individually; the rest of the directive still applies.
    pub fn try_decode(payload: &str) -> Result<Self, DirectiveError> {
        let value: serde_json::Value = serde_json::from_str(payload)?;
        if !value.is_object() {
            return Err(DirectiveError::NotAnObject);
        }
        let document: DirectiveDocument = serde_json::from_value(value)?;

        let add_headers = document
            .add_headers
            .into_iter()
            .filter(|(name, value)| {
                let ok = is_valid_name(name) && HeaderValue::from_str(value).is_ok();
                if !ok {
                    tracing::debug!(header = %name, "dropping invalid addHeaders entry");
                }
                ok
            })
            .collect();

        let mut remove_headers: Vec<String> = Vec::new();
        for name in document.remove_headers {
            if !is_valid_name(&name) {
                tracing::debug!(header = %name, "dropping invalid removeHeaders entry");
                continue;
            }
            if !remove_headers.iter().any(|k| k.eq_ignore_ascii_case(&name)) {
                remove_headers.push(name);
            }
        }

        Ok(Self {
            add_headers,
            remove_headers,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.add_headers.is_empty() && self.remove_headers.is_empty()
    }

    /// Appends first (sorted by key), then removals.
    pub fn into_mutations(self) -> Vec<Mutation> {
        self.add_headers
            .into_iter()
            .map(|(key, value)| Mutation::append(key, value))
            .chain(self.remove_headers.into_iter().map(Mutation::remove))
            .collect()
    }
}

fn is_valid_name(name: &str) -> bool {
    HeaderName::from_bytes(name.as_bytes()).is_ok()
}
