//! Request-header mutation pipeline.
//!
//! Every request-headers event runs through five stages in a fixed order:
//!
//! 1. identification stamp (always appended)
//! 2. extraction of the directive payload, path and authorization presence
//! 3. path-conditional appends (`/api/v1`, `/admin`)
//! 4. security gate: `/protected` without authorization is answered with 401
//! 5. dynamic mutations decoded from the directive header
//!
//! Only the gate can end evaluation early, and when it does every mutation
//! computed so far is dropped. Evaluation is a pure function of the header
//! list, with no I/O and no state carried between requests.
use bytes::Bytes;
use http::StatusCode;

use crate::{
    config::PipelineConfig,
    core::{
        directive::Directive,
        model::{HeaderEntry, Mutation, MutationSet, Outcome},
    },
    ports::header_processor::HeaderProcessor,
};

const API_V1_SEGMENT: &str = "/api/v1";
const ADMIN_SEGMENT: &str = "/admin";
const PROTECTED_SEGMENT: &str = "/protected";

pub const API_VERSION_HEADER: &str = "x-api-version";
pub const ADMIN_ACCESS_HEADER: &str = "x-admin-access";

/// Values captured by the extraction stage.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Extracted {
    pub directive: Option<String>,
    pub path: Option<String>,
    pub authorized: bool,
}

/// The ordered rule engine.
#[derive(Debug, Clone)]
pub struct MutationPipeline {
    config: PipelineConfig,
}

impl MutationPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Evaluate all stages for one request's headers.
    pub fn evaluate(&self, headers: &[HeaderEntry]) -> Outcome {
        let mut mutations = MutationSet::new();

        mutations.push(Mutation::append(
            self.config.stamp_header.clone(),
            self.config.stamp_value.clone(),
        ));

        let extracted = self.extract(headers);
        let path = extracted.path.as_deref().unwrap_or_default();

        if path.contains(API_V1_SEGMENT) {
            mutations.push(Mutation::append(API_VERSION_HEADER, "v1"));
        }
        if path.contains(ADMIN_SEGMENT) {
            mutations.push(Mutation::append(ADMIN_ACCESS_HEADER, "true"));
        }

        if path.contains(PROTECTED_SEGMENT) && !extracted.authorized {
            tracing::info!(
                path = %path,
                discarded = mutations.len(),
                "rejecting unauthenticated request to protected path"
            );
            return unauthorized();
        }

        if let Some(payload) = extracted.directive.as_deref().filter(|p| !p.is_empty()) {
            mutations.extend(self.directive_mutations(payload));
        }

        Outcome::Continue(mutations)
    }

    /// Single pass over the headers; a repeated name keeps its last value.
    pub fn extract(&self, headers: &[HeaderEntry]) -> Extracted {
        let mut extracted = Extracted::default();
        for header in headers {
            if header.is(&self.config.directive_header) {
                extracted.directive = Some(header.value.clone());
            }
            if header.is(&self.config.path_header) {
                extracted.path = Some(header.value.clone());
            }
            if header.is(&self.config.authorization_header) {
                extracted.authorized = true;
            }
        }
        extracted
    }

    fn directive_mutations(&self, payload: &str) -> Vec<Mutation> {
        match Directive::try_decode(payload) {
            Ok(directive) => {
                let mut mutations = directive.into_mutations();
                if self.config.strip_directive_header {
                    mutations.push(Mutation::remove(self.config.directive_header.clone()));
                }
                tracing::debug!(
                    keys = ?mutations.iter().map(Mutation::key).collect::<Vec<_>>(),
                    "applied header directive"
                );
                mutations
            }
            Err(e) => {
                tracing::debug!(error = %e, "ignoring malformed header directive");
                Vec::new()
            }
        }
    }
}

impl Default for MutationPipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

impl HeaderProcessor for MutationPipeline {
    fn process_request_headers(&self, headers: &[HeaderEntry]) -> Outcome {
        self.evaluate(headers)
    }
}

/// Terminal outcome produced by the security gate.
pub fn unauthorized() -> Outcome {
    let body = serde_json::json!({ "error": "Authorization required" });
    Outcome::Terminal {
        status: StatusCode::UNAUTHORIZED,
        headers: vec![HeaderEntry::new("content-type", "application/json")],
        body: Bytes::from(body.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<HeaderEntry> {
        pairs.iter().map(|(k, v)| HeaderEntry::new(*k, *v)).collect()
    }

    fn continued(outcome: Outcome) -> Vec<Mutation> {
        match outcome {
            Outcome::Continue(set) => set.as_slice().to_vec(),
            other => panic!("expected Continue, got {other:?}"),
        }
    }

    fn stamp() -> Mutation {
        Mutation::append("x-processed-by", "eag-extproc")
    }

    #[test]
    fn test_stamp_only_for_plain_request() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[(":path", "/"), (":method", "GET")]));
        assert_eq!(continued(outcome), vec![stamp()]);
    }

    #[test]
    fn test_stamp_is_appended_even_when_present() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/"),
            ("x-processed-by", "someone-else"),
        ]));
        assert_eq!(continued(outcome), vec![stamp()]);
    }

    #[test]
    fn test_api_v1_with_authorization() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/api/v1/anything"),
            ("authorization", "Bearer t"),
        ]));
        assert_eq!(
            continued(outcome),
            vec![stamp(), Mutation::append("x-api-version", "v1")]
        );
    }

    #[test]
    fn test_conditional_order_ignores_substring_position() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[(":path", "/admin/x/api/v1")]));
        assert_eq!(
            continued(outcome),
            vec![
                stamp(),
                Mutation::append("x-api-version", "v1"),
                Mutation::append("x-admin-access", "true"),
            ]
        );
    }

    #[test]
    fn test_protected_without_authorization_is_rejected() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/admin/protected/api/v1"),
            ("instructions", r#"{"addHeaders":{"x-a":"1"}}"#),
        ]));

        assert_eq!(outcome, unauthorized());
        match outcome {
            Outcome::Terminal {
                status,
                headers,
                body,
            } => {
                assert_eq!(status, StatusCode::UNAUTHORIZED);
                assert_eq!(
                    headers,
                    vec![HeaderEntry::new("content-type", "application/json")]
                );
                assert_eq!(&body[..], br#"{"error":"Authorization required"}"#);
            }
            Outcome::Continue(_) => unreachable!(),
        }
    }

    #[test]
    fn test_protected_with_authorization_continues() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/protected/data"),
            ("Authorization", "Basic abc"),
        ]));
        assert_eq!(continued(outcome), vec![stamp()]);
    }

    #[test]
    fn test_empty_authorization_value_counts_as_present() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/protected"),
            ("authorization", ""),
        ]));
        assert!(!outcome.is_terminal());
    }

    #[test]
    fn test_last_occurrence_wins() {
        let pipeline = MutationPipeline::default();
        let extracted = pipeline.extract(&headers(&[
            (":path", "/protected"),
            ("instructions", "first"),
            (":PATH", "/public"),
            ("Instructions", "second"),
        ]));
        assert_eq!(extracted.path.as_deref(), Some("/public"));
        assert_eq!(extracted.directive.as_deref(), Some("second"));
        assert!(!extracted.authorized);

        assert!(!pipeline
            .evaluate(&headers(&[(":path", "/protected"), (":path", "/public")]))
            .is_terminal());
    }

    #[test]
    fn test_directive_mutations_follow_conditionals() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/api/v1/users"),
            (
                "instructions",
                r#"{"addHeaders":{"x-tenant":"blue","x-env":"prod"},"removeHeaders":["x-debug"]}"#,
            ),
        ]));

        assert_eq!(
            continued(outcome),
            vec![
                stamp(),
                Mutation::append("x-api-version", "v1"),
                Mutation::append("x-env", "prod"),
                Mutation::append("x-tenant", "blue"),
                Mutation::remove("x-debug"),
                Mutation::remove("instructions"),
            ]
        );
    }

    #[test]
    fn test_directive_header_kept_when_stripping_disabled() {
        let pipeline = MutationPipeline::new(PipelineConfig {
            strip_directive_header: false,
            ..PipelineConfig::default()
        });
        let outcome = pipeline.evaluate(&headers(&[
            (":path", "/"),
            ("instructions", r#"{"addHeaders":{"x-a":"1"}}"#),
        ]));
        assert_eq!(
            continued(outcome),
            vec![stamp(), Mutation::append("x-a", "1")]
        );
    }

    #[test]
    fn test_empty_or_malformed_directive_is_noop() {
        let pipeline = MutationPipeline::default();
        let baseline = pipeline.evaluate(&headers(&[(":path", "/admin")]));

        for payload in ["", "{not json", "[1,2]", r#"{"addHeaders":{"x":1}}"#] {
            let outcome =
                pipeline.evaluate(&headers(&[(":path", "/admin"), ("instructions", payload)]));
            assert_eq!(outcome, baseline, "payload: {payload}");
        }
    }

    #[test]
    fn test_identical_inputs_yield_identical_outcomes() {
        let pipeline = MutationPipeline::default();
        let input = headers(&[
            (":path", "/admin/api/v1"),
            ("instructions", r#"{"addHeaders":{"b":"2","a":"1"}}"#),
        ]);
        assert_eq!(pipeline.evaluate(&input), pipeline.evaluate(&input));
    }

    #[test]
    fn test_missing_path_never_terminates() {
        let pipeline = MutationPipeline::default();
        let outcome = pipeline.evaluate(&headers(&[("host", "example.com")]));
        assert_eq!(continued(outcome), vec![stamp()]);
    }

    #[test]
    fn test_custom_stamp() {
        let pipeline = MutationPipeline::new(PipelineConfig {
            stamp_header: "x-edge".to_string(),
            stamp_value: "blue".to_string(),
            ..PipelineConfig::default()
        });
        let outcome = pipeline.evaluate(&headers(&[(":path", "/")]));
        assert_eq!(continued(outcome), vec![Mutation::append("x-edge", "blue")]);
    }
}
