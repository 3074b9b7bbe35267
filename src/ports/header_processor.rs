use crate::core::model::{HeaderEntry, Outcome};

/// HeaderProcessor defines the port for deciding what happens to a request's headers.
///
/// Implementations must be pure with respect to the request: the outcome may
/// depend only on `headers` and on immutable configuration.
pub trait HeaderProcessor: Send + Sync + 'static {
    /// Evaluate one request-headers event
    ///
    /// # Arguments
    /// * `headers` - The request headers in the order the proxy sent them
    ///
    /// # Returns
    /// `Outcome::Continue` with the mutations to apply, or `Outcome::Terminal`
    /// to answer the client directly
    fn process_request_headers(&self, headers: &[HeaderEntry]) -> Outcome;
}
