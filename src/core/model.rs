//! Header mutation data model.
//!
//! These types are transport-agnostic: the ext_proc adapter converts protobuf
//! messages into [`IncomingEvent`]s and turns [`Reply`] values back into
//! protobuf responses. Everything here lives for a single stream turn.
use bytes::Bytes;
use http::StatusCode;

/// A single header as received from (or sent to) the proxy.
///
/// Keys are compared case-insensitively through [`HeaderEntry::is`]; the
/// original spelling is kept for output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Case-insensitive key comparison.
    pub fn is(&self, name: &str) -> bool {
        self.key.eq_ignore_ascii_case(name)
    }
}

/// Kinds of message the proxy can send on a processing stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    RequestHeaders,
    RequestBody,
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::RequestHeaders => "request_headers",
            EventKind::RequestBody => "request_body",
            EventKind::RequestTrailers => "request_trailers",
            EventKind::ResponseHeaders => "response_headers",
            EventKind::ResponseBody => "response_body",
            EventKind::ResponseTrailers => "response_trailers",
        }
    }
}

/// One event received on a processing stream.
///
/// Only request headers carry data the pipeline looks at; the remaining
/// variants are markers answered with an unmodified continue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IncomingEvent {
    RequestHeaders(Vec<HeaderEntry>),
    RequestBody,
    RequestTrailers,
    ResponseHeaders,
    ResponseBody,
    ResponseTrailers,
}

impl IncomingEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            IncomingEvent::RequestHeaders(_) => EventKind::RequestHeaders,
            IncomingEvent::RequestBody => EventKind::RequestBody,
            IncomingEvent::RequestTrailers => EventKind::RequestTrailers,
            IncomingEvent::ResponseHeaders => EventKind::ResponseHeaders,
            IncomingEvent::ResponseBody => EventKind::ResponseBody,
            IncomingEvent::ResponseTrailers => EventKind::ResponseTrailers,
        }
    }
}

/// A single header operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    /// Add the header, keeping any existing values.
    Append(HeaderEntry),
    /// Replace every existing value, or add the header if absent.
    Overwrite(HeaderEntry),
    /// Drop every value of the header.
    Remove(String),
}

impl Mutation {
    pub fn append(key: impl Into<String>, value: impl Into<String>) -> Self {
        Mutation::Append(HeaderEntry::new(key, value))
    }

    pub fn overwrite(key: impl Into<String>, value: impl Into<String>) -> Self {
        Mutation::Overwrite(HeaderEntry::new(key, value))
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Mutation::Remove(key.into())
    }

    pub fn key(&self) -> &str {
        match self {
            Mutation::Append(entry) | Mutation::Overwrite(entry) => &entry.key,
            Mutation::Remove(key) => key,
        }
    }
}

/// How a compiled header set should be applied by the proxy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetAction {
    Append,
    Overwrite,
}

/// A [`MutationSet`] flattened into the two lists the proxy understands.
///
/// The proxy applies `remove` before `set`, in list order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompiledMutations {
    pub set: Vec<(HeaderEntry, SetAction)>,
    pub remove: Vec<String>,
}

/// Ordered header operations produced for one request.
///
/// Operations are meant to be applied in sequence, so a `Remove` cancels any
/// earlier `Append`/`Overwrite` of the same key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MutationSet {
    ops: Vec<Mutation>,
}

impl MutationSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mutation: Mutation) {
        self.ops.push(mutation);
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Mutation> {
        self.ops.iter()
    }

    pub fn as_slice(&self) -> &[Mutation] {
        &self.ops
    }

    /// Flatten into set/remove lists while keeping sequential semantics.
    ///
    /// Because removals are applied first by the proxy, a `Remove` has to
    /// erase the sets queued before it for the same key; sets queued after it
    /// then land on the emptied header as expected.
    pub fn compile(&self) -> CompiledMutations {
        let mut compiled = CompiledMutations::default();
        for op in &self.ops {
            match op {
                Mutation::Append(entry) => compiled.set.push((entry.clone(), SetAction::Append)),
                Mutation::Overwrite(entry) => {
                    compiled.set.push((entry.clone(), SetAction::Overwrite))
                }
                Mutation::Remove(key) => {
                    compiled.set.retain(|(entry, _)| !entry.is(key));
                    if !compiled.remove.iter().any(|k| k.eq_ignore_ascii_case(key)) {
                        compiled.remove.push(key.clone());
                    }
                }
            }
        }
        compiled
    }
}

impl From<Vec<Mutation>> for MutationSet {
    fn from(ops: Vec<Mutation>) -> Self {
        Self { ops }
    }
}

impl Extend<Mutation> for MutationSet {
    fn extend<T: IntoIterator<Item = Mutation>>(&mut self, iter: T) {
        self.ops.extend(iter);
    }
}

impl<'a> IntoIterator for &'a MutationSet {
    type Item = &'a Mutation;
    type IntoIter = std::slice::Iter<'a, Mutation>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}

/// Result of evaluating the pipeline for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Forward the request upstream with these mutations applied.
    Continue(MutationSet),
    /// Answer the client directly; the request never reaches the backend.
    Terminal {
        status: StatusCode,
        headers: Vec<HeaderEntry>,
        body: Bytes,
    },
}

impl Outcome {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Outcome::Terminal { .. })
    }
}

/// What the dispatcher sends back for one received event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Pipeline decision for a request-headers event.
    RequestHeaders(Outcome),
    /// Unmodified continue for every other event kind.
    PassThrough(EventKind),
}
