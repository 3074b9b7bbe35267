pub mod header_processor;
pub mod processing_stream;

pub use header_processor::HeaderProcessor;
pub use processing_stream::{ProcessingStream, StreamError, StreamResult};
