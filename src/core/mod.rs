pub mod directive;
pub mod dispatcher;
pub mod health;
pub mod model;
pub mod pipeline;

pub use directive::Directive;
pub use dispatcher::{StreamClose, StreamDispatcher};
pub use health::{HealthRegistry, ServingStatus};
pub use model::{HeaderEntry, IncomingEvent, Mutation, MutationSet, Outcome, Reply};
pub use pipeline::MutationPipeline;
