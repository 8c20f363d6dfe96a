pub mod batch;
pub mod config;
pub mod enrich;
pub mod error;
pub mod fetch;
pub mod locator;
pub mod model;
pub mod parser;
pub mod pipeline;
pub mod spec;

pub use error::Error;
pub use locator::ApiLocator;
pub use model::{ExtractedEndpoint, ParameterDescriptor, RawDocument};
pub use pipeline::Pipeline;
pub use spec::CanonicalApiSpec;
