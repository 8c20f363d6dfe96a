use thiserror::Error;

/// Failures that reach the caller of the extraction pipeline.
///
/// Everything below the top-level entry point degrades to an empty result
/// instead of returning one of these.
#[derive(Debug, Error)]
pub enum Error {
    #[error("not a RapidAPI listing URL: {url}")]
    UnrecognizedLocator { url: String },
}
