pub mod classify;
pub mod contracts;
pub mod dedup;
pub mod empty_buckets;
pub mod engine;
pub mod handler;
pub mod handlers;
pub mod registry;
pub mod source;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use classify::{classify, ErrorClass};
pub use dedup::{DedupCache, DEDUP_MAX};
pub use empty_buckets::{EmptyBucketCache, EMPTY_BUCKET_TTL_SECS};
pub use engine::{BucketReport, ProjectionEngine, TickReport, UnitOutcome, UnitReport};
pub use handler::{HandlerError, ProjectionHandler};
pub use registry::DispatchRegistry;
pub use source::{EventSource, SourceError};
