//! Flat dependency resolution: declared coordinates are matched against the
//! run's results, then the on-disk cache, then fetched from the configured
//! repositories by a bounded worker pool.

pub mod aar;
pub mod declarations;
pub mod error;
pub mod fetch;
pub mod resolver;

pub use declarations::collect_declarations;
pub use error::ResolveError;
pub use fetch::{Fetcher, HttpFetcher};
pub use resolver::{
    DependencyResolver, Origin, ResolveEvent, ResolveReport, ResolvedArtifact, ResolverOptions,
};
