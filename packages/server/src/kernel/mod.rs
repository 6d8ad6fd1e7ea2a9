// Infrastructure: external collaborators and background execution.
//
// These are infrastructure seams only - no set semantics. Business logic
// lives in domains::entityset and uses these traits.

pub mod jobs;
pub mod search;

pub use jobs::{JobRunner, JobRunnerConfig};
pub use search::{
    DisplayResolver, InMemorySearchService, NullResolver, SearchHits, SearchService,
};
