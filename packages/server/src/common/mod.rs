// Shared types used across domains

pub mod errors;
pub mod filters;
pub mod id;

pub use errors::ServiceError;
pub use filters::Filters;
pub use id::Id;
