// HTTP routes
pub mod analysis;
pub mod entity_sets;
pub mod health;

pub use analysis::*;
pub use entity_sets::*;
pub use health::*;
