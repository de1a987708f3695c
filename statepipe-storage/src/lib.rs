//! Statepipe Storage - Repository Trait and Edit Pipeline
//!
//! Defines the seam between the document merger and whatever stores the
//! states table. The Postgres implementation lives in `statepipe-pg`.

pub mod memory;
pub mod pipeline;
pub mod repository;

pub use memory::InMemoryRepository;
pub use pipeline::EditPipeline;
pub use repository::{PersistMode, StateRepository};
