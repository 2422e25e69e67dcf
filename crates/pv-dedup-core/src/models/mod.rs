//! Domain models for case deduplication.

mod case;
mod linkage;
mod matching;

pub use case::*;
pub use linkage::*;
pub use matching::*;
