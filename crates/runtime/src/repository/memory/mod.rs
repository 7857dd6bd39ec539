//! In-memory repository implementations for testing and development.

mod progression;

pub use progression::InMemoryProgressionRepository;
