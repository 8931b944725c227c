// Common types and helpers shared by the chain follower crates

pub mod crypto;
pub mod hash;
pub mod params;
pub mod types;

// Flattened re-exports
pub use self::hash::*;
pub use self::types::*;
