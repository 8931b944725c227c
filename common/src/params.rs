//! Protocol constants used by the chain follower

/// Security parameter `k`: maximum rollback depth in blocks
pub const SECURITY_PARAMETER_K: u64 = 2160;

/// Number of immutable blocks that triggers a migration to a chunk file
pub const MIGRATION_BATCH: usize = 100;

/// Slots per epoch in the Byron era
pub const BYRON_EPOCH_LENGTH: u64 = 21600;
