//! Domain-level constants.
//!
//! These constants define the defaults applied to persisted user records.

// =============================================================================
// User Records
// =============================================================================

/// Avatar index assigned to newly registered users
pub const DEFAULT_IMAGE_INDEX: i32 = 0;
