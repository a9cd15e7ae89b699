// crates/workload-trust-core/src/model/clock.rs
// ============================================================================
// Module: Clock
// Description: Wall-clock abstraction for expiry decisions.
// Purpose: Let cache expiry and assertion windows be tested deterministically.
// Dependencies: time
// ============================================================================

//! ## Overview
//! Key cache expiry and SAML validity windows compare against [`Clock::now`].
//! Production code uses [`SystemClock`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use time::OffsetDateTime;

// ============================================================================
// SECTION: Clock
// ============================================================================

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Returns the current UTC time.
    fn now(&self) -> OffsetDateTime;
}

/// Clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Clock pinned to a fixed instant.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub OffsetDateTime);

impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        self.0
    }
}
