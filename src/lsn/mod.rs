//! Log sequence numbers.
//!
//! Every mutation is stamped with an **LSN**: a 26-character ULID string.
//! Plain string comparison on these tokens agrees with issue order, which
//! is what lets file ids double as visibility cursors and lets the
//! memtable reject stale writes with nothing more than a `<` on two
//! strings.
//!
//! [`LSN_MIN`] and [`LSN_MAX`] bound the token space: the former sorts
//! below every ULID ever issued, the latter above. They are cursor
//! sentinels, not issuable values.

use std::sync::Mutex;

use thiserror::Error;
use ulid::Generator;

#[cfg(test)]
mod tests;

/// A log sequence number — a 26-character ULID string.
///
/// Also used as the on-disk file id for sorted tables, so listing a
/// level directory and sorting the names yields creation order.
pub type Lsn = String;

/// Sorts below every issuable LSN. An empty visibility cursor resolves
/// to this: nothing is visible.
pub const LSN_MIN: &str = "00000000000000000000000000";

/// Sorts above every issuable LSN. A level whose cursor is `LSN_MAX`
/// has every file visible.
pub const LSN_MAX: &str = "ZZZZZZZZZZZZZZZZZZZZZZZZZZ";

/// Errors returned by [`SequenceIssuer`].
#[derive(Debug, Error)]
pub enum SequenceError {
    /// The issuer's internal lock was poisoned.
    #[error("sequence issuer lock poisoned")]
    Poisoned,
}

/// Issues strictly increasing LSNs for one process lifetime.
///
/// Wraps a [`ulid::Generator`], which increments the random component
/// when two tokens land in the same millisecond. The generator lives
/// behind a `Mutex` so the monotonicity guarantee survives shared use.
pub struct SequenceIssuer {
    generator: Mutex<Generator>,
}

impl Default for SequenceIssuer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SequenceIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SequenceIssuer").finish_non_exhaustive()
    }
}

impl SequenceIssuer {
    pub fn new() -> Self {
        Self {
            generator: Mutex::new(Generator::new()),
        }
    }

    /// Returns a fresh LSN, strictly greater than every LSN issued
    /// before it by this issuer.
    pub fn next(&self) -> Result<Lsn, SequenceError> {
        let mut generator = self.generator.lock().map_err(|_| SequenceError::Poisoned)?;
        loop {
            match generator.generate() {
                Ok(id) => return Ok(id.to_string()),
                // Random component overflowed within one millisecond;
                // the next tick resolves it.
                Err(_) => std::hint::spin_loop(),
            }
        }
    }
}
