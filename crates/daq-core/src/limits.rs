//! Shared timing limits for hardware calls.
//!
//! Every blocking hardware call is bounded by one of these constants so a
//! caller's polling loop stays responsive.

use std::time::Duration;

// =============================================================================
// Timeout Constants
// =============================================================================

/// Timeout for a single analog read from a sampling task (200 ms).
///
/// Reads return whatever is available within this window; they never block
/// for the whole acquisition.
pub const SAMPLE_READ_TIMEOUT: Duration = Duration::from_millis(200);

/// Default timeout for a VISA/SCPI session (10 seconds).
pub const VISA_TIMEOUT: Duration = Duration::from_secs(10);

/// Interval between output-state polls on a microwave source (200 ms).
pub const OUTPUT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Dwell time per list or sweep point written to microwave sources (10 ms).
pub const LIST_DWELL: Duration = Duration::from_millis(10);
