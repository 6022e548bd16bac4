//! Constants for the fetch module (timeouts, micro-retry defaults).

use std::time::Duration;

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (2 minutes; segments are small).
pub const READ_TIMEOUT_SECS: u64 = 120;

/// Default number of attempts inside one fetch call.
pub const DEFAULT_FETCH_ATTEMPTS: u32 = 3;

/// Default fixed delay between attempts inside one fetch call.
pub const DEFAULT_FETCH_DELAY: Duration = Duration::from_secs(2);

/// Suffix of the hidden file a segment body is streamed into before rename.
pub const PART_SUFFIX: &str = "part";

/// Multiplier applied to the retry delay after an HTTP 429.
pub const RATE_LIMIT_DELAY_FACTOR: u32 = 4;
