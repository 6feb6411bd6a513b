//! Configuration constants for the flowmeter gateway.

use std::path::PathBuf;
use std::time::Duration;

/// Directory name under user's home for gateway data
pub const FLOWMETER_DIR: &str = ".flowmeter";

/// Spool filename for readings that could not be forwarded
pub const SPOOL_FILE: &str = "spool.jsonl";

/// UDP address the radio front-end delivers frames to
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:1700";

/// Receiver endpoint
pub const DEFAULT_ENDPOINT: &str = "http://localhost:8080/";

/// Largest datagram read per frame
pub const MAX_FRAME_SIZE: usize = 32;

/// Whole-request timeout for forwarding
pub const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Connect timeout for forwarding
pub const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Redirects followed before giving up
pub const MAX_REDIRECTS: usize = 5;

/// Frames queued between the radio listener and the forwarder
pub const CHANNEL_CAPACITY: usize = 100;

/// Time allowed for draining queued frames on shutdown
pub const SHUTDOWN_GRACE_SECS: u64 = 5;

/// Get the gateway data directory (~/.flowmeter)
pub fn get_flowmeter_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(FLOWMETER_DIR))
}

/// Get the spool path (~/.flowmeter/spool.jsonl)
pub fn get_spool_path() -> Option<PathBuf> {
    get_flowmeter_dir().map(|d| d.join(SPOOL_FILE))
}

pub fn get_request_timeout() -> Duration {
    Duration::from_secs(REQUEST_TIMEOUT_SECS)
}

pub fn get_connect_timeout() -> Duration {
    Duration::from_secs(CONNECT_TIMEOUT_SECS)
}

pub fn get_shutdown_grace() -> Duration {
    Duration::from_secs(SHUTDOWN_GRACE_SECS)
}
