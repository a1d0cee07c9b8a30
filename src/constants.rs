//! Global constants for fsaudit
//!
//! Centralized location for application-wide defaults

/// Application name, used for config discovery and log targets
pub const APP_NAME: &str = "fsaudit";

/// Version string stamped into every record's `@version` key
pub const RECORD_VERSION: &str = "1";

/// Procfs mount point used to resolve process command lines
pub const PROC_ROOT: &str = "/proc";

/// Initial buffer size when reading a process command line
pub const INITIAL_CMDLINE_CAPACITY: usize = 256;

/// Default topic receiving audit records
pub const DEFAULT_TOPIC: &str = "logs";

/// Default broker endpoint list
pub const DEFAULT_BROKERS: &str = "localhost:9092";

/// Glob patterns searched, in order, when no config file is given
pub const CONFIG_SEARCH_PATTERNS: &[&str] = &["./conf/*.toml", "/etc/fsaudit/*.toml"];

/// Publish retry defaults
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
pub const DEFAULT_INITIAL_BACKOFF_MS: u64 = 10;
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 1_000;

/// Interval between delivery-report polls in the relay loop
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Upper bound on the shutdown flush
pub const DEFAULT_FLUSH_TIMEOUT_MS: u64 = 5_000;

/// Log target used for lines forwarded from the broker client
pub const BROKER_LOG_TARGET: &str = "fsaudit::broker";
