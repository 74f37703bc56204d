pub(crate) const MAX_FILES_PER_BATCH: usize = 20;
pub(crate) const MAX_FILE_BYTES: usize = 200 * 1024 * 1024;
pub(crate) const MAX_BODY_BYTES: usize = (MAX_FILES_PER_BATCH * MAX_FILE_BYTES) + (5 * 1024 * 1024);

/// One request token is replenished per period, per client IP.
pub(crate) const GLOBAL_RATE_LIMIT_PERIOD_MS: u64 = 100;
pub(crate) const GLOBAL_RATE_LIMIT_BURST: u32 = 40;

pub(crate) const QUOTA_WINDOW_SECS: i64 = 24 * 60 * 60;

pub(crate) const MIN_PASSWORD_LEN: usize = 6;
pub(crate) const PASSWORD_HASH_ITERATIONS: u32 = 100_000;

pub(crate) const OUTPUT_SWEEP_INTERVAL_SECS: u64 = 5 * 60;

pub(crate) const CONTACT_STATUSES: [&str; 4] = ["new", "read", "replied", "resolved"];
pub(crate) const CONTACT_MAX_PAGE_SIZE: i64 = 100;
