/// Directory segment prefix for the owning record.
pub const RECORD_DIR_PREFIX: &str = "RECORD_";

/// Directory segment prefix for the optional sub-scope (line item).
pub const SUB_SCOPE_DIR_PREFIX: &str = "SUB_";

/// Accepted-extension entry meaning "any extension".
pub const ANY_EXTENSION: &str = "*";

/// Longest file name accepted for storage (bytes).
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Upper bound on `" (n)"` suffixes tried before giving up on a rename.
pub const MAX_RENAME_ATTEMPTS: u32 = 10_000;

/// Actor name used for engine-initiated actions (sweeps, compensations).
pub const SYSTEM_ACTOR: &str = "system";
