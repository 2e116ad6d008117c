/// Prefix of every versioned route.
pub const API_PREFIX: &str = "/api/v1";

/// Header carrying the identity of the caller.
pub const ACTOR_HEADER: &str = "x-actor";

/// Files accepted in one upload request; bounds the request body together
/// with the per-file size limit.
pub const MAX_FILES_PER_REQUEST: u64 = 50;

pub const MAX_ARCHIVE_ITEMS: u64 = 500;

pub const MAX_BULK_RELOCATION_ITEMS: u64 = 500;

pub const MAX_CONCURRENT_REQUESTS: usize = 256;
