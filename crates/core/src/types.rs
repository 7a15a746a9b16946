/// Persistence-assigned surrogate keys.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Lodestone character id. `0` means "not yet resolved".
pub type LodestoneId = u32;

/// Game world id. `0` means "unknown".
pub type WorldId = u32;
