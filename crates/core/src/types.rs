/// Job identifiers are random UUIDs generated at creation time.
pub type JobId = uuid::Uuid;

/// Users are identified by the opaque string the auth gateway hands us.
pub type UserId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
