/// Max days a single multi-day slot query may cover.
pub const MAX_QUERY_DAYS: i64 = 62;

/// Max candidate staff considered for an "any employee" query.
pub const MAX_CANDIDATE_STAFF: usize = 256;

/// Max schedule entries per staff member per weekday.
pub const MAX_ENTRIES_PER_DAY: usize = 16;

/// Max breaks inside one schedule entry.
pub const MAX_BREAKS_PER_ENTRY: usize = 16;

/// Max appointments held in one staff ledger.
pub const MAX_APPOINTMENTS_PER_LEDGER: usize = 100_000;

/// Max length of customer name/email/phone.
pub const MAX_CUSTOMER_FIELD_LEN: usize = 255;

/// Max length of free-form customer notes.
pub const MAX_NOTES_LEN: usize = 4096;

/// Max length of payment gateway name and reference.
pub const MAX_PAYMENT_FIELD_LEN: usize = 255;

/// Longest bookable service, in minutes (one day).
pub const MAX_SERVICE_MINUTES: u32 = 24 * 60;

/// Random bytes behind a cancellation token (hex-encoded to twice this length).
pub const CANCELLATION_TOKEN_BYTES: usize = 32;

/// Longest booking horizon, in days (about a century).
pub const MAX_LEAD_DAYS: i64 = 36_500;

/// Longest lead time, cancellation cutoff or hold interval, in minutes.
pub const MAX_POLICY_MINUTES: i64 = MAX_LEAD_DAYS * 24 * 60;
