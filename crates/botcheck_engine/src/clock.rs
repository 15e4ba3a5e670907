use chrono::{SecondsFormat, Utc};

/// Current instant as RFC 3339 UTC with millisecond precision, e.g.
/// `2024-05-01T10:00:00.123Z`.
pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}
