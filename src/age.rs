use chrono::{DateTime, Utc};

/// Render how long ago `published_at` was, relative to `now`.
///
/// Whole days are floored, then bucketed into days (< 30), 30-day months (< 365)
/// and 365-day years. The unit is always plural: 40 days is "1 months ago".
/// Timestamps in the future read as "0 days ago".
pub fn format_age(published_at: DateTime<Utc>, now: DateTime<Utc>) -> String {
  let days = (now - published_at).num_days().max(0);
  if days < 30 {
    format!("{} days ago", days)
  } else if days < 365 {
    format!("{} months ago", days / 30)
  } else {
    format!("{} years ago", days / 365)
  }
}
