use std::fmt::{Display, Formatter};
use std::time::Duration;

use serde::{Serialize, Serializer};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

/// Wall-clock UTC instant used for reset times and snapshot metadata.
///
/// Window arithmetic runs on the monotonic clock; this type only exists at the
/// edges where a human or a header needs a calendar time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct UtcDateTime(OffsetDateTime);

impl UtcDateTime {
    pub fn now() -> Self {
        Self(OffsetDateTime::now_utc())
    }

    /// The instant `offset` from now.
    pub fn in_future(offset: Duration) -> Self {
        Self::now().saturating_add(offset)
    }

    pub fn saturating_add(self, offset: Duration) -> Self {
        let offset = time::Duration::try_from(offset).unwrap_or(time::Duration::MAX);
        Self(self.0.saturating_add(offset))
    }

    /// Seconds since the Unix epoch, as sent in `X-RateLimit-Reset`.
    pub fn unix_timestamp(self) -> i64 {
        self.0.unix_timestamp()
    }

    pub fn format_rfc3339(self) -> String {
        self.0
            .format(&Rfc3339)
            .unwrap_or_else(|_| self.0.unix_timestamp().to_string())
    }
}

impl Display for UtcDateTime {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format_rfc3339())
    }
}

impl Serialize for UtcDateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.format_rfc3339())
    }
}
