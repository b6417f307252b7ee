//! Wall-clock offset the light schedules are evaluated in. Zones are looked
//! up per instant so daylight-saving changes take effect without a restart.

use chrono::{DateTime, Offset, Utc};
use chrono_tz::Tz;
use std::fmt;
use time::{OffsetDateTime, UtcOffset};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LocalZone {
    /// The host's zone (`TZ` or `/etc/localtime`).
    System,
    /// An IANA zone such as `Europe/Berlin`.
    Named(Tz),
    /// A fixed offset with no daylight-saving rules.
    Fixed(UtcOffset),
}

impl LocalZone {
    /// Offset in effect at `instant`. Instants chrono can't represent fall
    /// back to UTC.
    pub fn offset_at(&self, instant: OffsetDateTime) -> UtcOffset {
        let fixed = match self {
            Self::Fixed(offset) => return *offset,
            Self::System => as_chrono(instant).map(|t| t.with_timezone(&chrono::Local).offset().fix()),
            Self::Named(tz) => as_chrono(instant).map(|t| t.with_timezone(tz).offset().fix()),
        };
        fixed
            .and_then(|o| UtcOffset::from_whole_seconds(o.local_minus_utc()).ok())
            .unwrap_or(UtcOffset::UTC)
    }

    pub fn to_local(&self, instant: OffsetDateTime) -> OffsetDateTime {
        instant.to_offset(self.offset_at(instant))
    }

    pub fn now(&self) -> OffsetDateTime {
        self.to_local(OffsetDateTime::now_utc())
    }
}

impl fmt::Display for LocalZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System => f.write_str("system local"),
            Self::Named(tz) => f.write_str(tz.name()),
            Self::Fixed(offset) => write!(f, "{offset}"),
        }
    }
}

fn as_chrono(instant: OffsetDateTime) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(instant.unix_timestamp(), instant.nanosecond())
}

// ===========================================================================
// Tests
// ===========================================================================
