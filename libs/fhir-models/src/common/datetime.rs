//! FHIR `dateTime` / `instant` parsing
//!
//! FHIR allows a date, a date-time without offset, or a full instant. The server needs
//! two views of such a value: the wall-clock reading as written by the client (used for
//! measurement times) and the UTC instant (used for audit timestamps such as
//! `finalized`).

use super::error::{Error, Result};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FhirDateTime {
    wall_clock: NaiveDateTime,
    offset: Option<FixedOffset>,
}

impl FhirDateTime {
    pub fn parse(value: &str) -> Result<Self> {
        let value = value.trim();

        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Ok(Self {
                wall_clock: dt.naive_local(),
                offset: Some(*dt.offset()),
            });
        }

        for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
            if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
                return Ok(Self {
                    wall_clock: naive,
                    offset: None,
                });
            }
        }

        if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
            return Ok(Self {
                wall_clock: date.and_time(NaiveTime::MIN),
                offset: None,
            });
        }

        Err(Error::InvalidDateTime(value.to_string()))
    }

    /// The reading as written, offset discarded
    pub fn wall_clock(&self) -> NaiveDateTime {
        self.wall_clock
    }

    pub fn offset(&self) -> Option<FixedOffset> {
        self.offset
    }

    /// The UTC instant; values without an offset are taken to be UTC already
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self.offset {
            Some(offset) => {
                let shift = Duration::seconds(i64::from(offset.local_minus_utc()));
                Utc.from_utc_datetime(&(self.wall_clock - shift))
            }
            None => Utc.from_utc_datetime(&self.wall_clock),
        }
    }
}
