//! Converts store timestamps into the display timezone.

use chrono::{DateTime, FixedOffset, Utc};
use chrono_tz::Tz;
use tracing::warn;

/// Zone used when none is configured.
pub const DEFAULT_TIMEZONE: &str = "Asia/Kolkata";

/// Localizes UTC timestamps into a named IANA zone.
///
/// An unknown zone name is logged once at construction and timestamps are
/// then returned unchanged (as UTC). Localization itself never fails.
#[derive(Debug, Clone)]
pub struct Localizer {
    zone: Option<Tz>,
}

impl Localizer {
    pub fn new(zone_name: &str) -> Self {
        let zone = match zone_name.parse::<Tz>() {
            Ok(tz) => Some(tz),
            Err(err) => {
                warn!(
                    "cannot use timezone `{}` ({}); timestamps stay in UTC",
                    zone_name, err
                );
                None
            }
        };
        Self { zone }
    }

    pub fn localize(&self, timestamp: DateTime<Utc>) -> DateTime<FixedOffset> {
        match self.zone {
            Some(tz) => timestamp.with_timezone(&tz).fixed_offset(),
            None => timestamp.fixed_offset(),
        }
    }
}

impl Default for Localizer {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEZONE)
    }
}
