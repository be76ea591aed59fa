//! Time-of-day admission windows.
//!
//! A window is an inclusive `[start, end]` range of local wall-clock time,
//! with both bounds on a whole minute. Windows never wrap midnight. The end
//! bound is the instant `end:00`, so `12:00:30` is already outside a window
//! ending at `12:00`.

use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::error::ProtocolError;

/// Source of the current instant.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock of the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to a settable instant.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        if let Ok(mut guard) = self.at.lock() {
            *guard = at;
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        match self.at.lock() {
            Ok(guard) => *guard,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }
}

/// Resolve an IANA timezone name such as `Europe/Paris` or `UTC`.
pub fn resolve_timezone(name: &str) -> Result<Tz, ProtocolError> {
    name.trim()
        .parse::<Tz>()
        .map_err(|_| ProtocolError::InvalidTimezone(name.to_string()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdmissionWindow {
    start: u16,
    end: u16,
}

impl AdmissionWindow {
    /// Text messages: 05:00-23:59.
    pub const TEXT: Self = Self::from_minutes(5 * 60, 23 * 60 + 59);
    /// Voice transfers: 08:00-12:00.
    pub const VOICE: Self = Self::from_minutes(8 * 60, 12 * 60);
    /// Video transfers: 08:00-23:59.
    pub const VIDEO: Self = Self::from_minutes(8 * 60, 23 * 60 + 59);

    const fn from_minutes(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    /// Build a window from two `HH:MM` strings.
    pub fn new(start: &str, end: &str) -> Result<Self, ProtocolError> {
        let start = parse_hhmm(start)?;
        let end = parse_hhmm(end)?;
        if start > end {
            return Err(ProtocolError::InvalidWindow(format!(
                "start {} is after end {}",
                format_minutes(start),
                format_minutes(end)
            )));
        }
        Ok(Self { start, end })
    }

    /// Whether `now`, seen on the wall clock of `tz`, falls inside the window.
    pub fn contains(&self, now: DateTime<Utc>, tz: Tz) -> bool {
        let local = now.with_timezone(&tz);
        let secs = local.num_seconds_from_midnight();
        let start = u32::from(self.start) * 60;
        let end = u32::from(self.end) * 60;
        start <= secs && (secs < end || (secs == end && local.nanosecond() == 0))
    }
}

impl fmt::Display for AdmissionWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", format_minutes(self.start), format_minutes(self.end))
    }
}

/// Parses `HH:MM-HH:MM`.
impl FromStr for AdmissionWindow {
    type Err = ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| ProtocolError::InvalidWindow(format!("expected HH:MM-HH:MM, got '{}'", s)))?;
        Self::new(start.trim(), end.trim())
    }
}

/// Whether the current instant in `timezone` falls inside `[start, end]`.
pub fn in_window(start: &str, end: &str, timezone: &str, clock: &dyn Clock) -> Result<bool, ProtocolError> {
    let window = AdmissionWindow::new(start, end)?;
    let tz = resolve_timezone(timezone)?;
    Ok(window.contains(clock.now(), tz))
}

fn parse_hhmm(s: &str) -> Result<u16, ProtocolError> {
    let time = NaiveTime::parse_from_str(s, "%H:%M")
        .map_err(|_| ProtocolError::InvalidWindow(format!("expected HH:MM, got '{}'", s)))?;
    Ok((time.hour() * 60 + time.minute()) as u16)
}

fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 18, h, m, s).unwrap()
    }

    #[test]
    fn test_inclusive_bounds() {
        let w = AdmissionWindow::VOICE;
        assert!(!w.contains(utc(7, 59, 59), Tz::UTC));
        assert!(w.contains(utc(8, 0, 0), Tz::UTC));
        assert!(w.contains(utc(12, 0, 0), Tz::UTC));
        assert!(!w.contains(utc(12, 0, 30), Tz::UTC));
        assert!(!w.contains(utc(12, 1, 0), Tz::UTC));
    }

    #[test]
    fn test_end_is_an_instant() {
        assert!(AdmissionWindow::TEXT.contains(utc(23, 59, 0), Tz::UTC));
        assert!(!AdmissionWindow::TEXT.contains(utc(23, 59, 45), Tz::UTC));
        assert!(!AdmissionWindow::TEXT.contains(utc(4, 59, 59), Tz::UTC));

        let just_after = utc(12, 0, 0) + chrono::Duration::milliseconds(1);
        assert!(!AdmissionWindow::VOICE.contains(just_after, Tz::UTC));
    }

    #[test]
    fn test_uses_local_time_of_timezone() {
        // 10:00 UTC is 19:00 in Tokyo: outside voice, inside video.
        let tokyo = resolve_timezone("Asia/Tokyo").unwrap();
        assert!(!AdmissionWindow::VOICE.contains(utc(10, 0, 0), tokyo));
        assert!(AdmissionWindow::VIDEO.contains(utc(10, 0, 0), tokyo));
    }

    #[test]
    fn test_parse_and_display() {
        let w: AdmissionWindow = "05:00-23:59".parse().unwrap();
        assert_eq!(w, AdmissionWindow::TEXT);
        assert_eq!(w.to_string(), "05:00-23:59");

        assert!("12:00-08:00".parse::<AdmissionWindow>().is_err());
        assert!("25:00-26:00".parse::<AdmissionWindow>().is_err());
        assert!("08:00".parse::<AdmissionWindow>().is_err());
    }

    #[test]
    fn test_in_window_with_clock() {
        let clock = FixedClock::new(utc(10, 0, 0));
        assert!(in_window("05:00", "23:59", "UTC", &clock).unwrap());

        clock.set(utc(14, 0, 0));
        assert!(!in_window("08:00", "12:00", "UTC", &clock).unwrap());
    }

    #[test]
    fn test_unknown_timezone() {
        let clock = SystemClock;
        let err = in_window("05:00", "23:59", "Mars/Olympus_Mons", &clock).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidTimezone(_)));
        assert!(resolve_timezone("Europe/Paris").is_ok());
    }
}
