//! Gregorian / Jalali (Solar Hijri) conversion and display formatting.
//!
//! Every timestamp the API returns is rendered as a pair: the Gregorian
//! value and its Jalali equivalent, both as `YYYY/MM/DD HH:MM`.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use serde::Serialize;

/// Years below this are read as Jalali when parsing user input.
const JALALI_YEAR_CUTOFF: i32 = 1700;

const DISPLAY_FORMAT: &str = "%Y/%m/%d %H:%M";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayDateTime {
    pub gregorian: String,
    pub jalali: String,
}

impl DisplayDateTime {
    #[must_use]
    pub fn from_utc(value: &DateTime<Utc>) -> Self {
        let (jy, jm, jd) = gregorian_to_jalali(value.year(), value.month(), value.day());
        Self {
            gregorian: value.format(DISPLAY_FORMAT).to_string(),
            jalali: format!(
                "{jy:04}/{jm:02}/{jd:02} {:02}:{:02}",
                value.hour(),
                value.minute()
            ),
        }
    }
}

/// Converts a Gregorian date to `(year, month, day)` in the Jalali calendar.
#[must_use]
pub fn gregorian_to_jalali(gy: i32, gm: u32, gd: u32) -> (i32, u32, u32) {
    const CUMULATIVE_DAYS: [i64; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

    let gy = i64::from(gy);
    let gy2 = if gm > 2 { gy + 1 } else { gy };
    let month_offset = CUMULATIVE_DAYS[(gm.clamp(1, 12) - 1) as usize];

    let mut days = 355_666 + 365 * gy + (gy2 + 3) / 4 - (gy2 + 99) / 100 + (gy2 + 399) / 400
        + i64::from(gd)
        + month_offset;

    let mut jy = -1595 + 33 * (days / 12053);
    days %= 12053;
    jy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        jy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let (jm, jd) = if days < 186 {
        (1 + days / 31, 1 + days % 31)
    } else {
        (7 + (days - 186) / 30, 1 + (days - 186) % 30)
    };

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    (jy as i32, jm as u32, jd as u32)
}

/// Converts a Jalali date to Gregorian. Returns `None` for out-of-range
/// month/day values, including Esfand 30 outside leap years.
#[must_use]
pub fn jalali_to_gregorian(jy: i32, jm: u32, jd: u32) -> Option<NaiveDate> {
    let month_len = match jm {
        1..=6 => 31,
        7..=12 => 30,
        _ => return None,
    };
    if jd == 0 || jd > month_len {
        return None;
    }

    let y = i64::from(jy) + 1595;
    let m = i64::from(jm);
    let month_days = if m < 7 { (m - 1) * 31 } else { (m - 7) * 30 + 186 };
    let mut days =
        -355_668 + 365 * y + (y / 33) * 8 + ((y % 33) + 3) / 4 + i64::from(jd) + month_days;

    let mut gy = 400 * (days / 146_097);
    days %= 146_097;
    if days > 36524 {
        days -= 1;
        gy += 100 * (days / 36524);
        days %= 36524;
        if days >= 365 {
            days += 1;
        }
    }
    gy += 4 * (days / 1461);
    days %= 1461;
    if days > 365 {
        gy += (days - 1) / 365;
        days = (days - 1) % 365;
    }

    let gy = i32::try_from(gy).ok()?;
    let mut gd = days + 1;
    let feb = if is_gregorian_leap(gy) { 29 } else { 28 };
    let mut gm = 1u32;
    for len in [31, feb, 31, 30, 31, 30, 31, 31, 30, 31, 30, 31] {
        if gd <= len {
            break;
        }
        gd -= len;
        gm += 1;
    }

    let date = NaiveDate::from_ymd_opt(gy, gm, u32::try_from(gd).ok()?)?;
    (gregorian_to_jalali(date.year(), date.month(), date.day()) == (jy, jm, jd)).then_some(date)
}

const fn is_gregorian_leap(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

/// Parses a visit timestamp supplied by a client.
///
/// Accepts RFC 3339 or `YYYY-MM-DD HH:MM[:SS]` (also with `/` or `T`
/// separators). Naive values are taken as UTC. Years below 1700 are read as
/// Jalali dates.
#[must_use]
pub fn parse_visit_datetime(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Some(dt.with_timezone(&Utc));
    }

    let normalized = input.replace('/', "-").replace('T', " ");
    let (y, m, d, hh, mm, ss) = split_fields(&normalized)?;
    let date = if y < JALALI_YEAR_CUTOFF {
        jalali_to_gregorian(y, m, d)?
    } else {
        NaiveDate::from_ymd_opt(y, m, d)?
    };
    let naive = date.and_hms_opt(hh, mm, ss)?;
    Some(Utc.from_utc_datetime(&naive))
}

/// Splits the input into calendar fields without validating the date, so
/// Jalali values such as `1403-12-30` survive until conversion.
fn split_fields(input: &str) -> Option<(i32, u32, u32, u32, u32, u32)> {
    let (date, time) = input.split_once(' ')?;
    let date: Vec<&str> = date.split('-').collect();
    let [y, m, d] = date.as_slice() else {
        return None;
    };

    let time: Vec<&str> = time.split(':').collect();
    let (hh, mm, ss) = match time.as_slice() {
        [hh, mm] => (hh.parse().ok()?, mm.parse().ok()?, 0),
        [hh, mm, ss] => (hh.parse().ok()?, mm.parse().ok()?, ss.parse().ok()?),
        _ => return None,
    };
    NaiveTime::from_hms_opt(hh, mm, ss)?;

    Some((y.parse().ok()?, m.parse().ok()?, d.parse().ok()?, hh, mm, ss))
}
