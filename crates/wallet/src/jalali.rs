//! Jalali (Solar Hijri) calendar arithmetic.
//!
//! Bank SMS timestamps and operator top-up claims use the Jalali calendar;
//! everything stored is UTC. Conversion uses the 33-year break-cycle
//! algorithm (Khayyam calendar reform), valid for years 1178..=3177.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use thiserror::Error;

/// Validation failures for Jalali dates and times.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JalaliError {
    #[error("expected YYYY/MM/DD, got {0:?}")]
    BadFormat(String),

    #[error("year {0} outside supported range")]
    YearOutOfRange(i64),

    #[error("month {0} out of range")]
    MonthOutOfRange(i64),

    #[error("day {0} out of range for month")]
    DayOutOfRange(i64),

    #[error("hour {0} out of range")]
    HourOutOfRange(u32),

    #[error("minute {0} out of range")]
    MinuteOutOfRange(u32),
}

/// Years in which the leap-cycle pattern shifts.
const BREAKS: [i64; 20] = [
    -61, 9, 38, 199, 426, 686, 756, 818, 1111, 1181, 1210, 1635, 2060, 2097, 2192, 2262, 2324,
    2394, 2456, 3178,
];

/// Leap status of a Jalali year plus the Gregorian March day its Farvardin
/// 1st falls on.
fn jal_cal(jy: i64) -> (i64, i64, i64) {
    let gy = jy + 621;
    let mut leap_j = -14i64;
    let mut jp = BREAKS[0];
    let mut jump = 0i64;

    for &jm in &BREAKS[1..] {
        jump = jm - jp;
        if jy < jm {
            break;
        }
        leap_j += jump / 33 * 8 + jump % 33 / 4;
        jp = jm;
    }

    let mut n = jy - jp;
    leap_j += n / 33 * 8 + (n % 33 + 3) / 4;
    if jump % 33 == 4 && jump - n == 4 {
        leap_j += 1;
    }

    let leap_g = gy / 4 - (gy / 100 + 1) * 3 / 4 - 150;
    let march = 20 + leap_j - leap_g;

    if jump - n < 6 {
        n = n - jump + (jump + 4) / 33 * 33;
    }
    let mut leap = ((n + 1) % 33 - 1) % 4;
    if leap == -1 {
        leap = 4;
    }

    (leap, gy, march)
}

fn g2d(gy: i64, gm: i64, gd: i64) -> i64 {
    let mut d = (gy + (gm - 8) / 6 + 100100) * 1461 / 4 + (153 * ((gm + 9) % 12) + 2) / 5 + gd
        - 34840408;
    d -= (gy + 100100 + (gm - 8) / 6) / 100 * 3 / 4 - 752;
    d
}

fn d2g(jdn: i64) -> (i64, i64, i64) {
    let mut j = 4 * jdn + 139361631;
    j += (4 * jdn + 183187720) / 146097 * 3 / 4 * 4 - 3908;
    let i = j % 1461 / 4 * 5 + 308;
    let gd = i % 153 / 5 + 1;
    let gm = i / 153 % 12 + 1;
    let gy = j / 1461 - 100100 + (8 - gm) / 6;
    (gy, gm, gd)
}

fn j2d(jy: i64, jm: i64, jd: i64) -> i64 {
    let (_, gy, march) = jal_cal(jy);
    g2d(gy, 3, march) + (jm - 1) * 31 - jm / 7 * (jm - 7) + jd - 1
}

/// Whether a Jalali year has 366 days.
pub fn is_leap_year(jy: i64) -> bool {
    jal_cal(jy).0 == 0
}

/// Days in a Jalali month.
pub fn month_length(jy: i64, jm: i64) -> i64 {
    match jm {
        1..=6 => 31,
        7..=11 => 30,
        12 => {
            if is_leap_year(jy) {
                30
            } else {
                29
            }
        }
        _ => 0,
    }
}

/// Convert a Jalali date to the Gregorian calendar.
pub fn to_gregorian(jy: i64, jm: i64, jd: i64) -> (i64, i64, i64) {
    d2g(j2d(jy, jm, jd))
}

/// Convert a validated Jalali date + local wall-clock minute to a UTC
/// instant in the given fixed civil offset.
pub fn to_utc(
    jy: i64,
    jm: i64,
    jd: i64,
    hour: u32,
    minute: u32,
    tz: &FixedOffset,
) -> Result<DateTime<Utc>, JalaliError> {
    if !(1178..=3177).contains(&jy) {
        return Err(JalaliError::YearOutOfRange(jy));
    }
    if !(1..=12).contains(&jm) {
        return Err(JalaliError::MonthOutOfRange(jm));
    }
    if jd < 1 || jd > month_length(jy, jm) {
        return Err(JalaliError::DayOutOfRange(jd));
    }
    if hour > 23 {
        return Err(JalaliError::HourOutOfRange(hour));
    }
    if minute > 59 {
        return Err(JalaliError::MinuteOutOfRange(minute));
    }

    let (gy, gm, gd) = to_gregorian(jy, jm, jd);
    let naive = NaiveDate::from_ymd_opt(gy as i32, gm as u32, gd as u32)
        .ok_or(JalaliError::DayOutOfRange(jd))?
        .and_hms_opt(hour, minute, 0)
        .ok_or(JalaliError::HourOutOfRange(hour))?;

    // A fixed offset maps local time to exactly one instant.
    Ok(DateTime::<FixedOffset>::from_naive_utc_and_offset(naive - *tz, *tz).with_timezone(&Utc))
}

/// Parse a strict `YYYY/MM/DD` Jalali date string plus an hour/minute into
/// a UTC instant. Wrong delimiters and out-of-range fields are rejected.
pub fn minute_to_utc(
    date: &str,
    hour: u32,
    minute: u32,
    tz: &FixedOffset,
) -> Result<DateTime<Utc>, JalaliError> {
    let parts: Vec<&str> = date.split('/').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.is_empty() || !p.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(JalaliError::BadFormat(date.to_string()));
    }
    let jy: i64 = parts[0].parse().map_err(|_| JalaliError::BadFormat(date.to_string()))?;
    let jm: i64 = parts[1].parse().map_err(|_| JalaliError::BadFormat(date.to_string()))?;
    let jd: i64 = parts[2].parse().map_err(|_| JalaliError::BadFormat(date.to_string()))?;

    to_utc(jy, jm, jd, hour, minute, tz)
}
