//! Unix time to calendar conversion, in the proleptic Gregorian calendar.
//!
//! Both directions work around 2000-03-01: counted from there, the leap day
//! is the last day of the year, and the 400/100/4-year cycles line up.

use core::convert::TryFrom;
use core::fmt;

pub const SECONDS_PER_MINUTE: i64 = 60;
pub const MINUTES_PER_HOUR: i64 = 60;
pub const HOURS_PER_DAY: i64 = 24;
pub const DAYS_PER_WEEK: i64 = 7;
pub const DAYS_PER_YEAR: i64 = 365;
pub const MONTHS_PER_YEAR: u8 = 12;
pub const SECONDS_PER_HOUR: i64 = SECONDS_PER_MINUTE * MINUTES_PER_HOUR;
pub const SECONDS_PER_DAY: i64 = SECONDS_PER_HOUR * HOURS_PER_DAY;
pub const SECONDS_PER_YEAR: i64 = SECONDS_PER_DAY * DAYS_PER_YEAR;

const LEAPS_PER_4: i64 = 1;
const LEAPS_PER_100: i64 = 24;
const LEAPS_PER_400: i64 = 97;

const DAYS_PER_4_YEARS: i64 = DAYS_PER_YEAR * 4 + LEAPS_PER_4;
const DAYS_PER_100_YEARS: i64 = DAYS_PER_YEAR * 100 + LEAPS_PER_100;
const DAYS_PER_400_YEARS: i64 = DAYS_PER_YEAR * 400 + LEAPS_PER_400;

// Anything outside this could not have a year that fits in an i32.
const EARLIEST: i64 = i32::MIN as i64 * (DAYS_PER_YEAR + 1) * SECONDS_PER_DAY;
const LATEST: i64 = i32::MAX as i64 * (DAYS_PER_YEAR + 1) * SECONDS_PER_DAY;

/// 2000-01-01, in days since 1970-01-01.
const DAYS_TO_2000: i64 = 10957;

/// 2000-03-01 00:00:00, a Wednesday.
const LEAP_EPOCH: i64 = (DAYS_TO_2000 + 31 + 29) * SECONDS_PER_DAY;

// Month lengths from March on; February comes last.
const MARCH_MONTH_DAYS: [i64; 12] = [31, 30, 31, 30, 31, 31, 30, 31, 30, 31, 31, 29];

// Days before the 1st of each month in a common year.
const DAYS_BEFORE_MONTH: [u16; 12] = [0, 31, 59, 90, 120, 151, 181, 212, 243, 273, 304, 334];

/// A broken-down UTC time.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Components {
    pub year: i32,
    /// 0-based.
    pub day_of_year: u16,
    pub second: u8,
    pub minute: u8,
    pub hour: u8,
    /// 1-based.
    pub day_of_month: u8,
    /// 0-based, January is 0.
    pub month: u8,
    /// 0 is Sunday.
    pub weekday: u8,
}

impl fmt::Display for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}",
            self.year,
            self.month as u32 + 1,
            self.day_of_month,
            self.hour,
            self.minute,
            self.second
        )
    }
}

/// The timestamp's year does not fit in an `i32`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct OutOfRange(pub i64);

impl fmt::Display for OutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "timestamp {} is outside the representable years", self.0)
    }
}

pub fn is_leap_year(year: i32) -> bool {
    year % 4 == 0 && (year % 100 != 0 || year % 400 == 0)
}

/// Days in the year before the 1st of `month` (0-based).
///
/// Panics if `month` is 12 or more.
pub fn month_to_day_of_year(month: u8, is_leap_year: bool) -> u16 {
    let days = DAYS_BEFORE_MONTH[month as usize];
    // February is month 1.
    if is_leap_year && month > 1 {
        days + 1
    } else {
        days
    }
}

/// Break a Unix timestamp down into UTC calendar components.
pub fn decompose(time: i64) -> Result<Components, OutOfRange> {
    if time < EARLIEST || time > LATEST {
        return Err(OutOfRange(time));
    }

    let seconds = time - LEAP_EPOCH;
    let days = seconds.div_euclid(SECONDS_PER_DAY);
    let seconds_within_day = seconds.rem_euclid(SECONDS_PER_DAY);

    // 2000-03-01 was a Wednesday.
    let weekday = (days + 3).rem_euclid(DAYS_PER_WEEK);

    let cycles_400 = days.div_euclid(DAYS_PER_400_YEARS);
    let mut days_within = days.rem_euclid(DAYS_PER_400_YEARS);

    // The last day of each cycle belongs to the cycle, not the next one.
    let cycles_100 = (days_within / DAYS_PER_100_YEARS).min(3);
    days_within -= cycles_100 * DAYS_PER_100_YEARS;

    let cycles_4 = (days_within / DAYS_PER_4_YEARS).min(24);
    days_within -= cycles_4 * DAYS_PER_4_YEARS;

    let remaining_years = (days_within / DAYS_PER_YEAR).min(3);
    days_within -= remaining_years * DAYS_PER_YEAR;

    // Whether the January-based year holding most of this one is a leap year.
    let leap = remaining_years == 0 && (cycles_4 != 0 || cycles_100 == 0);
    let year_length = DAYS_PER_YEAR + leap as i64;
    let mut day_of_year = days_within + 31 + 28 + leap as i64;
    if day_of_year >= year_length {
        day_of_year -= year_length;
    }

    let mut years = remaining_years + 4 * cycles_4 + 100 * cycles_100 + 400 * cycles_400;

    let mut month = 0;
    for &length in MARCH_MONTH_DAYS.iter() {
        if days_within < length {
            break;
        }
        days_within -= length;
        month += 1;
    }

    // Back to January-based months.
    month += 2;
    if month >= MONTHS_PER_YEAR {
        month -= MONTHS_PER_YEAR;
        years += 1;
    }

    let year = i32::try_from(years + 2000).map_err(|_| OutOfRange(time))?;

    Ok(Components {
        year,
        day_of_year: day_of_year as u16,
        second: (seconds_within_day % SECONDS_PER_MINUTE) as u8,
        minute: (seconds_within_day / SECONDS_PER_MINUTE % MINUTES_PER_HOUR) as u8,
        hour: (seconds_within_day / SECONDS_PER_HOUR) as u8,
        day_of_month: days_within as u8 + 1,
        month,
        weekday: weekday as u8,
    })
}

// Days from 1970-01-01 to January 1st of `year`, and whether it is a leap
// year.
fn year_to_days(year: i64) -> (i64, bool) {
    let year_2000 = year - 2000;

    let cycles_400 = year_2000.div_euclid(400);
    let within_400 = year_2000.rem_euclid(400);
    let cycles_100 = within_400 / 100;
    let within_100 = within_400 % 100;
    let cycles_4 = within_100 / 4;
    let within_4 = within_100 % 4;

    let leap = within_400 == 0 || (within_4 == 0 && within_100 != 0);
    // Leap days before `year` since 2000-01-01; the cycles count the leap
    // year they end on, and 2000's own comes on top.
    let leaps =
        LEAPS_PER_400 * cycles_400 + LEAPS_PER_100 * cycles_100 + LEAPS_PER_4 * cycles_4 + 1 - leap as i64;

    (DAYS_TO_2000 + year_2000 * DAYS_PER_YEAR + leaps, leap)
}

/// Turn calendar components back into a Unix timestamp.
///
/// `day_of_year` and `weekday` are ignored. A `month` of 12 or more carries
/// into the year; other fields are not range checked, so day 32 of January
/// is February 1st.
pub fn recompose(components: &Components) -> i64 {
    let mut year = components.year as i64;
    let mut month = components.month;
    // The month decides which year's leap rule applies, so it is normalized
    // first.
    if month >= MONTHS_PER_YEAR {
        year += (month / MONTHS_PER_YEAR) as i64;
        month %= MONTHS_PER_YEAR;
    }

    let (days, leap) = year_to_days(year);
    let days = days + month_to_day_of_year(month, leap) as i64 + components.day_of_month as i64 - 1;

    days * SECONDS_PER_DAY
        + components.hour as i64 * SECONDS_PER_HOUR
        + components.minute as i64 * SECONDS_PER_MINUTE
        + components.second as i64
}
