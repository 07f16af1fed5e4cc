use chrono::{Datelike, Duration, NaiveDate};
use serde::{Deserialize, Serialize};

// Calendar arithmetic and datestamp/period parsing. Errors are plain
// reason strings; callers attach source locations where available.

const MONTH_NAMES: [&str; 12] = [
    "january",
    "february",
    "march",
    "april",
    "may",
    "june",
    "july",
    "august",
    "september",
    "october",
    "november",
    "december",
];

/// Return the number of months between two dates, from earliest to latest.
///
/// Does not take days into account. With `ignore_years`, the distance wraps
/// into a 1-12 range where two dates in the same month of year are a full
/// year (12 months) apart.
pub fn months_between(a: NaiveDate, b: NaiveDate, ignore_years: bool) -> u32 {
    let (future, past) = if a >= b { (a, b) } else { (b, a) };

    let mut months = future.month() as i32 - past.month() as i32
        + 12 * (future.year() - past.year());

    if ignore_years {
        months %= 12;
        if months == 0 {
            months = 12;
        }
    }

    months as u32
}

pub fn days_in_month(year: i32, month: u32) -> u32 {
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    NaiveDate::from_ymd_opt(next_year, next_month, 1)
        .unwrap_or_default()
        .signed_duration_since(NaiveDate::from_ymd_opt(year, month, 1).unwrap_or_default())
        .num_days() as u32
}

/// Return the date a number of months away, clamping the day to month length.
pub fn in_months(d: NaiveDate, months: i32) -> NaiveDate {
    let total = d.month() as i32 - 1 + months;
    let year = d.year() + total.div_euclid(12);
    let month = total.rem_euclid(12) as u32 + 1;
    let day = d.day().min(days_in_month(year, month));

    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(d)
}

pub fn first_of_month(d: NaiveDate) -> NaiveDate {
    NaiveDate::from_ymd_opt(d.year(), d.month(), 1).unwrap_or(d)
}

/// Return the date at the first day of the following month.
pub fn next_month(d: NaiveDate) -> NaiveDate {
    let (year, month) = if d.month() == 12 {
        (d.year() + 1, 1)
    } else {
        (d.year(), d.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(d)
}

/// Return the date at the last day of the previous month.
pub fn previous_month(d: NaiveDate) -> NaiveDate {
    first_of_month(d) - Duration::days(1)
}

pub fn last_of_month(d: NaiveDate) -> NaiveDate {
    previous_month(next_month(d))
}

/// Parse a datestamp such as `2019/11/11`, `2019-11-11` or `2019.11.11`.
///
/// Exactly one separator kind may be used per datestamp; month and day may
/// be written with one or two digits. In strict mode all three components
/// are required; otherwise a missing day or month defaults to the first.
pub fn parse_datestamp(datestamp: &str, strict: bool) -> Result<NaiveDate, String> {
    let datestamp = datestamp.trim();

    let separator = ['/', '-', '.']
        .into_iter()
        .find(|&sep| datestamp.contains(sep));

    let components: Vec<&str> = match separator {
        Some(sep) => {
            // mixing separator kinds (e.g. 2019/12-1) is invalid
            for other in ['/', '-', '.'] {
                if other != sep && datestamp.contains(other) {
                    return Err(format!("invalid date format ('{datestamp}')"));
                }
            }
            datestamp.split(sep).collect()
        }
        None => vec![datestamp],
    };

    if components.len() > 3 || components.is_empty() {
        return Err(format!("invalid date format ('{datestamp}')"));
    }
    if strict && components.len() != 3 {
        return Err(format!(
            "invalid date format ('{datestamp}'; expected strict format)"
        ));
    }

    let mut numbers = Vec::with_capacity(3);
    for component in &components {
        let number: u32 = component
            .parse()
            .map_err(|_| format!("invalid date format ('{datestamp}')"))?;
        numbers.push(number);
    }

    let year = numbers[0] as i32;
    let month = numbers.get(1).copied().unwrap_or(1);
    let day = numbers.get(2).copied().unwrap_or(1);

    NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| format!("invalid date format ('{datestamp}')"))
}

/// A reporting period; start is inclusive, end is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Period {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl Period {
    pub fn contains(&self, date: NaiveDate) -> bool {
        if let Some(start) = self.start {
            if date < start {
                return false;
            }
        }
        if let Some(end) = self.end {
            if date >= end {
                return false;
            }
        }
        true
    }
}

/// Parse a period; either a single component or `<from>:<to>` where either
/// side may be empty (unbounded).
pub fn parse_period(period: &str, today: NaiveDate) -> Result<Period, String> {
    let period = period.trim();

    if !period.contains(':') {
        let (start, end) = parse_period_component(period, today)?;
        return Ok(Period {
            start: Some(start),
            end: Some(end),
        });
    }

    let components: Vec<&str> = period.split(':').collect();
    if components.len() > 2 {
        return Err("malformed period".to_string());
    }

    let mut start = None;
    let mut end = None;

    let from = components[0].trim();
    if !from.is_empty() {
        start = Some(parse_period_component(from, today)?.0);
    }
    let to = components[1].trim();
    if !to.is_empty() {
        end = Some(parse_period_component(to, today)?.0);
    }

    if let (Some(a), Some(b)) = (start, end) {
        if a > b {
            // flip dates such that start is always earlier
            start = Some(b);
            end = Some(a);
        }
    }

    Ok(Period { start, end })
}

/// Return the date interval that exactly includes the period corresponding
/// to a component: a datestamp (full or partial), a bare month number, a
/// prefix-unique month name, `q1`-`q4`, or a prefix-unique textual key
/// (`today`, `tomorrow`, `yesterday`).
pub fn parse_period_component(
    component: &str,
    today: NaiveDate,
) -> Result<(NaiveDate, NaiveDate), String> {
    let component = component.trim().to_lowercase();

    if let Ok(month) = component.parse::<u32>() {
        if (1..=12).contains(&month) {
            let start = NaiveDate::from_ymd_opt(today.year(), month, 1)
                .ok_or_else(|| format!("invalid date format ('{component}')"))?;
            return Ok((start, next_month(start)));
        }
        // larger numbers are years; parsed as a normal datestamp below
    }

    if let Some(quarter) = component.strip_prefix('q') {
        if let Ok(quarter) = quarter.parse::<u32>() {
            if (1..=4).contains(&quarter) {
                let month = (quarter - 1) * 3 + 1;
                let start = NaiveDate::from_ymd_opt(today.year(), month, 1)
                    .ok_or_else(|| format!("invalid date format ('{component}')"))?;
                return Ok((start, in_months(start, 3)));
            }
        }
    }

    let keys = ["today", "tomorrow", "yesterday"];
    let matching: Vec<&str> = keys
        .iter()
        .copied()
        .filter(|key| key.starts_with(&component))
        .collect();
    if matching.len() == 1 {
        let day = match matching[0] {
            "today" => today,
            "tomorrow" => today + Duration::days(1),
            _ => today - Duration::days(1),
        };
        return Ok((day, day + Duration::days(1)));
    }

    let months: Vec<u32> = MONTH_NAMES
        .iter()
        .enumerate()
        .filter(|(_, name)| name.starts_with(&component))
        .map(|(n, _)| n as u32 + 1)
        .collect();
    if months.len() == 1 {
        let start = NaiveDate::from_ymd_opt(today.year(), months[0], 1)
            .ok_or_else(|| format!("invalid date format ('{component}')"))?;
        return Ok((start, next_month(start)));
    }

    // assume the component is a datestamp, as no textual keys match
    let start = parse_datestamp(&component, false)?;

    let separators = ['/', '-', '.']
        .into_iter()
        .map(|sep| component.matches(sep).count())
        .max()
        .unwrap_or(0);

    match separators {
        0 => {
            let end = NaiveDate::from_ymd_opt(start.year() + 1, 1, 1)
                .ok_or_else(|| format!("invalid date format ('{component}')"))?;
            Ok((start, end))
        }
        1 => Ok((start, next_month(start))),
        2 => Ok((start, start + Duration::days(1))),
        _ => Err(format!("invalid date format ('{component}')")),
    }
}
