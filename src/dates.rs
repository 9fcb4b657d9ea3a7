//! Permissive date recognition for statement cells.
//!
//! Statements print dates in every shape imaginable: `03-Oct-2022`, `4 Jul`,
//! `27/10/22`, `Tue, 1 Nov 2022 10:15`. A fragment is treated as a date when
//! the whole trimmed text matches one of these shapes; surrounding prose is not
//! searched, so descriptions that merely mention a month stay descriptions.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

static WEEKDAY_PREFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(mon|tue|tues|wed|thu|thur|thurs|fri|sat|sun)[a-z]*\.?,?\s+").unwrap()
});

static TIME_SUFFIX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\s+|T)\d{1,2}:\d{2}(:\d{2})?(\s*[ap]\.?m\.?)?$").unwrap()
});

static ORDINAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2})(st|nd|rd|th)\b").unwrap());

static ISO_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{4})[-/.](\d{1,2})[-/.](\d{1,2})$").unwrap());

// The separator is captured so `12/10-22` is rejected; the regex crate has no
// backreferences, hence one alternative per separator.
static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(\d{1,2})-(\d{1,2})-(\d{4}|\d{2})|(\d{1,2})/(\d{1,2})/(\d{4}|\d{2})|(\d{1,2})\.(\d{1,2})\.(\d{4}|\d{2})|(\d{1,2}) (\d{1,2}) (\d{4}))$",
    )
    .unwrap()
});

static PARTIAL_NUMERIC_DATE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})[-/](\d{1,2})$").unwrap());

static TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[\s\-/.,']+").unwrap());

const MONTHS: [&str; 12] = [
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

/// Year used when recognising dates that omit one; a leap year so `29 Feb`
/// is still recognised.
const RECOGNITION_YEAR: i32 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DateParts {
    year: Option<i32>,
    month: u32,
    day: u32,
}

impl DateParts {
    fn resolve(self, reference_year: i32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year.unwrap_or(reference_year), self.month, self.day)
    }
}

/// Whether `text` parses as a calendar date under permissive, day-first rules.
/// Failure is an ordinary outcome, never an error.
pub fn looks_like_date(text: &str) -> bool {
    split_date(text)
        .and_then(|parts| parts.resolve(RECOGNITION_YEAR))
        .is_some()
}

/// Parses `text` day-first. Dates without a year fall in `reference_year`.
pub fn parse_day_first(text: &str, reference_year: i32) -> Option<NaiveDate> {
    split_date(text)?.resolve(reference_year)
}

fn split_date(text: &str) -> Option<DateParts> {
    let cleaned = clean(text)?;

    if let Some(caps) = ISO_DATE.captures(&cleaned) {
        return Some(DateParts {
            year: Some(caps[1].parse().ok()?),
            month: caps[2].parse().ok()?,
            day: caps[3].parse().ok()?,
        });
    }

    if let Some(caps) = NUMERIC_DATE.captures(&cleaned) {
        // Exactly one of the four alternatives matched; find its first group.
        let base = (1..=10).step_by(3).find(|i| caps.get(*i).is_some())?;
        let first: u32 = caps[base].parse().ok()?;
        let second: u32 = caps[base + 1].parse().ok()?;
        let year = expand_year(&caps[base + 2])?;
        let (day, month) = day_first(first, second);
        return Some(DateParts {
            year: Some(year),
            month,
            day,
        });
    }

    if let Some(caps) = PARTIAL_NUMERIC_DATE.captures(&cleaned) {
        let (day, month) = day_first(caps[1].parse().ok()?, caps[2].parse().ok()?);
        return Some(DateParts {
            year: None,
            month,
            day,
        });
    }

    split_named_month(&cleaned)
}

fn clean(text: &str) -> Option<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    let without_weekday = WEEKDAY_PREFIX.replace(trimmed, "");
    let without_time = TIME_SUFFIX.replace(&without_weekday, "");
    let without_ordinals = ORDINAL.replace_all(&without_time, "$1");
    let cleaned = without_ordinals.trim().to_string();
    (!cleaned.is_empty()).then_some(cleaned)
}

/// Day-first unless the first number cannot be a month-day pairing, in which
/// case the two are swapped (`10/25/2022`).
fn day_first(first: u32, second: u32) -> (u32, u32) {
    if second > 12 && first <= 12 {
        (second, first)
    } else {
        (first, second)
    }
}

fn expand_year(raw: &str) -> Option<i32> {
    let value: i32 = raw.parse().ok()?;
    match raw.len() {
        4 => Some(value),
        2 if value < 70 => Some(2000 + value),
        2 => Some(1900 + value),
        _ => None,
    }
}

fn month_from_name(token: &str) -> Option<u32> {
    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let lower = token.to_ascii_lowercase();
    MONTHS
        .iter()
        .position(|name| name.starts_with(&lower))
        .map(|i| i as u32 + 1)
}

fn split_named_month(cleaned: &str) -> Option<DateParts> {
    let mut month = None;
    let mut day = None;
    let mut year = None;

    for token in TOKEN_SPLIT.split(cleaned).filter(|t| !t.is_empty()) {
        if let Some(m) = month_from_name(token) {
            if month.replace(m).is_some() {
                return None;
            }
            continue;
        }
        if !token.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        match token.len() {
            4 if year.is_none() => year = Some(token.parse().ok()?),
            1 | 2 if day.is_none() => {
                let value: u32 = token.parse().ok()?;
                if value == 0 || value > 31 {
                    return None;
                }
                day = Some(value);
            }
            2 if year.is_none() => year = Some(expand_year(token)?),
            _ => return None,
        }
    }

    let month = month?;
    let day = match (day, year) {
        (Some(day), _) => day,
        // `October 2022`: month and year only.
        (None, Some(_)) => 1,
        (None, None) => return None,
    };
    Some(DateParts { year, month, day })
}
