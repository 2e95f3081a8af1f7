//! Tolerant parsers for human-edited CSV cells.

use lazy_static::lazy_static;
use regex::Regex;
use time::{
    format_description::well_known::{Rfc2822, Rfc3339}, macros::format_description, Date, Month,
    OffsetDateTime, PrimitiveDateTime, Time,
};

/// Outcome of a tolerant parse.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Parsed<T> {
    Value(T),
    Invalid,
}

lazy_static! {
    static ref NUMBER_RE: Regex = Regex::new(r"[-+]?\d+(?:\.\d+)?").unwrap();
    static ref US_DATE_RE: Regex =
        Regex::new(r"^(\d{1,2})/(\d{1,2})/(\d{4})(?:\s+(\d{1,2}):(\d{2}))?$").unwrap();
    static ref LIST_SEP_RE: Regex = Regex::new(r"[;|,]").unwrap();
    static ref SPACES_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// `true/false/yes/no/1/0`, any case.
pub fn parse_bool(s: &str) -> Parsed<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Parsed::Value(true),
        "false" | "no" | "0" => Parsed::Value(false),
        _ => Parsed::Invalid,
    }
}

/// First numeric token in the text, e.g. `"about 5 years"` → 5.
pub fn parse_number(s: &str) -> Parsed<f64> {
    NUMBER_RE
        .find(s)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .map_or(Parsed::Invalid, Parsed::Value)
}

fn us_date(s: &str) -> Option<OffsetDateTime> {
    let caps = US_DATE_RE.captures(s)?;
    let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

    let month = Month::try_from(u8::try_from(num(1)?).ok()?).ok()?;
    let day = u8::try_from(num(2)?).ok()?;
    let year = i32::try_from(num(3)?).ok()?;
    let date = Date::from_calendar_date(year, month, day).ok()?;

    let time = match (num(4), num(5)) {
        (Some(h), Some(m)) => Time::from_hms(u8::try_from(h).ok()?, u8::try_from(m).ok()?, 0).ok()?,
        _ => Time::MIDNIGHT,
    };
    Some(PrimitiveDateTime::new(date, time).assume_utc())
}

/// Anything a person or a spreadsheet is likely to write: RFC 3339,
/// RFC 2822, ISO-style with `T` or a space, slashed ISO dates, and
/// spelled-out month names.
fn general_date(s: &str) -> Option<OffsetDateTime> {
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc3339) {
        return Some(dt);
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Some(dt);
    }

    let date_times = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day] [hour]:[minute]"),
        format_description!("[year]/[month]/[day] [hour]:[minute]"),
        format_description!(
            "[weekday repr:short], [day] [month repr:short] [year] [hour]:[minute]:[second] GMT"
        ),
    ];
    for fmt in date_times {
        if let Ok(dt) = PrimitiveDateTime::parse(s, fmt) {
            return Some(dt.assume_utc());
        }
    }

    let dates = [
        format_description!("[year]-[month]-[day]"),
        format_description!("[year]/[month]/[day]"),
        format_description!("[month repr:long] [day padding:none], [year]"),
        format_description!("[month repr:short] [day padding:none], [year]"),
        format_description!("[day padding:none] [month repr:long] [year]"),
    ];
    dates
        .into_iter()
        .find_map(|fmt| Date::parse(s, fmt).ok())
        .map(|d| d.midnight().assume_utc())
}

/// `M/D/YYYY`, `M/D/YYYY H:mm` (24h), or any of the forms
/// [`general_date`] knows. Zone-less values are taken as UTC.
pub fn parse_created_at(s: &str) -> Parsed<OffsetDateTime> {
    let s = s.trim();
    us_date(s)
        .or_else(|| general_date(s))
        .map_or(Parsed::Invalid, Parsed::Value)
}

/// Collapses inner whitespace and trims; empty result means "drop".
pub fn normalize_token(s: &str) -> String {
    SPACES_RE.replace_all(s.trim(), " ").into_owned()
}

/// Splits on `;`, `|` or `,`, dropping empty entries.
pub fn split_list(s: &str) -> Vec<String> {
    LIST_SEP_RE
        .split(s)
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect()
}

pub fn normalize_email(s: &str) -> String {
    s.trim().to_lowercase()
}
