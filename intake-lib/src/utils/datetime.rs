use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Formats accepted when a delimited-text cell is checked for a date
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn get_utc_iso_datetime() -> String {
    let timestamp = chrono::Utc::now().to_rfc3339();
    return timestamp;
}

// Serial day 0 of the 1900 date system as spreadsheets count it
fn excel_epoch() -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(1899, 12, 30).map(|date| date.and_time(NaiveTime::MIN))
}

/// Convert a spreadsheet serial date (fractional days since 1899-12-30) to a timestamp,
/// rounded to the second
pub fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() {
        return None;
    }
    let days = serial.trunc();
    let seconds = ((serial - days) * SECONDS_PER_DAY).round();
    let total = (days as i64)
        .checked_mul(SECONDS_PER_DAY as i64)?
        .checked_add(seconds as i64)?;
    excel_epoch()?.checked_add_signed(TimeDelta::try_seconds(total)?)
}

pub fn datetime_to_excel_serial(value: &NaiveDateTime) -> Option<f64> {
    let seconds = value.signed_duration_since(excel_epoch()?).num_seconds();
    Some(seconds as f64 / SECONDS_PER_DAY)
}

/// Parse `YYYY-MM-DD` or an ISO-like date-time (space or `T` separated, whole seconds)
pub fn parse_iso_datetime(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_time(NaiveTime::MIN));
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
}

/// Date-only values print as `YYYY-MM-DD`, everything else as `YYYY-MM-DD HH:MM:SS`
pub fn format_datetime(value: &NaiveDateTime) -> String {
    if value.time() == NaiveTime::MIN {
        value.format("%Y-%m-%d").to_string()
    } else if value.nanosecond() == 0 {
        value.format("%Y-%m-%d %H:%M:%S").to_string()
    } else {
        value.format("%Y-%m-%d %H:%M:%S%.f").to_string()
    }
}
