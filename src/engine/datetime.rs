//! Datetime support for the `.datetime()` method family: lexical parsing
//! through the ISO format cascade or a user template, cross-type casts with
//! timezone gating, fractional-second precision adjustment and ISO
//! encoding.

use std::cmp::Ordering;
use std::fmt;

use chrono::{
    DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Timelike,
};

use super::runtime::{Error, ErrorCode};
use crate::jsonb::JsonbDatetime;

/// Target type constraint imposed by the specific method spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DatetimeTarget {
    /// `.datetime()`: whatever type the parse produced.
    Any,
    Date,
    Time,
    TimeTz,
    Timestamp,
    TimestampTz,
}

impl DatetimeTarget {
    fn name(&self) -> &'static str {
        match self {
            DatetimeTarget::Any => "datetime",
            DatetimeTarget::Date => "date",
            DatetimeTarget::Time => "time",
            DatetimeTarget::TimeTz => "time_tz",
            DatetimeTarget::Timestamp => "timestamp",
            DatetimeTarget::TimestampTz => "timestamp_tz",
        }
    }
}

fn format_not_recognized(kind: &str, text: &str) -> Error {
    Error::new(
        ErrorCode::DatetimeFormat,
        format!("{kind} format is not recognized: \"{text}\""),
    )
}

fn tz_required(from: &str, to: &str) -> Error {
    Error::new(
        ErrorCode::TimezoneRequired,
        format!("cannot convert value from {from} to {to} without time zone usage"),
    )
}

/// Gate for casts that cross the timezone boundary: a hard error when
/// `use_tz` is off, even under error suppression.
fn check_tz(use_tz: bool, from: &str, to: &str) -> Result<(), Error> {
    if use_tz {
        Ok(())
    } else {
        Err(tz_required(from, to))
    }
}

// ---------------------------------------------------------------------------
// Lexical parsing
// ---------------------------------------------------------------------------

/// Split a trailing timezone suffix (`+05`, `-08:30`, `+0530`, `Z`) off a
/// time or timestamp string.
fn split_tz_suffix(text: &str) -> Option<(&str, FixedOffset)> {
    let bytes = text.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    if text.ends_with('Z') || text.ends_with('z') {
        let head = &text[..text.len() - 1];
        return FixedOffset::east_opt(0).map(|off| (head, off));
    }
    // Find the sign starting the offset; skip position 0 so negative years
    // or bare times are not mistaken for offsets.
    let mut idx = None;
    for (i, b) in bytes.iter().enumerate().rev() {
        match b {
            b'+' | b'-' if i > 0 => {
                idx = Some(i);
                break;
            }
            b'0'..=b'9' | b':' => continue,
            _ => break,
        }
    }
    let i = idx?;
    // An offset cannot directly follow the time separator or another sign.
    if matches!(bytes[i - 1], b':' | b'+' | b'-') {
        return None;
    }
    let (head, tail) = text.split_at(i);
    let negative = tail.starts_with('-');
    let digits: Vec<&str> = tail[1..].split(':').collect();
    let (hours, minutes) = match digits.as_slice() {
        [h] if h.len() == 2 || h.len() == 1 => (h.parse::<i32>().ok()?, 0),
        [h] if h.len() == 4 => (
            h[..2].parse::<i32>().ok()?,
            h[2..].parse::<i32>().ok()?,
        ),
        [h, m] => (h.parse::<i32>().ok()?, m.parse::<i32>().ok()?),
        _ => return None,
    };
    if hours > 15 || minutes > 59 {
        return None;
    }
    let secs = hours * 3600 + minutes * 60;
    let secs = if negative { -secs } else { secs };
    FixedOffset::east_opt(secs).map(|off| (head, off))
}

fn parse_plain_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text, "%H:%M:%S%.f").ok()
}

fn parse_plain_timestamp(text: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
}

/// ISO format cascade: date, time with zone, time, timestamp with zone,
/// timestamp. The first matching format decides the produced type.
pub(crate) fn parse_iso_datetime(text: &str) -> Option<JsonbDatetime> {
    let trimmed = text.trim();
    if let Ok(d) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(JsonbDatetime::Date(d));
    }
    if let Some((head, off)) = split_tz_suffix(trimmed) {
        if let Some(t) = parse_plain_time(head) {
            return Some(JsonbDatetime::TimeTz(t, off));
        }
    }
    if let Some(t) = parse_plain_time(trimmed) {
        return Some(JsonbDatetime::Time(t));
    }
    if let Some((head, off)) = split_tz_suffix(trimmed) {
        if let Some(ts) = parse_plain_timestamp(head) {
            return off
                .from_local_datetime(&ts)
                .single()
                .map(JsonbDatetime::TimestampTz);
        }
    }
    parse_plain_timestamp(trimmed).map(JsonbDatetime::Timestamp)
}

// ---------------------------------------------------------------------------
// Template parsing
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct TemplateFields {
    year: Option<i32>,
    month: Option<u32>,
    day: Option<u32>,
    hour: Option<u32>,
    hour12: Option<u32>,
    pm: Option<bool>,
    minute: Option<u32>,
    second: Option<u32>,
    nanos: Option<u32>,
    tz: Option<FixedOffset>,
}

struct TemplateScanner<'a> {
    template: &'a [u8],
    input: &'a [u8],
    t: usize,
    i: usize,
}

impl<'a> TemplateScanner<'a> {
    fn read_digits(&mut self, max: usize) -> Option<u32> {
        let start = self.i;
        while self.i < self.input.len()
            && self.i - start < max
            && self.input[self.i].is_ascii_digit()
        {
            self.i += 1;
        }
        if self.i == start {
            return None;
        }
        std::str::from_utf8(&self.input[start..self.i])
            .ok()?
            .parse()
            .ok()
    }

    fn read_signed_digits(&mut self, max: usize) -> Option<i32> {
        let negative = match self.input.get(self.i) {
            Some(b'-') => {
                self.i += 1;
                true
            }
            Some(b'+') => {
                self.i += 1;
                false
            }
            _ => false,
        };
        let value = self.read_digits(max)? as i32;
        Some(if negative { -value } else { value })
    }

    fn eat_input(&mut self, byte: u8) -> bool {
        if self.input.get(self.i) == Some(&byte) {
            self.i += 1;
            true
        } else {
            false
        }
    }

    /// Read one field word: letters plus the digits embedded in field names
    /// such as `HH24` or `FF3`.
    fn template_word(&mut self) -> String {
        let start = self.t;
        while self.t < self.template.len() && self.template[self.t].is_ascii_alphanumeric() {
            self.t += 1;
        }
        String::from_utf8_lossy(&self.template[start..self.t]).to_ascii_uppercase()
    }
}

/// Parse `text` with a to_char-style template. Supported fields: `YYYY`,
/// `MM`, `DD`, `HH24`, `HH12`/`HH`, `MI`, `SS`, `MS`, `US`, `FF1`..`FF6`,
/// `TZH`, `TZM`, `TZ`, `AM`/`PM`, double-quoted literals and punctuation
/// separators. The produced type follows the fields present.
pub(crate) fn parse_with_template(text: &str, template: &str) -> Result<JsonbDatetime, Error> {
    let mut fields = TemplateFields::default();
    let mut sc = TemplateScanner {
        template: template.as_bytes(),
        input: text.trim().as_bytes(),
        t: 0,
        i: 0,
    };
    let fail = || format_not_recognized("datetime", text);

    while sc.t < sc.template.len() {
        let tb = sc.template[sc.t];
        if tb == b'"' {
            // Quoted literal: match verbatim.
            sc.t += 1;
            while sc.t < sc.template.len() && sc.template[sc.t] != b'"' {
                if !sc.eat_input(sc.template[sc.t]) {
                    return Err(fail());
                }
                sc.t += 1;
            }
            if sc.t >= sc.template.len() {
                return Err(Error::new(
                    ErrorCode::DatetimeFormat,
                    "unterminated quoted literal in datetime template",
                ));
            }
            sc.t += 1;
            continue;
        }
        if !tb.is_ascii_alphabetic() {
            // Separator: whitespace is interchangeable, punctuation exact.
            sc.t += 1;
            if tb.is_ascii_whitespace() {
                while sc
                    .input
                    .get(sc.i)
                    .map(|b| b.is_ascii_whitespace())
                    .unwrap_or(false)
                {
                    sc.i += 1;
                }
            } else if !sc.eat_input(tb) {
                return Err(fail());
            }
            continue;
        }

        let word = sc.template_word();
        match word.as_str() {
            "YYYY" => fields.year = Some(sc.read_signed_digits(4).ok_or_else(fail)?),
            "MM" => fields.month = Some(sc.read_digits(2).ok_or_else(fail)?),
            "DD" => fields.day = Some(sc.read_digits(2).ok_or_else(fail)?),
            "HH24" => fields.hour = Some(sc.read_digits(2).ok_or_else(fail)?),
            "HH12" | "HH" => fields.hour12 = Some(sc.read_digits(2).ok_or_else(fail)?),
            "MI" => fields.minute = Some(sc.read_digits(2).ok_or_else(fail)?),
            "SS" => fields.second = Some(sc.read_digits(2).ok_or_else(fail)?),
            "MS" => fields.nanos = Some(sc.read_digits(3).ok_or_else(fail)? * 1_000_000),
            "US" => fields.nanos = Some(sc.read_digits(6).ok_or_else(fail)? * 1_000),
            "FF1" | "FF2" | "FF3" | "FF4" | "FF5" | "FF6" => {
                let digits = word.as_bytes()[2] - b'0';
                let start = sc.i;
                let raw = sc.read_digits(digits as usize).ok_or_else(fail)?;
                let width = (sc.i - start) as u32;
                fields.nanos = Some(raw * 10u32.pow(9 - width));
            }
            "AM" | "PM" => {
                let a = sc.input.get(sc.i).copied().ok_or_else(fail)?;
                let m = sc.input.get(sc.i + 1).copied().ok_or_else(fail)?;
                match (a.to_ascii_uppercase(), m.to_ascii_uppercase()) {
                    (b'A', b'M') => fields.pm = Some(false),
                    (b'P', b'M') => fields.pm = Some(true),
                    _ => return Err(fail()),
                }
                sc.i += 2;
            }
            "TZH" => {
                let h = sc.read_signed_digits(2).ok_or_else(fail)?;
                let prior = fields.tz.map(|o| o.local_minus_utc()).unwrap_or(0);
                fields.tz = FixedOffset::east_opt(prior + h * 3600);
            }
            "TZM" => {
                let m = sc.read_digits(2).ok_or_else(fail)? as i32;
                let prior = fields.tz.map(|o| o.local_minus_utc()).unwrap_or(0);
                let signed = if prior < 0 { -m * 60 } else { m * 60 };
                fields.tz = FixedOffset::east_opt(prior + signed);
            }
            "TZ" => {
                let rest = std::str::from_utf8(&sc.input[sc.i..]).map_err(|_| fail())?;
                let consumed_before = rest.len();
                let (head, off) = split_tz_suffix(rest)
                    .filter(|(head, _)| head.is_empty())
                    .ok_or_else(fail)?;
                sc.i += consumed_before - head.len();
                fields.tz = Some(off);
            }
            _ => {
                return Err(Error::new(
                    ErrorCode::DatetimeFormat,
                    format!("unsupported datetime template field \"{word}\""),
                ));
            }
        }
    }

    if sc.i != sc.input.len() {
        return Err(fail());
    }

    assemble_fields(fields, text)
}

fn assemble_fields(fields: TemplateFields, text: &str) -> Result<JsonbDatetime, Error> {
    let fail = || format_not_recognized("datetime", text);

    let mut hour = fields.hour;
    if let Some(h12) = fields.hour12 {
        if h12 == 0 || h12 > 12 {
            return Err(fail());
        }
        let pm = fields.pm.unwrap_or(false);
        hour = Some(match (h12, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        });
    }

    let has_date = fields.year.is_some() || fields.month.is_some() || fields.day.is_some();
    let has_time =
        hour.is_some() || fields.minute.is_some() || fields.second.is_some() || fields.nanos.is_some();

    let date = if has_date {
        let year = fields.year.ok_or_else(fail)?;
        Some(
            NaiveDate::from_ymd_opt(
                year,
                fields.month.unwrap_or(1),
                fields.day.unwrap_or(1),
            )
            .ok_or_else(fail)?,
        )
    } else {
        None
    };

    let time = if has_time {
        Some(
            NaiveTime::from_hms_nano_opt(
                hour.unwrap_or(0),
                fields.minute.unwrap_or(0),
                fields.second.unwrap_or(0),
                fields.nanos.unwrap_or(0),
            )
            .ok_or_else(fail)?,
        )
    } else {
        None
    };

    match (date, time, fields.tz) {
        (Some(d), Some(t), Some(off)) => off
            .from_local_datetime(&d.and_time(t))
            .single()
            .map(JsonbDatetime::TimestampTz)
            .ok_or_else(fail),
        (Some(d), Some(t), None) => Ok(JsonbDatetime::Timestamp(d.and_time(t))),
        (Some(d), None, None) => Ok(JsonbDatetime::Date(d)),
        (None, Some(t), Some(off)) => Ok(JsonbDatetime::TimeTz(t, off)),
        (None, Some(t), None) => Ok(JsonbDatetime::Time(t)),
        _ => Err(fail()),
    }
}

// ---------------------------------------------------------------------------
// Target casts
// ---------------------------------------------------------------------------

fn at_midnight(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn local_instant(
    naive: NaiveDateTime,
    tz: FixedOffset,
) -> Result<DateTime<FixedOffset>, Error> {
    tz.from_local_datetime(&naive)
        .single()
        .ok_or_else(|| Error::internal("ambiguous local datetime for fixed offset"))
}

/// Cast a parsed datetime to the target type of the invoking method,
/// applying the compatibility matrix and the timezone gate.
pub(crate) fn cast_to_target(
    value: JsonbDatetime,
    target: DatetimeTarget,
    text: &str,
    use_tz: bool,
    local_tz: FixedOffset,
) -> Result<JsonbDatetime, Error> {
    use JsonbDatetime::*;
    let incompatible = || format_not_recognized(target.name(), text);

    match target {
        DatetimeTarget::Any => Ok(value),
        DatetimeTarget::Date => match value {
            Date(_) => Ok(value),
            Time(_) | TimeTz(..) => Err(incompatible()),
            Timestamp(ts) => Ok(Date(ts.date())),
            TimestampTz(ts) => {
                check_tz(use_tz, "timestamptz", "date")?;
                Ok(Date(ts.with_timezone(&local_tz).date_naive()))
            }
        },
        DatetimeTarget::Time => match value {
            Time(_) => Ok(value),
            Date(_) => Err(incompatible()),
            TimeTz(t, _) => {
                check_tz(use_tz, "timetz", "time")?;
                Ok(Time(t))
            }
            Timestamp(ts) => Ok(Time(ts.time())),
            TimestampTz(ts) => {
                check_tz(use_tz, "timestamptz", "time")?;
                Ok(Time(ts.with_timezone(&local_tz).time()))
            }
        },
        DatetimeTarget::TimeTz => match value {
            TimeTz(..) => Ok(value),
            Date(_) | Timestamp(_) => Err(incompatible()),
            Time(t) => {
                check_tz(use_tz, "time", "timetz")?;
                Ok(TimeTz(t, local_tz))
            }
            TimestampTz(ts) => {
                let local = ts.with_timezone(&local_tz);
                Ok(TimeTz(local.time(), local_tz))
            }
        },
        DatetimeTarget::Timestamp => match value {
            Timestamp(_) => Ok(value),
            Date(d) => Ok(Timestamp(at_midnight(d))),
            Time(_) | TimeTz(..) => Err(incompatible()),
            TimestampTz(ts) => {
                check_tz(use_tz, "timestamptz", "timestamp")?;
                Ok(Timestamp(ts.with_timezone(&local_tz).naive_local()))
            }
        },
        DatetimeTarget::TimestampTz => match value {
            TimestampTz(_) => Ok(value),
            Date(d) => {
                check_tz(use_tz, "date", "timestamptz")?;
                Ok(TimestampTz(local_instant(at_midnight(d), local_tz)?))
            }
            Time(_) | TimeTz(..) => Err(incompatible()),
            Timestamp(ts) => {
                check_tz(use_tz, "timestamp", "timestamptz")?;
                Ok(TimestampTz(local_instant(ts, local_tz)?))
            }
        },
    }
}

// ---------------------------------------------------------------------------
// Precision
// ---------------------------------------------------------------------------

/// Clamp the requested fractional-second precision to the supported range.
fn check_precision(target: DatetimeTarget, precision: i32) -> Result<u32, Error> {
    if precision < 0 {
        return Err(Error::new(
            ErrorCode::DatetimeFormat,
            format!(
                "time precision of jsonpath item method .{}() is out of range",
                target.name()
            ),
        ));
    }
    Ok((precision as u32).min(6))
}

fn round_time(t: NaiveTime, precision: u32) -> NaiveTime {
    let unit = 10u64.pow(9 - precision);
    let nanos = u64::from(t.num_seconds_from_midnight()) * 1_000_000_000 + u64::from(t.nanosecond());
    let rounded = (nanos + unit / 2) / unit * unit;
    let secs = (rounded / 1_000_000_000) as u32;
    let frac = (rounded % 1_000_000_000) as u32;
    // A round-up past midnight wraps, matching the day-less time type.
    NaiveTime::from_num_seconds_from_midnight_opt(secs % 86_400, frac)
        .unwrap_or(t)
}

fn round_datetime(ts: NaiveDateTime, precision: u32) -> NaiveDateTime {
    let unit = 10u64.pow(9 - precision);
    let nanos = u64::from(ts.time().nanosecond());
    let rounded = (nanos + unit / 2) / unit * unit;
    let base = ts.with_nanosecond(0).unwrap_or(ts);
    base + Duration::nanoseconds(rounded as i64)
}

/// Force a user-given fractional-second precision onto the value.
pub(crate) fn apply_precision(
    value: JsonbDatetime,
    target: DatetimeTarget,
    precision: i32,
) -> Result<JsonbDatetime, Error> {
    use JsonbDatetime::*;
    let p = check_precision(target, precision)?;
    Ok(match value {
        Date(d) => Date(d),
        Time(t) => Time(round_time(t, p)),
        TimeTz(t, off) => TimeTz(round_time(t, p), off),
        Timestamp(ts) => Timestamp(round_datetime(ts, p)),
        TimestampTz(ts) => {
            let off = *ts.offset();
            let rounded = round_datetime(ts.naive_local(), p);
            match off.from_local_datetime(&rounded).single() {
                Some(dt) => TimestampTz(dt),
                None => TimestampTz(ts),
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

fn timetz_cmp(a: (NaiveTime, FixedOffset), b: (NaiveTime, FixedOffset)) -> Ordering {
    let utc = |(t, off): (NaiveTime, FixedOffset)| {
        i64::from(t.num_seconds_from_midnight()) * 1_000_000_000 + i64::from(t.nanosecond())
            - i64::from(off.local_minus_utc()) * 1_000_000_000
    };
    utc(a)
        .cmp(&utc(b))
        // Equal instants order by zone, easternmost first.
        .then(b.1.local_minus_utc().cmp(&a.1.local_minus_utc()))
}

/// Cross-type datetime comparison. Returns `None` for uncomparable pairs
/// (which the caller maps to `Unknown`); timezone gating failures are hard
/// errors even under suppression.
pub(crate) fn compare_datetime(
    a: &JsonbDatetime,
    b: &JsonbDatetime,
    use_tz: bool,
    local_tz: FixedOffset,
) -> Result<Option<Ordering>, Error> {
    use JsonbDatetime::*;
    let ord = match (a, b) {
        (Date(x), Date(y)) => x.cmp(y),
        (Date(x), Timestamp(y)) => at_midnight(*x).cmp(y),
        (Timestamp(x), Date(y)) => x.cmp(&at_midnight(*y)),
        (Date(x), TimestampTz(y)) => {
            check_tz(use_tz, "date", "timestamptz")?;
            local_instant(at_midnight(*x), local_tz)?.cmp(y)
        }
        (TimestampTz(x), Date(y)) => {
            check_tz(use_tz, "date", "timestamptz")?;
            x.cmp(&local_instant(at_midnight(*y), local_tz)?)
        }
        (Time(x), Time(y)) => x.cmp(y),
        (Time(x), TimeTz(ty, toff)) => {
            check_tz(use_tz, "time", "timetz")?;
            timetz_cmp((*x, local_tz), (*ty, *toff))
        }
        (TimeTz(tx, xoff), Time(y)) => {
            check_tz(use_tz, "time", "timetz")?;
            timetz_cmp((*tx, *xoff), (*y, local_tz))
        }
        (TimeTz(tx, xoff), TimeTz(ty, yoff)) => timetz_cmp((*tx, *xoff), (*ty, *yoff)),
        (Timestamp(x), Timestamp(y)) => x.cmp(y),
        (Timestamp(x), TimestampTz(y)) => {
            check_tz(use_tz, "timestamp", "timestamptz")?;
            local_instant(*x, local_tz)?.cmp(y)
        }
        (TimestampTz(x), Timestamp(y)) => {
            check_tz(use_tz, "timestamp", "timestamptz")?;
            x.cmp(&local_instant(*y, local_tz)?)
        }
        (TimestampTz(x), TimestampTz(y)) => x.cmp(y),
        // date vs time kinds, time kinds vs timestamp kinds
        _ => return Ok(None),
    };
    Ok(Some(ord))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

fn push_time(out: &mut String, t: NaiveTime) {
    use std::fmt::Write;
    let _ = write!(out, "{}", t.format("%H:%M:%S"));
    let micros = t.nanosecond() / 1_000;
    if micros != 0 {
        let frac = format!("{micros:06}");
        let _ = write!(out, ".{}", frac.trim_end_matches('0'));
    }
}

fn push_offset(out: &mut String, off: FixedOffset) {
    use std::fmt::Write;
    let total = off.local_minus_utc();
    let sign = if total < 0 { '-' } else { '+' };
    let abs = total.abs();
    let _ = write!(out, "{sign}{:02}", abs / 3600);
    if abs % 3600 != 0 {
        let _ = write!(out, ":{:02}", (abs % 3600) / 60);
    }
}

impl fmt::Display for JsonbDatetime {
    /// ISO encoding, as produced by the `.string()` method and by container
    /// serialization.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        match self {
            JsonbDatetime::Date(d) => return write!(f, "{}", d.format("%Y-%m-%d")),
            JsonbDatetime::Time(t) => push_time(&mut out, *t),
            JsonbDatetime::TimeTz(t, off) => {
                push_time(&mut out, *t);
                push_offset(&mut out, *off);
            }
            JsonbDatetime::Timestamp(ts) => {
                out.push_str(&ts.date().format("%Y-%m-%d").to_string());
                out.push('T');
                push_time(&mut out, ts.time());
            }
            JsonbDatetime::TimestampTz(ts) => {
                out.push_str(&ts.date_naive().format("%Y-%m-%d").to_string());
                out.push('T');
                push_time(&mut out, ts.time());
                push_offset(&mut out, *ts.offset());
            }
        }
        f.write_str(&out)
    }
}
