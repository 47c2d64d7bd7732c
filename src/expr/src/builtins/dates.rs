//! Date pipes, date conditions and the `Date:now` key
//!
//! Dates travel as RFC 3339 strings in UTC with millisecond precision
//! (`2015-04-22T00:31:06.000Z`). Inputs are read leniently: numbers are epoch
//! milliseconds, strings may be RFC 3339, an ISO date-time with a short offset
//! (`2015-04-21T17:31:06-07`), a naive date-time taken as UTC, or one of the
//! common day formats at midnight UTC.
//!
//! Zone arguments are `UTC`, `Z`, or a fixed offset (`-0700`, `+05`, `-07\:00`).
//! An argument starting with `$` names a context path holding the zone.

use crate::condition::{BasicConditionResolver, ConditionHandler};
use crate::context::ExprContext;
use crate::error::{ExprError, Result};
use crate::key::{BasicKeyResolver, Key, KeyHandler};
use crate::pipe::{BasicPipeTransformResolver, PipeTransform};
use crate::value::{to_number, to_text};
use chrono::format::{Item, StrftimeItems};
use chrono::{
    DateTime, Datelike, Duration, FixedOffset, Months, NaiveDate, NaiveDateTime, Offset,
    SecondsFormat, TimeZone, Timelike, Utc,
};
use serde_json::Value;
use std::cmp::Ordering;
use std::fmt::Write;

const DEFAULT_DATE_PATTERN: &str = "%Y-%m-%d";

const OFFSET_DATE_TIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%#z", "%Y-%m-%dT%H:%M:%S%.f%#z"];
const NAIVE_DATE_TIME_FORMATS: [&str; 3] =
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S"];
const DATE_FORMATS: [&str; 5] = ["%Y-%m-%d", "%Y%m%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y"];

/// Read a value as an instant; `None` when it is not a date
pub fn to_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => DateTime::from_timestamp_millis(n.as_f64()? as i64),
        Value::String(s) => parse_datetime(s.trim()),
        _ => None,
    }
}

fn parse_datetime(text: &str) -> Option<DateTime<Utc>> {
    if text.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in OFFSET_DATE_TIME_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(text, format) {
            return Some(dt.with_timezone(&Utc));
        }
    }
    for format in NAIVE_DATE_TIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return date.and_hms_opt(0, 0, 0).map(|naive| Utc.from_utc_datetime(&naive));
        }
    }
    text.parse::<i64>().ok().and_then(DateTime::from_timestamp_millis)
}

/// Canonical rendering of an instant
pub fn date_value(dt: DateTime<Utc>) -> Value {
    Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// Parse `UTC`, `Z`, `GMT` or a `+HH[:MM]` / `-HHMM` offset
pub fn parse_zone(text: &str) -> Option<FixedOffset> {
    let text = text.trim();
    if ["UTC", "Z", "GMT"].iter().any(|z| text.eq_ignore_ascii_case(z)) {
        return FixedOffset::east_opt(0);
    }
    let (sign, rest) = match text.as_bytes().first()? {
        b'+' => (1, &text[1..]),
        b'-' => (-1, &text[1..]),
        _ => return None,
    };
    let digits: String = rest.chars().filter(|c| *c != ':').collect();
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let (hours, minutes) = match digits.len() {
        1 | 2 => (digits.parse::<i32>().ok()?, 0),
        4 => (digits[..2].parse::<i32>().ok()?, digits[2..].parse::<i32>().ok()?),
        _ => return None,
    };
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}

fn utc() -> FixedOffset {
    Utc.fix()
}

/// Zone argument: fixed, or read from the context at evaluation time
#[derive(Debug, Clone)]
enum Zone {
    Fixed(FixedOffset),
    Path(String),
}

impl Default for Zone {
    fn default() -> Self {
        Zone::Fixed(utc())
    }
}

impl Zone {
    /// Unrecognised zones fall back to UTC
    fn parse(arg: &str) -> Self {
        match arg.trim().strip_prefix('$') {
            Some(path) => Zone::Path(path.trim().to_string()),
            None => Zone::Fixed(parse_zone(arg).unwrap_or_else(utc)),
        }
    }

    fn resolve(&self, context: &ExprContext) -> FixedOffset {
        match self {
            Zone::Fixed(offset) => *offset,
            Zone::Path(path) => context
                .get_path(path)
                .and_then(to_text)
                .and_then(|zone| parse_zone(&zone))
                .unwrap_or_else(utc),
        }
    }
}

fn check_pattern(pipe: &str, pattern: &str) -> Result<()> {
    if StrftimeItems::new(pattern).any(|item| matches!(item, Item::Error)) {
        return Err(ExprError::InvalidPipeArgs {
            pipe: pipe.to_string(),
            reason: format!("invalid date pattern '{}'", pattern),
        });
    }
    Ok(())
}

/// Formats a date with a strftime pattern in a zone
///
/// Values that are not dates pass through unchanged.
#[derive(Debug)]
pub struct FormatDatePipe {
    pattern: String,
    zone: Zone,
}

impl Default for FormatDatePipe {
    fn default() -> Self {
        Self {
            pattern: DEFAULT_DATE_PATTERN.to_string(),
            zone: Zone::default(),
        }
    }
}

impl PipeTransform for FormatDatePipe {
    fn transform(&self, value: Value, context: &ExprContext) -> Value {
        let Some(dt) = to_datetime(&value) else {
            return value;
        };
        let local = dt.with_timezone(&self.zone.resolve(context));
        let mut out = String::new();
        match write!(out, "{}", local.format(&self.pattern)) {
            Ok(()) => Value::String(out),
            Err(_) => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(pattern) = args.first() {
            check_pattern("formatDate", pattern)?;
            self.pattern = pattern.clone();
        }
        if let Some(zone) = args.get(1) {
            self.zone = Zone::parse(zone);
        }
        Ok(())
    }
}

/// Parses text into a date
///
/// Without arguments the input is read leniently. An empty pattern returns
/// epoch milliseconds. Otherwise the pattern is applied in the zone. Input
/// that does not parse becomes null.
#[derive(Debug, Default)]
pub struct ParseDatePipe {
    pattern: Option<String>,
    millis: bool,
    zone: Zone,
}

impl ParseDatePipe {
    fn parse_with(&self, text: &str, pattern: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(text, pattern)
            .ok()
            .or_else(|| NaiveDate::parse_from_str(text, pattern).ok()?.and_hms_opt(0, 0, 0))?;
        offset
            .from_local_datetime(&naive)
            .single()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

impl PipeTransform for ParseDatePipe {
    fn transform(&self, value: Value, context: &ExprContext) -> Value {
        if value.is_null() {
            return Value::Null;
        }
        let parsed = match (&self.pattern, to_text(&value)) {
            (Some(pattern), Some(text)) => {
                self.parse_with(text.trim(), pattern, self.zone.resolve(context))
            }
            (None, _) => to_datetime(&value),
            (Some(_), None) => None,
        };
        match parsed {
            Some(dt) if self.millis => Value::from(dt.timestamp_millis()),
            Some(dt) => date_value(dt),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        match args.first().map(String::as_str) {
            None => {}
            Some("") => self.millis = true,
            Some(pattern) => {
                check_pattern("parseDate", pattern)?;
                self.pattern = Some(pattern.to_string());
            }
        }
        if let Some(zone) = args.get(1) {
            self.zone = Zone::parse(zone);
        }
        Ok(())
    }
}

/// Calendar unit used by date math and `datePlus`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
}

impl DateUnit {
    fn from_char(c: char) -> Option<Self> {
        match c {
            'y' => Some(DateUnit::Year),
            'M' => Some(DateUnit::Month),
            'w' => Some(DateUnit::Week),
            'd' => Some(DateUnit::Day),
            'h' | 'H' => Some(DateUnit::Hour),
            'm' => Some(DateUnit::Minute),
            's' => Some(DateUnit::Second),
            _ => None,
        }
    }

    /// Shift a local date-time by `amount` units
    fn add(self, dt: DateTime<FixedOffset>, amount: i64) -> Option<DateTime<FixedOffset>> {
        let months = |n: i64| -> Option<DateTime<FixedOffset>> {
            let step = Months::new(u32::try_from(n.unsigned_abs()).ok()?);
            if n >= 0 {
                dt.checked_add_months(step)
            } else {
                dt.checked_sub_months(step)
            }
        };
        let delta = match self {
            DateUnit::Year => return months(amount.checked_mul(12)?),
            DateUnit::Month => return months(amount),
            DateUnit::Week => Duration::try_weeks(amount)?,
            DateUnit::Day => Duration::try_days(amount)?,
            DateUnit::Hour => Duration::try_hours(amount)?,
            DateUnit::Minute => Duration::try_minutes(amount)?,
            DateUnit::Second => Duration::try_seconds(amount)?,
        };
        dt.checked_add_signed(delta)
    }

    /// Round a local date-time down to the start of the unit
    fn floor(self, dt: DateTime<FixedOffset>) -> Option<DateTime<FixedOffset>> {
        let local = dt.naive_local();
        let date = local.date();
        let floored = match self {
            DateUnit::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1)?.and_hms_opt(0, 0, 0)?,
            DateUnit::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1)?.and_hms_opt(0, 0, 0)?
            }
            DateUnit::Week => {
                let since_monday = i64::from(date.weekday().num_days_from_monday());
                let monday = date - Duration::try_days(since_monday)?;
                monday.and_hms_opt(0, 0, 0)?
            }
            DateUnit::Day => date.and_hms_opt(0, 0, 0)?,
            DateUnit::Hour => date.and_hms_opt(local.hour(), 0, 0)?,
            DateUnit::Minute => date.and_hms_opt(local.hour(), local.minute(), 0)?,
            DateUnit::Second => date.and_hms_opt(local.hour(), local.minute(), local.second())?,
        };
        dt.offset().from_local_datetime(&floored).single()
    }
}

/// One step of a date math expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateOp {
    Add(i64, DateUnit),
    Floor(DateUnit),
}

/// Parse `+1d`, `-2h`, `/d` steps
///
/// A missing count means one. Rounding takes no count.
pub fn parse_date_math(math: &str) -> std::result::Result<Vec<DateOp>, String> {
    let chars: Vec<char> = math.chars().collect();
    let mut ops = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let op = chars[i];
        i += 1;
        let sign = match op {
            '+' => 1,
            '-' => -1,
            '/' => 0,
            other => return Err(format!("operator '{}' not supported in '{}'", other, math)),
        };

        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        let count = if i == start {
            1
        } else {
            let digits: String = chars[start..i].iter().collect();
            digits.parse::<i64>().map_err(|e| format!("bad count in '{}': {}", math, e))?
        };

        let unit = chars
            .get(i)
            .copied()
            .ok_or_else(|| format!("truncated date math '{}'", math))?;
        let unit = DateUnit::from_char(unit)
            .ok_or_else(|| format!("unit '{}' not supported in '{}'", unit, math))?;
        i += 1;

        if sign == 0 {
            if i - start != 1 {
                return Err(format!("rounding takes a single unit in '{}'", math));
            }
            ops.push(DateOp::Floor(unit));
        } else {
            ops.push(DateOp::Add(sign * count, unit));
        }
    }
    Ok(ops)
}

/// Apply date math steps in a zone
pub fn apply_date_math(
    dt: DateTime<Utc>,
    ops: &[DateOp],
    offset: FixedOffset,
) -> Option<DateTime<Utc>> {
    let mut local = dt.with_timezone(&offset);
    for op in ops {
        local = match *op {
            DateOp::Add(amount, unit) => unit.add(local, amount)?,
            DateOp::Floor(unit) => unit.floor(local)?,
        };
    }
    Some(local.with_timezone(&Utc))
}

/// Date math relative to the input (`now+1d/d`) or to a fixed date
/// (`2015-04-21||+1M`)
#[derive(Debug, Default)]
pub struct DateMathPipe {
    anchor: Option<DateTime<Utc>>,
    ops: Option<Vec<DateOp>>,
    zone: Zone,
}

impl PipeTransform for DateMathPipe {
    fn transform(&self, value: Value, context: &ExprContext) -> Value {
        let Some(ops) = &self.ops else {
            return value;
        };
        let Some(start) = self.anchor.or_else(|| to_datetime(&value)) else {
            return value;
        };
        match apply_date_math(start, ops, self.zone.resolve(context)) {
            Some(dt) => date_value(dt),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        let Some(math) = args.first().map(|m| m.trim()) else {
            return Ok(());
        };
        let invalid = |reason: String| ExprError::InvalidPipeArgs {
            pipe: "dateMath".to_string(),
            reason,
        };

        let steps = if let Some(rest) = math.strip_prefix("now") {
            rest
        } else if let Some((date, rest)) = math.split_once("||") {
            let anchor = parse_datetime(date.trim())
                .ok_or_else(|| invalid(format!("bad date '{}'", date)))?;
            self.anchor = Some(anchor);
            rest
        } else {
            let anchor =
                parse_datetime(math).ok_or_else(|| invalid(format!("bad date '{}'", math)))?;
            self.anchor = Some(anchor);
            ""
        };
        self.ops = Some(parse_date_math(steps).map_err(invalid)?);

        if let Some(zone) = args.get(1) {
            self.zone = Zone::parse(zone);
        }
        Ok(())
    }
}

/// Adds a fixed or context-provided amount of a unit
///
/// `datePlus:1:d`, `datePlus:$offset:h:-0500`
#[derive(Debug)]
pub struct DatePlusPipe {
    amount: i64,
    amount_path: Option<String>,
    unit: Option<DateUnit>,
    zone: Zone,
}

impl Default for DatePlusPipe {
    fn default() -> Self {
        Self {
            amount: 1,
            amount_path: None,
            unit: Some(DateUnit::Day),
            zone: Zone::default(),
        }
    }
}

impl DatePlusPipe {
    fn amount(&self, context: &ExprContext) -> i64 {
        let Some(path) = &self.amount_path else {
            return self.amount;
        };
        ["variables", "fieldValues"]
            .iter()
            .filter_map(|root| context.get_path(&format!("{}.{}", root, path)))
            .chain(context.get_path(path))
            .find_map(to_number)
            .map_or(0, |n| n as i64)
    }
}

impl PipeTransform for DatePlusPipe {
    fn transform(&self, value: Value, context: &ExprContext) -> Value {
        let Some(dt) = to_datetime(&value) else {
            return value;
        };
        let Some(unit) = self.unit else {
            return date_value(dt);
        };
        let local = dt.with_timezone(&self.zone.resolve(context));
        match unit.add(local, self.amount(context)) {
            Some(shifted) => date_value(shifted.with_timezone(&Utc)),
            None => Value::Null,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(amount) = args.first() {
            match amount.trim().strip_prefix('$') {
                Some(path) => self.amount_path = Some(path.trim().to_string()),
                None => {
                    self.amount = amount.trim().parse().map_err(|_| ExprError::InvalidPipeArgs {
                        pipe: "datePlus".to_string(),
                        reason: format!("'{}' is not an integer", amount),
                    })?
                }
            }
        }
        if let Some(unit) = args.get(1) {
            let mut chars = unit.trim().chars();
            self.unit = match (chars.next(), chars.next()) {
                (Some(c), None) => DateUnit::from_char(c),
                _ => None,
            };
        }
        if let Some(zone) = args.get(2) {
            self.zone = Zone::parse(zone);
        }
        Ok(())
    }
}

const SPANS: [(i64, &str); 6] = [
    (365 * 86_400_000, "year"),
    (30 * 86_400_000, "month"),
    (86_400_000, "day"),
    (3_600_000, "hour"),
    (60_000, "minute"),
    (1_000, "second"),
];

/// Render a span in its largest whole unit: `in 3 days`, `2 hours ago`
pub fn humanize(span_millis: i64, without_affix: bool) -> String {
    let future = span_millis >= 0;
    let span = span_millis.unsigned_abs();
    let (count, unit) = SPANS
        .iter()
        .map(|(size, unit)| (span / *size as u64, *unit))
        .find(|(count, _)| *count > 0)
        .unwrap_or((0, "second"));
    let plural = if count == 1 { "" } else { "s" };

    if without_affix {
        format!("{} {}{}", count, unit, plural)
    } else if future {
        format!("in {} {}{}", count, unit, plural)
    } else {
        format!("{} {}{} ago", count, unit, plural)
    }
}

/// Distance from now in words
#[derive(Debug, Default)]
pub struct FromNowPipe {
    without_affix: bool,
}

impl PipeTransform for FromNowPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        match to_datetime(&value) {
            Some(dt) => {
                let span = dt.signed_duration_since(Utc::now()).num_milliseconds();
                Value::String(humanize(span, self.without_affix))
            }
            None => value,
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        if let Some(flag) = args.first() {
            self.without_affix = flag.trim().eq_ignore_ascii_case("true");
        }
        Ok(())
    }
}

/// Whole units elapsed since the date (`d`, `h`, `m`, `s`)
#[derive(Debug, Default)]
pub struct FromNowUnitsPipe {
    unit: Option<DateUnit>,
}

impl PipeTransform for FromNowUnitsPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        let Some(dt) = to_datetime(&value) else {
            return value;
        };
        let elapsed = Utc::now().signed_duration_since(dt);
        let count = match self.unit {
            Some(DateUnit::Hour) => elapsed.num_hours(),
            Some(DateUnit::Minute) => elapsed.num_minutes(),
            Some(DateUnit::Second) => elapsed.num_seconds(),
            _ => elapsed.num_days(),
        };
        Value::from(count)
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.unit = args
            .first()
            .and_then(|unit| unit.trim().chars().next())
            .and_then(DateUnit::from_char);
        Ok(())
    }
}

/// Renders a millisecond duration
///
/// Units `days`, `hours`, `minutes` and `seconds` give whole counts;
/// `HHhMMmSSs` gives `1H 2M 3S`; anything else gives words (`3 minutes`).
#[derive(Debug, Default)]
pub struct FormatDurationPipe {
    units: Option<String>,
}

impl PipeTransform for FormatDurationPipe {
    fn transform(&self, value: Value, _context: &ExprContext) -> Value {
        let Some(millis) = to_number(&value).map(|n| n as i64) else {
            return value;
        };
        let seconds = millis / 1000;
        match self.units.as_deref() {
            Some("days") => Value::from(seconds / 86_400),
            Some("hours") => Value::from(seconds / 3_600),
            Some("minutes") => Value::from(seconds / 60),
            Some("seconds") => Value::from(seconds),
            Some("HHhMMmSSs") => Value::String(format!(
                "{}H {}M {}S",
                seconds / 3_600,
                (seconds / 60) % 60,
                seconds % 60
            )),
            _ => Value::String(humanize(millis, true)),
        }
    }

    fn args(&mut self, args: &[String]) -> Result<()> {
        self.units = args.first().map(|u| u.trim().to_string());
        Ok(())
    }
}

/// Current instant
#[derive(Debug, Default)]
pub struct DateNowHandler;

impl KeyHandler for DateNowHandler {
    fn call(&self, _key: &Key, _context: &ExprContext) -> Value {
        date_value(Utc::now())
    }
}

/// Register the date pipes
pub fn pipes() -> BasicPipeTransformResolver {
    BasicPipeTransformResolver::new()
        .pipe::<FormatDatePipe>("formatDate")
        .pipe::<ParseDatePipe>("parseDate")
        .pipe::<DateMathPipe>("dateMath")
        .pipe::<DatePlusPipe>("datePlus")
        .pipe::<FromNowPipe>("fromNow")
        .pipe::<FromNowUnitsPipe>("fromNowUnits")
        .pipe::<FormatDurationPipe>("formatDuration")
}

/// Register `Date:now`
pub fn keys() -> BasicKeyResolver {
    BasicKeyResolver::new().key(Key::new("Date", "now"), DateNowHandler)
}

// ============================================================================
// Conditions
// ============================================================================

fn first_date(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Array(items) => items.first().and_then(to_datetime),
        other => to_datetime(other),
    }
}

/// Orders absent or unparseable dates below any date
fn compare_dates(k: Option<DateTime<Utc>>, v: Option<DateTime<Utc>>) -> Ordering {
    match (k, v) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(k), Some(v)) => k.cmp(&v),
    }
}

/// Compares the first key value with the first operand as instants
#[derive(Clone, Copy)]
pub struct DateCompare(pub fn(Ordering) -> bool);

impl ConditionHandler for DateCompare {
    fn test(&self, key_value: &Value, values: &Value) -> bool {
        (self.0)(compare_dates(first_date(key_value), first_date(values)))
    }
}

/// Register the date conditions
pub fn conditions() -> BasicConditionResolver {
    BasicConditionResolver::new()
        .condition("DateEquals", DateCompare(Ordering::is_eq))
        .condition("DateNotEquals", DateCompare(Ordering::is_ne))
        .condition("DateLessThan", DateCompare(Ordering::is_lt))
        .condition("DateLessThanEquals", DateCompare(Ordering::is_le))
        .condition("DateGreaterThan", DateCompare(Ordering::is_gt))
        .condition("DateGreaterThanEquals", DateCompare(Ordering::is_ge))
}
