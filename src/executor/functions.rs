/// Built-in scalar SQL functions.
///
/// Arguments arrive already evaluated. A function that cannot produce a
/// sensible result (bad argument, unknown name) returns NULL instead of failing.
use super::conditions::arithmetic;
use super::session::Session;
use crate::core::value::leading_number;
use crate::core::Value;
use crate::parser::BinaryOp;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike, Utc};
use md5::{Digest, Md5};
use rand::{Rng, SeedableRng};
use sha1::Sha1;
use tracing::debug;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

pub struct SqlFunctions;

impl SqlFunctions {
    pub fn evaluate(name: &str, args: &[Value], session: &Session) -> Value {
        let arg = |i: usize| args.get(i).unwrap_or(&Value::Null);
        match name.to_ascii_uppercase().as_str() {
            // date and time, all in UTC
            "NOW" | "CURRENT_TIMESTAMP" | "LOCALTIMESTAMP" | "LOCALTIME" | "SYSDATE" => {
                Value::Text(now().format(DATETIME_FORMAT).to_string())
            }
            "CURDATE" | "CURRENT_DATE" => Value::Text(now().format(DATE_FORMAT).to_string()),
            "CURTIME" | "CURRENT_TIME" => Value::Text(now().format(TIME_FORMAT).to_string()),
            "UNIX_TIMESTAMP" => {
                if args.is_empty() {
                    Value::Integer(Utc::now().timestamp())
                } else {
                    parse_datetime(arg(0)).map_or(Value::Null, |dt| Value::Integer(dt.and_utc().timestamp()))
                }
            }
            "FROM_UNIXTIME" => {
                let Some(dt) = number(arg(0))
                    .and_then(|ts| DateTime::from_timestamp(ts as i64, 0))
                    .map(|dt| dt.naive_utc())
                else {
                    return Value::Null;
                };
                match args.get(1).and_then(Value::to_text) {
                    Some(format) => Value::Text(format_mysql(&dt, &format)),
                    None => Value::Text(dt.format(DATETIME_FORMAT).to_string()),
                }
            }
            "DATE" => parse_datetime(arg(0))
                .map_or(Value::Null, |dt| Value::Text(dt.format(DATE_FORMAT).to_string())),
            "YEAR" => date_part(arg(0), 0),
            "MONTH" => date_part(arg(0), 1),
            "DAY" | "DAYOFMONTH" => date_part(arg(0), 2),
            "HOUR" => date_part(arg(0), 3),
            "MINUTE" => date_part(arg(0), 4),
            "SECOND" => date_part(arg(0), 5),
            "DATE_FORMAT" => match (parse_datetime(arg(0)), arg(1).to_text()) {
                (Some(dt), Some(format)) => Value::Text(format_mysql(&dt, &format)),
                _ => Value::Null,
            },

            // strings
            "CONCAT" => args
                .iter()
                .map(Value::to_text)
                .collect::<Option<Vec<_>>>()
                .map_or(Value::Null, |parts| Value::Text(parts.concat())),
            "CONCAT_WS" => match arg(0).to_text() {
                Some(separator) => Value::Text(
                    args.iter()
                        .skip(1)
                        .filter_map(Value::to_text)
                        .collect::<Vec<_>>()
                        .join(&separator),
                ),
                None => Value::Null,
            },
            "UPPER" | "UCASE" => map_text(arg(0), |s| s.to_uppercase()),
            "LOWER" | "LCASE" => map_text(arg(0), |s| s.to_lowercase()),
            "LENGTH" | "OCTET_LENGTH" => arg(0)
                .to_text()
                .map_or(Value::Null, |s| Value::Integer(s.len() as i64)),
            "CHAR_LENGTH" | "CHARACTER_LENGTH" => arg(0)
                .to_text()
                .map_or(Value::Null, |s| Value::Integer(s.chars().count() as i64)),
            "SUBSTRING" | "SUBSTR" | "MID" => {
                let (Some(s), Some(pos)) = (arg(0).to_text(), integer(arg(1))) else {
                    return Value::Null;
                };
                let len = if args.len() > 2 { integer(arg(2)) } else { None };
                if args.len() > 2 && len.is_none() {
                    return Value::Null;
                }
                Value::Text(substring(&s, pos, len))
            }
            "TRIM" => map_text(arg(0), |s| s.trim().to_string()),
            "LTRIM" => map_text(arg(0), |s| s.trim_start().to_string()),
            "RTRIM" => map_text(arg(0), |s| s.trim_end().to_string()),
            "REPLACE" => match (arg(0).to_text(), arg(1).to_text(), arg(2).to_text()) {
                (Some(s), Some(from), Some(to)) if !from.is_empty() => Value::Text(s.replace(&from, &to)),
                (Some(s), Some(_), Some(_)) => Value::Text(s),
                _ => Value::Null,
            },
            "LEFT" => match (arg(0).to_text(), integer(arg(1))) {
                (Some(s), Some(n)) => Value::Text(s.chars().take(n.max(0) as usize).collect()),
                _ => Value::Null,
            },
            "RIGHT" => match (arg(0).to_text(), integer(arg(1))) {
                (Some(s), Some(n)) => {
                    let count = s.chars().count();
                    Value::Text(s.chars().skip(count.saturating_sub(n.max(0) as usize)).collect())
                }
                _ => Value::Null,
            },
            "REVERSE" => map_text(arg(0), |s| s.chars().rev().collect()),

            // numbers
            "ABS" => match arg(0) {
                Value::Integer(i) => Value::Integer(i.saturating_abs()),
                other => number(other).map_or(Value::Null, |f| Value::Real(f.abs())),
            },
            "CEIL" | "CEILING" => number(arg(0)).map_or(Value::Null, |f| Value::Integer(f.ceil() as i64)),
            "FLOOR" => number(arg(0)).map_or(Value::Null, |f| Value::Integer(f.floor() as i64)),
            "ROUND" => {
                let digits = if args.len() > 1 { integer(arg(1)).unwrap_or(0) } else { 0 };
                round(arg(0), digits)
            }
            "RAND" => match integer(arg(0)) {
                Some(seed) => Value::Real(rand::rngs::StdRng::seed_from_u64(seed as u64).r#gen::<f64>()),
                None => Value::Real(rand::thread_rng().r#gen::<f64>()),
            },
            "MOD" => arithmetic(BinaryOp::Modulo, arg(0), arg(1)),

            // conditionals
            "IF" => {
                if arg(0).is_truthy() {
                    arg(1).clone()
                } else {
                    arg(2).clone()
                }
            }
            "IFNULL" => {
                if arg(0).is_null() {
                    arg(1).clone()
                } else {
                    arg(0).clone()
                }
            }
            "NULLIF" => {
                if arg(0).sql_eq(arg(1)) {
                    Value::Null
                } else {
                    arg(0).clone()
                }
            }
            "COALESCE" => args.iter().find(|v| !v.is_null()).cloned().unwrap_or(Value::Null),
            "GREATEST" => extreme(args, std::cmp::Ordering::Greater),
            "LEAST" => extreme(args, std::cmp::Ordering::Less),

            // hashing
            "MD5" => arg(0)
                .to_text()
                .map_or(Value::Null, |s| Value::Text(hex::encode(Md5::digest(s.as_bytes())))),
            "SHA1" | "SHA" => arg(0)
                .to_text()
                .map_or(Value::Null, |s| Value::Text(hex::encode(Sha1::digest(s.as_bytes())))),

            // session
            "LAST_INSERT_ID" => Value::Integer(session.last_insert_id),
            "FOUND_ROWS" => Value::Integer(i64::try_from(session.found_rows).unwrap_or(i64::MAX)),
            "DATABASE" | "SCHEMA" => Value::Text(session.database_name.clone()),
            "VERSION" => Value::Text(session.server_version.clone()),

            "CAST" | "CONVERT" => cast(arg(0), &arg(1).to_text().unwrap_or_default()),

            other => {
                debug!(function = other, "unknown function evaluates to NULL");
                Value::Null
            }
        }
    }
}

fn now() -> NaiveDateTime {
    Utc::now().naive_utc()
}

fn map_text(value: &Value, f: impl FnOnce(&str) -> String) -> Value {
    value.to_text().map_or(Value::Null, |s| Value::Text(f(&s)))
}

/// Numeric view that also accepts a numeric prefix (`'12abc'` → 12).
fn number(value: &Value) -> Option<f64> {
    value
        .as_f64()
        .or_else(|| value.as_text().and_then(leading_number))
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        other => number(other).map(|f| f as i64),
    }
}

/// 1-based; a negative position counts from the end.
fn substring(s: &str, pos: i64, len: Option<i64>) -> String {
    let chars: Vec<char> = s.chars().collect();
    let total = chars.len() as i64;
    let start = match pos {
        0 => return String::new(),
        p if p > 0 => p - 1,
        p => total + p,
    };
    if start < 0 || start >= total {
        return String::new();
    }
    let end = match len {
        Some(l) if l <= 0 => return String::new(),
        Some(l) => start.saturating_add(l).min(total),
        None => total,
    };
    chars[start as usize..end as usize].iter().collect()
}

fn round(value: &Value, digits: i64) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    if let (Value::Integer(i), 0..) = (value, digits) {
        return Value::Integer(*i);
    }
    let Some(f) = number(value) else {
        return Value::Null;
    };
    let factor = 10f64.powi(digits.clamp(-30, 30) as i32);
    let rounded = (f * factor).round() / factor;
    if digits <= 0 {
        Value::Integer(rounded as i64)
    } else {
        Value::Real(rounded)
    }
}

fn extreme(args: &[Value], wanted: std::cmp::Ordering) -> Value {
    let mut best: Option<&Value> = None;
    for value in args {
        if value.is_null() {
            return Value::Null;
        }
        best = match best {
            Some(current) if value.compare(current) != Some(wanted) => Some(current),
            _ => Some(value),
        };
    }
    best.cloned().unwrap_or(Value::Null)
}

fn cast(value: &Value, target: &str) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    let target = target.to_ascii_uppercase();
    match target.as_str() {
        "SIGNED" | "UNSIGNED" | "INT" | "INTEGER" => integer(value).map_or(Value::Integer(0), Value::Integer),
        "DECIMAL" | "DOUBLE" | "FLOAT" | "REAL" | "NUMERIC" => {
            number(value).map_or(Value::Integer(0), Value::Real)
        }
        "CHAR" | "VARCHAR" | "NCHAR" | "TEXT" | "BINARY" => {
            value.to_text().map_or(Value::Null, Value::Text)
        }
        "DATE" => parse_datetime(value)
            .map_or(Value::Null, |dt| Value::Text(dt.format(DATE_FORMAT).to_string())),
        "DATETIME" | "TIMESTAMP" => parse_datetime(value)
            .map_or(Value::Null, |dt| Value::Text(dt.format(DATETIME_FORMAT).to_string())),
        "TIME" => parse_datetime(value)
            .map_or(Value::Null, |dt| Value::Text(dt.format(TIME_FORMAT).to_string())),
        _ => value.clone(),
    }
}

/// Parses the date/time text forms stored by this engine and accepted by MySQL.
#[must_use]
pub fn parse_datetime(value: &Value) -> Option<NaiveDateTime> {
    let text = value.to_text()?;
    let text = text.trim();
    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, DATE_FORMAT)
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Year, month, day, hour, minute, second by position. Zero dates
/// (`0000-00-00 00:00:00`) still yield their zero components.
fn date_part(value: &Value, index: usize) -> Value {
    if let Some(dt) = parse_datetime(value) {
        let parts = [
            i64::from(dt.year()),
            i64::from(dt.month()),
            i64::from(dt.day()),
            i64::from(dt.hour()),
            i64::from(dt.minute()),
            i64::from(dt.second()),
        ];
        return Value::Integer(parts[index]);
    }
    let Some(text) = value.to_text() else {
        return Value::Null;
    };
    let numbers: Vec<i64> = text
        .split(|c: char| !c.is_ascii_digit())
        .filter(|s| !s.is_empty())
        .filter_map(|s| s.parse().ok())
        .collect();
    // a bare time such as `10:20:30`
    let offset = if text.contains(':') && !text.contains('-') { 3 } else { 0 };
    index
        .checked_sub(offset)
        .and_then(|i| numbers.get(i))
        .map_or(Value::Null, |n| Value::Integer(*n))
}

fn day_suffix(day: u32) -> &'static str {
    match (day % 10, day % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    }
}

/// Renders `DATE_FORMAT` specifiers (`%Y-%m-%d %H:%i:%s`).
#[must_use]
pub fn format_mysql(dt: &NaiveDateTime, format: &str) -> String {
    let mut out = String::with_capacity(format.len() + 8);
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(spec) = chars.next() else {
            out.push('%');
            break;
        };
        let piece = match spec {
            'Y' => dt.format("%Y").to_string(),
            'y' => dt.format("%y").to_string(),
            'm' => dt.format("%m").to_string(),
            'c' => dt.month().to_string(),
            'd' => dt.format("%d").to_string(),
            'e' => dt.day().to_string(),
            'D' => format!("{}{}", dt.day(), day_suffix(dt.day())),
            'H' => dt.format("%H").to_string(),
            'k' => dt.hour().to_string(),
            'h' | 'I' => dt.format("%I").to_string(),
            'l' => dt.format("%-I").to_string(),
            'i' => dt.format("%M").to_string(),
            's' | 'S' => dt.format("%S").to_string(),
            'f' => format!("{:06}", dt.and_utc().timestamp_subsec_micros()),
            'p' => dt.format("%p").to_string(),
            'M' => dt.format("%B").to_string(),
            'b' => dt.format("%b").to_string(),
            'W' => dt.format("%A").to_string(),
            'a' => dt.format("%a").to_string(),
            'w' => dt.weekday().num_days_from_sunday().to_string(),
            'j' => dt.format("%j").to_string(),
            'T' => dt.format("%H:%M:%S").to_string(),
            'r' => dt.format("%I:%M:%S %p").to_string(),
            other => other.to_string(),
        };
        out.push_str(&piece);
    }
    out
}
