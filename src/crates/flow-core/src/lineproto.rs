//! Line-protocol decoding for the `/write` ingest endpoint (§6.1).
//!
//! The DSL/query-language parsers are explicitly out of scope, but the wire
//! format ingest decodes from is a data format, not a query language, so it
//! belongs in the core the way the teacher's `config::loader` decodes its
//! own small `$include`/`${ENV:..}` mini-language inline rather than
//! punting it to an external crate.

use thiserror::Error;

use crate::point::{Point, Tags};
use crate::value::Value;

#[derive(Debug, Error, PartialEq)]
pub enum LineProtoError {
    #[error("empty line")]
    Empty,
    #[error("missing field set")]
    MissingFields,
    #[error("malformed field `{0}`")]
    MalformedField(String),
    #[error("malformed timestamp `{0}`")]
    MalformedTimestamp(String),
}

/// Precision multiplier applied to a bare integer timestamp to reach
/// nanoseconds, per `POST /write?...&precision={n,u,ms,s,m,h}`.
#[derive(Debug, Clone, Copy)]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
}

impl Precision {
    pub fn parse(s: &str) -> Option<Precision> {
        match s {
            "n" => Some(Precision::Nanoseconds),
            "u" => Some(Precision::Microseconds),
            "ms" => Some(Precision::Milliseconds),
            "s" => Some(Precision::Seconds),
            "m" => Some(Precision::Minutes),
            "h" => Some(Precision::Hours),
            _ => None,
        }
    }

    fn multiplier(self) -> i64 {
        match self {
            Precision::Nanoseconds => 1,
            Precision::Microseconds => 1_000,
            Precision::Milliseconds => 1_000_000,
            Precision::Seconds => 1_000_000_000,
            Precision::Minutes => 60 * 1_000_000_000,
            Precision::Hours => 3600 * 1_000_000_000,
        }
    }
}

/// Parse one line-protocol line: `measurement[,tag=val...] field=val[,field=val...] [time]`.
pub fn parse_line(line: &str, precision: Precision, default_time: i64) -> Result<Point, LineProtoError> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Err(LineProtoError::Empty);
    }

    let mut parts = split_unescaped(line, ' ');
    let ident = parts.next().ok_or(LineProtoError::Empty)?;
    let fieldset = parts.next().ok_or(LineProtoError::MissingFields)?;
    let ts_part = parts.next();

    let mut ident_segs = split_unescaped(ident, ',');
    let measurement = unescape(ident_segs.next().ok_or(LineProtoError::Empty)?);

    let mut tags = Tags::new();
    for seg in ident_segs {
        let (k, v) = split_kv(&seg).ok_or_else(|| LineProtoError::MalformedField(seg.clone()))?;
        tags.insert(unescape(&k), unescape(&v));
    }

    let mut point = Point::new(measurement, default_time).with_tags(tags);

    for seg in split_unescaped(fieldset, ',') {
        let (k, v) = split_kv(&seg).ok_or_else(|| LineProtoError::MalformedField(seg.clone()))?;
        point.fields.insert(unescape(&k), parse_field_value(&v)?);
    }

    if let Some(ts) = ts_part {
        let n: i64 = ts
            .parse()
            .map_err(|_| LineProtoError::MalformedTimestamp(ts.to_string()))?;
        point.time = n * precision.multiplier();
    }

    Ok(point)
}

/// Decode an entire line-protocol body into points, skipping blank/comment lines.
pub fn parse_lines(body: &str, precision: Precision, default_time: i64) -> Result<Vec<Point>, LineProtoError> {
    let mut points = Vec::new();
    for line in body.lines() {
        if line.trim().is_empty() || line.trim_start().starts_with('#') {
            continue;
        }
        points.push(parse_line(line, precision, default_time)?);
    }
    Ok(points)
}

fn parse_field_value(raw: &str) -> Result<Value, LineProtoError> {
    if let Some(s) = raw.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        return Ok(Value::Str(s.to_string()));
    }
    if let Some(i) = raw.strip_suffix('i') {
        return i
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| LineProtoError::MalformedField(raw.to_string()));
    }
    match raw {
        "t" | "T" | "true" | "True" | "TRUE" => return Ok(Value::Bool(true)),
        "f" | "F" | "false" | "False" | "FALSE" => return Ok(Value::Bool(false)),
        _ => {}
    }
    raw.parse::<f64>()
        .map(Value::Float)
        .map_err(|_| LineProtoError::MalformedField(raw.to_string()))
}

/// Split on an unescaped delimiter (a delimiter preceded by `\` is literal).
fn split_unescaped(s: &str, delim: char) -> impl Iterator<Item = String> + '_ {
    let mut out = Vec::new();
    let mut cur = String::new();
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(&next) = chars.peek() {
                cur.push(next);
                chars.next();
                continue;
            }
        }
        if c == delim {
            out.push(std::mem::take(&mut cur));
        } else {
            cur.push(c);
        }
    }
    out.push(cur);
    out.into_iter()
}

fn split_kv(seg: &str) -> Option<(String, String)> {
    let idx = seg.find('=')?;
    Some((seg[..idx].to_string(), seg[idx + 1..].to_string()))
}

fn unescape(s: &str) -> String {
    s.replace("\\,", ",").replace("\\ ", " ").replace("\\=", "=")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_basic_line() {
        let p = parse_line("cpu,host=serverA value=90 0", Precision::Seconds, 0).unwrap();
        assert_eq!(p.measurement, "cpu");
        assert_eq!(p.tag("host"), Some("serverA"));
        assert_eq!(p.field("value").and_then(Value::as_f64), Some(90.0));
        assert_eq!(p.time, 0);
    }

    #[test]
    fn precision_scales_timestamp() {
        let p = parse_line("cpu value=1 9", Precision::Seconds, 0).unwrap();
        assert_eq!(p.time, 9_000_000_000);
    }

    #[test]
    fn int_and_string_and_bool_fields() {
        let p = parse_line(r#"cpu count=10i,active=true,label="ok" 0"#, Precision::Seconds, 0).unwrap();
        assert_eq!(p.field("count").and_then(Value::as_i64), Some(10));
        assert_eq!(p.field("active").and_then(Value::as_bool), Some(true));
        assert_eq!(p.field("label").and_then(Value::as_str), Some("ok"));
    }

    #[test]
    fn missing_fieldset_errors() {
        let err = parse_line("cpu,host=serverA", Precision::Seconds, 0).unwrap_err();
        assert_eq!(err, LineProtoError::MissingFields);
    }

    #[test]
    fn escaped_comma_in_tag_value() {
        let p = parse_line(r"cpu,host=a\,b value=1 0", Precision::Seconds, 0).unwrap();
        assert_eq!(p.tag("host"), Some("a,b"));
    }

    #[test]
    fn default_time_used_when_absent() {
        let p = parse_line("cpu value=1", Precision::Seconds, 42).unwrap();
        assert_eq!(p.time, 42);
    }
}
