//! Type decode registry.
//!
//! Maps a wire type OID to a [`Decoder`] that turns the raw column bytes, in
//! whichever format the server used, into a generic [`Value`]. The built-in
//! table is populated once and shared by every row cursor.

use std::collections::HashMap;
use std::sync::LazyLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeDelta, Utc};

use crate::error::{Error, Result};
use crate::native::ResultFormats;
use crate::value::Value;
use crate::wire::{FormatCode, Oid, oid};

/// Decode one non-NULL raw column value.
pub type DecodeFn = fn(&[u8]) -> Result<Value>;

/// Decode strategy for one wire type.
#[derive(Debug, Clone, Copy)]
pub struct Decoder {
    name: &'static str,
    text: DecodeFn,
    binary: Option<DecodeFn>,
}

impl Decoder {
    /// A decoder that understands both wire formats.
    pub const fn new(name: &'static str, text: DecodeFn, binary: DecodeFn) -> Self {
        Self {
            name,
            text,
            binary: Some(binary),
        }
    }

    /// A decoder with no binary path. Binary input is rejected.
    pub const fn text_only(name: &'static str, text: DecodeFn) -> Self {
        Self {
            name,
            text,
            binary: None,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns true if binary input can be decoded.
    pub fn supports_binary(&self) -> bool {
        self.binary.is_some()
    }

    /// Decode a raw value. `None` is SQL NULL.
    pub fn decode(&self, format: FormatCode, raw: Option<&[u8]>) -> Result<Value> {
        let Some(raw) = raw else {
            return Ok(Value::Null);
        };
        match format {
            FormatCode::Text => (self.text)(raw),
            FormatCode::Binary => match self.binary {
                Some(binary) => binary(raw),
                None => Err(Error::Decode(format!(
                    "binary format not supported for {}",
                    self.name
                ))),
            },
        }
    }
}

/// OID-keyed table of decoders with a text-only fallback for unknown types.
#[derive(Debug, Clone)]
pub struct DecodeRegistry {
    decoders: HashMap<Oid, Decoder>,
    fallback: Decoder,
}

static BUILTIN: LazyLock<DecodeRegistry> = LazyLock::new(DecodeRegistry::default);

static BINARY_RESULT_FORMATS: LazyLock<ResultFormats> = LazyLock::new(|| {
    let mut formats = ResultFormats::default();
    for oid in [
        oid::BOOL,
        oid::BYTEA,
        oid::CID,
        oid::DATE,
        oid::FLOAT4,
        oid::FLOAT8,
        oid::INT2,
        oid::INT4,
        oid::INT8,
        oid::OID,
        oid::TIMESTAMP,
        oid::TIMESTAMPTZ,
        oid::XID,
    ] {
        formats.set(oid, FormatCode::Binary);
    }
    formats
});

/// Result formats requested for generic-interface queries: binary only for
/// intrinsic types whose binary decoding is fully implemented.
pub fn binary_result_formats() -> &'static ResultFormats {
    &BINARY_RESULT_FORMATS
}

impl Default for DecodeRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(oid::BOOL, Decoder::new("bool", bool_text, bool_binary));
        registry.register(oid::BYTEA, Decoder::new("bytea", bytea_text, bytea_binary));
        registry.register(oid::INT2, Decoder::new("int2", int_text, int2_binary));
        registry.register(oid::INT4, Decoder::new("int4", int_text, int4_binary));
        registry.register(oid::INT8, Decoder::new("int8", int_text, int8_binary));
        registry.register(oid::FLOAT4, Decoder::new("float4", float4_text, float4_binary));
        registry.register(oid::FLOAT8, Decoder::new("float8", float8_text, float8_binary));
        registry.register(oid::DATE, Decoder::new("date", date_text, date_binary));
        registry.register(
            oid::TIMESTAMP,
            Decoder::new("timestamp", timestamp_text, timestamp_binary),
        );
        registry.register(
            oid::TIMESTAMPTZ,
            Decoder::new("timestamptz", timestamptz_text, timestamp_binary),
        );
        registry.register(oid::JSON, Decoder::new("json", utf8_text, utf8_text));
        registry.register(oid::JSONB, Decoder::new("jsonb", utf8_text, jsonb_binary));
        registry.register(oid::OID, Decoder::new("oid", uint32_text, uint32_binary));
        registry.register(oid::XID, Decoder::new("xid", uint32_text, uint32_binary));
        registry.register(oid::CID, Decoder::new("cid", uint32_text, uint32_binary));
        registry
    }
}

impl DecodeRegistry {
    /// A registry that only knows the text fallback.
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
            fallback: Decoder::text_only("text", utf8_text),
        }
    }

    /// The shared built-in registry.
    pub fn builtin() -> &'static DecodeRegistry {
        &BUILTIN
    }

    /// Register (or replace) the decoder for `oid`.
    pub fn register(&mut self, oid: Oid, decoder: Decoder) {
        self.decoders.insert(oid, decoder);
    }

    /// Returns true if `oid` has its own decoder.
    pub fn contains(&self, oid: Oid) -> bool {
        self.decoders.contains_key(&oid)
    }

    /// The decoder for `oid`, or the text fallback.
    pub fn get(&self, oid: Oid) -> &Decoder {
        self.decoders.get(&oid).unwrap_or(&self.fallback)
    }
}

// === Text helpers ===

fn utf8(bytes: &[u8]) -> Result<&str> {
    simdutf8::compat::from_utf8(bytes).map_err(|e| Error::Decode(format!("invalid UTF-8: {}", e)))
}

fn utf8_text(bytes: &[u8]) -> Result<Value> {
    utf8(bytes).map(|s| Value::Text(s.to_owned()))
}

fn fixed<const N: usize>(bytes: &[u8], what: &str) -> Result<[u8; N]> {
    bytes
        .try_into()
        .map_err(|_| Error::Decode(format!("invalid {} length: {}", what, bytes.len())))
}

// === Boolean ===

fn bool_text(bytes: &[u8]) -> Result<Value> {
    match bytes {
        b"t" | b"true" | b"TRUE" | b"T" | b"1" => Ok(Value::Bool(true)),
        b"f" | b"false" | b"FALSE" | b"F" | b"0" => Ok(Value::Bool(false)),
        _ => Err(Error::Decode(format!(
            "invalid boolean: {:?}",
            String::from_utf8_lossy(bytes)
        ))),
    }
}

fn bool_binary(bytes: &[u8]) -> Result<Value> {
    let [b] = fixed::<1>(bytes, "boolean")?;
    Ok(Value::Bool(b != 0))
}

// === Bytea ===

fn bytea_text(bytes: &[u8]) -> Result<Value> {
    // Hex format (\xDEADBEEF), or escape format with bytea_output=escape
    match bytes.strip_prefix(b"\\x") {
        Some(hex) => decode_hex(hex).map(Value::Bytes),
        None => decode_bytea_escape(bytes).map(Value::Bytes),
    }
}

/// Decode the escape format: `\\` is a backslash, `\ooo` an octal byte.
fn decode_bytea_escape(mut rest: &[u8]) -> Result<Vec<u8>> {
    let mut result = Vec::with_capacity(rest.len());
    while let Some(pos) = memchr::memchr(b'\\', rest) {
        result.extend_from_slice(&rest[..pos]);
        rest = &rest[pos + 1..];
        match rest {
            [b'\\', tail @ ..] => {
                result.push(b'\\');
                rest = tail;
            }
            [a @ b'0'..=b'3', b @ b'0'..=b'7', c @ b'0'..=b'7', tail @ ..] => {
                result.push(((a - b'0') << 6) | ((b - b'0') << 3) | (c - b'0'));
                rest = tail;
            }
            _ => return Err(Error::Decode("invalid bytea escape sequence".into())),
        }
    }
    result.extend_from_slice(rest);
    Ok(result)
}

fn bytea_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Bytes(bytes.to_vec()))
}

fn decode_hex(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(Error::Decode("invalid hex length".into()));
    }

    let mut result = Vec::with_capacity(hex.len() / 2);
    for pair in hex.chunks_exact(2) {
        let high = hex_digit(pair[0])?;
        let low = hex_digit(pair[1])?;
        result.push((high << 4) | low);
    }
    Ok(result)
}

fn hex_digit(b: u8) -> Result<u8> {
    match b {
        b'0'..=b'9' => Ok(b - b'0'),
        b'a'..=b'f' => Ok(b - b'a' + 10),
        b'A'..=b'F' => Ok(b - b'A' + 10),
        _ => Err(Error::Decode(format!("invalid hex digit: {}", b as char))),
    }
}

// === Integers ===

fn int_text(bytes: &[u8]) -> Result<Value> {
    utf8(bytes)?
        .parse::<i64>()
        .map(Value::Int)
        .map_err(|e| Error::Decode(format!("invalid integer: {}", e)))
}

fn int2_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Int(i64::from(i16::from_be_bytes(fixed(bytes, "int2")?))))
}

fn int4_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Int(i64::from(i32::from_be_bytes(fixed(bytes, "int4")?))))
}

fn int8_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Int(i64::from_be_bytes(fixed(bytes, "int8")?)))
}

// oid, xid and cid are unsigned 32-bit on the wire.
fn uint32_text(bytes: &[u8]) -> Result<Value> {
    utf8(bytes)?
        .parse::<u32>()
        .map(|v| Value::Int(i64::from(v)))
        .map_err(|e| Error::Decode(format!("invalid uint32: {}", e)))
}

fn uint32_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Int(i64::from(u32::from_be_bytes(fixed(bytes, "uint32")?))))
}

// === Floats ===

fn float4_text(bytes: &[u8]) -> Result<Value> {
    utf8(bytes)?
        .parse::<f32>()
        .map(|v| Value::Float(f64::from(v)))
        .map_err(|e| Error::Decode(format!("invalid float4: {}", e)))
}

fn float4_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Float(f64::from(f32::from_be_bytes(fixed(bytes, "float4")?))))
}

fn float8_text(bytes: &[u8]) -> Result<Value> {
    utf8(bytes)?
        .parse::<f64>()
        .map(Value::Float)
        .map_err(|e| Error::Decode(format!("invalid float8: {}", e)))
}

fn float8_binary(bytes: &[u8]) -> Result<Value> {
    Ok(Value::Float(f64::from_be_bytes(fixed(bytes, "float8")?)))
}

// === Date and time ===

/// PostgreSQL epoch: 2000-01-01
const PG_EPOCH: NaiveDate = match NaiveDate::from_ymd_opt(2000, 1, 1) {
    Some(d) => d,
    None => panic!("invalid date"),
};

/// Microseconds between the Unix epoch and the PostgreSQL epoch
const PG_EPOCH_UNIX_MICROS: i64 = 946_684_800_000_000;

fn infinity(positive: bool) -> Value {
    Value::Text(if positive { "infinity" } else { "-infinity" }.to_string())
}

fn midnight_utc(date: NaiveDate) -> Option<Value> {
    date.and_hms_opt(0, 0, 0).map(|dt| Value::Timestamp(dt.and_utc()))
}

/// Strip a trailing ` BC` era marker.
fn split_era(s: &str) -> (&str, bool) {
    match s.strip_suffix(" BC") {
        Some(rest) => (rest, true),
        None => (s, false),
    }
}

/// Year `y` BC is astronomical year `1 - y`.
fn bc_year(year: i32) -> i32 {
    1 - year
}

fn date_text(bytes: &[u8]) -> Result<Value> {
    let s = utf8(bytes)?;
    match s {
        "infinity" => return Ok(infinity(true)),
        "-infinity" => return Ok(infinity(false)),
        _ => {}
    }
    let (s, bc) = split_era(s);
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| Error::Decode(format!("invalid date: {}", e)))?;
    let date = if bc {
        date.with_year_checked(bc_year(chrono::Datelike::year(&date)))?
    } else {
        date
    };
    midnight_utc(date).ok_or_else(|| Error::Decode("date overflow".into()))
}

fn date_binary(bytes: &[u8]) -> Result<Value> {
    let days = i32::from_be_bytes(fixed(bytes, "date")?);
    match days {
        i32::MAX => return Ok(infinity(true)),
        i32::MIN => return Ok(infinity(false)),
        _ => {}
    }
    TimeDelta::try_days(i64::from(days))
        .and_then(|delta| PG_EPOCH.checked_add_signed(delta))
        .and_then(midnight_utc)
        .ok_or_else(|| Error::Decode("date overflow".into()))
}

fn naive_timestamp(s: &str) -> Result<NaiveDateTime> {
    let (s, bc) = split_era(s);
    // Try with microseconds first, then without
    let ts = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| Error::Decode(format!("invalid timestamp: {}", e)))?;
    if bc {
        let date = ts.date().with_year_checked(bc_year(chrono::Datelike::year(&ts)))?;
        Ok(date.and_time(ts.time()))
    } else {
        Ok(ts)
    }
}

fn timestamp_text(bytes: &[u8]) -> Result<Value> {
    let s = utf8(bytes)?;
    match s {
        "infinity" => Ok(infinity(true)),
        "-infinity" => Ok(infinity(false)),
        _ => naive_timestamp(s).map(|ts| Value::Timestamp(ts.and_utc())),
    }
}

fn timestamptz_text(bytes: &[u8]) -> Result<Value> {
    let s = utf8(bytes)?;
    match s {
        "infinity" => return Ok(infinity(true)),
        "-infinity" => return Ok(infinity(false)),
        _ => {}
    }
    let (s, bc) = split_era(s);
    // The UTC offset starts at the first sign after the date part,
    // e.g. "2024-01-15 10:30:00.5+05:30"
    let offset_at = s
        .char_indices()
        .skip(10)
        .find(|&(_, c)| c == '+' || c == '-')
        .map(|(i, _)| i)
        .ok_or_else(|| Error::Decode(format!("invalid timestamptz: missing offset in {:?}", s)))?;
    let (local, offset) = s.split_at(offset_at);
    let local = if bc {
        naive_timestamp(&format!("{} BC", local))?
    } else {
        naive_timestamp(local)?
    };
    let offset_secs = parse_utc_offset(offset)?;
    local
        .checked_sub_signed(TimeDelta::seconds(i64::from(offset_secs)))
        .map(|utc| Value::Timestamp(utc.and_utc()))
        .ok_or_else(|| Error::Decode("timestamp overflow".into()))
}

/// Parse `+HH`, `+HH:MM` or `+HH:MM:SS` into seconds east of UTC.
fn parse_utc_offset(s: &str) -> Result<i32> {
    let invalid = || Error::Decode(format!("invalid UTC offset: {:?}", s));
    let (sign, rest) = match s.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let mut secs = 0_i32;
    let mut unit = 3600;
    for part in rest.split(':') {
        if unit == 0 || part.len() != 2 {
            return Err(invalid());
        }
        let n: i32 = part.parse().map_err(|_| invalid())?;
        secs += n * unit;
        unit /= 60;
    }
    Ok(sign * secs)
}

fn timestamp_binary(bytes: &[u8]) -> Result<Value> {
    let usecs = i64::from_be_bytes(fixed(bytes, "timestamp")?);
    match usecs {
        i64::MAX => return Ok(infinity(true)),
        i64::MIN => return Ok(infinity(false)),
        _ => {}
    }
    usecs
        .checked_add(PG_EPOCH_UNIX_MICROS)
        .and_then(DateTime::<Utc>::from_timestamp_micros)
        .map(Value::Timestamp)
        .ok_or_else(|| Error::Decode("timestamp overflow".into()))
}

trait WithYearChecked: Sized {
    fn with_year_checked(self, year: i32) -> Result<Self>;
}

impl WithYearChecked for NaiveDate {
    fn with_year_checked(self, year: i32) -> Result<Self> {
        chrono::Datelike::with_year(&self, year)
            .ok_or_else(|| Error::Decode(format!("invalid year: {}", year)))
    }
}

// === JSON ===

fn jsonb_binary(bytes: &[u8]) -> Result<Value> {
    match bytes.split_first() {
        Some((1, json)) => utf8_text(json),
        Some((version, _)) => Err(Error::Decode(format!("unknown jsonb version: {}", version))),
        None => Err(Error::Decode("invalid jsonb length: 0".into())),
    }
}
