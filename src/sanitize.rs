//! Inline `$N` placeholders as SQL literals, for logging only.
//!
//! The output is meant for humans reading traces. It is never sent to the
//! server.

use chrono::SecondsFormat;

use crate::error::{Error, Result};
use crate::value::Value;

/// Wrap `input` in single quotes, doubling embedded quotes.
pub fn quote_string(input: &str) -> String {
    let mut out = String::with_capacity(input.len() + 2);
    out.push('\'');
    for c in input.chars() {
        if c == '\'' {
            out.push('\'');
        }
        out.push(c);
    }
    out.push('\'');
    out
}

/// Render `value` as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Text(s) => quote_string(s),
        Value::Bytes(bytes) => {
            let mut out = String::with_capacity(bytes.len() * 2 + 4);
            out.push_str("'\\x");
            for b in bytes {
                out.push_str(&format!("{:02x}", b));
            }
            out.push('\'');
            out
        }
        Value::Timestamp(ts) => quote_string(&ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
    }
}

/// Replace every `$N` in `sql` with `args[N - 1]` rendered as a literal.
///
/// A `$` not followed by a digit is copied as is.
pub fn sanitize_sql(sql: &str, args: &[Value]) -> Result<String> {
    let mut out = String::with_capacity(sql.len());
    let mut rest = sql;

    while let Some(pos) = memchr::memchr(b'$', rest.as_bytes()) {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();
        if digits == 0 {
            out.push('$');
            rest = after;
            continue;
        }

        let n: usize = after[..digits]
            .parse()
            .map_err(|_| Error::InvalidUsage(format!("invalid placeholder ${}", &after[..digits])))?;
        let arg = n
            .checked_sub(1)
            .and_then(|i| args.get(i))
            .ok_or_else(|| {
                Error::InvalidUsage(format!(
                    "placeholder ${} out of range for {} arguments",
                    n,
                    args.len()
                ))
            })?;
        out.push_str(&literal(arg));
        rest = &after[digits..];
    }
    out.push_str(rest);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    #[test]
    fn test_quote_string() {
        assert_eq!(quote_string("it's"), "'it''s'");
        assert_eq!(quote_string(""), "''");
    }

    #[test]
    fn test_sanitize_sql() {
        let sql = sanitize_sql(
            "select $1, $2, $3, $4 where name = $1",
            &[
                Value::from("o'neil"),
                Value::Int(-42),
                Value::Float(1.5),
                Value::Null,
            ],
        )
        .unwrap();
        assert_eq!(sql, "select 'o''neil', -42, 1.5, null where name = 'o''neil'");
    }

    #[test]
    fn test_sanitize_multi_digit_placeholders() {
        let args: Vec<Value> = (1..=11).map(Value::from).collect();
        assert_eq!(sanitize_sql("$1 $11 $10", &args).unwrap(), "1 11 10");
    }

    #[test]
    fn test_sanitize_other_literals() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 8, 30, 0).unwrap();
        let sql = sanitize_sql(
            "$1 $2 $3",
            &[Value::Bool(true), Value::Bytes(vec![0xde, 0xad]), Value::Timestamp(ts)],
        )
        .unwrap();
        assert_eq!(sql, "true '\\xdead' '2024-01-15T08:30:00Z'");
    }

    #[test]
    fn test_dollar_without_digit_is_kept() {
        assert_eq!(sanitize_sql("select $$x$$", &[]).unwrap(), "select $$x$$");
    }

    #[test]
    fn test_out_of_range_placeholder() {
        let err = sanitize_sql("select $2", &[Value::Int(1)]).unwrap_err();
        assert!(matches!(err, Error::InvalidUsage(_)), "{err}");
        assert!(sanitize_sql("select $0", &[Value::Int(1)]).is_err());
    }
}
