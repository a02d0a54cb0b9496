//! Lenient value decoder for JSON-shaped request bodies
//!
//! This is deliberately not a JSON parser. Each value is found by scanning:
//! locate the key text, jump to the next `:`, skip whitespace, then read a
//! number or a `true`/`false` prefix. Garbage never errors; it only makes a
//! value absent.

use crate::config::valid_port;
use crate::transition::{clamp_unit, PositionUpdate, TBAR_MAX};

/// Upper bound of the legacy `0..10000` position scale
const LEGACY_SCALE_MAX: f64 = 10000.0;

/// Key/colon/whitespace scanner over a request body
#[derive(Debug, Clone, Copy)]
pub struct Scanner<'a> {
    body: &'a str,
}

impl<'a> Scanner<'a> {
    pub fn new(body: &'a str) -> Self {
        Self { body }
    }

    /// Text right after the first `key`, its following `:` and whitespace
    pub fn value_after(&self, key: &str) -> Option<&'a str> {
        let at = self.body.find(key)?;
        let rest = &self.body[at..];
        let colon = rest.find(':')?;
        Some(rest[colon + 1..].trim_start_matches(is_c_space))
    }

    /// Leading floating-point number after `key`
    pub fn float(&self, key: &str) -> Option<f64> {
        let text = self.value_after(key)?;
        let len = float_prefix_len(text);
        if len == 0 {
            return None;
        }
        text[..len].parse().ok()
    }

    /// Leading decimal integer after `key`
    pub fn integer(&self, key: &str) -> Option<i64> {
        parse_int_prefix(self.value_after(key)?)
    }

    /// `true`/`false` (case-insensitive prefix) after `key`
    pub fn boolean(&self, key: &str) -> Option<bool> {
        let text = self.value_after(key)?.as_bytes();
        if starts_with_ignore_case(text, b"true") {
            Some(true)
        } else if starts_with_ignore_case(text, b"false") {
            Some(false)
        } else {
            None
        }
    }
}

/// Map a wire position onto `[0, 1]`
///
/// `1 < v <= 1023` is raw T-bar units, `1 < v <= 10000` the legacy scale,
/// anything else is taken as already normalized. The result is clamped.
pub fn normalize_position(value: f64) -> f64 {
    let tbar_max = f64::from(TBAR_MAX);
    let scaled = if value > 1.0 && value <= tbar_max {
        value / tbar_max
    } else if value > 1.0 && value <= LEGACY_SCALE_MAX {
        value / LEGACY_SCALE_MAX
    } else {
        value
    };
    clamp_unit(scaled)
}

/// Normalized `position` from a `/tbar` body
pub fn decode_position(body: &str) -> Option<f64> {
    Scanner::new(body).float("position").map(normalize_position)
}

/// Optional `release` flag from a `/tbar` body
pub fn decode_release(body: &str) -> Option<bool> {
    Scanner::new(body).boolean("release")
}

/// Full `/tbar` POST payload; `None` when `position` is absent
pub fn decode_position_update(body: &str) -> Option<PositionUpdate> {
    let position = decode_position(body)?;
    let release = decode_release(body).unwrap_or(false);
    Some(PositionUpdate::new(position, release))
}

/// Fields of a `/config` POST; absent fields keep their current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigUpdate {
    pub enabled: Option<bool>,
    /// Only set when the body carries a port in `1..=65535`
    pub port: Option<u16>,
}

pub fn decode_config_update(body: &str) -> ConfigUpdate {
    let scanner = Scanner::new(body);
    ConfigUpdate {
        enabled: scanner.boolean("enabled"),
        port: scanner.integer("port").and_then(valid_port),
    }
}

/// C `isspace`: space, \t, \n, \v, \f, \r
fn is_c_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\n' | '\x0b' | '\x0c' | '\r')
}

fn starts_with_ignore_case(text: &[u8], prefix: &[u8]) -> bool {
    text.get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

/// Length of the longest `[+-]digits[.digits][(e|E)[+-]digits]` prefix
///
/// Returns 0 when no digit is present in the mantissa.
fn float_prefix_len(text: &str) -> usize {
    let bytes = text.as_bytes();
    let mut i = 0;

    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }

    let int_start = i;
    while bytes.get(i).is_some_and(u8::is_ascii_digit) {
        i += 1;
    }
    let mut digits = i - int_start;

    if bytes.get(i) == Some(&b'.') {
        let frac_start = i + 1;
        let mut j = frac_start;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        digits += j - frac_start;
        if digits > 0 {
            i = j;
        }
    }

    if digits == 0 {
        return 0;
    }

    if matches!(bytes.get(i), Some(b'e' | b'E')) {
        let mut j = i + 1;
        if matches!(bytes.get(j), Some(b'+' | b'-')) {
            j += 1;
        }
        let exp_start = j;
        while bytes.get(j).is_some_and(u8::is_ascii_digit) {
            j += 1;
        }
        if j > exp_start {
            i = j;
        }
    }

    i
}

/// `atoi`-style leading integer: optional sign, then digits
///
/// Skips leading whitespace. `None` without digits or on overflow.
pub(crate) fn parse_int_prefix(text: &str) -> Option<i64> {
    let text = text.trim_start_matches(is_c_space);
    let bytes = text.as_bytes();
    let (negative, start) = match bytes.first() {
        Some(b'-') => (true, 1),
        Some(b'+') => (false, 1),
        _ => (false, 0),
    };

    let digits = bytes[start..]
        .iter()
        .take_while(|b| b.is_ascii_digit())
        .count();
    if digits == 0 {
        return None;
    }

    let value = bytes[start..start + digits]
        .iter()
        .try_fold(0i64, |acc, b| {
            acc.checked_mul(10)?.checked_add(i64::from(b - b'0'))
        })?;

    Some(if negative { -value } else { value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_position_normalization_examples() {
        assert!(approx(decode_position(r#"{"position":512}"#).unwrap(), 512.0 / 1023.0));
        assert_eq!(decode_position(r#"{"position":10000}"#), Some(1.0));
        assert_eq!(decode_position(r#"{"position":0.3}"#), Some(0.3));
        assert_eq!(decode_position(r#"{"position":-5}"#), Some(0.0));
        assert!(approx(decode_position(r#"{"position":2000}"#).unwrap(), 0.2));
    }

    #[test]
    fn test_position_range_boundaries() {
        assert_eq!(normalize_position(1.0), 1.0);
        assert_eq!(normalize_position(1023.0), 1.0);
        assert!(approx(normalize_position(1024.0), 0.1024));
        assert_eq!(normalize_position(20000.0), 1.0);
        assert_eq!(normalize_position(0.0), 0.0);
    }

    #[test]
    fn test_position_scanning_is_forgiving() {
        assert_eq!(decode_position(r#"{ "position" :   0.25 }"#), Some(0.25));
        assert_eq!(decode_position("position:\n\t0.75"), Some(0.75));
        assert_eq!(decode_position(r#"{"position":"0.5"}"#), None);
        assert_eq!(decode_position(r#"{"position":5e-1}"#), Some(0.5));
        assert_eq!(decode_position(r#"{"position":.5}"#), Some(0.5));
        assert_eq!(decode_position(r#"{"position":1.}"#), Some(1.0));
        assert_eq!(decode_position(r#"{"position":3e}"#), Some(3.0 / 1023.0));
    }

    #[test]
    fn test_position_absent() {
        assert_eq!(decode_position(""), None);
        assert_eq!(decode_position(r#"{"pos":0.5}"#), None);
        assert_eq!(decode_position(r#"{"position"}"#), None);
        assert_eq!(decode_position(r#"{"position":}"#), None);
        assert_eq!(decode_position(r#"{"position":-}"#), None);
        assert_eq!(decode_position(r#"{"position":nan}"#), None);
    }

    #[test]
    fn test_release_decoding() {
        assert_eq!(decode_release(r#"{"release":true}"#), Some(true));
        assert_eq!(decode_release(r#"{"release": FALSE}"#), Some(false));
        assert_eq!(decode_release(r#"{"release":True!}"#), Some(true));
        assert_eq!(decode_release(r#"{"release":1}"#), None);
        assert_eq!(decode_release(r#"{"release":tru}"#), None);
        assert_eq!(decode_release(r#"{"position":1}"#), None);
    }

    #[test]
    fn test_position_update_defaults_release_to_false() {
        let update = decode_position_update(r#"{"position":0.5}"#).unwrap();
        assert_eq!(update, PositionUpdate::new(0.5, false));

        let update = decode_position_update(r#"{"position":1.0,"release":true}"#).unwrap();
        assert!(update.release);

        assert!(decode_position_update(r#"{"release":true}"#).is_none());
    }

    #[test]
    fn test_config_update_decoding() {
        assert_eq!(
            decode_config_update(r#"{"enabled":false,"port":8080}"#),
            ConfigUpdate {
                enabled: Some(false),
                port: Some(8080)
            }
        );
        assert_eq!(decode_config_update(r#"{"port":0}"#).port, None);
        assert_eq!(decode_config_update(r#"{"port":70000}"#).port, None);
        assert_eq!(decode_config_update(r#"{"port":"abc"}"#).port, None);
        assert_eq!(decode_config_update("{}"), ConfigUpdate::default());
    }

    #[test]
    fn test_int_prefix() {
        assert_eq!(parse_int_prefix("42abc"), Some(42));
        assert_eq!(parse_int_prefix("  -7"), Some(-7));
        assert_eq!(parse_int_prefix("+9"), Some(9));
        assert_eq!(parse_int_prefix("x1"), None);
        assert_eq!(parse_int_prefix("99999999999999999999"), None);
    }

    proptest! {
        #[test]
        fn prop_normalized_position_is_in_unit_range(v in -1.0e6f64..1.0e6) {
            let n = normalize_position(v);
            prop_assert!((0.0..=1.0).contains(&n));
        }

        #[test]
        fn prop_unit_values_pass_through(v in 0.0f64..=1.0) {
            prop_assert_eq!(normalize_position(v), v);
        }

        #[test]
        fn prop_raw_tbar_units_divide_by_max(raw in 2u32..=1023) {
            let body = format!(r#"{{"position":{}}}"#, raw);
            let decoded = decode_position(&body).unwrap();
            prop_assert!(approx(decoded, f64::from(raw) / 1023.0));
        }

        #[test]
        fn prop_decoder_never_panics(body in ".{0,64}") {
            let _ = decode_position_update(&body);
            let _ = decode_config_update(&body);
        }
    }
}
