//! Human-friendly duration parsing.
//!
//! Accepts one or more `<number><unit>` groups separated by optional
//! whitespace or commas, e.g. `"90"`, `"5m"`, `"1 h 30 min"` or
//! `"1 day, 10 hours, 17 minutes, 36 seconds"`. A number without a unit is
//! interpreted as seconds. Whitespace and commas inside a number are ignored,
//! so `"123,456"` is 123456 seconds.

use crate::error::{CoreError, CoreResult};
use std::iter::Peekable;
use std::str::Chars;
use std::time::Duration;

/// Parses a duration with second granularity.
pub fn parse_duration(input: &str) -> CoreResult<Duration> {
    let normalized = input.trim().to_lowercase();
    if normalized.is_empty() {
        return Err(CoreError::invalid_duration(input, "the value is empty"));
    }

    let mut chars = normalized.chars().peekable();
    let mut total_secs: u64 = 0;

    while chars.peek().is_some() {
        let value = take_number(input, &mut chars)?;
        let multiplier = if chars.peek().is_some() {
            unit_seconds(input, &take_unit(&mut chars))?
        } else {
            1
        };

        total_secs = value
            .checked_mul(multiplier)
            .and_then(|secs| total_secs.checked_add(secs))
            .ok_or_else(|| CoreError::invalid_duration(input, "the value is too large"))?;
    }

    Ok(Duration::from_secs(total_secs))
}

/// Parses an optional duration setting, treating blank text as absent.
pub fn parse_optional_duration(input: Option<&str>) -> CoreResult<Option<Duration>> {
    match input.map(str::trim) {
        None | Some("") => Ok(None),
        Some(text) => parse_duration(text).map(Some),
    }
}

fn take_number(input: &str, chars: &mut Peekable<Chars<'_>>) -> CoreResult<u64> {
    let mut value: u64 = 0;
    let mut digit_found = false;

    while let Some(&c) = chars.peek() {
        match c {
            '0'..='9' => {
                let digit = u64::from(c as u8 - b'0');
                value = value
                    .checked_mul(10)
                    .and_then(|v| v.checked_add(digit))
                    .ok_or_else(|| CoreError::invalid_duration(input, "the value is too large"))?;
                digit_found = true;
                chars.next();
            }
            ' ' | ',' => {
                chars.next();
            }
            _ => break,
        }
    }

    if digit_found {
        Ok(value)
    } else {
        Err(CoreError::invalid_duration(
            input,
            "a numeric element is missing where one was expected",
        ))
    }
}

fn take_unit(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut unit = String::new();

    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            break;
        }
        chars.next();
        if c == ' ' || c == ',' {
            break;
        }
        unit.push(c);
    }

    unit
}

fn unit_seconds(input: &str, unit: &str) -> CoreResult<u64> {
    match unit {
        "s" | "sec" | "secs" | "second" | "seconds" => Ok(1),
        "m" | "min" | "mins" | "minute" | "minutes" => Ok(60),
        "h" | "hr" | "hrs" | "hour" | "hours" => Ok(3_600),
        "d" | "day" | "days" => Ok(86_400),
        other => Err(CoreError::invalid_duration(
            input,
            format!("'{other}' is not a supported unit"),
        )),
    }
}
