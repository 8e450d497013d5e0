//! Per-iteration value generation for DNs, filters and attribute values.
//!
//! A [`ValuePattern`] is compiled once while the job is set up and shared
//! read-only by every worker. Each worker wraps it in its own
//! [`ValueGenerator`], which holds the sequence state and draws randomness
//! from the worker's RNG.
//!
//! Pattern syntax is literal text with bracketed tokens:
//!
//! - `[low-high]` uniform random integer in the inclusive range
//! - `[low:high]` sequential integer, wrapping back to `low` after `high`
//! - `[random:N:chars]` `N` random characters drawn from `chars`
//! - `[[` and `]]` literal brackets

use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

/// Why a value pattern could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid value pattern '{pattern}': {reason}")]
pub struct PatternError {
    pub pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Random { low: i64, high: i64 },
    Sequential { low: i64, high: i64 },
    RandomString { length: usize, chars: Vec<char> },
}

/// A compiled value pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValuePattern {
    source: String,
    tokens: Vec<Token>,
}

impl ValuePattern {
    /// The text the pattern was compiled from.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether every generated value is the same.
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.tokens.iter().all(|t| matches!(t, Token::Literal(_)))
    }
}

impl FromStr for ValuePattern {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let error = |reason: &str| PatternError {
            pattern: s.to_string(),
            reason: reason.to_string(),
        };

        let mut tokens = Vec::new();
        let mut literal = String::new();
        let mut rest = s;
        while let Some(c) = rest.chars().next() {
            if rest.starts_with("[[") || rest.starts_with("]]") {
                literal.push(c);
                rest = &rest[2..];
                continue;
            }
            if c == ']' {
                return Err(error("unmatched ']'"));
            }
            if c != '[' {
                literal.push(c);
                rest = &rest[c.len_utf8()..];
                continue;
            }

            let close = rest.find(']').ok_or_else(|| error("unterminated '['"))?;
            let body = &rest[1..close];
            rest = &rest[close + 1..];
            if !literal.is_empty() {
                tokens.push(Token::Literal(std::mem::take(&mut literal)));
            }
            tokens.push(parse_token(body).map_err(|reason| error(&reason))?);
        }
        if !literal.is_empty() {
            tokens.push(Token::Literal(literal));
        }

        Ok(Self {
            source: s.to_string(),
            tokens,
        })
    }
}

fn parse_token(body: &str) -> Result<Token, String> {
    if let Some(spec) = body.strip_prefix("random:") {
        let (length, chars) = spec
            .split_once(':')
            .ok_or_else(|| format!("'[{body}]' needs a length and a character set"))?;
        let length = length
            .parse::<usize>()
            .map_err(|_| format!("'{length}' is not a valid length"))?;
        let chars: Vec<char> = chars.chars().collect();
        if length == 0 || chars.is_empty() {
            return Err(format!("'[{body}]' must have a positive length and characters"));
        }
        return Ok(Token::RandomString { length, chars });
    }

    let (separator, sequential) = if body.contains(':') {
        (':', true)
    } else {
        ('-', false)
    };
    // Allow a leading minus on the lower bound.
    let split_at = body
        .char_indices()
        .skip(1)
        .find(|&(_, c)| c == separator)
        .map(|(index, _)| index)
        .ok_or_else(|| format!("'[{body}]' is not a range"))?;
    let low = body[..split_at]
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'[{body}]' has an invalid lower bound"))?;
    let high = body[split_at + 1..]
        .trim()
        .parse::<i64>()
        .map_err(|_| format!("'[{body}]' has an invalid upper bound"))?;
    if high < low {
        return Err(format!("'[{body}]' has an upper bound below its lower bound"));
    }

    Ok(if sequential {
        Token::Sequential { low, high }
    } else {
        Token::Random { low, high }
    })
}

impl fmt::Display for ValuePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// A worker's generator over a shared [`ValuePattern`].
#[derive(Debug, Clone)]
pub struct ValueGenerator {
    pattern: Arc<ValuePattern>,
    next_sequential: Vec<i64>,
}

impl ValueGenerator {
    #[must_use]
    pub fn new(pattern: Arc<ValuePattern>) -> Self {
        let next_sequential = pattern
            .tokens
            .iter()
            .filter_map(|t| match t {
                Token::Sequential { low, .. } => Some(*low),
                _ => None,
            })
            .collect();
        Self {
            pattern,
            next_sequential,
        }
    }

    /// Produces the next value.
    pub fn next_value<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let mut value = String::new();
        let mut slot = 0;
        for token in &self.pattern.tokens {
            match token {
                Token::Literal(text) => value.push_str(text),
                Token::Random { low, high } => {
                    value.push_str(&rng.gen_range(*low..=*high).to_string());
                }
                Token::Sequential { low, high } => {
                    let current = self.next_sequential[slot];
                    value.push_str(&current.to_string());
                    self.next_sequential[slot] = if current >= *high { *low } else { current + 1 };
                    slot += 1;
                }
                Token::RandomString { length, chars } => {
                    value.push_str(&random_string(rng, chars, *length));
                }
            }
        }
        value
    }

    /// The pattern behind this generator.
    #[must_use]
    pub fn pattern(&self) -> &ValuePattern {
        &self.pattern
    }
}

/// `length` characters drawn uniformly from `chars`.
pub fn random_string<R: Rng + ?Sized>(rng: &mut R, chars: &[char], length: usize) -> String {
    if chars.is_empty() {
        return String::new();
    }
    (0..length)
        .map(|_| chars[rng.gen_range(0..chars.len())])
        .collect()
}
