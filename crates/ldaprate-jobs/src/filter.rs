//! Search filter syntax (RFC 4515 string representation).
//!
//! Generated filter text is parsed once per iteration before a search is
//! issued; a parse failure is fatal to the worker that generated it.

use crate::client::Entry;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A parsed search filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    And(Vec<Filter>),
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Equality {
        attribute: String,
        value: String,
    },
    Substring {
        attribute: String,
        initial: Option<String>,
        any: Vec<String>,
        final_value: Option<String>,
    },
    GreaterOrEqual {
        attribute: String,
        value: String,
    },
    LessOrEqual {
        attribute: String,
        value: String,
    },
    Present {
        attribute: String,
    },
    Approximate {
        attribute: String,
        value: String,
    },
}

/// Why filter text could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason} at offset {position}")]
pub struct FilterError {
    pub position: usize,
    pub reason: String,
}

impl FilterError {
    fn new(position: usize, reason: impl Into<String>) -> Self {
        Self {
            position,
            reason: reason.into(),
        }
    }
}

impl FromStr for Filter {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(FilterError::new(0, "filter is empty"));
        }

        // A bare item such as `uid=user.1` is accepted without parentheses.
        let text = if trimmed.starts_with('(') {
            trimmed.to_string()
        } else {
            format!("({trimmed})")
        };

        let mut parser = Parser {
            bytes: text.as_bytes(),
            pos: 0,
        };
        let filter = parser.filter()?;
        if parser.pos != parser.bytes.len() {
            return Err(FilterError::new(parser.pos, "unexpected trailing data"));
        }
        Ok(filter)
    }
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

#[derive(Clone, Copy)]
enum ItemKind {
    Equal,
    Approx,
    GreaterOrEqual,
    LessOrEqual,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<(), FilterError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(FilterError::new(
                self.pos,
                format!("expected '{}'", byte as char),
            ))
        }
    }

    fn filter(&mut self) -> Result<Filter, FilterError> {
        self.expect(b'(')?;
        let filter = match self.peek() {
            Some(b'&') => {
                self.pos += 1;
                Filter::And(self.filter_list()?)
            }
            Some(b'|') => {
                self.pos += 1;
                Filter::Or(self.filter_list()?)
            }
            Some(b'!') => {
                self.pos += 1;
                Filter::Not(Box::new(self.filter()?))
            }
            Some(_) => self.item()?,
            None => return Err(FilterError::new(self.pos, "unexpected end of filter")),
        };
        self.expect(b')')?;
        Ok(filter)
    }

    fn filter_list(&mut self) -> Result<Vec<Filter>, FilterError> {
        let mut filters = Vec::new();
        while self.peek() == Some(b'(') {
            filters.push(self.filter()?);
        }
        Ok(filters)
    }

    fn item(&mut self) -> Result<Filter, FilterError> {
        let start = self.pos;
        while let Some(byte) = self.peek() {
            if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'.' || byte == b';' {
                self.pos += 1;
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(FilterError::new(start, "missing attribute name"));
        }
        let attribute = String::from_utf8_lossy(&self.bytes[start..self.pos]).into_owned();

        let kind = match (self.peek(), self.bytes.get(self.pos + 1).copied()) {
            (Some(b'='), _) => {
                self.pos += 1;
                ItemKind::Equal
            }
            (Some(b'~'), Some(b'=')) => {
                self.pos += 2;
                ItemKind::Approx
            }
            (Some(b'>'), Some(b'=')) => {
                self.pos += 2;
                ItemKind::GreaterOrEqual
            }
            (Some(b'<'), Some(b'=')) => {
                self.pos += 2;
                ItemKind::LessOrEqual
            }
            _ => return Err(FilterError::new(self.pos, "expected a filter operator")),
        };

        let segments = self.value_segments()?;
        match kind {
            ItemKind::Equal if segments.len() == 1 => Ok(Filter::Equality {
                attribute,
                value: segments.into_iter().next().unwrap_or_default(),
            }),
            ItemKind::Equal if segments.len() == 2 && segments.iter().all(String::is_empty) => {
                Ok(Filter::Present { attribute })
            }
            ItemKind::Equal => {
                let last = segments.len() - 1;
                let mut initial = None;
                let mut any = Vec::new();
                let mut final_value = None;
                for (index, segment) in segments.into_iter().enumerate() {
                    if index == 0 {
                        initial = (!segment.is_empty()).then_some(segment);
                    } else if index == last {
                        final_value = (!segment.is_empty()).then_some(segment);
                    } else if segment.is_empty() {
                        return Err(FilterError::new(self.pos, "consecutive wildcards"));
                    } else {
                        any.push(segment);
                    }
                }
                Ok(Filter::Substring {
                    attribute,
                    initial,
                    any,
                    final_value,
                })
            }
            _ if segments.len() > 1 => Err(FilterError::new(
                self.pos,
                "wildcards are only allowed in equality filters",
            )),
            ItemKind::Approx => Ok(Filter::Approximate {
                attribute,
                value: segments.into_iter().next().unwrap_or_default(),
            }),
            ItemKind::GreaterOrEqual => Ok(Filter::GreaterOrEqual {
                attribute,
                value: segments.into_iter().next().unwrap_or_default(),
            }),
            ItemKind::LessOrEqual => Ok(Filter::LessOrEqual {
                attribute,
                value: segments.into_iter().next().unwrap_or_default(),
            }),
        }
    }

    /// Reads an assertion value, split on unescaped `*`.
    fn value_segments(&mut self) -> Result<Vec<String>, FilterError> {
        let mut segments = Vec::new();
        let mut current = Vec::new();
        loop {
            match self.peek() {
                None => return Err(FilterError::new(self.pos, "unterminated filter")),
                Some(b')') => break,
                Some(b'(') => {
                    return Err(FilterError::new(self.pos, "unescaped '(' in value"));
                }
                Some(b'*') => {
                    self.pos += 1;
                    segments.push(self.decode(std::mem::take(&mut current))?);
                }
                Some(b'\\') => {
                    let hex = self
                        .bytes
                        .get(self.pos + 1..self.pos + 3)
                        .and_then(|pair| std::str::from_utf8(pair).ok())
                        .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                        .ok_or_else(|| FilterError::new(self.pos, "invalid escape sequence"))?;
                    current.push(hex);
                    self.pos += 3;
                }
                Some(byte) => {
                    current.push(byte);
                    self.pos += 1;
                }
            }
        }
        segments.push(self.decode(current)?);
        Ok(segments)
    }

    fn decode(&self, bytes: Vec<u8>) -> Result<String, FilterError> {
        String::from_utf8(bytes)
            .map_err(|_| FilterError::new(self.pos, "value is not valid UTF-8"))
    }
}

impl Filter {
    /// Whether `entry` satisfies the filter.
    ///
    /// Values are compared case-insensitively. Ordering filters compare
    /// numerically when both sides are integers.
    #[must_use]
    pub fn matches(&self, entry: &Entry) -> bool {
        match self {
            Self::And(filters) => filters.iter().all(|f| f.matches(entry)),
            Self::Or(filters) => filters.iter().any(|f| f.matches(entry)),
            Self::Not(filter) => !filter.matches(entry),
            Self::Present { attribute } => entry.has_attribute(attribute),
            Self::Equality { attribute, value } | Self::Approximate { attribute, value } => entry
                .values(attribute)
                .iter()
                .any(|v| v.eq_ignore_ascii_case(value)),
            Self::GreaterOrEqual { attribute, value } => entry
                .values(attribute)
                .iter()
                .any(|v| compare(v, value) != std::cmp::Ordering::Less),
            Self::LessOrEqual { attribute, value } => entry
                .values(attribute)
                .iter()
                .any(|v| compare(v, value) != std::cmp::Ordering::Greater),
            Self::Substring {
                attribute,
                initial,
                any,
                final_value,
            } => entry
                .values(attribute)
                .iter()
                .any(|v| substring_matches(v, initial.as_deref(), any, final_value.as_deref())),
        }
    }
}

fn compare(left: &str, right: &str) -> std::cmp::Ordering {
    match (left.parse::<i64>(), right.parse::<i64>()) {
        (Ok(l), Ok(r)) => l.cmp(&r),
        _ => left.to_lowercase().cmp(&right.to_lowercase()),
    }
}

fn substring_matches(
    value: &str,
    initial: Option<&str>,
    any: &[String],
    final_value: Option<&str>,
) -> bool {
    let value = value.to_lowercase();
    let mut rest = value.as_str();

    if let Some(initial) = initial {
        let initial = initial.to_lowercase();
        match rest.strip_prefix(initial.as_str()) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }

    let final_lower = final_value.map(str::to_lowercase);
    if let Some(final_lower) = &final_lower {
        match rest.strip_suffix(final_lower.as_str()) {
            Some(remaining) => rest = remaining,
            None => return false,
        }
    }

    for piece in any {
        let piece = piece.to_lowercase();
        match rest.find(piece.as_str()) {
            Some(index) => rest = &rest[index + piece.len()..],
            None => return false,
        }
    }
    true
}

fn write_escaped(f: &mut fmt::Formatter<'_>, value: &str) -> fmt::Result {
    for c in value.chars() {
        match c {
            '*' => f.write_str("\\2a")?,
            '(' => f.write_str("\\28")?,
            ')' => f.write_str("\\29")?,
            '\\' => f.write_str("\\5c")?,
            '\0' => f.write_str("\\00")?,
            other => write!(f, "{other}")?,
        }
    }
    Ok(())
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::And(filters) | Self::Or(filters) => {
                f.write_str(if matches!(self, Self::And(_)) { "(&" } else { "(|" })?;
                for filter in filters {
                    write!(f, "{filter}")?;
                }
                f.write_str(")")
            }
            Self::Not(filter) => write!(f, "(!{filter})"),
            Self::Present { attribute } => write!(f, "({attribute}=*)"),
            Self::Equality { attribute, value } => {
                write!(f, "({attribute}=")?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Self::Approximate { attribute, value } => {
                write!(f, "({attribute}~=")?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Self::GreaterOrEqual { attribute, value } => {
                write!(f, "({attribute}>=")?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Self::LessOrEqual { attribute, value } => {
                write!(f, "({attribute}<=")?;
                write_escaped(f, value)?;
                f.write_str(")")
            }
            Self::Substring {
                attribute,
                initial,
                any,
                final_value,
            } => {
                write!(f, "({attribute}=")?;
                if let Some(initial) = initial {
                    write_escaped(f, initial)?;
                }
                f.write_str("*")?;
                for piece in any {
                    write_escaped(f, piece)?;
                    f.write_str("*")?;
                }
                if let Some(final_value) = final_value {
                    write_escaped(f, final_value)?;
                }
                f.write_str(")")
            }
        }
    }
}
