//! Directory client collaborator.
//!
//! Jobs never speak the wire protocol themselves. They issue requests through
//! a [`ConnectionPool`] obtained from a [`ConnectionFactory`], and every call
//! returns a tagged result: the response, or an [`LdapFailure`] carrying the
//! result code the directory reported.

use crate::error::JobResult;
use crate::filter::Filter;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// A numeric LDAP result code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResultCode(pub i32);

impl ResultCode {
    pub const SUCCESS: Self = Self(0);
    pub const OPERATIONS_ERROR: Self = Self(1);
    pub const PROTOCOL_ERROR: Self = Self(2);
    pub const TIME_LIMIT_EXCEEDED: Self = Self(3);
    pub const SIZE_LIMIT_EXCEEDED: Self = Self(4);
    pub const AUTH_METHOD_NOT_SUPPORTED: Self = Self(7);
    pub const NO_SUCH_ATTRIBUTE: Self = Self(16);
    pub const UNDEFINED_ATTRIBUTE_TYPE: Self = Self(17);
    pub const ATTRIBUTE_OR_VALUE_EXISTS: Self = Self(20);
    pub const INVALID_ATTRIBUTE_SYNTAX: Self = Self(21);
    pub const NO_SUCH_OBJECT: Self = Self(32);
    pub const INVALID_DN_SYNTAX: Self = Self(34);
    pub const INAPPROPRIATE_AUTHENTICATION: Self = Self(48);
    pub const INVALID_CREDENTIALS: Self = Self(49);
    pub const INSUFFICIENT_ACCESS_RIGHTS: Self = Self(50);
    pub const BUSY: Self = Self(51);
    pub const UNAVAILABLE: Self = Self(52);
    pub const UNWILLING_TO_PERFORM: Self = Self(53);
    pub const OBJECT_CLASS_VIOLATION: Self = Self(65);
    pub const ENTRY_ALREADY_EXISTS: Self = Self(68);
    pub const OTHER: Self = Self(80);
    pub const SERVER_DOWN: Self = Self(81);
    pub const LOCAL_ERROR: Self = Self(82);
    pub const TIMEOUT: Self = Self(85);
    pub const FILTER_ERROR: Self = Self(87);
    pub const PARAM_ERROR: Self = Self(89);
    pub const CONNECT_ERROR: Self = Self(91);
    /// Client-side code for a search that matched nothing.
    pub const NO_RESULTS_RETURNED: Self = Self(94);

    /// Human-readable name, `"unknown"` for codes not listed here.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self.0 {
            0 => "success",
            1 => "operations error",
            2 => "protocol error",
            3 => "time limit exceeded",
            4 => "size limit exceeded",
            7 => "auth method not supported",
            16 => "no such attribute",
            17 => "undefined attribute type",
            20 => "attribute or value exists",
            21 => "invalid attribute syntax",
            32 => "no such object",
            34 => "invalid DN syntax",
            48 => "inappropriate authentication",
            49 => "invalid credentials",
            50 => "insufficient access rights",
            51 => "busy",
            52 => "unavailable",
            53 => "unwilling to perform",
            65 => "object class violation",
            68 => "entry already exists",
            80 => "other",
            81 => "server down",
            82 => "local error",
            85 => "timeout",
            87 => "filter error",
            89 => "param error",
            91 => "connect error",
            94 => "no results returned",
            _ => "unknown",
        }
    }

    #[must_use]
    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.0, self.name())
    }
}

/// A directory entry.
///
/// Attribute names are matched case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub dn: String,
    attributes: BTreeMap<String, (String, Vec<String>)>,
}

impl Entry {
    #[must_use]
    pub fn new(dn: impl Into<String>) -> Self {
        Self {
            dn: dn.into(),
            attributes: BTreeMap::new(),
        }
    }

    /// Adds values to `name`, keeping existing ones.
    #[must_use]
    pub fn with_attribute<I, V>(mut self, name: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        let slot = self
            .attributes
            .entry(name.to_ascii_lowercase())
            .or_insert_with(|| (name.to_string(), Vec::new()));
        slot.1.extend(values.into_iter().map(Into::into));
        self
    }

    /// Replaces every value of `name`. An empty list removes the attribute.
    pub fn replace(&mut self, name: &str, values: Vec<String>) {
        if values.is_empty() {
            self.attributes.remove(&name.to_ascii_lowercase());
        } else {
            self.attributes
                .insert(name.to_ascii_lowercase(), (name.to_string(), values));
        }
    }

    /// All values of `name`.
    #[must_use]
    pub fn values(&self, name: &str) -> &[String] {
        self.attributes
            .get(&name.to_ascii_lowercase())
            .map_or(&[], |(_, values)| values.as_slice())
    }

    /// The first value of `name`.
    #[must_use]
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name).first().map(String::as_str)
    }

    #[must_use]
    pub fn has_attribute(&self, name: &str) -> bool {
        !self.values(name).is_empty()
    }

    /// Attribute names with their values, as originally spelled.
    pub fn attributes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.attributes
            .values()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
    }

    /// A copy limited to the requested attributes.
    ///
    /// An empty request or `*` returns everything; `1.1` returns no
    /// attributes.
    #[must_use]
    pub fn project(&self, requested: &[String]) -> Self {
        if requested.is_empty() || requested.iter().any(|a| a == "*") {
            return self.clone();
        }
        let mut projected = Self::new(self.dn.clone());
        for name in requested {
            if let Some((original, values)) = self.attributes.get(&name.to_ascii_lowercase()) {
                projected
                    .attributes
                    .insert(name.to_ascii_lowercase(), (original.clone(), values.clone()));
            }
        }
        projected
    }
}

/// Search scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    /// Only the base entry.
    Base,
    /// Immediate children of the base entry.
    One,
    /// The base entry and everything below it.
    #[default]
    Sub,
}

impl FromStr for SearchScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" | "baseobject" => Ok(Self::Base),
            "one" | "onelevel" | "singlelevel" => Ok(Self::One),
            "sub" | "subtree" | "wholesubtree" => Ok(Self::Sub),
            other => Err(format!("unknown search scope '{other}'")),
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Base => "base",
            Self::One => "one",
            Self::Sub => "sub",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub base_dn: String,
    pub scope: SearchScope,
    pub filter: Filter,
    /// Attributes to return; empty means all user attributes.
    pub attributes: Vec<String>,
    /// Maximum entries to return, 0 for no limit.
    pub size_limit: u32,
    /// Server-side time limit hint in seconds, 0 for no limit.
    pub time_limit_secs: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindRequest {
    pub dn: String,
    pub password: String,
}

/// Replaces every value of one attribute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Modification {
    pub attribute: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModifyRequest {
    pub dn: String,
    pub modifications: Vec<Modification>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchResponse {
    pub entries: Vec<Entry>,
}

/// A protocol-level failure reported by the directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LdapFailure {
    pub code: ResultCode,
    pub message: String,
}

impl LdapFailure {
    #[must_use]
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for LdapFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

/// A failed search, with whatever entries arrived before the failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchFailure {
    pub failure: LdapFailure,
    pub partial_entries: Vec<Entry>,
}

impl SearchFailure {
    #[must_use]
    pub fn new(code: ResultCode, message: impl Into<String>) -> Self {
        Self {
            failure: LdapFailure::new(code, message),
            partial_entries: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_partial_entries(mut self, entries: Vec<Entry>) -> Self {
        self.partial_entries = entries;
        self
    }
}

/// What a pool is used for. Combined jobs keep one pool per role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PoolRole {
    Search,
    Bind,
    Modify,
}

impl fmt::Display for PoolRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Search => "search",
            Self::Bind => "bind",
            Self::Modify => "modify",
        })
    }
}

/// A single worker's connection to the directory.
///
/// Pools are owned by one worker thread and never shared.
pub trait ConnectionPool: Send {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse, SearchFailure>;

    fn bind(&mut self, request: &BindRequest) -> Result<(), LdapFailure>;

    fn modify(&mut self, request: &ModifyRequest) -> Result<(), LdapFailure>;

    /// Closes idle connections so the next operation reconnects.
    fn shrink(&mut self);

    /// Releases every connection.
    fn close(&mut self) {}
}

/// Creates per-worker pools.
pub trait ConnectionFactory: Send + Sync {
    /// Opens a pool for `role`.
    ///
    /// # Errors
    ///
    /// Returns `JobError::UnableToRun` when the directory cannot be reached.
    fn connect(&self, role: PoolRole) -> JobResult<Box<dyn ConnectionPool>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_code_display() {
        assert_eq!(ResultCode::SUCCESS.to_string(), "0 (success)");
        assert_eq!(ResultCode::NO_SUCH_OBJECT.to_string(), "32 (no such object)");
        assert_eq!(
            ResultCode::NO_RESULTS_RETURNED.to_string(),
            "94 (no results returned)"
        );
        assert_eq!(ResultCode(4242).to_string(), "4242 (unknown)");
    }

    #[test]
    fn test_entry_attributes_are_case_insensitive() {
        let entry = Entry::new("uid=user.0,ou=People,dc=example,dc=com")
            .with_attribute("userPassword", ["password"])
            .with_attribute("cn", ["User 0"]);

        assert_eq!(entry.first_value("userpassword"), Some("password"));
        assert!(entry.has_attribute("CN"));
        assert!(entry.values("mail").is_empty());
    }

    #[test]
    fn test_entry_projection() {
        let entry = Entry::new("uid=a")
            .with_attribute("cn", ["A"])
            .with_attribute("sn", ["B"]);

        let projected = entry.project(&["CN".to_string()]);
        assert!(projected.has_attribute("cn"));
        assert!(!projected.has_attribute("sn"));

        let none = entry.project(&["1.1".to_string()]);
        assert_eq!(none.attributes().count(), 0);
        assert_eq!(entry.project(&[]), entry);
    }

    #[test]
    fn test_replace_removes_when_empty() {
        let mut entry = Entry::new("uid=a").with_attribute("description", ["x"]);
        entry.replace("description", vec!["y".to_string(), "z".to_string()]);
        assert_eq!(entry.values("description"), &["y", "z"]);

        entry.replace("Description", Vec::new());
        assert!(!entry.has_attribute("description"));
    }

    #[test]
    fn test_scope_parsing() {
        assert_eq!("SUB".parse::<SearchScope>(), Ok(SearchScope::Sub));
        assert_eq!("baseObject".parse::<SearchScope>(), Ok(SearchScope::Base));
        assert!("deep".parse::<SearchScope>().is_err());
    }
}
