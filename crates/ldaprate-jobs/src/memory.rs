//! In-memory directory for local runs and tests.
//!
//! Evaluates searches, simple binds and replace modifications against a
//! shared entry map. Every worker gets its own single-connection pool; the
//! entry map is the only shared state.

use crate::client::{
    BindRequest, ConnectionFactory, ConnectionPool, Entry, LdapFailure, ModifyRequest, PoolRole,
    ResultCode, SearchFailure, SearchRequest, SearchResponse, SearchScope,
};
use crate::error::JobResult;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Attribute checked by simple binds.
pub const PASSWORD_ATTRIBUTE: &str = "userPassword";

/// Operation counters, for assertions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperationCounts {
    pub connects: u64,
    pub searches: u64,
    pub binds: u64,
    pub modifies: u64,
}

#[derive(Debug, Default)]
struct Counters {
    connects: AtomicU64,
    searches: AtomicU64,
    binds: AtomicU64,
    modifies: AtomicU64,
}

/// Thread-safe entry store.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    /// Entries keyed by normalized DN.
    entries: RwLock<BTreeMap<String, Entry>>,
    latency: Duration,
    counters: Counters,
}

impl MemoryDirectory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `latency` to every operation.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Adds or replaces an entry.
    pub fn add(&self, entry: Entry) {
        self.entries.write().insert(normalize_dn(&entry.dn), entry);
    }

    /// A copy of the entry at `dn`.
    #[must_use]
    pub fn get(&self, dn: &str) -> Option<Entry> {
        self.entries.read().get(&normalize_dn(dn)).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Creates `base`, `ou=People,<base>` and `count` user entries
    /// `uid=user.N,ou=People,<base>` for N in `1..=count`, each with
    /// `password` as its `userPassword`.
    pub fn populate_users(&self, base: &str, count: u32, password: &str) {
        let people = format!("ou=People,{base}");
        let mut entries = self.entries.write();
        let first_rdn = base.split(',').next().unwrap_or(base);
        let (rdn_attr, rdn_value) = first_rdn.split_once('=').unwrap_or(("dc", first_rdn));
        let suffix = Entry::new(base)
            .with_attribute("objectClass", ["top", "domain"])
            .with_attribute(rdn_attr, [rdn_value]);
        entries.insert(normalize_dn(base), suffix);
        let ou = Entry::new(people.clone())
            .with_attribute("objectClass", ["top", "organizationalUnit"])
            .with_attribute("ou", ["People"]);
        entries.insert(normalize_dn(&people), ou);

        for n in 1..=count {
            let dn = format!("uid=user.{n},{people}");
            let entry = Entry::new(dn.clone())
                .with_attribute(
                    "objectClass",
                    ["top", "person", "organizationalPerson", "inetOrgPerson"],
                )
                .with_attribute("uid", [format!("user.{n}")])
                .with_attribute("cn", [format!("User {n}")])
                .with_attribute("sn", [n.to_string()])
                .with_attribute("employeeNumber", [n.to_string()])
                .with_attribute(PASSWORD_ATTRIBUTE, [password]);
            entries.insert(normalize_dn(&dn), entry);
        }
        debug!(base, count, "populated in-memory directory");
    }

    /// Operations served so far.
    #[must_use]
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            connects: self.counters.connects.load(Ordering::Relaxed),
            searches: self.counters.searches.load(Ordering::Relaxed),
            binds: self.counters.binds.load(Ordering::Relaxed),
            modifies: self.counters.modifies.load(Ordering::Relaxed),
        }
    }

    fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            std::thread::sleep(self.latency);
        }
    }

    fn search(&self, request: &SearchRequest) -> Result<SearchResponse, SearchFailure> {
        self.counters.searches.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();

        let base = normalize_dn(&request.base_dn);
        let entries = self.entries.read();
        if !entries.contains_key(&base) {
            return Err(SearchFailure::new(
                ResultCode::NO_SUCH_OBJECT,
                format!("search base '{}' does not exist", request.base_dn),
            ));
        }

        let limit = request.size_limit as usize;
        let mut found = Vec::new();
        for (dn, entry) in entries.iter() {
            if !in_scope(dn, &base, request.scope) || !request.filter.matches(entry) {
                continue;
            }
            if limit > 0 && found.len() == limit {
                return Err(SearchFailure::new(
                    ResultCode::SIZE_LIMIT_EXCEEDED,
                    format!("more than {limit} entries match"),
                )
                .with_partial_entries(found));
            }
            found.push(entry.project(&request.attributes));
        }
        Ok(SearchResponse { entries: found })
    }

    fn bind(&self, request: &BindRequest) -> Result<(), LdapFailure> {
        self.counters.binds.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();

        let entries = self.entries.read();
        let accepted = entries
            .get(&normalize_dn(&request.dn))
            .is_some_and(|entry| {
                entry
                    .values(PASSWORD_ATTRIBUTE)
                    .iter()
                    .any(|p| *p == request.password)
            });
        if accepted {
            Ok(())
        } else {
            Err(LdapFailure::new(
                ResultCode::INVALID_CREDENTIALS,
                "invalid credentials",
            ))
        }
    }

    fn modify(&self, request: &ModifyRequest) -> Result<(), LdapFailure> {
        self.counters.modifies.fetch_add(1, Ordering::Relaxed);
        self.simulate_latency();

        let mut entries = self.entries.write();
        let entry = entries.get_mut(&normalize_dn(&request.dn)).ok_or_else(|| {
            LdapFailure::new(
                ResultCode::NO_SUCH_OBJECT,
                format!("entry '{}' does not exist", request.dn),
            )
        })?;
        for modification in &request.modifications {
            entry.replace(&modification.attribute, modification.values.clone());
        }
        Ok(())
    }
}

/// Lowercases a DN and strips spaces around RDN separators.
fn normalize_dn(dn: &str) -> String {
    dn.split(',')
        .map(|rdn| {
            let rdn = rdn.trim();
            match rdn.split_once('=') {
                Some((attr, value)) => format!("{}={}", attr.trim(), value.trim()),
                None => rdn.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(",")
        .to_ascii_lowercase()
}

fn in_scope(dn: &str, base: &str, scope: SearchScope) -> bool {
    let parent = |dn: &str| dn.split_once(',').map(|(_, parent)| parent.to_string());
    match scope {
        SearchScope::Base => dn == base,
        SearchScope::One => parent(dn).as_deref() == Some(base),
        SearchScope::Sub => {
            dn == base || (dn.len() > base.len() && dn.ends_with(base) && {
                let boundary = dn.len() - base.len() - 1;
                dn.as_bytes()[boundary] == b','
            })
        }
    }
}

/// Hands out single-connection pools over a shared [`MemoryDirectory`].
#[derive(Debug, Clone)]
pub struct MemoryConnectionFactory {
    directory: Arc<MemoryDirectory>,
}

impl MemoryConnectionFactory {
    #[must_use]
    pub fn new(directory: Arc<MemoryDirectory>) -> Self {
        Self { directory }
    }
}

impl ConnectionFactory for MemoryConnectionFactory {
    fn connect(&self, role: PoolRole) -> JobResult<Box<dyn ConnectionPool>> {
        self.directory.counters.connects.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MemoryConnection {
            directory: self.directory.clone(),
            role,
            connected: true,
        }))
    }
}

#[derive(Debug)]
struct MemoryConnection {
    directory: Arc<MemoryDirectory>,
    role: PoolRole,
    connected: bool,
}

impl MemoryConnection {
    fn ensure_connected(&mut self) {
        if !self.connected {
            self.directory
                .counters
                .connects
                .fetch_add(1, Ordering::Relaxed);
            self.connected = true;
        }
    }
}

impl ConnectionPool for MemoryConnection {
    fn search(&mut self, request: &SearchRequest) -> Result<SearchResponse, SearchFailure> {
        self.ensure_connected();
        self.directory.search(request)
    }

    fn bind(&mut self, request: &BindRequest) -> Result<(), LdapFailure> {
        self.ensure_connected();
        self.directory.bind(request)
    }

    fn modify(&mut self, request: &ModifyRequest) -> Result<(), LdapFailure> {
        self.ensure_connected();
        self.directory.modify(request)
    }

    fn shrink(&mut self) {
        if self.connected {
            debug!(role = %self.role, "closing idle connection");
        }
        self.connected = false;
    }

    fn close(&mut self) {
        self.connected = false;
    }
}
