//! The five job types and the request templates they share.
//!
//! Templates are compiled once from configuration and shared by every
//! worker; each worker builds its own generators from them.

mod bind;
mod modify;
mod search;
mod search_bind;
mod search_modify;

pub use bind::BindJob;
pub use modify::ModifyJob;
pub use search::SearchJob;
pub use search_bind::SearchAndBindJob;
pub use search_modify::SearchAndModifyJob;

use crate::client::{Modification, SearchRequest, SearchScope};
use crate::config::{Config, ModifyConfig, SearchConfig};
use crate::error::{JobError, JobResult};
use crate::filter::Filter;
use crate::job::{JobDefinition, JobKind, ParameterSpec};
use crate::value::{random_string, ValueGenerator, ValuePattern};
use ldaprate_core::{TrackerDescriptor, TrackerKind};
use rand::Rng;
use std::str::FromStr;
use std::sync::Arc;

/// Tracker name shared by the search-based jobs.
pub(crate) const ENTRIES_RETURNED: &str = "Entries Returned per Search";

/// Builds the definition for the configured job kind.
///
/// # Errors
///
/// Returns `JobError::InvalidParameter` when a pattern does not compile.
pub fn definition_for(config: &Config) -> JobResult<Arc<dyn JobDefinition>> {
    Ok(match config.job.kind {
        JobKind::Bind => Arc::new(BindJob::from_config(config)?),
        JobKind::Search => Arc::new(SearchJob::from_config(config)?),
        JobKind::Modify => Arc::new(ModifyJob::from_config(config)?),
        JobKind::SearchAndBind => Arc::new(SearchAndBindJob::from_config(config)?),
        JobKind::SearchAndModify => Arc::new(SearchAndModifyJob::from_config(config)?),
    })
}

/// Parameter schema of `kind`, without building a definition.
#[must_use]
pub fn parameter_schema(kind: JobKind) -> Vec<ParameterSpec> {
    let specific: &[&[ParameterSpec]] = match kind {
        JobKind::Bind => &[bind::PARAMETERS],
        JobKind::Search => &[SEARCH_PARAMETERS],
        JobKind::Modify => &[modify::PARAMETERS, MODIFY_PARAMETERS],
        JobKind::SearchAndBind => &[SEARCH_PARAMETERS, search_bind::PARAMETERS],
        JobKind::SearchAndModify => &[SEARCH_PARAMETERS, MODIFY_PARAMETERS],
    };
    crate::job::COMMON_PARAMETERS
        .iter()
        .chain(specific.iter().flat_map(|params| params.iter()))
        .cloned()
        .collect()
}

pub(crate) fn compile(key: &str, text: &str) -> JobResult<Arc<ValuePattern>> {
    text.parse::<ValuePattern>()
        .map(Arc::new)
        .map_err(|e| JobError::invalid_parameter(key, e))
}

/// A first pattern and an optional second one, picked by percentage.
#[derive(Debug, Clone)]
pub(crate) struct PatternPair {
    first: Arc<ValuePattern>,
    second: Option<Arc<ValuePattern>>,
    first_percent: u8,
}

impl PatternPair {
    /// Compiles both patterns, reporting errors under their parameter keys.
    pub(crate) fn compile(
        keys: [&str; 2],
        first: &str,
        second: Option<&str>,
        first_percent: u8,
    ) -> JobResult<Self> {
        let [first_key, second_key] = keys;
        Ok(Self {
            first: compile(first_key, first)?,
            second: second.map(|text| compile(second_key, text)).transpose()?,
            first_percent: first_percent.min(100),
        })
    }

    pub(crate) fn generator(&self) -> PairGenerator {
        PairGenerator {
            first: ValueGenerator::new(self.first.clone()),
            second: self.second.clone().map(ValueGenerator::new),
            first_percent: self.first_percent,
        }
    }
}

/// One worker's view of a [`PatternPair`].
#[derive(Debug, Clone)]
pub(crate) struct PairGenerator {
    first: ValueGenerator,
    second: Option<ValueGenerator>,
    first_percent: u8,
}

impl PairGenerator {
    /// Draws from the second pattern for `100 - first_percent` percent of
    /// calls. Without a second pattern every value comes from the first.
    pub(crate) fn next_value<R: Rng + ?Sized>(&mut self, rng: &mut R) -> String {
        let use_first = self.first_percent >= 100 || rng.gen_range(0..100) < self.first_percent;
        match (&mut self.second, use_first) {
            (Some(second), false) => second.next_value(rng),
            _ => self.first.next_value(rng),
        }
    }
}
pub(crate) fn entries_descriptor(
    client_id: &str,
    thread_id: &str,
    interval_secs: u32,
) -> TrackerDescriptor {
    TrackerDescriptor::new(
        ENTRIES_RETURNED,
        TrackerKind::IntegerValue,
        client_id,
        thread_id,
        interval_secs,
    )
}

pub(crate) const SEARCH_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "search.base_dn",
        "Search Base",
        "The DN of the entry to use as the search base. May be a value pattern.",
        Some("dc=example,dc=com"),
    ),
    ParameterSpec::optional(
        "search.scope",
        "Search Scope",
        "The scope to use for the search: base, one or sub.",
        Some("sub"),
    ),
    ParameterSpec::optional(
        "search.filter1",
        "Search Filter 1",
        "The first filter pattern to use for searches.",
        Some("(uid=user.[1-1000])"),
    ),
    ParameterSpec::optional(
        "search.filter2",
        "Search Filter 2",
        "The second filter pattern, used for the searches that do not use filter 1.",
        None,
    ),
    ParameterSpec::optional(
        "search.filter1_percent",
        "Filter 1 Percentage",
        "The percentage of searches that use the first filter.",
        Some("100"),
    ),
    ParameterSpec::optional(
        "search.attributes",
        "Attributes to Return",
        "The attributes to include in matching entries. All when empty.",
        None,
    ),
    ParameterSpec::optional(
        "search.size_limit",
        "Size Limit",
        "The maximum number of entries to return. 0 for no limit.",
        Some("0"),
    ),
    ParameterSpec::optional(
        "search.time_limit_secs",
        "Time Limit",
        "The maximum time in seconds the server should spend on a search. 0 for no limit.",
        Some("0"),
    ),
];

pub(crate) const MODIFY_PARAMETERS: &[ParameterSpec] = &[
    ParameterSpec::optional(
        "modify.attributes",
        "Attributes to Modify",
        "Attributes to replace, as attr or attr:count:pattern.",
        Some("description"),
    ),
    ParameterSpec::optional(
        "modify.value_length",
        "Value Length",
        "The number of characters in generated values for bare attribute names.",
        Some("80"),
    ),
    ParameterSpec::optional(
        "modify.character_set",
        "Character Set",
        "The characters generated values are drawn from.",
        Some("abcdefghijklmnopqrstuvwxyz"),
    ),
];

/// Compiled search settings.
#[derive(Debug, Clone)]
pub(crate) struct SearchTemplate {
    base: Arc<ValuePattern>,
    filters: PatternPair,
    scope: SearchScope,
    attributes: Vec<String>,
    size_limit: u32,
    time_limit_secs: u32,
}

impl SearchTemplate {
    pub(crate) fn from_config(config: &SearchConfig) -> JobResult<Self> {
        Ok(Self {
            base: compile("search.base_dn", &config.base_dn)?,
            filters: PatternPair::compile(
                ["search.filter1", "search.filter2"],
                &config.filter1,
                config.filter2.as_deref(),
                config.filter1_percent,
            )?,
            scope: config.scope,
            attributes: config.attributes.clone(),
            size_limit: config.size_limit,
            time_limit_secs: config.time_limit_secs,
        })
    }

    /// Requests only `attributes` and at most `size_limit` entries.
    pub(crate) fn restricted(mut self, attributes: Vec<String>, size_limit: u32) -> Self {
        self.attributes = attributes;
        self.size_limit = size_limit;
        self
    }

    pub(crate) fn generator(&self) -> SearchGenerator {
        SearchGenerator {
            base: ValueGenerator::new(self.base.clone()),
            filters: self.filters.generator(),
            template: self.clone(),
        }
    }
}

/// One worker's search request source.
#[derive(Debug, Clone)]
pub(crate) struct SearchGenerator {
    base: ValueGenerator,
    filters: PairGenerator,
    template: SearchTemplate,
}

impl SearchGenerator {
    /// Builds the next request.
    ///
    /// A generated filter that does not parse is `JobError::MalformedRequest`.
    pub(crate) fn next_request<R: Rng + ?Sized>(&mut self, rng: &mut R) -> JobResult<SearchRequest> {
        let base_dn = self.base.next_value(rng);
        let text = self.filters.next_value(rng);
        let filter = Filter::from_str(&text)
            .map_err(|e| JobError::malformed("search filter", text.clone(), e))?;

        Ok(SearchRequest {
            base_dn,
            scope: self.template.scope,
            filter,
            attributes: self.template.attributes.clone(),
            size_limit: self.template.size_limit,
            time_limit_secs: self.template.time_limit_secs,
        })
    }
}

/// How the values of one modified attribute are produced.
#[derive(Debug, Clone)]
enum ValueSource {
    /// One random string from the job's character set.
    Random,
    /// `count` values from a pattern.
    Pattern {
        count: usize,
        pattern: Arc<ValuePattern>,
    },
}

/// One `attr` or `attr:count:pattern` entry of `modify.attributes`.
#[derive(Debug, Clone)]
pub struct ModificationTemplate {
    attribute: String,
    source: ValueSource,
}

impl ModificationTemplate {
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }
}

impl FromStr for ModificationTemplate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let mut parts = s.splitn(3, ':');
        let attribute = parts.next().unwrap_or_default().trim();
        if attribute.is_empty() {
            return Err(format!("'{s}' does not name an attribute"));
        }

        let source = match (parts.next(), parts.next()) {
            (None, _) => ValueSource::Random,
            (Some(_), None) => {
                return Err(format!("'{s}' must be attr or attr:count:pattern"));
            }
            (Some(count), Some(pattern)) => {
                let count = count
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|c| *c >= 1)
                    .ok_or_else(|| format!("'{s}' needs a value count of at least 1"))?;
                if pattern.is_empty() {
                    return Err(format!("'{s}' has an empty value pattern"));
                }
                let pattern = pattern.parse::<ValuePattern>().map_err(|e| e.to_string())?;
                ValueSource::Pattern {
                    count,
                    pattern: Arc::new(pattern),
                }
            }
        };

        Ok(Self {
            attribute: attribute.to_string(),
            source,
        })
    }
}

/// Compiled modify settings.
#[derive(Debug, Clone)]
pub(crate) struct ModificationSet {
    templates: Vec<ModificationTemplate>,
    value_length: usize,
    characters: Vec<char>,
}

impl ModificationSet {
    pub(crate) fn from_config(config: &ModifyConfig) -> JobResult<Self> {
        let templates = config
            .attributes
            .iter()
            .map(|text| {
                text.parse::<ModificationTemplate>()
                    .map_err(|e| JobError::invalid_parameter("modify.attributes", e))
            })
            .collect::<JobResult<Vec<_>>>()?;
        if templates.is_empty() {
            return Err(JobError::invalid_parameter(
                "modify.attributes",
                "at least one attribute is required",
            ));
        }
        let characters: Vec<char> = config.character_set.chars().collect();
        if characters.is_empty() {
            return Err(JobError::invalid_parameter(
                "modify.character_set",
                "cannot be empty",
            ));
        }

        Ok(Self {
            templates,
            value_length: config.value_length.max(1),
            characters,
        })
    }

    pub(crate) fn generator(&self) -> ModificationGenerator {
        let generators = self
            .templates
            .iter()
            .map(|t| match &t.source {
                ValueSource::Random => None,
                ValueSource::Pattern { pattern, .. } => Some(ValueGenerator::new(pattern.clone())),
            })
            .collect();
        ModificationGenerator {
            set: self.clone(),
            generators,
        }
    }
}

/// One worker's modification source.
#[derive(Debug, Clone)]
pub(crate) struct ModificationGenerator {
    set: ModificationSet,
    generators: Vec<Option<ValueGenerator>>,
}

impl ModificationGenerator {
    pub(crate) fn next_modifications<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Vec<Modification> {
        let set = &self.set;
        set.templates
            .iter()
            .zip(self.generators.iter_mut())
            .map(|(template, generator)| {
                let values: Vec<String> = match (&template.source, generator) {
                    (ValueSource::Pattern { count, .. }, Some(generator)) => {
                        (0..*count).map(|_| generator.next_value(rng)).collect()
                    }
                    _ => vec![random_string(rng, &set.characters, set.value_length)],
                };
                Modification {
                    attribute: template.attribute.clone(),
                    values,
                }
            })
            .collect()
    }
}
