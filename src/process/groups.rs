//! Resolution of configured logical process groups into matchers.
//!
//! Each group maps matcher kinds to raw filter values. Filters failing their
//! kind's compatibility check are logged and left out; a group whose filters
//! were all rejected stays in the group spec but never matches.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::{error, warn};

use crate::process::matcher::{Matcher, MatcherKind};
use crate::process::scanner::ProcessHandle;

/// Group name -> (matcher kind key -> raw filter value).
pub type ProcessGroupsConfig = BTreeMap<String, BTreeMap<String, Value>>;

/// Outcome of resolving one configured filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Accepted,
    Rejected(String),
    UnknownKind,
}

/// One line of the resolution report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterResolution {
    pub group: String,
    pub kind: String,
    pub value: String,
    pub decision: FilterDecision,
}

/// A logical group and its matchers (OR semantics).
#[derive(Debug)]
pub struct ProcessGroup {
    pub name: String,
    pub matchers: Vec<Matcher>,
}

impl ProcessGroup {
    /// True if any matcher accepts the process.
    pub fn matches(&mut self, handle: &ProcessHandle) -> bool {
        self.matchers.iter_mut().any(|m| m.matches(handle))
    }
}

/// All configured groups, ordered by name.
#[derive(Debug, Default)]
pub struct GroupSpec {
    groups: Vec<ProcessGroup>,
}

impl GroupSpec {
    /// Builds the group spec, logging every rejected filter.
    pub fn resolve(config: &ProcessGroupsConfig) -> Self {
        Self::resolve_with_report(config).0
    }

    /// Builds the group spec and returns the decision taken for every filter.
    pub fn resolve_with_report(config: &ProcessGroupsConfig) -> (Self, Vec<FilterResolution>) {
        let mut groups = Vec::with_capacity(config.len());
        let mut report = Vec::new();

        for (name, filters) in config {
            let mut matchers = Vec::new();

            for key in filters.keys() {
                if MatcherKind::from_key(key).is_none() {
                    warn!("Unknown filter type '{}' for process group '{}'", key, name);
                    report.push(FilterResolution {
                        group: name.clone(),
                        kind: key.clone(),
                        value: filters[key].to_string(),
                        decision: FilterDecision::UnknownKind,
                    });
                }
            }

            for kind in MatcherKind::ALL {
                let Some(raw) = filters.get(kind.key()) else {
                    continue;
                };

                let decision = match kind.build(raw) {
                    Ok(matcher) => {
                        matchers.push(matcher);
                        FilterDecision::Accepted
                    }
                    Err(e) => {
                        error!("Process group '{}': {}", name, e);
                        FilterDecision::Rejected(e.to_string())
                    }
                };

                report.push(FilterResolution {
                    group: name.clone(),
                    kind: kind.key().to_string(),
                    value: raw.to_string(),
                    decision,
                });
            }

            groups.push(ProcessGroup {
                name: name.clone(),
                matchers,
            });
        }

        (Self { groups }, report)
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// True if at least one group can match anything.
    pub fn has_matchers(&self) -> bool {
        self.groups.iter().any(|g| !g.matchers.is_empty())
    }

    pub fn groups(&self) -> &[ProcessGroup] {
        &self.groups
    }

    pub fn groups_mut(&mut self) -> &mut [ProcessGroup] {
        &mut self.groups
    }

    pub fn get(&self, name: &str) -> Option<&ProcessGroup> {
        self.groups.iter().find(|g| g.name == name)
    }
}
