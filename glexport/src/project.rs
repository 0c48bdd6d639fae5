//! Project identity and selection.

use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A project identified by its namespaced path on the platform,
/// e.g. `group/subgroup/name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectRef(String);

impl ProjectRef {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// Full namespaced path, as the platform knows it.
    pub fn path(&self) -> &str {
        &self.0
    }

    /// Last path segment: the project's own name.
    pub fn name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Everything before the last segment; empty for top-level projects.
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('/').map(|(ns, _)| ns).unwrap_or("")
    }

    /// URL-encoded form for use as an API path parameter.
    pub fn encoded(&self) -> String {
        urlencoding::encode(&self.0).into_owned()
    }
}

impl fmt::Display for ProjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Select the projects to process from the platform's full listing.
///
/// Patterns are regexes matched at the start of the project path (so a plain
/// path works as its own pattern). A project matching any exclude pattern is
/// dropped even when included. Order follows the listing; duplicates are
/// collapsed.
pub fn select_projects(
    all: &[ProjectRef],
    include: &[String],
    exclude: &[String],
) -> Result<Vec<ProjectRef>> {
    let include = compile(include)?;
    let exclude = compile(exclude)?;

    let mut selected = Vec::new();
    for project in all {
        if !include.iter().any(|re| re.is_match(project.path())) {
            continue;
        }
        if exclude.iter().any(|re| re.is_match(project.path())) {
            tracing::debug!(project = %project, "excluded by configuration");
            continue;
        }
        if !selected.contains(project) {
            selected.push(project.clone());
        }
    }
    Ok(selected)
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(&format!("^(?:{p})")).map_err(Into::into))
        .collect()
}
