//! Name filters for listings and bump.

use regex::Regex;

use crate::error::FunnelError;
use crate::job::Job;

/// Selects jobs whose name matches an optional regular expression.
///
/// The pattern is searched, not anchored, so `train` matches `train-7`.
/// An empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    name: Option<Regex>,
}

impl JobFilter {
    /// A filter that matches every job.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_name(pattern: &str) -> Result<Self, FunnelError> {
        Ok(Self {
            name: Some(Regex::new(pattern)?),
        })
    }

    /// Build from an optional pattern, as passed on the command line.
    pub fn from_pattern(pattern: Option<&str>) -> Result<Self, FunnelError> {
        pattern.map_or_else(|| Ok(Self::all()), Self::by_name)
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.name.as_ref().is_none_or(|re| re.is_match(name))
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.matches_name(&job.name)
    }

    /// Keep only matching jobs, preserving order.
    pub fn apply(&self, jobs: Vec<Job>) -> Vec<Job> {
        if self.is_empty() {
            return jobs;
        }
        jobs.into_iter().filter(|job| self.matches(job)).collect()
    }
}
