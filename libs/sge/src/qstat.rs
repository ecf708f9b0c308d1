//! Parser for `qstat -r` plain-text output.
//!
//! The job table is fixed-width. Column widths are taken from the header
//! line: each heading plus its trailing spaces gives the minimum width of
//! that column, and a value that overflows pushes the next boundary to the
//! following space. Indented `Key: value` lines after a job row (from `-r`)
//! belong to that job.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::NaiveDateTime;
use qfunnel_core::{Job, JobState};
use regex::Regex;

const DATE_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// A heading with its padding. "submit/start at" is the one heading that
/// contains spaces.
const HEADING_PATTERN: &str = r"(?:submit/start at|\S+)(?: +|$)";

/// A `-r` detail line: a `Key: value` pair indented past the job-ID column,
/// which is seven characters wide and right-aligned.
const DETAIL_PATTERN: &str = r"^ {7,}[A-Za-z][A-Za-z ]*:";

/// One job row with its detail lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QstatRow {
    pub columns: BTreeMap<String, String>,
    pub details: BTreeMap<String, String>,
}

impl QstatRow {
    fn column(&self, name: &str) -> &str {
        self.columns.get(name).map(String::as_str).unwrap_or("")
    }

    fn detail(&self, name: &str) -> Option<&str> {
        self.details
            .get(name)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Convert into a job record.
    pub fn to_job(&self) -> Result<Job> {
        let job_id = self.column("job-ID");
        if job_id.is_empty() {
            anyhow::bail!("qstat row without a job id");
        }
        let id = match self.column("ja-task-ID") {
            "" => job_id.to_string(),
            task => format!("{job_id}.{task}"),
        };

        let name = self
            .detail("Full jobname")
            .unwrap_or_else(|| self.column("name"))
            .to_string();
        let queue = self
            .detail("Hard requested queues")
            .unwrap_or_else(|| self.column("queue"))
            .to_string();

        let slots = match self.column("slots") {
            "" => 1,
            raw => raw
                .parse::<u32>()
                .with_context(|| format!("job {id}: bad slot count {raw:?}"))?
                .max(1),
        };

        let since = match self.column("submit/start at") {
            "" => None,
            raw => Some(
                NaiveDateTime::parse_from_str(raw, DATE_FORMAT)
                    .with_context(|| format!("job {id}: bad date {raw:?}"))?,
            ),
        };

        Ok(Job {
            id,
            user: self.column("user").to_string(),
            name,
            slots,
            state: parse_state(self.column("state")),
            queue,
            since,
            local_id: None,
        })
    }
}

/// Map a Grid Engine state code to a funnel state.
///
/// Anything still waiting in the scheduler (`qw`, `hqw`, `Eqw`, ...) is
/// pending; everything else occupies a slot.
pub fn parse_state(code: &str) -> JobState {
    if code.contains('q') {
        JobState::Pending
    } else {
        JobState::Running
    }
}

/// Parse the rows of a `qstat` table.
pub fn parse_table(output: &str) -> Result<Vec<QstatRow>> {
    let mut lines = output.lines().filter(|line| !line.trim().is_empty());
    let Some(header) = lines.next() else {
        return Ok(Vec::new());
    };

    let headings: Vec<(String, usize)> = Regex::new(HEADING_PATTERN)?
        .find_iter(header)
        .map(|m| (m.as_str().trim_end().to_string(), m.as_str().len()))
        .collect();
    let widths: Vec<usize> = headings.iter().map(|(_, width)| *width).collect();
    let detail = Regex::new(DETAIL_PATTERN)?;

    let mut rows: Vec<QstatRow> = Vec::new();
    for line in lines {
        if line.starts_with("---") {
            continue;
        }
        if detail.is_match(line) {
            if let (Some(row), Some((key, value))) = (rows.last_mut(), line.trim().split_once(':')) {
                row.details
                    .insert(key.trim().to_string(), value.trim().to_string());
            }
            continue;
        }

        let columns = split_row(line, &widths)
            .into_iter()
            .zip(headings.iter())
            .map(|(value, (heading, _))| (heading.clone(), value.trim().to_string()))
            .collect();
        rows.push(QstatRow {
            columns,
            details: BTreeMap::new(),
        });
    }
    Ok(rows)
}

/// Parse a table straight into jobs.
pub fn parse_jobs(output: &str) -> Result<Vec<Job>> {
    parse_table(output)?.iter().map(QstatRow::to_job).collect()
}

fn split_row(row: &str, widths: &[usize]) -> Vec<String> {
    let chars: Vec<char> = row.chars().collect();
    let mut out = Vec::with_capacity(widths.len());
    let mut start = 0;
    for &width in widths {
        if start >= chars.len() {
            out.push(String::new());
            continue;
        }
        let mut end = (start + width).min(chars.len());
        while end < chars.len() && end > start && chars[end - 1] != ' ' {
            end += 1;
        }
        out.push(chars[start..end].iter().collect());
        start = end;
    }
    out
}
