//! Output formatting for CLI commands.

use chrono::NaiveDateTime;
use colored::Colorize;
use qfunnel_core::{Capacity, Job, Limit};
use serde::Serialize;
use tabled::{Table, Tabled};

/// Output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format.
    #[default]
    Table,
    /// JSON format.
    Json,
}

/// Print rows as a table, or a placeholder when there are none.
pub fn print_table<T: Tabled>(rows: &[T], empty: &str) {
    if rows.is_empty() {
        println!("{}", empty.dimmed());
    } else {
        println!("{}", Table::new(rows));
    }
}

/// Print a value as pretty JSON.
pub fn print_json<T: Serialize + ?Sized>(data: &T) {
    let json = serde_json::to_string_pretty(data).unwrap_or_else(|_| "null".to_string());
    println!("{}", json);
}

/// Print a success message.
pub fn print_success(message: &str) {
    println!("{} {}", "Success:".green().bold(), message);
}

/// Print an info message.
pub fn print_info(message: &str) {
    println!("{} {}", "Info:".blue().bold(), message);
}

/// Render a timestamp as e.g. `Sat Jul 9 @ 3:04:05 PM`.
pub fn format_date(date: Option<NaiveDateTime>) -> String {
    date.map(|d| d.format("%a %b %-d @ %-I:%M:%S %p").to_string())
        .unwrap_or_default()
}

#[derive(Debug, Tabled)]
pub struct LimitRow {
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Limit")]
    limit: u32,
}

impl From<&Limit> for LimitRow {
    fn from(limit: &Limit) -> Self {
        Self {
            queue: limit.queue.clone(),
            limit: limit.value,
        }
    }
}

/// A job row for the caller's own listing.
#[derive(Debug, Tabled)]
pub struct OwnJobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Since")]
    since: String,
}

impl From<&Job> for OwnJobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            name: job.name.clone(),
            state: job.state.to_string(),
            queue: job.queue.clone(),
            since: format_date(job.since),
        }
    }
}

/// A job row for a queue listing, which spans users.
#[derive(Debug, Tabled)]
pub struct QueueJobRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "User")]
    user: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Since")]
    since: String,
}

impl From<&Job> for QueueJobRow {
    fn from(job: &Job) -> Self {
        Self {
            id: job.id.clone(),
            user: job.user.clone(),
            name: job.name.clone(),
            state: job.state.to_string(),
            queue: job.queue.clone(),
            since: format_date(job.since),
        }
    }
}

#[derive(Debug, Tabled)]
pub struct CapacityRow {
    #[tabled(rename = "Queue")]
    queue: String,
    #[tabled(rename = "Taken")]
    taken: u32,
    #[tabled(rename = "Limit")]
    limit: String,
    #[tabled(rename = "Available")]
    available: String,
}

impl From<&Capacity> for CapacityRow {
    fn from(capacity: &Capacity) -> Self {
        Self {
            queue: capacity.queue.clone(),
            taken: capacity.taken,
            limit: capacity.limit.map(|l| l.to_string()).unwrap_or_default(),
            available: capacity
                .available()
                .map(|a| a.to_string())
                .unwrap_or_default(),
        }
    }
}
