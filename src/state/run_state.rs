use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a scrape run
///
/// A run is created `Running` and finalized exactly once into one of the
/// terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    Running,
    Completed,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Running)
    }

    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Partial => "partial",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "partial" => Some(Self::Partial),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// What triggered a scrape run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunType {
    Scheduled,
    Manual,
}

impl RunType {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(Self::Scheduled),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// State of a per-service circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "closed" => Some(Self::Closed),
            "open" => Some(Self::Open),
            "half_open" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

impl fmt::Display for BreakerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}

/// Severity of a structured scrape error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSeverity {
    Warning,
    Error,
    Critical,
}

/// Category of a structured scrape error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Parse,
    RateLimit,
    Blocked,
    Database,
    Unknown,
}

/// Where a scrape error happened
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub natural_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
}

/// A structured error recorded on a scrape run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScrapeError {
    pub timestamp: DateTime<Utc>,
    pub severity: ErrorSeverity,
    pub category: ErrorCategory,
    pub message: String,
    #[serde(default)]
    pub context: ErrorContext,
}

impl ScrapeError {
    pub fn new(severity: ErrorSeverity, category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            severity,
            category,
            message: message.into(),
            context: ErrorContext::default(),
        }
    }

    pub fn with_search(mut self, search_id: i64) -> Self {
        self.context.search_id = Some(search_id);
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.context.url = Some(url.into());
        self
    }

    pub fn with_natural_id(mut self, natural_id: impl Into<String>) -> Self {
        self.context.natural_id = Some(natural_id.into());
        self
    }

    pub fn with_http_status(mut self, status: Option<u16>) -> Self {
        self.context.http_status = status;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.severity == ErrorSeverity::Critical
    }
}

/// Aggregated counters for one scrape run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub searches_processed: u32,
    pub listings_found: u32,
    pub listings_new: u32,
    pub listings_updated: u32,
    pub listings_delisted: u32,
}

impl RunStats {
    /// Picks the terminal status for a run that was not aborted by an escaped error
    pub fn final_status(errors: &[ScrapeError]) -> RunStatus {
        if errors.iter().any(ScrapeError::is_critical) {
            RunStatus::Partial
        } else {
            RunStatus::Completed
        }
    }
}
