//! Cookie persistence between runs
//!
//! One JSON file per source family, `<dir>/<family>-session.json`.

use crate::browser::{BrowserContext, BrowserCookie};
use crate::state::SourceFamily;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Contents of a session file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub cookies: Vec<BrowserCookie>,
    pub last_used: DateTime<Utc>,
    pub use_count: u32,
}

/// Reads and writes session files under one directory
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
    max_age: Duration,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>, max_age_days: u32) -> Self {
        Self {
            dir: dir.into(),
            max_age: Duration::days(max_age_days as i64),
        }
    }

    pub fn path(&self, family: SourceFamily) -> PathBuf {
        self.dir.join(format!("{}-session.json", family.to_db_string()))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Reads the stored session, if any
    pub fn read(&self, family: SourceFamily) -> Result<Option<SessionData>> {
        let path = self.path(family);
        if !path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(&path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn write(&self, family: SourceFamily, data: &SessionData) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        std::fs::write(self.path(family), serde_json::to_string_pretty(data)?)?;
        Ok(())
    }

    /// Age of the stored session
    pub fn age(&self, family: SourceFamily, now: DateTime<Utc>) -> Result<Option<Duration>> {
        Ok(self
            .read(family)?
            .map(|data| now.signed_duration_since(data.last_used)))
    }

    /// Restores saved cookies into `context`
    ///
    /// Returns false when there is no session, it is stale, it holds no
    /// cookies, or it cannot be read.
    pub async fn restore<C: BrowserContext>(
        &self,
        context: &mut C,
        family: SourceFamily,
        now: DateTime<Utc>,
    ) -> bool {
        let data = match self.read(family) {
            Ok(Some(data)) => data,
            Ok(None) => {
                tracing::info!("No existing {} session found, starting fresh", family);
                return false;
            }
            Err(e) => {
                tracing::warn!("Failed to load {} session: {}", family, e);
                return false;
            }
        };

        let age = now.signed_duration_since(data.last_used);
        if age > self.max_age {
            tracing::info!(
                "{} session is stale ({} days old), starting fresh",
                family,
                age.num_days()
            );
            return false;
        }

        if data.cookies.is_empty() {
            return false;
        }

        match context.add_cookies(&data.cookies).await {
            Ok(()) => {
                tracing::info!(
                    "Loaded {} session ({} cookies, use #{}, {} days old)",
                    family,
                    data.cookies.len(),
                    data.use_count,
                    age.num_days()
                );
                true
            }
            Err(e) => {
                tracing::warn!("Failed to restore {} cookies: {}", family, e);
                false
            }
        }
    }

    /// Captures the context's cookies, bumping the use count
    pub async fn save<C: BrowserContext>(
        &self,
        context: &C,
        family: SourceFamily,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let cookies = context.cookies().await?;

        // An unreadable previous file only loses its use count
        let previous = self.read(family).ok().flatten();

        let data = SessionData {
            use_count: previous.map_or(0, |p| p.use_count) + 1,
            cookies,
            last_used: now,
        };
        self.write(family, &data)?;

        tracing::info!(
            "Saved {} session ({} cookies, use #{})",
            family,
            data.cookies.len(),
            data.use_count
        );
        Ok(())
    }

    /// Replaces the stored session with an empty one
    pub fn clear(&self, family: SourceFamily, now: DateTime<Utc>) -> Result<()> {
        if !self.path(family).exists() {
            return Ok(());
        }

        self.write(
            family,
            &SessionData {
                cookies: Vec::new(),
                last_used: now,
                use_count: 0,
            },
        )?;
        tracing::info!("Cleared {} session", family);
        Ok(())
    }
}
