use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::snapshot::{RefEntry, SnapshotSession};
use super::token::RefToken;
use crate::error::{AxbridgeError, Result};

/// What to do when a ref's disambiguation index is past the live match count.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackPolicy {
    /// Use the stored index when in range, otherwise the first match.
    #[default]
    FirstMatch,
    /// Use the stored index or fail.
    Strict,
}

impl FallbackPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FallbackPolicy::FirstMatch => "first-match",
            FallbackPolicy::Strict => "strict",
        }
    }

    /// Pick the live match for a stored index, `None` when nothing fits.
    pub fn choose(&self, stored: usize, count: usize) -> Option<usize> {
        if count == 0 {
            return None;
        }
        match self {
            FallbackPolicy::FirstMatch if stored > 0 && stored < count => Some(stored),
            FallbackPolicy::FirstMatch => Some(0),
            FallbackPolicy::Strict => (stored < count).then_some(stored),
        }
    }
}

impl fmt::Display for FallbackPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FallbackPolicy {
    type Err = AxbridgeError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first-match" | "first_match" | "first" => Ok(FallbackPolicy::FirstMatch),
            "strict" => Ok(FallbackPolicy::Strict),
            other => Err(AxbridgeError::ConfigError(format!(
                "Unknown fallback policy '{}' (expected first-match or strict)",
                other
            ))),
        }
    }
}

/// Live query for elements by computed role and accessible name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleQuery {
    pub role: String,
    pub name: String,
}

impl RoleQuery {
    pub fn new(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            name: name.into(),
        }
    }

    /// Role must be equal; the stored name must appear in the live name,
    /// ignoring case and runs of whitespace. An empty stored name matches
    /// anything.
    pub fn matches(&self, role: &str, name: &str) -> bool {
        if role != self.role {
            return false;
        }
        let wanted = normalize_name(&self.name);
        wanted.is_empty() || normalize_name(name).contains(&wanted)
    }
}

impl From<&RefEntry> for RoleQuery {
    fn from(entry: &RefEntry) -> Self {
        Self::new(entry.role.clone(), entry.name.clone())
    }
}

fn normalize_name(name: &str) -> String {
    name.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// A ref resolved to "the `nth` live element matching `query`".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locator {
    pub token: RefToken,
    pub query: RoleQuery,
    pub nth: usize,
}

/// The page operations ref resolution needs. Implemented over CDP by
/// [`crate::browser::CdpPage`]; tests use an in-memory page.
#[async_trait]
pub trait LivePage: Send + Sync {
    /// Number of elements currently matching `query`.
    async fn count_matches(&self, query: &RoleQuery) -> Result<usize>;

    async fn click(&self, locator: &Locator, timeout: Duration) -> Result<()>;

    async fn fill(
        &self,
        locator: &Locator,
        value: &str,
        press_enter: bool,
        timeout: Duration,
    ) -> Result<()>;

    /// Select options by value or label; returns the values now selected.
    async fn select(
        &self,
        locator: &Locator,
        values: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>>;
}

/// Resolves refs against a snapshot and runs actions on the located element.
#[derive(Debug, Clone)]
pub struct ActionRunner {
    policy: FallbackPolicy,
    timeout: Duration,
}

impl Default for ActionRunner {
    fn default() -> Self {
        Self::new(FallbackPolicy::default(), Duration::from_millis(5000))
    }
}

impl ActionRunner {
    pub fn new(policy: FallbackPolicy, timeout: Duration) -> Self {
        Self { policy, timeout }
    }

    pub fn policy(&self) -> FallbackPolicy {
        self.policy
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Map a caller-supplied ref to a live element.
    pub async fn locate(
        &self,
        page: &dyn LivePage,
        session: &SnapshotSession,
        raw_ref: &str,
    ) -> Result<Locator> {
        let (token, entry) = session.lookup(raw_ref)?;
        let query = RoleQuery::from(entry);
        let count = page.count_matches(&query).await?;

        let element_not_found = || AxbridgeError::ElementNotFound {
            reference: token.to_string(),
            role: entry.role.clone(),
            name: entry.name.clone(),
        };

        let nth = self
            .policy
            .choose(entry.disambiguation_index, count)
            .ok_or_else(element_not_found)?;

        if nth != entry.disambiguation_index {
            warn!(
                "Ref {} expected match #{} of {} {:?} but only {} exist, using #{}",
                token, entry.disambiguation_index, entry.role, entry.name, count, nth
            );
        } else {
            debug!(
                "Ref {} -> {} {:?} match #{} of {}",
                token, entry.role, entry.name, nth, count
            );
        }

        Ok(Locator { token, query, nth })
    }

    pub async fn click(
        &self,
        page: &dyn LivePage,
        session: &SnapshotSession,
        raw_ref: &str,
    ) -> Result<Locator> {
        let locator = self.locate(page, session, raw_ref).await?;
        page.click(&locator, self.timeout).await?;
        Ok(locator)
    }

    pub async fn fill(
        &self,
        page: &dyn LivePage,
        session: &SnapshotSession,
        raw_ref: &str,
        value: &str,
        press_enter: bool,
    ) -> Result<Locator> {
        let locator = self.locate(page, session, raw_ref).await?;
        page.fill(&locator, value, press_enter, self.timeout).await?;
        Ok(locator)
    }

    pub async fn select(
        &self,
        page: &dyn LivePage,
        session: &SnapshotSession,
        raw_ref: &str,
        values: &[String],
    ) -> Result<(Locator, Vec<String>)> {
        if values.is_empty() {
            return Err(AxbridgeError::InvalidArguments(
                "select needs at least one value".to_string(),
            ));
        }
        let locator = self.locate(page, session, raw_ref).await?;
        let selected = page.select(&locator, values, self.timeout).await?;
        Ok((locator, selected))
    }
}
