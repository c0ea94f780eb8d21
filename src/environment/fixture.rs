//! Local fixture page driver
//!
//! Loads a static HTML vendor page from disk and simulates it: every element
//! carrying an `id` is an affordance, its state is its inner text, and
//! invoking it swaps the text for its `data-after-click` attribute.

use super::{EnvironmentDriver, EnvironmentSession};
use crate::error::OrchestrationError;
use crate::models::EnvironmentSnapshot;
use crate::Result;
use async_trait::async_trait;
use regex::Regex;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct Affordance {
    pub id: String,
    pub text: String,
    pub after_click: Option<String>,
}

pub struct FixturePageDriver {
    path: PathBuf,
}

impl FixturePageDriver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EnvironmentDriver for FixturePageDriver {
    async fn open(&self) -> Result<Box<dyn EnvironmentSession>> {
        let html = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            OrchestrationError::SessionError(format!(
                "cannot load target page {}: {}",
                self.path.display(),
                e
            ))
        })?;

        let affordances = scan_affordances(&html)?;

        info!(
            path = %self.path.display(),
            affordance_count = affordances.len(),
            "Fixture page session opened"
        );

        Ok(Box::new(FixtureSession {
            html,
            affordances,
            open: true,
        }))
    }
}

/// Find every element with an `id` and its leading inner text
pub fn scan_affordances(html: &str) -> Result<Vec<Affordance>> {
    let element = Regex::new(r"(?s)<([a-zA-Z][a-zA-Z0-9-]*)([^>]*)>([^<]*)")
        .map_err(|e| OrchestrationError::SystemError(e.to_string()))?;
    let id_attr = Regex::new(r#"(?:^|\s)id\s*=\s*["']([^"']+)["']"#)
        .map_err(|e| OrchestrationError::SystemError(e.to_string()))?;
    let after_attr = Regex::new(r#"(?:^|\s)data-after-click\s*=\s*["']([^"']*)["']"#)
        .map_err(|e| OrchestrationError::SystemError(e.to_string()))?;

    let mut affordances: Vec<Affordance> = Vec::new();

    for caps in element.captures_iter(html) {
        let attrs = &caps[2];
        let Some(id) = id_attr.captures(attrs).map(|c| c[1].to_string()) else {
            continue;
        };

        if affordances.iter().any(|a| a.id == id) {
            continue;
        }

        affordances.push(Affordance {
            id,
            text: caps[3].trim().to_string(),
            after_click: after_attr.captures(attrs).map(|c| c[1].to_string()),
        });
    }

    Ok(affordances)
}

struct FixtureSession {
    html: String,
    affordances: Vec<Affordance>,
    open: bool,
}

impl FixtureSession {
    fn ensure_open(&self) -> Result<()> {
        if self.open {
            Ok(())
        } else {
            Err(OrchestrationError::SessionError(
                "session already closed".to_string(),
            ))
        }
    }

    fn find_mut(&mut self, action_identifier: &str) -> Result<&mut Affordance> {
        self.affordances
            .iter_mut()
            .find(|a| a.id == action_identifier)
            .ok_or_else(|| {
                OrchestrationError::ExecutionError(format!(
                    "affordance '#{}' not found on page",
                    action_identifier
                ))
            })
    }
}

#[async_trait]
impl EnvironmentSession for FixtureSession {
    async fn observe(&mut self) -> Result<EnvironmentSnapshot> {
        self.ensure_open()?;
        Ok(EnvironmentSnapshot::new(
            self.html.clone(),
            self.affordances.iter().map(|a| a.id.clone()).collect(),
        ))
    }

    async fn invoke_action(&mut self, action_identifier: &str) -> Result<()> {
        self.ensure_open()?;
        let affordance = self.find_mut(action_identifier)?;

        if let Some(next) = affordance.after_click.clone() {
            affordance.text = next;
        }

        debug!(action_identifier, "Fixture affordance invoked");
        Ok(())
    }

    async fn read_affordance_state(&mut self, action_identifier: &str) -> Result<String> {
        self.ensure_open()?;
        Ok(self.find_mut(action_identifier)?.text.clone())
    }

    async fn close(&mut self) -> Result<()> {
        self.open = false;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const PAGE: &str = r#"<html><body>
<h1 id="title">Vendor Portal</h1>
<div class="item"><span id="material">Steel Rod</span> <span data-id="x">$45.00</span></div>
<button id="quoteBtn" data-after-click="Quote Sent!">Request Quote</button>
</body></html>"#;

    #[test]
    fn test_scan_affordances() {
        let affordances = scan_affordances(PAGE).unwrap();
        let ids: Vec<_> = affordances.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["title", "material", "quoteBtn"]);

        let button = &affordances[2];
        assert_eq!(button.text, "Request Quote");
        assert_eq!(button.after_click.as_deref(), Some("Quote Sent!"));
    }

    #[tokio::test]
    async fn test_fixture_session_lifecycle() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(PAGE.as_bytes()).unwrap();

        let driver = FixturePageDriver::new(file.path());
        let mut session = driver.open().await.unwrap();

        let snapshot = session.observe().await.unwrap();
        assert!(snapshot.has_affordance("quoteBtn"));
        assert!(snapshot.content.contains("Steel Rod"));

        session.invoke_action("quoteBtn").await.unwrap();
        assert_eq!(
            session.read_affordance_state("quoteBtn").await.unwrap(),
            "Quote Sent!"
        );

        assert!(session.invoke_action("missing").await.is_err());

        session.close().await.unwrap();
        assert!(session.observe().await.is_err());
    }

    #[tokio::test]
    async fn test_missing_page() {
        let driver = FixturePageDriver::new("/nonexistent/vendor/index.html");
        assert_eq!(driver.path(), Path::new("/nonexistent/vendor/index.html"));
        assert!(driver.open().await.is_err());
    }
}
