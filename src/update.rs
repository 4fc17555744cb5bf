//! Background update check.
//!
//! # Responsibilities
//! - Ask the release endpoint whether a newer version exists
//! - Surface bulletins in the logs
//! - Never gate startup or shutdown; strictly fire-and-forget
//!
//! # Design Decisions
//! - The first check is staggered by a random delay so a fleet restarting
//!   together does not stampede the endpoint
//! - Failures are logged and otherwise ignored
//! - The anonymous signature is only sent when a data directory is configured
//!   and the signature is not disabled

use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;

const CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
const MAX_INITIAL_STAGGER_MS: u64 = 30_000;

/// Parameters of the periodic update check.
#[derive(Debug, Clone)]
pub struct UpdateChecker {
    endpoint: String,
    version: String,
    signature_file: Option<PathBuf>,
}

/// Release information returned by the endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct CheckResponse {
    pub(crate) current_version: String,
    #[serde(default)]
    pub(crate) outdated: bool,
    #[serde(default)]
    pub(crate) alerts: Vec<Alert>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Alert {
    pub(crate) level: String,
    pub(crate) message: String,
    pub(crate) url: String,
}

impl UpdateChecker {
    pub fn new(endpoint: String, version: String, signature_file: Option<PathBuf>) -> Self {
        Self {
            endpoint,
            version,
            signature_file,
        }
    }

    /// Spawn the periodic check task. The initial delay is drawn from `rng`
    /// up front, so the spawned task carries no generator.
    pub fn spawn(self, rng: &mut StdRng) {
        let initial_delay = Duration::from_millis(rng.gen_range(0..MAX_INITIAL_STAGGER_MS));
        tokio::spawn(async move {
            tokio::time::sleep(initial_delay).await;
            loop {
                self.check_once().await;
                tokio::time::sleep(CHECK_INTERVAL).await;
            }
        });
    }

    async fn check_once(&self) {
        match self.request().await {
            Ok(response) => log_results(&self.version, &response),
            Err(err) => tracing::error!(error = %err, "Failed to check for updates"),
        }
    }

    async fn request(&self) -> Result<CheckResponse, reqwest::Error> {
        let url = format!("{}/v1/check/meshd", self.endpoint);
        let mut request = reqwest::Client::new()
            .get(url)
            .query(&[("version", self.version.as_str())]);

        if let Some(signature) = self.signature_file.as_deref().and_then(load_signature) {
            request = request.query(&[("signature", signature.as_str())]);
        }

        request.send().await?.error_for_status()?.json().await
    }
}

/// Read the anonymous signature, creating it on first use.
fn load_signature(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(signature) => Some(signature.trim().to_string()),
        Err(_) => {
            let signature = uuid::Uuid::new_v4().to_string();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).ok()?;
            }
            std::fs::write(path, &signature).ok()?;
            Some(signature)
        }
    }
}

fn log_results(running: &str, response: &CheckResponse) {
    if response.outdated {
        tracing::info!(
            new_version = %response.current_version,
            current_version = %running,
            "Newer meshd version available"
        );
    }
    for alert in &response.alerts {
        match alert.level.as_str() {
            "info" => tracing::info!(
                alert_level = %alert.level,
                alert_message = %alert.message,
                alert_url = %alert.url,
                "Bulletin"
            ),
            _ => tracing::error!(
                alert_level = %alert.level,
                alert_message = %alert.message,
                alert_url = %alert.url,
                "Bulletin"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_release_information() {
        let response: CheckResponse = serde_json::from_str(
            r#"{
                "current_version": "0.2.0",
                "outdated": true,
                "alerts": [
                    {"level": "info", "message": "maintenance window", "url": "https://example.com"}
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(response.current_version, "0.2.0");
        assert!(response.outdated);
        assert_eq!(response.alerts.len(), 1);
        assert_eq!(response.alerts[0].level, "info");
    }

    #[test]
    fn alerts_default_to_empty() {
        let response: CheckResponse =
            serde_json::from_str(r#"{"current_version": "0.1.0"}"#).unwrap();
        assert!(!response.outdated);
        assert!(response.alerts.is_empty());
    }

    #[test]
    fn signature_is_created_once_and_reused() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state").join("update-signature");

        let first = load_signature(&path).unwrap();
        let second = load_signature(&path).unwrap();
        assert_eq!(first, second);
        assert!(!first.is_empty());
    }
}
