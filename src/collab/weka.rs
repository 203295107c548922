//! Weka subprocess ranker.
//!
//! Runs Weka's `InfoGainAttributeEval` with a `Ranker` search and reads the
//! ranked attribute names from its report. The report parsing is confined to
//! [`parse_ranker_output`].

use super::{FeatureRanker, RankRequest};
use crate::error::{Result, SiftError};
use anyhow::{bail, Context};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command as AsyncCommand;
use tracing::debug;

const EVALUATOR: &str = "weka.attributeSelection.InfoGainAttributeEval";
const RANKED_HEADER: &str = "Ranked attributes:";
const SELECTED_FOOTER: &str = "Selected attributes:";

/// Extract attribute names from a Weka ranker report.
///
/// Names are read from the lines after `Ranked attributes:` up to the
/// `Selected attributes:` line; each name is the last whitespace-separated
/// token of its line.
///
/// # Errors
///
/// Returns [`SiftError::Collaborator`] if the report has no ranking section.
pub fn parse_ranker_output(output: &str) -> Result<Vec<String>> {
    let mut lines = output.lines();
    if !lines.by_ref().any(|l| l.trim() == RANKED_HEADER) {
        return Err(SiftError::collaborator(
            "weka",
            format!("output has no '{RANKED_HEADER}' section"),
        ));
    }

    Ok(lines
        .take_while(|l| !l.contains(SELECTED_FOOTER))
        .filter_map(|l| l.split_whitespace().last())
        .map(str::to_string)
        .collect())
}

/// Ranker backed by a local Weka installation.
#[derive(Debug, Clone)]
pub struct WekaRanker {
    jar: PathBuf,
    java: Option<PathBuf>,
}

impl WekaRanker {
    #[must_use]
    pub fn new(jar: impl Into<PathBuf>) -> Self {
        Self {
            jar: jar.into(),
            java: None,
        }
    }

    /// Use a specific java executable instead of the one on `PATH`.
    #[must_use]
    pub fn with_java(mut self, java: impl Into<PathBuf>) -> Self {
        self.java = Some(java.into());
        self
    }

    fn java(&self) -> Result<PathBuf> {
        match &self.java {
            Some(java) => Ok(java.clone()),
            None => which::which("java")
                .map_err(|e| SiftError::collaborator("weka", format!("java not found: {e}"))),
        }
    }

    /// Arguments passed to java.
    #[must_use]
    pub fn arguments(&self, request: &RankRequest) -> Vec<String> {
        vec![
            "-cp".to_string(),
            self.jar.display().to_string(),
            EVALUATOR.to_string(),
            "-s".to_string(),
            format!("weka.attributeSelection.Ranker -T 0.0 -N {}", request.keep),
            "-i".to_string(),
            request.arff_path.display().to_string(),
        ]
    }
}

#[async_trait]
impl FeatureRanker for WekaRanker {
    fn name(&self) -> &str {
        "weka"
    }

    async fn rank(&self, request: &RankRequest) -> Result<Vec<String>> {
        if !self.jar.exists() {
            return Err(SiftError::MissingFile {
                path: self.jar.clone(),
            });
        }
        let java = self.java()?;
        let args = self.arguments(request);
        debug!("Running {} {}", java.display(), args.join(" "));

        let stdout = run_java(&java, &args).await?;
        parse_ranker_output(&stdout)
    }
}

/// Run java to completion and return its stdout.
async fn run_java(java: &Path, args: &[String]) -> anyhow::Result<String> {
    let output = AsyncCommand::new(java)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output()
        .await
        .with_context(|| format!("failed to spawn {}", java.display()))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("weka exited with {}: {}", output.status, stderr.trim());
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
