//! Mock collaborators with controllable behavior.

use crate::collab::{ClusterAssignment, Clusterer, FeatureRanker, RankRequest};
use crate::dataset::arff;
use crate::error::{Result, SiftError};
use async_trait::async_trait;
use ndarray::Array2;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock clusterer.
///
/// By default row `i` gets label `i % n_clusters` and the score is 0.5.
/// Clones share their call counter, so a test can keep one clone and hand
/// another to the controller.
///
/// # Example
///
/// ```rust,ignore
/// let clusterer = MockClusterer::new().with_score(0.73);
/// let result = clusterer.cluster(&matrix, 2)?;
/// assert_eq!(result.score, 0.73);
/// ```
#[derive(Debug, Clone)]
pub struct MockClusterer {
    name: String,
    labels: Option<Vec<usize>>,
    score: f64,
    delay: Option<Duration>,
    error: Option<String>,
    call_count: Arc<AtomicU32>,
}

impl Default for MockClusterer {
    fn default() -> Self {
        Self {
            name: "kmeans".to_string(),
            labels: None,
            score: 0.5,
            delay: None,
            error: None,
            call_count: Arc::new(AtomicU32::new(0)),
        }
    }
}

impl MockClusterer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Method name reported to the controller.
    #[must_use]
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Return exactly these labels, whatever the matrix.
    #[must_use]
    pub fn with_labels(mut self, labels: Vec<usize>) -> Self {
        self.labels = Some(labels);
        self
    }

    #[must_use]
    pub fn with_score(mut self, score: f64) -> Self {
        self.score = score;
        self
    }

    /// Block for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }
}

impl Clusterer for MockClusterer {
    fn name(&self) -> &str {
        &self.name
    }

    fn cluster(&self, data: &Array2<f64>, n_clusters: usize) -> Result<ClusterAssignment> {
        self.call_count.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }
        if let Some(ref error) = self.error {
            return Err(SiftError::collaborator(&self.name, error.clone()));
        }

        let labels = match &self.labels {
            Some(labels) => labels.clone(),
            None => (0..data.nrows()).map(|i| i % n_clusters.max(1)).collect(),
        };
        Ok(ClusterAssignment {
            labels,
            score: self.score,
        })
    }
}

/// Mock feature ranker.
///
/// By default it reads the export and returns the first `keep` attributes
/// in declaration order, skipping the class attribute.
///
/// # Example
///
/// ```rust,ignore
/// let ranker = MockRanker::new().returning_count(2);
/// // Always answers with two names, whatever keep-count was requested.
/// ```
#[derive(Debug, Clone)]
pub struct MockRanker {
    features: Option<Vec<String>>,
    count: Option<usize>,
    delay: Option<Duration>,
    error: Option<String>,
    call_count: Arc<AtomicU32>,
    requests: Arc<Mutex<Vec<RankRequest>>>,
}

impl Default for MockRanker {
    fn default() -> Self {
        Self {
            features: None,
            count: None,
            delay: None,
            error: None,
            call_count: Arc::new(AtomicU32::new(0)),
            requests: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl MockRanker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return exactly this list.
    #[must_use]
    pub fn with_features(mut self, features: &[&str]) -> Self {
        self.features = Some(features.iter().map(|f| f.to_string()).collect());
        self
    }

    /// Return this many attributes instead of the requested keep-count.
    #[must_use]
    pub fn returning_count(mut self, count: usize) -> Self {
        self.count = Some(count);
        self
    }

    /// Sleep asynchronously for `delay` before answering.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    #[must_use]
    pub fn with_error(mut self, error: &str) -> Self {
        self.error = Some(error.to_string());
        self
    }

    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<RankRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl FeatureRanker for MockRanker {
    fn name(&self) -> &str {
        "mock"
    }

    async fn rank(&self, request: &RankRequest) -> Result<Vec<String>> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref error) = self.error {
            return Err(SiftError::collaborator("mock", error.clone()));
        }
        if let Some(ref features) = self.features {
            return Ok(features.clone());
        }

        let data = arff::read(&request.arff_path)?;
        let count = self.count.unwrap_or(request.keep);
        Ok(data
            .attributes
            .iter()
            .filter(|a| a.name != request.target)
            .take(count)
            .map(|a| a.name.clone())
            .collect())
    }
}
