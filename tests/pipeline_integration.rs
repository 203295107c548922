//! End-to-end pipeline runs against a temporary artifact root

use cohortsift::artifacts::ArtifactKind;
use cohortsift::collab::{InfoGainRanker, KMeansClusterer};
use cohortsift::dataset::{arff, io};
use cohortsift::pipeline::ConfigLock;
use cohortsift::testing::{write_demo_base, MockClusterer, MockRanker, DEMO_ID_COLUMN};
use cohortsift::{
    ArtifactLayout, CheckpointLocator, ConfigKey, ManifestStore, PipelineController,
    PipelineControllerConfig, PipelineRequest, SiftError, Stage,
};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

fn key() -> ConfigKey {
    ConfigKey::new("demo", "feats", "kmeans", 2)
}

fn setup() -> TempDir {
    let dir = TempDir::new().expect("create temp dir");
    write_demo_base(dir.path(), "demo", "feats").expect("write demo base");
    dir
}

fn mock_controller(root: &Path, clusterer: MockClusterer, ranker: MockRanker) -> PipelineController {
    PipelineController::new(ArtifactLayout::new(root), Arc::new(clusterer), Arc::new(ranker))
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("list dir")
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| !n.starts_with('.'))
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_two_iterations_write_all_artifacts() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    let ranker = MockRanker::new();
    let controller = mock_controller(dir.path(), MockClusterer::new(), ranker.clone());

    let outcome = controller
        .run(&PipelineRequest::new(key(), 2))
        .await
        .expect("pipeline run");

    assert_eq!(outcome.iterations.len(), 2);
    assert_eq!(outcome.iterations[0].n_kept_feats, 5);
    assert_eq!(outcome.iterations[0].keep, 4);
    assert_eq!(outcome.iterations[1].n_kept_feats, 4);
    assert_eq!(outcome.iterations[1].keep, 3);
    assert_eq!(ranker.call_count(), 2);

    let iter0 = layout.iteration_dir(&key(), 0);
    let iter1 = layout.iteration_dir(&key(), 1);
    assert_eq!(
        file_names(&iter0),
        vec![
            "clustering-5-2-0.50.csv",
            "col-types-5.csv",
            "data-5-2.arff",
            "data-5.csv",
            "kept_feats-4-2.txt",
            "manifest.json",
        ]
    );
    assert_eq!(
        file_names(&iter1),
        vec![
            "clustering-4-2-0.50.csv",
            "col-types-4.csv",
            "data-4-2.arff",
            "data-4.csv",
            "kept_feats-3-2.txt",
            "manifest.json",
        ]
    );

    let kept0 = io::read_feature_list(&iter0.join("kept_feats-4-2.txt")).unwrap();
    let kept1 = io::read_feature_list(&iter1.join("kept_feats-3-2.txt")).unwrap();
    assert_eq!(kept0.len(), 4);
    assert_eq!(kept1.len(), 3);
    assert!(kept1.iter().all(|name| kept0.contains(name)));

    // iteration 1 ran on exactly the features iteration 0 kept
    let data1 = io::read_dataset(
        &iter1.join("data-4.csv"),
        &iter1.join("col-types-4.csv"),
        DEMO_ID_COLUMN,
    )
    .unwrap();
    assert_eq!(data1.feature_names(), kept0);
    assert_eq!(data1.n_rows(), 5);

    let export = arff::read(&iter1.join("data-4-2.arff")).unwrap();
    assert_eq!(export.relation, "DEMO");
    assert_eq!(
        export.attributes.last().map(|a| a.name.as_str()),
        Some("cluster_id")
    );

    let manifest = ManifestStore::new(&iter1)
        .load()
        .unwrap()
        .expect("manifest present");
    assert!(manifest.is_complete());
    assert_eq!(manifest.next_n_kept_feats, Some(3));
    assert_eq!(manifest.artifacts.len(), ArtifactKind::ALL.len());
}

#[tokio::test]
async fn test_wrong_ranking_length_stops_the_run() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    let controller = mock_controller(
        dir.path(),
        MockClusterer::new(),
        MockRanker::new().returning_count(2),
    );

    let err = controller
        .run(&PipelineRequest::new(key(), 2))
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        SiftError::RankingContractViolation { .. }
    ));
    assert_eq!(err.stage_context(), Some((0, Stage::RankFeatures)));
    assert_eq!(err.exit_code(), 3);
    assert!(!layout.iteration_dir(&key(), 1).exists());
    assert!(!layout.iteration(&key(), 1, 2).data().exists());
}

#[tokio::test]
async fn test_resume_after_partial_iteration() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    mock_controller(dir.path(), MockClusterer::new(), MockRanker::new())
        .run(&PipelineRequest::new(key(), 2))
        .await
        .expect("first run");

    // an interrupted third iteration
    let partial = layout.iteration(&key(), 2, 3);
    fs::create_dir_all(&partial.dir).unwrap();
    fs::write(partial.data(), "PTID,AGE\np1,71\n").unwrap();

    let start = CheckpointLocator::new(layout.clone())
        .locate(&key(), true)
        .unwrap();
    assert_eq!(start.iteration, 2);
    assert_eq!(start.n_kept_feats, Some(3));
    assert_eq!(start.stale, vec![partial.dir.clone()]);

    let clusterer = MockClusterer::new();
    let outcome = mock_controller(dir.path(), clusterer.clone(), MockRanker::new())
        .run(&PipelineRequest::new(key(), 3).with_resume(true))
        .await
        .expect("resume");

    assert_eq!(clusterer.call_count(), 1);
    assert_eq!(outcome.start.iteration, 2);
    assert_eq!(outcome.iterations.len(), 1);
    assert_eq!(outcome.iterations[0].n_kept_feats, 3);
    assert_eq!(outcome.iterations[0].keep, 2);
    assert!(layout.iteration(&key(), 2, 3).kept_feats(2).exists());
}

#[tokio::test]
async fn test_resume_without_checkpoints_fails() {
    let dir = setup();
    let err = mock_controller(dir.path(), MockClusterer::new(), MockRanker::new())
        .run(&PipelineRequest::new(key(), 2).with_resume(true))
        .await
        .unwrap_err();
    assert!(matches!(err, SiftError::InvalidResumeState { .. }));
}

#[tokio::test]
async fn test_slow_clusterer_times_out() {
    let dir = setup();
    let controller = mock_controller(
        dir.path(),
        MockClusterer::new().with_delay(Duration::from_millis(300)),
        MockRanker::new(),
    )
    .with_config(PipelineControllerConfig::default().with_cluster_timeout(Duration::from_millis(20)));

    let err = controller
        .run(&PipelineRequest::new(key(), 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SiftError::CollaboratorTimeout { .. }
    ));
    assert_eq!(err.stage_context(), Some((0, Stage::Cluster)));
}

#[tokio::test]
async fn test_slow_ranker_times_out() {
    let dir = setup();
    let controller = mock_controller(
        dir.path(),
        MockClusterer::new(),
        MockRanker::new().with_delay(Duration::from_secs(5)),
    )
    .with_config(PipelineControllerConfig::default().with_rank_timeout(Duration::from_millis(20)));

    let err = controller
        .run(&PipelineRequest::new(key(), 1))
        .await
        .unwrap_err();
    assert!(matches!(
        err.root_cause(),
        SiftError::CollaboratorTimeout { .. }
    ));
}

#[tokio::test]
async fn test_concurrent_run_is_rejected() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    let _held = ConfigLock::acquire(&layout.config_dir(&key())).expect("acquire lock");

    let err = mock_controller(dir.path(), MockClusterer::new(), MockRanker::new())
        .run(&PipelineRequest::new(key(), 1))
        .await
        .unwrap_err();
    assert!(matches!(err, SiftError::PipelineBusy { .. }));
}

#[tokio::test]
async fn test_kmeans_with_info_gain() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    let controller = PipelineController::new(
        layout.clone(),
        Arc::new(KMeansClusterer::new().with_seed(1)),
        Arc::new(InfoGainRanker::new(3)),
    );

    let outcome = controller
        .run(&PipelineRequest::new(key(), 2))
        .await
        .expect("pipeline run");

    assert_eq!(outcome.iterations.len(), 2);
    for summary in &outcome.iterations {
        assert!(summary.score.is_finite());
        assert!((-1.0..=1.0).contains(&summary.score));
    }

    let locator = CheckpointLocator::new(layout);
    let records = locator.scan(&key()).unwrap();
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|r| r.is_complete()));

    let start = locator.locate(&key(), true).unwrap();
    assert_eq!(start.iteration, 2);
    assert_eq!(start.n_kept_feats, Some(3));
}

#[tokio::test]
async fn test_feature_budget_runs_out_before_ranking() {
    let dir = setup();
    let layout = ArtifactLayout::new(dir.path());
    let ranker = MockRanker::new();
    let controller = mock_controller(dir.path(), MockClusterer::new(), ranker.clone());

    // 5 -> 4 -> 3 -> 2 -> 1 -> 0
    let err = controller
        .run(&PipelineRequest::new(key(), 6))
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        SiftError::FeatureBudgetExhausted { .. }
    ));
    assert_eq!(err.stage_context(), Some((4, Stage::RankFeatures)));
    assert_eq!(ranker.call_count(), 4);
    assert!(!layout.iteration_dir(&key(), 5).exists());
}

#[tokio::test]
async fn test_feature_named_like_cluster_column_is_rejected() {
    let dir = TempDir::new().expect("create temp dir");
    let layout = ArtifactLayout::new(dir.path());
    fs::create_dir_all(layout.dataset_dir("demo", "feats")).unwrap();
    fs::write(
        layout.base_data("demo", "feats"),
        "PTID,cluster_id,A,B,C\np1,x,1,2,3\np2,y,4,5,6\np3,x,7,8,9\np4,y,1,5,9\n",
    )
    .unwrap();
    fs::write(
        layout.base_col_types("demo", "feats"),
        "cluster_id,A,B,C\nnominal,numeric,numeric,numeric\n",
    )
    .unwrap();

    let ranker = MockRanker::new();
    let err = mock_controller(dir.path(), MockClusterer::new(), ranker.clone())
        .run(&PipelineRequest::new(key(), 1))
        .await
        .unwrap_err();

    assert!(matches!(
        err.root_cause(),
        SiftError::ColumnSetMismatch { .. }
    ));
    assert_eq!(err.stage_context(), Some((0, Stage::SelectFeatures)));
    assert_eq!(ranker.call_count(), 0);
    assert!(!layout.iteration(&key(), 0, 4).arff().exists());
}
