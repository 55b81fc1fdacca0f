//! Integration tests for the TierflowApi public interface.
//!
//! These run the whole pipeline against the in-memory fabric.

use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tierflow_core::models::{EntityMeta, FileEntry, Share};
use tierflow_core::{
    InMemoryGateway, JobState, ResolveSource, ShareMapping, SyncMode, TierflowApi, TierflowConfig,
    TierflowError,
};

fn test_config(dir: &Path) -> TierflowConfig {
    let mut config = TierflowConfig::default();
    config.catalog.db_path = dir.join("data").join("catalog.db");
    config.jobs.initial_poll_ms = 5;
    config.jobs.max_poll_ms = 20;
    config.monitor.poll_interval_ms = 50;
    config.monitor.use_notifications = false;
    config
}

fn fabric() -> Arc<InMemoryGateway> {
    let gateway = Arc::new(InMemoryGateway::new());
    gateway.add_share(Share {
        meta: EntityMeta::new("s-1", "hub"),
        path: "/hub".into(),
        ..Default::default()
    });
    gateway
}

async fn build(dir: &Path, gateway: Arc<InMemoryGateway>) -> TierflowApi {
    TierflowApi::builder(test_config(dir))
        .with_gateway(gateway)
        .auto_create_dirs(true)
        .build()
        .await
        .unwrap()
}

async fn call(api: &TierflowApi, tool: &str, args: Value) -> Value {
    let call = api.parse_tool(tool, args).unwrap();
    api.execute(call).await
}

#[tokio::test]
async fn test_tag_search_apply_and_complete() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    gateway.script_jobs(1, JobState::Completed);
    let api = build(temp.path(), gateway.clone()).await;

    let mut expected = Vec::new();
    for (i, priority) in ["high", "high", "high", "low"].iter().enumerate() {
        let local = temp.path().join(format!("clip{}.mov", i));
        std::fs::write(&local, format!("frame data {}", i)).unwrap();
        let fabric_path = format!("/hub/clip{}.mov", i);
        let response = call(
            &api,
            "tag_file",
            json!({
                "path": fabric_path,
                "tags": {"priority": priority},
                "local_path": local.display().to_string(),
            }),
        )
        .await;
        assert_eq!(response["success"], true, "{}", response);
        assert_eq!(response["changed"], true);
        if *priority == "high" {
            expected.push(fabric_path);
        }
    }

    let found = call(
        &api,
        "search_files_by_tag",
        json!({"tag_name": "user.priority", "tag_value": "high"}),
    )
    .await;
    assert_eq!(found["success"], true);
    assert_eq!(found["total_count"], 3);
    let mut paths: Vec<String> = found["matching_files"]
        .as_array()
        .unwrap()
        .iter()
        .map(|f| f["path"].as_str().unwrap().to_string())
        .collect();
    paths.sort();
    assert_eq!(paths, expected);

    let applied = call(
        &api,
        "apply_objective_to_files",
        json!({"file_paths": paths, "objective_type": "place_on_tier", "tier_name": "tier0"}),
    )
    .await;
    assert_eq!(applied["success"], true);
    assert_eq!(applied["requested"], 3);
    assert_eq!(applied["accepted"], 3);
    assert_eq!(applied["rejected"], 0);
    assert_eq!(applied["job_ids"].as_array().unwrap().len(), 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let jobs = call(&api, "list_jobs", json!({})).await;
        assert_eq!(jobs["total"], 3);
        let completed = jobs["jobs"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|j| j["state"] == "completed")
            .count();
        if completed == 3 {
            break;
        }
        assert!(tokio::time::Instant::now() < deadline, "jobs never completed: {}", jobs);
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let completed = call(&api, "list_jobs", json!({"status_filter": "completed"})).await;
    assert_eq!(completed["total"], 3);
}

#[tokio::test]
async fn test_retagging_unchanged_file_writes_nothing() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    let api = build(temp.path(), gateway.clone()).await;
    let local = temp.path().join("notes.txt");
    std::fs::write(&local, "same bytes").unwrap();
    let local = local.display().to_string();

    let first = api
        .tag_file("/hub/notes.txt", &Default::default(), Some(&local))
        .await
        .unwrap();
    let writes = gateway.calls(tierflow_core::gateway::GatewayOp::SetTags);
    let second = api
        .tag_file("/hub/notes.txt", &Default::default(), Some(&local))
        .await
        .unwrap();

    assert!(first.changed);
    assert!(!second.changed);
    assert_eq!(gateway.calls(tierflow_core::gateway::GatewayOp::SetTags), writes);
}

#[tokio::test]
async fn test_apply_by_tag_with_no_matches() {
    let temp = TempDir::new().unwrap();
    let api = build(temp.path(), fabric()).await;

    let response = call(
        &api,
        "apply_objective_by_tag",
        json!({
            "tag_name": "user.priority",
            "tag_value": "none",
            "objective_type": "place_on_tier",
            "tier_name": "tier0",
        }),
    )
    .await;

    assert_eq!(response["success"], true);
    assert_eq!(response["requested"], 0);
    assert_eq!(response["accepted"], 0);
    assert_eq!(response["rejected"], 0);
    assert_eq!(response["job_ids"], json!([]));
}

#[tokio::test]
async fn test_backup_restore_round_trip() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    for i in 0..3 {
        let mut file = FileEntry::new(format!("f-{}", i), format!("/hub/scan{}.tif", i));
        file.tags.insert("user.project".into(), "atlas".into());
        gateway.add_file(file);
    }
    let api = build(temp.path(), gateway.clone()).await;

    let report = api.sync_catalog(SyncMode::Full, None).await.unwrap();
    assert!(report.success, "{}", report.message);
    let before = api.catalog().count(None).unwrap();
    assert_eq!(before, 4);

    let backup_path = temp.path().join("backups").join("catalog.bak");
    std::fs::create_dir_all(backup_path.parent().unwrap()).unwrap();
    api.backup_catalog(&backup_path).await.unwrap();

    gateway.remove_file("/hub/scan0.tif");
    gateway.remove_file("/hub/scan1.tif");
    api.sync_catalog(SyncMode::Full, None).await.unwrap();
    assert_eq!(api.catalog().count(None).unwrap(), 2);

    let restored = api.restore_catalog(&backup_path).await.unwrap();
    assert_eq!(restored.total_items, before);

    let found = api
        .search_files_by_tag("user.project", "atlas", ResolveSource::Catalog)
        .await
        .unwrap();
    assert_eq!(found.total_count, 3);
}

#[tokio::test]
async fn test_restore_missing_backup_leaves_catalog_alone() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    gateway.add_file(FileEntry::new("f-1", "/hub/a.bin"));
    let api = build(temp.path(), gateway).await;
    api.sync_catalog(SyncMode::Full, None).await.unwrap();
    let before = api.catalog().count(None).unwrap();

    let err = api
        .restore_catalog(temp.path().join("nope.bak"))
        .await
        .unwrap_err();
    assert!(matches!(err, TierflowError::NotFound { .. }));
    assert_eq!(api.catalog().count(None).unwrap(), before);

    let response = call(&api, "restore_catalog", json!({"path": "/no/such/backup"})).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "not_found");
}

#[tokio::test]
async fn test_build_restores_over_corrupted_catalog() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    for i in 0..2 {
        gateway.add_file(FileEntry::new(format!("f-{}", i), format!("/hub/reel{}.mxf", i)));
    }
    let api = build(temp.path(), gateway.clone()).await;
    api.sync_catalog(SyncMode::Full, None).await.unwrap();
    let backup_path = temp.path().join("catalog.bak");
    api.backup_catalog(&backup_path).await.unwrap();
    api.shutdown().await;
    drop(api);

    let broken = TempDir::new().unwrap();
    let config = test_config(broken.path());
    std::fs::create_dir_all(config.catalog.db_path.parent().unwrap()).unwrap();
    std::fs::write(&config.catalog.db_path, vec![0x42u8; 8192]).unwrap();

    let result = TierflowApi::builder(config.clone())
        .with_gateway(gateway.clone())
        .build()
        .await;
    assert!(result.is_err());

    let api = TierflowApi::builder(config)
        .with_gateway(gateway)
        .restore_from(&backup_path)
        .build()
        .await
        .unwrap();
    assert_eq!(api.catalog().count(None).unwrap(), 3);

    let response = call(&api, "get_catalog_health", json!({})).await;
    assert_eq!(response["success"], true, "{}", response);
}

#[tokio::test]
async fn test_search_after_tagging_synced_files() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    for i in 0..4 {
        gateway.add_file(FileEntry::new(format!("f-{}", i), format!("/hub/take{}.wav", i)));
    }
    let api = build(temp.path(), gateway).await;
    let report = api.sync_catalog(SyncMode::Full, None).await.unwrap();
    assert!(report.success, "{}", report.message);

    for i in 0..3 {
        let response = call(
            &api,
            "tag_file",
            json!({"path": format!("/hub/take{}.wav", i), "tags": {"priority": "high"}}),
        )
        .await;
        assert_eq!(response["success"], true, "{}", response);
    }

    let found = api
        .search_files_by_tag("user.priority", "high", ResolveSource::Auto)
        .await
        .unwrap();
    assert_eq!(found.total_count, 3);
    assert_eq!(found.source, ResolveSource::Live);
}

fn file_changed(uuid: &str, path: &str, minutes_ago: i64) -> FileEntry {
    let mut file = FileEntry::new(uuid, path);
    file.meta.modified = Some((chrono::Utc::now() - chrono::Duration::minutes(minutes_ago)).to_rfc3339());
    file
}

#[tokio::test]
async fn test_ingest_new_files_then_check_alignment() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    gateway.add_file(file_changed("f-1", "/hub/in/new1.raw", 5));
    gateway.add_file(file_changed("f-2", "/hub/in/deep/new2.raw", 10));
    gateway.add_file(file_changed("f-3", "/hub/in/old.raw", 180));
    gateway.add_file(file_changed("f-4", "/hub/elsewhere/new3.raw", 1));
    let api = build(temp.path(), gateway).await;

    let ingested = call(
        &api,
        "ingest_new_files",
        json!({"path": "/hub/in", "tag_name": "user.batch", "tag_value": "b-7", "age_minutes": 30}),
    )
    .await;
    assert_eq!(ingested["success"], true, "{}", ingested);
    assert_eq!(ingested["files_found"], 2);
    assert_eq!(ingested["files_tagged"], 2);
    assert_eq!(ingested["time_type"], "mtime");
    assert_eq!(ingested["placement"]["accepted"], 2);

    let tags = call(&api, "get_file_tags", json!({"path": "/hub/in/deep/new2.raw"})).await;
    assert_eq!(tags["tags"]["user.batch"], "b-7");
    let tags = call(&api, "get_file_tags", json!({"path": "/hub/in/old.raw"})).await;
    assert!(tags["tags"].get("user.batch").is_none());

    let aligned = call(
        &api,
        "check_file_alignment",
        json!({"file_path": "/hub/in/new1.raw", "objective_type": "place_on_tier", "tier_name": "tier1"}),
    )
    .await;
    assert_eq!(aligned["success"], true, "{}", aligned);
    assert_eq!(aligned["aligned"], true);
    assert_eq!(aligned["objectives"].as_array().unwrap().len(), 1);

    let misaligned = call(
        &api,
        "check_file_alignment",
        json!({"file_path": "/hub/in/old.raw", "objective_type": "place_on_tier", "tier_name": "tier1"}),
    )
    .await;
    assert_eq!(misaligned["aligned"], false);

    let nothing_new = call(
        &api,
        "ingest_new_files",
        json!({"path": "/hub/in", "tag_name": "user.batch", "tag_value": "b-8", "age_minutes": 0, "use_mtime": false}),
    )
    .await;
    assert_eq!(nothing_new["success"], true);
    assert_eq!(nothing_new["files_found"], 0);
    assert!(nothing_new["placement"].is_null());
}

#[tokio::test]
async fn test_ingest_rejects_tier_objective_without_tier() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    gateway.add_file(file_changed("f-1", "/hub/in/new1.raw", 5));
    let api = build(temp.path(), gateway).await;

    let response = call(
        &api,
        "ingest_new_files",
        json!({"path": "/hub/in", "tag_name": "batch", "tag_value": "b-9", "tier_name": null}),
    )
    .await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "invalid_params");

    let tags = call(&api, "get_file_tags", json!({"path": "/hub/in/new1.raw"})).await;
    assert!(tags["tags"].get("user.batch").is_none());
}

#[tokio::test]
async fn test_tag_directory_recursive_then_search() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    for path in ["/hub/models/a.bin", "/hub/models/v2/b.bin", "/hub/models/v2/c.bin", "/hub/notes.txt"] {
        gateway.add_file(FileEntry::new(format!("f-{}", path), path));
    }
    let api = build(temp.path(), gateway).await;
    call(&api, "tag_file", json!({"path": "/hub/models/a.bin", "tags": {"modelsetid": "gtc-2"}})).await;

    let report = call(
        &api,
        "tag_directory_recursive",
        json!({"path": "/hub/models", "tag_name": "modelsetid", "tag_value": "gtc-2"}),
    )
    .await;
    assert_eq!(report["success"], true, "{}", report);
    assert_eq!(report["files_found"], 3);
    assert_eq!(report["tagged"], 2);
    assert_eq!(report["unchanged"], 1);
    assert_eq!(report["failures"], json!([]));

    let found = api
        .search_files_by_tag("user.modelsetid", "gtc-2", ResolveSource::Auto)
        .await
        .unwrap();
    assert_eq!(found.total_count, 3);
}

#[tokio::test]
async fn test_incremental_sync_reports_degraded_full_sync() {
    let temp = TempDir::new().unwrap();
    let api = build(temp.path(), fabric()).await;

    let response = call(
        &api,
        "sync_catalog",
        json!({"mode": "incremental", "since": "2026-01-01T00:00:00Z"}),
    )
    .await;
    assert_eq!(response["success"], true, "{}", response);
    assert_eq!(response["degraded_to_full"], true);

    let response = call(&api, "sync_catalog", json!({"mode": "incremental"})).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "invalid_params");
}

#[tokio::test]
async fn test_monitor_tags_share_and_records_events() {
    let temp = TempDir::new().unwrap();
    let share_dir = temp.path().join("share");
    std::fs::create_dir_all(&share_dir).unwrap();
    std::fs::write(share_dir.join("a.csv"), "x,y\n1,2\n").unwrap();
    std::fs::write(share_dir.join("b.json"), "{}").unwrap();

    let gateway = fabric();
    let mut config = test_config(temp.path());
    config.monitor.shares = vec![ShareMapping::new(&share_dir, "/hub")];
    let api = TierflowApi::builder(config)
        .with_gateway(gateway.clone())
        .auto_create_dirs(true)
        .build()
        .await
        .unwrap();

    assert!(api.start_background().await);
    assert!(!api.start_background().await);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while api.get_file_ingest_events(10).total < 2 {
        assert!(tokio::time::Instant::now() < deadline, "monitor never tagged the share");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    api.shutdown().await;

    let file = gateway.file("/hub/a.csv").unwrap();
    assert_eq!(file.tags.get("user.mime_type").map(String::as_str), Some("text/csv"));

    let status = call(&api, "get_file_monitor_status", json!({})).await;
    assert_eq!(status["monitors"][0]["state"], "stopped");
    assert_eq!(status["running"], false);

    let system = call(&api, "get_system_status", json!({})).await;
    assert_eq!(system["success"], true);
    assert_eq!(system["version"], tierflow_core::VERSION);
    assert_eq!(system["gateway"]["endpoint"], "in-memory fabric");
    assert!(system["catalog"]["total_items"].as_u64().is_some());
    assert_eq!(system["jobs"]["total"], 0);
}

#[tokio::test]
async fn test_build_requires_fabric_without_gateway() {
    let temp = TempDir::new().unwrap();
    let err = TierflowApi::builder(test_config(temp.path()))
        .auto_create_dirs(true)
        .build()
        .await
        .err()
        .unwrap();
    assert!(matches!(err, TierflowError::Config { .. }));
}

#[tokio::test]
async fn test_build_without_auto_create_needs_directories() {
    let temp = TempDir::new().unwrap();
    let result = TierflowApi::builder(test_config(temp.path()))
        .with_gateway(fabric())
        .build()
        .await;
    assert!(matches!(result, Err(TierflowError::Config { .. })));
}

#[tokio::test]
async fn test_wait_for_job_timeout_keeps_job() {
    let temp = TempDir::new().unwrap();
    let gateway = fabric();
    gateway.script_jobs(1_000_000, JobState::Completed);
    let api = build(temp.path(), gateway).await;
    let batch = api
        .apply_objective_to_files(&["/hub/big.iso".to_string()], "place_on_tier", Some("tier1".into()))
        .await
        .unwrap();
    let job = &batch.job_ids[0];

    let response = call(&api, "wait_for_job", json!({"job_id": job, "timeout_secs": 0})).await;
    assert_eq!(response["success"], false);
    assert_eq!(response["error_kind"], "timeout");
    assert!(api.tracker().is_tracked(job));
}
