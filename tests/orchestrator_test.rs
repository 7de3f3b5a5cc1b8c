//! 用模拟站点驱动完整运行

use std::fs;
use std::path::Path;
use std::sync::atomic::Ordering;

use clipcut_automation::config::{Config, UncertaintyPolicy};
use clipcut_automation::models::{ClipStage, ClipStatus, RunMode};
use clipcut_automation::run_with_document;
use clipcut_automation::testing::{clip_site, fast_config, SiteOptions};
use tokio_test::assert_ok;

const VIDEO_A: &str = "https://www.youtube.com/watch?v=aaa";
const VIDEO_B: &str = "https://www.youtube.com/watch?v=bbb";
const VIDEO_C: &str = "https://www.youtube.com/watch?v=ccc";

fn config_with_csv(dir: &Path, rows: &[(&str, &str, &str)]) -> Config {
    let mut config = fast_config(dir);
    let csv = dir.join("clips.csv");
    let mut content = String::from("start,end,url\n");
    for (start, end, url) in rows {
        content.push_str(&format!("{},{},{}\n", start, end, url));
    }
    fs::write(&csv, content).unwrap();
    config.paths.csv_file = csv;
    config
}

#[tokio::test]
async fn one_failed_creation_does_not_stop_its_neighbours() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_csv(
        dir.path(),
        &[
            ("00:00:00", "00:00:10", VIDEO_A),
            ("00:00:20", "00:00:30", VIDEO_A),
            ("00:00:40", "00:00:50", VIDEO_A),
        ],
    );
    let mut options = SiteOptions::new(dir.path());
    options.failing_creations.insert(2);
    let (doc, counters) = clip_site(&config, options);

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(report.aborted.is_none());

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0.index, 3);
    assert_eq!(failed[0].1, Some(ClipStage::AwaitArtifact));

    assert_eq!(counters.creations.load(Ordering::SeqCst), 3);
    assert_eq!(counters.loads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn unclickable_create_button_fails_only_that_clip() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_csv(
        dir.path(),
        &[
            ("00:00:00", "00:00:10", VIDEO_A),
            ("00:00:20", "00:00:30", VIDEO_B),
            ("00:00:40", "00:00:50", VIDEO_C),
        ],
    );
    let mut options = SiteOptions::new(dir.path());
    options.stuck_create_loads.insert(2);
    let (doc, counters) = clip_site(&config, options);

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(report.aborted.is_none());

    let failed: Vec<_> = report.failures().collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].0.index, 3);
    assert_eq!(failed[0].1, Some(ClipStage::Create));

    assert_eq!(counters.creations.load(Ordering::SeqCst), 2);
    assert_eq!(counters.loads.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn every_descriptor_is_attempted_and_each_video_loads_once() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_csv(
        dir.path(),
        &[
            ("00:00:00", "00:00:05", VIDEO_A),
            ("00:01:00", "00:01:05", VIDEO_B),
            ("00:02:00", "00:02:05", VIDEO_A),
        ],
    );
    let (doc, counters) = clip_site(&config, SiteOptions::new(dir.path()));

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert_eq!(report.total_descriptors, 3);
    assert_eq!(report.attempted, 3);
    assert_eq!(report.succeeded, 3, "{:#?}", report.items);
    // 分组后同一视频的片段相邻处理
    let order: Vec<usize> = report.items.iter().map(|i| i.index).collect();
    assert_eq!(order, vec![2, 4, 3]);
    assert_eq!(counters.loads.load(Ordering::SeqCst), 2);

    assert!(config.paths.report_file.exists());
    let written: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&config.paths.report_file).unwrap()).unwrap();
    assert_eq!(written["succeeded"], 3);
}

#[tokio::test]
async fn rejected_rows_are_reported_and_valid_rows_still_run() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_csv(
        dir.path(),
        &[
            ("00:00:00", "00:00:05", VIDEO_A),
            ("00:00:09", "00:00:03", VIDEO_A),
            ("abc", "00:00:03", VIDEO_A),
        ],
    );
    let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert_eq!(report.total_descriptors, 1);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.rejected_rows.len(), 2);
}

#[tokio::test]
async fn rejected_login_aborts_and_skips_everything() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_with_csv(
        dir.path(),
        &[
            ("00:00:00", "00:00:05", VIDEO_A),
            ("00:01:00", "00:01:05", VIDEO_B),
        ],
    );
    let mut options = SiteOptions::new(dir.path());
    options.accept_login = false;
    let (doc, counters) = clip_site(&config, options);

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert!(report.aborted.as_deref().unwrap().contains("Invalid credentials"));
    assert_eq!(report.skipped, 2);
    assert_eq!(report.attempted, 0);
    assert!(report.items.iter().all(|i| i.outcome.status == ClipStatus::Skipped));
    assert_eq!(counters.loads.load(Ordering::SeqCst), 0);
    assert!(config.paths.report_file.exists());
}

#[tokio::test]
async fn silent_login_follows_the_uncertainty_policy() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = config_with_csv(dir.path(), &[("00:00:00", "00:00:05", VIDEO_A)]);
    // 登录后的首页也带登录标记，且没有成功标志，结果只能是未知
    config.site.login_url_markers = vec!["clipscutter".to_string()];
    config.login_uncertainty = UncertaintyPolicy::Abort;
    let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));

    let report = assert_ok!(run_with_document(&config, &doc).await);
    assert!(report.aborted.is_some());
    assert_eq!(report.skipped, 1);

    config.login_uncertainty = UncertaintyPolicy::Continue;
    let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));
    let report = assert_ok!(run_with_document(&config, &doc).await);
    assert!(report.aborted.is_none());
    assert_eq!(report.attempted, 1);
}

#[tokio::test]
async fn download_only_mode_collects_listed_clips() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    config.mode = RunMode::DownloadOnly;
    let mut options = SiteOptions::new(dir.path());
    options.existing_clips = 2;
    let (doc, counters) = clip_site(&config, options);

    let report = assert_ok!(run_with_document(&config, &doc).await);

    assert_eq!(report.mode, RunMode::DownloadOnly);
    assert_eq!(report.total_descriptors, 2);
    assert_eq!(report.succeeded, 2);
    assert_eq!(counters.downloads.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn missing_csv_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = fast_config(dir.path());
    config.paths.csv_file = dir.path().join("nope.csv");
    let (doc, _) = clip_site(&config, SiteOptions::new(dir.path()));

    assert!(run_with_document(&config, &doc).await.is_err());
}
