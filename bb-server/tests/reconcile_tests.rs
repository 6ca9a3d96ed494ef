//! Integration tests for image/run reconciliation
//!
//! Drives the engine directly against a temp-file catalog with a notifier
//! that records what it was asked to publish.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bb_common::db::init::init_database;
use bb_common::db::{Image, JsonMap};
use bb_common::{time, Error};
use bb_server::db::images::{self, ImageMetadata, NewImage};
use bb_server::db::labs::{self, NewLab};
use bb_server::db::runs::{self, NewRun};
use bb_server::notify::{Notification, Notifier};
use bb_server::reconcile::{CaptureBatch, Reconciler};
use chrono::{DateTime, NaiveDate, TimeDelta, TimeZone, Utc};
use sqlx::SqlitePool;
use tempfile::TempDir;

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, notification: Notification) {
        self.sent.lock().unwrap().push(notification);
    }
}

struct Fixture {
    _dir: TempDir,
    pool: SqlitePool,
    notifier: Arc<RecordingNotifier>,
    engine: Arc<Reconciler>,
    lab_id: i64,
}

async fn setup() -> Fixture {
    let dir = TempDir::new().unwrap();
    let pool = init_database(&dir.path().join("breadboard.db")).await.unwrap();
    let lab = labs::insert(
        &pool,
        &NewLab {
            name: "bec1".to_string(),
            created: time::now(),
            info: None,
            photo: None,
        },
    )
    .await
    .unwrap();

    let notifier = Arc::new(RecordingNotifier::default());
    let engine = Reconciler::new(pool.clone(), notifier.clone(), Duration::from_secs(7)).unwrap();
    Fixture {
        _dir: dir,
        pool,
        notifier,
        engine: Arc::new(engine),
        lab_id: lab.id,
    }
}

fn ts(s: &str) -> DateTime<Utc> {
    time::parse_timestamp(s).unwrap()
}

async fn add_run(fx: &Fixture, runtime: DateTime<Utc>) -> i64 {
    add_run_for(&fx.pool, fx.lab_id, runtime).await
}

async fn add_run_for(pool: &SqlitePool, lab_id: i64, runtime: DateTime<Utc>) -> i64 {
    runs::insert(
        pool,
        &NewRun {
            created: runtime,
            runtime,
            workday: None,
            parameters: JsonMap::new(),
            bad_shot: false,
            notes: String::new(),
            lab: Some(lab_id),
            dataset: None,
        },
    )
    .await
    .unwrap()
    .id
}

fn batch(names: &[&str], created: &[DateTime<Utc>], force_match: bool) -> CaptureBatch {
    CaptureBatch {
        lab: "bec1".to_string(),
        names: names.iter().map(|s| s.to_string()).collect(),
        created: created.to_vec(),
        force_match,
        metadata: ImageMetadata::default(),
    }
}

async fn image_count(pool: &SqlitePool) -> i64 {
    images::count(pool).await.unwrap()
}

#[tokio::test]
async fn test_creates_one_image_per_name() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let outcome = fx
        .engine
        .reconcile(&batch(&["shot_A", "shot_B"], &[t, t + TimeDelta::seconds(20)], false))
        .await
        .unwrap();

    let names: Vec<&str> = outcome.images.iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["shot_A", "shot_B"]);
    assert_eq!(outcome.created, 2);
    assert_eq!(image_count(&fx.pool).await, 2);

    let sent = fx.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|n| n.lab == "bec1"));
    assert_eq!(sent[0].message, "shot_A");
}

#[tokio::test]
async fn test_resubmission_creates_nothing() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let first = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();
    let second = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(second.created, 0);
    assert_eq!(first.images[0].id, second.images[0].id);
    assert_eq!(image_count(&fx.pool).await, 1);
    assert_eq!(fx.notifier.sent().len(), 1);
}

#[tokio::test]
async fn test_run_at_tolerance_edge_is_linked() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let run_id = add_run(&fx, t + TimeDelta::seconds(7)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images[0].run_id, Some(run_id));
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_run_beyond_tolerance_is_not_linked() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    add_run(&fx, t - TimeDelta::seconds(8)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images.len(), 1);
    assert_eq!(outcome.images[0].run_id, None);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("no run"));
}

#[tokio::test]
async fn test_run_before_capture_at_tolerance_edge_is_linked() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let run_id = add_run(&fx, t - TimeDelta::seconds(7)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images[0].run_id, Some(run_id));
    assert!(outcome.warnings.is_empty());
}

#[tokio::test]
async fn test_run_after_capture_beyond_tolerance_is_not_linked() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    add_run(&fx, t + TimeDelta::seconds(8)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images[0].run_id, None);
    assert!(outcome.warnings[0].contains("no run"));
}

#[tokio::test]
async fn test_run_of_other_lab_is_not_linked() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let other = labs::insert(
        &fx.pool,
        &NewLab {
            name: "fermi1".to_string(),
            created: time::now(),
            info: None,
            photo: None,
        },
    )
    .await
    .unwrap();
    add_run_for(&fx.pool, other.id, t + TimeDelta::seconds(1)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.images[0].run_id, None);
    assert!(outcome.warnings[0].contains("no run"));

    // Once the lab has its own run, that one is picked
    let own = add_run(&fx, t + TimeDelta::seconds(2)).await;
    let forced = fx.engine.reconcile(&batch(&["shot_A"], &[t], true)).await.unwrap();
    assert_eq!(forced.images[0].run_id, Some(own));
    assert!(forced.warnings.is_empty());
}

#[tokio::test]
async fn test_several_runs_link_earliest() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    add_run(&fx, t + TimeDelta::seconds(3)).await;
    let earliest = add_run(&fx, t - TimeDelta::seconds(5)).await;

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images[0].run_id, Some(earliest));
    assert!(outcome.warnings[0].contains(&format!("linked run {}", earliest)));
}

#[tokio::test]
async fn test_force_match_links_late_run() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();
    let run_id = add_run(&fx, t + TimeDelta::seconds(1)).await;

    // Fully cataloged batch without force_match is a pure read
    let plain = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();
    assert_eq!(plain.images[0].run_id, None);

    let forced = fx.engine.reconcile(&batch(&["shot_A"], &[t], true)).await.unwrap();
    assert_eq!(forced.images[0].run_id, Some(run_id));
    assert_eq!(forced.created, 0);
}

#[tokio::test]
async fn test_duplicates_collapse_to_lowest_id() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let mut ids = Vec::new();
    for _ in 0..2 {
        let image: Image = images::insert(
            &fx.pool,
            &NewImage::captured("shot_A", t, fx.lab_id, ImageMetadata::default()),
        )
        .await
        .unwrap();
        ids.push(image.id);
    }

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.images[0].id, ids[0]);
    assert!(outcome
        .warnings
        .iter()
        .any(|w| w.contains("duplicate") && w.contains(&ids[1].to_string())));
    // Nothing is deleted
    assert_eq!(image_count(&fx.pool).await, 2);
}

#[tokio::test]
async fn test_unknown_lab_is_not_found() {
    let fx = setup().await;
    let mut request = batch(&["shot_A"], &[ts("2019-03-04T15:10:06Z")], false);
    request.lab = "fermi9".to_string();

    let result = fx.engine.reconcile(&request).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(image_count(&fx.pool).await, 0);
}

#[tokio::test]
async fn test_example_upload_links_per_timestamp() {
    let fx = setup().await;
    let a = ts("2019-03-04T15:10:06Z");
    let b = ts("2019-03-04T15:12:40Z");
    let run_id = add_run(&fx, ts("2019-03-04T15:10:04Z")).await;

    let outcome = fx
        .engine
        .reconcile(&batch(&["shot_A", "shot_B"], &[a, b], false))
        .await
        .unwrap();

    assert_eq!(outcome.created, 2);
    assert_eq!(outcome.images[0].run_id, Some(run_id));
    assert_eq!(outcome.images[1].run_id, None);
    assert_eq!(outcome.warnings.len(), 1);
}

#[tokio::test]
async fn test_concurrent_uploads_create_once() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    let request = batch(&["shot_A"], &[t], false);

    let (first, second) = tokio::join!(
        fx.engine.reconcile(&request),
        fx.engine.reconcile(&request)
    );

    assert_eq!(first.unwrap().images[0].id, second.unwrap().images[0].id);
    assert_eq!(image_count(&fx.pool).await, 1);
}

#[tokio::test]
async fn test_unstorable_capture_time_is_rejected_per_item() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    fx.engine.reconcile(&batch(&["good"], &[t], false)).await.unwrap();

    let far = Utc.from_utc_datetime(
        &NaiveDate::from_ymd_opt(262142, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
    );
    let outcome = fx.engine.reconcile(&batch(&["bad"], &[far], false)).await.unwrap();

    assert!(outcome.images.is_empty());
    assert_eq!(outcome.created, 0);
    assert!(outcome.warnings[0].contains("'bad'"));
    assert_eq!(image_count(&fx.pool).await, 1);

    // The lab stays readable and a retry of the good capture still resolves
    let listed = images::list_for_lab(&fx.pool, fx.lab_id).await.unwrap();
    assert_eq!(listed.len(), 1);
    let retry = fx.engine.reconcile(&batch(&["good"], &[t], false)).await.unwrap();
    assert_eq!(retry.images[0].id, listed[0].id);
}

#[tokio::test]
async fn test_failed_run_lookup_keeps_new_image() {
    let fx = setup().await;
    let t = ts("2019-03-04T15:10:06Z");
    // Run lookup now fails with "no such table"
    sqlx::query("ALTER TABLE runs RENAME TO runs_archived")
        .execute(&fx.pool)
        .await
        .unwrap();

    let outcome = fx.engine.reconcile(&batch(&["shot_A"], &[t], false)).await.unwrap();

    assert_eq!(outcome.created, 1);
    assert_eq!(outcome.images.len(), 1);
    assert_eq!(outcome.images[0].name, "shot_A");
    assert_eq!(outcome.images[0].run_id, None);
    assert_eq!(outcome.warnings.len(), 1);
    assert!(outcome.warnings[0].contains("kept without a run"));
    assert_eq!(fx.notifier.sent().len(), 1);
    assert_eq!(image_count(&fx.pool).await, 1);
}
