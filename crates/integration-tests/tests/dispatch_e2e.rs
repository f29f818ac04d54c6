//! End-to-end dispatch over the SQLite store and catalog
//!
//! One daemon session drives each scenario; the store is the real one.

mod common;

use std::sync::Arc;

use common::*;
use sendflow_core::application::RunOutcome;
use sendflow_core::domain::JobStatus;
use sendflow_core::error::AppError;
use sendflow_core::port::messaging_gateway::mocks::MockGateway;
use sendflow_core::port::JobRecordStore;

#[tokio::test]
async fn test_three_by_two_completes_in_item_major_order() {
    let pool = open_pool(None).await;
    let catalog = seed_catalog(&pool).await;
    let gateway = Arc::new(MockGateway::new());
    let service = service(&pool, catalog, gateway.clone());

    let job_id = service.start(three_by_two()).await.unwrap();
    let outcome = service.wait(&job_id).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(outcome.summary().sent_count, 6);
    assert_eq!(outcome.summary().error_count, 0);

    let pairs = gateway.sent_pairs();
    assert_eq!(
        pairs,
        vec![
            ("Runner 49.90".to_string(), "g1".to_string()),
            ("Runner 49.90".to_string(), "g2".to_string()),
            ("Tote 19.00".to_string(), "g1".to_string()),
            ("Tote 19.00".to_string(), "g2".to_string()),
            ("Cap 9.50".to_string(), "g1".to_string()),
            ("Cap 9.50".to_string(), "g2".to_string()),
        ]
    );
    assert_eq!(gateway.calls()[0].image_ref.as_deref(), Some("img/shoe.png"));
    assert!(gateway.calls()[2].image_ref.is_none());

    let record = job_store(&pool).read(&job_id).await.unwrap();
    assert_eq!(record.status, JobStatus::Completed);
    assert_eq!(record.processed_units, 6);
    assert_eq!(record.total_units, 6);
    assert!(!record.checkpoint.is_waiting);

    println!("✅ 3x2 broadcast delivered in item-major order");
}

#[tokio::test]
async fn test_failing_destination_still_completes() {
    let pool = open_pool(None).await;
    let catalog = seed_catalog(&pool).await;
    let gateway = Arc::new(MockGateway::new());
    gateway.fail_destination("g2");
    let service = service(&pool, catalog, gateway.clone());

    let job_id = service.start(three_by_two()).await.unwrap();
    let outcome = service.wait(&job_id).await.unwrap();

    assert!(matches!(outcome, RunOutcome::Completed(_)));
    assert_eq!(gateway.call_count(), 6);

    let progress = service.progress(&job_id).await.unwrap();
    assert_eq!(progress.status, JobStatus::Completed);
    assert_eq!(progress.sent_count, 3);
    assert_eq!(progress.error_count, 3);
    assert_eq!(
        progress.sent_count + progress.error_count,
        progress.processed_units
    );
}

#[tokio::test]
async fn test_rejected_starts_leave_no_record() {
    let pool = open_pool(None).await;
    let catalog = seed_catalog(&pool).await;
    let store = job_store(&pool);

    let offline = service(&pool, catalog.clone(), Arc::new(MockGateway::new_unavailable()));
    let err = offline.start(three_by_two()).await.unwrap_err();
    assert!(matches!(err, AppError::GatewayUnavailable(_)));

    let online = service(&pool, catalog, Arc::new(MockGateway::new()));
    let mut unknown = three_by_two();
    unknown.item_ids.push("ghost".into());
    let err = online.start(unknown).await.unwrap_err();
    assert!(matches!(err, AppError::Unresolvable(_)));

    let mut duplicated = three_by_two();
    duplicated.destination_ids.push("g1".into());
    let err = online.start(duplicated).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    assert!(store
        .find_active(online.job_type())
        .await
        .unwrap()
        .is_none());
    for status in JobStatus::ALL {
        assert!(store
            .list_by_status(online.job_type(), status)
            .await
            .unwrap()
            .is_empty());
    }
}

#[tokio::test]
async fn test_item_deleted_before_resume_cancels_job() {
    let path = temp_db_path("deleted_item");
    let pool = open_pool(Some(&path)).await;
    let catalog = seed_catalog(&pool).await;
    let store = job_store(&pool);

    // A paused job left behind by an earlier session
    let service = service(&pool, catalog.clone(), Arc::new(MockGateway::new()));
    let payload = three_by_two().into_payload();
    let job_id = store
        .create(service.job_type(), &payload, payload.total_units())
        .await
        .unwrap();
    store.set_status(&job_id, JobStatus::Running).await.unwrap();
    store.set_status(&job_id, JobStatus::Paused).await.unwrap();

    catalog.delete_item("bag").await.unwrap();

    let err = service.resume(&job_id).await.unwrap_err();
    assert!(matches!(err, AppError::Unresolvable(_)));
    assert_eq!(
        store.read(&job_id).await.unwrap().status,
        JobStatus::Cancelled
    );

    pool.close().await;
    let _ = std::fs::remove_file(&path);
}
