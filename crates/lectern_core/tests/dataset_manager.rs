mod common;

use lectern_core::{DatasetManager, LifecyclePhase, ProvisionError, StoreError};
use std::sync::Arc;

fn manager(fixture: &common::Fixture) -> Arc<DatasetManager> {
    Arc::new(DatasetManager::new(
        fixture.config.clone(),
        fixture.bundle.clone(),
    ))
}

#[test]
fn first_references_share_one_controller() {
    let fixture = common::fixture();
    let manager = manager(&fixture);

    let handles = (0..8)
        .map(|_| {
            let manager = Arc::clone(&manager);
            std::thread::spawn(move || manager.dataset("KJV").unwrap())
        })
        .collect::<Vec<_>>();
    let stores = handles
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect::<Vec<_>>();

    assert!(stores.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    assert_eq!(stores[0].phase(), LifecyclePhase::Uninitialized);
}

#[test]
fn unknown_and_malformed_names_are_rejected() {
    let fixture = common::fixture();
    let manager = manager(&fixture);

    assert!(matches!(
        manager.dataset("ESV"),
        Err(StoreError::Provision(ProvisionError::UnknownDataset(_)))
    ));
    assert!(matches!(
        manager.dataset("../KJV"),
        Err(StoreError::InvalidDatasetName(_))
    ));
    assert_eq!(
        manager.available_datasets(),
        vec!["EMPTY", "KJV", "MINI", "RST"]
    );
}

#[tokio::test]
async fn switching_closes_previous_dataset() {
    let fixture = common::fixture();
    let manager = manager(&fixture);
    assert!(matches!(manager.active(), Err(StoreError::NoActiveDataset)));

    let kjv = manager.switch_active("KJV").await.unwrap();
    assert_eq!(manager.active_name().as_deref(), Some("KJV"));
    assert_eq!(kjv.phase(), LifecyclePhase::Ready);

    let again = manager.switch_active("KJV").await.unwrap();
    assert!(Arc::ptr_eq(&kjv, &again));
    assert_eq!(kjv.diagnostics().bootstrap_runs, 1);

    let rst = manager.switch_active("RST").await.unwrap();
    assert_eq!(kjv.phase(), LifecyclePhase::Closed);
    assert_eq!(rst.phase(), LifecyclePhase::Ready);
    assert_eq!(manager.open_datasets(), vec!["RST".to_string()]);
    assert_eq!(
        manager
            .active()
            .unwrap()
            .metadata_value("description")
            .await
            .unwrap()
            .as_deref(),
        Some("Russian Synodal Translation")
    );
}

#[tokio::test]
async fn failed_switch_leaves_no_active_dataset() {
    let fixture = common::fixture();
    let manager = manager(&fixture);
    let kjv = manager.switch_active("KJV").await.unwrap();

    let err = manager.switch_active("EMPTY").await.unwrap_err();

    assert!(matches!(err, StoreError::InitFailed(_)));
    assert_eq!(kjv.phase(), LifecyclePhase::Closed);
    assert!(manager.active_name().is_none());
    assert!(matches!(manager.active(), Err(StoreError::NoActiveDataset)));

    manager.switch_active("KJV").await.unwrap();
    assert_eq!(kjv.phase(), LifecyclePhase::Ready);
}

#[tokio::test]
async fn named_dataset_opens_beside_the_active_one() {
    let fixture = common::fixture();
    let manager = manager(&fixture);
    manager.switch_active("KJV").await.unwrap();

    let prefetched = manager.dataset("MINI").unwrap();
    assert_eq!(prefetched.documents().await.unwrap().len(), 1);

    assert_eq!(
        manager.open_datasets(),
        vec!["KJV".to_string(), "MINI".to_string()]
    );
    assert_eq!(manager.active_name().as_deref(), Some("KJV"));

    manager.close_all().await.unwrap();
    assert!(manager.open_datasets().is_empty());
    assert!(manager.active_name().is_none());
}

#[test]
fn from_config_requires_bundle_section() {
    let fixture = common::fixture();
    assert!(DatasetManager::from_config(fixture.config.clone()).is_err());
}

#[tokio::test]
async fn default_dataset_activates_on_first_use() {
    let fixture = common::fixture();
    let mut config = fixture.config.clone();
    config.default_dataset = Some("RST".to_string());
    let manager = DatasetManager::new(config, fixture.bundle.clone());

    let store = manager.active_or_default().await.unwrap();

    assert_eq!(store.name(), "RST");
    assert_eq!(manager.active_name().as_deref(), Some("RST"));
}

#[tokio::test]
async fn overlapping_switches_leave_one_dataset_open() {
    let fixture = common::fixture();
    let manager = manager(&fixture);

    let (kjv, rst) = tokio::join!(manager.switch_active("KJV"), manager.switch_active("RST"));
    let (kjv, rst) = (kjv.unwrap(), rst.unwrap());

    assert_eq!(manager.active_name().as_deref(), Some("RST"));
    assert_eq!(manager.open_datasets(), vec!["RST".to_string()]);
    assert_eq!(kjv.phase(), LifecyclePhase::Closed);
    assert_eq!(rst.phase(), LifecyclePhase::Ready);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn switches_from_many_tasks_keep_one_dataset_open() {
    let fixture = common::fixture();
    let manager = manager(&fixture);

    let handles = ["KJV", "RST", "MINI", "KJV", "RST", "MINI"]
        .into_iter()
        .map(|name| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.switch_active(name).await.map(|_| ()) })
        })
        .collect::<Vec<_>>();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let active = manager.active_name().unwrap();
    assert_eq!(manager.open_datasets(), vec![active]);
}
