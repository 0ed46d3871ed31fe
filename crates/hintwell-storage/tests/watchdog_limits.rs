//! Disk-space watchdog behavior: a shard over its hint budget forbids new
//! hints for multi-segment endpoints only, so every destination keeps a
//! minimum one-segment share.

mod common;

use std::time::Duration;

use common::*;
use hintwell_core::EndpointId;

#[tokio::test]
async fn over_budget_shard_forbids_only_multi_segment_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = test_cluster();
    let mut config = fast_config(dir.path());
    // Tiny segments and a tiny budget so a handful of hints overflow it
    config.hint_segment_size = 2 * 1024;
    config.max_shard_disk_space_size = 16 * 1024;

    let hog = EndpointId::new("10.0.0.1:7000");
    let quiet = EndpointId::new("10.0.0.2:7000");
    let manager = start_manager(config.clone(), &cluster).await;

    // Both peers stay DOWN: nothing is replayed, disk only grows.
    for i in 0..30 {
        assert!(manager.store_hint(&hog, mutation_for(i, 1024)).await);
    }
    assert!(manager.store_hint(&quiet, mutation_for(0, 128)).await);

    assert!(
        eventually(Duration::from_secs(5), || manager.size_of_hints_in_progress() == 0).await
    );
    assert!(
        segment_count(&config, &hog) > 1,
        "the hog should have rotated into multiple segments"
    );
    assert_eq!(segment_count(&config, &quiet), 1);

    // Give the watchdog a couple of audit periods
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(
        !manager.store_hint(&hog, mutation_for(99, 1024)).await,
        "hog endpoint should be forbidden while the shard is over budget"
    );
    assert!(
        manager.store_hint(&quiet, mutation_for(1, 128)).await,
        "single-segment endpoint keeps its fair share"
    );

    manager.stop().await;
}

#[tokio::test]
async fn under_budget_shard_allows_everyone() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = test_cluster();
    let config = fast_config(dir.path());
    let peer = EndpointId::new("10.0.0.1:7000");
    let manager = start_manager(config, &cluster).await;

    for i in 0..10 {
        assert!(manager.store_hint(&peer, mutation_for(i, 512)).await);
    }
    tokio::time::sleep(Duration::from_millis(300)).await;

    // Well under the default 1 GiB cap: still hintable after audits
    assert!(manager.store_hint(&peer, mutation_for(10, 512)).await);

    manager.stop().await;
}
