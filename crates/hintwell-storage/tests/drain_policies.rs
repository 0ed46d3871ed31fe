//! Drain-by-discard policies: hints for a decommissioned destination and
//! hints older than their table's grace period are dropped, never sent, and
//! their segments are still cleaned up.

mod common;

use std::time::Duration;

use common::*;
use hintwell_core::EndpointId;
use hintwell_storage::EndpointState;

#[tokio::test]
async fn decommissioned_destination_drains_by_discard() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = test_cluster();
    let config = fast_config(dir.path());
    let peer = EndpointId::new("10.0.0.1:7000");
    cluster.topology.set_default_owners(vec![peer.clone()]);

    let manager = start_manager(config.clone(), &cluster).await;

    for i in 0..20 {
        assert!(manager.store_hint(&peer, mutation_for(i, 256)).await);
    }
    assert!(
        eventually(Duration::from_secs(5), || manager.size_of_hints_in_progress() == 0).await
    );

    // The peer leaves the ring while still unreachable
    cluster.gossiper.set_state(&peer, EndpointState::Left);

    assert!(
        eventually(Duration::from_secs(5), || manager.stats().dropped == 20).await,
        "hints for a decommissioned peer must drain by discard: {:?}",
        manager.stats()
    );
    assert_eq!(manager.stats().sent, 0);
    assert_eq!(cluster.proxy.delivered(), 0, "nothing may reach the send path");
    assert!(
        eventually(Duration::from_secs(5), || segment_count(&config, &peer) == 0).await,
        "drained segments must be deleted"
    );

    manager.stop().await;
}

#[tokio::test]
async fn grace_expired_hints_are_dropped_without_sending() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = test_cluster();
    let config = fast_config(dir.path());
    let peer = EndpointId::new("10.0.0.1:7000");
    cluster.topology.set_default_owners(vec![peer.clone()]);
    cluster.catalog.set_default_grace(Duration::ZERO);

    let manager = start_manager(config.clone(), &cluster).await;

    for i in 0..20 {
        assert!(manager.store_hint(&peer, mutation_for(i, 256)).await);
    }
    assert!(
        eventually(Duration::from_secs(5), || manager.stats().written == 20).await
    );

    // Let the segment age past the (zero) grace period before the peer
    // revives; coarse filesystem mtimes make a generous margin necessary.
    tokio::time::sleep(Duration::from_millis(1600)).await;
    cluster.gossiper.set_alive(&peer, true);

    assert!(
        eventually(Duration::from_secs(5), || manager.stats().dropped == 20).await,
        "expired hints must be dropped: {:?}",
        manager.stats()
    );
    assert_eq!(manager.stats().sent, 0);
    assert_eq!(cluster.proxy.delivered(), 0);
    assert!(
        eventually(Duration::from_secs(5), || segment_count(&config, &peer) == 0).await
    );

    manager.stop().await;
}

#[tokio::test]
async fn fresh_hints_survive_a_long_grace_period() {
    let dir = tempfile::tempdir().unwrap();
    let cluster = test_cluster();
    let config = fast_config(dir.path());
    let peer = EndpointId::new("10.0.0.1:7000");
    cluster.topology.set_default_owners(vec![peer.clone()]);
    cluster.catalog.set_grace("ks.events", Duration::from_secs(3600));

    let manager = start_manager(config, &cluster).await;

    for i in 0..10 {
        assert!(manager.store_hint(&peer, mutation_for(i, 256)).await);
    }
    cluster.gossiper.set_alive(&peer, true);

    assert!(eventually(Duration::from_secs(5), || manager.stats().sent == 10).await);
    assert_eq!(manager.stats().dropped, 0);

    manager.stop().await;
}
