//! End-to-end election scenarios driving a full manager against scripted
//! and in-memory lease electors.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{timeout, Instant};

use shardplane_core::{DrainSignal, NamespaceConfig, ShardDistributionConfig};
use shardplane_leader::{LeadershipChange, ManagerConfig, ManagerError, NamespaceManager};
use shardplane_testing::{
    CreateFailure, ElectorScript, InMemoryLeaseStore, ScriptedElectorFactory,
};

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .try_init();
}

fn single_namespace() -> ShardDistributionConfig {
    ShardDistributionConfig::new().with_namespace(NamespaceConfig::new("ns1"))
}

fn fast_manager_config() -> ManagerConfig {
    ManagerConfig {
        retry_backoff_base: Duration::from_millis(10),
        retry_backoff_max: Duration::from_millis(50),
        notification_capacity: 64,
    }
}

/// Polls `condition` until it holds or `deadline` elapses.
async fn eventually(deadline: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

#[tokio::test]
async fn test_happy_path_single_namespace() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        10,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal)
        .with_config(fast_manager_config());
    let mut changes = manager.subscribe();

    manager.start().await.unwrap();

    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);
    assert_eq!(
        changes.recv().await.unwrap(),
        LeadershipChange::Gained {
            namespace: "ns1".to_string()
        }
    );

    timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("stop must return within the cancellation bound")
        .unwrap();

    assert_eq!(factory.create_calls(), 1);
    // Lease release is bounded but asynchronous relative to stop().
    assert!(eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await);
    assert!(!manager.is_leader("ns1"));
}

#[tokio::test]
async fn test_drain_resigns_leadership() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        10,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);

    signal.notify_drain();

    assert!(
        eventually(Duration::from_secs(1), || {
            factory.live_campaigns() == 0 && !manager.is_leader("ns1")
        })
        .await,
        "drain must cancel the elector and take the handler idle"
    );

    // Idle means idle: no elector reconstruction until an undrain.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(factory.create_calls(), 1);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_undrain_reelects() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);

    signal.notify_drain();
    assert!(eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await);

    signal.notify_undrain();

    assert!(
        eventually(Duration::from_secs(1), || {
            factory.create_calls() == 2 && manager.is_leader("ns1")
        })
        .await,
        "undrain must construct a fresh elector and regain leadership"
    );

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_predrained_start_never_constructs_elector() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::hold_open());
    let signal = Arc::new(DrainSignal::new());
    signal.notify_drain();
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(factory.create_calls(), 0);
    assert!(!manager.is_leader("ns1"));

    // The cycle completes as usual once the drain lifts.
    signal.notify_undrain();
    assert!(eventually(Duration::from_secs(1), || factory.create_calls() == 1).await);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_transient_elector_failure_retries_in_place() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    factory.push_script(ElectorScript::close_stream_after(Duration::from_millis(20)));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal)
        .with_config(fast_manager_config());

    manager.start().await.unwrap();

    assert!(
        eventually(Duration::from_secs(2), || {
            factory.create_calls() >= 2 && manager.is_leader("ns1")
        })
        .await,
        "a closed leadership stream must be retried with a fresh elector"
    );
    assert_eq!(factory.live_campaigns(), 1);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_store_outage_at_construction_retries() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    factory.push_script(ElectorScript::fail_create(CreateFailure::StoreUnavailable));
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_config(fast_manager_config());

    manager.start().await.unwrap();

    assert!(
        eventually(Duration::from_secs(2), || {
            factory.create_calls() >= 2 && manager.is_leader("ns1")
        })
        .await,
        "an unreachable store at construction time must be retried"
    );

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_stop_while_idle() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);
    signal.notify_drain();
    assert!(eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await);

    timeout(Duration::from_secs(1), manager.stop())
        .await
        .expect("an idle handler must wake on shutdown")
        .unwrap();
}

#[tokio::test]
async fn test_drain_cycle_round_trip_is_idempotent() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);

    for cycle in 1..=2u32 {
        signal.notify_drain();
        assert!(eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await);

        signal.notify_undrain();
        assert!(
            eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await,
            "cycle {cycle} must end back in the starting state"
        );
    }

    // One construction per campaign: the initial one plus one per undrain.
    assert_eq!(factory.create_calls(), 3);
    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_leadership_flips_never_leave_active() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::replay(vec![
        (Duration::from_millis(5), true),
        (Duration::from_millis(5), false),
        (Duration::from_millis(5), true),
        (Duration::from_millis(5), false),
    ]));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone())
        .with_drain_observer(signal);
    let mut changes = manager.subscribe();

    manager.start().await.unwrap();

    let mut seen = Vec::new();
    for _ in 0..4 {
        seen.push(
            timeout(Duration::from_secs(1), changes.recv())
                .await
                .expect("flip must be published")
                .unwrap()
                .is_gained(),
        );
    }
    assert_eq!(seen, vec![true, false, true, false]);

    // Flips alone never take the handler out of its campaign.
    assert_eq!(factory.create_calls(), 1);
    assert_eq!(factory.live_campaigns(), 1);

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_shared_drain_covers_all_namespaces() {
    init_logging();
    let config = ShardDistributionConfig::new()
        .with_namespace(NamespaceConfig::new("ns-a"))
        .with_namespace(NamespaceConfig::new("ns-b"));
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    let signal = Arc::new(DrainSignal::new());
    let mut manager = NamespaceManager::new(config, factory.clone())
        .with_drain_observer(signal.clone());

    manager.start().await.unwrap();
    assert!(
        eventually(Duration::from_secs(1), || {
            manager.is_leader("ns-a") && manager.is_leader("ns-b")
        })
        .await
    );
    assert_eq!(factory.create_calls(), 2);

    signal.notify_drain();
    assert!(
        eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await,
        "every handler resigns on a shared drain edge"
    );

    signal.notify_undrain();
    assert!(
        eventually(Duration::from_secs(1), || factory.create_calls() == 4).await,
        "every handler reconstructs an elector after the undrain"
    );

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_fatal_create_failure_stops_only_that_handler() {
    init_logging();
    let config = ShardDistributionConfig::new()
        .with_namespace(NamespaceConfig::new("ns-a"))
        .with_namespace(NamespaceConfig::new("ns-b"));
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    factory.push_script(ElectorScript::fail_create(CreateFailure::Config));
    let mut manager = NamespaceManager::new(config, factory.clone());

    manager.start().await.unwrap();

    // Whichever handler drew the poisoned script has exited; the other one
    // campaigns on.
    assert!(
        eventually(Duration::from_secs(1), || {
            factory.create_calls() == 2
                && factory.live_campaigns() == 1
                && (manager.is_leader("ns-a") ^ manager.is_leader("ns-b"))
        })
        .await
    );

    manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_no_observer_disables_drain_handling() {
    init_logging();
    let factory = ScriptedElectorFactory::new(ElectorScript::leader_after(Duration::from_millis(
        5,
    )));
    let mut manager = NamespaceManager::new(single_namespace(), factory.clone());

    manager.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager.is_leader("ns1")).await);
    assert_eq!(factory.live_campaigns(), 1);

    manager.stop().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || factory.live_campaigns() == 0).await);
}

#[tokio::test]
async fn test_duplicate_namespace_aborts_startup() {
    init_logging();
    let config = ShardDistributionConfig::new()
        .with_namespace(NamespaceConfig::new("ns1"))
        .with_namespace(NamespaceConfig::new("ns1"));
    let factory = ScriptedElectorFactory::new(ElectorScript::hold_open());
    let mut manager = NamespaceManager::new(config, factory.clone());

    assert!(matches!(
        manager.start().await,
        Err(ManagerError::DuplicateNamespace { .. })
    ));
    assert_eq!(factory.create_calls(), 0);
    assert!(matches!(manager.stop().await, Err(ManagerError::NotRunning)));
}

#[tokio::test]
async fn test_lease_failover_between_processes() {
    init_logging();
    let store = InMemoryLeaseStore::new();
    let ns = || ShardDistributionConfig::new().with_namespace(NamespaceConfig::new("orders"));

    let factory_a = store.factory();
    let factory_b = store.factory();
    let mut manager_a = NamespaceManager::new(ns(), factory_a.clone());
    let mut manager_b = NamespaceManager::new(ns(), factory_b.clone());

    manager_a.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager_a.is_leader("orders")).await);

    manager_b.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!manager_b.is_leader("orders"));
    assert_eq!(
        store.holder("shardplane/leader/orders"),
        Some(factory_a.node_id())
    );

    // The first process shuts down; its lease releases and the second wins.
    manager_a.stop().await.unwrap();
    assert!(
        eventually(Duration::from_secs(1), || manager_b.is_leader("orders")).await,
        "the standby process must take over once the lease releases"
    );
    assert_eq!(
        store.holder("shardplane/leader/orders"),
        Some(factory_b.node_id())
    );

    manager_b.stop().await.unwrap();
    assert!(
        eventually(Duration::from_secs(1), || {
            store.holder("shardplane/leader/orders").is_none()
        })
        .await
    );
}

#[tokio::test]
async fn test_drain_hands_leadership_to_standby() {
    init_logging();
    let store = InMemoryLeaseStore::new();
    let ns = || ShardDistributionConfig::new().with_namespace(NamespaceConfig::new("orders"));

    let signal_a = Arc::new(DrainSignal::new());
    let mut manager_a = NamespaceManager::new(ns(), store.factory())
        .with_drain_observer(signal_a.clone());
    let mut manager_b = NamespaceManager::new(ns(), store.factory());

    manager_a.start().await.unwrap();
    assert!(eventually(Duration::from_secs(1), || manager_a.is_leader("orders")).await);
    manager_b.start().await.unwrap();

    // Draining the leader resigns its lease; the standby picks it up.
    signal_a.notify_drain();
    assert!(
        eventually(Duration::from_secs(1), || manager_b.is_leader("orders")).await
    );
    assert!(!manager_a.is_leader("orders"));

    manager_a.stop().await.unwrap();
    manager_b.stop().await.unwrap();
}
