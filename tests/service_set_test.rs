//! 实例集合与注册表测试

use std::collections::HashSet;
use std::sync::Arc;

use flare_discovery::discovery::{ServiceInfo, ServiceRegistry, ServiceSet};

#[test]
fn test_put_is_idempotent() {
    let set = ServiceSet::new();
    let instance = ServiceInfo::new("user", "10.0.0.5", 9000);

    assert!(set.put(instance.clone()));
    assert!(!set.put(instance.clone()), "second put of the same endpoint must report false");
    assert_eq!(set.len(), 1);
}

#[test]
fn test_put_keeps_first_value_for_endpoint() {
    let set = ServiceSet::new();
    assert!(set.put(ServiceInfo::new("user", "10.0.0.5", 9000)));
    assert!(!set.put(ServiceInfo::new("renamed", "10.0.0.5", 9000)));

    assert_eq!(set.list(), vec![ServiceInfo::new("user", "10.0.0.5", 9000)]);
}

#[test]
fn test_remove_absent_is_noop() {
    let set = ServiceSet::new();
    set.put(ServiceInfo::new("user", "10.0.0.5", 9000));

    assert!(!set.remove(&ServiceInfo::new("user", "10.0.0.6", 9000)));
    assert!(set.remove(&ServiceInfo::new("user", "10.0.0.5", 9000)));
    assert!(!set.remove(&ServiceInfo::new("user", "10.0.0.5", 9000)));
    assert!(set.is_empty());
}

#[test]
fn test_membership_is_keyed_by_endpoint() {
    let set = ServiceSet::new();
    set.put(ServiceInfo::new("user", "10.0.0.5", 9000));
    set.put(ServiceInfo::new("user", "10.0.0.5", 9001));
    set.put(ServiceInfo::new("user", "10.0.0.6", 9000));

    assert_eq!(set.len(), 3);
    assert!(set.contains(&ServiceInfo::new("user", "10.0.0.5", 9001)));
}

#[test]
fn test_list_is_a_snapshot() {
    let set = ServiceSet::new();
    set.put(ServiceInfo::new("user", "10.0.0.5", 9000));

    let snapshot = set.list();
    set.put(ServiceInfo::new("user", "10.0.0.6", 9000));
    set.remove(&ServiceInfo::new("user", "10.0.0.5", 9000));

    assert_eq!(snapshot, vec![ServiceInfo::new("user", "10.0.0.5", 9000)]);
    assert_eq!(set.list(), vec![ServiceInfo::new("user", "10.0.0.6", 9000)]);
}

#[test]
fn test_interleaved_disjoint_operations() {
    let set = ServiceSet::new();
    for port in 0..10u16 {
        assert!(set.put(ServiceInfo::new("user", "10.0.0.5", 9000 + port)));
        if port % 2 == 0 {
            assert!(set.remove(&ServiceInfo::new("user", "10.0.0.5", 9000 + port)));
        }
    }

    let mut ports: Vec<u16> = set.list().into_iter().map(|i| i.port).collect();
    ports.sort_unstable();
    assert_eq!(ports, vec![9001, 9003, 9005, 9007, 9009]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_report_single_insert() {
    let set = Arc::new(ServiceSet::new());
    let mut handles = Vec::new();
    for _ in 0..8 {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            (0..100u16)
                .filter(|port| set.put(ServiceInfo::new("user", "10.0.0.5", 9000 + port)))
                .count()
        }));
    }

    let mut inserted = 0;
    for handle in handles {
        inserted += handle.await.expect("task panicked");
    }

    assert_eq!(inserted, 100, "each endpoint must be reported as new exactly once");
    assert_eq!(set.len(), 100);
}

const SHARED_PORTS: u16 = 8;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_put_remove_list_stay_consistent() {
    let set = Arc::new(ServiceSet::new());
    let mut handles = Vec::new();
    for task in 0..8u16 {
        let set = set.clone();
        handles.push(tokio::spawn(async move {
            let mut puts = [0i64; SHARED_PORTS as usize];
            let mut removes = [0i64; SHARED_PORTS as usize];
            for step in 0..1000u16 {
                let slot = (step * 7 + task) % SHARED_PORTS;
                let instance = ServiceInfo::new("user", "10.0.0.5", 9000 + slot);
                match (step + task) % 3 {
                    0 => {
                        if set.put(instance) {
                            puts[slot as usize] += 1;
                        }
                    }
                    1 => {
                        if set.remove(&instance) {
                            removes[slot as usize] += 1;
                        }
                    }
                    _ => {
                        let snapshot = set.list();
                        let endpoints: HashSet<String> =
                            snapshot.iter().map(ServiceInfo::endpoint).collect();
                        assert_eq!(endpoints.len(), snapshot.len(), "duplicate endpoint in list");
                        assert!(snapshot.len() <= SHARED_PORTS as usize);
                    }
                }
                if step % 64 == 0 {
                    tokio::task::yield_now().await;
                }
            }
            (puts, removes)
        }));
    }

    let mut puts = [0i64; SHARED_PORTS as usize];
    let mut removes = [0i64; SHARED_PORTS as usize];
    for handle in handles {
        let (task_puts, task_removes) = handle.await.expect("task panicked");
        for slot in 0..SHARED_PORTS as usize {
            puts[slot] += task_puts[slot];
            removes[slot] += task_removes[slot];
        }
    }

    for slot in 0..SHARED_PORTS {
        let present = set.contains(&ServiceInfo::new("user", "10.0.0.5", 9000 + slot));
        assert_eq!(
            puts[slot as usize] - removes[slot as usize],
            i64::from(present),
            "every reported insert and removal must match a real transition on port {}",
            9000 + slot
        );
    }
}

#[test]
fn test_registry_creates_sets_once() {
    let registry = ServiceRegistry::new();
    assert!(registry.get("user").is_none());

    let first = registry.get_or_create("user");
    first.put(ServiceInfo::new("user", "10.0.0.5", 9000));
    let second = registry.get_or_create("user");

    assert!(Arc::ptr_eq(&first, &second));
    assert!(registry.contains("user"));
    assert_eq!(registry.names(), vec!["user".to_string()]);
    assert_eq!(second.len(), 1);
}
