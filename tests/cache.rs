mod helper;

use std::time::Duration;

use git_plugin_updater::plugin::types::PluginDescriptor;

use helper::{FakeClock, FakeSource, create_test_cache};

const TTL: Duration = Duration::from_secs(3600);

fn plugins() -> Vec<PluginDescriptor> {
    vec![
        PluginDescriptor::new("alpha", "1.0.0", Some("https://github.com/acme/alpha")),
        PluginDescriptor::new("beta", "1.0.0", Some("https://github.com/acme/beta")),
        PluginDescriptor::new("local", "1.0.0", None),
    ]
}

#[tokio::test]
async fn fresh_snapshot_is_served_without_fetching() {
    let source = FakeSource::new();
    source.set_release("acme/alpha", "1.1.0");
    source.set_release("acme/beta", "2.0.0");
    let clock = FakeClock::new(1_000_000);
    let cache = create_test_cache(source.clone(), clock.clone());

    let first = cache.get_or_refresh(&plugins(), TTL).await;
    assert_eq!(source.fetch_count(), 2);

    clock.advance(Duration::from_secs(3599));
    let second = cache.get_or_refresh(&plugins(), TTL).await;

    assert_eq!(source.fetch_count(), 2);
    assert_eq!(first, second);
    assert_eq!(
        second.keys().collect::<Vec<_>>(),
        vec!["alpha", "beta"]
    );
}

#[tokio::test]
async fn snapshot_refreshes_once_ttl_has_elapsed() {
    let source = FakeSource::new();
    source.set_release("acme/alpha", "1.1.0");
    source.set_release("acme/beta", "2.0.0");
    let clock = FakeClock::new(1_000_000);
    let cache = create_test_cache(source.clone(), clock.clone());

    cache.get_or_refresh(&plugins(), TTL).await;
    source.set_release("acme/alpha", "1.2.0");

    clock.advance(TTL);
    let records = cache.get_or_refresh(&plugins(), TTL).await;

    assert_eq!(source.fetch_count(), 4);
    assert_eq!(records["alpha"].remote_version, "1.2.0");

    let snapshot = cache.snapshot().unwrap();
    assert_eq!(snapshot.created_at, 1_000_000 + 3_600_000);
}

#[tokio::test]
async fn failing_repository_is_left_out_of_the_snapshot() {
    let source = FakeSource::new();
    source.set_release("acme/alpha", "1.1.0");
    source.set_release("acme/beta", "2.0.0");
    source.fail("acme/beta");
    let clock = FakeClock::new(1_000_000);
    let cache = create_test_cache(source.clone(), clock);

    let records = cache.get_or_refresh(&plugins(), TTL).await;

    assert_eq!(records.len(), 1);
    assert_eq!(records["alpha"].remote_version, "1.1.0");
    assert!(!records.contains_key("beta"));
}

#[tokio::test]
async fn invalidate_forces_refetch_on_next_call() {
    let source = FakeSource::new();
    source.set_release("acme/alpha", "1.1.0");
    source.set_release("acme/beta", "2.0.0");
    let clock = FakeClock::new(1_000_000);
    let cache = create_test_cache(source.clone(), clock.clone());

    cache.get_or_refresh(&plugins(), TTL).await;
    cache.invalidate().unwrap();
    assert!(cache.snapshot().is_none());

    clock.advance(Duration::from_millis(1));
    cache.get_or_refresh(&plugins(), TTL).await;

    assert_eq!(source.fetch_count(), 4);
}
