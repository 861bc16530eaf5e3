// std
use std::sync::{
	Arc,
	atomic::{AtomicUsize, Ordering},
};
// crates.io
use time::{Duration, macros};
// self
use credential_coordinator::{
	auth::ShopId,
	clock::ManualClock,
	error::{Error, Result},
	snapshot::{RecencyCache, RecencyCacheConfig, SnapshotQuery},
};

#[derive(Debug, PartialEq, Eq)]
struct OrdersPage {
	rows: Vec<String>,
}

fn query(page: u32) -> SnapshotQuery {
	let shop = ShopId::new("alpha.test").expect("Shop fixture should be valid.");
	let query = SnapshotQuery::new(25).store(shop).filter("status", "open");

	if page == 0 { query } else { query.with_cursor(format!("page-{page}")) }
}

async fn fetch_page(calls: &AtomicUsize, page: u32) -> Result<OrdersPage> {
	calls.fetch_add(1, Ordering::SeqCst);

	Ok(OrdersPage { rows: vec![format!("order-{page}")] })
}

#[tokio::test]
async fn evicted_snapshots_are_fetched_again() {
	let clock = ManualClock::new(macros::datetime!(2025-06-01 12:00 UTC));
	let cache = RecencyCache::new(Arc::new(clock.clone()));
	let calls = AtomicUsize::new(0);

	for page in 0..6 {
		let fingerprint = query(page).fingerprint().expect("Query should fingerprint.");

		cache
			.get_or_fetch(fingerprint, || fetch_page(&calls, page))
			.await
			.expect("Fetching a page should succeed.");
		clock.advance(Duration::seconds(1));
	}

	assert_eq!(cache.len(), 5);
	assert_eq!(calls.load(Ordering::SeqCst), 6);

	// Still cached: no fetch.
	let latest = query(5).fingerprint().expect("Query should fingerprint.");
	let hit = cache
		.get_or_fetch(latest, || fetch_page(&calls, 5))
		.await
		.expect("Cached page should be returned.");

	assert_eq!(hit.snapshot.rows, vec!["order-5".to_owned()]);
	assert_eq!(calls.load(Ordering::SeqCst), 6);

	// The first page was evicted and is fetched again, evicting the next-oldest.
	let first = query(0).fingerprint().expect("Query should fingerprint.");

	assert!(cache.get(&first).is_none());

	cache
		.get_or_fetch(first.clone(), || fetch_page(&calls, 0))
		.await
		.expect("Refetching an evicted page should succeed.");

	assert_eq!(calls.load(Ordering::SeqCst), 7);
	assert!(cache.get(&first).is_some());
	assert!(cache.get(&query(1).fingerprint().expect("Query should fingerprint.")).is_none());
}

#[tokio::test]
async fn fetch_errors_are_not_cached() {
	let cache = RecencyCache::<OrdersPage>::with_config(
		Arc::new(ManualClock::default()),
		RecencyCacheConfig::default().with_capacity(2),
	);
	let fingerprint = query(0).fingerprint().expect("Query should fingerprint.");
	let err = cache
		.get_or_fetch(fingerprint.clone(), || async { Err(Error::Unavailable) })
		.await
		.expect_err("Fetch failures must surface.");

	assert!(matches!(err, Error::Unavailable));
	assert!(cache.is_empty());
}

#[test]
fn remove_and_clear_drop_entries() {
	let cache = RecencyCache::new(Arc::new(ManualClock::default()));
	let a = query(0).fingerprint().expect("Query should fingerprint.");
	let b = query(1).fingerprint().expect("Query should fingerprint.");

	cache.put(a.clone(), OrdersPage { rows: Vec::new() });
	cache.put(b.clone(), OrdersPage { rows: Vec::new() });

	assert!(cache.remove(&a));
	assert!(!cache.remove(&a));
	assert_eq!(cache.fingerprints(), vec![b]);

	cache.clear();

	assert!(cache.is_empty());
}
