//! Thread-safe in-memory [`TokenCache`] implementation.

// self
use crate::{
	_prelude::*,
	auth::TokenSet,
	cache::{CacheEntry, CacheKey, TokenCache},
};

type EntryMap = RwLock<HashMap<CacheKey, CacheEntry>>;

/// Process-local token cache with opportunistic sweeping and a hard capacity.
#[derive(Debug)]
pub struct MemoryTokenCache {
	entries: EntryMap,
	sweep_threshold: usize,
	capacity: usize,
}
impl MemoryTokenCache {
	/// Entry count above which a `set` triggers a sweep of expired entries.
	pub const DEFAULT_SWEEP_THRESHOLD: usize = 100;
	/// Entry count the cache never exceeds after a `set`.
	pub const DEFAULT_CAPACITY: usize = 10_000;

	/// Creates a cache with custom limits; `capacity` is raised to at least `sweep_threshold`.
	pub fn with_limits(sweep_threshold: usize, capacity: usize) -> Self {
		Self {
			entries: RwLock::new(HashMap::new()),
			sweep_threshold,
			capacity: capacity.max(sweep_threshold).max(1),
		}
	}

	/// Entry count that triggers a sweep.
	pub fn sweep_threshold(&self) -> usize {
		self.sweep_threshold
	}

	/// Hard entry limit.
	pub fn capacity(&self) -> usize {
		self.capacity
	}

	fn evict_soonest_expiring(map: &mut HashMap<CacheKey, CacheEntry>, capacity: usize) -> usize {
		let excess = map.len().saturating_sub(capacity);

		if excess == 0 {
			return 0;
		}

		let mut by_expiry =
			map.iter().map(|(key, entry)| (entry.expires_at, key.clone())).collect::<Vec<_>>();

		by_expiry.sort_by_key(|(expires_at, _)| *expires_at);

		for (_, key) in by_expiry.into_iter().take(excess) {
			map.remove(&key);
		}

		excess
	}
}
impl Default for MemoryTokenCache {
	fn default() -> Self {
		Self::with_limits(Self::DEFAULT_SWEEP_THRESHOLD, Self::DEFAULT_CAPACITY)
	}
}
impl TokenCache for MemoryTokenCache {
	fn get(&self, key: &CacheKey, now: OffsetDateTime) -> Option<CacheEntry> {
		self.entries.read().get(key).filter(|entry| entry.is_fresh(now)).cloned()
	}

	fn set(&self, key: &CacheKey, tokens: &TokenSet, now: OffsetDateTime) -> CacheEntry {
		let entry = CacheEntry::new(tokens, now);
		let mut map = self.entries.write();

		map.insert(key.clone(), entry.clone());

		if map.len() > self.sweep_threshold {
			let before = map.len();

			map.retain(|_, entry| entry.is_fresh(now));

			tracing::debug!(removed = before - map.len(), remaining = map.len(), "token cache swept");
		}

		let evicted = Self::evict_soonest_expiring(&mut map, self.capacity);

		if evicted > 0 {
			tracing::warn!(evicted, capacity = self.capacity, "token cache at capacity");
		}

		entry
	}

	fn sweep(&self, now: OffsetDateTime) -> usize {
		let mut map = self.entries.write();
		let before = map.len();

		map.retain(|_, entry| entry.is_fresh(now));

		before - map.len()
	}

	fn len(&self) -> usize {
		self.entries.read().len()
	}
}
