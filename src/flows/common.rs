//! Singleflight guard bookkeeping shared by the accessors.

// self
use crate::{
	_prelude::*,
	cache::CacheKey,
	flows::Broker,
	http::{TokenHttpClient, TransportErrorMapper},
};

/// Guard-map size above which idle guards are dropped.
const GUARD_PRUNE_THRESHOLD: usize = 100;

/// Returns (and creates on demand) the singleflight guard for a cache key.
pub(crate) fn flow_guard<C, M>(broker: &Broker<C, M>, key: &CacheKey) -> Arc<AsyncMutex<()>>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	guards.entry(key.clone()).or_insert_with(|| Arc::new(AsyncMutex::new(()))).clone()
}

/// Drops guards nobody else holds once the map grows past [`GUARD_PRUNE_THRESHOLD`].
pub(crate) fn prune_flow_guards<C, M>(broker: &Broker<C, M>) -> usize
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let mut guards = broker.flow_guards.lock();

	if guards.len() <= GUARD_PRUNE_THRESHOLD {
		return 0;
	}

	let before = guards.len();

	// The map's own reference is the only one left when no caller is waiting.
	guards.retain(|_, guard| Arc::strong_count(guard) > 1);

	before - guards.len()
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::{_preludet, auth::TokenSecret};

	fn key(n: usize) -> CacheKey {
		CacheKey::from_refresh_token(&TokenSecret::new(format!("rt-{n}")))
	}

	#[test]
	fn guards_are_shared_per_key() {
		let (broker, _) = _preludet::build_reqwest_test_broker(_preludet::test_config(
			"https://auth.example/.well-known/openid-configuration",
			"client",
			None,
		));
		let a = flow_guard(&broker, &key(1));
		let b = flow_guard(&broker, &key(1));
		let c = flow_guard(&broker, &key(2));

		assert!(Arc::ptr_eq(&a, &b));
		assert!(!Arc::ptr_eq(&a, &c));
	}

	#[test]
	fn idle_guards_are_pruned_above_threshold() {
		let (broker, _) = _preludet::build_reqwest_test_broker(_preludet::test_config(
			"https://auth.example/.well-known/openid-configuration",
			"client",
			None,
		));
		let held = flow_guard(&broker, &key(0));

		for n in 1..=GUARD_PRUNE_THRESHOLD {
			flow_guard(&broker, &key(n));
		}

		assert_eq!(prune_flow_guards(&broker), GUARD_PRUNE_THRESHOLD);
		assert_eq!(broker.flow_guards.lock().len(), 1);
		assert!(Arc::ptr_eq(&held, &flow_guard(&broker, &key(0))));
	}
}
