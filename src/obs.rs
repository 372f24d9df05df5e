//! Observability helpers for broker stages.
//!
//! Every stage runs inside a `tracing` span named `session_token_broker.flow` carrying the
//! `flow` (stage kind) and `stage` (call site) fields. Enable the `metrics` feature to also
//! increment the `session_token_broker_flow_total` counter labeled by `flow` + `outcome`.

mod metrics;
mod tracing;

pub use self::{metrics::*, tracing::*};

// self
use crate::_prelude::*;

/// Broker stages observed by spans and counters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// OIDC discovery document resolution.
	Discovery,
	/// Session cookie reassembly and decryption.
	Session,
	/// `refresh_token` grant against the token endpoint.
	Exchange,
	/// Public accessor orchestration.
	Accessor,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Discovery => "discovery",
			FlowKind::Session => "session",
			FlowKind::Exchange => "exchange",
			FlowKind::Accessor => "accessor",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a broker helper.
	Attempt,
	/// Answered from the token cache.
	CacheHit,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::CacheHit => "cache_hit",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
