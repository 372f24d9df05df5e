// crates.io
use ::tracing::{Instrument, Span, instrument::Instrumented};
// self
use crate::{_prelude::*, obs::FlowKind};

/// A span builder used by broker stages.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	span: Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided stage kind + call site.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		let span = ::tracing::info_span!("session_token_broker.flow", flow = kind.as_str(), stage);

		Self { span }
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		FlowSpanGuard { _guard: self.span.entered() }
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> Instrumented<Fut>
	where
		Fut: Future,
	{
		fut.instrument(self.span.clone())
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	_guard: ::tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}
