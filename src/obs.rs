//! Tracing labels shared by session flows.
//!
//! Flows emit one `arb_session.flow` span per top-level operation plus a structured
//! outcome event, labeled by `flow` (operation) and `stage` (call site).

// self
use crate::_prelude::*;

/// Session flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionFlow {
	/// Username/password exchange.
	Login,
	/// Best-effort server-side logout plus local teardown.
	Logout,
	/// Single-flight token renewal.
	Renewal,
	/// Authenticated API request.
	Request,
	/// Push-channel connection attempt.
	Connect,
	/// Polling fallback fetch.
	Poll,
}
impl SessionFlow {
	/// Returns a stable label suitable for span or event fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			SessionFlow::Login => "login",
			SessionFlow::Logout => "logout",
			SessionFlow::Renewal => "renewal",
			SessionFlow::Request => "request",
			SessionFlow::Connect => "connect",
			SessionFlow::Poll => "poll",
		}
	}
}
impl Display for SessionFlow {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each flow attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow helper.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or event fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
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

/// Creates the span wrapping one flow execution.
pub(crate) fn flow_span(flow: SessionFlow, stage: &'static str) -> tracing::Span {
	tracing::info_span!("arb_session.flow", flow = flow.as_str(), stage)
}

/// Emits the structured event recording a flow outcome.
pub(crate) fn record_flow_outcome(flow: SessionFlow, outcome: FlowOutcome) {
	tracing::debug!(flow = flow.as_str(), outcome = outcome.as_str(), "flow outcome");
}
