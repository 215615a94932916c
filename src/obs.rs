//! Optional observability helpers for handshake flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `oauth2_handshake.flow` with the `provider`
//!   and `stage` (call site) fields, plus warnings for discarded window messages.
//! - Enable `metrics` to increment the `oauth2_handshake_flow_total` counter for every
//!   attempt/success/failure/cancellation, labeled by `provider` + `outcome`, and the
//!   `oauth2_handshake_discarded_messages_total` counter labeled by `reason`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Outcome labels recorded for each handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a handshake stage.
	Attempt,
	/// Backend confirmed the integration.
	Success,
	/// Handshake reached the error phase.
	Failure,
	/// User closed the flow before success.
	Cancelled,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
			FlowOutcome::Cancelled => "cancelled",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reasons a window message never reached a handshake.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DiscardReason {
	/// Posted with a target origin other than the opener's.
	TargetOrigin,
	/// Source origin differs from the subscription's allowed origin.
	ForeignOrigin,
	/// Payload was not a valid callback message.
	Malformed,
	/// Arrived after the flow already settled.
	Settled,
	/// Posted from a window no live flow owns.
	UnknownSource,
}
impl DiscardReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			DiscardReason::TargetOrigin => "target_origin",
			DiscardReason::ForeignOrigin => "foreign_origin",
			DiscardReason::Malformed => "malformed",
			DiscardReason::Settled => "settled",
			DiscardReason::UnknownSource => "unknown_source",
		}
	}
}
impl Display for DiscardReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
