// self
use crate::{
	obs::{DiscardReason, FlowOutcome},
	provider::Provider,
};

/// Records a handshake outcome via the global metrics recorder (when enabled).
pub fn record_flow_outcome(provider: Provider, outcome: FlowOutcome) {
	#[cfg(feature = "metrics")]
	{
		metrics::counter!(
			"oauth2_handshake_flow_total",
			"provider" => provider.as_str(),
			"outcome" => outcome.as_str()
		)
		.increment(1);
	}

	#[cfg(not(feature = "metrics"))]
	{
		let _ = (provider, outcome);
	}
}

/// Records a window message that was dropped before reaching a handshake.
pub fn record_discarded_message(reason: DiscardReason) {
	#[cfg(feature = "tracing")]
	tracing::warn!(reason = reason.as_str(), "Discarded window message.");

	#[cfg(feature = "metrics")]
	{
		metrics::counter!("oauth2_handshake_discarded_messages_total", "reason" => reason.as_str())
			.increment(1);
	}

	#[cfg(not(any(feature = "metrics", feature = "tracing")))]
	{
		let _ = reason;
	}
}
