//! Tunables for popup geometry, callback timing, and handshake deadlines.

// self
use crate::_prelude::*;

/// Upper bound for the popup liveness poll.
pub const MAX_POLL_INTERVAL: StdDuration = StdDuration::from_millis(500);

/// Popup window dimensions in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupSize {
	/// Window width.
	pub width: u32,
	/// Window height.
	pub height: u32,
}
impl Default for PopupSize {
	fn default() -> Self {
		Self { width: 600, height: 700 }
	}
}

/// Handshake configuration shared by the opener and the callback page.
///
/// Durations are stored as integer milliseconds so the struct deserializes cleanly
/// from JSON or environment-driven config layers; accessors convert them to
/// [`std::time::Duration`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandshakeConfig {
	/// Popup liveness poll in milliseconds (clamped to `1..=500`).
	pub poll_interval_ms: u64,
	/// Overall deadline for the `authorizing` phase in milliseconds.
	pub timeout_ms: u64,
	/// Delay before the callback page closes itself after a success message.
	pub success_close_delay_ms: u64,
	/// Delay before the callback page closes itself after an error message.
	pub error_close_delay_ms: u64,
	/// Popup dimensions.
	pub popup_size: PopupSize,
	/// Canonical redirect URI sent to the backend when requesting an authorization URL.
	pub redirect_uri: Option<Url>,
}
impl HandshakeConfig {
	/// Overrides the popup liveness poll.
	pub fn with_poll_interval(mut self, interval: StdDuration) -> Self {
		self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides the overall `authorizing` deadline.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides both callback close delays.
	pub fn with_close_delays(mut self, success: StdDuration, error: StdDuration) -> Self {
		self.success_close_delay_ms = u64::try_from(success.as_millis()).unwrap_or(u64::MAX);
		self.error_close_delay_ms = u64::try_from(error.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Overrides the popup dimensions.
	pub fn with_popup_size(mut self, size: PopupSize) -> Self {
		self.popup_size = size;

		self
	}

	/// Pins the redirect URI the backend should embed in authorization URLs.
	pub fn with_redirect_uri(mut self, redirect_uri: Url) -> Self {
		self.redirect_uri = Some(redirect_uri);

		self
	}

	/// Effective poll interval, never above [`MAX_POLL_INTERVAL`] and never zero.
	pub fn poll_interval(&self) -> StdDuration {
		StdDuration::from_millis(self.poll_interval_ms.max(1)).min(MAX_POLL_INTERVAL)
	}

	/// Overall deadline for the `authorizing` phase, never zero.
	pub fn timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.timeout_ms.max(1))
	}

	/// Delay before the callback page closes after posting a success message.
	pub fn success_close_delay(&self) -> StdDuration {
		StdDuration::from_millis(self.success_close_delay_ms)
	}

	/// Delay before the callback page closes after posting an error message.
	pub fn error_close_delay(&self) -> StdDuration {
		StdDuration::from_millis(self.error_close_delay_ms)
	}
}
impl Default for HandshakeConfig {
	fn default() -> Self {
		Self {
			poll_interval_ms: 500,
			timeout_ms: 300_000,
			success_close_delay_ms: 1_000,
			error_close_delay_ms: 3_000,
			popup_size: PopupSize::default(),
			redirect_uri: None,
		}
	}
}
