//! Callback page logic that runs inside the popup after the provider redirect.
//!
//! The receiver never talks to the backend. It only reports the redirect parameters to the
//! opener, which owns the authenticated session, and then closes its own window after a
//! short delay so the user can read the status line.

// self
use crate::{
	_prelude::*,
	config::HandshakeConfig,
	messaging::{CallbackMessage, OpenerPort},
};

/// Message shown when the redirect lacks `code` or `state`.
pub const MISSING_PARAMETERS: &str = "Missing authorization parameters (code or state)";

/// Lets the callback page close its own window.
pub trait CallbackWindow
where
	Self: Send + Sync,
{
	/// Closes the window the callback page runs in.
	fn close_self(&self);
}

/// OAuth 2.0 redirect parameters extracted from the landing URL.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
	/// Authorization code.
	pub code: Option<String>,
	/// Echoed state nonce.
	pub state: Option<String>,
	/// Provider error code.
	pub error: Option<String>,
	/// Provider error description.
	pub error_description: Option<String>,
}
impl CallbackParams {
	/// Extracts the parameters from `landing`'s query string; empty values count as missing.
	pub fn from_url(landing: &Url) -> Self {
		let mut params = Self::default();

		for (key, value) in landing.query_pairs() {
			if value.is_empty() {
				continue;
			}

			let slot = match key.as_ref() {
				"code" => &mut params.code,
				"state" => &mut params.state,
				"error" => &mut params.error,
				"error_description" => &mut params.error_description,
				_ => continue,
			};

			slot.get_or_insert_with(|| value.into_owned());
		}

		params
	}

	/// Converts the parameters into the message the opener expects.
	pub fn into_message(self, landing: &Url) -> CallbackMessage {
		if let Some(error) = self.error {
			let error = match self.error_description {
				Some(description) => format!("{error}: {description}"),
				None => error,
			};

			return CallbackMessage::Error { error };
		}

		match (self.code, self.state) {
			(Some(code), Some(state)) =>
				CallbackMessage::Success { code, state, redirect_uri: redirect_uri_of(landing).into() },
			_ => CallbackMessage::Error { error: MISSING_PARAMETERS.into() },
		}
	}
}

/// Terminal status of the callback page.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CallbackStatus {
	/// A success message was posted to the opener.
	Succeeded,
	/// An error message was posted to the opener.
	Failed,
	/// No opener exists; nothing was posted and no exchange was attempted.
	Detached,
}

/// What the callback page did and displays.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallbackReport {
	/// Terminal status.
	pub status: CallbackStatus,
	/// Status line shown to the user.
	pub display: String,
	/// Whether the opener accepted the posted message's target origin.
	pub delivered: bool,
	/// Delay before the window closes itself; `None` keeps it open.
	pub close_after: Option<StdDuration>,
}

/// Reports redirect outcomes from the popup to its opener.
#[derive(Clone, Debug)]
pub struct CallbackReceiver {
	success_close_delay: StdDuration,
	error_close_delay: StdDuration,
}
impl CallbackReceiver {
	/// Creates a receiver using the close delays from `config`.
	pub fn new(config: &HandshakeConfig) -> Self {
		Self {
			success_close_delay: config.success_close_delay(),
			error_close_delay: config.error_close_delay(),
		}
	}

	/// Handles the landing URL and posts the outcome to the opener's origin.
	///
	/// The target origin is the landing page's own origin: the callback is served by the
	/// application, so a popup that ended up anywhere else can never reach the opener.
	pub fn handle(&self, landing: &Url, opener: Option<&OpenerPort>) -> CallbackReport {
		let Some(opener) = opener else {
			return CallbackReport {
				status: CallbackStatus::Detached,
				display: Error::DetachedContext.to_string(),
				delivered: false,
				close_after: None,
			};
		};
		let message = CallbackParams::from_url(landing).into_message(landing);
		let delivered = opener.post_message(&message, &landing.origin());

		match message {
			CallbackMessage::Success { .. } => CallbackReport {
				status: CallbackStatus::Succeeded,
				display: "Authorization successful. This window will close shortly.".into(),
				delivered,
				close_after: Some(self.success_close_delay),
			},
			CallbackMessage::Error { error } => CallbackReport {
				status: CallbackStatus::Failed,
				display: format!("Authorization failed: {error}"),
				delivered,
				close_after: Some(self.error_close_delay),
			},
		}
	}

	/// Handles the landing URL, then closes `window` once the report's delay elapses.
	pub async fn run(
		&self,
		landing: &Url,
		opener: Option<&OpenerPort>,
		window: &dyn CallbackWindow,
	) -> CallbackReport {
		let report = self.handle(landing, opener);

		if let Some(delay) = report.close_after {
			tokio::time::sleep(delay).await;
			window.close_self();
		}

		report
	}
}

/// The landing URL without query string or fragment.
pub fn redirect_uri_of(landing: &Url) -> Url {
	let mut redirect = landing.clone();

	redirect.set_query(None);
	redirect.set_fragment(None);

	redirect
}
