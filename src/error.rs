//! Handshake-level error types shared across provisioning, popups, callbacks, and the backend API.

// self
use crate::_prelude::*;

/// Handshake-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical handshake error exposed by public APIs.
///
/// Every variant renders a message that is safe to show to an end-user; none of them
/// embed the expected state nonce or any bearer secret.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Backend call failed outside of a handshake (list, disconnect, sync).
	#[error(transparent)]
	Api(#[from] crate::api::ApiError),
	/// A handshake settled in its error phase.
	#[error(transparent)]
	Handshake(#[from] HandshakeFailure),

	/// Backend could not produce an authorization URL or state.
	#[error("Could not start authorization: {reason}.")]
	Provision {
		/// Backend- or handshake-supplied reason string.
		reason: String,
	},
	/// The popup window could not be opened.
	#[error("The authorization window was blocked. Allow popups for this site and try again.")]
	PopupBlocked,
	/// The provider redirect carried an `error` or lacked `code`/`state`.
	#[error("Authorization failed: {reason}.")]
	CallbackParameter {
		/// Provider- or callback-supplied reason string.
		reason: String,
	},
	/// The returned state did not match the stored nonce.
	#[error("Authorization could not be verified. Please try again.")]
	StateMismatch,
	/// The backend rejected or failed the code exchange.
	#[error("Could not connect the account: {reason}.")]
	Exchange {
		/// Backend-supplied reason string.
		reason: String,
	},
	/// The callback page runs without an opener reference.
	#[error(
		"This page must be opened from the application. Restart the connection from the integrations page."
	)]
	DetachedContext,
	/// The popup closed before the handshake produced an outcome.
	#[error("The authorization window was closed before completion. Please try again.")]
	PopupClosed,
	/// Neither a message nor a closure resolved the handshake in time.
	#[error("Authorization timed out. Please try again.")]
	Timeout,
	/// The flow was cancelled before it produced an outcome.
	#[error("Authorization was cancelled.")]
	Cancelled,
}
impl Error {
	/// Classifies the error for phase snapshots and metrics.
	pub fn kind(&self) -> FailureKind {
		match self {
			Error::Config(_) | Error::Provision { .. } => FailureKind::Provision,
			Error::Api(_) => FailureKind::Api,
			Error::Handshake(failure) => failure.kind,
			Error::PopupBlocked => FailureKind::PopupBlocked,
			Error::CallbackParameter { .. } => FailureKind::CallbackParameter,
			Error::StateMismatch => FailureKind::StateMismatch,
			Error::Exchange { .. } => FailureKind::Exchange,
			Error::DetachedContext => FailureKind::DetachedContext,
			Error::PopupClosed => FailureKind::PopupClosed,
			Error::Timeout => FailureKind::Timeout,
			Error::Cancelled => FailureKind::Cancelled,
		}
	}
}

/// Snapshot of the error that ended a handshake, kept in its error phase.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
#[error("{message}")]
pub struct HandshakeFailure {
	/// Failure classification.
	pub kind: FailureKind,
	/// User-facing message.
	pub message: String,
}
impl From<&Error> for HandshakeFailure {
	fn from(err: &Error) -> Self {
		match err {
			Error::Handshake(failure) => failure.clone(),
			_ => Self { kind: err.kind(), message: err.to_string() },
		}
	}
}

/// Stable classification of handshake failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
	/// Authorization URL provisioning failed.
	Provision,
	/// Popup blocked by the host.
	PopupBlocked,
	/// Provider error or missing callback parameters.
	CallbackParameter,
	/// Potential CSRF attempt.
	StateMismatch,
	/// Backend connect call failed.
	Exchange,
	/// Callback executed without an opener.
	DetachedContext,
	/// Popup closed without a usable outcome.
	PopupClosed,
	/// Overall handshake deadline elapsed.
	Timeout,
	/// Flow cancelled by the caller.
	Cancelled,
	/// Backend call outside a handshake (list, disconnect, sync) failed.
	Api,
}
impl FailureKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FailureKind::Provision => "provision",
			FailureKind::PopupBlocked => "popup_blocked",
			FailureKind::CallbackParameter => "callback_parameter",
			FailureKind::StateMismatch => "state_mismatch",
			FailureKind::Exchange => "exchange",
			FailureKind::DetachedContext => "detached_context",
			FailureKind::PopupClosed => "popup_closed",
			FailureKind::Timeout => "timeout",
			FailureKind::Cancelled => "cancelled",
			FailureKind::Api => "api",
		}
	}
}
impl Display for FailureKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// A backend or redirect URL cannot be parsed.
	#[error("URL `{value}` is invalid.")]
	InvalidUrl {
		/// Offending input.
		value: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// The API base URL cannot carry path segments (e.g. `mailto:`).
	#[error("API base URL `{0}` cannot be used as a base.")]
	CannotBeBase(String),
	/// The application origin is opaque and cannot produce redirect URIs.
	#[error("Application origin is opaque; a tuple origin is required.")]
	OpaqueOrigin,
	/// Provider label outside the supported set.
	#[error("Unsupported provider: {0}. Supported: google-drive, notion.")]
	UnsupportedProvider(String),
	/// Identifier validation failed.
	#[error(transparent)]
	Identifier(#[from] crate::auth::IdentifierError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn invalid_url(value: impl Into<String>, source: url::ParseError) -> Self {
		Self::InvalidUrl { value: value.into(), source }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the integrations API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the integrations API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		Self::network(e)
	}
}
