//! Backend integrations API contract consumed by the handshake.
//!
//! [`IntegrationsApi`] is the only dependency the crate has on the backend. Every call carries
//! the opener's [`SessionToken`]; the popup context never reaches this layer.

pub mod memory;
#[cfg(feature = "reqwest")] pub mod remote;

pub use memory::MemoryIntegrationsApi;
#[cfg(feature = "reqwest")] pub use remote::ReqwestIntegrationsApi;

// self
use crate::{
	_prelude::*,
	auth::SessionToken,
	error::{ConfigError, TransportError},
	integration::{IntegrationRecord, timestamp},
	provider::Provider,
};

/// Boxed future returned by [`IntegrationsApi`] methods.
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ApiError>> + 'a + Send>>;

/// Integrations endpoints of the backend.
pub trait IntegrationsApi
where
	Self: Send + Sync,
{
	/// `GET integrations/{provider}/auth-url[?redirect_uri=]`.
	fn auth_url<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
		redirect_uri: Option<&'a Url>,
	) -> ApiFuture<'a, AuthUrlResponse>;

	/// `POST integrations/{provider}/connect`.
	fn connect<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
		request: &'a ConnectRequest,
	) -> ApiFuture<'a, ConnectResponse>;

	/// `DELETE integrations/{provider}/disconnect`.
	fn disconnect<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
	) -> ApiFuture<'a, DisconnectResponse>;

	/// `POST integrations/{provider}/sync`.
	fn sync<'a>(&'a self, session: &'a SessionToken, provider: Provider) -> ApiFuture<'a, SyncResponse>;

	/// `GET integrations`.
	fn list<'a>(&'a self, session: &'a SessionToken) -> ApiFuture<'a, IntegrationList>;
}

/// Authorization URL and CSRF state issued by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUrlResponse {
	/// Provider consent URL.
	pub auth_url: String,
	/// State nonce embedded in `auth_url`.
	pub state: String,
}

/// Verified callback parameters forwarded to the backend.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectRequest {
	/// Single-use authorization code.
	pub code: String,
	/// State nonce returned by the provider.
	pub state: String,
	/// Redirect URI the provider redirected to.
	pub redirect_uri: String,
}
impl Debug for ConnectRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ConnectRequest")
			.field("code", &"<redacted>")
			.field("state", &self.state)
			.field("redirect_uri", &self.redirect_uri)
			.finish()
	}
}

/// Backend confirmation of a stored integration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectResponse {
	/// Whether the backend stored the integration.
	pub success: bool,
	/// Stored record (tokens stripped by the backend).
	pub integration: IntegrationRecord,
	/// Human-readable summary.
	#[serde(default)]
	pub message: String,
}

/// Backend acknowledgement of a disconnect.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResponse {
	/// Whether the backend removed the integration.
	pub success: bool,
	/// Human-readable summary.
	#[serde(default)]
	pub message: String,
}

/// Backend acknowledgement of a sync run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncResponse {
	/// Whether the sync finished.
	pub success: bool,
	/// Number of items imported.
	pub synced_items: u64,
	/// Instant the sync finished.
	#[serde(with = "timestamp::required")]
	pub last_sync: OffsetDateTime,
	/// Human-readable summary.
	#[serde(default)]
	pub message: Option<String>,
}

/// Listing of the user's integrations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationList {
	/// Stored records.
	pub integrations: Vec<IntegrationRecord>,
	/// Record count reported by the backend.
	pub total: usize,
}

/// Failures raised by [`IntegrationsApi`] implementations.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// Backend answered with a non-success status.
	#[error("Integrations API returned HTTP {status}: {message}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// `detail` from the error body, or a preview of it.
		message: String,
	},
	/// Backend answered with JSON that does not match the contract.
	#[error("Integrations API returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code.
		status: u16,
	},
	/// Network failure.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// URL construction or client configuration failure.
	#[error(transparent)]
	Config(#[from] ConfigError),
}
impl ApiError {
	/// Short reason suitable for embedding in handshake error messages.
	pub fn reason(&self) -> String {
		match self {
			ApiError::Status { message, .. } => message.clone(),
			ApiError::Decode { source, .. } =>
				format!("unexpected response from the server at `{}`", source.path()),
			ApiError::Transport(_) => "the server could not be reached".into(),
			ApiError::Config(err) => err.to_string(),
		}
	}

	/// HTTP status code, when the backend answered.
	pub fn status(&self) -> Option<u16> {
		match self {
			ApiError::Status { status, .. } | ApiError::Decode { status, .. } => Some(*status),
			_ => None,
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn connect_request_debug_redacts_code() {
		let request = ConnectRequest {
			code: "single-use".into(),
			state: "abc123".into(),
			redirect_uri: "https://app.example.com/cb".into(),
		};
		let rendered = format!("{request:?}");

		assert!(!rendered.contains("single-use"));
		assert!(rendered.contains("abc123"));
	}

	#[test]
	fn sync_responses_accept_naive_timestamps() {
		let parsed: SyncResponse = serde_json::from_str(
			r#"{"success":true,"message":"Synced 3 items","synced_items":3,"last_sync":"2025-03-01T10:00:00"}"#,
		)
		.expect("Sync response should deserialize.");

		assert_eq!(parsed.synced_items, 3);
		assert_eq!(parsed.last_sync.unix_timestamp(), 1_740_823_200);
	}

	#[test]
	fn status_reasons_surface_backend_detail() {
		let err = ApiError::Status { status: 400, message: "Invalid OAuth state".into() };

		assert_eq!(err.reason(), "Invalid OAuth state");
		assert_eq!(err.status(), Some(400));
	}
}
