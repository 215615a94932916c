//! Authorization URL provisioning and redirect URI derivation.

// crates.io
use oauth2::CsrfToken;
// self
use crate::{
	_prelude::*,
	api::IntegrationsApi,
	auth::SessionToken,
	error::ConfigError,
	provider::Provider,
};

/// Everything a flow needs to open the consent page and later verify the callback.
///
/// Immutable for the lifetime of one flow. The nonce is kept in an [`oauth2::CsrfToken`] so
/// it never shows up in `Debug` output.
#[derive(Clone, Debug)]
pub struct AuthorizationRequest {
	/// Provider being connected.
	pub provider: Provider,
	/// Provider consent URL.
	pub auth_url: Url,
	/// Redirect URI the provider will send the popup to.
	pub redirect_uri: Url,
	state: CsrfToken,
}
impl AuthorizationRequest {
	/// Assembles a request from already-validated parts.
	pub fn new(provider: Provider, auth_url: Url, state: impl Into<String>, redirect_uri: Url) -> Self {
		Self { provider, auth_url, redirect_uri, state: CsrfToken::new(state.into()) }
	}

	/// State nonce embedded in the authorization URL. Callers must avoid logging it.
	pub fn state(&self) -> &str {
		self.state.secret()
	}
}

/// Fetches authorization URLs from the backend on behalf of the opener's session.
pub struct AuthUrlProvisioner<'a, A>
where
	A: ?Sized + IntegrationsApi,
{
	api: &'a A,
	session: &'a SessionToken,
	app_origin: &'a Origin,
	redirect_override: Option<&'a Url>,
}
impl<'a, A> AuthUrlProvisioner<'a, A>
where
	A: ?Sized + IntegrationsApi,
{
	/// Creates a provisioner for the application served on `app_origin`.
	pub fn new(api: &'a A, session: &'a SessionToken, app_origin: &'a Origin) -> Self {
		Self { api, session, app_origin, redirect_override: None }
	}

	/// Asks the backend to embed `redirect_uri` instead of its configured default.
	pub fn with_redirect_uri(mut self, redirect_uri: Option<&'a Url>) -> Self {
		self.redirect_override = redirect_uri;

		self
	}

	/// Requests an authorization URL + state and derives the redirect URI.
	pub async fn fetch_authorization(&self, provider: Provider) -> Result<AuthorizationRequest> {
		let response = self
			.api
			.auth_url(self.session, provider, self.redirect_override)
			.await
			.map_err(|err| Error::Provision { reason: err.reason() })?;

		if response.auth_url.trim().is_empty() {
			return Err(Error::Provision { reason: "the server returned no authorization URL".into() });
		}
		if response.state.is_empty() {
			return Err(Error::Provision { reason: "the server returned no state".into() });
		}

		let auth_url = Url::parse(&response.auth_url).map_err(|_| Error::Provision {
			reason: "the server returned an invalid authorization URL".into(),
		})?;
		let redirect_uri = match (echoed_redirect_uri(&auth_url), self.redirect_override) {
			(None, Some(pinned)) => Ok(pinned.clone()),
			_ => derive_redirect_uri(&auth_url, self.app_origin, provider),
		}
		.map_err(|err| Error::Provision { reason: err.to_string() })?;

		Ok(AuthorizationRequest::new(provider, auth_url, response.state, redirect_uri))
	}
}

/// Reads `redirect_uri` from `auth_url`, falling back to [`default_redirect_uri`].
///
/// The fallback only works while the backend's registered redirect equals
/// `{origin}/integrations/{provider}/callback`; otherwise the later exchange fails. Prefer
/// pinning [`HandshakeConfig::redirect_uri`](crate::config::HandshakeConfig::redirect_uri).
pub fn derive_redirect_uri(auth_url: &Url, origin: &Origin, provider: Provider) -> Result<Url, ConfigError> {
	match echoed_redirect_uri(auth_url) {
		Some(raw) => Url::parse(&raw).map_err(|source| ConfigError::invalid_url(raw, source)),
		None => default_redirect_uri(origin, provider),
	}
}

fn echoed_redirect_uri(auth_url: &Url) -> Option<String> {
	auth_url
		.query_pairs()
		.find(|(key, value)| key == "redirect_uri" && !value.is_empty())
		.map(|(_, value)| value.into_owned())
}

/// `{origin}/integrations/{provider}/callback`.
pub fn default_redirect_uri(origin: &Origin, provider: Provider) -> Result<Url, ConfigError> {
	if !origin.is_tuple() {
		return Err(ConfigError::OpaqueOrigin);
	}

	let raw = format!("{}/integrations/{provider}/callback", origin.ascii_serialization());

	Url::parse(&raw).map_err(|source| ConfigError::invalid_url(raw, source))
}
