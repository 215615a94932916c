//! reqwest-backed [`IntegrationsApi`] talking to the real backend.

// crates.io
use reqwest::{Method, header::CONTENT_TYPE};
// self
use crate::{
	_prelude::*,
	api::{
		ApiError, ApiFuture, AuthUrlResponse, ConnectRequest, ConnectResponse, DisconnectResponse,
		IntegrationList, IntegrationsApi, SyncResponse,
	},
	auth::SessionToken,
	error::{ConfigError, TransportError},
	http::{self, ReqwestHttpClient},
	provider::Provider,
};

/// Integrations API client rooted at the backend's API base URL.
///
/// The base is normalized to end with `/` so relative joins (`integrations/notion/connect`)
/// append to it instead of replacing its last segment.
#[derive(Clone, Debug)]
pub struct ReqwestIntegrationsApi {
	base: Url,
	http_client: ReqwestHttpClient,
}
impl ReqwestIntegrationsApi {
	/// Creates a client for `base` (e.g. `https://api.example.com/api`).
	pub fn new(base: &str) -> Result<Self, ConfigError> {
		Self::with_http_client(base, ReqwestHttpClient::default())
	}

	/// Creates a client that reuses a caller-provided transport.
	pub fn with_http_client(base: &str, http_client: ReqwestHttpClient) -> Result<Self, ConfigError> {
		let mut base = Url::parse(base).map_err(|source| ConfigError::invalid_url(base, source))?;

		if base.cannot_be_a_base() {
			return Err(ConfigError::CannotBeBase(base.into()));
		}
		if !base.path().ends_with('/') {
			let path = format!("{}/", base.path());

			base.set_path(&path);
		}

		base.set_query(None);
		base.set_fragment(None);

		Ok(Self { base, http_client })
	}

	/// Normalized API base.
	pub fn base(&self) -> &Url {
		&self.base
	}

	fn endpoint(&self, relative: &str) -> Result<Url, ApiError> {
		self.base
			.join(relative)
			.map_err(|source| ConfigError::invalid_url(relative, source).into())
	}

	async fn call<T>(
		&self,
		method: Method,
		url: Url,
		session: &SessionToken,
		body: Option<Vec<u8>>,
	) -> Result<T, ApiError>
	where
		T: for<'de> Deserialize<'de>,
	{
		let mut request = self.http_client.request(method, url).bearer_auth(session.expose());

		if let Some(body) = body {
			request = request.header(CONTENT_TYPE, "application/json").body(body);
		}

		let response = request.send().await.map_err(TransportError::from)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(TransportError::from)?;

		if !status.is_success() {
			let message = http::error_message(&bytes)
				.or_else(|| status.canonical_reason().map(str::to_owned))
				.unwrap_or_else(|| "request failed".into());

			return Err(ApiError::Status { status: status.as_u16(), message });
		}

		http::decode_json(&bytes).map_err(|source| ApiError::Decode { source, status: status.as_u16() })
	}
}
impl IntegrationsApi for ReqwestIntegrationsApi {
	fn auth_url<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
		redirect_uri: Option<&'a Url>,
	) -> ApiFuture<'a, AuthUrlResponse> {
		Box::pin(async move {
			let mut url = self.endpoint(&format!("integrations/{provider}/auth-url"))?;

			if let Some(redirect_uri) = redirect_uri {
				url.query_pairs_mut().append_pair("redirect_uri", redirect_uri.as_str());
			}

			self.call(Method::GET, url, session, None).await
		})
	}

	fn connect<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
		request: &'a ConnectRequest,
	) -> ApiFuture<'a, ConnectResponse> {
		Box::pin(async move {
			let url = self.endpoint(&format!("integrations/{provider}/connect"))?;
			// Plain string fields; serialization cannot fail.
			let body = serde_json::to_vec(request).unwrap_or_default();

			self.call(Method::POST, url, session, Some(body)).await
		})
	}

	fn disconnect<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
	) -> ApiFuture<'a, DisconnectResponse> {
		Box::pin(async move {
			let url = self.endpoint(&format!("integrations/{provider}/disconnect"))?;

			self.call(Method::DELETE, url, session, None).await
		})
	}

	fn sync<'a>(&'a self, session: &'a SessionToken, provider: Provider) -> ApiFuture<'a, SyncResponse> {
		Box::pin(async move {
			let url = self.endpoint(&format!("integrations/{provider}/sync"))?;

			self.call(Method::POST, url, session, None).await
		})
	}

	fn list<'a>(&'a self, session: &'a SessionToken) -> ApiFuture<'a, IntegrationList> {
		Box::pin(async move {
			// The list route has no trailing segment (`/integrations`).
			let url = self.endpoint("integrations")?;

			self.call(Method::GET, url, session, None).await
		})
	}
}
