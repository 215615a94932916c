//! In-process [`IntegrationsApi`] for local development, demos, and tests.
//!
//! It issues authorization URLs the way the backend does (provider consent endpoint plus
//! `client_id`, `redirect_uri`, `response_type`, and a random `state`), remembers every issued
//! state, and only connects codes whose state it issued. Every `connect` call is recorded so
//! tests can assert exactly-once exchange semantics.

// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::{
	_prelude::*,
	api::{
		ApiError, ApiFuture, AuthUrlResponse, ConnectRequest, ConnectResponse, DisconnectResponse,
		IntegrationList, IntegrationsApi, SyncResponse,
	},
	auth::{IntegrationId, SessionToken},
	integration::IntegrationRecord,
	provider::Provider,
};

const STATE_LEN: usize = 32;

/// A recorded `connect` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecordedConnect {
	/// Provider path segment.
	pub provider: Provider,
	/// Forwarded callback parameters.
	pub request: ConnectRequest,
	/// Session the call was authenticated with.
	pub session: SessionToken,
}

#[derive(Debug, Default)]
struct MemoryApiState {
	issued_states: HashMap<String, Provider>,
	fixed_state: Option<String>,
	omit_redirect: bool,
	records: BTreeMap<Provider, IntegrationRecord>,
	connects: Vec<RecordedConnect>,
	next_id: u64,
	fail_auth_url: Option<(u16, String)>,
	fail_connect: Option<(u16, String)>,
	fail_disconnect: Option<(u16, String)>,
}

/// Thread-safe in-memory stand-in for the integrations backend.
#[derive(Debug)]
pub struct MemoryIntegrationsApi {
	default_redirect_base: Url,
	state: Mutex<MemoryApiState>,
}
impl MemoryIntegrationsApi {
	/// Creates a backend whose default redirect URIs live under `frontend_url`.
	pub fn new(frontend_url: Url) -> Self {
		Self { default_redirect_base: frontend_url, state: Mutex::new(MemoryApiState::default()) }
	}

	/// Issues `state` instead of a random nonce.
	pub fn with_fixed_state(self, state: impl Into<String>) -> Self {
		self.state.lock().fixed_state = Some(state.into());

		self
	}

	/// Omits `redirect_uri` from issued authorization URLs, like some providers' echoed URLs.
	pub fn without_redirect_in_auth_url(self) -> Self {
		self.state.lock().omit_redirect = true;

		self
	}

	/// Makes `auth_url` fail with the given status and detail.
	pub fn fail_auth_url(&self, status: u16, detail: impl Into<String>) {
		self.state.lock().fail_auth_url = Some((status, detail.into()));
	}

	/// Makes `connect` fail with the given status and detail.
	pub fn fail_connect(&self, status: u16, detail: impl Into<String>) {
		self.state.lock().fail_connect = Some((status, detail.into()));
	}

	/// Makes `disconnect` fail with the given status and detail.
	pub fn fail_disconnect(&self, status: u16, detail: impl Into<String>) {
		self.state.lock().fail_disconnect = Some((status, detail.into()));
	}

	/// Clears every injected failure.
	pub fn heal(&self) {
		let mut state = self.state.lock();

		state.fail_auth_url = None;
		state.fail_connect = None;
		state.fail_disconnect = None;
	}

	/// Every `connect` call received so far.
	pub fn connect_calls(&self) -> Vec<RecordedConnect> {
		self.state.lock().connects.clone()
	}

	/// Stored record for `provider`.
	pub fn record(&self, provider: Provider) -> Option<IntegrationRecord> {
		self.state.lock().records.get(&provider).cloned()
	}

	fn authorize_endpoint(provider: Provider) -> &'static str {
		match provider {
			Provider::GoogleDrive => "https://accounts.google.com/o/oauth2/v2/auth",
			Provider::Notion => "https://api.notion.com/v1/oauth/authorize",
		}
	}

	fn default_redirect(&self, provider: Provider) -> String {
		let base = self.default_redirect_base.as_str().trim_end_matches('/');

		format!("{base}/integrations/{provider}/callback")
	}

	fn issue(&self, provider: Provider, redirect_uri: Option<&Url>) -> Result<AuthUrlResponse, ApiError> {
		let mut state = self.state.lock();

		if let Some((status, message)) = state.fail_auth_url.clone() {
			return Err(ApiError::Status { status, message });
		}

		let nonce = state.fixed_state.clone().unwrap_or_else(|| {
			rand::rng().sample_iter(Alphanumeric).take(STATE_LEN).map(char::from).collect()
		});
		let redirect =
			redirect_uri.map(|url| url.as_str().to_owned()).unwrap_or_else(|| self.default_redirect(provider));
		let mut auth_url = Url::parse(Self::authorize_endpoint(provider))
			.map_err(|source| crate::error::ConfigError::invalid_url(Self::authorize_endpoint(provider), source))?;

		{
			let mut pairs = auth_url.query_pairs_mut();

			pairs.append_pair("client_id", "memory-client");

			if !state.omit_redirect {
				pairs.append_pair("redirect_uri", &redirect);
			}

			pairs.append_pair("response_type", "code");
			pairs.append_pair("owner", "user");
			pairs.append_pair("state", &nonce);
		}

		state.issued_states.insert(nonce.clone(), provider);

		Ok(AuthUrlResponse { auth_url: auth_url.into(), state: nonce })
	}

	fn store_connect(
		&self,
		session: &SessionToken,
		provider: Provider,
		request: &ConnectRequest,
	) -> Result<ConnectResponse, ApiError> {
		let mut state = self.state.lock();

		state.connects.push(RecordedConnect {
			provider,
			request: request.clone(),
			session: session.clone(),
		});

		if let Some((status, message)) = state.fail_connect.clone() {
			return Err(ApiError::Status { status, message });
		}
		if state.issued_states.get(&request.state) != Some(&provider) {
			return Err(ApiError::Status { status: 400, message: "Invalid OAuth state".into() });
		}

		state.issued_states.remove(&request.state);
		state.next_id += 1;

		let id = IntegrationId::new(format!("int-{}", state.next_id))
			.map_err(|err| ApiError::Config(err.into()))?;
		let now = OffsetDateTime::now_utc();
		let record = IntegrationRecord {
			id,
			provider,
			account: Some(format!("{provider}-account@example.com")),
			connected: true,
			last_sync: None,
			created_at: Some(now),
			updated_at: Some(now),
		};

		state.records.insert(provider, record.clone());

		Ok(ConnectResponse {
			success: true,
			integration: record,
			message: format!("{provider} connected successfully"),
		})
	}

	fn remove(&self, provider: Provider) -> Result<DisconnectResponse, ApiError> {
		let mut state = self.state.lock();

		if let Some((status, message)) = state.fail_disconnect.clone() {
			return Err(ApiError::Status { status, message });
		}
		if state.records.remove(&provider).is_none() {
			return Err(ApiError::Status { status: 404, message: "Integration not found".into() });
		}

		Ok(DisconnectResponse { success: true, message: format!("{provider} disconnected successfully") })
	}

	fn run_sync(&self, provider: Provider) -> Result<SyncResponse, ApiError> {
		let mut state = self.state.lock();
		let Some(record) = state.records.get_mut(&provider).filter(|record| record.connected) else {
			return Err(ApiError::Status { status: 400, message: "Integration not connected".into() });
		};
		let now = OffsetDateTime::now_utc();

		record.last_sync = Some(now);

		Ok(SyncResponse {
			success: true,
			synced_items: 0,
			last_sync: now,
			message: Some(format!("Synced 0 items from {provider}")),
		})
	}
}
impl IntegrationsApi for MemoryIntegrationsApi {
	fn auth_url<'a>(
		&'a self,
		_session: &'a SessionToken,
		provider: Provider,
		redirect_uri: Option<&'a Url>,
	) -> ApiFuture<'a, AuthUrlResponse> {
		Box::pin(async move { self.issue(provider, redirect_uri) })
	}

	fn connect<'a>(
		&'a self,
		session: &'a SessionToken,
		provider: Provider,
		request: &'a ConnectRequest,
	) -> ApiFuture<'a, ConnectResponse> {
		Box::pin(async move { self.store_connect(session, provider, request) })
	}

	fn disconnect<'a>(
		&'a self,
		_session: &'a SessionToken,
		provider: Provider,
	) -> ApiFuture<'a, DisconnectResponse> {
		Box::pin(async move { self.remove(provider) })
	}

	fn sync<'a>(&'a self, _session: &'a SessionToken, provider: Provider) -> ApiFuture<'a, SyncResponse> {
		Box::pin(async move { self.run_sync(provider) })
	}

	fn list<'a>(&'a self, _session: &'a SessionToken) -> ApiFuture<'a, IntegrationList> {
		Box::pin(async move {
			let integrations = self.state.lock().records.values().cloned().collect::<Vec<_>>();

			Ok(IntegrationList { total: integrations.len(), integrations })
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn frontend() -> Url {
		Url::parse("https://app.example.com").expect("Frontend URL fixture should parse.")
	}

	#[tokio::test]
	async fn issued_urls_embed_state_and_default_redirect() {
		let api = MemoryIntegrationsApi::new(frontend());
		let session = SessionToken::new("session");
		let issued = api
			.auth_url(&session, Provider::Notion, None)
			.await
			.expect("Auth URL should be issued.");
		let url = Url::parse(&issued.auth_url).expect("Issued URL should parse.");
		let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();

		assert_eq!(pairs.get("state"), Some(&issued.state));
		assert_eq!(
			pairs.get("redirect_uri").map(String::as_str),
			Some("https://app.example.com/integrations/notion/callback")
		);
		assert_eq!(issued.state.len(), STATE_LEN);
	}

	#[tokio::test]
	async fn connect_only_accepts_issued_states_once() {
		let api = MemoryIntegrationsApi::new(frontend()).with_fixed_state("abc123");
		let session = SessionToken::new("session");

		api.auth_url(&session, Provider::Notion, None).await.expect("Auth URL should be issued.");

		let request = ConnectRequest {
			code: "XYZ".into(),
			state: "abc123".into(),
			redirect_uri: "https://app.example.com/cb".into(),
		};
		let connected = api
			.connect(&session, Provider::Notion, &request)
			.await
			.expect("First exchange should succeed.");

		assert!(connected.integration.connected);

		let replay = api
			.connect(&session, Provider::Notion, &request)
			.await
			.expect_err("Replayed state must be rejected.");

		assert_eq!(replay.status(), Some(400));
		assert_eq!(api.connect_calls().len(), 2);
	}
}
