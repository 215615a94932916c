//! Tab-level facade that owns one handshake per provider plus the integration mirror.

// self
use crate::{
	_prelude::*,
	api::{DisconnectResponse, IntegrationsApi, SyncResponse},
	auth::SessionToken,
	callback::CallbackReceiver,
	config::HandshakeConfig,
	handshake::{Handshake, HandshakePhase},
	integration::{IntegrationMirror, IntegrationRecord},
	messaging::MessageBus,
	popup::PopupHost,
	provider::Provider,
};
#[cfg(feature = "reqwest")] use crate::{api::ReqwestIntegrationsApi, error::ConfigError};

#[cfg(feature = "reqwest")]
/// Connector specialized for the crate's reqwest-backed integrations API.
pub type ReqwestConnector<H> = Connector<ReqwestIntegrationsApi, H>;

/// Connects, lists, disconnects, and syncs third-party accounts for one signed-in tab.
///
/// The connector owns the backend client, the popup host, the opener's message bus, and the
/// session token. Handshakes are created lazily per provider and reused, so starting a new
/// connection for a provider always tears down that provider's previous flow first.
pub struct Connector<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	api: Arc<A>,
	host: Arc<H>,
	bus: MessageBus,
	session: SessionToken,
	config: HandshakeConfig,
	mirror: IntegrationMirror,
	handshakes: Mutex<HashMap<Provider, Arc<Handshake<A, H>>>>,
	provider_guards: Mutex<HashMap<Provider, Arc<AsyncMutex<()>>>>,
}
impl<A, H> Connector<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	/// Creates a connector with default [`HandshakeConfig`].
	pub fn new(
		api: impl Into<Arc<A>>,
		host: impl Into<Arc<H>>,
		bus: MessageBus,
		session: SessionToken,
	) -> Self {
		Self {
			api: api.into(),
			host: host.into(),
			bus,
			session,
			config: HandshakeConfig::default(),
			mirror: IntegrationMirror::default(),
			handshakes: Default::default(),
			provider_guards: Default::default(),
		}
	}

	/// Overrides the configuration used by handshakes created afterwards.
	pub fn with_config(mut self, config: HandshakeConfig) -> Self {
		self.config = config;

		self
	}

	/// Backend client.
	pub fn api(&self) -> &Arc<A> {
		&self.api
	}

	/// Opener window's event target.
	pub fn bus(&self) -> &MessageBus {
		&self.bus
	}

	/// Active configuration.
	pub fn config(&self) -> &HandshakeConfig {
		&self.config
	}

	/// Client-side integration records.
	pub fn mirror(&self) -> &IntegrationMirror {
		&self.mirror
	}

	/// Receiver the callback page should run with this connector's close delays.
	pub fn callback_receiver(&self) -> CallbackReceiver {
		CallbackReceiver::new(&self.config)
	}

	/// Returns the handshake for `provider`, creating it on first use.
	pub fn handshake(&self, provider: Provider) -> Arc<Handshake<A, H>> {
		self.handshakes
			.lock()
			.entry(provider)
			.or_insert_with(|| {
				Arc::new(
					Handshake::new(
						provider,
						self.api.clone(),
						self.host.clone(),
						self.bus.clone(),
						self.session.clone(),
					)
					.with_config(self.config.clone())
					.with_mirror(self.mirror.clone()),
				)
			})
			.clone()
	}

	/// Runs a full handshake: provision, open the popup, and exchange the callback code.
	pub async fn connect(&self, provider: Provider) -> Result<IntegrationRecord> {
		let handshake = self.handshake(provider);

		if let HandshakePhase::Error(failure) = handshake.prepare().await {
			return Err(failure.into());
		}

		match handshake.authorize().await {
			HandshakePhase::Success(record) => Ok(record),
			HandshakePhase::Error(failure) => Err(failure.into()),
			_ => Err(Error::Cancelled),
		}
	}

	/// Cancels the provider's live flow, if any.
	pub fn close(&self, provider: Provider) {
		let handshake = self.handshakes.lock().get(&provider).cloned();

		if let Some(handshake) = handshake {
			handshake.cancel();
		}
	}

	/// Reloads every record from the backend into the mirror.
	pub async fn refresh(&self) -> Result<Vec<IntegrationRecord>> {
		let listing = self.api.list(&self.session).await?;

		self.mirror.replace_all(listing.integrations.iter().cloned());

		Ok(listing.integrations)
	}

	/// Disconnects `provider`.
	///
	/// The mirror is reset before the backend call and stays reset even when the call fails.
	pub async fn disconnect(&self, provider: Provider) -> Result<DisconnectResponse> {
		self.mirror.mark_disconnected(provider);

		let guard = self.provider_guard(provider);
		let _lock = guard.lock().await;

		Ok(self.api.disconnect(&self.session, provider).await?)
	}

	/// Triggers a backend sync and records its completion time.
	pub async fn sync(&self, provider: Provider) -> Result<SyncResponse> {
		let guard = self.provider_guard(provider);
		let _lock = guard.lock().await;
		let response = self.api.sync(&self.session, provider).await?;

		if response.success {
			self.mirror.record_sync(provider, response.last_sync);
		}

		Ok(response)
	}

	/// Serializes backend mutations (sync, disconnect) for one provider.
	fn provider_guard(&self, provider: Provider) -> Arc<AsyncMutex<()>> {
		self.provider_guards
			.lock()
			.entry(provider)
			.or_insert_with(|| Arc::new(AsyncMutex::new(())))
			.clone()
	}
}
#[cfg(feature = "reqwest")]
impl<H> Connector<ReqwestIntegrationsApi, H>
where
	H: ?Sized + PopupHost,
{
	/// Creates a connector that talks to the backend rooted at `api_base`.
	pub fn with_api_base(
		api_base: &str,
		host: impl Into<Arc<H>>,
		bus: MessageBus,
		session: SessionToken,
	) -> Result<Self, ConfigError> {
		Ok(Self::new(ReqwestIntegrationsApi::new(api_base)?, host, bus, session))
	}
}
impl<A, H> Debug for Connector<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Connector")
			.field("origin", &self.bus.origin())
			.field("session", &self.session)
			.field("config", &self.config)
			.finish()
	}
}
