//! Popup authorization handshake for a single provider.
//!
//! [`Handshake`] is an explicit state machine over [`HandshakePhase`]. Entering `Authorizing`
//! acquires one popup, one message listener, and one poll timer as a single
//! [`FlowResources`](flow::FlowResources) guard; every exit path (success, error, cancel,
//! retry, timeout) releases that guard. A generation counter invalidates async work that
//! belongs to a flow which has since been torn down, so only the first terminal signal of a
//! flow can change the phase.

mod flow;

// crates.io
use oauth2::{AuthorizationCode, CsrfToken};
use tokio::{
	sync::Notify,
	time::{self, MissedTickBehavior},
};
// self
use crate::{
	_prelude::*,
	api::{ConnectRequest, IntegrationsApi},
	auth::{FlowId, SessionToken},
	callback::CallbackParams,
	config::HandshakeConfig,
	error::HandshakeFailure,
	integration::{IntegrationMirror, IntegrationRecord},
	messaging::{self, CallbackMessage, Inbox, MessageBus},
	obs::{self, DiscardReason, FlowOutcome, FlowSpan},
	popup::{PopupController, PopupHost},
	provider::Provider,
	provision::{AuthUrlProvisioner, AuthorizationRequest},
};
use flow::{FlowResources, MachineState};

/// Phase labels without payloads, handy for comparisons and metrics.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PhaseKind {
	/// No flow started yet, or the flow was cancelled.
	Idle,
	/// Authorization URL is being provisioned.
	Loading,
	/// Authorization URL is ready; the popup can be opened.
	Ready,
	/// Popup is open and the handshake waits for the callback.
	Authorizing,
	/// Backend confirmed the integration.
	Success,
	/// Handshake failed.
	Error,
}
impl PhaseKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			PhaseKind::Idle => "idle",
			PhaseKind::Loading => "loading",
			PhaseKind::Ready => "ready",
			PhaseKind::Authorizing => "authorizing",
			PhaseKind::Success => "success",
			PhaseKind::Error => "error",
		}
	}
}
impl Display for PhaseKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Observable handshake phase.
#[derive(Clone, Debug)]
pub enum HandshakePhase {
	/// No flow started yet, or the flow was cancelled.
	Idle,
	/// Authorization URL is being provisioned.
	Loading,
	/// Authorization URL is ready; the popup can be opened.
	Ready(Arc<AuthorizationRequest>),
	/// Popup is open and the handshake waits for the callback.
	Authorizing,
	/// Backend confirmed the integration.
	Success(IntegrationRecord),
	/// Handshake failed; the message is safe to display.
	Error(HandshakeFailure),
}
impl HandshakePhase {
	/// Label of the phase.
	pub fn kind(&self) -> PhaseKind {
		match self {
			HandshakePhase::Idle => PhaseKind::Idle,
			HandshakePhase::Loading => PhaseKind::Loading,
			HandshakePhase::Ready(_) => PhaseKind::Ready,
			HandshakePhase::Authorizing => PhaseKind::Authorizing,
			HandshakePhase::Success(_) => PhaseKind::Success,
			HandshakePhase::Error(_) => PhaseKind::Error,
		}
	}

	/// Whether the phase ends a flow.
	pub fn is_terminal(&self) -> bool {
		matches!(self, HandshakePhase::Success(_) | HandshakePhase::Error(_))
	}

	/// Failure carried by the error phase.
	pub fn failure(&self) -> Option<&HandshakeFailure> {
		match self {
			HandshakePhase::Error(failure) => Some(failure),
			_ => None,
		}
	}

	/// Record carried by the success phase.
	pub fn record(&self) -> Option<&IntegrationRecord> {
		match self {
			HandshakePhase::Success(record) => Some(record),
			_ => None,
		}
	}
}

/// What the callback produced, recorded at most once per flow.
#[derive(Clone, Debug)]
pub enum HandshakeOutcome {
	/// Verified callback parameters forwarded to the backend.
	Success {
		/// Single-use authorization code.
		code: AuthorizationCode,
		/// State nonce, already verified against the request.
		state: CsrfToken,
		/// Redirect URI the authorization request was issued for.
		redirect_uri: Url,
	},
	/// The flow failed before or during the exchange.
	Error {
		/// User-facing message.
		message: String,
	},
	/// The flow was cancelled before producing a result.
	Cancelled,
}

enum Signal {
	Message(CallbackMessage),
	Closed,
	Timeout,
}

struct Started {
	generation: u64,
	flow_id: FlowId,
	request: Arc<AuthorizationRequest>,
	inbox: Inbox,
	cancel: Arc<Notify>,
}

/// Authorization handshake for one provider, driven from the opener context.
pub struct Handshake<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	provider: Provider,
	api: Arc<A>,
	host: Arc<H>,
	bus: MessageBus,
	session: SessionToken,
	config: HandshakeConfig,
	mirror: IntegrationMirror,
	state: Mutex<MachineState<H>>,
}
impl<A, H> Handshake<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	/// Creates an idle handshake for `provider`.
	///
	/// `bus` is the opener window's event target; its origin doubles as the only origin
	/// callback messages are accepted from. `session` authenticates every backend call.
	pub fn new(
		provider: Provider,
		api: impl Into<Arc<A>>,
		host: impl Into<Arc<H>>,
		bus: MessageBus,
		session: SessionToken,
	) -> Self {
		Self {
			provider,
			api: api.into(),
			host: host.into(),
			bus,
			session,
			config: HandshakeConfig::default(),
			mirror: IntegrationMirror::default(),
			state: Mutex::new(MachineState::new()),
		}
	}

	/// Overrides timings, popup size, and the redirect URI.
	pub fn with_config(mut self, config: HandshakeConfig) -> Self {
		self.config = config;

		self
	}

	/// Shares a mirror that receives the confirmed record.
	pub fn with_mirror(mut self, mirror: IntegrationMirror) -> Self {
		self.mirror = mirror;

		self
	}

	/// Provider this handshake connects.
	pub fn provider(&self) -> Provider {
		self.provider
	}

	/// Current phase.
	pub fn phase(&self) -> HandshakePhase {
		self.state.lock().phase.clone()
	}

	/// Outcome of the current or most recent flow.
	pub fn outcome(&self) -> Option<HandshakeOutcome> {
		self.state.lock().outcome.clone()
	}

	/// Tears down any live flow, then provisions a fresh authorization request.
	///
	/// Resolves to `Ready` or `Error`, unless the flow was superseded meanwhile.
	pub async fn prepare(&self) -> HandshakePhase {
		let span = FlowSpan::new(self.provider, "prepare");

		span.instrument(self.prepare_inner(&span)).await
	}

	/// Opens the popup for the ready request and waits for exactly one terminal signal.
	///
	/// Only valid in `Ready`; in any other phase this returns the current phase unchanged.
	pub async fn authorize(&self) -> HandshakePhase {
		let span = FlowSpan::new(self.provider, "authorize");

		span.instrument(self.authorize_inner(&span)).await
	}

	/// Abandons the flow and returns to `Idle`.
	///
	/// Has no effect once the handshake reached `Success`. The backend is never called.
	pub fn cancel(&self) -> HandshakePhase {
		let released = {
			let mut state = self.state.lock();

			if let HandshakePhase::Success(_) = state.phase {
				return state.phase.clone();
			}

			let in_flight = matches!(
				state.phase.kind(),
				PhaseKind::Loading | PhaseKind::Ready | PhaseKind::Authorizing
			);
			let released = state.teardown();

			state.phase = HandshakePhase::Idle;

			if in_flight && state.outcome.is_none() {
				state.outcome = Some(HandshakeOutcome::Cancelled);

				obs::record_flow_outcome(self.provider, FlowOutcome::Cancelled);
			}

			released
		};

		drop(released);
		FlowSpan::new(self.provider, "cancel").transition(PhaseKind::Idle.as_str());

		HandshakePhase::Idle
	}

	/// Starts over after an error; other phases are returned unchanged.
	pub async fn retry(&self) -> HandshakePhase {
		let phase = self.phase();

		if phase.kind() != PhaseKind::Error {
			return phase;
		}

		self.prepare().await
	}

	async fn prepare_inner(&self, span: &FlowSpan) -> HandshakePhase {
		obs::record_flow_outcome(self.provider, FlowOutcome::Attempt);

		let (generation, released) = {
			let mut state = self.state.lock();
			let released = state.teardown();

			state.phase = HandshakePhase::Loading;
			state.outcome = None;

			(state.generation, released)
		};

		drop(released);
		span.transition(PhaseKind::Loading.as_str());

		let origin = self.bus.origin();
		let provisioned = AuthUrlProvisioner::new(&*self.api, &self.session, &origin)
			.with_redirect_uri(self.config.redirect_uri.as_ref())
			.fetch_authorization(self.provider)
			.await;
		let mut state = self.state.lock();

		if state.generation != generation {
			return state.phase.clone();
		}

		match provisioned {
			Ok(request) => state.phase = HandshakePhase::Ready(Arc::new(request)),
			Err(err) => {
				state.fail(&err);

				obs::record_flow_outcome(self.provider, FlowOutcome::Failure);
			},
		}

		span.transition(state.phase.kind().as_str());

		state.phase.clone()
	}

	async fn authorize_inner(&self, span: &FlowSpan) -> HandshakePhase {
		let Some(Started { generation, flow_id, request, mut inbox, cancel }) = self.open_popup(span)
		else {
			return self.phase();
		};
		let Some(signal) = self.wait_for_signal(generation, &flow_id, &mut inbox, &cancel).await
		else {
			return self.phase();
		};

		drop(inbox);

		let Some(connect) = self.settle(signal, generation, &flow_id, &request, span) else {
			return self.phase();
		};

		self.exchange(connect, generation, span).await
	}

	fn open_popup(&self, span: &FlowSpan) -> Option<Started> {
		let mut state = self.state.lock();
		let HandshakePhase::Ready(request) = &state.phase else {
			return None;
		};
		let request = request.clone();
		// Listen before opening so a fast callback cannot outrun the subscription.
		let flow_id = FlowId::generate();
		let (registration, inbox) = self.bus.subscribe(flow_id.clone(), self.bus.origin()).split();
		let mut popup = PopupController::new(self.host.clone(), self.config.popup_size);

		let Some(handle) = popup.open(&request.auth_url, &self.provider.popup_label()) else {
			drop(registration);
			state.fail(&Error::PopupBlocked);
			obs::record_flow_outcome(self.provider, FlowOutcome::Failure);
			span.transition(PhaseKind::Error.as_str());

			return None;
		};

		registration.bind(handle, request.state());

		let cancel = Arc::new(Notify::new());

		state.flow = Some(FlowResources::new(flow_id.clone(), popup, registration, cancel.clone()));
		state.phase = HandshakePhase::Authorizing;

		span.transition(PhaseKind::Authorizing.as_str());

		Some(Started { generation: state.generation, flow_id, request, inbox, cancel })
	}

	/// Races cancellation, the callback message, popup closure, and the deadline.
	///
	/// `None` means the flow was torn down from outside.
	async fn wait_for_signal(
		&self,
		generation: u64,
		flow_id: &FlowId,
		inbox: &mut Inbox,
		cancel: &Notify,
	) -> Option<Signal> {
		let deadline = time::sleep(self.config.timeout());
		let mut poll = time::interval(self.config.poll_interval());

		tokio::pin!(deadline);
		poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

		loop {
			tokio::select! {
				biased;
				_ = cancel.notified() => return None,
				message = inbox.recv() => return message.map(Signal::Message),
				_ = poll.tick() => {
					if let Some(signal) = self.inspect_popup(generation, flow_id) {
						return Some(signal);
					}
				},
				_ = &mut deadline => return Some(Signal::Timeout),
			}
		}
	}

	/// Reports closure, preferring parameters read from a same-origin landing page.
	fn inspect_popup(&self, generation: u64, flow_id: &FlowId) -> Option<Signal> {
		let state = self.state.lock();

		if !state.accepts(generation, flow_id) {
			return None;
		}

		let popup = &state.flow.as_ref()?.popup;

		if !popup.is_closed() {
			return None;
		}

		let recovered = popup.location().and_then(|landing| {
			let params = CallbackParams::from_url(&landing);
			let usable =
				params.error.is_some() || (params.code.is_some() && params.state.is_some());

			usable.then(|| params.into_message(&landing))
		});

		Some(recovered.map_or(Signal::Closed, Signal::Message))
	}

	/// Applies the first terminal signal and releases the flow's resources.
	///
	/// Returns the exchange request when the callback verified.
	fn settle(
		&self,
		signal: Signal,
		generation: u64,
		flow_id: &FlowId,
		request: &AuthorizationRequest,
		span: &FlowSpan,
	) -> Option<ConnectRequest> {
		let (connect, released) = {
			let mut state = self.state.lock();

			if !state.accepts(generation, flow_id) {
				obs::record_discarded_message(DiscardReason::Settled);

				return None;
			}

			let released = state.flow.take();
			let verified = match signal {
				Signal::Message(CallbackMessage::Success { code, state: echoed, .. }) =>
					verify(request, code, echoed),
				Signal::Message(CallbackMessage::Error { error }) =>
					Err(Error::CallbackParameter { reason: error }),
				Signal::Closed => Err(Error::PopupClosed),
				Signal::Timeout => Err(Error::Timeout),
			};
			let connect = match verified {
				Ok((outcome, connect)) => {
					state.outcome = Some(outcome);

					Some(connect)
				},
				Err(err) => {
					state.fail(&err);
					obs::record_flow_outcome(self.provider, FlowOutcome::Failure);
					span.transition(PhaseKind::Error.as_str());

					None
				},
			};

			(connect, released)
		};

		drop(released);

		connect
	}

	async fn exchange(
		&self,
		connect: ConnectRequest,
		generation: u64,
		span: &FlowSpan,
	) -> HandshakePhase {
		let confirmed = match self.api.connect(&self.session, self.provider, &connect).await {
			Ok(response) if response.success => {
				self.mirror.upsert(response.integration.clone());

				Ok(response.integration)
			},
			Ok(response) => Err(Error::Exchange {
				reason: if response.message.is_empty() {
					"the server did not confirm the connection".into()
				} else {
					response.message
				},
			}),
			Err(err) => Err(Error::Exchange { reason: err.reason() }),
		};
		let mut state = self.state.lock();

		if state.generation != generation {
			return state.phase.clone();
		}

		match confirmed {
			Ok(record) => {
				state.phase = HandshakePhase::Success(record);

				obs::record_flow_outcome(self.provider, FlowOutcome::Success);
			},
			Err(err) => {
				state.fail(&err);

				obs::record_flow_outcome(self.provider, FlowOutcome::Failure);
			},
		}

		span.transition(state.phase.kind().as_str());

		state.phase.clone()
	}
}
impl<A, H> Debug for Handshake<A, H>
where
	A: ?Sized + IntegrationsApi,
	H: ?Sized + PopupHost,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Handshake")
			.field("provider", &self.provider)
			.field("phase", &self.state.lock().phase.kind())
			.finish()
	}
}

/// Checks the echoed state and builds the exchange for the provisioned redirect URI.
///
/// The redirect URI the callback page reports is not trusted; the provider requires the one
/// the authorization request was issued for.
fn verify(
	request: &AuthorizationRequest,
	code: String,
	echoed: String,
) -> Result<(HandshakeOutcome, ConnectRequest)> {
	if !messaging::state_matches(&echoed, request.state()) {
		return Err(Error::StateMismatch);
	}

	let connect = ConnectRequest {
		code: code.clone(),
		state: echoed.clone(),
		redirect_uri: request.redirect_uri.to_string(),
	};
	let outcome = HandshakeOutcome::Success {
		code: AuthorizationCode::new(code),
		state: CsrfToken::new(echoed),
		redirect_uri: request.redirect_uri.clone(),
	};

	Ok((outcome, connect))
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{api::MemoryIntegrationsApi, popup::MemoryPopupHost};

	type MemoryHandshake = Handshake<MemoryIntegrationsApi, MemoryPopupHost>;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	fn handshake(config: HandshakeConfig) -> (Arc<MemoryHandshake>, Arc<MemoryPopupHost>, MessageBus) {
		let app = url("https://app.example.com");
		let api = MemoryIntegrationsApi::new(app.clone()).with_fixed_state("abc123");
		let host = Arc::new(MemoryPopupHost::new(app.origin()));
		let bus = MessageBus::for_url(&app);
		let handshake = Handshake::new(
			Provider::Notion,
			api,
			host.clone(),
			bus.clone(),
			SessionToken::new("opener-session"),
		)
		.with_config(config);

		(Arc::new(handshake), host, bus)
	}

	#[tokio::test]
	async fn authorize_outside_ready_is_a_no_op() {
		let (handshake, host, _) = handshake(HandshakeConfig::default());

		assert_eq!(handshake.authorize().await.kind(), PhaseKind::Idle);
		assert!(host.history().is_empty());
	}

	#[tokio::test]
	async fn timeouts_fail_and_release_the_popup() {
		let config = HandshakeConfig::default()
			.with_timeout(StdDuration::from_millis(50))
			.with_poll_interval(StdDuration::from_millis(10));
		let (handshake, host, bus) = handshake(config);

		assert_eq!(handshake.prepare().await.kind(), PhaseKind::Ready);

		let phase = handshake.authorize().await;

		assert_eq!(phase.failure().map(|failure| failure.kind), Some(crate::error::FailureKind::Timeout));
		assert_eq!(host.open_windows(), 0);
		assert_eq!(bus.listener_count(), 0);
	}

	#[tokio::test]
	async fn cancelling_mid_flow_returns_to_idle() {
		let (handshake, host, bus) = handshake(HandshakeConfig::default());

		handshake.prepare().await;

		let driver = tokio::spawn({
			let handshake = handshake.clone();

			async move { handshake.authorize().await }
		});

		host.next_opened().await;

		assert_eq!(handshake.phase().kind(), PhaseKind::Authorizing);
		assert_eq!(handshake.cancel().kind(), PhaseKind::Idle);

		let phase = driver.await.expect("Authorize task should not panic.");

		assert_eq!(phase.kind(), PhaseKind::Idle);
		assert!(matches!(handshake.outcome(), Some(HandshakeOutcome::Cancelled)));
		assert_eq!(host.open_windows(), 0);
		assert_eq!(bus.listener_count(), 0);
	}

	#[tokio::test]
	async fn retry_only_applies_to_errors() {
		let (handshake, _, _) = handshake(HandshakeConfig::default());

		assert_eq!(handshake.retry().await.kind(), PhaseKind::Idle);
	}
}
