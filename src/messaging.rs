//! Origin-scoped message passing between the popup and its opener.
//!
//! [`MessageBus`] stands in for the opener window's `message` event target. Popup contexts
//! obtain an [`OpenerPort`] bound to their own origin and post serialized
//! [`CallbackMessage`]s with an explicit target origin; the bus drops anything whose target
//! does not equal the opener's origin. Each handshake flow subscribes under its own
//! [`FlowId`] and only accepts events whose source origin matches the allowed origin.
//!
//! Once a flow opened its popup it binds its listener to that window and to its state nonce.
//! Events posted from a known window go to the flow owning that window only; unattributed
//! success messages go to the flow whose nonce they echo. Everything else reaches every
//! listener, so a callback for one provider never settles another provider's flow.

// crates.io
use subtle::ConstantTimeEq;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
// self
use crate::{
	_prelude::*,
	auth::FlowId,
	obs::{self, DiscardReason},
	popup::WindowHandle,
};

/// Wire messages posted by the callback page, tagged by `type`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum CallbackMessage {
	/// Provider redirected back with a code and state.
	#[serde(rename = "oauth-success")]
	Success {
		/// Single-use authorization code.
		code: String,
		/// State nonce echoed by the provider.
		state: String,
		/// Callback URL without query, used for the token exchange.
		redirect_uri: String,
	},
	/// Provider or callback reported a failure.
	#[serde(rename = "oauth-error")]
	Error {
		/// Human-readable failure reason.
		error: String,
	},
}
impl CallbackMessage {
	/// Serializes the message into its JSON wire form.
	pub fn to_wire(&self) -> String {
		// Only string fields; serialization cannot fail.
		serde_json::to_string(self).unwrap_or_default()
	}

	/// Parses a JSON wire payload, reporting the failing path on error.
	pub fn from_wire(raw: &str) -> Result<Self, serde_path_to_error::Error<serde_json::Error>> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de)
	}

	fn echoed_state(&self) -> Option<&str> {
		match self {
			CallbackMessage::Success { state, .. } => Some(state.as_str()),
			CallbackMessage::Error { .. } => None,
		}
	}
}

/// A delivered message event: the browser-attested source origin plus the raw payload.
#[derive(Clone, Debug)]
pub struct MessageEvent {
	/// Origin of the posting context.
	pub origin: Origin,
	/// Popup window the event was posted from, when the poster is one.
	pub source: Option<WindowHandle>,
	/// Serialized payload.
	pub data: String,
}

#[derive(Debug)]
struct Route {
	source: WindowHandle,
	state: String,
}

#[derive(Debug)]
struct Listener {
	tx: UnboundedSender<MessageEvent>,
	route: Option<Route>,
}

#[derive(Debug)]
struct BusInner {
	window_origin: Origin,
	listeners: HashMap<FlowId, Listener>,
}
impl BusInner {
	/// Picks the single listener an event is addressed to, if any.
	fn addressee(&self, event: &MessageEvent) -> Option<FlowId> {
		if let Some(source) = event.source {
			return self.routed_to(|route| route.source == source);
		}

		let message = CallbackMessage::from_wire(&event.data).ok()?;
		let echoed = message.echoed_state()?;

		self.routed_to(|route| state_matches(echoed, &route.state))
	}

	fn routed_to(&self, matches: impl Fn(&Route) -> bool) -> Option<FlowId> {
		self.listeners
			.iter()
			.find(|(_, listener)| listener.route.as_ref().is_some_and(&matches))
			.map(|(flow_id, _)| flow_id.clone())
	}
}

/// Message event target of the opener window.
#[derive(Clone, Debug)]
pub struct MessageBus(Arc<Mutex<BusInner>>);
impl MessageBus {
	/// Creates the event target for an opener window living on `window_origin`.
	pub fn new(window_origin: Origin) -> Self {
		Self(Arc::new(Mutex::new(BusInner { window_origin, listeners: HashMap::new() })))
	}

	/// Creates the event target for the origin of `url`.
	pub fn for_url(url: &Url) -> Self {
		Self::new(url.origin())
	}

	/// Origin of the opener window.
	pub fn origin(&self) -> Origin {
		self.0.lock().window_origin.clone()
	}

	/// Returns a port a context on `sender_origin` can post through.
	pub fn port_for(&self, sender_origin: Origin) -> OpenerPort {
		OpenerPort { bus: self.clone(), sender_origin, source: None }
	}

	/// Registers a per-flow listener accepting events from `allowed_origin` only.
	///
	/// Subscribing again under the same flow id replaces the earlier listener.
	pub fn subscribe(&self, flow_id: FlowId, allowed_origin: Origin) -> Subscription {
		let (tx, rx) = mpsc::unbounded_channel();

		self.0.lock().listeners.insert(flow_id.clone(), Listener { tx, route: None });

		Subscription {
			registration: Registration { bus: self.clone(), flow_id },
			inbox: Inbox { rx, allowed_origin },
		}
	}

	/// Number of live listeners.
	pub fn listener_count(&self) -> usize {
		self.0.lock().listeners.len()
	}

	fn unsubscribe(&self, flow_id: &FlowId) {
		self.0.lock().listeners.remove(flow_id);
	}

	fn dispatch(&self, event: MessageEvent, target_origin: &Origin) -> bool {
		let mut guard = self.0.lock();

		if &guard.window_origin != target_origin {
			drop(guard);
			obs::record_discarded_message(DiscardReason::TargetOrigin);

			return false;
		}

		let addressee = guard.addressee(&event);

		match addressee {
			Some(flow_id) => {
				let gone = guard
					.listeners
					.get(&flow_id)
					.is_some_and(|listener| listener.tx.send(event).is_err());

				if gone {
					guard.listeners.remove(&flow_id);
				}
			},
			None if event.source.is_some() => {
				drop(guard);
				obs::record_discarded_message(DiscardReason::UnknownSource);
			},
			None => guard.listeners.retain(|_, listener| listener.tx.send(event.clone()).is_ok()),
		}

		true
	}

	fn bind(&self, flow_id: &FlowId, route: Route) {
		if let Some(listener) = self.0.lock().listeners.get_mut(flow_id) {
			listener.route = Some(route);
		}
	}
}

/// Handle a popup context uses to reach its opener.
#[derive(Clone, Debug)]
pub struct OpenerPort {
	bus: MessageBus,
	sender_origin: Origin,
	source: Option<WindowHandle>,
}
impl OpenerPort {
	/// Attributes posted events to the popup window `handle`, as `event.source` does.
	pub fn from_window(mut self, handle: WindowHandle) -> Self {
		self.source = Some(handle);

		self
	}

	/// Posts `message` to the opener if its origin equals `target_origin`.
	///
	/// Returns `false` when the target origin does not match and the message was dropped.
	pub fn post_message(&self, message: &CallbackMessage, target_origin: &Origin) -> bool {
		self.post_raw(message.to_wire(), target_origin)
	}

	/// Posts an already-serialized payload.
	pub fn post_raw(&self, data: impl Into<String>, target_origin: &Origin) -> bool {
		let event =
			MessageEvent { origin: self.sender_origin.clone(), source: self.source, data: data.into() };

		self.bus.dispatch(event, target_origin)
	}
}

/// A flow's live listener: registration plus receiving side.
#[derive(Debug)]
pub struct Subscription {
	registration: Registration,
	inbox: Inbox,
}
impl Subscription {
	/// Separates the registration (removal on drop) from the receiving side.
	pub fn split(self) -> (Registration, Inbox) {
		(self.registration, self.inbox)
	}

	/// Waits for the next accepted message.
	pub async fn recv(&mut self) -> Option<CallbackMessage> {
		self.inbox.recv().await
	}
}

/// Keeps a flow's listener registered; dropping it unsubscribes.
#[derive(Debug)]
pub struct Registration {
	bus: MessageBus,
	flow_id: FlowId,
}
impl Registration {
	/// Binds the listener to its popup window and state nonce.
	///
	/// Afterwards events from `source` reach this listener only, and so do unattributed
	/// success messages echoing `state`.
	pub fn bind(&self, source: WindowHandle, state: &str) {
		self.bus.bind(&self.flow_id, Route { source, state: state.to_owned() });
	}
}
impl Drop for Registration {
	fn drop(&mut self) {
		self.bus.unsubscribe(&self.flow_id);
	}
}

/// Receiving side of a subscription; filters by origin and decodes payloads.
#[derive(Debug)]
pub struct Inbox {
	rx: UnboundedReceiver<MessageEvent>,
	allowed_origin: Origin,
}
impl Inbox {
	/// Waits for the next message from the allowed origin.
	///
	/// Foreign-origin and malformed events are discarded. Returns `None` once the
	/// registration is gone. Cancel-safe.
	pub async fn recv(&mut self) -> Option<CallbackMessage> {
		loop {
			let event = self.rx.recv().await?;

			if event.origin != self.allowed_origin {
				obs::record_discarded_message(DiscardReason::ForeignOrigin);

				continue;
			}

			match CallbackMessage::from_wire(&event.data) {
				Ok(message) => return Some(message),
				Err(_) => obs::record_discarded_message(DiscardReason::Malformed),
			}
		}
	}
}

/// Constant-time comparison of an echoed state against the stored nonce.
pub(crate) fn state_matches(received: &str, expected: &str) -> bool {
	received.as_bytes().ct_eq(expected.as_bytes()).into()
}
