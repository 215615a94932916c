//! Per-flow resources and the mutable machine state guarded by the handshake lock.

// crates.io
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	auth::FlowId,
	error::HandshakeFailure,
	handshake::{HandshakeOutcome, HandshakePhase},
	messaging::Registration,
	popup::{PopupController, PopupHost},
};

/// Everything acquired when a flow enters `Authorizing`.
///
/// Dropping it closes the popup, removes the message listener, and wakes the task driving
/// the flow so its poll timer goes away with it.
pub(crate) struct FlowResources<H>
where
	H: ?Sized + PopupHost,
{
	pub(crate) id: FlowId,
	pub(crate) popup: PopupController<H>,
	cancel: Arc<Notify>,
	_registration: Registration,
}
impl<H> FlowResources<H>
where
	H: ?Sized + PopupHost,
{
	pub(crate) fn new(
		id: FlowId,
		popup: PopupController<H>,
		registration: Registration,
		cancel: Arc<Notify>,
	) -> Self {
		Self { id, popup, cancel, _registration: registration }
	}
}
impl<H> Drop for FlowResources<H>
where
	H: ?Sized + PopupHost,
{
	fn drop(&mut self) {
		self.popup.close();
		self.cancel.notify_one();
	}
}

/// State behind the handshake mutex.
pub(crate) struct MachineState<H>
where
	H: ?Sized + PopupHost,
{
	pub(crate) phase: HandshakePhase,
	pub(crate) outcome: Option<HandshakeOutcome>,
	/// Bumped whenever a flow is torn down; async work from older generations is discarded.
	pub(crate) generation: u64,
	pub(crate) flow: Option<FlowResources<H>>,
}
impl<H> MachineState<H>
where
	H: ?Sized + PopupHost,
{
	pub(crate) fn new() -> Self {
		Self { phase: HandshakePhase::Idle, outcome: None, generation: 0, flow: None }
	}

	/// Ends the current generation and hands back its resources.
	///
	/// The caller drops the returned value after releasing the lock.
	pub(crate) fn teardown(&mut self) -> Option<FlowResources<H>> {
		self.generation = self.generation.wrapping_add(1);

		self.flow.take()
	}

	/// Whether `generation` still owns the live flow `id`.
	///
	/// Settling takes the flow out, so this also rejects every signal after the first.
	pub(crate) fn accepts(&self, generation: u64, id: &FlowId) -> bool {
		self.generation == generation && self.flow.as_ref().is_some_and(|flow| &flow.id == id)
	}

	/// Moves into the error phase. The outcome is only recorded if the flow has none yet.
	pub(crate) fn fail(&mut self, err: &Error) {
		let failure = HandshakeFailure::from(err);

		self.outcome.get_or_insert_with(|| HandshakeOutcome::Error { message: failure.message.clone() });
		self.phase = HandshakePhase::Error(failure);
	}
}
