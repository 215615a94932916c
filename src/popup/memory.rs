//! In-process [`PopupHost`] for local development, demos, and tests.
//!
//! Windows are plain records; "navigation" and "user closes the window" are driven
//! explicitly through [`MemoryPopupHost::navigate`] and [`MemoryPopupHost::close_by_user`].
//! Location reads honour the same-origin rule against the opener's origin.

// crates.io
use tokio::sync::Notify;
// self
use crate::{
	_prelude::*,
	callback::CallbackWindow,
	popup::{PopupGeometry, PopupHost, ScreenGeometry, WindowHandle},
};

/// Record of a popup the host opened.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenedPopup {
	/// Handle returned to the opener.
	pub handle: WindowHandle,
	/// Initial URL.
	pub url: Url,
	/// Window name.
	pub label: String,
	/// Requested geometry.
	pub geometry: PopupGeometry,
}

#[derive(Debug)]
struct MemoryWindow {
	location: Url,
	closed: bool,
}

#[derive(Debug, Default)]
struct HostState {
	next_handle: u64,
	windows: HashMap<WindowHandle, MemoryWindow>,
	pending: VecDeque<OpenedPopup>,
	history: Vec<OpenedPopup>,
}

/// Thread-safe popup host that keeps windows in memory.
#[derive(Debug)]
pub struct MemoryPopupHost {
	opener_origin: Origin,
	screen: ScreenGeometry,
	blocked: bool,
	state: Mutex<HostState>,
	opened: Notify,
}
impl MemoryPopupHost {
	/// Creates a host whose opener lives on `opener_origin`.
	pub fn new(opener_origin: Origin) -> Self {
		Self {
			opener_origin,
			screen: ScreenGeometry::default(),
			blocked: false,
			state: Mutex::new(HostState::default()),
			opened: Notify::new(),
		}
	}

	/// Makes every `open` call fail as if a popup blocker intervened.
	pub fn blocking(mut self) -> Self {
		self.blocked = true;

		self
	}

	/// Overrides the reported screen area.
	pub fn with_screen(mut self, screen: ScreenGeometry) -> Self {
		self.screen = screen;

		self
	}

	/// Waits until the opener opens a popup and returns it (in open order).
	pub async fn next_opened(&self) -> OpenedPopup {
		loop {
			if let Some(popup) = self.state.lock().pending.pop_front() {
				return popup;
			}

			self.opened.notified().await;
		}
	}

	/// Every popup opened so far.
	pub fn history(&self) -> Vec<OpenedPopup> {
		self.state.lock().history.clone()
	}

	/// Number of windows that are still open.
	pub fn open_windows(&self) -> usize {
		self.state.lock().windows.values().filter(|window| !window.closed).count()
	}

	/// Simulates the window navigating to `url` (e.g. the provider redirect).
	pub fn navigate(&self, handle: WindowHandle, url: Url) {
		if let Some(window) = self.state.lock().windows.get_mut(&handle)
			&& !window.closed
		{
			window.location = url;
		}
	}

	/// Simulates the user closing the window.
	pub fn close_by_user(&self, handle: WindowHandle) {
		self.close(handle);
	}

	/// Returns a [`CallbackWindow`] that closes `handle` when the callback page closes itself.
	pub fn callback_window(self: &Arc<Self>, handle: WindowHandle) -> MemoryCallbackWindow {
		MemoryCallbackWindow { host: self.clone(), handle }
	}
}
impl PopupHost for MemoryPopupHost {
	fn screen(&self) -> ScreenGeometry {
		self.screen
	}

	fn open(&self, url: &Url, label: &str, geometry: PopupGeometry) -> Option<WindowHandle> {
		if self.blocked {
			return None;
		}

		let mut state = self.state.lock();

		state.next_handle += 1;

		let handle = WindowHandle(state.next_handle);
		let opened = OpenedPopup { handle, url: url.clone(), label: label.to_owned(), geometry };

		state.windows.insert(handle, MemoryWindow { location: url.clone(), closed: false });
		state.pending.push_back(opened.clone());
		state.history.push(opened);
		drop(state);
		self.opened.notify_one();

		Some(handle)
	}

	fn is_closed(&self, handle: WindowHandle) -> bool {
		self.state.lock().windows.get(&handle).is_none_or(|window| window.closed)
	}

	fn close(&self, handle: WindowHandle) {
		if let Some(window) = self.state.lock().windows.get_mut(&handle) {
			window.closed = true;
		}
	}

	fn location(&self, handle: WindowHandle) -> Option<Url> {
		let state = self.state.lock();
		let window = state.windows.get(&handle)?;

		(window.location.origin() == self.opener_origin).then(|| window.location.clone())
	}
}

/// Callback-page view of a [`MemoryPopupHost`] window.
#[derive(Clone, Debug)]
pub struct MemoryCallbackWindow {
	host: Arc<MemoryPopupHost>,
	handle: WindowHandle,
}
impl CallbackWindow for MemoryCallbackWindow {
	fn close_self(&self) {
		self.host.close(self.handle);
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(raw: &str) -> Url {
		Url::parse(raw).expect("URL fixture should parse.")
	}

	#[tokio::test]
	async fn location_reads_follow_same_origin_rule() {
		let host = Arc::new(MemoryPopupHost::new(url("https://app.example.com").origin()));
		let handle = host
			.open(
				&url("https://api.notion.com/v1/oauth/authorize"),
				"oauth-notion",
				PopupGeometry::centered(ScreenGeometry::default(), Default::default()),
			)
			.expect("Popup should open.");
		let opened = host.next_opened().await;

		assert_eq!(opened.handle, handle);
		assert!(host.location(handle).is_none());

		host.navigate(handle, url("https://app.example.com/cb?code=c&state=s"));

		assert_eq!(host.location(handle), Some(url("https://app.example.com/cb?code=c&state=s")));

		host.callback_window(handle).close_self();

		assert!(host.is_closed(handle));
		assert_eq!(host.open_windows(), 0);
	}

	#[tokio::test]
	async fn popups_center_on_the_reported_screen() {
		let screen = ScreenGeometry { left: 1920, top: 0, width: 2560, height: 1440 };
		let host = Arc::new(
			MemoryPopupHost::new(url("https://app.example.com").origin()).with_screen(screen),
		);
		let mut popup = crate::popup::PopupController::new(host.clone(), Default::default());

		popup
			.open(&url("https://accounts.google.com/o/oauth2/v2/auth"), "oauth-google-drive")
			.expect("Popup should open.");

		let opened = host.next_opened().await;

		assert_eq!(
			opened.geometry,
			PopupGeometry { left: 1920 + 980, top: 370, width: 600, height: 700 }
		);
	}
}
