//! Secondary browsing context management for the provider consent page.
//!
//! [`PopupHost`] is the seam to whatever actually opens windows (a browser binding, a
//! webview shell, or the in-process [`MemoryPopupHost`]). [`PopupController`] owns at most one
//! live window per flow, positions it centered on the opener's screen, and force-closes it on
//! drop so no exit path can leak a window.

pub mod memory;

pub use memory::MemoryPopupHost;

// self
use crate::{_prelude::*, config::PopupSize};

/// Opaque reference to a window opened by a [`PopupHost`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct WindowHandle(pub u64);

/// Available screen area of the opener, in CSS pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenGeometry {
	/// Left edge of the available area.
	pub left: i32,
	/// Top edge of the available area.
	pub top: i32,
	/// Available width.
	pub width: u32,
	/// Available height.
	pub height: u32,
}
impl Default for ScreenGeometry {
	fn default() -> Self {
		Self { left: 0, top: 0, width: 1920, height: 1080 }
	}
}

/// Position and size requested for a popup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PopupGeometry {
	/// Left edge.
	pub left: i32,
	/// Top edge.
	pub top: i32,
	/// Width.
	pub width: u32,
	/// Height.
	pub height: u32,
}
impl PopupGeometry {
	/// Centers a popup of `size` on `screen`, never placing it above/left of the screen origin.
	pub fn centered(screen: ScreenGeometry, size: PopupSize) -> Self {
		let offset = |available: u32, wanted: u32| {
			i32::try_from(available.saturating_sub(wanted) / 2).unwrap_or(i32::MAX)
		};

		Self {
			left: screen.left.saturating_add(offset(screen.width, size.width)),
			top: screen.top.saturating_add(offset(screen.height, size.height)),
			width: size.width,
			height: size.height,
		}
	}

	/// Renders the `window.open` feature string.
	pub fn features(&self) -> String {
		format!(
			"width={},height={},left={},top={},scrollbars=yes,resizable=yes",
			self.width, self.height, self.left, self.top
		)
	}
}

/// Window operations the opener context can perform.
pub trait PopupHost
where
	Self: Send + Sync,
{
	/// Screen area used to center popups.
	fn screen(&self) -> ScreenGeometry;

	/// Opens `url` in a window named `label`; `None` means the popup was blocked.
	fn open(&self, url: &Url, label: &str, geometry: PopupGeometry) -> Option<WindowHandle>;

	/// Whether the window has been closed (by the user or programmatically).
	fn is_closed(&self, handle: WindowHandle) -> bool;

	/// Closes the window; closing an already-closed window is a no-op.
	fn close(&self, handle: WindowHandle);

	/// Best-effort read of the window's location.
	///
	/// Hosts must return `None` whenever the window shows a document from another origin
	/// than the opener, mirroring the browser's same-origin policy.
	fn location(&self, handle: WindowHandle) -> Option<Url>;
}

/// Owns the single live popup of a flow.
pub struct PopupController<H>
where
	H: ?Sized + PopupHost,
{
	host: Arc<H>,
	size: PopupSize,
	handle: Option<WindowHandle>,
}
impl<H> PopupController<H>
where
	H: ?Sized + PopupHost,
{
	/// Creates a controller that opens popups of `size` through `host`.
	pub fn new(host: Arc<H>, size: PopupSize) -> Self {
		Self { host, size, handle: None }
	}

	/// Opens `url` centered on the screen, closing any popup this controller still holds.
	pub fn open(&mut self, url: &Url, label: &str) -> Option<WindowHandle> {
		self.close();

		let geometry = PopupGeometry::centered(self.host.screen(), self.size);

		self.handle = self.host.open(url, label, geometry);

		self.handle
	}

	/// Current window, if one is open.
	pub fn handle(&self) -> Option<WindowHandle> {
		self.handle
	}

	/// Whether the popup is gone (never opened, closed by the user, or closed here).
	pub fn is_closed(&self) -> bool {
		self.handle.is_none_or(|handle| self.host.is_closed(handle))
	}

	/// Best-effort same-origin location read.
	pub fn location(&self) -> Option<Url> {
		self.handle.and_then(|handle| self.host.location(handle))
	}

	/// Force-closes the popup and forgets the reference.
	pub fn close(&mut self) {
		if let Some(handle) = self.handle.take()
			&& !self.host.is_closed(handle)
		{
			self.host.close(handle);
		}
	}
}
impl<H> Drop for PopupController<H>
where
	H: ?Sized + PopupHost,
{
	fn drop(&mut self) {
		self.close();
	}
}
impl<H> Debug for PopupController<H>
where
	H: ?Sized + PopupHost,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PopupController")
			.field("size", &self.size)
			.field("handle", &self.handle)
			.finish()
	}
}
