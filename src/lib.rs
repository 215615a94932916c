//! Popup-driven OAuth 2.0 authorization-code handshake for connecting third-party accounts:
//! origin-scoped messaging, CSRF-checked callbacks, leak-free teardown, and a backend client
//! that performs the code exchange under the opener's own session.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod api;
pub mod auth;
pub mod callback;
pub mod config;
pub mod connector;
pub mod error;
pub mod handshake;
pub mod http;
pub mod integration;
pub mod messaging;
pub mod obs;
pub mod popup;
pub mod provider;
pub mod provision;

#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		api::MemoryIntegrationsApi, auth::SessionToken, connector::Connector,
		messaging::MessageBus, popup::MemoryPopupHost,
	};
	#[cfg(feature = "reqwest")] use crate::http::ReqwestHttpClient;

	/// Origin every test fixture serves the application from.
	pub const APP_URL: &str = "https://app.example.com";

	/// Connector type wired to the in-memory backend and popup host.
	pub type MemoryConnector = Connector<MemoryIntegrationsApi, MemoryPopupHost>;

	/// Parses [`APP_URL`].
	pub fn app_url() -> Url {
		Url::parse(APP_URL).expect("Application URL fixture should parse.")
	}

	/// Origin of [`APP_URL`].
	pub fn app_origin() -> Origin {
		app_url().origin()
	}

	/// Session token used by the opener in tests.
	pub fn opener_session() -> SessionToken {
		SessionToken::new("opener-session-token")
	}

	/// Builds a connector backed by `api` plus a fresh in-memory popup host and message bus.
	pub fn build_memory_connector(
		api: MemoryIntegrationsApi,
	) -> (MemoryConnector, Arc<MemoryIntegrationsApi>, Arc<MemoryPopupHost>) {
		let api = Arc::new(api);
		let host = Arc::new(MemoryPopupHost::new(app_origin()));
		let connector =
			Connector::new(api.clone(), host.clone(), MessageBus::for_url(&app_url()), opener_session());

		(connector, api, host)
	}

	/// Builds a reqwest HTTP client that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap, VecDeque},
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
		time::Duration as StdDuration,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::OffsetDateTime;
	pub use url::{Origin, Url};

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
