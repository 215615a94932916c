// self
use oauth2_handshake::{
	_preludet::*,
	api::{ConnectRequest, MemoryIntegrationsApi, memory::RecordedConnect},
	callback::CallbackStatus,
	config::HandshakeConfig,
	error::FailureKind,
	handshake::{HandshakeOutcome, PhaseKind},
	messaging::CallbackMessage,
	popup::{MemoryPopupHost, PopupHost, WindowHandle},
	provider::Provider,
};

const STATE: &str = "abc123";

fn url(raw: &str) -> Url {
	Url::parse(raw).expect("URL fixture should parse.")
}

fn fast_config() -> HandshakeConfig {
	HandshakeConfig::default()
		.with_poll_interval(StdDuration::from_millis(10))
		.with_close_delays(StdDuration::from_millis(5), StdDuration::from_millis(5))
		.with_redirect_uri(url("https://app.example.com/cb"))
}

fn connector() -> (Arc<MemoryConnector>, Arc<MemoryIntegrationsApi>, Arc<MemoryPopupHost>) {
	let (connector, api, host) =
		build_memory_connector(MemoryIntegrationsApi::new(app_url()).with_fixed_state(STATE));

	(Arc::new(connector.with_config(fast_config())), api, host)
}

fn spawn_connect(
	connector: &Arc<MemoryConnector>,
	provider: Provider,
) -> tokio::task::JoinHandle<Result<oauth2_handshake::integration::IntegrationRecord>> {
	let connector = connector.clone();

	tokio::spawn(async move { connector.connect(provider).await })
}

#[tokio::test]
async fn notion_popup_flow_connects_with_the_callback_code() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let authorize_pairs: HashMap<_, _> = popup.url.query_pairs().into_owned().collect();

	assert_eq!(popup.url.host_str(), Some("api.notion.com"));
	assert_eq!(popup.label, "oauth-notion");
	assert_eq!(authorize_pairs.get("state"), Some(&STATE.into()));
	assert_eq!(authorize_pairs.get("redirect_uri"), Some(&"https://app.example.com/cb".into()));
	assert_eq!((popup.geometry.width, popup.geometry.height), (600, 700));

	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");

	host.navigate(popup.handle, landing.clone());

	let report = connector
		.callback_receiver()
		.run(
			&landing,
			Some(&connector.bus().port_for(landing.origin()).from_window(popup.handle)),
			&host.callback_window(popup.handle),
		)
		.await;

	assert_eq!(report.status, CallbackStatus::Succeeded);
	assert!(report.delivered);

	let record = driver
		.await
		.expect("Connect task should not panic.")
		.expect("Notion handshake should succeed.");

	assert_eq!(
		api.connect_calls(),
		vec![RecordedConnect {
			provider: Provider::Notion,
			request: ConnectRequest {
				code: "XYZ".into(),
				state: STATE.into(),
				redirect_uri: "https://app.example.com/cb".into(),
			},
			session: opener_session(),
		}]
	);
	assert!(record.connected);
	assert_eq!(connector.handshake(Provider::Notion).phase().kind(), PhaseKind::Success);
	assert!(connector.mirror().is_connected(Provider::Notion));
	assert_eq!(host.open_windows(), 0);
	assert_eq!(connector.bus().listener_count(), 0);

	match connector.handshake(Provider::Notion).outcome() {
		Some(HandshakeOutcome::Success { code, state, redirect_uri }) => {
			assert_eq!(code.secret(), "XYZ");
			assert_eq!(state.secret(), STATE);
			assert_eq!(redirect_uri.as_str(), "https://app.example.com/cb");
		},
		other => panic!("Expected a success outcome, got {other:?}."),
	}
}

#[tokio::test]
async fn mismatched_state_never_reaches_the_backend() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let landing = url("https://app.example.com/cb?code=XYZ&state=wrong");

	host.navigate(popup.handle, landing.clone());
	connector.callback_receiver().handle(&landing, Some(&connector.bus().port_for(landing.origin())));

	let err = driver
		.await
		.expect("Connect task should not panic.")
		.expect_err("Mismatched state must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::StateMismatch);
	assert!(!err.to_string().contains(STATE));
	assert!(api.connect_calls().is_empty());
	assert_eq!(connector.handshake(Provider::Notion).phase().kind(), PhaseKind::Error);
	assert!(!connector.mirror().is_connected(Provider::Notion));
}

#[tokio::test]
async fn concurrent_providers_only_settle_their_own_flow() {
	let (connector, api, host) = build_memory_connector(MemoryIntegrationsApi::new(app_url()));
	let connector = Arc::new(connector.with_config(fast_config()));
	let drive = spawn_connect(&connector, Provider::GoogleDrive);
	let drive_popup = host.next_opened().await;
	let notion = spawn_connect(&connector, Provider::Notion);
	let notion_popup = host.next_opened().await;
	let issued_state = |popup: &oauth2_handshake::popup::memory::OpenedPopup| {
		popup
			.url
			.query_pairs()
			.find(|(key, _)| key == "state")
			.map(|(_, value)| value.into_owned())
			.expect("Issued authorization URL should carry a state.")
	};
	let drive_state = issued_state(&drive_popup);
	let notion_state = issued_state(&notion_popup);
	let port = connector.bus().port_for(app_origin());
	let notion_landing =
		url(&format!("https://app.example.com/cb?code=NOTION&state={notion_state}"));

	port.clone()
		.from_window(WindowHandle(u64::MAX))
		.post_message(&CallbackMessage::Error { error: "stray".into() }, &app_origin());
	connector.callback_receiver().handle(
		&notion_landing,
		Some(&port.clone().from_window(notion_popup.handle)),
	);

	notion
		.await
		.expect("Connect task should not panic.")
		.expect("Notion handshake should succeed.");

	let drive_handshake = connector.handshake(Provider::GoogleDrive);

	assert_eq!(drive_handshake.phase().kind(), PhaseKind::Authorizing);
	assert!(!host.is_closed(drive_popup.handle));
	assert_eq!(connector.bus().listener_count(), 1);

	// Unattributed callbacks are routed by the state they echo.
	let drive_landing = url(&format!("https://app.example.com/cb?code=DRIVE&state={drive_state}"));

	connector.callback_receiver().handle(&drive_landing, Some(&port));
	drive
		.await
		.expect("Connect task should not panic.")
		.expect("Google Drive handshake should succeed.");

	let exchanged: Vec<_> =
		api.connect_calls().into_iter().map(|call| (call.provider, call.request.code)).collect();

	assert_eq!(
		exchanged,
		vec![(Provider::Notion, "NOTION".into()), (Provider::GoogleDrive, "DRIVE".into())]
	);
	assert!(connector.mirror().is_connected(Provider::Notion));
	assert!(connector.mirror().is_connected(Provider::GoogleDrive));
	assert_eq!(host.open_windows(), 0);
}

#[tokio::test]
async fn exchange_uses_the_default_redirect_when_the_auth_url_has_none() {
	let (connector, api, host) = build_memory_connector(
		MemoryIntegrationsApi::new(app_url()).with_fixed_state(STATE).without_redirect_in_auth_url(),
	);
	let connector = Arc::new(connector.with_config(
		HandshakeConfig::default()
			.with_poll_interval(StdDuration::from_millis(10))
			.with_close_delays(StdDuration::from_millis(5), StdDuration::from_millis(5)),
	));
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;

	assert!(!popup.url.query_pairs().any(|(key, _)| key == "redirect_uri"));

	// The page the popup reports does not decide the exchange redirect.
	let landing = url("https://app.example.com/somewhere/else?code=XYZ&state=abc123");

	connector.callback_receiver().handle(
		&landing,
		Some(&connector.bus().port_for(landing.origin()).from_window(popup.handle)),
	);
	driver
		.await
		.expect("Connect task should not panic.")
		.expect("Notion handshake should succeed.");

	let expected = "https://app.example.com/integrations/notion/callback";

	assert_eq!(api.connect_calls().len(), 1);
	assert_eq!(api.connect_calls()[0].request.redirect_uri, expected);

	match connector.handshake(Provider::Notion).outcome() {
		Some(HandshakeOutcome::Success { redirect_uri, .. }) =>
			assert_eq!(redirect_uri.as_str(), expected),
		other => panic!("Expected a success outcome, got {other:?}."),
	}
}

#[tokio::test]
async fn messages_from_foreign_origins_are_ignored() {
	let (connector, api, host) = connector();
	let handshake = connector.handshake(Provider::Notion);
	let driver = spawn_connect(&connector, Provider::Notion);

	host.next_opened().await;

	let forged = CallbackMessage::Success {
		code: "stolen".into(),
		state: STATE.into(),
		redirect_uri: "https://evil.example.net/cb".into(),
	};
	let hostile = connector.bus().port_for(url("https://evil.example.net").origin());

	hostile.post_message(&forged, &app_origin());
	tokio::time::sleep(StdDuration::from_millis(30)).await;

	assert_eq!(handshake.phase().kind(), PhaseKind::Authorizing);
	assert!(api.connect_calls().is_empty());

	connector.close(Provider::Notion);

	let err = driver
		.await
		.expect("Connect task should not panic.")
		.expect_err("Cancelled flow must not succeed.");

	assert!(matches!(err, Error::Cancelled));
	assert!(matches!(handshake.outcome(), Some(HandshakeOutcome::Cancelled)));
	assert!(api.connect_calls().is_empty());
	assert_eq!(host.open_windows(), 0);
	assert_eq!(connector.bus().listener_count(), 0);
}

#[tokio::test]
async fn closing_the_popup_without_a_callback_fails_instead_of_hanging() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;

	host.close_by_user(popup.handle);

	let err = tokio::time::timeout(StdDuration::from_secs(5), driver)
		.await
		.expect("Closed popup must resolve the handshake.")
		.expect("Connect task should not panic.")
		.expect_err("Closed popup must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::PopupClosed);
	assert!(err.to_string().contains("try again"));
	assert!(api.connect_calls().is_empty());
	assert_eq!(connector.bus().listener_count(), 0);
}

#[tokio::test]
async fn same_origin_landing_is_recovered_after_closure() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;

	host.navigate(popup.handle, url("https://app.example.com/cb?code=XYZ&state=abc123"));
	host.close_by_user(popup.handle);

	let record = driver
		.await
		.expect("Connect task should not panic.")
		.expect("Recovered callback parameters should connect.");

	assert!(record.connected);
	assert_eq!(api.connect_calls().len(), 1);
	assert_eq!(api.connect_calls()[0].request.redirect_uri, "https://app.example.com/cb");
}

#[tokio::test]
async fn duplicate_callbacks_exchange_exactly_once() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");
	let port = connector.bus().port_for(landing.origin());
	let receiver = connector.callback_receiver();

	host.navigate(popup.handle, landing.clone());
	receiver.handle(&landing, Some(&port));
	receiver.handle(&landing, Some(&port));
	port.post_message(&CallbackMessage::Error { error: "late".into() }, &app_origin());

	driver
		.await
		.expect("Connect task should not panic.")
		.expect("First callback should connect.");

	assert_eq!(api.connect_calls().len(), 1);
	assert_eq!(connector.handshake(Provider::Notion).phase().kind(), PhaseKind::Success);
}

#[tokio::test]
async fn retry_releases_the_previous_popup_and_listener() {
	let (connector, _api, host) = connector();
	let handshake = connector.handshake(Provider::Notion);

	assert_eq!(handshake.prepare().await.kind(), PhaseKind::Ready);

	let first = tokio::spawn({
		let handshake = handshake.clone();

		async move { handshake.authorize().await }
	});
	let first_popup = host.next_opened().await;

	host.close_by_user(first_popup.handle);

	assert_eq!(first.await.expect("Authorize task should not panic.").kind(), PhaseKind::Error);
	assert_eq!(handshake.retry().await.kind(), PhaseKind::Ready);

	let second = tokio::spawn({
		let handshake = handshake.clone();

		async move { handshake.authorize().await }
	});
	let second_popup = host.next_opened().await;

	assert_ne!(first_popup.handle, second_popup.handle);
	assert_eq!(connector.bus().listener_count(), 1);
	assert_eq!(host.open_windows(), 1);
	assert!(host.is_closed(first_popup.handle));

	handshake.cancel();

	assert_eq!(second.await.expect("Authorize task should not panic.").kind(), PhaseKind::Idle);
	assert_eq!(connector.bus().listener_count(), 0);
	assert_eq!(host.open_windows(), 0);
}

#[tokio::test]
async fn starting_a_new_flow_tears_down_the_running_one() {
	let (connector, _api, host) = connector();
	let first = spawn_connect(&connector, Provider::Notion);
	let first_popup = host.next_opened().await;
	let second = spawn_connect(&connector, Provider::Notion);
	let second_popup = host.next_opened().await;

	assert!(matches!(
		first.await.expect("Connect task should not panic."),
		Err(Error::Cancelled) | Err(Error::Handshake(_))
	));
	assert!(host.is_closed(first_popup.handle));
	assert_eq!(host.open_windows(), 1);
	assert_eq!(connector.bus().listener_count(), 1);

	connector.close(Provider::Notion);

	assert!(second.await.expect("Connect task should not panic.").is_err());
	assert!(host.is_closed(second_popup.handle));
}

#[tokio::test]
async fn provider_errors_surface_as_callback_failures() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::GoogleDrive);
	let popup = host.next_opened().await;
	let landing = url(
		"https://app.example.com/integrations/google-drive/callback?error=access_denied&error_description=User+denied",
	);
	let report = connector
		.callback_receiver()
		.handle(&landing, Some(&connector.bus().port_for(landing.origin())));

	assert_eq!(report.status, CallbackStatus::Failed);
	assert_eq!(popup.label, "oauth-google-drive");

	let err = driver
		.await
		.expect("Connect task should not panic.")
		.expect_err("Provider error must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::CallbackParameter);
	assert!(err.to_string().contains("access_denied: User denied"));
	assert!(api.connect_calls().is_empty());
}

#[tokio::test]
async fn exchange_failures_keep_the_backend_detail() {
	let (connector, api, host) = connector();

	api.fail_connect(500, "Token exchange failed: invalid_grant");

	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");

	host.navigate(popup.handle, landing.clone());
	connector.callback_receiver().handle(&landing, Some(&connector.bus().port_for(landing.origin())));

	let err = driver
		.await
		.expect("Connect task should not panic.")
		.expect_err("Backend failure must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::Exchange);
	assert!(err.to_string().contains("invalid_grant"));
	assert_eq!(api.connect_calls().len(), 1);
	assert!(!connector.mirror().is_connected(Provider::Notion));
}

#[tokio::test]
async fn provisioning_failures_never_open_a_popup() {
	let (connector, api, host) = connector();

	api.fail_auth_url(500, "Failed to generate auth URL");

	let err = connector
		.connect(Provider::Notion)
		.await
		.expect_err("Provisioning failure must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::Provision);
	assert!(err.to_string().contains("Failed to generate auth URL"));
	assert!(host.history().is_empty());

	api.heal();

	assert_eq!(connector.handshake(Provider::Notion).retry().await.kind(), PhaseKind::Ready);
}

#[tokio::test]
async fn blocked_popups_fail_without_listeners() {
	let api = Arc::new(MemoryIntegrationsApi::new(app_url()));
	let host = Arc::new(MemoryPopupHost::new(app_origin()).blocking());
	let connector = MemoryConnector::new(
		api.clone(),
		host,
		oauth2_handshake::messaging::MessageBus::for_url(&app_url()),
		opener_session(),
	);
	let err = connector
		.connect(Provider::Notion)
		.await
		.expect_err("Blocked popup must fail the handshake.");

	assert_eq!(err.kind(), FailureKind::PopupBlocked);
	assert_eq!(connector.bus().listener_count(), 0);
	assert!(api.connect_calls().is_empty());
}

#[tokio::test]
async fn detached_callbacks_never_exchange() {
	let (connector, api, _host) = connector();
	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");
	let report = connector.callback_receiver().handle(&landing, None);

	assert_eq!(report.status, CallbackStatus::Detached);
	assert_eq!(report.close_after, None);
	assert!(report.display.contains("integrations page"));
	assert!(api.connect_calls().is_empty());
}

#[tokio::test]
async fn disconnect_resets_locally_even_when_the_backend_fails() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");

	host.navigate(popup.handle, landing.clone());
	connector.callback_receiver().handle(&landing, Some(&connector.bus().port_for(landing.origin())));
	driver.await.expect("Connect task should not panic.").expect("Handshake should succeed.");
	connector.sync(Provider::Notion).await.expect("Sync should succeed once connected.");

	let synced = connector.mirror().get(Provider::Notion).expect("Record should be mirrored.");

	assert!(synced.last_sync.is_some());
	assert!(synced.account.is_some());

	api.fail_disconnect(500, "Failed to disconnect");

	let err = connector
		.disconnect(Provider::Notion)
		.await
		.expect_err("Backend failure should be reported.");

	assert!(matches!(err, Error::Api(ref api_err) if api_err.status() == Some(500)));
	assert_eq!(err.kind(), FailureKind::Api);

	let reset = connector.mirror().get(Provider::Notion).expect("Record should remain mirrored.");

	assert!(!reset.connected);
	assert_eq!(reset.account, None);
	assert_eq!(reset.last_sync, None);
}

#[tokio::test]
async fn refresh_replaces_the_mirror_with_the_backend_listing() {
	let (connector, api, host) = connector();
	let driver = spawn_connect(&connector, Provider::Notion);
	let popup = host.next_opened().await;
	let landing = url("https://app.example.com/cb?code=XYZ&state=abc123");

	host.navigate(popup.handle, landing.clone());
	connector.callback_receiver().handle(&landing, Some(&connector.bus().port_for(landing.origin())));
	driver.await.expect("Connect task should not panic.").expect("Handshake should succeed.");
	connector.disconnect(Provider::Notion).await.expect("Disconnect should succeed.");

	assert!(api.record(Provider::Notion).is_none());
	assert!(connector.refresh().await.expect("Listing should succeed.").is_empty());
	assert!(connector.mirror().all().is_empty());
}
