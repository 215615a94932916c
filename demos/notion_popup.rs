//! Walks through a Notion connection against the in-memory backend and popup host: the opener
//! starts the handshake, the "provider" redirects the popup to the callback page, and the
//! callback page reports back before closing itself.

// std
use std::{sync::Arc, time::Duration};
// crates.io
use color_eyre::Result;
use url::Url;
// self
use oauth2_handshake::{
	api::MemoryIntegrationsApi,
	auth::SessionToken,
	callback::CallbackParams,
	config::HandshakeConfig,
	connector::Connector,
	messaging::MessageBus,
	popup::MemoryPopupHost,
	provider::Provider,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let app = Url::parse("https://app.example.com")?;
	let host = Arc::new(MemoryPopupHost::new(app.origin()));
	let connector = Arc::new(
		Connector::<MemoryIntegrationsApi, MemoryPopupHost>::new(
			MemoryIntegrationsApi::new(app.clone()),
			host.clone(),
			MessageBus::for_url(&app),
			SessionToken::new("demo-session"),
		)
		.with_config(HandshakeConfig::default().with_close_delays(
			Duration::from_millis(200),
			Duration::from_millis(500),
		)),
	);
	let driver = tokio::spawn({
		let connector = connector.clone();

		async move { connector.connect(Provider::Notion).await }
	});
	let popup = host.next_opened().await;

	println!("Popup `{}` opened at {} ({}).", popup.label, popup.url, popup.geometry.features());

	// The provider echoes the issued state back to the registered redirect URI.
	let issued = CallbackParams::from_url(&popup.url);
	let mut landing = Url::parse(
		popup
			.url
			.query_pairs()
			.find(|(key, _)| key == "redirect_uri")
			.map(|(_, value)| value.into_owned())
			.as_deref()
			.unwrap_or("https://app.example.com/integrations/notion/callback"),
	)?;

	landing
		.query_pairs_mut()
		.append_pair("code", "demo-code")
		.append_pair("state", issued.state.as_deref().unwrap_or_default());
	host.navigate(popup.handle, landing.clone());

	let report = connector
		.callback_receiver()
		.run(
			&landing,
			Some(&connector.bus().port_for(landing.origin()).from_window(popup.handle)),
			&host.callback_window(popup.handle),
		)
		.await;

	println!("Callback page: {}", report.display);

	let record = driver.await??;

	println!(
		"Connected {} as {}.",
		record.provider,
		record.account.as_deref().unwrap_or("an unknown account")
	);

	connector.sync(Provider::Notion).await?;
	connector.disconnect(Provider::Notion).await?;
	println!("Records after disconnect: {:?}.", connector.refresh().await?);

	Ok(())
}
