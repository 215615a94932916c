//! Integration records confirmed by the backend and their client-side mirror.
//!
//! The mirror only ever stores records returned by the integrations API. The single
//! exception is [`IntegrationMirror::mark_disconnected`], which resets a record locally
//! before the backend confirms so the UI reacts immediately.

// self
use crate::{_prelude::*, auth::IntegrationId, provider::Provider};

/// Connected-account record owned by the backend.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrationRecord {
	/// Backend identifier.
	pub id: IntegrationId,
	/// Provider the account belongs to.
	pub provider: Provider,
	/// Account label (email, workspace name) reported by the provider.
	#[serde(default)]
	pub account: Option<String>,
	/// Whether the backend holds a usable grant for this account.
	#[serde(default)]
	pub connected: bool,
	/// Last successful sync.
	#[serde(default, with = "timestamp")]
	pub last_sync: Option<OffsetDateTime>,
	/// Creation instant reported by the backend.
	#[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
	pub created_at: Option<OffsetDateTime>,
	/// Last update instant reported by the backend.
	#[serde(default, with = "timestamp", skip_serializing_if = "Option::is_none")]
	pub updated_at: Option<OffsetDateTime>,
}
impl IntegrationRecord {
	/// Clears every field that only makes sense while connected.
	pub fn reset_connection(&mut self) {
		self.connected = false;
		self.account = None;
		self.last_sync = None;
	}
}

type MirrorMap = Arc<RwLock<BTreeMap<Provider, IntegrationRecord>>>;

/// Thread-safe, per-tab cache of integration records keyed by provider.
#[derive(Clone, Debug, Default)]
pub struct IntegrationMirror(MirrorMap);
impl IntegrationMirror {
	/// Stores a record returned by the backend, replacing any previous one.
	pub fn upsert(&self, record: IntegrationRecord) {
		self.0.write().insert(record.provider, record);
	}

	/// Replaces the whole mirror with a backend listing.
	pub fn replace_all(&self, records: impl IntoIterator<Item = IntegrationRecord>) {
		let mut guard = self.0.write();

		guard.clear();
		guard.extend(records.into_iter().map(|record| (record.provider, record)));
	}

	/// Returns the record for a provider, if any.
	pub fn get(&self, provider: Provider) -> Option<IntegrationRecord> {
		self.0.read().get(&provider).cloned()
	}

	/// Returns whether the provider is currently shown as connected.
	pub fn is_connected(&self, provider: Provider) -> bool {
		self.0.read().get(&provider).is_some_and(|record| record.connected)
	}

	/// Returns every record in provider order.
	pub fn all(&self) -> Vec<IntegrationRecord> {
		self.0.read().values().cloned().collect()
	}

	/// Resets the provider's record locally, independent of the backend round-trip.
	pub fn mark_disconnected(&self, provider: Provider) -> Option<IntegrationRecord> {
		let mut guard = self.0.write();

		guard.get_mut(&provider).map(|record| {
			record.reset_connection();

			record.clone()
		})
	}

	/// Records the sync instant acknowledged by the backend; ignored for disconnected records.
	pub fn record_sync(&self, provider: Provider, at: OffsetDateTime) {
		if let Some(record) = self.0.write().get_mut(&provider).filter(|record| record.connected) {
			record.last_sync = Some(at);
		}
	}
}

/// Serde adapter for backend timestamps.
///
/// Accepts RFC 3339 values and offset-less ISO 8601 values (interpreted as UTC); always
/// serializes RFC 3339.
pub(crate) mod timestamp {
	// crates.io
	use serde::{Deserializer, Serializer, de::Error as _};
	use time::{
		PrimitiveDateTime,
		format_description::well_known::{Iso8601, Rfc3339},
	};
	// self
	use crate::_prelude::*;

	pub(crate) fn parse(raw: &str) -> Option<OffsetDateTime> {
		OffsetDateTime::parse(raw, &Rfc3339)
			.ok()
			.or_else(|| PrimitiveDateTime::parse(raw, &Iso8601::DEFAULT).ok().map(|dt| dt.assume_utc()))
	}

	pub(crate) fn serialize<S>(value: &Option<OffsetDateTime>, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		match value {
			Some(moment) => {
				let rendered = moment.format(&Rfc3339).map_err(serde::ser::Error::custom)?;

				serializer.serialize_some(&rendered)
			},
			None => serializer.serialize_none(),
		}
	}

	pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<Option<OffsetDateTime>, D::Error>
	where
		D: Deserializer<'de>,
	{
		match Option::<String>::deserialize(deserializer)? {
			Some(raw) => parse(&raw)
				.map(Some)
				.ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`"))),
			None => Ok(None),
		}
	}

	pub(crate) mod required {
		// crates.io
		use serde::{Deserializer, Serializer, de::Error as _};
		// self
		use crate::_prelude::*;

		pub(crate) fn serialize<S>(value: &OffsetDateTime, serializer: S) -> Result<S::Ok, S::Error>
		where
			S: Serializer,
		{
			super::serialize(&Some(*value), serializer)
		}

		pub(crate) fn deserialize<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
		where
			D: Deserializer<'de>,
		{
			let raw = String::deserialize(deserializer)?;

			super::parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp `{raw}`")))
		}
	}
}
