//! Third-party providers an account can be connected to.

// self
use crate::{_prelude::*, error::ConfigError};

/// Supported integration providers.
///
/// The wire label doubles as the backend path segment (`integrations/{provider}/...`).
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provider {
	/// Google Drive (Google OAuth 2.0).
	GoogleDrive,
	/// Notion public integrations.
	Notion,
}
impl Provider {
	/// Every supported provider, in display order.
	pub const ALL: [Provider; 2] = [Provider::GoogleDrive, Provider::Notion];

	/// Returns the wire label (`google-drive`, `notion`).
	pub const fn as_str(self) -> &'static str {
		match self {
			Provider::GoogleDrive => "google-drive",
			Provider::Notion => "notion",
		}
	}

	/// Window name used for this provider's authorization popup.
	pub fn popup_label(self) -> String {
		format!("oauth-{}", self.as_str())
	}
}
impl Display for Provider {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
impl FromStr for Provider {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"google-drive" => Ok(Provider::GoogleDrive),
			"notion" => Ok(Provider::Notion),
			other => Err(ConfigError::UnsupportedProvider(other.to_owned())),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_round_trip_through_from_str_and_serde() {
		for provider in Provider::ALL {
			assert_eq!(provider.as_str().parse::<Provider>().ok(), Some(provider));
		}

		let parsed: Provider =
			serde_json::from_str("\"google-drive\"").expect("Provider label should deserialize.");

		assert_eq!(parsed, Provider::GoogleDrive);
		assert_eq!(Provider::Notion.popup_label(), "oauth-notion");
	}

	#[test]
	fn unknown_providers_are_rejected() {
		let err = "dropbox".parse::<Provider>().expect_err("Dropbox is not supported.");

		assert!(matches!(err, ConfigError::UnsupportedProvider(ref label) if label == "dropbox"));
	}
}
