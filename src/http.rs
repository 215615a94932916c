//! HTTP plumbing shared by the integrations API client.
//!
//! Response bodies are decoded with `serde_path_to_error` so a drifting backend schema
//! reports the exact JSON path that failed instead of a bare serde message.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// self
use crate::_prelude::*;

const BODY_PREVIEW_LEN: usize = 200;

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestHttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// FastAPI-style error envelope (`{"detail": "..."}`).
#[derive(Debug, Deserialize)]
struct ErrorBody {
	detail: serde_json::Value,
}

/// Decodes a JSON body, tracking the failing path.
pub fn decode_json<T>(body: &[u8]) -> Result<T, serde_path_to_error::Error<serde_json::Error>>
where
	T: for<'de> Deserialize<'de>,
{
	let mut de = serde_json::Deserializer::from_slice(body);

	serde_path_to_error::deserialize(&mut de)
}

/// Extracts a human-readable message from an error response body.
///
/// Prefers the `detail` field (string, or the first validation entry's `msg`), falling back to
/// a trimmed preview of the raw body.
pub fn error_message(body: &[u8]) -> Option<String> {
	if let Ok(ErrorBody { detail }) = serde_json::from_slice::<ErrorBody>(body) {
		match detail {
			serde_json::Value::String(message) if !message.is_empty() => return Some(message),
			serde_json::Value::Array(entries) => {
				if let Some(message) =
					entries.first().and_then(|entry| entry.get("msg")).and_then(|msg| msg.as_str())
				{
					return Some(message.to_owned());
				}
			},
			_ => {},
		}
	}

	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return None;
	}

	Some(trimmed.chars().take(BODY_PREVIEW_LEN).collect())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn error_messages_prefer_detail() {
		assert_eq!(
			error_message(br#"{"detail":"Invalid OAuth state"}"#).as_deref(),
			Some("Invalid OAuth state")
		);
		assert_eq!(
			error_message(br#"{"detail":[{"loc":["body","code"],"msg":"field required"}]}"#)
				.as_deref(),
			Some("field required")
		);
		assert_eq!(error_message(b"  Bad Gateway \n").as_deref(), Some("Bad Gateway"));
		assert_eq!(error_message(b""), None);
	}

	#[test]
	fn decode_reports_paths() {
		#[derive(Debug, Deserialize)]
		struct Payload {
			#[allow(dead_code)]
			state: String,
		}

		let err = decode_json::<Payload>(br#"{"state":42}"#).expect_err("Wrong type must fail.");

		assert_eq!(err.path().to_string(), "state");
	}
}
