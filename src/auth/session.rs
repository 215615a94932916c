//! Opener-side bearer session that authenticates every integrations API call.

// self
use crate::_prelude::*;

/// Redacted bearer token belonging to the opener context's authenticated user.
///
/// The popup context never sees this value; the handshake always exchanges codes with the
/// session that started the flow.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionToken(String);
impl SessionToken {
	/// Wraps a new bearer token.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}
}
impl AsRef<str> for SessionToken {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl Debug for SessionToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("SessionToken").field(&"<redacted>").finish()
	}
}
impl Display for SessionToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn session_formatters_redact() {
		let session = SessionToken::new("bearer-secret");

		assert_eq!(format!("{session:?}"), "SessionToken(\"<redacted>\")");
		assert_eq!(format!("{session}"), "<redacted>");
		assert_eq!(session.expose(), "bearer-secret");
	}
}
