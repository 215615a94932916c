//! Strongly typed identifiers for handshake flows and backend integration records.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use rand::{Rng, distr::Alphanumeric};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view)?;

				Ok(Self(view.to_owned()))
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;
const FLOW_ID_LEN: usize = 24;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (flow, integration).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (flow, integration).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (flow, integration).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { FlowId, "Identifier of a single handshake flow; keys its message subscription.", "Flow" }
def_id! { IntegrationId, "Backend identifier of a stored integration record.", "Integration" }

impl FlowId {
	/// Generates a fresh random flow identifier.
	pub fn generate() -> Self {
		Self(rand::rng().sample_iter(Alphanumeric).take(FLOW_ID_LEN).map(char::from).collect())
	}
}

fn validate_view(kind: &'static str, view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn identifiers_reject_blank_and_whitespace() {
		assert!(IntegrationId::new("").is_err());
		assert!(IntegrationId::new(" int-1").is_err());
		assert!(FlowId::new(&"a".repeat(IDENTIFIER_MAX_LEN + 1)).is_err());

		let id = IntegrationId::new("int-1").expect("Integration fixture should be valid.");

		assert_eq!(id.as_ref(), "int-1");
		assert_eq!(format!("{id:?}"), "Integration(int-1)");
	}

	#[test]
	fn generated_flow_ids_are_unique_and_valid() {
		let a = FlowId::generate();
		let b = FlowId::generate();

		assert_ne!(a, b);
		assert_eq!(a.len(), FLOW_ID_LEN);
		assert!(FlowId::new(a.as_ref()).is_ok());
	}

	#[test]
	fn serde_enforces_validation() {
		let id: IntegrationId =
			serde_json::from_str("\"int-42\"").expect("Integration id should deserialize.");

		assert_eq!(&*id, "int-42");
		assert!(serde_json::from_str::<IntegrationId>("\"\"").is_err());
	}
}
