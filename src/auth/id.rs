//! Strongly typed identifiers validated at the crate boundary.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $max:expr, $forbidden:expr) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view, $max, $forbidden)?;

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
				validate_view($kind, &value, $max, $forbidden)?;

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

// Shop domains are DNS names.
const SHOP_MAX_LEN: usize = 255;
const CLIENT_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (shop, client).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (shop, client).
		kind: &'static str,
	},
	/// The identifier contains a reserved character.
	#[error("{kind} identifier contains the reserved character `{found}`.")]
	ReservedCharacter {
		/// Kind of identifier (shop, client).
		kind: &'static str,
		/// Offending character.
		found: char,
	},
	/// The identifier exceeded the allowed length.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (shop, client).
		kind: &'static str,
		/// Maximum permitted length.
		max: usize,
	},
}

// `:` separates the shop from the code inside exchange keys, so shops must never contain it.
def_id! { ShopId, "Shop (tenant) identifier, typically the shop's domain.", "Shop", SHOP_MAX_LEN, &[':', '/'] }
def_id! { ClientId, "Application client identifier registered with the provider.", "Client", CLIENT_MAX_LEN, &[] }

fn validate_view(
	kind: &'static str,
	view: &str,
	max: usize,
	forbidden: &[char],
) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if let Some(found) = view.chars().find(|c| forbidden.contains(c)) {
		return Err(IdentifierError::ReservedCharacter { kind, found });
	}
	if view.len() > max {
		return Err(IdentifierError::TooLong { kind, max });
	}

	Ok(())
}
