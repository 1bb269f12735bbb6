//! Order-independent OAuth scope sets used for cache keying.

// std
use std::{collections::BTreeSet, sync::OnceLock};
// crates.io
use base64::{Engine as _, engine::general_purpose::STANDARD_NO_PAD};
use serde::{Deserializer, Serializer, de::Error as DeError, ser::SerializeSeq};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Errors emitted when validating scopes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum ScopeValidationError {
	/// Empty scope entries are not allowed.
	#[error("Scope entries cannot be empty.")]
	Empty,
	/// Scopes cannot contain embedded whitespace characters.
	#[error("Scope contains whitespace: {scope}.")]
	ContainsWhitespace {
		/// The offending scope string.
		scope: String,
	},
}

/// Canonicalized set of OAuth scopes.
///
/// Scopes are deduplicated and sorted at construction so that equality and hashing are
/// set-based: requesting `[a, b]` and `[b, a]` yields the same value and therefore the
/// same cache key. [`fingerprint`](Self::fingerprint) lazily caches a base64 (no padding)
/// SHA-256 digest of the normalized scope string; the [`Hash`] implementation reuses it.
#[derive(Default)]
pub struct ScopeSet {
	scopes: Arc<[String]>,
	fingerprint_cache: OnceLock<String>,
}
impl ScopeSet {
	/// Creates a normalized scope set from any iterator of scope strings.
	pub fn new<I, S>(scopes: I) -> Result<Self, ScopeValidationError>
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		Ok(Self { scopes: normalize(scopes)?, fingerprint_cache: OnceLock::new() })
	}

	/// Number of distinct scopes.
	pub fn len(&self) -> usize {
		self.scopes.len()
	}

	/// Returns true if no scopes are defined.
	pub fn is_empty(&self) -> bool {
		self.scopes.is_empty()
	}

	/// Returns true if the normalized set contains the provided scope.
	pub fn contains(&self, scope: &str) -> bool {
		self.scopes.binary_search_by(|candidate| candidate.as_str().cmp(scope)).is_ok()
	}

	/// Iterator over the normalized scopes.
	pub fn iter(&self) -> impl Iterator<Item = &str> {
		self.scopes.iter().map(String::as_str)
	}

	/// Space-delimited normalized representation, as sent to token endpoints.
	pub fn normalized(&self) -> String {
		self.scopes.join(" ")
	}

	/// Stable fingerprint derived from the normalized scope list, cached after the first
	/// calculation. Equal scope sets always produce equal fingerprints.
	pub fn fingerprint(&self) -> String {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.scopes)).clone()
	}

	/// Returns the underlying slice of scope strings.
	pub fn as_slice(&self) -> &[String] {
		&self.scopes
	}
}
impl Clone for ScopeSet {
	fn clone(&self) -> Self {
		Self { scopes: self.scopes.clone(), fingerprint_cache: OnceLock::new() }
	}
}
impl PartialEq for ScopeSet {
	fn eq(&self, other: &Self) -> bool {
		self.scopes == other.scopes
	}
}
impl Eq for ScopeSet {}
impl Hash for ScopeSet {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.fingerprint_cache.get_or_init(|| compute_fingerprint(&self.scopes)).hash(state);
	}
}
impl Debug for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("ScopeSet").field(&self.scopes).finish()
	}
}
impl Display for ScopeSet {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.normalized())
	}
}
impl FromStr for ScopeSet {
	type Err = ScopeValidationError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		if s.is_empty() {
			return Ok(Self::default());
		}
		if s.chars().all(char::is_whitespace) {
			return Err(ScopeValidationError::Empty);
		}

		Self::new(s.split_whitespace())
	}
}
impl TryFrom<Vec<String>> for ScopeSet {
	type Error = ScopeValidationError;

	fn try_from(value: Vec<String>) -> Result<Self, Self::Error> {
		Self::new(value)
	}
}
impl Serialize for ScopeSet {
	fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		let mut seq = serializer.serialize_seq(Some(self.scopes.len()))?;

		for scope in self.scopes.iter() {
			seq.serialize_element(scope)?;
		}

		seq.end()
	}
}
impl<'de> Deserialize<'de> for ScopeSet {
	fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
	where
		D: Deserializer<'de>,
	{
		let values = <Vec<String>>::deserialize(deserializer)?;

		ScopeSet::new(values).map_err(DeError::custom)
	}
}

fn normalize<I, S>(scopes: I) -> Result<Arc<[String]>, ScopeValidationError>
where
	I: IntoIterator<Item = S>,
	S: Into<String>,
{
	let mut set = BTreeSet::new();

	for scope in scopes {
		let owned: String = scope.into();

		if owned.is_empty() {
			return Err(ScopeValidationError::Empty);
		}
		if owned.chars().any(char::is_whitespace) {
			return Err(ScopeValidationError::ContainsWhitespace { scope: owned });
		}

		set.insert(owned);
	}

	Ok(Arc::from(set.into_iter().collect::<Vec<_>>()))
}

fn compute_fingerprint(scopes: &[String]) -> String {
	let mut hasher = Sha256::new();

	hasher.update(scopes.join(" ").as_bytes());

	STANDARD_NO_PAD.encode(hasher.finalize())
}
