//! Extraction of SponsorBlock public user IDs from free-form message text.

use once_cell::sync::Lazy;
use regex::Regex;

/// A public user ID is a 64-character lowercase-hex token bounded by word
/// boundaries. The same pattern the reputation service uses for its keys.
static PUBLIC_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b[a-f0-9]{64}\b").expect("public id pattern is valid"));

/// Find the first public user ID in a message, if any.
///
/// When a message contains several candidates only the first is used; a
/// requester pasting multiple ids gets one request, not several.
pub fn find_public_id(text: &str) -> Option<&str> {
    PUBLIC_ID.find(text).map(|m| m.as_str())
}

/// True if the input is exactly one well-formed public user ID.
///
/// Used to validate fast-track form input, where surrounding text is not
/// acceptable.
pub fn is_public_id(text: &str) -> bool {
    text.len() == 64 && text.bytes().all(|b| matches!(b, b'a'..=b'f' | b'0'..=b'9'))
}
