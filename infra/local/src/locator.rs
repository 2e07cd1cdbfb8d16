//! The `file://` locator wire format.
//!
//! A locator is `"<scheme>://" + percent-encoded relative path`. The relative path
//! always uses [`SEGMENT_SEPARATOR`], independent of the host's native separator,
//! so locators stay portable between platforms.

use crate::error::StorageError;
use percent_encoding::{AsciiSet, CONTROLS, percent_decode_str, utf8_percent_encode};
use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

/// The only scheme served by this provider.
pub const FILE_SCHEME: &str = "file";

/// Separator between the scheme and the encoded path.
pub const SCHEME_DELIMITER: &str = "://";

/// Segment separator inside a locator's relative path.
pub const SEGMENT_SEPARATOR: char = '/';

/// Characters escaped inside the relative path. `/` stays literal.
const PATH_ENCODE_SET: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'[')
    .add(b'\\')
    .add(b']')
    .add(b'^')
    .add(b'`')
    .add(b'{')
    .add(b'|')
    .add(b'}');

/// An addressable reference to a stored object, e.g. `file://docs/report%201.txt`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Locator(String);

impl Locator {
    /// Builds a `file://` locator from a relative path whose segments are joined
    /// with [`SEGMENT_SEPARATOR`].
    #[must_use]
    pub fn from_relative(relative: &str) -> Self {
        let encoded = utf8_percent_encode(relative, PATH_ENCODE_SET);
        Self(format!("{FILE_SCHEME}{SCHEME_DELIMITER}{encoded}"))
    }

    /// Parses any `<scheme>://<content>` string.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidLocator`] if the delimiter is missing or
    /// either side of it is empty.
    pub fn parse(raw: impl Into<String>) -> Result<Self, StorageError> {
        let raw = raw.into();
        match split(&raw) {
            Some((scheme, rest)) if !scheme.is_empty() && !rest.is_empty() => Ok(Self(raw)),
            _ => Err(StorageError::InvalidLocator {
                locator: raw.into(),
                context: Some("Expected <scheme>://<path>".into()),
            }),
        }
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        split(&self.0).map_or("", |(scheme, _)| scheme)
    }

    /// The percent-encoded part after the scheme delimiter.
    #[must_use]
    pub fn encoded_path(&self) -> &str {
        split(&self.0).map_or("", |(_, rest)| rest)
    }

    /// The decoded relative path, or `None` if it is not valid UTF-8 once decoded.
    #[must_use]
    pub fn decoded_path(&self) -> Option<Cow<'_, str>> {
        decode(self.encoded_path())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Locator {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<Locator> for String {
    fn from(locator: Locator) -> Self {
        locator.0
    }
}

impl PartialEq<str> for Locator {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Locator {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Returns the scheme of `raw` if it has the `<scheme>://` shape.
#[must_use]
pub fn scheme_of(raw: &str) -> Option<&str> {
    split(raw).map(|(scheme, _)| scheme)
}

pub(crate) fn decode(encoded: &str) -> Option<Cow<'_, str>> {
    percent_decode_str(encoded).decode_utf8().ok()
}

fn split(raw: &str) -> Option<(&str, &str)> {
    raw.split_once(SCHEME_DELIMITER)
}
