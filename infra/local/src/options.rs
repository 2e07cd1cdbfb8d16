//! Per-call placement options and the payload types exchanged with callers.

use crate::error::{StorageError, StorageErrorExt};
use serde::Deserialize;

/// File mode applied to newly created files (before the process umask).
pub const DEFAULT_MODE: u32 = 0o666;

/// How file contents are interpreted when read back.
///
/// Writes always store the payload bytes verbatim.
#[derive(Debug, Clone, Copy, Default, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Binary,
}

impl Encoding {
    pub(crate) fn decode(self, data: Vec<u8>) -> Result<Payload, StorageError> {
        match self {
            Self::Utf8 => {
                String::from_utf8(data).map(Payload::Text).context("File is not valid UTF-8")
            },
            Self::Binary => Ok(Payload::Bytes(data)),
        }
    }
}

/// Contents returned by a read.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Bytes(_) => None,
        }
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        match self {
            Self::Text(text) => text.into_bytes(),
            Self::Bytes(bytes) => bytes,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }
}

impl AsRef<[u8]> for Payload {
    fn as_ref(&self) -> &[u8] {
        self.as_bytes()
    }
}

/// Where and how a single write should be placed.
///
/// Every field is optional; unset fields fall back to the provider configuration
/// and then to the built-in defaults when [`PlacementOptions::resolve`] merges them.
#[derive(Debug, Clone, Default, Eq, PartialEq, Deserialize)]
#[serde(default)]
pub struct PlacementOptions {
    /// Base name of the target file.
    pub name: Option<String>,
    /// Logical subdirectory. Always treated as relative.
    pub path: Option<String>,
    /// Overrides the provider's flattening policy for this call only.
    ///
    /// Reads always resolve with the provider's policy, so a locator written with
    /// a different setting than the provider's may not be readable through the
    /// same provider.
    pub flatten: Option<bool>,
    /// Decoding applied by reads. Writes store the given bytes verbatim and do
    /// not transcode.
    pub encoding: Option<Encoding>,
    /// Unix permission bits for a newly created file.
    pub mode: Option<u32>,
}

impl PlacementOptions {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: Some(name.into()), ..Self::default() }
    }

    #[must_use = "Sets the logical subdirectory of the target"]
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Overrides the provider's flattening for this write. See the field docs on
    /// why the resulting locator may not read back through the same provider.
    #[must_use = "Overrides the flattening policy for this call"]
    pub const fn flatten(mut self, flatten: bool) -> Self {
        self.flatten = Some(flatten);
        self
    }

    #[must_use = "Sets the encoding of the payload"]
    pub const fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    #[must_use = "Sets the permission bits of the created file"]
    pub const fn mode(mut self, mode: u32) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Merges call-level values over the provider's `default_flatten` and the
    /// built-in defaults.
    #[must_use]
    pub fn resolve(&self, default_flatten: bool) -> ResolvedPlacement<'_> {
        ResolvedPlacement {
            name: self.name.as_deref().unwrap_or_default(),
            path: self.path.as_deref().unwrap_or_default(),
            flatten: self.flatten.unwrap_or(default_flatten),
            encoding: self.encoding.unwrap_or_default(),
            mode: self.mode.unwrap_or(DEFAULT_MODE),
        }
    }
}

/// [`PlacementOptions`] with every default applied.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct ResolvedPlacement<'a> {
    pub name: &'a str,
    pub path: &'a str,
    pub flatten: bool,
    pub encoding: Encoding,
    pub mode: u32,
}
