//! Marker and wrapper types with a fixed VM representation

use std::fmt;
use std::ops::Deref;

/// The empty marker type. Encodes as an empty table and decodes only from a
/// table with no entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Void;

/// A boolean decoded with VM truthiness: everything except `false` and `nil`
/// is true. Plain `bool` requires the boolean tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Truthy(pub bool);

impl From<Truthy> for bool {
    fn from(value: Truthy) -> bool {
        value.0
    }
}

impl From<bool> for Truthy {
    fn from(value: bool) -> Self {
        Truthy(value)
    }
}

/// Borrowed VM string contents, not required to be UTF-8
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteStr<'a>(pub &'a [u8]);

/// Owned VM string contents, not required to be UTF-8
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct ByteString(pub Vec<u8>);

impl<'a> Deref for ByteStr<'a> {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.0
    }
}

impl Deref for ByteString {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteString {
    fn from(bytes: Vec<u8>) -> Self {
        ByteString(bytes)
    }
}

impl From<&[u8]> for ByteString {
    fn from(bytes: &[u8]) -> Self {
        ByteString(bytes.to_vec())
    }
}

impl<'a> ByteStr<'a> {
    pub fn to_byte_string(self) -> ByteString {
        ByteString(self.0.to_vec())
    }
}

impl fmt::Debug for ByteStr<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}

impl fmt::Debug for ByteString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "b\"{}\"", self.0.escape_ascii())
    }
}
