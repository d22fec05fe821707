use bytes::Bytes;
use std::{borrow::Borrow, fmt, hash::Hash, str::Utf8Error};

/// [`Bytes`] backed str.
///
/// Wire strings are sliced out of a shared receive buffer, so cloning and
/// slicing never reallocate.
#[derive(Clone, Default)]
pub struct ByteStr {
    bytes: Bytes,
}

impl ByteStr {
    /// Create an empty `ByteStr`.
    pub const fn new() -> ByteStr {
        ByteStr { bytes: Bytes::new() }
    }

    /// Create `ByteStr` from a static string.
    pub const fn from_static(string: &'static str) -> ByteStr {
        ByteStr { bytes: Bytes::from_static(string.as_bytes()) }
    }

    /// Copy a string into a new `ByteStr`.
    pub fn copy_from_str(string: &str) -> ByteStr {
        ByteStr { bytes: Bytes::copy_from_slice(string.as_bytes()) }
    }

    /// Try to create `ByteStr` from [`Bytes`], validating UTF-8.
    pub fn from_utf8(bytes: Bytes) -> Result<ByteStr, Utf8Error> {
        std::str::from_utf8(&bytes)?;
        Ok(ByteStr { bytes })
    }

    /// Returns a `ByteStr` that is a subset of `self`.
    ///
    /// # Panics
    ///
    /// Panics if `subset` is not contained within `self`.
    pub fn slice_ref(&self, subset: &str) -> ByteStr {
        ByteStr { bytes: self.bytes.slice_ref(subset.as_bytes()) }
    }

    /// Extract self as `str`.
    pub fn as_str(&self) -> &str {
        // SAFETY: strings only constructed from validated utf8 and immutable
        unsafe { std::str::from_utf8_unchecked(&self.bytes) }
    }

    /// Consume self into the underlying [`Bytes`].
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

impl std::ops::Deref for ByteStr {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

impl AsRef<str> for ByteStr {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Borrow<str> for ByteStr {
    fn borrow(&self) -> &str {
        self.as_str()
    }
}

impl Hash for ByteStr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl PartialEq for ByteStr {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ByteStr { }

impl PartialOrd for ByteStr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ByteStr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.as_str().cmp(other.as_str())
    }
}

impl PartialEq<str> for ByteStr {
    fn eq(&self, other: &str) -> bool {
        self.as_str() == other
    }
}

impl PartialEq<&str> for ByteStr {
    fn eq(&self, other: &&str) -> bool {
        self.as_str() == *other
    }
}

impl From<String> for ByteStr {
    fn from(value: String) -> Self {
        ByteStr { bytes: Bytes::from(value.into_bytes()) }
    }
}

impl From<&'static str> for ByteStr {
    fn from(value: &'static str) -> Self {
        ByteStr::from_static(value)
    }
}

impl fmt::Display for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for ByteStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}
