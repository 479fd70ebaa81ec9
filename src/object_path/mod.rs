//! Object path names, such as `/org/freedesktop/DBus`.

#[cfg(test)]
mod tests;

pub use self::iter::Iter;
mod iter;

use self::validation::validate;
mod validation;

use std::borrow::{Borrow, ToOwned};
use std::error;
use std::fmt;
use std::ops::Deref;
use std::str::from_utf8_unchecked;

/// An error constructing an object path.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub struct ObjectPathError;

impl fmt::Display for ObjectPathError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid D-Bus object path")
    }
}

impl error::Error for ObjectPathError {}

/// A validated D-Bus object path.
///
/// Paths are `/`-separated sequences of `[A-Za-z0-9_]` elements rooted at
/// `/`; the root itself is a valid path.
///
/// # Examples
///
/// ```
/// use busline::ObjectPath;
///
/// const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");
///
/// assert!(ObjectPath::new(b"/").is_ok());
/// assert!(ObjectPath::new(b"/org//freedesktop").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct ObjectPath([u8]);

impl ObjectPath {
    /// The root path.
    pub const ROOT: &'static ObjectPath = ObjectPath::new_const(b"/");

    /// Construct a new validated object path.
    pub const fn new(bytes: &[u8]) -> Result<&Self, ObjectPathError> {
        if !validate(bytes) {
            return Err(ObjectPathError);
        }

        // SAFETY: just validated.
        Ok(unsafe { Self::new_unchecked(bytes) })
    }

    /// Construct an object path in a constant context, panicking if it is
    /// not valid.
    #[track_caller]
    pub const fn new_const(bytes: &[u8]) -> &Self {
        if !validate(bytes) {
            panic!("invalid D-Bus object path");
        }

        // SAFETY: just validated.
        unsafe { Self::new_unchecked(bytes) }
    }

    pub(crate) const unsafe fn new_unchecked(bytes: &[u8]) -> &Self {
        &*(bytes as *const [u8] as *const ObjectPath)
    }

    /// The path as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: validation only accepts ASCII.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// The path as a byte slice.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Iterate over the elements of the path.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::ObjectPath;
    ///
    /// let path = ObjectPath::new(b"/org/freedesktop/DBus")?;
    /// let parts = path.iter().collect::<Vec<_>>();
    /// assert_eq!(parts, ["org", "freedesktop", "DBus"]);
    /// # Ok::<_, busline::ObjectPathError>(())
    /// ```
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(&self.0)
    }
}

impl fmt::Debug for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for ObjectPath {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ToOwned for ObjectPath {
    type Owned = ObjectPathBuf;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        ObjectPathBuf::from(self)
    }
}

impl<'a> TryFrom<&'a str> for &'a ObjectPath {
    type Error = ObjectPathError;

    #[inline]
    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        ObjectPath::new(value.as_bytes())
    }
}

/// An owned D-Bus object path.
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct ObjectPathBuf {
    bytes: Vec<u8>,
}

impl ObjectPathBuf {
    /// Construct a new validated owned object path.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::ObjectPathBuf;
    ///
    /// let path = ObjectPathBuf::new(b"/org/freedesktop/DBus")?;
    /// assert_eq!(path.as_str(), "/org/freedesktop/DBus");
    /// # Ok::<_, busline::ObjectPathError>(())
    /// ```
    pub fn new(bytes: &[u8]) -> Result<Self, ObjectPathError> {
        if !validate(bytes) {
            return Err(ObjectPathError);
        }

        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Borrow as an [`ObjectPath`].
    #[inline]
    pub fn as_path(&self) -> &ObjectPath {
        // SAFETY: construction enforces validity.
        unsafe { ObjectPath::new_unchecked(&self.bytes) }
    }
}

impl Deref for ObjectPathBuf {
    type Target = ObjectPath;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_path()
    }
}

impl Borrow<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn borrow(&self) -> &ObjectPath {
        self.as_path()
    }
}

impl AsRef<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn as_ref(&self) -> &ObjectPath {
        self.as_path()
    }
}

impl From<&ObjectPath> for ObjectPathBuf {
    #[inline]
    fn from(value: &ObjectPath) -> Self {
        Self {
            bytes: value.as_bytes().to_vec(),
        }
    }
}

impl PartialEq<ObjectPath> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &ObjectPath) -> bool {
        self.as_path() == other
    }
}

impl PartialEq<&ObjectPath> for ObjectPathBuf {
    #[inline]
    fn eq(&self, other: &&ObjectPath) -> bool {
        self.as_path() == *other
    }
}

impl fmt::Debug for ObjectPathBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_path(), f)
    }
}

impl fmt::Display for ObjectPathBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_path(), f)
    }
}
