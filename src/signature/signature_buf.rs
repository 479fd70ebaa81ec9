use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use super::{validate, Signature, SignatureError, MAX_SIGNATURE};

/// An owned D-Bus signature.
///
/// # Examples
///
/// ```
/// use busline::{Signature, SignatureBuf};
///
/// let sig = SignatureBuf::new(b"a{sv}")?;
/// assert_eq!(&*sig, Signature::new(b"a{sv}")?);
/// # Ok::<_, busline::SignatureError>(())
/// ```
#[derive(Clone, Hash, PartialEq, Eq)]
pub struct SignatureBuf {
    bytes: Vec<u8>,
}

impl SignatureBuf {
    /// The empty signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::{Signature, SignatureBuf};
    ///
    /// assert_eq!(SignatureBuf::empty().as_sig(), Signature::EMPTY);
    /// ```
    pub fn empty() -> Self {
        Self { bytes: Vec::new() }
    }

    /// Construct a new validated owned signature.
    pub fn new(bytes: &[u8]) -> Result<Self, SignatureError> {
        validate(bytes)?;

        Ok(Self {
            bytes: bytes.to_vec(),
        })
    }

    /// Borrow as a [`Signature`].
    #[inline]
    pub fn as_sig(&self) -> &Signature {
        // SAFETY: construction enforces validity.
        unsafe { Signature::new_unchecked(&self.bytes) }
    }

    /// Append another signature to this one, such as when accumulating the
    /// signature of a message body one value at a time.
    pub(crate) fn extend(&mut self, other: &Signature) -> Result<(), SignatureError> {
        if self.bytes.len() + other.len() > MAX_SIGNATURE {
            return Err(SignatureError::too_long());
        }

        self.bytes.extend_from_slice(other.as_bytes());
        Ok(())
    }
}

impl Deref for SignatureBuf {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Self::Target {
        self.as_sig()
    }
}

impl Borrow<Signature> for SignatureBuf {
    #[inline]
    fn borrow(&self) -> &Signature {
        self.as_sig()
    }
}

impl AsRef<Signature> for SignatureBuf {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self.as_sig()
    }
}

impl From<&Signature> for SignatureBuf {
    #[inline]
    fn from(value: &Signature) -> Self {
        Self {
            bytes: value.as_bytes().to_vec(),
        }
    }
}

impl PartialEq<Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        self.as_sig() == other
    }
}

impl PartialEq<&Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        self.as_sig() == *other
    }
}

impl fmt::Debug for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_sig(), f)
    }
}

impl fmt::Display for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_sig(), f)
    }
}
