use std::borrow::ToOwned;
use std::fmt;
use std::str::from_utf8_unchecked;

use crate::proto::Type;

use super::{validate, Iter, SignatureBuf, SignatureError};

/// A validated D-Bus signature.
///
/// This is the borrowed unsized variant, analogous to [`str`]; the owned
/// counterpart is [`SignatureBuf`].
///
/// # Examples
///
/// ```
/// use busline::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"a{sv}");
///
/// assert!(Signature::new(b"aai").is_ok());
/// assert!(Signature::new(b"{is}").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// The signature of a string value.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// The signature of an object path value.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// The signature of an unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// The signature of a variant value.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// Construct a new validated signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::Signature;
    ///
    /// assert!(Signature::new(b"a(yv)").is_ok());
    /// assert!(Signature::new(b"a").is_err());
    /// ```
    pub const fn new(bytes: &[u8]) -> Result<&Self, SignatureError> {
        if let Err(error) = validate(bytes) {
            return Err(error);
        }

        // SAFETY: just validated.
        Ok(unsafe { Self::new_unchecked(bytes) })
    }

    /// Construct a new signature in a constant context, panicking if it is
    /// not valid.
    #[track_caller]
    pub const fn new_const(bytes: &[u8]) -> &Self {
        if validate(bytes).is_err() {
            panic!("invalid D-Bus signature");
        }

        // SAFETY: just validated.
        unsafe { Self::new_unchecked(bytes) }
    }

    /// Construct a signature without validation.
    ///
    /// # Safety
    ///
    /// The caller must ensure `bytes` is a valid signature.
    pub(crate) const unsafe fn new_unchecked(bytes: &[u8]) -> &Self {
        &*(bytes as *const [u8] as *const Signature)
    }

    /// The signature as a byte slice, without the trailing NUL used on the
    /// wire.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The signature as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: validation only accepts ASCII type codes.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// The length of the signature in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Test if the signature is empty.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::Signature;
    ///
    /// assert!(Signature::EMPTY.is_empty());
    /// assert!(!Signature::STRING.is_empty());
    /// ```
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the single complete types of this signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use busline::Signature;
    ///
    /// let sig = Signature::new(b"ia(yv)s")?;
    /// let types = sig.iter().map(|s| s.as_str()).collect::<Vec<_>>();
    /// assert_eq!(types, ["i", "a(yv)", "s"]);
    /// # Ok::<_, busline::SignatureError>(())
    /// ```
    #[inline]
    pub fn iter(&self) -> Iter<'_> {
        Iter::new(self)
    }

    /// The natural alignment in bytes of a value whose type starts this
    /// signature.
    pub(crate) fn alignment(&self) -> usize {
        match self.0.first() {
            Some(&b) => Type::new(b).alignment(),
            None => 1,
        }
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<Signature> for Signature {
    #[inline]
    fn as_ref(&self) -> &Signature {
        self
    }
}

impl ToOwned for Signature {
    type Owned = SignatureBuf;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        SignatureBuf::from(self)
    }
}

impl PartialEq<SignatureBuf> for Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        self == other.as_sig()
    }
}

impl<'a> TryFrom<&'a str> for &'a Signature {
    type Error = SignatureError;

    #[inline]
    fn try_from(value: &'a str) -> Result<Self, Self::Error> {
        Signature::new(value.as_bytes())
    }
}
