use core::fmt;

/// A borrowed byte sequence which renders printable ASCII verbatim and
/// escapes everything else, for diagnostics over protocol lines which are
/// not guaranteed to be UTF-8.
#[repr(transparent)]
pub(crate) struct LossyStr([u8]);

impl LossyStr {
    #[inline]
    pub(crate) fn new(bytes: &[u8]) -> &Self {
        // SAFETY: LossyStr is repr(transparent) over [u8].
        unsafe { &*(bytes as *const [u8] as *const LossyStr) }
    }
}

impl fmt::Debug for LossyStr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"")?;

        for chunk in self.0.utf8_chunks() {
            for c in chunk.valid().chars() {
                match c {
                    '\r' => write!(f, "\\r")?,
                    '\n' => write!(f, "\\n")?,
                    '"' => write!(f, "\\\"")?,
                    c => write!(f, "{c}")?,
                }
            }

            for b in chunk.invalid() {
                write!(f, "\\x{b:02x}")?;
            }
        }

        write!(f, "\"")
    }
}

impl fmt::Display for LossyStr {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
