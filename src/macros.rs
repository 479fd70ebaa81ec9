/// Declare a transparent protocol newtype with named constants.
///
/// Unknown discriminants are representable; `Debug` renders them as
/// `INVALID(value)` instead of panicking or lying.
macro_rules! raw_enum {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                match *self {
                    $(Self::$variant => f.write_str(stringify!($variant)),)*
                    Self(value) => write!(f, "INVALID({value})"),
                }
            }
        }
    }
}

/// Declare a transparent bit-set newtype with named bits.
///
/// `Debug` renders the named bits pipe-separated, with any leftover bits
/// in hex, e.g. `Flags(NO_REPLY_EXPECTED | NO_AUTO_START)` or `Flags(0)`.
macro_rules! raw_set {
    (
        $(#[doc = $doc:literal])*
        #[repr($repr:ty)]
        $vis:vis enum $name:ident {
            $(
                $(#[$($variant_meta:meta)*])*
                $variant:ident = $value:expr
            ),* $(,)?
        }
    ) => {
        $(#[doc = $doc])*
        #[derive(Default, Clone, Copy, PartialEq, Eq)]
        #[repr(transparent)]
        $vis struct $name(pub(crate) $repr);

        impl $name {
            $(
                $(#[$($variant_meta)*])*
                $vis const $variant: Self = Self($value);
            )*

            /// Test if every bit of `other` is set in `self`.
            $vis fn contains(self, other: Self) -> bool {
                (self.0 & other.0) == other.0
            }
        }

        impl ::core::ops::BitOr for $name {
            type Output = Self;

            #[inline]
            fn bitor(self, rhs: Self) -> Self {
                Self(self.0 | rhs.0)
            }
        }

        impl ::core::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                write!(f, "{}(", stringify!($name))?;

                let mut rest = self.0;
                let mut sep = "";

                $(
                    if $value != 0 && (rest & $value) == $value {
                        f.write_str(sep)?;
                        f.write_str(stringify!($variant))?;
                        sep = " | ";
                        rest &= !$value;
                    }
                )*

                if rest != 0 {
                    f.write_str(sep)?;
                    write!(f, "{rest:#x}")?;
                } else if sep.is_empty() {
                    f.write_str("0")?;
                }

                f.write_str(")")
            }
        }
    }
}
