use std::error;
use std::fmt;

use crate::proto::Type;

/// Detailed errors raised when validation of a [`Signature`] fails.
///
/// [`Signature`]: crate::Signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureError {
    pub(super) kind: SignatureErrorKind,
}

impl SignatureError {
    #[inline]
    pub(super) const fn new(kind: SignatureErrorKind) -> Self {
        Self { kind }
    }

    /// Indicate that a signature is too long.
    #[inline]
    pub(crate) const fn too_long() -> Self {
        Self::new(SignatureErrorKind::SignatureTooLong)
    }

    /// Indicate that a signature was not exactly one complete type.
    #[inline]
    pub(crate) const fn not_single_complete_type() -> Self {
        Self::new(SignatureErrorKind::NotSingleCompleteType)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureErrorKind {
    UnknownTypeCode(Type),
    SignatureTooLong,
    MissingArrayElementType,
    StructEndedButNotStarted,
    DictEndedButNotStarted,
    StructStartedButNotEnded,
    DictStartedButNotEnded,
    StructHasNoFields,
    DictKeyMustBeBasicType,
    DictEntryHasNoFields,
    DictEntryHasOnlyOneField,
    DictEntryHasTooManyFields,
    DictEntryNotInsideArray,
    ExceededMaximumArrayRecursion,
    ExceededMaximumStructRecursion,
    ExceededMaximumDepth,
    NotSingleCompleteType,
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureErrorKind::UnknownTypeCode(code) => {
                write!(f, "Unknown type code: {code:?}")
            }
            SignatureErrorKind::SignatureTooLong => {
                write!(f, "Signature too long")
            }
            SignatureErrorKind::MissingArrayElementType => {
                write!(f, "Missing array element type")
            }
            SignatureErrorKind::StructEndedButNotStarted => {
                write!(f, "Struct ended but not started")
            }
            SignatureErrorKind::DictEndedButNotStarted => {
                write!(f, "Dict ended but not started")
            }
            SignatureErrorKind::StructStartedButNotEnded => {
                write!(f, "Struct started but not ended")
            }
            SignatureErrorKind::DictStartedButNotEnded => {
                write!(f, "Dict started but not ended")
            }
            SignatureErrorKind::StructHasNoFields => {
                write!(f, "Struct has no fields")
            }
            SignatureErrorKind::DictKeyMustBeBasicType => {
                write!(f, "Dict key must be basic type")
            }
            SignatureErrorKind::DictEntryHasNoFields => {
                write!(f, "Dict entry has no fields")
            }
            SignatureErrorKind::DictEntryHasOnlyOneField => {
                write!(f, "Dict entry has only one field")
            }
            SignatureErrorKind::DictEntryHasTooManyFields => {
                write!(f, "Dict entry has too many fields")
            }
            SignatureErrorKind::DictEntryNotInsideArray => {
                write!(f, "Dict entry not inside array")
            }
            SignatureErrorKind::ExceededMaximumArrayRecursion => {
                write!(f, "Exceeded maximum array recursion")
            }
            SignatureErrorKind::ExceededMaximumStructRecursion => {
                write!(f, "Exceeded maximum struct recursion")
            }
            SignatureErrorKind::ExceededMaximumDepth => {
                write!(f, "Exceeded maximum container depth")
            }
            SignatureErrorKind::NotSingleCompleteType => {
                write!(f, "Signature is not a single complete type")
            }
        }
    }
}

impl error::Error for SignatureError {}
