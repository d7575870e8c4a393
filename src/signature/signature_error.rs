use std::error;
use std::fmt;

use crate::protocol::Type;

/// An error raised when validating a D-Bus signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureError {
    kind: SignatureErrorKind,
}

impl SignatureError {
    #[inline]
    pub(crate) const fn new(kind: SignatureErrorKind) -> Self {
        Self { kind }
    }
}

impl fmt::Display for SignatureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SignatureErrorKind::UnknownTypeCode(t) => {
                write!(f, "Unknown type code {t:?}")
            }
            SignatureErrorKind::SignatureTooLong => {
                write!(f, "Signature is too long (max is 255 bytes)")
            }
            SignatureErrorKind::MissingArrayElementType => {
                write!(f, "Missing array element type")
            }
            SignatureErrorKind::StructEndedButNotStarted => {
                write!(f, "Struct ended but not started")
            }
            SignatureErrorKind::StructStartedButNotEnded => {
                write!(f, "Struct started but not ended")
            }
            SignatureErrorKind::StructHasNoFields => {
                write!(f, "Struct has no fields")
            }
            SignatureErrorKind::DictEndedButNotStarted => {
                write!(f, "Dict ended but not started")
            }
            SignatureErrorKind::DictStartedButNotEnded => {
                write!(f, "Dict started but not ended")
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
            SignatureErrorKind::DictKeyMustBeBasicType => {
                write!(f, "Dict key must be a basic type")
            }
            SignatureErrorKind::NotSingleCompleteType => {
                write!(f, "Expected a single complete type")
            }
            SignatureErrorKind::ExceededMaximumArrayRecursion => {
                write!(f, "Exceeded maximum array recursion")
            }
            SignatureErrorKind::ExceededMaximumStructRecursion => {
                write!(f, "Exceeded maximum struct recursion")
            }
            SignatureErrorKind::ExceededMaximumDictRecursion => {
                write!(f, "Exceeded maximum dict recursion")
            }
        }
    }
}

impl error::Error for SignatureError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SignatureErrorKind {
    UnknownTypeCode(Type),
    SignatureTooLong,
    MissingArrayElementType,
    StructEndedButNotStarted,
    StructStartedButNotEnded,
    StructHasNoFields,
    DictEndedButNotStarted,
    DictStartedButNotEnded,
    DictEntryHasNoFields,
    DictEntryHasOnlyOneField,
    DictEntryHasTooManyFields,
    DictEntryNotInsideArray,
    DictKeyMustBeBasicType,
    NotSingleCompleteType,
    ExceededMaximumArrayRecursion,
    ExceededMaximumStructRecursion,
    ExceededMaximumDictRecursion,
}
