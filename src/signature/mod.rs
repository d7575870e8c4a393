//! Types for working with D-Bus type signatures.

pub use self::signature::Signature;
mod signature;

pub use self::signature_buf::SignatureBuf;
mod signature_buf;

pub use self::signature_error::SignatureError;
pub(crate) use self::signature_error::SignatureErrorKind;
mod signature_error;

pub(crate) use self::validation::validate;
mod validation;


/// The maximum nesting depth of a single container kind.
pub(crate) const MAX_CONTAINER_DEPTH: usize = 32;

/// The maximum combined nesting depth of any signature.
pub(crate) const MAX_DEPTH: usize = MAX_CONTAINER_DEPTH * 2;
