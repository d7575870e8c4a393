use std::borrow::Borrow;
use std::fmt;
use std::ops::Deref;

use super::{validate, Signature, SignatureError, SignatureErrorKind};

/// An owned growable D-Bus signature.
///
/// Grown by appending complete signature fragments, so it always holds a
/// valid signature.
///
/// # Examples
///
/// ```
/// use dbus_peer::{Signature, SignatureBuf};
///
/// let sig = SignatureBuf::from(Signature::new_const(b"a{sv}"));
/// assert_eq!(sig.as_str(), "a{sv}");
/// ```
#[derive(Clone)]
pub struct SignatureBuf(Vec<u8>);

impl SignatureBuf {
    /// Construct a new empty signature.
    #[inline]
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    /// Construct from raw bytes. The caller is responsible for ensuring that
    /// the bytes are a valid signature.
    ///
    /// # Safety
    ///
    /// The bytes must be a valid signature.
    #[inline]
    pub(crate) unsafe fn from_vec_unchecked(bytes: Vec<u8>) -> Self {
        debug_assert!(validate(&bytes).is_ok());
        Self(bytes)
    }

    /// Append a complete signature fragment.
    #[inline]
    pub(crate) fn extend_from_signature(&mut self, other: &Signature) -> Result<(), SignatureError> {
        if self.0.len() + other.len() > u8::MAX as usize {
            return Err(SignatureError::new(SignatureErrorKind::SignatureTooLong));
        }

        self.0.extend_from_slice(other.as_bytes());
        Ok(())
    }

    /// Append an array signature with the given element type.
    pub(crate) fn extend_array(&mut self, element: &Signature) -> Result<(), SignatureError> {
        if !element.is_single_complete() {
            return Err(SignatureError::new(SignatureErrorKind::NotSingleCompleteType));
        }

        let at = self.0.len();
        self.0.push(b'a');
        self.0.extend_from_slice(element.as_bytes());

        // Catches length and nesting depth overflows.
        if let Err(error) = validate(&self.0) {
            self.0.truncate(at);
            return Err(error);
        }

        Ok(())
    }

    /// Append a dictionary signature with the given key and value types.
    pub(crate) fn extend_dict(
        &mut self,
        key: &Signature,
        value: &Signature,
    ) -> Result<(), SignatureError> {
        if !key.is_basic() {
            return Err(SignatureError::new(SignatureErrorKind::DictKeyMustBeBasicType));
        }

        if !value.is_single_complete() {
            return Err(SignatureError::new(SignatureErrorKind::NotSingleCompleteType));
        }

        let at = self.0.len();
        self.0.extend_from_slice(b"a{");
        self.0.extend_from_slice(key.as_bytes());
        self.0.extend_from_slice(value.as_bytes());
        self.0.push(b'}');

        // Catches length and nesting depth overflows.
        if let Err(error) = validate(&self.0) {
            self.0.truncate(at);
            return Err(error);
        }

        Ok(())
    }

    /// Cut the signature back to `len` bytes.
    ///
    /// `len` must be a length at which the signature was previously observed,
    /// so that the remaining bytes are still a valid signature.
    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.0.truncate(len);
        debug_assert!(validate(&self.0).is_ok());
    }

    /// Clear the signature.
    #[inline]
    pub(crate) fn clear(&mut self) {
        self.0.clear();
    }
}

impl Default for SignatureBuf {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SignatureBuf {
    type Target = Signature;

    #[inline]
    fn deref(&self) -> &Self::Target {
        // SAFETY: The bytes are maintained as a valid signature.
        unsafe { Signature::new_unchecked(&self.0) }
    }
}

impl Borrow<Signature> for SignatureBuf {
    #[inline]
    fn borrow(&self) -> &Signature {
        self
    }
}

impl From<&Signature> for SignatureBuf {
    #[inline]
    fn from(signature: &Signature) -> Self {
        Self(signature.as_bytes().to_vec())
    }
}

impl fmt::Display for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl fmt::Debug for SignatureBuf {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        (**self).fmt(f)
    }
}

impl PartialEq for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Self) -> bool {
        **self == **other
    }
}

impl Eq for SignatureBuf {}

impl PartialEq<Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &Signature) -> bool {
        **self == *other
    }
}

impl PartialEq<&Signature> for SignatureBuf {
    #[inline]
    fn eq(&self, other: &&Signature) -> bool {
        **self == **other
    }
}
