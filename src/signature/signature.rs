use std::fmt;
use std::str::from_utf8_unchecked;

use crate::protocol::Type;

use super::{validate, SignatureBuf, SignatureError};

/// A D-Bus type signature.
///
/// This is an unsized wrapper over a validated signature string, so it is
/// always used behind a reference or a [`SignatureBuf`].
///
/// # Examples
///
/// ```
/// use dbus_peer::Signature;
///
/// const SIG: &Signature = Signature::new_const(b"aaaai");
///
/// assert!(Signature::new(b"a{sv}").is_ok());
/// assert!(Signature::new(b"a").is_err());
/// ```
#[derive(Hash, PartialEq, Eq)]
#[repr(transparent)]
pub struct Signature([u8]);

impl Signature {
    /// The empty signature.
    pub const EMPTY: &'static Signature = Signature::new_const(b"");

    /// A single byte.
    pub const BYTE: &'static Signature = Signature::new_const(b"y");

    /// A boolean, stored as a 32-bit integer on the wire.
    pub const BOOLEAN: &'static Signature = Signature::new_const(b"b");

    /// Signed (two's complement) 16-bit integer.
    pub const INT16: &'static Signature = Signature::new_const(b"n");

    /// Unsigned 16-bit integer.
    pub const UINT16: &'static Signature = Signature::new_const(b"q");

    /// Signed (two's complement) 32-bit integer.
    pub const INT32: &'static Signature = Signature::new_const(b"i");

    /// Unsigned 32-bit integer.
    pub const UINT32: &'static Signature = Signature::new_const(b"u");

    /// Signed (two's complement) 64-bit integer.
    pub const INT64: &'static Signature = Signature::new_const(b"x");

    /// Unsigned 64-bit integer.
    pub const UINT64: &'static Signature = Signature::new_const(b"t");

    /// IEEE 754 double-precision floating point.
    pub const DOUBLE: &'static Signature = Signature::new_const(b"d");

    /// A string.
    pub const STRING: &'static Signature = Signature::new_const(b"s");

    /// An object path.
    pub const OBJECT_PATH: &'static Signature = Signature::new_const(b"o");

    /// A type signature.
    pub const SIGNATURE: &'static Signature = Signature::new_const(b"g");

    /// A variant, carrying its own signature followed by a value.
    pub const VARIANT: &'static Signature = Signature::new_const(b"v");

    /// Unsigned 32-bit integer indexing into the out-of-band array of file
    /// descriptors transferred alongside a message.
    pub const UNIX_FD: &'static Signature = Signature::new_const(b"h");

    /// Construct a new signature with validation inside of a constant
    /// context.
    ///
    /// This will panic in case the signature is invalid.
    ///
    /// ```compile_fail
    /// use dbus_peer::Signature;
    ///
    /// const BAD: &Signature = Signature::new_const(b"(a)");
    /// ```
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::Signature;
    ///
    /// const SIG: &Signature = Signature::new_const(b"i(ai)");
    /// ```
    #[inline]
    #[track_caller]
    pub const fn new_const(signature: &[u8]) -> &Signature {
        if validate(signature).is_err() {
            panic!("Invalid D-Bus signature")
        };

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Self::new_unchecked(signature) }
    }

    /// Try to construct a new signature with validation.
    #[inline]
    pub const fn new(signature: &[u8]) -> Result<&Signature, SignatureError> {
        if let Err(error) = validate(signature) {
            return Err(error);
        };

        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { Ok(Self::new_unchecked(signature)) }
    }

    /// Construct a new signature without validation. The caller is
    /// responsible for ensuring that the signature is valid.
    ///
    /// # Safety
    ///
    /// The byte slice must be a valid signature.
    #[inline]
    pub(crate) const unsafe fn new_unchecked(signature: &[u8]) -> &Self {
        &*(signature as *const _ as *const Signature)
    }

    /// Test if the signature is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The length of the signature in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Get the signature as a string.
    #[inline]
    pub fn as_str(&self) -> &str {
        // SAFETY: Validation ensures that the signature is valid UTF-8.
        unsafe { from_utf8_unchecked(&self.0) }
    }

    /// Get the signature as a byte slice, without the trailing NUL used on
    /// the wire.
    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// The byte span of the complete type starting at `at`.
    ///
    /// The signature is already validated, so container brackets are known
    /// to be balanced.
    pub(crate) fn complete_span(&self, at: usize) -> usize {
        debug_assert!(at < self.0.len());
        let bytes = &self.0;
        let mut i = at;

        while i < bytes.len() && bytes[i] == b'a' {
            i += 1;
        }

        if i < bytes.len() && (bytes[i] == b'(' || bytes[i] == b'{') {
            let mut depth = 0usize;

            while i < bytes.len() {
                match bytes[i] {
                    b'(' | b'{' => depth += 1,
                    b')' | b'}' => depth -= 1,
                    _ => {}
                }

                i += 1;

                if depth == 0 {
                    break;
                }
            }
        } else {
            i += 1;
        }

        i - at
    }

    /// Test if the signature consists of exactly one complete type.
    #[inline]
    pub(crate) fn is_single_complete(&self) -> bool {
        !self.0.is_empty() && self.complete_span(0) == self.0.len()
    }

    /// Test if the signature is a single basic type.
    ///
    /// The variant is the only single-character signature which is not basic.
    #[inline]
    pub(crate) fn is_basic(&self) -> bool {
        self.0.len() == 1 && Type(self.0[0]) != Type::VARIANT
    }

    /// Borrow the complete type starting at `at` as its own signature.
    pub(crate) fn slice_complete(&self, at: usize) -> &Signature {
        let span = self.complete_span(at);
        // SAFETY: A complete type inside a valid signature is itself a valid
        // signature.
        unsafe { Signature::new_unchecked(&self.0[at..at + span]) }
    }
}

impl fmt::Display for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for Signature {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl ToOwned for Signature {
    type Owned = SignatureBuf;

    #[inline]
    fn to_owned(&self) -> Self::Owned {
        SignatureBuf::from(self)
    }
}

impl From<&Signature> for Box<Signature> {
    #[inline]
    fn from(signature: &Signature) -> Self {
        // SAFETY: The boxed byte slice is repr transparent over this type.
        unsafe {
            Box::from_raw(Box::into_raw(Box::<[u8]>::from(&signature.0)) as *mut Signature)
        }
    }
}

impl Clone for Box<Signature> {
    #[inline]
    fn clone(&self) -> Self {
        Box::<Signature>::from(&**self)
    }
}

impl PartialEq<SignatureBuf> for Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        *self == **other
    }
}

impl PartialEq<SignatureBuf> for &Signature {
    #[inline]
    fn eq(&self, other: &SignatureBuf) -> bool {
        **self == **other
    }
}
