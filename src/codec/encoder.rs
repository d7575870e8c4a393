use std::fmt;

use crate::align::padding;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol;
use crate::{ObjectPath, Signature};

use super::Value;

mod sealed {
    use crate::{ObjectPath, Signature};

    pub trait Sealed {}

    impl Sealed for u8 {}
    impl Sealed for bool {}
    impl Sealed for i16 {}
    impl Sealed for u16 {}
    impl Sealed for i32 {}
    impl Sealed for u32 {}
    impl Sealed for i64 {}
    impl Sealed for u64 {}
    impl Sealed for f64 {}
    impl Sealed for str {}
    impl Sealed for Signature {}
    impl Sealed for ObjectPath {}
}

/// A value which can be appended to an [`Encoder`].
pub trait Encode: self::sealed::Sealed {
    /// The signature of this type.
    const SIGNATURE: &'static Signature;

    /// Append `self` to the buffer.
    fn encode(&self, buf: &mut Encoder);
}

/// Appends D-Bus encoded values to a growable buffer.
///
/// Every value is aligned to its natural boundary relative to the start of
/// the buffer, with zeroed padding bytes.
///
/// # Examples
///
/// ```
/// use dbus_peer::Encoder;
///
/// let mut buf = Encoder::new();
/// buf.write(&16u16);
/// buf.write(&32u32);
///
/// assert_eq!(buf.get(), &[16, 0, 0, 0, 32, 0, 0, 0]);
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Encoder {
    data: Vec<u8>,
}

impl Encoder {
    /// Construct a new empty buffer.
    pub const fn new() -> Self {
        Self { data: Vec::new() }
    }

    /// The number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Test if the buffer is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Get the bytes written so far.
    #[inline]
    pub fn get(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub(crate) fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Pad the buffer with zero bytes up to the given alignment boundary.
    ///
    /// `boundary` must be a power of two.
    pub fn align(&mut self, boundary: usize) {
        let len = self.data.len() + padding(self.data.len(), boundary);
        self.data.resize(len, 0);
    }

    /// Append a value to the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::Encoder;
    ///
    /// let mut buf = Encoder::new();
    /// buf.write("hi");
    ///
    /// assert_eq!(buf.get(), &[2, 0, 0, 0, b'h', b'i', 0]);
    /// ```
    #[inline]
    pub fn write<T>(&mut self, value: &T)
    where
        T: ?Sized + Encode,
    {
        value.encode(self);
    }

    /// Append an array to the buffer.
    ///
    /// Aligns to 4 and reserves the length field, runs `writer` to produce
    /// the elements, then patches the length field with the number of bytes
    /// `writer` produced. Alignment padding written by `writer` before the
    /// first element counts towards the length.
    ///
    /// The caller is responsible for writing elements matching the array's
    /// element signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::Encoder;
    ///
    /// let mut buf = Encoder::new();
    ///
    /// buf.write_array(|buf| {
    ///     buf.write(&1u32);
    ///     buf.write(&2u32);
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(buf.get(), &[8, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    pub fn write_array<F>(&mut self, writer: F) -> Result<()>
    where
        F: FnOnce(&mut Encoder) -> Result<()>,
    {
        self.align(4);
        let at = self.data.len();
        self.data.extend_from_slice(&[0; 4]);

        let start = self.data.len();
        writer(self)?;
        let len = self.data.len() - start;

        if len > protocol::MAX_ARRAY_LENGTH as usize {
            return Err(Error::new(ErrorKind::ArrayTooLong(
                u32::try_from(len).unwrap_or(u32::MAX),
            )));
        }

        self.data[at..at + 4].copy_from_slice(&(len as u32).to_le_bytes());
        Ok(())
    }

    /// Append a variant to the buffer, the signature of the value followed
    /// by the value itself.
    pub fn write_variant(&mut self, value: &Value) -> Result<()> {
        let signature = value.signature()?;
        self.write(&*signature);
        value.encode(self)
    }

    #[inline]
    pub(crate) fn extend_from_slice(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[inline]
    pub(crate) fn extend_from_slice_nul(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
        self.data.push(0);
    }

    #[inline]
    pub(crate) fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }
}

impl fmt::Debug for Encoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encoder").field("len", &self.len()).finish()
    }
}

impl Encode for u8 {
    const SIGNATURE: &'static Signature = Signature::BYTE;

    #[inline]
    fn encode(&self, buf: &mut Encoder) {
        buf.data.push(*self);
    }
}

impl Encode for bool {
    const SIGNATURE: &'static Signature = Signature::BOOLEAN;

    #[inline]
    fn encode(&self, buf: &mut Encoder) {
        u32::from(*self).encode(buf);
    }
}

macro_rules! encode_number {
    ($($ty:ty, $signature:ident, $boundary:literal),* $(,)?) => {
        $(
            impl Encode for $ty {
                const SIGNATURE: &'static Signature = Signature::$signature;

                #[inline]
                fn encode(&self, buf: &mut Encoder) {
                    buf.align($boundary);
                    buf.extend_from_slice(&self.to_le_bytes());
                }
            }
        )*
    }
}

encode_number! {
    i16, INT16, 2,
    u16, UINT16, 2,
    i32, INT32, 4,
    u32, UINT32, 4,
    i64, INT64, 8,
    u64, UINT64, 8,
    f64, DOUBLE, 8,
}

/// Strings are marshaled as a 32-bit byte length, the bytes, and a trailing
/// NUL which does not count towards the length.
impl Encode for str {
    const SIGNATURE: &'static Signature = Signature::STRING;

    #[inline]
    fn encode(&self, buf: &mut Encoder) {
        (self.len() as u32).encode(buf);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}

impl Encode for ObjectPath {
    const SIGNATURE: &'static Signature = Signature::OBJECT_PATH;

    #[inline]
    fn encode(&self, buf: &mut Encoder) {
        (self.as_bytes().len() as u32).encode(buf);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}

/// Signatures are marshaled as a single byte length, the bytes, and a
/// trailing NUL, with no alignment.
impl Encode for Signature {
    const SIGNATURE: &'static Signature = Signature::SIGNATURE;

    #[inline]
    fn encode(&self, buf: &mut Encoder) {
        buf.data.push(self.len() as u8);
        buf.extend_from_slice_nul(self.as_bytes());
    }
}
