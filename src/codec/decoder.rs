use std::str;

use crate::align::advance;
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
    impl Sealed for &str {}
    impl Sealed for &Signature {}
    impl Sealed for &ObjectPath {}
}

/// A value which can be read back out of a [`Decoder`].
pub trait Decode<'de>: Sized + self::sealed::Sealed {
    /// The signature of this type.
    const SIGNATURE: &'static Signature;

    /// Read `self` from the buffer.
    fn decode(buf: &mut Decoder<'de>) -> Result<Self>;
}

/// Reads D-Bus encoded values out of a byte buffer.
///
/// The cursor starts at the beginning of the buffer and every read aligns to
/// the natural boundary of the value being read, mirroring [`Encoder`].
/// Malformed or truncated input raises an error and never reads out of
/// bounds.
///
/// [`Encoder`]: crate::Encoder
///
/// # Examples
///
/// ```
/// use dbus_peer::Decoder;
///
/// let mut buf = Decoder::new(&[2, 0, 0, 0, b'h', b'i', 0]);
///
/// assert_eq!(buf.read::<&str>()?, "hi");
/// assert_eq!(buf.position(), 7);
/// # Ok::<_, dbus_peer::Error>(())
/// ```
pub struct Decoder<'de> {
    data: &'de [u8],
    pos: usize,
}

impl<'de> Decoder<'de> {
    /// Construct a new decoder over the given bytes.
    pub fn new(data: &'de [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// The current cursor position.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// The number of bytes remaining.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Test if the buffer is exhausted.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.data.len()
    }

    /// Skip the padding bytes up to the given alignment boundary.
    ///
    /// `boundary` must be a power of two.
    pub fn align(&mut self, boundary: usize) -> Result<()> {
        let at = advance(self.pos, boundary);

        if at > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        self.pos = at;
        Ok(())
    }

    /// Read a value from the buffer.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::Decoder;
    ///
    /// let mut buf = Decoder::new(&[16, 0, 0, 0, 32, 0, 0, 0]);
    ///
    /// assert_eq!(buf.read::<u16>()?, 16);
    /// assert_eq!(buf.read::<u32>()?, 32);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    #[inline]
    pub fn read<T>(&mut self) -> Result<T>
    where
        T: Decode<'de>,
    {
        T::decode(self)
    }

    /// Read an array from the buffer.
    ///
    /// Reads the 32-bit byte length of the array body, then invokes `reader`
    /// for one element at a time until the cursor reaches the end of the
    /// array body. An element which would read past the end of the body is
    /// an error.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::Decoder;
    ///
    /// let mut buf = Decoder::new(&[8, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
    /// let values = buf.read_array(|buf| buf.read::<u32>())?;
    ///
    /// assert_eq!(values, [1, 2]);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    pub fn read_array<T, F>(&mut self, mut reader: F) -> Result<Vec<T>>
    where
        F: FnMut(&mut Decoder<'de>) -> Result<T>,
    {
        let len = self.read::<u32>()?;

        if len > protocol::MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(len)));
        }

        let Some(end) = self.pos.checked_add(len as usize) else {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        };

        if end > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        // Bound the element reads at the end of the array body, so that an
        // overrunning element errors instead of consuming adjacent data.
        let mut body = Decoder {
            data: &self.data[..end],
            pos: self.pos,
        };

        let mut items = Vec::new();

        while !body.is_empty() {
            items.push(reader(&mut body)?);
        }

        self.pos = end;
        Ok(items)
    }

    /// Read a variant from the buffer, a signature followed by a single
    /// value of the signature's type.
    pub fn read_variant(&mut self) -> Result<Value> {
        let signature = self.read::<&Signature>()?;
        Value::decode(signature, self)
    }

    fn take(&mut self, n: usize) -> Result<&'de [u8]> {
        let Some(end) = self.pos.checked_add(n) else {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        };

        if end > self.data.len() {
            return Err(Error::new(ErrorKind::BufferUnderflow));
        }

        let bytes = &self.data[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    /// Read string framing, a 32-bit byte length followed by the bytes and a
    /// trailing NUL.
    fn take_string(&mut self) -> Result<&'de [u8]> {
        let len = self.read::<u32>()?;
        let bytes = self.take(len as usize)?;

        if self.take(1)? != [0] {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        Ok(bytes)
    }
}

impl<'de> Decode<'de> for u8 {
    const SIGNATURE: &'static Signature = Signature::BYTE;

    #[inline]
    fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
        Ok(buf.take(1)?[0])
    }
}

impl<'de> Decode<'de> for bool {
    const SIGNATURE: &'static Signature = Signature::BOOLEAN;

    #[inline]
    fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
        Ok(buf.read::<u32>()? != 0)
    }
}

macro_rules! decode_number {
    ($($ty:ty, $signature:ident, $boundary:literal),* $(,)?) => {
        $(
            impl<'de> Decode<'de> for $ty {
                const SIGNATURE: &'static Signature = Signature::$signature;

                #[inline]
                fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
                    buf.align($boundary)?;
                    let bytes = buf.take(std::mem::size_of::<$ty>())?;
                    let mut raw = [0; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    Ok(<$ty>::from_le_bytes(raw))
                }
            }
        )*
    }
}

decode_number! {
    i16, INT16, 2,
    u16, UINT16, 2,
    i32, INT32, 4,
    u32, UINT32, 4,
    i64, INT64, 8,
    u64, UINT64, 8,
    f64, DOUBLE, 8,
}

impl<'de> Decode<'de> for &'de str {
    const SIGNATURE: &'static Signature = Signature::STRING;

    #[inline]
    fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
        let bytes = buf.take_string()?;
        Ok(str::from_utf8(bytes)?)
    }
}

impl<'de> Decode<'de> for &'de ObjectPath {
    const SIGNATURE: &'static Signature = Signature::OBJECT_PATH;

    #[inline]
    fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
        let bytes = buf.take_string()?;
        Ok(ObjectPath::new(bytes)?)
    }
}

impl<'de> Decode<'de> for &'de Signature {
    const SIGNATURE: &'static Signature = Signature::SIGNATURE;

    #[inline]
    fn decode(buf: &mut Decoder<'de>) -> Result<Self> {
        let len = buf.take(1)?[0];
        let bytes = buf.take(len as usize)?;

        if buf.take(1)? != [0] {
            return Err(Error::new(ErrorKind::NotNullTerminated));
        }

        Ok(Signature::new(bytes)?)
    }
}
