use std::fmt;

use crate::error::Result;
use crate::{Signature, SignatureBuf};

use super::{Encode, Encoder, Value};

/// A buffer for building a message body.
///
/// Grows a signature alongside the encoded bytes, so the two always match.
///
/// # Examples
///
/// ```
/// use dbus_peer::{BodyBuf, Signature};
///
/// let mut body = BodyBuf::new();
///
/// body.write(&10u16)?;
/// body.write(&10u32)?;
///
/// assert_eq!(body.signature(), Signature::new(b"qu")?);
/// assert_eq!(body.get(), &[10, 0, 0, 0, 10, 0, 0, 0]);
/// # Ok::<_, dbus_peer::Error>(())
/// ```
#[derive(Clone, Default, PartialEq, Eq)]
pub struct BodyBuf {
    buf: Encoder,
    signature: SignatureBuf,
}

impl BodyBuf {
    /// Construct a new empty body.
    pub const fn new() -> Self {
        Self {
            buf: Encoder::new(),
            signature: SignatureBuf::new(),
        }
    }

    /// The signature of the values written so far.
    #[inline]
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Get the bytes written so far.
    #[inline]
    pub fn get(&self) -> &[u8] {
        self.buf.get()
    }

    /// The number of bytes written so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Test if the body is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Clear the body.
    pub fn clear(&mut self) {
        self.buf.truncate(0);
        self.signature.clear();
    }

    /// Append a value to the body and its signature to the body's signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write("Hello World!")?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"s")?);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    pub fn write<T>(&mut self, value: &T) -> Result<()>
    where
        T: ?Sized + Encode,
    {
        self.signature.extend_from_signature(T::SIGNATURE)?;
        value.encode(&mut self.buf);
        Ok(())
    }

    /// Append a dynamically typed [`Value`] to the body.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::{BodyBuf, Signature, Value};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_value(&Value::Variant(Box::new(Value::UInt32(42))))?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"v")?);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    pub fn write_value(&mut self, value: &Value) -> Result<()> {
        self.with_rollback(|this| {
            let signature = value.signature()?;
            this.signature.extend_from_signature(&signature)?;
            value.encode(&mut this.buf)
        })
    }

    /// Append an array with the given element signature to the body.
    ///
    /// The caller's `writer` is responsible for producing elements matching
    /// the element signature.
    ///
    /// # Examples
    ///
    /// ```
    /// use dbus_peer::{BodyBuf, Signature};
    ///
    /// let mut body = BodyBuf::new();
    ///
    /// body.write_array(Signature::UINT32, |buf| {
    ///     buf.write(&1u32);
    ///     buf.write(&2u32);
    ///     Ok(())
    /// })?;
    ///
    /// assert_eq!(body.signature(), Signature::new(b"au")?);
    /// assert_eq!(body.get(), &[8, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0]);
    /// # Ok::<_, dbus_peer::Error>(())
    /// ```
    pub fn write_array<F>(&mut self, element: &Signature, writer: F) -> Result<()>
    where
        F: FnOnce(&mut Encoder) -> Result<()>,
    {
        self.with_rollback(|this| {
            this.signature.extend_array(element)?;
            this.buf.write_array(writer)
        })
    }

    /// Append a dictionary with the given key and value signatures to the
    /// body.
    ///
    /// The caller's `writer` is responsible for aligning each entry to 8 and
    /// producing keys and values matching the given signatures.
    pub fn write_dict<F>(&mut self, key: &Signature, value: &Signature, writer: F) -> Result<()>
    where
        F: FnOnce(&mut Encoder) -> Result<()>,
    {
        self.with_rollback(|this| {
            this.signature.extend_dict(key, value)?;
            this.buf.write_array(writer)
        })
    }

    /// Run `f`, restoring the signature and the buffer to their previous
    /// state if it fails, so a failed composite write leaves the two
    /// matching.
    fn with_rollback<F>(&mut self, f: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let signature = self.signature.len();
        let buf = self.buf.len();

        let result = f(self);

        if result.is_err() {
            self.signature.truncate(signature);
            self.buf.truncate(buf);
        }

        result
    }
}

impl fmt::Debug for BodyBuf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyBuf")
            .field("signature", &self.signature)
            .field("len", &self.len())
            .finish()
    }
}
