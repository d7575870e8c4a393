use std::fmt;

use crate::codec::Decoder;
use crate::error::{Error, ErrorKind, Result};
use crate::{MessageHeader, Signature};

/// A successful reply to a method call.
///
/// Pairs the header of the reply with the raw bytes of its body. The body is
/// decoded on demand, typically through [`expect_signature()`].
///
/// [`expect_signature()`]: Self::expect_signature
pub struct Reply {
    header: MessageHeader,
    body: Vec<u8>,
}

impl Reply {
    pub(crate) fn new(header: MessageHeader, body: Vec<u8>) -> Self {
        Self { header, body }
    }

    /// The header of the reply.
    ///
    /// This gives access to the serial of the reply, the sender, and any file
    /// descriptors which accompanied it.
    #[inline]
    pub fn header(&self) -> &MessageHeader {
        &self.header
    }

    /// The signature of the reply body.
    #[inline]
    pub fn signature(&self) -> &Signature {
        self.header.signature()
    }

    /// The raw bytes of the reply body.
    #[inline]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// A [`Decoder`] positioned at the start of the reply body.
    #[inline]
    pub fn decoder(&self) -> Decoder<'_> {
        Decoder::new(&self.body)
    }

    /// A [`Decoder`] over the reply body, after checking that the body has
    /// the expected signature.
    ///
    /// # Errors
    ///
    /// Errors if the signature of the body differs from `expected`.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_peer::{BodyBuf, Connection, Signature};
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = Connection::session_bus().await?;
    ///
    /// let reply = c
    ///     .send_method_call(
    ///         dbus_peer::bus::PATH,
    ///         dbus_peer::bus::INTERFACE,
    ///         "GetId",
    ///         Some(dbus_peer::bus::DESTINATION),
    ///         &BodyBuf::new(),
    ///     )
    ///     .await?;
    ///
    /// let id = reply.expect_signature(Signature::STRING)?.read::<&str>()?;
    /// # Ok(()) }
    /// ```
    pub fn expect_signature(&self, expected: &Signature) -> Result<Decoder<'_>> {
        if self.signature() != expected {
            return Err(Error::new(ErrorKind::SignatureMismatch {
                actual: self.signature().into(),
                expected: expected.into(),
            }));
        }

        Ok(self.decoder())
    }
}

impl fmt::Debug for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reply")
            .field("header", &self.header)
            .field("len", &self.body.len())
            .finish()
    }
}
