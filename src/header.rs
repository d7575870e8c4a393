use std::num::NonZeroU32;
use std::os::fd::OwnedFd;

use crate::codec::{Decoder, Value};
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{self, Endianness, Flags, HeaderField, MessageType};
use crate::{align, ObjectPath, Signature, SignatureBuf};

/// The fixed-size start of every message.
///
/// Covers the endianness marker, message type, flags, protocol version, body
/// length, serial, and the byte length of the header field array.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Preamble {
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) serial: NonZeroU32,
    pub(crate) body_length: u32,
    pub(crate) headers_length: u32,
}

impl Preamble {
    /// The size of the preamble on the wire.
    pub(crate) const SIZE: usize = 16;

    /// Parse and validate a preamble.
    ///
    /// Only little-endian version 1 peers are supported, and the declared
    /// body and header array lengths are checked against the protocol
    /// maximums before any allocation happens on their behalf.
    pub(crate) fn parse(bytes: &[u8; Self::SIZE]) -> Result<Preamble> {
        let mut buf = Decoder::new(bytes);

        let endianness = Endianness(buf.read::<u8>()?);

        if endianness != Endianness::LITTLE {
            return Err(Error::new(ErrorKind::UnsupportedEndianness(endianness)));
        }

        let message_type = MessageType(buf.read::<u8>()?);
        let flags = Flags(buf.read::<u8>()?);
        let version = buf.read::<u8>()?;

        if version != protocol::VERSION {
            return Err(Error::new(ErrorKind::UnsupportedVersion(version)));
        }

        let body_length = buf.read::<u32>()?;

        if body_length > protocol::MAX_BODY_LENGTH {
            return Err(Error::new(ErrorKind::BodyTooLong(body_length)));
        }

        let serial = NonZeroU32::new(buf.read::<u32>()?).ok_or(ErrorKind::ZeroSerial)?;
        let headers_length = buf.read::<u32>()?;

        if headers_length > protocol::MAX_ARRAY_LENGTH {
            return Err(Error::new(ErrorKind::ArrayTooLong(headers_length)));
        }

        Ok(Preamble {
            message_type,
            flags,
            serial,
            body_length,
            headers_length,
        })
    }

    /// The span of the header field array including the padding which aligns
    /// the start of the body to 8 bytes.
    pub(crate) fn headers_span(&self) -> usize {
        align::advance(self.headers_length as usize, 8)
    }

    /// The number of bytes which remain of the message past the preamble.
    pub(crate) fn remaining(&self) -> usize {
        self.headers_span() + self.body_length as usize
    }
}

/// The decoded header of a received message.
///
/// Combines the fixed preamble fields with the optional header fields, and
/// owns any file descriptors which accompanied the message. The descriptors
/// are closed when the header is dropped.
#[derive(Debug)]
pub struct MessageHeader {
    pub(crate) message_type: MessageType,
    pub(crate) flags: Flags,
    pub(crate) serial: NonZeroU32,
    pub(crate) path: Option<Box<ObjectPath>>,
    pub(crate) interface: Option<Box<str>>,
    pub(crate) member: Option<Box<str>>,
    pub(crate) error_name: Option<Box<str>>,
    pub(crate) reply_serial: Option<NonZeroU32>,
    pub(crate) destination: Option<Box<str>>,
    pub(crate) sender: Option<Box<str>>,
    pub(crate) signature: SignatureBuf,
    pub(crate) fds: Vec<OwnedFd>,
}

impl MessageHeader {
    /// Parse the header field array of a message.
    ///
    /// `headers` holds exactly the declared length of the field array,
    /// without the padding which aligns the body. Each field code may appear
    /// at most once, known codes must carry the variant type the protocol
    /// assigns to them, and unknown codes are skipped. The declared
    /// descriptor count must match the number of descriptors in `fds`.
    pub(crate) fn parse(
        preamble: &Preamble,
        headers: &[u8],
        fds: Vec<OwnedFd>,
    ) -> Result<MessageHeader> {
        let mut path = None;
        let mut interface = None;
        let mut member = None;
        let mut error_name = None;
        let mut reply_serial = None;
        let mut destination = None;
        let mut sender = None;
        let mut signature = None;
        let mut unix_fds = None;

        // The field array starts at message offset 16, so a buffer-relative
        // cursor aligns the same as the message-relative one.
        let mut buf = Decoder::new(headers);

        while !buf.is_empty() {
            buf.align(8)?;

            let field = HeaderField(buf.read::<u8>()?);
            let sig = buf.read::<&Signature>()?;

            match (field, sig.as_bytes()) {
                (HeaderField::PATH, b"o") => {
                    set(&mut path, buf.read::<&ObjectPath>()?.into(), field)?;
                }
                (HeaderField::INTERFACE, b"s") => {
                    set(&mut interface, buf.read::<&str>()?.into(), field)?;
                }
                (HeaderField::MEMBER, b"s") => {
                    set(&mut member, buf.read::<&str>()?.into(), field)?;
                }
                (HeaderField::ERROR_NAME, b"s") => {
                    set(&mut error_name, buf.read::<&str>()?.into(), field)?;
                }
                (HeaderField::REPLY_SERIAL, b"u") => {
                    let number = buf.read::<u32>()?;
                    let number = NonZeroU32::new(number).ok_or(ErrorKind::ZeroReplySerial)?;
                    set(&mut reply_serial, number, field)?;
                }
                (HeaderField::DESTINATION, b"s") => {
                    set(&mut destination, buf.read::<&str>()?.into(), field)?;
                }
                (HeaderField::SENDER, b"s") => {
                    set(&mut sender, buf.read::<&str>()?.into(), field)?;
                }
                (HeaderField::SIGNATURE, b"g") => {
                    set(&mut signature, buf.read::<&Signature>()?.to_owned(), field)?;
                }
                (HeaderField::UNIX_FDS, b"u") => {
                    set(&mut unix_fds, buf.read::<u32>()?, field)?;
                }
                (
                    HeaderField::PATH
                    | HeaderField::INTERFACE
                    | HeaderField::MEMBER
                    | HeaderField::ERROR_NAME
                    | HeaderField::REPLY_SERIAL
                    | HeaderField::DESTINATION
                    | HeaderField::SENDER
                    | HeaderField::SIGNATURE
                    | HeaderField::UNIX_FDS,
                    _,
                ) => {
                    return Err(Error::new(ErrorKind::InvalidHeaderField(field)));
                }
                (_, _) => {
                    Value::decode(sig, &mut buf)?;
                }
            }
        }

        let declared = unix_fds.unwrap_or(0);

        if declared as usize != fds.len() {
            return Err(Error::new(ErrorKind::UnixFdCountMismatch {
                declared,
                received: fds.len() as u32,
            }));
        }

        Ok(MessageHeader {
            message_type: preamble.message_type,
            flags: preamble.flags,
            serial: preamble.serial,
            path,
            interface,
            member,
            error_name,
            reply_serial,
            destination,
            sender,
            signature: signature.unwrap_or_default(),
            fds,
        })
    }

    /// The serial of the message.
    pub fn serial(&self) -> NonZeroU32 {
        self.serial
    }

    /// The flags of the message.
    pub fn flags(&self) -> Flags {
        self.flags
    }

    /// The object path the message is addressed to or emitted from.
    pub fn path(&self) -> Option<&ObjectPath> {
        self.path.as_deref()
    }

    /// The interface of the call or signal.
    pub fn interface(&self) -> Option<&str> {
        self.interface.as_deref()
    }

    /// The method or signal name.
    pub fn member(&self) -> Option<&str> {
        self.member.as_deref()
    }

    /// The name of the error, for error messages.
    pub fn error_name(&self) -> Option<&str> {
        self.error_name.as_deref()
    }

    /// The serial of the message this message is a reply to.
    pub fn reply_serial(&self) -> Option<NonZeroU32> {
        self.reply_serial
    }

    /// The connection name the message is intended for.
    pub fn destination(&self) -> Option<&str> {
        self.destination.as_deref()
    }

    /// The unique name of the sending connection, as filled in by the bus.
    pub fn sender(&self) -> Option<&str> {
        self.sender.as_deref()
    }

    /// The signature of the message body.
    pub fn signature(&self) -> &Signature {
        &self.signature
    }

    /// File descriptors received alongside the message, in peer order.
    pub fn fds(&self) -> &[OwnedFd] {
        &self.fds
    }
}

fn set<T>(slot: &mut Option<T>, value: T, field: HeaderField) -> Result<()> {
    if slot.is_some() {
        return Err(Error::new(ErrorKind::DuplicateHeaderField(field)));
    }

    *slot = Some(value);
    Ok(())
}
