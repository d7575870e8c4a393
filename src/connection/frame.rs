//! Assembly of complete outgoing message frames.

use std::num::NonZeroU32;

use crate::codec::{BodyBuf, Encoder};
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::{self, Endianness, Flags, HeaderField, MessageType};
use crate::{ObjectPath, Signature};

/// Assemble a method call frame.
pub(crate) fn method_call(
    serial: NonZeroU32,
    path: &ObjectPath,
    interface: &str,
    member: &str,
    destination: Option<&str>,
    flags: Flags,
    body: &BodyBuf,
) -> Result<Vec<u8>> {
    encode(serial, MessageType::METHOD_CALL, flags, body, |fields| {
        field(fields, HeaderField::PATH, Signature::OBJECT_PATH);
        fields.write(path);

        field(fields, HeaderField::INTERFACE, Signature::STRING);
        fields.write(interface);

        field(fields, HeaderField::MEMBER, Signature::STRING);
        fields.write(member);

        if let Some(destination) = destination {
            field(fields, HeaderField::DESTINATION, Signature::STRING);
            fields.write(destination);
        }
    })
}

/// Assemble a method return frame replying to `reply_serial`.
///
/// Replies never expect a reply of their own, so the frame carries the
/// `NO_REPLY_EXPECTED` flag.
pub(crate) fn method_return(
    serial: NonZeroU32,
    reply_serial: NonZeroU32,
    destination: Option<&str>,
    body: &BodyBuf,
) -> Result<Vec<u8>> {
    let message_type = MessageType::METHOD_RETURN;

    encode(serial, message_type, Flags::NO_REPLY_EXPECTED, body, |fields| {
        if let Some(destination) = destination {
            field(fields, HeaderField::DESTINATION, Signature::STRING);
            fields.write(destination);
        }

        field(fields, HeaderField::REPLY_SERIAL, Signature::UINT32);
        fields.write(&reply_serial.get());
    })
}

/// Assemble an error frame replying to `reply_serial`.
pub(crate) fn error(
    serial: NonZeroU32,
    reply_serial: NonZeroU32,
    destination: Option<&str>,
    error_name: &str,
    body: &BodyBuf,
) -> Result<Vec<u8>> {
    encode(serial, MessageType::ERROR, Flags::NO_REPLY_EXPECTED, body, |fields| {
        if let Some(destination) = destination {
            field(fields, HeaderField::DESTINATION, Signature::STRING);
            fields.write(destination);
        }

        field(fields, HeaderField::ERROR_NAME, Signature::STRING);
        fields.write(error_name);

        field(fields, HeaderField::REPLY_SERIAL, Signature::UINT32);
        fields.write(&reply_serial.get());
    })
}

/// Assemble a frame around `body`, with header fields written by `fields`.
///
/// The `SIGNATURE` field is appended to the declared fields whenever the body
/// is non-empty, and the body starts at the 8-aligned boundary after the
/// field array.
fn encode<F>(
    serial: NonZeroU32,
    message_type: MessageType,
    flags: Flags,
    body: &BodyBuf,
    fields: F,
) -> Result<Vec<u8>>
where
    F: FnOnce(&mut Encoder),
{
    if body.len() > protocol::MAX_BODY_LENGTH as usize {
        return Err(Error::new(ErrorKind::BodyTooLong(
            u32::try_from(body.len()).unwrap_or(u32::MAX),
        )));
    }

    let mut buf = Encoder::new();

    buf.write(&Endianness::LITTLE.0);
    buf.write(&message_type.0);
    buf.write(&flags.0);
    buf.write(&protocol::VERSION);
    buf.write(&(body.len() as u32));
    buf.write(&serial.get());

    buf.write_array(|buf| {
        fields(buf);

        if !body.is_empty() {
            field(buf, HeaderField::SIGNATURE, Signature::SIGNATURE);
            buf.write(body.signature());
        }

        Ok(())
    })?;

    buf.align(8);
    buf.extend_from_slice(body.get());
    Ok(buf.into_vec())
}

/// Write the start of a header field, the field code and the signature of
/// the variant which holds its value.
fn field(buf: &mut Encoder, field: HeaderField, signature: &Signature) {
    buf.align(8);
    buf.write(&field.0);
    buf.write(signature);
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroU32;

    use crate::codec::BodyBuf;
    use crate::error::Result;
    use crate::header::{MessageHeader, Preamble};
    use crate::protocol::{Flags, MessageType};
    use crate::ObjectPath;

    use super::{error, method_call, method_return};

    fn serial(number: u32) -> NonZeroU32 {
        NonZeroU32::new(number).unwrap()
    }

    /// Split a frame the way the receive loop does and parse it back.
    fn parse(frame: &[u8]) -> Result<(Preamble, MessageHeader, Vec<u8>)> {
        let mut preamble_bytes = [0; Preamble::SIZE];
        preamble_bytes.copy_from_slice(&frame[..Preamble::SIZE]);

        let preamble = Preamble::parse(&preamble_bytes)?;
        let rest = &frame[Preamble::SIZE..];
        assert_eq!(rest.len(), preamble.remaining());

        let headers = &rest[..preamble.headers_length as usize];
        let body = rest[preamble.headers_span()..].to_vec();

        let header = MessageHeader::parse(&preamble, headers, Vec::new())?;
        Ok((preamble, header, body))
    }

    #[test]
    fn method_call_frame() -> Result<()> {
        let mut body = BodyBuf::new();
        body.write("hello")?;
        body.write(&2u32)?;

        let frame = method_call(
            serial(32),
            ObjectPath::new_const(b"/org/example/Object"),
            "org.example.Greeter",
            "Greet",
            Some(":1.4"),
            Flags::EMPTY,
            &body,
        )?;

        let (preamble, header, frame_body) = parse(&frame)?;

        assert_eq!(preamble.message_type, MessageType::METHOD_CALL);
        assert!(!(preamble.flags & Flags::NO_REPLY_EXPECTED));
        assert_eq!(preamble.serial.get(), 32);

        assert_eq!(header.path(), ObjectPath::new("/org/example/Object").ok());
        assert_eq!(header.interface(), Some("org.example.Greeter"));
        assert_eq!(header.member(), Some("Greet"));
        assert_eq!(header.destination(), Some(":1.4"));
        assert_eq!(header.signature().as_str(), "su");
        assert_eq!(frame_body, body.get());
        Ok(())
    }

    #[test]
    fn method_return_frame() -> Result<()> {
        let mut body = BodyBuf::new();
        body.write(&7u32)?;

        let frame = method_return(serial(33), serial(32), Some(":1.6"), &body)?;
        let (preamble, header, frame_body) = parse(&frame)?;

        assert_eq!(preamble.message_type, MessageType::METHOD_RETURN);
        assert!(preamble.flags & Flags::NO_REPLY_EXPECTED);
        assert_eq!(preamble.serial.get(), 33);

        assert_eq!(header.reply_serial(), Some(serial(32)));
        assert_eq!(header.destination(), Some(":1.6"));
        assert_eq!(header.signature().as_str(), "u");
        assert_eq!(frame_body, body.get());
        Ok(())
    }

    #[test]
    fn error_frame() -> Result<()> {
        let mut body = BodyBuf::new();
        body.write("no such object")?;

        let frame = error(
            serial(34),
            serial(32),
            None,
            "org.freedesktop.DBus.Error.UnknownObject",
            &body,
        )?;

        let (preamble, header, frame_body) = parse(&frame)?;

        assert_eq!(preamble.message_type, MessageType::ERROR);
        assert_eq!(
            header.error_name(),
            Some("org.freedesktop.DBus.Error.UnknownObject")
        );
        assert_eq!(header.reply_serial(), Some(serial(32)));
        assert_eq!(header.destination(), None);
        assert_eq!(header.signature().as_str(), "s");
        assert_eq!(frame_body, body.get());
        Ok(())
    }

    #[test]
    fn empty_body_has_no_signature_field() -> Result<()> {
        let frame = method_call(
            serial(1),
            ObjectPath::new_const(b"/org/freedesktop/DBus"),
            "org.freedesktop.DBus",
            "Hello",
            Some("org.freedesktop.DBus"),
            Flags::EMPTY,
            &BodyBuf::new(),
        )?;

        let (preamble, header, frame_body) = parse(&frame)?;

        assert_eq!(preamble.body_length, 0);
        assert!(header.signature().is_empty());
        assert!(frame_body.is_empty());
        Ok(())
    }
}
