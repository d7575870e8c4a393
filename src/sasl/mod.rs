//! The line-oriented SASL handshake which precedes all D-Bus traffic.


use core::fmt;

use crate::error::{Error, ErrorKind, Result};

/// The longest response line accepted from the peer.
pub(crate) const MAX_LINE: usize = 4096;

/// A GUID received in an `OK` response.
#[derive(PartialEq, Eq)]
#[repr(transparent)]
pub(crate) struct Guid([u8]);

impl Guid {
    #[inline]
    pub(crate) fn new(guid: &[u8]) -> &Guid {
        // SAFETY: The byte slice is repr transparent over this type.
        unsafe { &*(guid as *const _ as *const Guid) }
    }
}

impl fmt::Debug for Guid {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guid")
            .field(&String::from_utf8_lossy(&self.0))
            .finish()
    }
}

/// A parsed response line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum SaslResponse<'a> {
    /// The OK message.
    Ok(&'a Guid),
}

/// The authentication command sent by this side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Auth<'a> {
    /// EXTERNAL authentication with literal payload.
    External(&'a [u8]),
}

impl<'a> Auth<'a> {
    /// Construct external authentication for the given uid.
    ///
    /// The payload is the ascii-hex encoding of the decimal digits of the
    /// uid, so uid 1000 becomes `31303030`.
    pub(crate) fn external_from_u32_ascii_hex(buf: &'a mut [u8; 32], mut id: u32) -> Auth<'a> {
        const HEX: [u8; 16] = *b"0123456789abcdef";

        if id == 0 {
            buf[..2].copy_from_slice(b"00");
            return Auth::External(&buf[..2]);
        }

        let mut digits = [0u8; 10];
        let mut at = digits.len();

        while id > 0 {
            at -= 1;
            digits[at] = (id % 10) as u8 + b'0';
            id /= 10;
        }

        let mut n = 0;

        for &digit in &digits[at..] {
            buf[n] = HEX[usize::from(digit >> 4)];
            buf[n + 1] = HEX[usize::from(digit & 0xf)];
            n += 2;
        }

        Auth::External(&buf[..n])
    }

    /// Append the authentication command, without the line terminator.
    pub(crate) fn extend_line(&self, line: &mut Vec<u8>) {
        match self {
            Auth::External(external) => {
                line.extend_from_slice(b"AUTH EXTERNAL ");
                line.extend_from_slice(external);
            }
        }
    }
}

/// Parse a response line, with or without the trailing CRLF.
pub(crate) fn parse_response(bytes: &[u8]) -> Result<SaslResponse<'_>> {
    let mut line = bytes;

    while let [head @ .., b'\r' | b'\n'] = line {
        line = head;
    }

    let Some(at) = line.iter().position(|&b| b == b' ') else {
        return Err(Error::new(ErrorKind::InvalidSasl));
    };

    let (command, rest) = (&line[..at], &line[at + 1..]);

    match command {
        b"OK" => Ok(SaslResponse::Ok(Guid::new(rest))),
        _ => Err(Error::new(ErrorKind::InvalidSaslResponse)),
    }
}
