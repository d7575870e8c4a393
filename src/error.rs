use std::error;
use std::fmt;
use std::io;
use std::str::Utf8Error;

use crate::protocol::{Endianness, HeaderField};
use crate::ObjectPathError;
use crate::Signature;
use crate::SignatureError;

/// Result alias using an [`Error`] as the error type by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// An error raised by this crate.
#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

impl Error {
    #[inline]
    pub(crate) fn new(kind: ErrorKind) -> Error {
        Self { kind }
    }

    #[inline]
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// Test if the error was caused by the connection being closed.
    ///
    /// Calls which were in flight when the connection shut down and any call
    /// made after it fail with this error.
    #[inline]
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, ErrorKind::ConnectionClosed)
    }

    /// Access the error name and message, if this error was caused by an
    /// error reply from the peer.
    #[inline]
    pub fn as_method_error(&self) -> Option<&MethodError> {
        match &self.kind {
            ErrorKind::Method(error) => Some(error),
            _ => None,
        }
    }
}

impl From<SignatureError> for Error {
    #[inline]
    fn from(error: SignatureError) -> Self {
        Self::new(ErrorKind::Signature(error))
    }
}

impl From<ObjectPathError> for Error {
    #[inline]
    fn from(error: ObjectPathError) -> Self {
        Self::new(ErrorKind::ObjectPath(error))
    }
}

impl From<io::Error> for Error {
    #[inline]
    fn from(error: io::Error) -> Self {
        Self::new(ErrorKind::Io(error))
    }
}

impl From<Utf8Error> for Error {
    #[inline]
    fn from(error: Utf8Error) -> Self {
        Self::new(ErrorKind::Utf8Error(error))
    }
}

impl From<MethodError> for Error {
    #[inline]
    fn from(error: MethodError) -> Self {
        Self::new(ErrorKind::Method(error))
    }
}

impl From<ErrorKind> for Error {
    #[inline]
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Display for Error {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ErrorKind::Io(error) => error.fmt(f),
            ErrorKind::Signature(error) => error.fmt(f),
            ErrorKind::ObjectPath(error) => error.fmt(f),
            ErrorKind::Utf8Error(error) => error.fmt(f),
            ErrorKind::Method(error) => error.fmt(f),
            ErrorKind::BufferUnderflow => write!(f, "Buffer underflow"),
            ErrorKind::NotNullTerminated => {
                write!(f, "String is not null terminated")
            }
            ErrorKind::ArrayTooLong(length) => {
                write!(f, "Array of length {length} is too long (max is 67108864)")
            }
            ErrorKind::BodyTooLong(length) => {
                write!(f, "Body of length {length} is too long (max is 134217728)")
            }
            ErrorKind::UnsupportedEndianness(endianness) => {
                write!(f, "Unsupported endianness marker {endianness:?}")
            }
            ErrorKind::UnsupportedVersion(version) => {
                write!(f, "Unsupported protocol version {version}")
            }
            ErrorKind::MissingBus => write!(f, "Missing session bus"),
            ErrorKind::InvalidAddress => write!(f, "Invalid d-bus address"),
            ErrorKind::InvalidSasl => write!(f, "Invalid SASL message"),
            ErrorKind::InvalidSaslResponse => write!(f, "Invalid SASL command"),
            ErrorKind::MissingPath => write!(f, "Missing required PATH header"),
            ErrorKind::MissingInterface => write!(f, "Missing required INTERFACE header"),
            ErrorKind::MissingMember => write!(f, "Missing required MEMBER header"),
            ErrorKind::MissingReplySerial => write!(f, "Missing required REPLY_SERIAL header"),
            ErrorKind::MissingErrorName => write!(f, "Missing required ERROR_NAME header"),
            ErrorKind::ZeroSerial => write!(f, "Zero in header serial"),
            ErrorKind::ZeroReplySerial => write!(f, "Zero REPLY_SERIAL header"),
            ErrorKind::DuplicateHeaderField(field) => {
                write!(f, "Duplicate header field {field:?}")
            }
            ErrorKind::InvalidHeaderField(field) => {
                write!(f, "Invalid value for header field {field:?}")
            }
            ErrorKind::UnixFdCountMismatch { declared, received } => {
                write!(
                    f,
                    "Header declares {declared} file descriptors, but {received} were received"
                )
            }
            ErrorKind::UnsupportedVariant(signature) => {
                write!(f, "Unsupported variant {signature:?}")
            }
            ErrorKind::SignatureMismatch { actual, expected } => {
                write!(f, "Got signature {actual:?}, but expected {expected:?}")
            }
            ErrorKind::HandlerAlreadyRegistered => {
                write!(f, "A handler is already registered for this path and interface")
            }
            ErrorKind::ConnectionClosed => write!(f, "Connection closed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(error) => Some(error),
            ErrorKind::Signature(error) => Some(error),
            ErrorKind::ObjectPath(error) => Some(error),
            ErrorKind::Utf8Error(error) => Some(error),
            ErrorKind::Method(error) => Some(error),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum ErrorKind {
    Io(io::Error),
    Signature(SignatureError),
    ObjectPath(ObjectPathError),
    Utf8Error(Utf8Error),
    BufferUnderflow,
    NotNullTerminated,
    ArrayTooLong(u32),
    BodyTooLong(u32),
    UnsupportedEndianness(Endianness),
    UnsupportedVersion(u8),
    MissingBus,
    InvalidAddress,
    InvalidSasl,
    InvalidSaslResponse,
    MissingPath,
    MissingInterface,
    MissingMember,
    MissingReplySerial,
    MissingErrorName,
    ZeroSerial,
    ZeroReplySerial,
    DuplicateHeaderField(HeaderField),
    InvalidHeaderField(HeaderField),
    UnixFdCountMismatch { declared: u32, received: u32 },
    UnsupportedVariant(Box<Signature>),
    SignatureMismatch {
        actual: Box<Signature>,
        expected: Box<Signature>,
    },
    HandlerAlreadyRegistered,
    ConnectionClosed,
    Method(MethodError),
}

/// An error name paired with a message, as carried by D-Bus error replies.
///
/// Method call handlers return this type to produce an error reply on the
/// wire, and error replies received from the peer surface it through
/// [`Error::as_method_error`].
///
/// # Examples
///
/// ```
/// use dbus_peer::MethodError;
///
/// let error = MethodError::new("org.example.Error.FileNotFound", "no such file");
/// assert_eq!(error.name(), "org.example.Error.FileNotFound");
/// assert_eq!(error.message(), "no such file");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodError {
    name: Box<str>,
    message: Box<str>,
}

impl MethodError {
    /// The standard error name reported for calls to a path and interface
    /// nobody has registered a handler for.
    pub const UNKNOWN_METHOD: &'static str = "org.freedesktop.DBus.Error.UnknownMethod";

    /// The standard error name reported when a handler fails in an
    /// unexpected way.
    pub const FAILED: &'static str = "org.freedesktop.DBus.Error.Failed";

    /// Construct a new method error with the given error name and message.
    pub fn new<N, M>(name: N, message: M) -> Self
    where
        N: Into<Box<str>>,
        M: Into<Box<str>>,
    {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }

    /// The dotted D-Bus error name, such as
    /// `org.freedesktop.DBus.Error.UnknownMethod`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The human readable error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for MethodError {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.message)
    }
}

impl error::Error for MethodError {}

/// Lets a method handler use `?` on any crate error, reporting it to the
/// caller as `org.freedesktop.DBus.Error.Failed`.
impl From<Error> for MethodError {
    fn from(error: Error) -> Self {
        match error.kind {
            ErrorKind::Method(error) => error,
            kind => Self::new(Self::FAILED, Error::new(kind).to_string()),
        }
    }
}
