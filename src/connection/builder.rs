use std::ffi::OsString;
use std::io;

use tokio::io::unix::AsyncFd;
use tracing::debug;

use crate::error::{Error, ErrorKind, Result};
use crate::sasl::{self, Auth, SaslResponse};
use crate::transport::Transport;

use super::shared::write_all;
use super::Connection;

/// The bus a connection is established against.
enum Bus {
    Session,
    System,
    Address(OsString),
}

/// Constructs a [`Connection`] with custom configuration.
///
/// # Examples
///
/// ```no_run
/// use dbus_peer::ConnectionBuilder;
///
/// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
/// let c = ConnectionBuilder::new()
///     .address("unix:path=/run/user/1000/bus")
///     .connect()
///     .await?;
/// # Ok(()) }
/// ```
pub struct ConnectionBuilder {
    bus: Bus,
    uid: Option<u32>,
}

impl ConnectionBuilder {
    /// Construct a new builder with the default configuration, connecting to
    /// the session bus.
    pub fn new() -> Self {
        Self {
            bus: Bus::Session,
            uid: None,
        }
    }

    /// Connect to the session bus, at the address in the
    /// `DBUS_SESSION_BUS_ADDRESS` environment variable.
    pub fn session_bus(mut self) -> Self {
        self.bus = Bus::Session;
        self
    }

    /// Connect to the system bus, at the address in the
    /// `DBUS_SYSTEM_BUS_ADDRESS` environment variable or the default system
    /// bus location.
    pub fn system_bus(mut self) -> Self {
        self.bus = Bus::System;
        self
    }

    /// Connect to the given address, such as `unix:path=/run/user/1000/bus`
    /// or `unix:abstract=name`.
    pub fn address<A>(mut self, address: A) -> Self
    where
        A: Into<OsString>,
    {
        self.bus = Bus::Address(address.into());
        self
    }

    /// Authenticate as the given Unix user id instead of the effective uid
    /// of the process.
    pub fn auth_uid(mut self, uid: u32) -> Self {
        self.uid = Some(uid);
        self
    }

    /// Establish the connection.
    ///
    /// Connects the transport, authenticates, and issues the `Hello()` call
    /// which registers the connection with the message bus and assigns its
    /// unique name. Any of these failing is fatal to establishment.
    pub async fn connect(self) -> Result<Connection> {
        let transport = match &self.bus {
            Bus::Session => Transport::session_bus()?,
            Bus::System => Transport::system_bus()?,
            Bus::Address(address) => Transport::connect(address.as_os_str())?,
        };

        transport.set_nonblocking(true)?;
        let fd = AsyncFd::new(transport)?;

        let uid = match self.uid {
            Some(uid) => uid,
            // SAFETY: getuid has no preconditions and cannot fail.
            None => unsafe { libc::getuid() },
        };

        authenticate(&fd, uid).await?;

        let connection = Connection::start(fd);
        connection.hello().await?;
        Ok(connection)
    }
}

impl Default for ConnectionBuilder {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

/// Run the line-oriented SASL exchange which precedes all binary traffic.
///
/// Authenticates as `uid` with the `EXTERNAL` mechanism, which the server
/// checks against the credentials of the socket.
async fn authenticate(fd: &AsyncFd<Transport>, uid: u32) -> Result<()> {
    let mut buf = [0; 32];
    let auth = Auth::external_from_u32_ascii_hex(&mut buf, uid);

    // The NUL preceding the handshake carries the credentials on platforms
    // which transmit them on the first byte.
    let mut line = vec![0];
    auth.extend_line(&mut line);
    line.extend_from_slice(b"\r\n");

    write_all(fd, &line).await?;

    let line = read_line(fd).await?;
    let SaslResponse::Ok(guid) = sasl::parse_response(&line)?;
    debug!(?guid, "authenticated");

    write_all(fd, b"BEGIN\r\n").await?;
    Ok(())
}

/// Read one `\r\n`-terminated line.
///
/// The server sends nothing past its response line until `BEGIN` has been
/// sent, so reading in chunks cannot consume binary protocol data.
async fn read_line(fd: &AsyncFd<Transport>) -> Result<Vec<u8>> {
    let mut line = Vec::new();

    loop {
        let mut chunk = [0; 256];

        let n = loop {
            let mut guard = fd.readable().await?;

            match guard.try_io(|fd| fd.get_ref().read_some(&mut chunk)) {
                Ok(n) => break n?,
                Err(_) => continue,
            }
        };

        if n == 0 {
            return Err(Error::new(ErrorKind::Io(
                io::ErrorKind::UnexpectedEof.into(),
            )));
        }

        line.extend_from_slice(&chunk[..n]);

        if line.ends_with(b"\r\n") {
            return Ok(line);
        }

        if line.len() > sasl::MAX_LINE {
            return Err(Error::new(ErrorKind::InvalidSasl));
        }
    }
}
