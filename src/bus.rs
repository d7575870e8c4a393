//! Constants and calls for talking to the `org.freedesktop.DBus` message
//! bus service.
//!
//! These are thin wrappers over [`send_method_call()`], the connection
//! itself carries arbitrary traffic.
//!
//! [`send_method_call()`]: crate::Connection::send_method_call

use tracing::debug;

use crate::codec::BodyBuf;
use crate::error::Result;
use crate::{Connection, ObjectPath, Signature};

/// The well-known name of the message bus service.
pub const DESTINATION: &str = "org.freedesktop.DBus";

/// The interface of the message bus service.
pub const INTERFACE: &str = "org.freedesktop.DBus";

/// The object path of the message bus service.
pub const PATH: &ObjectPath = ObjectPath::new_const(b"/org/freedesktop/DBus");

raw_set! {
    /// Flags to a [`request_name()`] call.
    ///
    /// [`request_name()`]: Connection::request_name
    #[repr(u32)]
    pub enum NameFlag {
        /// An empty set of flags.
        EMPTY = 0,
        /// Allow another connection to take the name over while this one
        /// holds it.
        ALLOW_REPLACEMENT = 1,
        /// Attempt to take the name over from its current owner, succeeding
        /// only if that owner allows replacement.
        REPLACE_EXISTING = 2,
        /// Fail the request outright instead of queueing for the name when
        /// it cannot be owned right away.
        DO_NOT_QUEUE = 4,
    }
}

raw_enum! {
    /// The reply to a [`request_name()`] call.
    ///
    /// [`request_name()`]: Connection::request_name
    #[repr(u32)]
    pub enum NameReply {
        /// The caller is now the primary owner of the name.
        PRIMARY_OWNER = 1,
        /// The name already has an owner, and the caller has been placed in
        /// the queue for it.
        IN_QUEUE = 2,
        /// The name already has an owner and queueing was not requested, so
        /// the request failed.
        EXISTS = 3,
        /// The caller was already the primary owner of the name.
        ALREADY_OWNER = 4,
    }
}

impl Connection {
    /// Send the `Hello()` call which registers a freshly established
    /// connection with the message bus.
    ///
    /// The reply carries the unique name of the connection, which is
    /// recorded and exposed through [`unique_name()`].
    ///
    /// [`unique_name()`]: Connection::unique_name
    pub(crate) async fn hello(&self) -> Result<()> {
        let reply = self
            .send_method_call(PATH, INTERFACE, "Hello", Some(DESTINATION), &BodyBuf::new())
            .await?;

        let name = reply.expect_signature(Signature::STRING)?.read::<&str>()?;
        debug!(name, "connected to message bus");
        self.shared.set_unique_name(name.into());
        Ok(())
    }

    /// The names currently registered on the message bus, unique and
    /// well-known ones alike.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = dbus_peer::Connection::session_bus().await?;
    ///
    /// for name in c.list_names().await? {
    ///     println!("{name}");
    /// }
    /// # Ok(()) }
    /// ```
    pub async fn list_names(&self) -> Result<Vec<String>> {
        let reply = self
            .send_method_call(
                PATH,
                INTERFACE,
                "ListNames",
                Some(DESTINATION),
                &BodyBuf::new(),
            )
            .await?;

        reply
            .expect_signature(Signature::new_const(b"as"))?
            .read_array(|buf| Ok(buf.read::<&str>()?.to_owned()))
    }

    /// Request ownership of a well-known name on the message bus.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_peer::bus::{NameFlag, NameReply};
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = dbus_peer::Connection::session_bus().await?;
    ///
    /// let reply = c
    ///     .request_name("org.example.Player", NameFlag::DO_NOT_QUEUE)
    ///     .await?;
    ///
    /// assert_eq!(reply, NameReply::PRIMARY_OWNER);
    /// # Ok(()) }
    /// ```
    pub async fn request_name(&self, name: &str, flags: NameFlag) -> Result<NameReply> {
        let mut body = BodyBuf::new();
        body.write(name)?;
        body.write(&flags.0)?;

        let reply = self
            .send_method_call(PATH, INTERFACE, "RequestName", Some(DESTINATION), &body)
            .await?;

        let reply = reply.expect_signature(Signature::UINT32)?.read::<u32>()?;
        Ok(NameReply(reply))
    }
}
