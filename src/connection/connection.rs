use std::collections::hash_map::Entry;
use std::fmt;
use std::future::Future;
use std::num::NonZeroU32;
use std::os::unix::net::UnixStream;
use std::sync::Arc;

use tokio::io::unix::AsyncFd;
use tokio::runtime::Handle;
use tracing::debug;

use crate::codec::BodyBuf;
use crate::error::{Error, ErrorKind, MethodError, Result};
use crate::protocol::Flags;
use crate::transport::Transport;
use crate::{MessageHeader, ObjectPath};

use super::registry::{self, MethodFuture, Registration};
use super::shared::Shared;
use super::{frame, recv, ConnectionBuilder, Reply};

/// An asynchronous D-Bus connection.
///
/// A connection is either established against a message bus, which assigns
/// it a unique name and routes traffic between clients, or directly against
/// a peer over an existing stream through [`with_transport()`].
///
/// Cloning is cheap and all clones drive the same underlying connection.
/// When the last clone goes away the connection shuts down.
///
/// [`with_transport()`]: Self::with_transport
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
#[derive(Clone)]
pub struct Connection {
    pub(crate) shared: Arc<Shared>,
    /// Held for its drop side effect alone.
    _guard: Arc<CloseGuard>,
}

impl Connection {
    /// Connect to the session bus using the default configuration.
    #[inline]
    pub async fn session_bus() -> Result<Self> {
        ConnectionBuilder::new().session_bus().connect().await
    }

    /// Connect to the system bus using the default configuration.
    #[inline]
    pub async fn system_bus() -> Result<Self> {
        ConnectionBuilder::new().system_bus().connect().await
    }

    /// Construct a connection over an already connected stream.
    ///
    /// The stream is used as is: no authentication handshake runs and no
    /// `Hello()` call is made, so the connection has no unique name. This is
    /// how direct peer to peer connections are set up.
    ///
    /// # Panics
    ///
    /// Panics when called from outside a tokio runtime.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::os::unix::net::UnixStream;
    ///
    /// use dbus_peer::Connection;
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let (left, right) = UnixStream::pair()?;
    ///
    /// let a = Connection::with_transport(left)?;
    /// let b = Connection::with_transport(right)?;
    /// # Ok(()) }
    /// ```
    pub fn with_transport(stream: UnixStream) -> Result<Self> {
        let transport = Transport::from_std(stream);
        transport.set_nonblocking(true)?;
        Ok(Self::start(AsyncFd::new(transport)?))
    }

    /// Spawn the receive task and hand out the first handle.
    pub(crate) fn start(fd: AsyncFd<Transport>) -> Self {
        let shared = Arc::new(Shared::new(fd));
        shared.set_task(tokio::spawn(recv::run(shared.clone())));

        Self {
            _guard: Arc::new(CloseGuard {
                shared: shared.clone(),
            }),
            shared,
        }
    }

    /// The unique name the message bus assigned to this connection, such as
    /// `:1.172`.
    ///
    /// `None` for directly connected peers.
    pub fn unique_name(&self) -> Option<&str> {
        self.shared.unique_name()
    }

    /// Invoke a method on the peer and wait for its reply.
    ///
    /// `destination` names the connection to route the call to and is
    /// omitted for directly connected peers. The reply signature is whatever
    /// the remote method produces, check it with [`Reply::expect_signature`].
    ///
    /// Concurrent calls from clones of the same connection are fine, each
    /// caller gets the reply to its own call.
    ///
    /// # Errors
    ///
    /// Errors when the peer replies with a D-Bus error, surfaced through
    /// [`Error::as_method_error`], and when the connection closes before the
    /// reply arrives.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_peer::{bus, BodyBuf, Connection, Signature};
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = Connection::session_bus().await?;
    ///
    /// let mut body = BodyBuf::new();
    /// body.write("org.freedesktop.DBus")?;
    ///
    /// let reply = c
    ///     .send_method_call(
    ///         bus::PATH,
    ///         bus::INTERFACE,
    ///         "GetNameOwner",
    ///         Some(bus::DESTINATION),
    ///         &body,
    ///     )
    ///     .await?;
    ///
    /// let owner = reply.expect_signature(Signature::STRING)?.read::<&str>()?;
    /// # Ok(()) }
    /// ```
    pub async fn send_method_call(
        &self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        destination: Option<&str>,
        body: &BodyBuf,
    ) -> Result<Reply> {
        let serial = self.shared.next_serial();

        let frame = frame::method_call(
            serial,
            path,
            interface,
            member,
            destination,
            Flags::EMPTY,
            body,
        )?;

        // Interest is registered before the frame is written, so the reply
        // cannot race the registration.
        let reply = self.shared.expect_reply(serial)?;

        if let Err(error) = self.shared.send_frame(&frame).await {
            self.shared.forget_reply(serial);
            return Err(error);
        }

        match reply.await {
            Ok(result) => result,
            // The receive task dropped the sender without completing it.
            Err(_) => Err(Error::new(ErrorKind::ConnectionClosed)),
        }
    }

    /// Send a reply to a previously received method call.
    ///
    /// This is the raw reply path for messages handled outside of
    /// [`register_object()`], which replies on its own. `reply_serial` is
    /// the serial of the call being answered and `destination` its sender.
    ///
    /// [`register_object()`]: Self::register_object
    pub async fn send_method_return(
        &self,
        reply_serial: NonZeroU32,
        destination: Option<&str>,
        body: &BodyBuf,
    ) -> Result<()> {
        let serial = self.shared.next_serial();
        let frame = frame::method_return(serial, reply_serial, destination, body)?;
        self.shared.send_frame(&frame).await
    }

    /// Register a handler for a signal.
    ///
    /// The handler is invoked with the header and raw body bytes of every
    /// signal matching the path, interface and member, in registration order
    /// among handlers for the same selector. When connected to a message
    /// bus, a matching subscription is set up with a best effort `AddMatch`
    /// call.
    ///
    /// The handler stays registered until the returned [`Registration`] is
    /// dropped.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_peer::{Connection, ObjectPath};
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = Connection::session_bus().await?;
    ///
    /// let registration = c.register_signal_handler(
    ///     ObjectPath::new_const(b"/org/example/Player"),
    ///     "org.example.Player",
    ///     "TrackChanged",
    ///     |header, body| {
    ///         println!("{:?}: {} body bytes", header.member(), body.len());
    ///     },
    /// );
    /// # Ok(()) }
    /// ```
    pub fn register_signal_handler<F>(
        &self,
        path: &ObjectPath,
        interface: &str,
        member: &str,
        handler: F,
    ) -> Registration
    where
        F: Fn(&MessageHeader, &[u8]) + Send + Sync + 'static,
    {
        let key = registry::signal_key(path, interface, member);

        let id = {
            let mut handlers = self.shared.handlers();
            let id = handlers.next_id;
            handlers.next_id += 1;

            handlers
                .signals
                .entry(key.clone())
                .or_default()
                .push((id, Arc::new(handler)));

            id
        };

        let rule =
            format!("type='signal',path='{path}',interface='{interface}',member='{member}'");

        // Directly connected peers send every signal here, only a bus wants
        // a subscription.
        if self.shared.unique_name().is_some() {
            if let Ok(handle) = Handle::try_current() {
                let shared = self.shared.clone();
                let rule = rule.clone();

                handle.spawn(async move {
                    if let Err(error) = shared.add_match(&rule).await {
                        debug!(%error, "failed to add match rule");
                    }
                });
            }
        }

        Registration::signal(Arc::downgrade(&self.shared), key, id, rule)
    }

    /// Register a handler for method calls addressed to a path and
    /// interface.
    ///
    /// The handler is invoked with the header and raw body bytes of each
    /// call, on a task of its own. The body it returns is sent back as the
    /// method return; a [`MethodError`] is sent back as an error reply.
    ///
    /// The handler stays registered until the returned [`Registration`] is
    /// dropped.
    ///
    /// # Errors
    ///
    /// Errors if a handler is already registered for the same path and
    /// interface.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use dbus_peer::{BodyBuf, Connection, Decoder, ObjectPath};
    ///
    /// # #[tokio::main] async fn main() -> dbus_peer::Result<()> {
    /// let c = Connection::session_bus().await?;
    ///
    /// let registration = c.register_object(
    ///     ObjectPath::new_const(b"/org/example/Calculator"),
    ///     "org.example.Calculator",
    ///     |_header, body| async move {
    ///         let mut body = Decoder::new(&body);
    ///         let sum = body.read::<u32>()? + body.read::<u32>()?;
    ///
    ///         let mut reply = BodyBuf::new();
    ///         reply.write(&sum)?;
    ///         Ok(reply)
    ///     },
    /// )?;
    /// # Ok(()) }
    /// ```
    pub fn register_object<F, Fut>(
        &self,
        path: &ObjectPath,
        interface: &str,
        handler: F,
    ) -> Result<Registration>
    where
        F: Fn(Arc<MessageHeader>, Vec<u8>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<BodyBuf, MethodError>> + Send + 'static,
    {
        let key = registry::object_key(path, interface);

        {
            let mut handlers = self.shared.handlers();

            match handlers.objects.entry(key.clone()) {
                Entry::Occupied(_) => {
                    return Err(Error::new(ErrorKind::HandlerAlreadyRegistered));
                }
                Entry::Vacant(entry) => {
                    entry.insert(Arc::new(move |header, body| -> MethodFuture {
                        Box::pin(handler(header, body))
                    }));
                }
            }
        }

        Ok(Registration::object(Arc::downgrade(&self.shared), key))
    }

    /// Close the connection and wait for the receive task to finish.
    ///
    /// Calls still in flight, and calls made from here on, fail with an
    /// error for which [`Error::is_closed`] returns `true`. No handler
    /// invocation starts after this returns.
    pub async fn close(&self) {
        // Wakes the receive task, which fails the calls in flight.
        let _ = self.shared.fd.get_ref().shutdown();

        if let Some(task) = self.shared.take_task() {
            let _ = task.await;
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("unique_name", &self.unique_name())
            .finish_non_exhaustive()
    }
}

/// Shuts the connection down when the last handle goes away.
struct CloseGuard {
    shared: Arc<Shared>,
}

impl Drop for CloseGuard {
    fn drop(&mut self) {
        let _ = self.shared.fd.get_ref().shutdown();
    }
}
