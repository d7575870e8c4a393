//! An asynchronous D-Bus peer connection for Tokio.
//!
//! A [`Connection`] speaks the D-Bus wire protocol over a unix stream
//! socket, to a message bus or directly to another peer. It multiplexes
//! method calls, replies, signals, and registered method call handlers over
//! a single socket, so one connection can be cheaply shared across tasks by
//! cloning it.
//!
//! # Examples
//!
//! ```no_run
//! use dbus_peer::{bus, BodyBuf, Connection};
//!
//! #[tokio::main]
//! async fn main() -> dbus_peer::Result<()> {
//!     let c = Connection::session_bus().await?;
//!
//!     let mut body = BodyBuf::new();
//!     body.write("org.freedesktop.DBus")?;
//!
//!     let reply = c
//!         .send_method_call(
//!             bus::PATH,
//!             bus::INTERFACE,
//!             "GetNameOwner",
//!             Some(bus::DESTINATION),
//!             &body,
//!         )
//!         .await?;
//!
//!     let owner = reply.decoder().read::<&str>()?;
//!     println!("owned by {owner}");
//!     Ok(())
//! }
//! ```

#![allow(clippy::module_inception)]

#[macro_use]
mod macros;

pub mod align;

pub mod bus;

#[doc(inline)]
pub use self::codec::{BodyBuf, Decode, Decoder, Encode, Encoder, Value};
mod codec;

#[doc(inline)]
pub use self::connection::{Connection, ConnectionBuilder, Registration, Reply};
mod connection;

#[doc(inline)]
pub use self::error::{Error, MethodError, Result};
mod error;

#[doc(inline)]
pub use self::header::MessageHeader;
mod header;

#[doc(inline)]
pub use self::object_path::{ObjectPath, ObjectPathError};
mod object_path;

#[doc(inline)]
pub use self::protocol::{Endianness, Flags};
pub mod protocol;

mod sasl;

#[doc(inline)]
pub use self::signature::{Signature, SignatureBuf, SignatureError};
mod signature;

mod transport;
