pub use self::builder::ConnectionBuilder;
mod builder;

pub use self::connection::Connection;
mod connection;

pub(crate) mod frame;

mod recv;

pub use self::registry::Registration;
mod registry;

pub use self::reply::Reply;
mod reply;

mod shared;

#[cfg(test)]
mod tests;
