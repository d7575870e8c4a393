//! The D-Bus wire codec.
//!
//! Everything on the wire is little endian and aligned to the natural
//! boundary of the value being stored, with zeroed padding bytes. The
//! [`Encoder`] appends values to a growable buffer, the [`Decoder`] reads
//! them back out of a received one, and [`Value`] covers the full type
//! system for self-describing payloads such as variants.

pub use self::body::BodyBuf;
mod body;

pub use self::decoder::{Decode, Decoder};
mod decoder;

pub use self::encoder::{Encode, Encoder};
mod encoder;

pub use self::value::Value;
mod value;

#[cfg(test)]
mod tests;
