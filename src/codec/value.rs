use crate::error::{Error, ErrorKind, Result};
use crate::protocol::Type;
use crate::signature::validate;
use crate::{ObjectPath, Signature, SignatureBuf};

use super::{Decoder, Encoder};

/// A dynamically typed D-Bus value.
///
/// This covers the full marshaled type system with one recursive
/// enumeration, driven by validated signatures. It is how self-describing
/// payloads such as variants are decoded.
///
/// # Examples
///
/// ```
/// use dbus_peer::{Signature, Value};
///
/// let value = Value::Array(
///     Signature::STRING.to_owned(),
///     vec![Value::String(String::from("first")), Value::String(String::from("second"))],
/// );
///
/// assert_eq!(value.signature()?.as_str(), "as");
/// # Ok::<_, dbus_peer::Error>(())
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// An 8-bit unsigned integer, `y`.
    Byte(u8),
    /// A boolean, `b`.
    Bool(bool),
    /// A 16-bit signed integer, `n`.
    Int16(i16),
    /// A 16-bit unsigned integer, `q`.
    UInt16(u16),
    /// A 32-bit signed integer, `i`.
    Int32(i32),
    /// A 32-bit unsigned integer, `u`.
    UInt32(u32),
    /// A 64-bit signed integer, `x`.
    Int64(i64),
    /// A 64-bit unsigned integer, `t`.
    UInt64(u64),
    /// An IEEE 754 double, `d`.
    Double(f64),
    /// A string, `s`.
    String(String),
    /// An object path, `o`.
    ObjectPath(Box<ObjectPath>),
    /// A signature, `g`.
    Signature(Box<Signature>),
    /// An array of values sharing the element signature, `a`.
    Array(SignatureBuf, Vec<Value>),
    /// A dictionary with the given key and value signatures, `a{..}`.
    Dict(SignatureBuf, SignatureBuf, Vec<(Value, Value)>),
    /// A structure of heterogeneous fields, `(..)`.
    Struct(Vec<Value>),
    /// A variant carrying its own signature, `v`.
    Variant(Box<Value>),
}

impl Value {
    /// The signature describing this value.
    ///
    /// Errors if the value does not describe a marshalable type, such as an
    /// array with an empty element signature or a structure with no fields.
    pub fn signature(&self) -> Result<SignatureBuf> {
        let mut bytes = Vec::new();
        self.signature_into(&mut bytes);
        validate(&bytes)?;
        // SAFETY: Just validated above.
        Ok(unsafe { SignatureBuf::from_vec_unchecked(bytes) })
    }

    fn signature_into(&self, bytes: &mut Vec<u8>) {
        match self {
            Value::Byte(..) => bytes.push(b'y'),
            Value::Bool(..) => bytes.push(b'b'),
            Value::Int16(..) => bytes.push(b'n'),
            Value::UInt16(..) => bytes.push(b'q'),
            Value::Int32(..) => bytes.push(b'i'),
            Value::UInt32(..) => bytes.push(b'u'),
            Value::Int64(..) => bytes.push(b'x'),
            Value::UInt64(..) => bytes.push(b't'),
            Value::Double(..) => bytes.push(b'd'),
            Value::String(..) => bytes.push(b's'),
            Value::ObjectPath(..) => bytes.push(b'o'),
            Value::Signature(..) => bytes.push(b'g'),
            Value::Array(element, ..) => {
                bytes.push(b'a');
                bytes.extend_from_slice(element.as_bytes());
            }
            Value::Dict(key, value, ..) => {
                bytes.extend_from_slice(b"a{");
                bytes.extend_from_slice(key.as_bytes());
                bytes.extend_from_slice(value.as_bytes());
                bytes.push(b'}');
            }
            Value::Struct(fields) => {
                bytes.push(b'(');

                for field in fields {
                    field.signature_into(bytes);
                }

                bytes.push(b')');
            }
            Value::Variant(..) => bytes.push(b'v'),
        }
    }

    /// Append this value to the buffer.
    ///
    /// Container values verify that their contents match the container's
    /// declared signatures, so the bytes produced always match
    /// [`signature()`].
    ///
    /// [`signature()`]: Self::signature
    pub fn encode(&self, buf: &mut Encoder) -> Result<()> {
        match self {
            Value::Byte(value) => buf.write(value),
            Value::Bool(value) => buf.write(value),
            Value::Int16(value) => buf.write(value),
            Value::UInt16(value) => buf.write(value),
            Value::Int32(value) => buf.write(value),
            Value::UInt32(value) => buf.write(value),
            Value::Int64(value) => buf.write(value),
            Value::UInt64(value) => buf.write(value),
            Value::Double(value) => buf.write(value),
            Value::String(value) => buf.write(value.as_str()),
            Value::ObjectPath(value) => buf.write(&**value),
            Value::Signature(value) => buf.write(&**value),
            Value::Array(element, items) => {
                self.signature()?;

                for item in items {
                    item.expect_signature(element)?;
                }

                buf.write_array(|buf| {
                    for item in items {
                        item.encode(buf)?;
                    }

                    Ok(())
                })?;
            }
            Value::Dict(key, value, entries) => {
                self.signature()?;

                for (k, v) in entries {
                    k.expect_signature(key)?;
                    v.expect_signature(value)?;
                }

                buf.write_array(|buf| {
                    for (k, v) in entries {
                        buf.align(8);
                        k.encode(buf)?;
                        v.encode(buf)?;
                    }

                    Ok(())
                })?;
            }
            Value::Struct(fields) => {
                self.signature()?;
                buf.align(8);

                for field in fields {
                    field.encode(buf)?;
                }
            }
            Value::Variant(value) => {
                let signature = value.signature()?;
                buf.write(&*signature);
                value.encode(buf)?;
            }
        }

        Ok(())
    }

    /// Decode a single complete value of the given signature.
    pub fn decode(signature: &Signature, buf: &mut Decoder<'_>) -> Result<Value> {
        if !signature.is_single_complete() {
            return Err(Error::new(ErrorKind::UnsupportedVariant(signature.into())));
        }

        Self::decode_complete(signature, buf)
    }

    /// Decode a value whose signature is known to be a single complete type.
    fn decode_complete(signature: &Signature, buf: &mut Decoder<'_>) -> Result<Value> {
        let bytes = signature.as_bytes();

        match Type(bytes[0]) {
            Type::BYTE => Ok(Value::Byte(buf.read()?)),
            Type::BOOLEAN => Ok(Value::Bool(buf.read()?)),
            Type::INT16 => Ok(Value::Int16(buf.read()?)),
            Type::UINT16 => Ok(Value::UInt16(buf.read()?)),
            Type::INT32 => Ok(Value::Int32(buf.read()?)),
            Type::UINT32 => Ok(Value::UInt32(buf.read()?)),
            Type::INT64 => Ok(Value::Int64(buf.read()?)),
            Type::UINT64 => Ok(Value::UInt64(buf.read()?)),
            Type::DOUBLE => Ok(Value::Double(buf.read()?)),
            Type::STRING => Ok(Value::String(buf.read::<&str>()?.into())),
            Type::OBJECT_PATH => Ok(Value::ObjectPath(buf.read::<&ObjectPath>()?.into())),
            Type::SIGNATURE => Ok(Value::Signature(buf.read::<&Signature>()?.into())),
            Type::VARIANT => Ok(Value::Variant(Box::new(buf.read_variant()?))),
            Type::ARRAY if bytes.get(1) == Some(&b'{') => {
                let key = signature.slice_complete(2);
                let value = signature.slice_complete(2 + key.len());

                let entries = buf.read_array(|buf| {
                    buf.align(8)?;
                    let k = Self::decode_complete(key, buf)?;
                    let v = Self::decode_complete(value, buf)?;
                    Ok((k, v))
                })?;

                Ok(Value::Dict(key.to_owned(), value.to_owned(), entries))
            }
            Type::ARRAY => {
                let element = signature.slice_complete(1);
                let items = buf.read_array(|buf| Self::decode_complete(element, buf))?;
                Ok(Value::Array(element.to_owned(), items))
            }
            Type::OPEN_PAREN => {
                buf.align(8)?;

                let mut fields = Vec::new();
                let mut at = 1;

                while bytes[at] != b')' {
                    let field = signature.slice_complete(at);
                    at += field.len();
                    fields.push(Self::decode_complete(field, buf)?);
                }

                Ok(Value::Struct(fields))
            }
            _ => Err(Error::new(ErrorKind::UnsupportedVariant(signature.into()))),
        }
    }

    fn expect_signature(&self, expected: &Signature) -> Result<()> {
        let actual = self.signature()?;

        if *actual != *expected {
            return Err(Error::new(ErrorKind::SignatureMismatch {
                actual: Box::from(&*actual),
                expected: Box::from(expected),
            }));
        }

        Ok(())
    }
}
