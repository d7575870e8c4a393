use crate::codec::{BodyBuf, Decoder, Encoder, Value};
use crate::error::{Error, ErrorKind, Result};
use crate::{ObjectPath, Signature};

#[rustfmt::skip]
const DICT_BLOB: [u8; 24] = [
    // array of dict entries, byte length of the body = 20, which includes
    // the padding in front of the first entry
    20, 0, 0, 0,
    // pad to the 8-byte entry boundary
    0, 0, 0, 0,
    // byte 8: key "k"
    1, 0, 0, 0, b'k', 0,
    // byte 14: variant signature = u
    1, b'u', 0,
    // pad to 4-byte boundary
    0, 0, 0,
    // byte 20: 7
    7, 0, 0, 0,
];

#[test]
fn scalar_alignment() -> Result<()> {
    let mut buf = Encoder::new();
    buf.write(&0xaau8);
    buf.write(&0x12345678u32);

    assert_eq!(buf.get(), &[0xaa, 0, 0, 0, 0x78, 0x56, 0x34, 0x12]);

    let mut buf = Decoder::new(buf.get());
    assert_eq!(buf.read::<u8>()?, 0xaa);
    assert_eq!(buf.read::<u32>()?, 0x12345678);
    assert_eq!(buf.position(), 8);
    Ok(())
}

#[test]
fn string_framing() -> Result<()> {
    let mut buf = Encoder::new();
    buf.write("hi");

    assert_eq!(buf.get(), &[2, 0, 0, 0, b'h', b'i', 0]);

    let mut buf = Decoder::new(buf.get());
    assert_eq!(buf.read::<&str>()?, "hi");
    assert_eq!(buf.position(), 7);
    Ok(())
}

#[test]
fn natural_boundaries() -> Result<()> {
    let mut body = BodyBuf::new();
    body.write(&1u8)?;
    body.write(&2u16)?;
    body.write(&3u32)?;
    body.write(&4u64)?;

    assert_eq!(body.signature(), Signature::new(b"yqut")?);
    assert_eq!(
        body.get(),
        &[1, 0, 2, 0, 3, 0, 0, 0, 4, 0, 0, 0, 0, 0, 0, 0]
    );
    Ok(())
}

#[test]
fn dict_blob() -> Result<()> {
    let value = Value::Dict(
        Signature::STRING.to_owned(),
        Signature::VARIANT.to_owned(),
        vec![(
            Value::String(String::from("k")),
            Value::Variant(Box::new(Value::UInt32(7))),
        )],
    );

    let mut body = BodyBuf::new();
    body.write_value(&value)?;

    assert_eq!(body.signature(), Signature::new(b"a{sv}")?);
    assert_eq!(body.get(), &DICT_BLOB[..]);

    let mut buf = Decoder::new(body.get());
    let decoded = Value::decode(body.signature(), &mut buf)?;

    assert_eq!(decoded, value);
    assert_eq!(buf.position(), DICT_BLOB.len());
    Ok(())
}

#[test]
fn empty_array() -> Result<()> {
    let mut body = BodyBuf::new();
    body.write_array(Signature::STRING, |_| Ok(()))?;

    assert_eq!(body.signature(), Signature::new(b"as")?);
    assert_eq!(body.get(), &[0, 0, 0, 0]);

    let mut buf = Decoder::new(body.get());
    let names = buf.read_array(|buf| buf.read::<&str>())?;

    assert!(names.is_empty());
    assert!(buf.is_empty());
    Ok(())
}

#[test]
fn array_length_is_exact() -> Result<()> {
    let mut buf = Encoder::new();

    buf.write_array(|buf| {
        buf.write("first");
        buf.write("second");
        Ok(())
    })?;

    // 4 + "first" + NUL, pad to 4, 4 + "second" + NUL.
    assert_eq!(&buf.get()[..4], &[23, 0, 0, 0]);

    let mut buf = Decoder::new(buf.get());
    let names = buf.read_array(|buf| buf.read::<&str>())?;

    assert_eq!(names, ["first", "second"]);
    assert!(buf.is_empty());
    Ok(())
}

#[test]
fn array_element_overrun() {
    // Declares 6 bytes of body, which is not a whole number of u32
    // elements.
    let blob = [6, 0, 0, 0, 1, 0, 0, 0, 2, 0, 0, 0];

    let mut buf = Decoder::new(&blob);
    let error = buf.read_array(|buf| buf.read::<u32>()).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::BufferUnderflow));
}

#[test]
fn truncated_input() {
    let mut buf = Decoder::new(&[5, 0, 0, 0, b'h', b'i']);
    assert!(buf.read::<&str>().is_err());

    let mut buf = Decoder::new(&[1, 0]);
    assert!(buf.read::<u32>().is_err());

    let mut buf = Decoder::new(&[255, 255, 255, 255]);
    assert!(buf.read_array(|buf| buf.read::<u8>()).is_err());
}

#[test]
fn string_not_null_terminated() {
    let mut buf = Decoder::new(&[2, 0, 0, 0, b'h', b'i', 1]);
    let error = buf.read::<&str>().unwrap_err();
    assert_eq!(error.to_string(), "String is not null terminated");
}

#[test]
fn round_trip_values() -> Result<()> {
    let values = [
        Value::Byte(255),
        Value::Bool(true),
        Value::Int16(-2),
        Value::UInt16(2),
        Value::Int32(-3),
        Value::UInt32(3),
        Value::Int64(-4),
        Value::UInt64(4),
        Value::Double(3.5),
        Value::String(String::from("hello")),
        Value::ObjectPath(ObjectPath::new("/org/freedesktop/DBus")?.into()),
        Value::Signature(Signature::new(b"a{sv}")?.into()),
        Value::Array(
            Signature::INT32.to_owned(),
            vec![Value::Int32(1), Value::Int32(2), Value::Int32(3)],
        ),
        Value::Struct(vec![
            Value::Byte(1),
            Value::String(String::from("two")),
            Value::Struct(vec![Value::UInt64(3), Value::Bool(false)]),
        ]),
        Value::Variant(Box::new(Value::Array(
            Signature::STRING.to_owned(),
            vec![Value::String(String::from("inner"))],
        ))),
        Value::Dict(
            Signature::UINT32.to_owned(),
            Signature::STRING.to_owned(),
            vec![
                (Value::UInt32(1), Value::String(String::from("one"))),
                (Value::UInt32(2), Value::String(String::from("two"))),
            ],
        ),
    ];

    for value in values {
        let mut body = BodyBuf::new();
        // Leading byte to exercise non-zero starting alignment as well.
        body.write(&9u8)?;
        body.write_value(&value)?;

        let mut buf = Decoder::new(body.get());
        assert_eq!(buf.read::<u8>()?, 9);

        let signature = body.signature().slice_complete(1);
        let decoded = Value::decode(signature, &mut buf)?;

        assert_eq!(decoded, value, "{value:?}");
        assert!(buf.is_empty(), "{value:?}");
    }

    Ok(())
}

#[test]
fn array_signature_mismatch() {
    let value = Value::Array(
        Signature::UINT32.to_owned(),
        vec![Value::UInt32(1), Value::String(String::from("oops"))],
    );

    let mut buf = Encoder::new();
    let error = value.encode(&mut buf).unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::SignatureMismatch { .. }));
}

#[test]
fn variant_requires_single_complete_type() {
    // Variant signature "uu" is two complete types.
    let blob = [2, b'u', b'u', 0, 1, 0, 0, 0, 2, 0, 0, 0];

    let mut buf = Decoder::new(&blob);
    let error = buf.read_variant().unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::UnsupportedVariant(..)));
}

#[test]
fn unix_fd_variant_unsupported() {
    let blob = [1, b'h', 0, 0, 1, 0, 0, 0];

    let mut buf = Decoder::new(&blob);
    let error = buf.read_variant().unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::UnsupportedVariant(..)));
}

#[test]
fn failed_write_rolls_back() -> Result<()> {
    let mut body = BodyBuf::new();
    body.write(&1u8)?;

    let result = body.write_array(Signature::UINT32, |buf| {
        buf.write(&1u32);
        Err(Error::new(ErrorKind::BufferUnderflow))
    });

    assert!(result.is_err());
    assert_eq!(body.signature(), Signature::new(b"y")?);
    assert_eq!(body.get(), &[1]);
    Ok(())
}
