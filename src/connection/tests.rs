use std::io::{Read, Write};
use std::num::NonZeroU32;
use std::os::unix::net::{UnixListener, UnixStream};
use std::sync::Arc;
use std::thread;
use std::{env, fs, process};

use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Notify;

use crate::codec::{BodyBuf, Decoder, Encoder};
use crate::error::{ErrorKind, MethodError, Result};
use crate::header::{MessageHeader, Preamble};
use crate::protocol::{self, Endianness, Flags, HeaderField, MessageType};
use crate::{Connection, ConnectionBuilder, ObjectPath, Signature};

use super::frame;

const PATH: &ObjectPath = ObjectPath::new_const(b"/org/example/Object");
const INTERFACE: &str = "org.example.Frobnicator";

fn serial(number: u32) -> NonZeroU32 {
    NonZeroU32::new(number).unwrap()
}

/// Two connections talking directly to each other.
fn pair() -> Result<(Connection, Connection)> {
    let (left, right) = UnixStream::pair()?;
    Ok((
        Connection::with_transport(left)?,
        Connection::with_transport(right)?,
    ))
}

/// A connection and the blocking socket of its peer.
fn raw_pair() -> Result<(Connection, UnixStream)> {
    let (left, right) = UnixStream::pair()?;
    Ok((Connection::with_transport(left)?, right))
}

/// Read one message from a blocking socket.
fn read_message(mut stream: &UnixStream) -> Result<(MessageHeader, Vec<u8>)> {
    let mut preamble = [0; Preamble::SIZE];
    stream.read_exact(&mut preamble)?;

    let preamble = Preamble::parse(&preamble)?;
    let mut rest = vec![0; preamble.remaining()];
    stream.read_exact(&mut rest)?;

    let headers = &rest[..preamble.headers_length as usize];
    let header = MessageHeader::parse(&preamble, headers, Vec::new())?;
    let body = rest.split_off(preamble.headers_span());
    Ok((header, body))
}

/// Assemble a signal frame the way a peer would.
fn signal_frame(
    serial: NonZeroU32,
    path: &ObjectPath,
    interface: &str,
    member: &str,
    body: &BodyBuf,
) -> Result<Vec<u8>> {
    let mut buf = Encoder::new();

    buf.write(&Endianness::LITTLE.0);
    buf.write(&MessageType::SIGNAL.0);
    buf.write(&Flags::EMPTY.0);
    buf.write(&protocol::VERSION);
    buf.write(&(body.len() as u32));
    buf.write(&serial.get());

    buf.write_array(|buf| {
        buf.align(8);
        buf.write(&HeaderField::PATH.0);
        buf.write(Signature::OBJECT_PATH);
        buf.write(path);

        buf.align(8);
        buf.write(&HeaderField::INTERFACE.0);
        buf.write(Signature::STRING);
        buf.write(interface);

        buf.align(8);
        buf.write(&HeaderField::MEMBER.0);
        buf.write(Signature::STRING);
        buf.write(member);

        if !body.is_empty() {
            buf.align(8);
            buf.write(&HeaderField::SIGNATURE.0);
            buf.write(Signature::SIGNATURE);
            buf.write(body.signature());
        }

        Ok(())
    })?;

    buf.align(8);
    buf.extend_from_slice(body.get());
    Ok(buf.into_vec())
}

/// Register a handler which forwards the leading body string of each signal.
fn forward_signals(
    c: &Connection,
    member: &str,
    tx: UnboundedSender<String>,
) -> super::Registration {
    c.register_signal_handler(PATH, INTERFACE, member, move |_, body| {
        let value = Decoder::new(body).read::<&str>().unwrap().to_owned();
        tx.send(value).unwrap();
    })
}

#[tokio::test]
async fn call_and_reply() -> Result<()> {
    let (a, b) = pair()?;

    assert_eq!(a.unique_name(), None);

    let _registration = b.register_object(PATH, INTERFACE, |header, body| async move {
        assert_eq!(header.member(), Some("Frobnicate"));

        let mut body = Decoder::new(&body);
        let name = body.read::<&str>()?;
        let count = body.read::<u32>()?;

        let mut reply = BodyBuf::new();
        reply.write(format!("{name}!").as_str())?;
        reply.write(&(count + 1))?;
        Ok(reply)
    })?;

    let mut body = BodyBuf::new();
    body.write("spin")?;
    body.write(&41u32)?;

    let reply = a
        .send_method_call(PATH, INTERFACE, "Frobnicate", None, &body)
        .await?;

    let mut reply = reply.expect_signature(Signature::new(b"su")?)?;
    assert_eq!(reply.read::<&str>()?, "spin!");
    assert_eq!(reply.read::<u32>()?, 42);
    Ok(())
}

#[tokio::test]
async fn replies_correlate_out_of_order() -> Result<()> {
    let (a, b) = pair()?;

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());

    let _registration = b.register_object(PATH, INTERFACE, {
        let started = started.clone();
        let release = release.clone();

        move |header, _| {
            let started = started.clone();
            let release = release.clone();

            async move {
                let mut reply = BodyBuf::new();

                if header.member() == Some("Slow") {
                    started.notify_one();
                    release.notified().await;
                    reply.write("slow")?;
                } else {
                    reply.write("fast")?;
                }

                Ok(reply)
            }
        }
    })?;

    let slow = tokio::spawn({
        let a = a.clone();

        async move {
            a.send_method_call(PATH, INTERFACE, "Slow", None, &BodyBuf::new())
                .await
        }
    });

    // The slow call holds its serial before the fast one is sent.
    started.notified().await;

    let fast = a
        .send_method_call(PATH, INTERFACE, "Fast", None, &BodyBuf::new())
        .await?;

    assert_eq!(fast.expect_signature(Signature::STRING)?.read::<&str>()?, "fast");

    release.notify_one();

    let slow = slow.await.unwrap()?;
    assert_eq!(slow.expect_signature(Signature::STRING)?.read::<&str>()?, "slow");
    Ok(())
}

#[tokio::test]
async fn concurrent_calls_keep_their_replies() -> Result<()> {
    let (a, b) = pair()?;

    let _registration = b.register_object(PATH, INTERFACE, |_, body| async move {
        let tag = Decoder::new(&body).read::<u32>()?;

        let mut reply = BodyBuf::new();
        reply.write(&tag)?;
        Ok(reply)
    })?;

    let calls = (0..16u32).map(|tag| {
        let a = a.clone();

        async move {
            let mut body = BodyBuf::new();
            body.write(&tag)?;

            let reply = a.send_method_call(PATH, INTERFACE, "Tag", None, &body).await?;
            reply.expect_signature(Signature::UINT32)?.read::<u32>()
        }
    });

    let tags = futures::future::try_join_all(calls).await?;
    assert_eq!(tags, (0..16).collect::<Vec<_>>());
    Ok(())
}

#[tokio::test]
async fn error_replies_surface_as_method_errors() -> Result<()> {
    let (a, b) = pair()?;

    let _registration = b.register_object(PATH, INTERFACE, |_, _| async move {
        Err::<BodyBuf, _>(MethodError::new("org.example.Error.Denied", "not today"))
    })?;

    let error = a
        .send_method_call(PATH, INTERFACE, "Frobnicate", None, &BodyBuf::new())
        .await
        .unwrap_err();

    let error = error.as_method_error().unwrap();
    assert_eq!(error.name(), "org.example.Error.Denied");
    assert_eq!(error.message(), "not today");
    Ok(())
}

#[tokio::test]
async fn unknown_calls_get_an_error_reply() -> Result<()> {
    let (a, b) = pair()?;

    let error = a
        .send_method_call(PATH, INTERFACE, "Frobnicate", None, &BodyBuf::new())
        .await
        .unwrap_err();

    let method_error = error.as_method_error().unwrap();
    assert_eq!(method_error.name(), MethodError::UNKNOWN_METHOD);
    assert!(method_error.message().contains("Frobnicate"));
    assert!(method_error.message().contains(INTERFACE));

    // The connection keeps serving, and late registrations take effect.
    let _registration = b.register_object(PATH, INTERFACE, |_, _| async move {
        let mut reply = BodyBuf::new();
        reply.write("present")?;
        Ok(reply)
    })?;

    let reply = a
        .send_method_call(PATH, INTERFACE, "Frobnicate", None, &BodyBuf::new())
        .await?;

    assert_eq!(reply.expect_signature(Signature::STRING)?.read::<&str>()?, "present");
    Ok(())
}

#[tokio::test]
async fn calls_in_flight_fail_on_close() -> Result<()> {
    let (a, b) = pair()?;

    let started = Arc::new(Notify::new());

    let _registration = b.register_object(PATH, INTERFACE, {
        let started = started.clone();

        move |_, _| {
            let started = started.clone();

            async move {
                started.notify_one();
                std::future::pending::<Result<BodyBuf, MethodError>>().await
            }
        }
    })?;

    let call = tokio::spawn({
        let a = a.clone();

        async move {
            a.send_method_call(PATH, INTERFACE, "Hang", None, &BodyBuf::new())
                .await
        }
    });

    started.notified().await;
    a.close().await;

    let error = call.await.unwrap().unwrap_err();
    assert!(error.is_closed());

    let error = a
        .send_method_call(PATH, INTERFACE, "Hang", None, &BodyBuf::new())
        .await
        .unwrap_err();

    assert!(error.is_closed());
    Ok(())
}

#[tokio::test]
async fn calls_in_flight_fail_when_the_peer_goes_away() -> Result<()> {
    let (a, b) = pair()?;

    let started = Arc::new(Notify::new());

    let _registration = b.register_object(PATH, INTERFACE, {
        let started = started.clone();

        move |_, _| {
            let started = started.clone();

            async move {
                started.notify_one();
                std::future::pending::<Result<BodyBuf, MethodError>>().await
            }
        }
    })?;

    let call = tokio::spawn({
        let a = a.clone();

        async move {
            a.send_method_call(PATH, INTERFACE, "Hang", None, &BodyBuf::new())
                .await
        }
    });

    started.notified().await;

    // The last handle shuts the peer connection down.
    drop(b);

    let error = call.await.unwrap().unwrap_err();
    assert!(error.is_closed());
    Ok(())
}

#[tokio::test]
async fn replies_to_unknown_serials_are_skipped() -> Result<()> {
    let (a, right) = raw_pair()?;

    let server = thread::spawn(move || -> Result<()> {
        let mut stray = BodyBuf::new();
        stray.write("stray")?;

        // No call with this serial was ever made.
        let frame = frame::method_return(serial(900), serial(999), None, &stray)?;
        (&right).write_all(&frame)?;

        let (call, _) = read_message(&right)?;
        assert_eq!(call.member(), Some("Echo"));

        let mut body = BodyBuf::new();
        body.write("ok")?;

        let reply = frame::method_return(serial(901), call.serial(), None, &body)?;
        (&right).write_all(&reply)?;
        Ok(())
    });

    let reply = a
        .send_method_call(PATH, INTERFACE, "Echo", None, &BodyBuf::new())
        .await?;

    assert_eq!(reply.expect_signature(Signature::STRING)?.read::<&str>()?, "ok");
    server.join().unwrap()?;
    Ok(())
}

#[tokio::test]
async fn malformed_messages_are_skipped() -> Result<()> {
    let (a, right) = raw_pair()?;

    // A well-formed preamble over a header field array in which PATH
    // carries a plain string.
    let mut buf = Encoder::new();
    buf.write(&Endianness::LITTLE.0);
    buf.write(&MessageType::SIGNAL.0);
    buf.write(&Flags::EMPTY.0);
    buf.write(&protocol::VERSION);
    buf.write(&0u32);
    buf.write(&55u32);

    buf.write_array(|buf| {
        buf.align(8);
        buf.write(&HeaderField::PATH.0);
        buf.write(Signature::STRING);
        buf.write("/org/example/Object");
        Ok(())
    })?;

    buf.align(8);
    let bad = buf.into_vec();

    let server = thread::spawn(move || -> Result<()> {
        (&right).write_all(&bad)?;

        let (call, _) = read_message(&right)?;

        let mut body = BodyBuf::new();
        body.write("alive")?;

        let reply = frame::method_return(serial(901), call.serial(), None, &body)?;
        (&right).write_all(&reply)?;
        Ok(())
    });

    let reply = a
        .send_method_call(PATH, INTERFACE, "Echo", None, &BodyBuf::new())
        .await?;

    assert_eq!(reply.expect_signature(Signature::STRING)?.read::<&str>()?, "alive");
    server.join().unwrap()?;
    Ok(())
}

#[tokio::test]
async fn replies_even_when_no_reply_is_expected() -> Result<()> {
    let (a, right) = raw_pair()?;

    let _registration = a.register_object(PATH, INTERFACE, |_, _| async move {
        let mut reply = BodyBuf::new();
        reply.write("anyway")?;
        Ok(reply)
    })?;

    let call = frame::method_call(
        serial(7),
        PATH,
        INTERFACE,
        "Frobnicate",
        None,
        Flags::NO_REPLY_EXPECTED,
        &BodyBuf::new(),
    )?;

    // The runtime has to stay free to run the handler while the peer blocks
    // on the reply.
    tokio::task::spawn_blocking(move || -> Result<()> {
        (&right).write_all(&call)?;

        let (reply, body) = read_message(&right)?;
        assert_eq!(reply.message_type, MessageType::METHOD_RETURN);
        assert_eq!(reply.reply_serial(), Some(serial(7)));
        assert_eq!(Decoder::new(&body).read::<&str>()?, "anyway");
        Ok(())
    })
    .await
    .unwrap()?;

    Ok(())
}

#[tokio::test]
async fn send_method_return_writes_a_reply_frame() -> Result<()> {
    let (a, right) = raw_pair()?;

    let mut body = BodyBuf::new();
    body.write("done")?;

    a.send_method_return(serial(9), Some(":1.7"), &body).await?;

    let (header, body) = read_message(&right)?;
    assert_eq!(header.message_type, MessageType::METHOD_RETURN);
    assert!(header.flags() & Flags::NO_REPLY_EXPECTED);
    assert_eq!(header.reply_serial(), Some(serial(9)));
    assert_eq!(header.destination(), Some(":1.7"));
    assert_eq!(header.signature(), Signature::STRING);
    assert_eq!(Decoder::new(&body).read::<&str>()?, "done");
    Ok(())
}

#[tokio::test]
async fn signals_reach_matching_handlers() -> Result<()> {
    let (a, mut right) = raw_pair()?;

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let _r1 = forward_signals(&a, "TrackChanged", tx1);
    let _r2 = forward_signals(&a, "Seeked", tx2);

    let mut body = BodyBuf::new();
    body.write("A")?;
    right.write_all(&signal_frame(serial(1), PATH, INTERFACE, "TrackChanged", &body)?)?;

    assert_eq!(rx1.recv().await.as_deref(), Some("A"));

    let mut body = BodyBuf::new();
    body.write("B")?;
    right.write_all(&signal_frame(serial(2), PATH, INTERFACE, "Seeked", &body)?)?;

    assert_eq!(rx2.recv().await.as_deref(), Some("B"));
    assert!(rx1.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn signal_handlers_run_in_registration_order() -> Result<()> {
    let (a, mut right) = raw_pair()?;

    let (tx, mut rx) = mpsc::unbounded_channel();

    let _r1 = a.register_signal_handler(PATH, INTERFACE, "TrackChanged", {
        let tx = tx.clone();
        move |_, _| tx.send("first").unwrap()
    });

    let _r2 = a.register_signal_handler(PATH, INTERFACE, "TrackChanged", move |_, _| {
        tx.send("second").unwrap()
    });

    let frame = signal_frame(serial(1), PATH, INTERFACE, "TrackChanged", &BodyBuf::new())?;
    right.write_all(&frame)?;

    assert_eq!(rx.recv().await, Some("first"));
    assert_eq!(rx.recv().await, Some("second"));
    Ok(())
}

#[tokio::test]
async fn dropping_one_handler_keeps_the_rest() -> Result<()> {
    let (a, mut right) = raw_pair()?;

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let first = forward_signals(&a, "TrackChanged", tx1);
    let _second = forward_signals(&a, "TrackChanged", tx2);

    let mut body = BodyBuf::new();
    body.write("A")?;
    right.write_all(&signal_frame(serial(1), PATH, INTERFACE, "TrackChanged", &body)?)?;

    assert_eq!(rx1.recv().await.as_deref(), Some("A"));
    assert_eq!(rx2.recv().await.as_deref(), Some("A"));

    drop(first);

    let mut body = BodyBuf::new();
    body.write("B")?;
    right.write_all(&signal_frame(serial(2), PATH, INTERFACE, "TrackChanged", &body)?)?;

    assert_eq!(rx2.recv().await.as_deref(), Some("B"));
    assert!(rx1.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn dropping_a_registration_removes_the_handler() -> Result<()> {
    let (a, mut right) = raw_pair()?;

    let (tx1, mut rx1) = mpsc::unbounded_channel();
    let (tx2, mut rx2) = mpsc::unbounded_channel();

    let registration = forward_signals(&a, "TrackChanged", tx1);

    let mut body = BodyBuf::new();
    body.write("A")?;
    right.write_all(&signal_frame(serial(1), PATH, INTERFACE, "TrackChanged", &body)?)?;

    assert_eq!(rx1.recv().await.as_deref(), Some("A"));

    drop(registration);
    assert!(a.shared.handlers().signals.is_empty());

    let mut body = BodyBuf::new();
    body.write("B")?;
    right.write_all(&signal_frame(serial(2), PATH, INTERFACE, "TrackChanged", &body)?)?;

    // A signal to another handler flushes the one sent after the drop.
    let _r2 = forward_signals(&a, "Seeked", tx2);

    let mut body = BodyBuf::new();
    body.write("C")?;
    right.write_all(&signal_frame(serial(3), PATH, INTERFACE, "Seeked", &body)?)?;

    assert_eq!(rx2.recv().await.as_deref(), Some("C"));
    assert!(rx1.try_recv().is_err());
    Ok(())
}

#[tokio::test]
async fn object_registrations_conflict() -> Result<()> {
    let (a, _b) = pair()?;

    let first = a.register_object(PATH, INTERFACE, |_, _| async move {
        Ok(BodyBuf::new())
    })?;

    let error = a
        .register_object(PATH, INTERFACE, |_, _| async move { Ok(BodyBuf::new()) })
        .unwrap_err();

    assert!(matches!(error.kind(), ErrorKind::HandlerAlreadyRegistered));

    // Dropping the registration frees the path and interface up again.
    drop(first);

    let _second = a.register_object(PATH, INTERFACE, |_, _| async move {
        Ok(BodyBuf::new())
    })?;

    Ok(())
}

#[tokio::test]
async fn establishes_a_bus_session() -> Result<()> {
    let path = env::temp_dir().join(format!("dbus-peer-hello-{}.sock", process::id()));
    let _ = fs::remove_file(&path);

    let listener = UnixListener::bind(&path)?;

    let server = thread::spawn(move || -> Result<Vec<u8>> {
        let (stream, _) = listener.accept()?;

        let mut line = Vec::new();
        let mut byte = [0];

        while !line.ends_with(b"\r\n") {
            (&stream).read_exact(&mut byte)?;
            line.push(byte[0]);
        }

        (&stream).write_all(b"OK 5b99f7d0ecf4d7b1bc74fa9b5c4e5bd7\r\n")?;

        let mut begin = [0; 7];
        (&stream).read_exact(&mut begin)?;
        assert_eq!(&begin, b"BEGIN\r\n");

        let (hello, _) = read_message(&stream)?;
        assert_eq!(hello.member(), Some("Hello"));
        assert_eq!(hello.interface(), Some("org.freedesktop.DBus"));
        assert_eq!(hello.destination(), Some("org.freedesktop.DBus"));
        assert_eq!(
            hello.path(),
            Some(ObjectPath::new_const(b"/org/freedesktop/DBus"))
        );

        let mut body = BodyBuf::new();
        body.write(":1.99")?;

        let reply = frame::method_return(serial(1), hello.serial(), Some(":1.99"), &body)?;
        (&stream).write_all(&reply)?;
        Ok(line)
    });

    let connection = ConnectionBuilder::new()
        .address(format!("unix:path={}", path.display()))
        .auth_uid(4710)
        .connect()
        .await?;

    assert_eq!(connection.unique_name(), Some(":1.99"));

    let line = server.join().unwrap()?;
    assert_eq!(line, b"\0AUTH EXTERNAL 34373130\r\n");

    let _ = fs::remove_file(&path);
    Ok(())
}
