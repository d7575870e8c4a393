//! The receive half of a connection.
//!
//! One task per connection owns all reads from the socket. It frames and
//! parses incoming messages, completes pending method calls, and hands
//! method calls and signals over to registered handlers on separate tasks.

use std::io;
use std::io::IoSliceMut;
use std::os::fd::OwnedFd;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::codec::{BodyBuf, Decoder};
use crate::error::{Error, ErrorKind, MethodError, Result};
use crate::header::{MessageHeader, Preamble};
use crate::protocol::MessageType;

use super::frame;
use super::registry::{object_key, signal_key, MethodHandler, SignalHandler};
use super::shared::Shared;
use super::Reply;

/// Drive the receive half of the connection until the peer hangs up, the
/// socket is shut down, or a framing violation occurs.
pub(crate) async fn run(shared: Arc<Shared>) {
    match recv_loop(&shared).await {
        Ok(()) => debug!("connection closed"),
        Err(error) => warn!(%error, "connection failed"),
    }

    shared.fail_pending();
}

async fn recv_loop(shared: &Arc<Shared>) -> Result<()> {
    // Bytes of the next preamble which arrived together with the previous
    // message, carried from one cycle into the next.
    let mut preamble_buf = [0; Preamble::SIZE];
    let mut preamble_len = 0;

    loop {
        let mut fds = Vec::new();

        while preamble_len < Preamble::SIZE {
            let mut bufs = [IoSliceMut::new(&mut preamble_buf[preamble_len..])];
            let n = recv_some(shared, &mut bufs, &mut fds).await?;

            if n == 0 {
                if preamble_len == 0 {
                    return Ok(());
                }

                return Err(eof());
            }

            preamble_len += n;
        }

        let preamble = Preamble::parse(&preamble_buf)?;
        preamble_len = 0;

        let mut rest = vec![0; preamble.remaining()];
        let mut rest_len = 0;

        while rest_len < rest.len() {
            // The second buffer opportunistically picks up the start of the
            // message after this one in the same syscall.
            let mut bufs = [
                IoSliceMut::new(&mut rest[rest_len..]),
                IoSliceMut::new(&mut preamble_buf[preamble_len..]),
            ];

            let n = recv_some(shared, &mut bufs, &mut fds).await?;

            if n == 0 {
                return Err(eof());
            }

            let fill = n.min(rest.len() - rest_len);
            rest_len += fill;
            preamble_len += n - fill;
        }

        let headers = &rest[..preamble.headers_length as usize];

        let header = match MessageHeader::parse(&preamble, headers, fds) {
            Ok(header) => header,
            Err(error) => {
                warn!(
                    serial = preamble.serial.get(),
                    %error,
                    "skipping message with malformed headers"
                );
                continue;
            }
        };

        let body = rest.split_off(preamble.headers_span());

        if let Err(error) = dispatch(shared, header, body) {
            warn!(%error, "failed to dispatch message");
        }
    }
}

fn eof() -> Error {
    Error::new(ErrorKind::Io(io::ErrorKind::UnexpectedEof.into()))
}

/// Receive bytes and descriptors into `bufs`, waiting for readability.
async fn recv_some(
    shared: &Shared,
    bufs: &mut [IoSliceMut<'_>],
    fds: &mut Vec<OwnedFd>,
) -> Result<usize> {
    loop {
        let mut guard = shared.fd.readable().await?;

        match guard.try_io(|fd| fd.get_ref().recv_vectored(bufs, fds)) {
            Ok(n) => return Ok(n?),
            Err(_) => continue,
        }
    }
}

fn dispatch(shared: &Arc<Shared>, header: MessageHeader, body: Vec<u8>) -> Result<()> {
    trace!(
        serial = header.serial.get(),
        message_type = ?header.message_type,
        "received message"
    );

    match header.message_type {
        MessageType::METHOD_CALL => method_call(shared, header, body),
        MessageType::METHOD_RETURN => method_return(shared, header, body),
        MessageType::ERROR => error_reply(shared, header, body),
        MessageType::SIGNAL => signal(shared, header, body),
        other => {
            debug!(message_type = ?other, "ignoring message of unknown type");
            Ok(())
        }
    }
}

/// Hand a method call over to the handler registered for its path and
/// interface, on a task of its own so the receive loop is never blocked.
fn method_call(shared: &Arc<Shared>, header: MessageHeader, body: Vec<u8>) -> Result<()> {
    let Some(path) = header.path() else {
        return Err(Error::new(ErrorKind::MissingPath));
    };

    let Some(member) = header.member() else {
        return Err(Error::new(ErrorKind::MissingMember));
    };

    let handler = {
        let key = object_key(path, header.interface().unwrap_or_default());
        shared.handlers().objects.get(&key).cloned()
    };

    match handler {
        Some(handler) => {
            tokio::spawn(run_handler(shared.clone(), handler, Arc::new(header), body));
        }
        None => {
            let message = match header.interface() {
                Some(interface) => {
                    format!("Unknown method '{member}' on interface '{interface}'")
                }
                None => format!("Unknown method '{member}'"),
            };

            let shared = shared.clone();

            tokio::spawn(async move {
                let error = MethodError::new(MethodError::UNKNOWN_METHOD, message);
                reply_with_error(&shared, &header, &error).await;
            });
        }
    }

    Ok(())
}

async fn run_handler(
    shared: Arc<Shared>,
    handler: Arc<MethodHandler>,
    header: Arc<MessageHeader>,
    body: Vec<u8>,
) {
    let future = handler.as_ref()(Arc::clone(&header), body);

    // The handler future gets a task of its own, so a panic inside of it
    // becomes an error reply instead of a dead connection.
    let result = match tokio::spawn(future).await {
        Ok(result) => result,
        Err(error) => Err(MethodError::new(MethodError::FAILED, error.to_string())),
    };

    match result {
        Ok(reply) => {
            if let Err(error) = reply_with_return(&shared, &header, &reply).await {
                debug!(%error, "failed to send method reply");
            }
        }
        Err(error) => reply_with_error(&shared, &header, &error).await,
    }
}

async fn reply_with_return(shared: &Shared, call: &MessageHeader, body: &BodyBuf) -> Result<()> {
    let frame = frame::method_return(shared.next_serial(), call.serial(), call.sender(), body)?;
    shared.send_frame(&frame).await
}

async fn reply_with_error(shared: &Shared, call: &MessageHeader, error: &MethodError) {
    if let Err(error) = try_error_reply(shared, call, error).await {
        debug!(%error, "failed to send error reply");
    }
}

async fn try_error_reply(shared: &Shared, call: &MessageHeader, error: &MethodError) -> Result<()> {
    let mut body = BodyBuf::new();
    body.write(error.message())?;

    let frame = frame::error(
        shared.next_serial(),
        call.serial(),
        call.sender(),
        error.name(),
        &body,
    )?;

    shared.send_frame(&frame).await
}

/// Complete the pending call the reply is for.
fn method_return(shared: &Shared, header: MessageHeader, body: Vec<u8>) -> Result<()> {
    let Some(reply_serial) = header.reply_serial() else {
        return Err(Error::new(ErrorKind::MissingReplySerial));
    };

    if !shared.complete_reply(reply_serial, Ok(Reply::new(header, body))) {
        warn!(
            reply_serial = reply_serial.get(),
            "dropping reply to an unknown serial"
        );
    }

    Ok(())
}

/// Fail the pending call the error is for, with the name the peer reported
/// and the leading body string as the message.
fn error_reply(shared: &Shared, header: MessageHeader, body: Vec<u8>) -> Result<()> {
    let Some(reply_serial) = header.reply_serial() else {
        return Err(Error::new(ErrorKind::MissingReplySerial));
    };

    let Some(name) = header.error_name() else {
        return Err(Error::new(ErrorKind::MissingErrorName));
    };

    let message = if header.signature().as_bytes().first() == Some(&b's') {
        Decoder::new(&body).read::<&str>().unwrap_or_default()
    } else {
        ""
    };

    let error = MethodError::new(name, message);

    if !shared.complete_reply(reply_serial, Err(Error::from(error))) {
        warn!(
            reply_serial = reply_serial.get(),
            "dropping error reply to an unknown serial"
        );
    }

    Ok(())
}

/// Invoke every signal handler registered for the signal's path, interface
/// and member, in registration order on a task of their own.
fn signal(shared: &Arc<Shared>, header: MessageHeader, body: Vec<u8>) -> Result<()> {
    let Some(path) = header.path() else {
        return Err(Error::new(ErrorKind::MissingPath));
    };

    let Some(interface) = header.interface() else {
        return Err(Error::new(ErrorKind::MissingInterface));
    };

    let Some(member) = header.member() else {
        return Err(Error::new(ErrorKind::MissingMember));
    };

    let handlers: Vec<Arc<SignalHandler>> = {
        let key = signal_key(path, interface, member);
        let registered = shared.handlers();

        match registered.signals.get(&key) {
            Some(list) => list.iter().map(|(_, handler)| handler.clone()).collect(),
            None => return Ok(()),
        }
    };

    tokio::spawn(async move {
        for handler in handlers {
            handler.as_ref()(&header, &body);
        }
    });

    Ok(())
}
