use std::collections::HashMap;
use std::io;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tokio::io::unix::AsyncFd;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::bus;
use crate::codec::BodyBuf;
use crate::error::{Error, ErrorKind, Result};
use crate::protocol::Flags;
use crate::transport::Transport;

use super::frame;
use super::registry::Handlers;
use super::Reply;

/// State shared between connection handles and the receive task.
pub(crate) struct Shared {
    /// Readiness poller for the underlying socket.
    pub(crate) fd: AsyncFd<Transport>,
    /// Serializes writes, so concurrently sent frames cannot interleave.
    write: tokio::sync::Mutex<()>,
    /// The serial stamped on the next outgoing message.
    serial: AtomicU32,
    /// Method calls awaiting a reply, by the serial of the call.
    calls: Mutex<Calls>,
    /// Registered signal and method call handlers.
    handlers: Mutex<Handlers>,
    /// The unique name assigned by the message bus, when connected to one.
    unique_name: OnceLock<Box<str>>,
    /// The receive task, parked here until the connection is closed.
    task: Mutex<Option<JoinHandle<()>>>,
}

struct Calls {
    pending: HashMap<NonZeroU32, oneshot::Sender<Result<Reply>>>,
    /// Set when the receive loop exits. Calls which come in after that fail
    /// immediately instead of waiting for a reply which cannot arrive.
    closed: bool,
}

impl Shared {
    pub(crate) fn new(fd: AsyncFd<Transport>) -> Self {
        Self {
            fd,
            write: tokio::sync::Mutex::new(()),
            serial: AtomicU32::new(1),
            calls: Mutex::new(Calls {
                pending: HashMap::new(),
                closed: false,
            }),
            handlers: Mutex::new(Handlers::default()),
            unique_name: OnceLock::new(),
            task: Mutex::new(None),
        }
    }

    /// Allocate the serial for the next outgoing message.
    ///
    /// Serials are unique among messages in flight and never zero, the
    /// counter skips it on wraparound.
    pub(crate) fn next_serial(&self) -> NonZeroU32 {
        loop {
            let serial = self.serial.fetch_add(1, Ordering::Relaxed);

            if let Some(serial) = NonZeroU32::new(serial) {
                return serial;
            }
        }
    }

    /// Register interest in the reply to the call with the given serial.
    pub(crate) fn expect_reply(
        &self,
        serial: NonZeroU32,
    ) -> Result<oneshot::Receiver<Result<Reply>>> {
        let mut calls = lock(&self.calls);

        if calls.closed {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }

        let (sender, receiver) = oneshot::channel();
        calls.pending.insert(serial, sender);
        Ok(receiver)
    }

    /// Drop the interest registered for `serial`, after a failed write.
    pub(crate) fn forget_reply(&self, serial: NonZeroU32) {
        lock(&self.calls).pending.remove(&serial);
    }

    /// Complete the call awaiting `serial`, returning whether one was.
    pub(crate) fn complete_reply(&self, serial: NonZeroU32, reply: Result<Reply>) -> bool {
        let Some(sender) = lock(&self.calls).pending.remove(&serial) else {
            return false;
        };

        // The caller may have stopped waiting.
        let _ = sender.send(reply);
        true
    }

    /// Fail every call still awaiting a reply and reject ones made from here
    /// on. The receive loop calls this once on the way out.
    pub(crate) fn fail_pending(&self) {
        let pending = {
            let mut calls = lock(&self.calls);
            calls.closed = true;
            std::mem::take(&mut calls.pending)
        };

        for (_, sender) in pending {
            let _ = sender.send(Err(Error::new(ErrorKind::ConnectionClosed)));
        }
    }

    /// The registered handlers.
    pub(crate) fn handlers(&self) -> MutexGuard<'_, Handlers> {
        lock(&self.handlers)
    }

    /// The unique name assigned by the message bus.
    pub(crate) fn unique_name(&self) -> Option<&str> {
        self.unique_name.get().map(|name| &**name)
    }

    pub(crate) fn set_unique_name(&self, name: Box<str>) {
        let _ = self.unique_name.set(name);
    }

    pub(crate) fn set_task(&self, task: JoinHandle<()>) {
        *lock(&self.task) = Some(task);
    }

    pub(crate) fn take_task(&self) -> Option<JoinHandle<()>> {
        lock(&self.task).take()
    }

    /// Write a whole frame to the socket.
    pub(crate) async fn send_frame(&self, frame: &[u8]) -> Result<()> {
        if lock(&self.calls).closed {
            return Err(Error::new(ErrorKind::ConnectionClosed));
        }

        let _write = self.write.lock().await;
        write_all(&self.fd, frame).await
    }

    /// Ask the message bus to route matching signals to this connection.
    pub(crate) async fn add_match(&self, rule: &str) -> Result<()> {
        self.match_rule("AddMatch", rule).await
    }

    /// Ask the message bus to stop routing matching signals here.
    pub(crate) async fn remove_match(&self, rule: &str) -> Result<()> {
        self.match_rule("RemoveMatch", rule).await
    }

    /// Send a subscription call to the message bus.
    ///
    /// The frame carries `NO_REPLY_EXPECTED` and no reply is awaited, so
    /// subscription changes cannot stall on bus traffic.
    async fn match_rule(&self, member: &str, rule: &str) -> Result<()> {
        let mut body = BodyBuf::new();
        body.write(rule)?;

        let frame = frame::method_call(
            self.next_serial(),
            bus::PATH,
            bus::INTERFACE,
            member,
            Some(bus::DESTINATION),
            Flags::NO_REPLY_EXPECTED,
            &body,
        )?;

        self.send_frame(&frame).await
    }
}

/// Write all of `bytes` to the socket.
///
/// Waits for writability and retries on spurious readiness. Callers sending
/// message frames must hold the write lock across the whole call.
pub(crate) async fn write_all(fd: &AsyncFd<Transport>, bytes: &[u8]) -> Result<()> {
    let mut at = 0;

    while at < bytes.len() {
        let mut guard = fd.writable().await?;

        match guard.try_io(|fd| fd.get_ref().write_some(&bytes[at..])) {
            Ok(n) => {
                let n = n?;

                if n == 0 {
                    return Err(Error::new(ErrorKind::Io(io::ErrorKind::WriteZero.into())));
                }

                at += n;
            }
            Err(_) => continue,
        }
    }

    Ok(())
}

/// Acquire `mutex`, entering anyway if a panicking thread poisoned it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|error| error.into_inner())
}

#[cfg(test)]
mod tests {
    use std::os::unix::net::UnixStream;
    use std::sync::atomic::Ordering;

    use tokio::io::unix::AsyncFd;

    use crate::error::Result;
    use crate::transport::Transport;

    use super::Shared;

    fn shared() -> Result<(Shared, UnixStream)> {
        let (stream, peer) = UnixStream::pair()?;
        let transport = Transport::from_std(stream);
        transport.set_nonblocking(true)?;
        Ok((Shared::new(AsyncFd::new(transport)?), peer))
    }

    #[tokio::test]
    async fn serial_wraps_around_zero() -> Result<()> {
        let (shared, _peer) = shared()?;
        shared.serial.store(u32::MAX, Ordering::Relaxed);

        assert_eq!(shared.next_serial().get(), u32::MAX);
        assert_eq!(shared.next_serial().get(), 1);
        assert_eq!(shared.next_serial().get(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn closed_connection_rejects_calls() -> Result<()> {
        let (shared, _peer) = shared()?;

        let receiver = shared.expect_reply(shared.next_serial())?;
        shared.fail_pending();

        let error = receiver.await.unwrap().unwrap_err();
        assert!(error.is_closed());

        let error = shared.expect_reply(shared.next_serial()).unwrap_err();
        assert!(error.is_closed());
        Ok(())
    }
}
