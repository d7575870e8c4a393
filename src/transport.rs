use std::env;
use std::ffi::OsStr;
use std::io::{self, IoSliceMut, Read, Write};
use std::mem::{size_of, zeroed};
use std::net::Shutdown;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::net::UnixStream;

use crate::error::{Error, ErrorKind, Result};

const ENV_SESSION_BUS: &str = "DBUS_SESSION_BUS_ADDRESS";
const ENV_SYSTEM_BUS: &str = "DBUS_SYSTEM_BUS_ADDRESS";
const DEFAULT_SYSTEM_BUS: &str = "unix:path=/var/run/dbus/system_bus_socket";

/// The raw transport of a connection: one connected Unix stream socket.
///
/// All reads go through [`recv_vectored`], which also collects any file
/// descriptors passed in the ancillary data of the stream.
///
/// [`recv_vectored`]: Self::recv_vectored
pub(crate) struct Transport {
    stream: UnixStream,
}

impl Transport {
    /// Connect to the session bus.
    ///
    /// The address is taken from the `DBUS_SESSION_BUS_ADDRESS` environment
    /// variable.
    pub(crate) fn session_bus() -> Result<Self> {
        Self::from_env(ENV_SESSION_BUS, None)
    }

    /// Connect to the system bus.
    ///
    /// The address is taken from the `DBUS_SYSTEM_BUS_ADDRESS` environment
    /// variable, with a fallback to the well-known address
    /// `unix:path=/var/run/dbus/system_bus_socket`.
    pub(crate) fn system_bus() -> Result<Self> {
        Self::from_env(ENV_SYSTEM_BUS, Some(DEFAULT_SYSTEM_BUS))
    }

    fn from_env(env: &str, default: Option<&str>) -> Result<Self> {
        let value;

        let address: &OsStr = match env::var_os(env) {
            Some(address) => {
                value = address;
                value.as_os_str()
            }
            None => match default {
                Some(default) => default.as_ref(),
                None => return Err(Error::new(ErrorKind::MissingBus)),
            },
        };

        Self::connect(address)
    }

    /// Connect to the given D-Bus address, either `unix:path=<path>` or
    /// `unix:abstract=<name>`.
    pub(crate) fn connect(address: &OsStr) -> Result<Self> {
        let stream = match parse_address(address.as_bytes())? {
            Address::Path(path) => UnixStream::connect(OsStr::from_bytes(path))?,
            Address::Abstract(name) => connect_abstract(name)?,
        };

        Ok(Self::from_std(stream))
    }

    /// Construct a transport directly from a connected unix stream.
    pub(crate) fn from_std(stream: UnixStream) -> Self {
        Self { stream }
    }

    pub(crate) fn set_nonblocking(&self, nonblocking: bool) -> io::Result<()> {
        self.stream.set_nonblocking(nonblocking)
    }

    /// Shut down both halves of the socket, waking up pending reads.
    pub(crate) fn shutdown(&self) -> io::Result<()> {
        self.stream.shutdown(Shutdown::Both)
    }

    /// Read some bytes, used by the line-oriented authentication phase.
    pub(crate) fn read_some(&self, buf: &mut [u8]) -> io::Result<usize> {
        (&self.stream).read(buf)
    }

    /// Write some bytes from the front of `buf`, returning how many were
    /// accepted.
    pub(crate) fn write_some(&self, buf: &[u8]) -> io::Result<usize> {
        (&self.stream).write(buf)
    }

    /// Scatter-gather read into `bufs`, filling them in order.
    ///
    /// File descriptors passed as `SCM_RIGHTS` ancillary data are appended
    /// to `fds` in peer order, with close-on-exec set. Returns the number of
    /// bytes read, with zero signalling the end of the stream.
    pub(crate) fn recv_vectored(
        &self,
        bufs: &mut [IoSliceMut<'_>],
        fds: &mut Vec<OwnedFd>,
    ) -> io::Result<usize> {
        // Space for the ancillary data of a healthy number of descriptors.
        let mut control = [0u8; 256];

        // SAFETY: The msghdr is zeroed and points at buffers which live
        // across the call, and IoSliceMut is guaranteed to be ABI compatible
        // with iovec.
        unsafe {
            let mut msg: libc::msghdr = zeroed();
            msg.msg_iov = bufs.as_mut_ptr() as *mut libc::iovec;
            msg.msg_iovlen = bufs.len() as _;
            msg.msg_control = control.as_mut_ptr() as *mut _;
            msg.msg_controllen = control.len() as _;

            let n = libc::recvmsg(self.stream.as_raw_fd(), &mut msg, libc::MSG_CMSG_CLOEXEC);

            if n < 0 {
                return Err(io::Error::last_os_error());
            }

            let mut header = libc::CMSG_FIRSTHDR(&msg);

            while !header.is_null() {
                if (*header).cmsg_level == libc::SOL_SOCKET
                    && (*header).cmsg_type == libc::SCM_RIGHTS
                {
                    let data = libc::CMSG_DATA(header) as *const RawFd;
                    let len = (*header).cmsg_len as usize - libc::CMSG_LEN(0) as usize;

                    for at in 0..len / size_of::<RawFd>() {
                        fds.push(OwnedFd::from_raw_fd(data.add(at).read_unaligned()));
                    }
                }

                header = libc::CMSG_NXTHDR(&msg, header);
            }

            Ok(n as usize)
        }
    }
}

impl AsRawFd for Transport {
    #[inline]
    fn as_raw_fd(&self) -> RawFd {
        self.stream.as_raw_fd()
    }
}

#[derive(Debug)]
enum Address<'a> {
    /// A socket in the filesystem.
    Path(&'a [u8]),
    /// An abstract socket name, without the leading NUL.
    Abstract(&'a [u8]),
}

fn parse_address(bytes: &[u8]) -> Result<Address<'_>> {
    let Some(at) = bytes.iter().position(|&b| b == b'=') else {
        return Err(Error::new(ErrorKind::InvalidAddress));
    };

    let (head, tail) = bytes.split_at(at);

    match head {
        b"unix:path" => Ok(Address::Path(&tail[1..])),
        b"unix:abstract" => Ok(Address::Abstract(&tail[1..])),
        _ => Err(Error::new(ErrorKind::InvalidAddress)),
    }
}

/// Connect to an abstract socket, which linux names by a `sun_path` starting
/// with a NUL byte.
fn connect_abstract(name: &[u8]) -> Result<UnixStream> {
    // SAFETY: An all-zero sockaddr_un is a valid representation.
    let mut addr: libc::sockaddr_un = unsafe { zeroed() };

    if name.len() + 1 > addr.sun_path.len() {
        return Err(Error::new(ErrorKind::InvalidAddress));
    }

    addr.sun_family = libc::AF_UNIX as libc::sa_family_t;

    for (to, from) in addr.sun_path[1..].iter_mut().zip(name) {
        *to = *from as libc::c_char;
    }

    let len = size_of::<libc::sa_family_t>() + 1 + name.len();

    // SAFETY: The address is initialized above and `len` covers exactly the
    // family field plus the abstract name.
    unsafe {
        let fd = libc::socket(libc::AF_UNIX, libc::SOCK_STREAM | libc::SOCK_CLOEXEC, 0);

        if fd < 0 {
            return Err(Error::from(io::Error::last_os_error()));
        }

        let fd = OwnedFd::from_raw_fd(fd);

        if libc::connect(
            fd.as_raw_fd(),
            &addr as *const libc::sockaddr_un as *const libc::sockaddr,
            len as libc::socklen_t,
        ) < 0
        {
            return Err(Error::from(io::Error::last_os_error()));
        }

        Ok(UnixStream::from(fd))
    }
}

#[cfg(test)]
mod tests {
    use crate::error::ErrorKind;

    use super::{parse_address, Address};

    #[test]
    fn test_parse_address() {
        assert!(matches!(
            parse_address(b"unix:path=/run/user/1000/bus"),
            Ok(Address::Path(b"/run/user/1000/bus"))
        ));

        assert!(matches!(
            parse_address(b"unix:abstract=/tmp/dbus-qnR2K922yj"),
            Ok(Address::Abstract(b"/tmp/dbus-qnR2K922yj"))
        ));

        let error = parse_address(b"tcp:host=localhost").unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::InvalidAddress));

        let error = parse_address(b"unix:path").unwrap_err();
        assert!(matches!(error.kind(), ErrorKind::InvalidAddress));
    }
}
