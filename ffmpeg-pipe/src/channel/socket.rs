use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener};
use std::time::{Duration, Instant};

use super::{ChannelStream, ChildChannel, InheritedHandle};
use crate::error::{Error, Result};

const ACCEPT_POLL: Duration = Duration::from_millis(10);

/// Loopback listener the child connects back to. Works wherever descriptor
/// inheritance does not.
#[derive(Debug)]
pub struct SocketChannel {
    listener: TcpListener,
    addr: SocketAddr,
    timeout: Duration,
}

impl SocketChannel {
    /// Listens on an ephemeral loopback port. `timeout` bounds [`ChildChannel::connect`].
    pub fn bind(timeout: Duration) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;
        Ok(Self {
            listener,
            addr,
            timeout,
        })
    }

    #[cfg(test)]
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.addr
    }
}

impl ChildChannel for SocketChannel {
    fn resource_locator(&self) -> String {
        format!("tcp://{}", self.addr)
    }

    fn inherited_handles(&self) -> Vec<InheritedHandle> {
        Vec::new()
    }

    fn connect(self: Box<Self>) -> Result<ChannelStream> {
        let deadline = Instant::now() + self.timeout;
        loop {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    log::debug!("child connected to {} from {}", self.addr, peer);
                    stream
                        .set_nonblocking(false)
                        .map_err(Error::handshake)?;
                    return Ok(ChannelStream::Socket(stream));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::handshake(io::Error::new(
                            io::ErrorKind::TimedOut,
                            format!("no connection on {} within {:?}", self.addr, self.timeout),
                        )));
                    }
                    std::thread::sleep(ACCEPT_POLL.min(deadline - now));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::handshake(e)),
            }
        }
    }

    fn cancel(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}
