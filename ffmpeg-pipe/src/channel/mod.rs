//! One-directional byte channel between this process and a child transcoder.
//!
//! ```text
//!   decode:  file ──► child ──► [channel] ──► reader ──► caller
//!   encode:  caller ──► writer ──► [channel] ──► child ──► file
//! ```
//!
//! A channel is created before the child starts. The child learns how to reach
//! it from [`ChildChannel::resource_locator`] and the descriptors returned by
//! [`ChildChannel::inherited_handles`]. Once the child runs, exactly one of
//! [`ChildChannel::connect`] or [`ChildChannel::cancel`] is called; both consume
//! the channel.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use crate::config::{ChannelKind, Config};
use crate::error::Result;

#[cfg(unix)]
mod pipe;
mod socket;

#[cfg(unix)]
pub use pipe::{CHILD_SLOT, PipeChannel};
pub use socket::SocketChannel;

/// Direction of travel as seen from this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// We read what the child writes.
    Read,
    /// We write what the child reads.
    Write,
}

/// A descriptor the child must inherit, and the slot it has to land on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InheritedHandle {
    /// Descriptor number the child's command line refers to.
    pub slot: i32,
    /// Our descriptor to install at `slot`.
    pub raw: i32,
}

pub trait ChildChannel: Send {
    /// Argument telling the child how to reach the channel.
    fn resource_locator(&self) -> String;

    /// Descriptors the child must inherit. Empty for sockets.
    fn inherited_handles(&self) -> Vec<InheritedHandle>;

    /// Blocks until the channel is a usable byte stream. The returned stream
    /// owns all remaining resources; drop it to signal end of data.
    fn connect(self: Box<Self>) -> Result<ChannelStream>;

    /// Releases everything when `connect` will never be called.
    fn cancel(self: Box<Self>) -> Result<()>;
}

/// Creates the channel variant `config` asks for on this host.
pub fn create(direction: Direction, config: &Config) -> Result<Box<dyn ChildChannel>> {
    match config.channel.resolve() {
        ChannelKind::Pipe => pipe_channel(direction),
        ChannelKind::Socket | ChannelKind::Auto => {
            Ok(Box::new(SocketChannel::bind(config.connect_timeout())?))
        }
    }
}

#[cfg(unix)]
fn pipe_channel(direction: Direction) -> Result<Box<dyn ChildChannel>> {
    Ok(Box::new(PipeChannel::new(direction)?))
}

#[cfg(not(unix))]
fn pipe_channel(_direction: Direction) -> Result<Box<dyn ChildChannel>> {
    Err(crate::error::Error::Unsupported(
        "pipe channels need descriptor inheritance",
    ))
}

/// A connected channel.
#[derive(Debug)]
pub enum ChannelStream {
    #[cfg(unix)]
    Pipe(std::fs::File),
    Socket(TcpStream),
}

impl Read for ChannelStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            ChannelStream::Pipe(file) => file.read(buf),
            ChannelStream::Socket(stream) => stream.read(buf),
        }
    }
}

impl Write for ChannelStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            #[cfg(unix)]
            ChannelStream::Pipe(file) => file.write(buf),
            ChannelStream::Socket(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            #[cfg(unix)]
            ChannelStream::Pipe(file) => file.flush(),
            ChannelStream::Socket(stream) => stream.flush(),
        }
    }
}

/// Fills `buf` unless end of stream comes first. Returns the bytes read; on an
/// error the count read so far travels with it.
pub(crate) fn read_full(
    reader: &mut impl Read,
    buf: &mut [u8],
) -> std::result::Result<usize, (usize, io::Error)> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err((filled, e)),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most `chunk` bytes per read.
    struct Trickle<'a> {
        data: &'a [u8],
        chunk: usize,
    }

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = self.chunk.min(buf.len()).min(self.data.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_full_tolerates_short_reads() {
        let data: Vec<u8> = (0..100).collect();
        let mut reader = Trickle {
            data: &data,
            chunk: 7,
        };
        let mut buf = [0u8; 64];
        assert_eq!(read_full(&mut reader, &mut buf).unwrap(), 64);
        assert_eq!(&buf[..], &data[..64]);

        let mut rest = [0u8; 64];
        assert_eq!(read_full(&mut reader, &mut rest).unwrap(), 36);
        assert_eq!(&rest[..36], &data[64..]);
        assert_eq!(read_full(&mut reader, &mut rest).unwrap(), 0);
    }

    #[test]
    fn test_create_honours_socket_kind() {
        let config = Config {
            channel: ChannelKind::Socket,
            ..Config::default()
        };
        let channel = create(Direction::Read, &config).unwrap();
        assert!(channel.resource_locator().starts_with("tcp://127.0.0.1:"));
        assert!(channel.inherited_handles().is_empty());
        channel.cancel().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_create_auto_uses_pipe_on_unix() {
        let channel = create(Direction::Write, &Config::default()).unwrap();
        assert_eq!(channel.resource_locator(), "pipe:3");
        assert_eq!(channel.inherited_handles().len(), 1);
        channel.cancel().unwrap();
    }
}
