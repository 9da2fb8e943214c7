use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd};

use super::{ChannelStream, ChildChannel, Direction, InheritedHandle};
use crate::error::{Error, Result};

/// Descriptor number the child end is installed at. The first slot after stdio.
pub const CHILD_SLOT: i32 = 3;

/// Anonymous pipe. We keep one end; the child inherits the other at [`CHILD_SLOT`].
#[derive(Debug)]
pub struct PipeChannel {
    parent: OwnedFd,
    child: OwnedFd,
}

impl PipeChannel {
    pub fn new(direction: Direction) -> Result<Self> {
        // Both ends close on exec. The spawner re-installs the child end at its slot.
        let (read, write) = cloexec_pipe()?;
        let (parent, child) = match direction {
            Direction::Read => (read, write),
            Direction::Write => (write, read),
        };
        Ok(Self { parent, child })
    }
}

#[cfg(any(target_os = "linux", target_os = "android", target_os = "freebsd"))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    Ok(nix::unistd::pipe2(nix::fcntl::OFlag::O_CLOEXEC)?)
}

// No pipe2 here, so a child spawned by another thread in between may inherit both ends.
#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "freebsd")))]
fn cloexec_pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};

    let (read, write) = nix::unistd::pipe()?;
    for fd in [&read, &write] {
        fcntl(fd.as_raw_fd(), FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC))?;
    }
    Ok((read, write))
}

impl ChildChannel for PipeChannel {
    fn resource_locator(&self) -> String {
        format!("pipe:{}", CHILD_SLOT)
    }

    fn inherited_handles(&self) -> Vec<InheritedHandle> {
        vec![InheritedHandle {
            slot: CHILD_SLOT,
            raw: self.child.as_raw_fd(),
        }]
    }

    fn connect(self: Box<Self>) -> Result<ChannelStream> {
        let PipeChannel { parent, child } = *self;
        // Our copy of the child end must go, or the child never sees end of data.
        nix::unistd::close(child.into_raw_fd())
            .map_err(|e| Error::handshake(io::Error::from(e)))?;
        Ok(ChannelStream::Pipe(File::from(parent)))
    }

    fn cancel(self: Box<Self>) -> Result<()> {
        drop(self);
        Ok(())
    }
}
