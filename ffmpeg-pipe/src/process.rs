//! Child process lifecycle: start with the channel attached, reap on every path.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use crate::channel::{self, ChannelStream, Direction, InheritedHandle};
use crate::config::Config;
use crate::error::{Error, Result};

/// Diagnostic lines kept for [`Error::ProcessExit`].
const STDERR_TAIL_LINES: usize = 20;

/// A running transcoder. Dropping it before [`ChildProcess::wait`] kills and
/// reaps the child.
pub(crate) struct ChildProcess {
    program: String,
    child: Child,
    stderr: Option<JoinHandle<String>>,
    status: Option<ExitStatus>,
}

impl ChildProcess {
    pub fn spawn(config: &Config, args: &[OsString], handles: &[InheritedHandle]) -> Result<Self> {
        let program = config.program_name();
        let mut command = Command::new(&config.program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        attach_handles(&mut command, handles)?;

        log::debug!(
            "starting {} {}",
            program,
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );
        let mut child = command
            .spawn()
            .map_err(|e| Error::process_start(program.clone(), e))?;
        let stderr = child
            .stderr
            .take()
            .map(|pipe| drain_stderr(program.clone(), pipe));

        Ok(Self {
            program,
            child,
            stderr,
            status: None,
        })
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    /// Exit status, once reaped.
    pub fn status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Waits for the child to exit. A non-zero exit is [`Error::ProcessExit`]
    /// carrying the tail of the child's diagnostics.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        let status = match self.status {
            Some(status) => status,
            None => {
                let status = self.child.wait()?;
                self.status = Some(status);
                status
            }
        };
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if status.success() {
            return Ok(status);
        }
        Err(Error::ProcessExit {
            program: self.program.clone(),
            status,
            stderr,
        })
    }

    pub fn kill(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Err(e) = self.child.kill() {
            log::debug!("kill {} ({}): {}", self.program, self.child.id(), e);
        }
        match self.child.wait() {
            Ok(status) => self.status = Some(status),
            Err(e) => log::warn!("reap {} ({}): {}", self.program, self.child.id(), e),
        }
    }
}

impl Drop for ChildProcess {
    fn drop(&mut self) {
        if self.status.is_none() {
            log::debug!("killing unreaped {} ({})", self.program, self.child.id());
            self.kill();
        }
    }
}

/// Creates a channel, starts the child with `args(locator)` and connects.
///
/// If the child fails to start the channel is cancelled. If the channel fails
/// to connect the child is killed before the error propagates.
pub(crate) fn launch(
    config: &Config,
    direction: Direction,
    args: impl FnOnce(&str) -> Vec<OsString>,
) -> Result<(ChildProcess, ChannelStream)> {
    let channel = channel::create(direction, config)?;
    let args = args(&channel.resource_locator());
    let process = match ChildProcess::spawn(config, &args, &channel.inherited_handles()) {
        Ok(process) => process,
        Err(e) => {
            if let Err(cancel_err) = channel.cancel() {
                log::warn!("cancel channel: {}", cancel_err);
            }
            return Err(e);
        }
    };
    // On failure `process` drops here, which kills it.
    let stream = channel.connect()?;
    Ok((process, stream))
}

/// What a non-zero exit means when a session closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExitPolicy {
    /// Decoders: we may have hung up early, so exit noise is only logged.
    Lenient,
    /// Encoders: a failed child means a broken or missing output file.
    Strict,
}

/// A connected channel and the child on its other end, owned together from
/// construction until [`Session::close`].
pub(crate) struct Session {
    process: ChildProcess,
    stream: Option<ChannelStream>,
    policy: ExitPolicy,
    outcome: Option<Result<()>>,
}

impl Session {
    pub fn new(process: ChildProcess, stream: ChannelStream, policy: ExitPolicy) -> Self {
        Self {
            process,
            stream: Some(stream),
            policy,
            outcome: None,
        }
    }

    pub fn stream(&mut self) -> Result<&mut ChannelStream> {
        self.stream.as_mut().ok_or(Error::Closed)
    }

    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.process.status()
    }

    /// Hangs up the channel, which tells the child there is nothing more to
    /// read or nobody left to write to, then reaps it. Later calls return the
    /// first outcome.
    pub fn close(&mut self) -> Result<()> {
        if let Some(outcome) = &self.outcome {
            return outcome.clone();
        }
        drop(self.stream.take());
        let outcome = match (self.process.wait(), self.policy) {
            (Ok(_), _) => Ok(()),
            (Err(e @ Error::ProcessExit { .. }), ExitPolicy::Lenient) => {
                log::debug!("decoder {} finished: {}", self.process.id(), e);
                Ok(())
            }
            (Err(e), _) => Err(e),
        };
        self.outcome = Some(outcome.clone());
        outcome
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.outcome.is_none() {
            if let Err(e) = self.close() {
                log::warn!("implicit close of unclosed stream failed: {}", e);
            }
        }
    }
}

fn drain_stderr(program: String, pipe: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_LINES);
        let mut reader = BufReader::new(pipe);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf) {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
            let line = String::from_utf8_lossy(&buf).trim_end().to_string();
            if line.is_empty() {
                continue;
            }
            log::trace!("[{}] {}", program, line);
            if tail.len() == STDERR_TAIL_LINES {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        Vec::from(tail).join("\n")
    })
}

#[cfg(unix)]
fn attach_handles(command: &mut Command, handles: &[InheritedHandle]) -> Result<()> {
    use nix::fcntl::{FcntlArg, FdFlag, fcntl};
    use std::os::unix::process::CommandExt;

    if handles.is_empty() {
        return Ok(());
    }
    let handles = handles.to_vec();
    // SAFETY: runs between fork and exec; dup2 and fcntl are async-signal-safe
    // and the handle list was allocated before the fork.
    unsafe {
        command.pre_exec(move || {
            for handle in &handles {
                if handle.raw == handle.slot {
                    // dup2 onto itself would leave close-on-exec set.
                    fcntl(handle.raw, FcntlArg::F_SETFD(FdFlag::empty()))?;
                } else {
                    nix::unistd::dup2(handle.raw, handle.slot)?;
                }
            }
            Ok(())
        });
    }
    Ok(())
}

#[cfg(not(unix))]
fn attach_handles(_command: &mut Command, handles: &[InheritedHandle]) -> Result<()> {
    if handles.is_empty() {
        Ok(())
    } else {
        Err(Error::Unsupported("inheriting descriptors at fixed slots"))
    }
}
