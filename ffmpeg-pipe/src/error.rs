//! Error taxonomy shared by probes, channels and stream objects.

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything that can go wrong between us and the child transcoder.
///
/// I/O errors are held behind `Arc` so a cached `close()` outcome can be
/// handed out more than once.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// The input file does not exist. Checked before the child is started.
    #[error("no such file: {}", path.display())]
    NotFound { path: PathBuf },

    /// The probe output lacked a field, or the field was malformed.
    #[error("parse {field}: {reason}")]
    Parse { field: &'static str, reason: String },

    /// The external program could not be launched at all.
    #[error("start {program}: {source}")]
    ProcessStart {
        program: String,
        #[source]
        source: Arc<io::Error>,
    },

    /// The child started but the channel never became usable.
    #[error("channel handshake: {0}")]
    Handshake(#[source] Arc<io::Error>),

    /// Read or write on an established channel failed.
    #[error("channel I/O: {0}")]
    Io(#[source] Arc<io::Error>),

    /// The decoder reached the end of its output on a unit boundary.
    #[error("end of stream")]
    EndOfStream,

    /// The decoder output stopped in the middle of a sample or frame.
    #[error("unexpected end of stream")]
    UnexpectedEndOfStream,

    #[error(
        "image size ({}x{}) does not match video size ({}x{})",
        actual.0, actual.1, expected.0, expected.1
    )]
    DimensionMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The child exited unsuccessfully. `stderr` holds the tail of its diagnostics.
    #[error("{program} exited with {status}{}", stderr_suffix(stderr))]
    ProcessExit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("unsupported: {0}")]
    Unsupported(&'static str),

    #[error("stream already closed")]
    Closed,
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

impl Error {
    pub(crate) fn parse(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Parse {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn process_start(program: impl Into<String>, source: io::Error) -> Self {
        Self::ProcessStart {
            program: program.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn handshake(source: io::Error) -> Self {
        Self::Handshake(Arc::new(source))
    }

    /// True for the clean termination signal, which is not a failure.
    pub fn is_end_of_stream(&self) -> bool {
        matches!(self, Self::EndOfStream)
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Self::Io(Arc::new(e))
    }
}

/// A sample read that stopped short. `samples` complete samples were still
/// written to the front of the caller's buffer.
#[derive(Debug, Clone, thiserror::Error)]
#[error("stopped after {samples} samples")]
pub struct PartialRead {
    pub samples: usize,
    #[source]
    pub error: Error,
}

impl PartialRead {
    pub fn is_end_of_stream(&self) -> bool {
        self.error.is_end_of_stream()
    }
}

impl From<PartialRead> for Error {
    fn from(p: PartialRead) -> Self {
        p.error
    }
}
