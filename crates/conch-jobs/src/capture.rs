//! Output capture: every job stream is copied both to the shell's real
//! stream and to an in-memory buffer scripts can read back.
//!
//! Each piped stream gets a dedicated reader thread that runs until the
//! child closes its end.

use std::{
    io::{self, Read, Write},
    sync::{Arc, Mutex},
    thread::{self, JoinHandle},
};
use tracing::{debug, warn};

/// Shared destination for a job's pass-through output (normally the
/// shell's own stdout or stderr).
pub type PassThrough = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn pass_through<W: Write + Send + 'static>(writer: W) -> PassThrough {
    Arc::new(Mutex::new(Box::new(writer)))
}

/// Bounded byte buffer holding the most recent output of one stream.
#[derive(Clone, Debug)]
pub struct CaptureBuffer {
    buf: Arc<Mutex<Vec<u8>>>,
    limit: usize,
}

impl CaptureBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            buf: Arc::new(Mutex::new(Vec::new())),
            limit,
        }
    }

    /// Append `bytes`, dropping the oldest data once the limit is exceeded.
    pub fn append(&self, bytes: &[u8]) {
        let mut guard = self.buf.lock().expect("capture buffer poisoned");
        guard.extend_from_slice(bytes);
        if guard.len() > self.limit {
            let excess = guard.len() - self.limit;
            guard.drain(..excess);
        }
    }

    pub fn reset(&self) {
        self.buf.lock().expect("capture buffer poisoned").clear();
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.buf.lock().expect("capture buffer poisoned").clone()
    }

    /// Captured output as text; invalid UTF-8 is replaced, never an error.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buf.lock().expect("capture buffer poisoned")).into_owned()
    }
}

/// Copy `reader` into `pass` and `capture` on a new thread until EOF.
///
/// A failing pass-through write is logged once and further pass-through is
/// skipped; capture continues so scripts still see the output.
pub(crate) fn spawn_tee<R>(
    name: String,
    mut reader: R,
    pass: PassThrough,
    capture: CaptureBuffer,
) -> io::Result<JoinHandle<()>>
where
    R: Read + Send + 'static,
{
    thread::Builder::new().name(name).spawn(move || {
        let mut raw = [0u8; 4096];
        let mut pass_ok = true;
        loop {
            match reader.read(&mut raw) {
                Ok(0) => break, // EOF: child closed the pipe
                Ok(n) => {
                    capture.append(&raw[..n]);
                    if pass_ok {
                        let mut out = pass.lock().expect("pass-through writer poisoned");
                        if let Err(e) = out.write_all(&raw[..n]).and_then(|_| out.flush()) {
                            warn!("job output pass-through failed: {e}");
                            pass_ok = false;
                        }
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    warn!("job output reader error: {e}");
                    break;
                }
            }
        }
        debug!("job output reader exited");
    })
}
