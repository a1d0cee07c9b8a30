//! Process context resolution
//!
//! Reads `<proc root>/<pid>/cmdline`, joins the NUL-separated arguments with
//! spaces and transport-encodes the result. A process that already exited
//! (or that we may not inspect) yields the encoding of an empty string.

use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;

use crate::constants::{INITIAL_CMDLINE_CAPACITY, PROC_ROOT};
use crate::error::AuditError;
use crate::record::encoder::transport_encode;

/// Resolves pids to transport-encoded command lines
#[derive(Debug, Clone)]
pub struct CommandLineResolver {
    proc_root: PathBuf,
    initial_capacity: usize,
}

impl Default for CommandLineResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandLineResolver {
    pub fn new() -> Self {
        Self {
            proc_root: PathBuf::from(PROC_ROOT),
            initial_capacity: INITIAL_CMDLINE_CAPACITY,
        }
    }

    /// Read process information below `root` instead of `/proc`
    pub fn with_proc_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.proc_root = root.into();
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    /// Raw command line with NUL separators replaced by spaces
    pub fn read_command_line(&self, pid: u32) -> Result<Vec<u8>, AuditError> {
        let path = self.proc_root.join(pid.to_string()).join("cmdline");
        File::open(&path)
            .and_then(|file| read_arguments(file, self.initial_capacity))
            .map_err(|source| AuditError::ResolverDegraded { pid, source })
    }

    /// Transport-encoded command line of `pid`; never fails
    pub fn resolve(&self, pid: u32) -> String {
        let command_line = match self.read_command_line(pid) {
            Ok(bytes) => bytes,
            Err(err) => {
                log::debug!("{}", err);
                Vec::new()
            }
        };
        transport_encode(&command_line)
    }
}

/// Drain `reader` into a buffer that doubles whenever it fills up, then
/// turn every NUL separator into a space.
fn read_arguments<R: Read>(mut reader: R, initial_capacity: usize) -> io::Result<Vec<u8>> {
    let mut buffer = vec![0u8; initial_capacity.max(1)];
    let mut len = 0;

    loop {
        if len == buffer.len() {
            let grown = buffer.len() * 2;
            buffer.resize(grown, 0);
        }
        match reader.read(&mut buffer[len..]) {
            Ok(0) => break,
            Ok(n) => len += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    buffer.truncate(len);
    for byte in buffer.iter_mut().filter(|b| **b == 0) {
        *byte = b' ';
    }
    Ok(buffer)
}
