// src/utils/run_log.rs: append-only running-time log

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::time::format_elapsed;

/// Running-time record shared by every invocation of the workflow. The file is
/// only ever appended to. The handle is released when the `RunLog` is dropped,
/// so early returns and error paths never leak it; `close` is the path that
/// also reports flush errors.
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn open(path: &Path) -> io::Result<RunLog> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(RunLog {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn write_header(&mut self, project: &str, start_time: &str) -> io::Result<()> {
        writeln!(self.writer)?;
        writeln!(self.writer, "Project name: {}", project)?;
        writeln!(self.writer, "Start time: {}", start_time)?;
        self.writer.flush()
    }

    pub fn write_stage_timing(&mut self, label: &str, elapsed: Duration) -> io::Result<()> {
        writeln!(self.writer, "Time of running {}: {}", label, format_elapsed(elapsed))?;
        self.writer.flush()
    }

    pub fn write_footer(&mut self, finish_time: &str) -> io::Result<()> {
        writeln!(self.writer, "Finish time: {}", finish_time)?;
        self.writer.flush()
    }

    /// Marks a run that stopped on an error instead of finishing.
    pub fn write_abort(&mut self, abort_time: &str, reason: &str) -> io::Result<()> {
        writeln!(self.writer, "Abort time: {} ({})", abort_time, reason)?;
        self.writer.flush()
    }

    pub fn close(mut self) -> io::Result<()> {
        self.writer.flush()?;
        let file = self.writer.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}
