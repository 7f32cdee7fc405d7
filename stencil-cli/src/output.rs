use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Error};
use tempfile::NamedTempFile;

pub const STDOUT: &str = "-";

/// Where rendered output goes.
///
/// Output for a file is written to a temporary file in the same directory
/// which replaces the target on [`commit`](Output::commit).  Dropping the
/// output without committing leaves the target untouched.
pub enum Output {
    Stdout(io::StdoutLock<'static>),
    File { target: PathBuf, temp: NamedTempFile },
}

impl Output {
    pub fn open(filename: &Path) -> Result<Output, Error> {
        if filename == Path::new(STDOUT) {
            return Ok(Output::Stdout(io::stdout().lock()));
        }
        let target = std::env::current_dir()?.join(filename);
        let dir = target
            .parent()
            .ok_or_else(|| anyhow!("cannot write to root"))?;
        let temp = NamedTempFile::new_in(dir)
            .with_context(|| format!("unable to create output file in '{}'", dir.display()))?;
        Ok(Output::File { target, temp })
    }

    pub fn commit(self) -> Result<(), Error> {
        match self {
            Output::Stdout(mut out) => out.flush()?,
            Output::File { target, temp } => {
                temp.persist(&target)
                    .with_context(|| format!("unable to write '{}'", target.display()))?;
            }
        }
        Ok(())
    }
}

impl Write for Output {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Output::Stdout(out) => out.write(buf),
            Output::File { temp, .. } => temp.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Output::Stdout(out) => out.flush(),
            Output::File { temp, .. } => temp.flush(),
        }
    }
}
