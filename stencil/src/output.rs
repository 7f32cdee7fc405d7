use std::{fmt, io};

use crate::error::{Error, ErrorKind};

/// An abstraction over [`fmt::Write`](std::fmt::Write) for the rendering.
///
/// An output either forwards to a writer or discards everything.  The
/// content phase of a template that extends a layout renders into a
/// discarding output since only its sections matter.
pub struct Output<'a> {
    w: Option<&'a mut (dyn fmt::Write + 'a)>,
}

impl<'a> Output<'a> {
    /// Creates a new output.
    pub(crate) fn new(w: &'a mut (dyn fmt::Write + 'a)) -> Self {
        Self { w: Some(w) }
    }

    /// Creates a null output that writes nowhere.
    pub(crate) fn null() -> Self {
        Self { w: None }
    }

    /// Returns `true` if the output is discarding.
    #[inline(always)]
    pub(crate) fn is_discarding(&self) -> bool {
        self.w.is_none()
    }

    /// Writes some data to the underlying buffer contained within this output.
    #[inline]
    pub fn write_str(&mut self, s: &str) -> fmt::Result {
        match self.w {
            Some(ref mut w) => w.write_str(s),
            None => Ok(()),
        }
    }

    /// Writes some formatted information into this instance.
    #[inline]
    pub fn write_fmt(&mut self, a: fmt::Arguments<'_>) -> fmt::Result {
        match self.w {
            Some(ref mut w) => w.write_fmt(a),
            None => Ok(()),
        }
    }
}

impl fmt::Write for Output<'_> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        Output::write_str(self, s)
    }

    #[inline]
    fn write_fmt(&mut self, args: fmt::Arguments<'_>) -> fmt::Result {
        Output::write_fmt(self, args)
    }
}

/// Adapts an [`io::Write`] for rendering and holds on to the I/O error.
pub struct WriteWrapper<W> {
    pub w: W,
    pub err: Option<io::Error>,
}

impl<W> WriteWrapper<W> {
    pub fn new(w: W) -> WriteWrapper<W> {
        WriteWrapper { w, err: None }
    }

    /// Replaces the given error with the held error if available.
    pub fn take_err(&mut self, original: Error) -> Error {
        self.err
            .take()
            .map(|io_err| {
                Error::new(ErrorKind::WriteFailure, "I/O error during rendering")
                    .with_source(io_err)
            })
            .unwrap_or(original)
    }
}

impl<W: io::Write> fmt::Write for WriteWrapper<W> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.w.write_all(s.as_bytes()).map_err(|e| {
            self.err = Some(e);
            fmt::Error
        })
    }
}
