use std::fs::File;
use std::io::{self, BufWriter, Cursor, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Error returned when a sink is written to or closed after it has already
/// been closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("sink closed")]
pub struct SinkClosed;

/// Checks whether an io error was caused by a closed sink.
pub fn is_sink_closed(err: &io::Error) -> bool {
    err.get_ref().map(|e| e.is::<SinkClosed>()).unwrap_or(false)
}

fn closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, SinkClosed)
}

/// A named, closable byte destination. Handles are cheap clones of the same
/// underlying sink; writes and closes are expected to come from a single
/// task at a time.
pub trait Sink: Write + Seek + Clone + Send + Sync + 'static {
    fn name(&self) -> String;

    /// Closes the sink. A second close reports [`SinkClosed`] but never
    /// panics.
    fn close(&self) -> Result<(), SinkClosed>;

    fn is_closed(&self) -> bool;
}

/// A sink backed by a file on disk. Writes are buffered and flushed on
/// close.
#[derive(Clone)]
pub struct FileSink {
    name: String,
    inner: Arc<Mutex<Option<BufWriter<File>>>>,
}

impl FileSink {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let file = File::create(path)?;
        Ok(Self {
            name: path.display().to_string(),
            inner: Arc::new(Mutex::new(Some(BufWriter::new(file)))),
        })
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<BufWriter<File>>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.lock().as_mut() {
            Some(file) => file.write(buf),
            None => Err(closed()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.lock().as_mut() {
            Some(file) => file.flush(),
            None => Err(closed()),
        }
    }
}

impl Seek for FileSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self.lock().as_mut() {
            Some(file) => file.seek(pos),
            None => Err(closed()),
        }
    }
}

impl Sink for FileSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&self) -> Result<(), SinkClosed> {
        let mut inner = self.lock();
        match inner.take() {
            Some(mut file) => {
                // Dropping the writer closes the file; flush errors are not
                // recoverable at this point.
                let _ = file.flush();
                Ok(())
            }
            None => Err(SinkClosed),
        }
    }

    fn is_closed(&self) -> bool {
        self.lock().is_none()
    }
}

struct BufferInner {
    buf: Cursor<Vec<u8>>,
    read_pos: usize,
    closed: bool,
    max_size: Option<usize>,
}

/// An in-memory sink identified by a plain name. Primarily used by tests;
/// an optional size cap guards against unbounded growth elsewhere.
#[derive(Clone)]
pub struct BufferSink {
    name: String,
    inner: Arc<Mutex<BufferInner>>,
}

impl BufferSink {
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name, None)
    }

    pub fn with_max_size(name: impl Into<String>, max_size: usize) -> Self {
        Self::build(name, Some(max_size))
    }

    fn build(name: impl Into<String>, max_size: Option<usize>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(BufferInner {
                buf: Cursor::new(Vec::new()),
                read_pos: 0,
                closed: false,
                max_size,
            })),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BufferInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of everything written so far.
    pub fn data(&self) -> Vec<u8> {
        self.lock().buf.get_ref().clone()
    }
}

impl Write for BufferSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed());
        }
        if let Some(max_size) = inner.max_size {
            let end = inner.buf.position() as usize + buf.len();
            if end > max_size {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "buffer sink is full",
                ));
            }
        }
        inner.buf.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        if self.lock().closed {
            return Err(closed());
        }
        Ok(())
    }
}

impl Seek for BufferSink {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(closed());
        }
        inner.buf.seek(pos)
    }
}

impl Read for BufferSink {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.lock();
        let pos = inner.read_pos;
        let data = inner.buf.get_ref();
        let available = data.len().saturating_sub(pos);
        let count = available.min(buf.len());
        buf[..count].copy_from_slice(&data[pos..pos + count]);
        inner.read_pos += count;
        Ok(count)
    }
}

impl Sink for BufferSink {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn close(&self) -> Result<(), SinkClosed> {
        let mut inner = self.lock();
        if inner.closed {
            return Err(SinkClosed);
        }
        inner.closed = true;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
