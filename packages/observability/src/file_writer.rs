//! Append-only JSONL log file writer.

use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;

/// Shared handle to a log file opened in append mode.
///
/// Every write is flushed immediately so other processes tailing the file
/// see whole lines.
#[derive(Clone)]
pub struct JsonlFileWriter {
    inner: Arc<Mutex<BufWriter<File>>>,
}

impl JsonlFileWriter {
    pub fn new(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new().create(true).append(true).open(path)?;

        Ok(Self {
            inner: Arc::new(Mutex::new(BufWriter::with_capacity(8192, file))),
        })
    }
}

impl Write for JsonlFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self.inner.lock();
        let written = guard.write(buf)?;
        guard.flush()?;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flush()
    }
}

/// [`MakeWriter`] handing out clones of one [`JsonlFileWriter`].
#[derive(Clone)]
pub struct WriterFactory {
    writer: JsonlFileWriter,
}

impl WriterFactory {
    pub fn new(writer: JsonlFileWriter) -> Self {
        Self { writer }
    }
}

impl<'a> MakeWriter<'a> for WriterFactory {
    type Writer = JsonlFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.writer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_writer_appends_across_instances() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");

        JsonlFileWriter::new(&path)
            .unwrap()
            .write_all(b"{\"n\":1}\n")
            .unwrap();
        JsonlFileWriter::new(&path)
            .unwrap()
            .write_all(b"{\"n\":2}\n")
            .unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "{\"n\":1}\n{\"n\":2}\n"
        );
    }

    #[test]
    fn test_writer_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("deeply").join("nested").join("relay.jsonl");

        assert!(JsonlFileWriter::new(&path).is_ok());
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_factory_writers_share_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("relay.jsonl");
        let factory = WriterFactory::new(JsonlFileWriter::new(&path).unwrap());

        factory.make_writer().write_all(b"a\n").unwrap();
        factory.make_writer().write_all(b"b\n").unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a\nb\n");
    }
}
