use super::{RecordHandler, SinkError};
use crate::domain::{LineFormatter, LogRecord, RecordFormatter};
use std::io::Write;
use std::sync::Arc;

/// Writes one formatted line per record to any `Write` implementation.
pub struct StreamSink<W: Write + Send + 'static> {
    writer: W,
    formatter: Arc<dyn RecordFormatter>,
    terminator: &'static str,
}

impl<W: Write + Send + 'static> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self::with_formatter(writer, Arc::new(LineFormatter::new()))
    }

    pub fn with_formatter(writer: W, formatter: Arc<dyn RecordFormatter>) -> Self {
        Self {
            writer,
            formatter,
            terminator: "\n",
        }
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write + Send + 'static> RecordHandler for StreamSink<W> {
    fn handle(&mut self, record: LogRecord) -> Result<(), SinkError> {
        // Merged bursts already end their last line with a terminator
        let text = self.formatter.format(&record);
        let line = text.strip_suffix(self.terminator).unwrap_or(&text);
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(self.terminator.as_bytes())?;
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), SinkError> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{LogLevel, MessageFormatter};

    #[test]
    fn test_stream_sink_writes_one_line_per_record() {
        let mut sink = StreamSink::with_formatter(Vec::new(), Arc::new(MessageFormatter));

        sink.handle(LogRecord::new(LogLevel::Info, "test", "first"))
            .unwrap();
        sink.handle(LogRecord::new(LogLevel::Warn, "test", "second"))
            .unwrap();
        sink.close().unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "first\nsecond\n");
    }

    #[test]
    fn test_stream_sink_strips_only_one_terminator() {
        let mut sink = StreamSink::with_formatter(Vec::new(), Arc::new(MessageFormatter));

        // A merged burst whose last record had empty text
        sink.handle(LogRecord::new(LogLevel::Info, "test", "a\n\n"))
            .unwrap();
        sink.handle(LogRecord::new(LogLevel::Info, "test", "b"))
            .unwrap();

        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output, "a\n\nb\n");
    }

    #[test]
    fn test_stream_sink_propagates_write_errors() {
        struct BrokenPipe;

        impl Write for BrokenPipe {
            fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "closed"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut sink = StreamSink::new(BrokenPipe);
        let result = sink.handle(LogRecord::new(LogLevel::Info, "test", "lost"));
        assert!(matches!(result, Err(SinkError::Io(_))));
    }
}
