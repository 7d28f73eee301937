use std::io::{self, Write};

use crate::playback::OutputSink;

/// Types into a terminal. Backspace is rendered as `\x08 \x08` so the erased
/// cell is blanked, not just stepped over.
pub struct ConsoleSink<W: Write = io::Stdout> {
    out: W,
    connected: bool,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            connected: true,
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn write(&mut self, bytes: &[u8]) {
        if !self.connected {
            return;
        }
        if let Err(err) = self.out.write_all(bytes).and_then(|()| self.out.flush()) {
            tracing::warn!(error = %err, "console output failed");
            self.connected = false;
        }
    }
}

impl<W: Write> OutputSink for ConsoleSink<W> {
    fn send(&mut self, c: char) {
        if c == '\r' {
            return;
        }
        let mut buf = [0u8; 4];
        self.write(c.encode_utf8(&mut buf).as_bytes());
    }

    fn send_backspace(&mut self) {
        self.write(b"\x08 \x08");
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenPipe;

    impl Write for BrokenPipe {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn writes_chars_and_erasing_backspaces() {
        let mut sink = ConsoleSink::new(Vec::new());
        sink.send('h');
        sink.send('é');
        sink.send_backspace();
        assert_eq!(sink.into_inner(), "hé\x08 \x08".as_bytes());
    }

    #[test]
    fn write_failure_disconnects() {
        let mut sink = ConsoleSink::new(BrokenPipe);
        assert!(sink.is_connected());
        sink.send('x');
        assert!(!sink.is_connected());
    }
}
