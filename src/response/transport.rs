use std::io::{self, Write};

/// Byte sink a response is serialized to.
///
/// HTTP hosts map `code` to the status line; the CLI surface treats it as the exit code.
pub trait Transport {
    fn send_head(&mut self, code: u16, headers: &[(String, String)]) -> io::Result<()>;

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()>;

    /// Incidental output printed by a controller that does not capture it.
    fn write_stray(&mut self, text: &str) -> io::Result<()>;

    /// Drop anything buffered but not yet flushed.
    fn discard_buffered(&mut self);

    fn finish(&mut self) -> io::Result<()>;

    /// Last-resort message when no response could be sent. Must not fail.
    fn emit_fallback(&mut self, message: &str);
}

/// In-memory transport. The HTTP server converts it into a wire response afterwards.
#[derive(Debug, Default, Clone)]
pub struct BufferedTransport {
    pub status: Option<u16>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    /// Stray output written before the head
    pub stray: String,
    pub fallback: Option<String>,
    pub finished: bool,
}

impl BufferedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text, lossy.
    #[must_use]
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Stray output followed by the body, the order a client would receive them.
    #[must_use]
    pub fn output(&self) -> Vec<u8> {
        let mut output = self.stray.clone().into_bytes();
        output.extend_from_slice(&self.body);
        output
    }
}

impl Transport for BufferedTransport {
    /// A new head starts a new response: any body written after a previous head is dropped.
    fn send_head(&mut self, code: u16, headers: &[(String, String)]) -> io::Result<()> {
        self.status = Some(code);
        self.headers = headers.to_vec();
        self.body.clear();
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        self.body.extend_from_slice(chunk);
        Ok(())
    }

    fn write_stray(&mut self, text: &str) -> io::Result<()> {
        self.stray.push_str(text);
        Ok(())
    }

    fn discard_buffered(&mut self) {
        self.stray.clear();
    }

    fn finish(&mut self) -> io::Result<()> {
        self.finished = true;
        Ok(())
    }

    fn emit_fallback(&mut self, message: &str) {
        self.fallback = Some(message.to_string());
    }
}

/// Console transport: body to stdout for exit code 0, to stderr otherwise.
#[derive(Debug, Default)]
pub struct StdioTransport {
    code: Option<u16>,
}

impl StdioTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit code received with the head.
    #[must_use]
    pub fn code(&self) -> Option<u16> {
        self.code
    }
}

impl Transport for StdioTransport {
    fn send_head(&mut self, code: u16, _headers: &[(String, String)]) -> io::Result<()> {
        self.code = Some(code);
        Ok(())
    }

    fn write_body(&mut self, chunk: &[u8]) -> io::Result<()> {
        if self.code.unwrap_or(0) == 0 {
            io::stdout().lock().write_all(chunk)
        } else {
            io::stderr().lock().write_all(chunk)
        }
    }

    fn write_stray(&mut self, text: &str) -> io::Result<()> {
        io::stdout().lock().write_all(text.as_bytes())
    }

    fn discard_buffered(&mut self) {}

    fn finish(&mut self) -> io::Result<()> {
        io::stdout().flush()?;
        io::stderr().flush()
    }

    fn emit_fallback(&mut self, message: &str) {
        let _ = writeln!(io::stderr().lock(), "{message}");
    }
}
