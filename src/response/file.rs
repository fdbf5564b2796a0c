use super::{
    ErrorContext, ErrorResponse, HtmlResponse, Response, ResponseHead, SendContext, SendError,
    Sendable, Transport,
};
use crate::error::{DispatchError, UserError};
use chrono::{DateTime, Utc};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Cache lifetime used unless one is given explicitly.
pub const DEFAULT_MAX_AGE: u32 = 0;

const CHUNK_SIZE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposition {
    #[default]
    Attachment,
    Inline,
}

impl Disposition {
    fn as_str(self) -> &'static str {
        match self {
            Self::Attachment => "attachment",
            Self::Inline => "inline",
        }
    }
}

enum FileSource {
    Path(PathBuf),
    Reader(Box<dyn Read + Send + Sync>),
}

/// Raw byte stream with explicit disposition and caching headers.
///
/// Before streaming, the session lock is released and buffered stray output discarded.
pub struct FileResponse {
    head: ResponseHead,
    source: Option<FileSource>,
    file_name: String,
    disposition: Disposition,
    max_age: u32,
}

impl fmt::Debug for FileResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let source = match &self.source {
            Some(FileSource::Path(p)) => p.display().to_string(),
            Some(FileSource::Reader(_)) => "<reader>".to_string(),
            None => "<consumed>".to_string(),
        };
        f.debug_struct("FileResponse")
            .field("head", &self.head)
            .field("source", &source)
            .field("file_name", &self.file_name)
            .field("disposition", &self.disposition)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl FileResponse {
    /// Stream a local file.
    ///
    /// # Errors
    ///
    /// [`DispatchError::NotFound`] when `path` is not a regular file.
    pub fn local(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();
        let metadata = std::fs::metadata(path)
            .ok()
            .filter(|m| m.is_file())
            .ok_or_else(|| DispatchError::not_found(format!("file {}", path.display())))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let mut response = Self::with_source(
            FileSource::Path(path.to_path_buf()),
            file_name,
            content_type_for(path),
        );
        response
            .head
            .set_header("Content-Length", metadata.len().to_string());
        if let Ok(modified) = metadata.modified() {
            let modified: DateTime<Utc> = modified.into();
            response.head.set_header(
                "Last-Modified",
                modified.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
            );
        }
        Ok(response)
    }

    /// Stream from any reader; `len` sets `Content-Length` when known.
    pub fn from_reader<R>(
        reader: R,
        file_name: impl Into<String>,
        content_type: &str,
        len: Option<u64>,
    ) -> Self
    where
        R: Read + Send + Sync + 'static,
    {
        let mut response =
            Self::with_source(FileSource::Reader(Box::new(reader)), file_name.into(), content_type);
        if let Some(len) = len {
            response.head.set_header("Content-Length", len.to_string());
        }
        response
    }

    fn with_source(source: FileSource, file_name: String, content_type: &str) -> Self {
        let mut head = ResponseHead::new(200);
        head.set_header("Content-Type", content_type);
        Self {
            head,
            source: Some(source),
            file_name,
            disposition: Disposition::default(),
            max_age: DEFAULT_MAX_AGE,
        }
    }

    /// Download under `file_name`.
    #[must_use]
    pub fn attachment(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self.disposition = Disposition::Attachment;
        self
    }

    /// Display in the client instead of downloading.
    #[must_use]
    pub fn inline(mut self) -> Self {
        self.disposition = Disposition::Inline;
        self
    }

    #[must_use]
    pub fn with_max_age(mut self, seconds: u32) -> Self {
        self.max_age = seconds;
        self
    }

    #[must_use]
    pub fn with_content_type(mut self, content_type: &str) -> Self {
        self.head.set_header("Content-Type", content_type);
        self
    }

    #[must_use]
    pub fn file_name(&self) -> &str {
        &self.file_name
    }
}

/// MIME type from a file extension; `text/plain` for unknown ones.
#[must_use]
pub fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "pdf" => "application/pdf",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "zip" => "application/zip",
        _ => "text/plain",
    }
}

impl Sendable for FileResponse {
    fn head(&self) -> &ResponseHead {
        &self.head
    }

    fn head_mut(&mut self) -> &mut ResponseHead {
        &mut self.head
    }

    fn prepare(&mut self, ctx: &SendContext<'_>) -> Result<(), SendError> {
        ctx.session.release_lock();
        let disposition = format!(
            "{}; filename=\"{}\"",
            self.disposition.as_str(),
            self.file_name.replace('"', "")
        );
        self.head.set_header("Content-Disposition", disposition);
        self.head.set_header(
            "Cache-Control",
            format!("private, max-age={}, must-revalidate", self.max_age),
        );
        self.head.set_header("Pragma", "public");
        Ok(())
    }

    fn write_body(
        &mut self,
        transport: &mut dyn Transport,
        _ctx: &SendContext<'_>,
    ) -> Result<(), SendError> {
        transport.discard_buffered();
        let mut reader: Box<dyn Read> = match self.source.take() {
            Some(FileSource::Path(path)) => Box::new(File::open(path)?),
            Some(FileSource::Reader(reader)) => reader,
            None => return Err(SendError::AlreadySent),
        };
        let mut buf = [0u8; CHUNK_SIZE];
        loop {
            let read = reader.read(&mut buf)?;
            if read == 0 {
                break;
            }
            transport.write_body(&buf[..read])?;
        }
        Ok(())
    }
}

impl ErrorResponse for FileResponse {
    fn from_error(err: &DispatchError, ctx: &ErrorContext) -> Response {
        HtmlResponse::from_error(err, ctx)
    }

    fn from_user_error(err: &UserError, ctx: &ErrorContext) -> Response {
        HtmlResponse::from_user_error(err, ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{BufferedTransport, NullRenderer};
    use crate::session::{MemorySession, SessionStore};
    use std::io::Cursor;

    #[test]
    fn test_local_missing_file_is_not_found() {
        let err = FileResponse::local("/definitely/not/here.txt").unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_streaming_releases_session_and_drops_stray_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.pdf");
        std::fs::write(&path, b"%PDF-1.4 data").unwrap();

        let session = MemorySession::new();
        session.start();
        let ctx = SendContext {
            renderer: &NullRenderer,
            session: &session,
        };
        let mut transport = BufferedTransport::new();
        transport.write_stray("stray").unwrap();

        let mut response: Response = FileResponse::local(&path).unwrap().with_max_age(60).into();
        response.send(&mut transport, &ctx).unwrap();

        assert_eq!(session.release_count(), 1);
        assert_eq!(transport.output(), b"%PDF-1.4 data".to_vec());
        assert_eq!(transport.header("Content-Type"), Some("application/pdf"));
        assert_eq!(transport.header("Content-Length"), Some("13"));
        assert_eq!(
            transport.header("Content-Disposition"),
            Some("attachment; filename=\"report.pdf\"")
        );
        assert_eq!(
            transport.header("Cache-Control"),
            Some("private, max-age=60, must-revalidate")
        );
        assert_eq!(transport.header("Pragma"), Some("public"));
        assert!(transport.header("Last-Modified").is_some_and(|v| v.ends_with("GMT")));
    }

    #[test]
    fn test_reader_inline() {
        let ctx = SendContext {
            renderer: &NullRenderer,
            session: &crate::session::NullSession,
        };
        let mut response: Response =
            FileResponse::from_reader(Cursor::new(b"a,b\n".to_vec()), "data.csv", "text/csv", Some(4))
                .inline()
                .into();
        let mut transport = BufferedTransport::new();
        response.send(&mut transport, &ctx).unwrap();
        assert_eq!(transport.body, b"a,b\n".to_vec());
        assert_eq!(
            transport.header("Content-Disposition"),
            Some("inline; filename=\"data.csv\"")
        );
    }
}
