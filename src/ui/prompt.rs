use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Stdin};

use crate::core::session::InputSource;
use crate::utils::input::{sanitize_text_input, strip_encoded_surrogates};

/// Newline-delimited reader shared by the menu and every chat session.
///
/// Partially read bytes stay in `pending` when a read is cancelled, so the
/// next call resumes the same line.
pub struct LineReader<R> {
    reader: BufReader<R>,
    pending: Vec<u8>,
}

pub type StdinSource = LineReader<Stdin>;

impl StdinSource {
    pub fn stdin() -> Self {
        Self::new(tokio::io::stdin())
    }
}

impl<R: AsyncRead + Unpin + Send> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            pending: Vec::new(),
        }
    }
}

#[async_trait]
impl<R: AsyncRead + Unpin + Send> InputSource for LineReader<R> {
    async fn read_line(&mut self) -> io::Result<Option<String>> {
        let read = self.reader.read_until(b'\n', &mut self.pending).await?;
        if read == 0 && self.pending.is_empty() {
            return Ok(None);
        }

        let raw = std::mem::take(&mut self.pending);
        let cleaned = strip_encoded_surrogates(&raw);
        let text = String::from_utf8_lossy(&cleaned);
        Ok(Some(sanitize_text_input(
            text.trim_end_matches(['\r', '\n']),
        )))
    }
}
