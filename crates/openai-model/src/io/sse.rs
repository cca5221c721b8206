use std::fmt::{self, Display};

use super::{Chunks, ChunksError};

#[derive(Debug, PartialEq, Eq)]
pub enum Error {
    Chunks(ChunksError),
    InvalidPayload,
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Chunks(err) => Display::fmt(err, f),
            Error::InvalidPayload => f.write_str("malformed server-sent event"),
        }
    }
}

/// Reads the `data` of server-sent events from a chunk stream.
///
/// Lines end with LF or CRLF. Comments and the `event`, `id` and `retry`
/// fields are skipped, multiple `data` lines of one event are joined with
/// LF. An event that isn't terminated by a blank line before the body
/// ends is discarded.
pub struct Sse {
    buf: Vec<u8>,
    data: Option<String>,
    chunks: Chunks,
    eof: bool,
}

impl Sse {
    #[inline]
    pub fn new(chunks: Chunks) -> Self {
        Self {
            buf: vec![],
            data: None,
            chunks,
            eof: false,
        }
    }

    /// Returns the data of the next event, or `None` at the end of the
    /// stream.
    pub async fn next_event(&mut self) -> Result<Option<String>, Error> {
        loop {
            while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = self.buf.drain(..=pos).collect();
                if let Some(data) = self.process_line(&line[..pos])? {
                    return Ok(Some(data));
                }
            }
            if self.eof {
                if !self.buf.is_empty() || self.data.is_some() {
                    debug!("discarding an unterminated event");
                }
                return Ok(None);
            }
            match self.chunks.next_chunk().await.map_err(Error::Chunks)? {
                Some(bytes) => self.buf.extend_from_slice(&bytes),
                None => self.eof = true,
            }
        }
    }

    fn process_line(&mut self, line: &[u8]) -> Result<Option<String>, Error> {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        let line = str::from_utf8(line).map_err(|_| Error::InvalidPayload)?;

        if line.is_empty() {
            // Dispatch.
            return Ok(self.data.take());
        }
        if line.starts_with(':') {
            return Ok(None);
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => {
                (field, value.strip_prefix(' ').unwrap_or(value))
            }
            None => (line, ""),
        };
        match field {
            "data" => match &mut self.data {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_owned()),
            },
            "event" | "id" | "retry" => trace!("skipping sse field `{field}`"),
            _ => return Err(Error::InvalidPayload),
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_normal_events() {
        let chunks = Chunks::from_parts(["data: hello\n\n", "data: bye\n\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "bye");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_split_chunks() {
        let chunks = Chunks::from_parts([
            "data:",
            " hel",
            "lo\r\n",
            "\r\n: keep-alive\n\nevent: message\ndata: a\ndata: b\n",
            "\n",
        ]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "hello");
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "a\nb");
        assert_eq!(sse.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_multibyte_split() {
        let mut chunks = Chunks::from_parts(Vec::<&'static str>::new());
        if let Chunks::Memory(parts) = &mut chunks {
            let bytes = "data: héllo\n\n".as_bytes();
            parts.push_back(bytes::Bytes::copy_from_slice(&bytes[..8]));
            parts.push_back(bytes::Bytes::copy_from_slice(&bytes[8..]));
        }
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap().unwrap(), "héllo");
    }

    #[tokio::test]
    async fn test_invalid_data() {
        let mut sse = Sse::new(Chunks::from_parts(["xxxxxx\n\n"]));
        assert_eq!(sse.next_event().await.unwrap_err(), Error::InvalidPayload);

        let mut sse = Sse::new(Chunks::from_parts(["xxxxxx"]));
        assert_eq!(sse.next_event().await.unwrap(), None);

        let chunks = Chunks::from_parts(["data: hello\n", "data: bye\n"]);
        let mut sse = Sse::new(chunks);
        assert_eq!(sse.next_event().await.unwrap(), None);
    }
}
