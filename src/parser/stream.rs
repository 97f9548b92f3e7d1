use std::{
    pin::Pin,
    task::{Context, Poll},
};

use bytes::{Buf, Bytes, BytesMut};
use futures::Stream;

use super::headers::{parse_part_headers, PartHeaders};
use crate::{GalleryError, ParseError};

/// Upper bound on the size of one part's header block.
const MAX_HEADER_BLOCK: usize = 16 * 1024;

/// A fully buffered multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawPart {
    /// Parsed part headers.
    pub headers: PartHeaders,
    /// Part body.
    pub body: Bytes,
}

/// Ceilings applied while bytes arrive.
#[derive(Debug, Clone, Copy, Default)]
pub struct StreamLimits {
    /// Maximum body size of a single part.
    pub max_part_size: Option<u64>,
    /// Maximum total number of bytes read from the source.
    pub max_body_size: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Preamble,
    Headers,
    Body,
    Finished,
}

enum Step {
    Part(RawPart),
    NeedMore,
    Done,
}

/// Incremental multipart parser over a chunked byte stream.
///
/// Limits are checked as chunks arrive, so an oversized request fails without
/// being buffered in full.
#[derive(Debug)]
pub struct MultipartStream<S> {
    source: S,
    buffer: BytesMut,
    dash_boundary: Vec<u8>,
    delimiter: Vec<u8>,
    phase: Phase,
    current: Option<PartHeaders>,
    limits: StreamLimits,
    received: u64,
    exhausted: bool,
    /// Buffer offset before which the pending search is known not to match.
    scan_from: usize,
}

impl<S> MultipartStream<S> {
    /// Creates a parser for a known boundary.
    pub fn new(boundary: &str, source: S, limits: StreamLimits) -> Result<Self, ParseError> {
        if boundary.is_empty() || boundary.contains(['\r', '\n']) {
            return Err(ParseError::new("invalid multipart boundary"));
        }
        Ok(Self {
            source,
            buffer: BytesMut::new(),
            dash_boundary: format!("--{boundary}").into_bytes(),
            delimiter: format!("\r\n--{boundary}").into_bytes(),
            phase: Phase::Preamble,
            current: None,
            limits,
            received: 0,
            exhausted: false,
            scan_from: 0,
        })
    }

    fn step(&mut self) -> Result<Step, GalleryError> {
        loop {
            match self.phase {
                Phase::Preamble => {
                    let Some(line_end) = search(&self.buffer, &mut self.scan_from, b"\r\n") else {
                        return Ok(Step::NeedMore);
                    };
                    let line = self.buffer.split_to(line_end);
                    self.buffer.advance(2);
                    self.scan_from = 0;
                    let line = trim_trailing_whitespace(&line);
                    if line == self.dash_boundary.as_slice() {
                        self.phase = Phase::Headers;
                    } else if is_close(line, &self.dash_boundary) {
                        self.phase = Phase::Finished;
                    }
                }
                Phase::Headers => {
                    if self.buffer.starts_with(b"\r\n") {
                        return Err(ParseError::new("missing Content-Disposition header").into());
                    }
                    let Some(end) = search(&self.buffer, &mut self.scan_from, b"\r\n\r\n") else {
                        if self.buffer.len() > MAX_HEADER_BLOCK {
                            return Err(ParseError::new("part header block too large").into());
                        }
                        return Ok(Step::NeedMore);
                    };
                    let raw = self.buffer.split_to(end);
                    self.buffer.advance(4);
                    self.scan_from = 0;
                    self.current = Some(parse_part_headers(&raw)?);
                    self.phase = Phase::Body;
                }
                Phase::Body => {
                    let Some(at) = search(&self.buffer, &mut self.scan_from, &self.delimiter)
                    else {
                        self.check_partial_body()?;
                        return Ok(Step::NeedMore);
                    };
                    let after = at + self.delimiter.len();
                    let Some(suffix) = self.buffer.get(after..after + 2) else {
                        return Ok(Step::NeedMore);
                    };
                    let next_phase = match suffix {
                        b"\r\n" => Phase::Headers,
                        b"--" => Phase::Finished,
                        _ => return Err(ParseError::new("malformed multipart boundary").into()),
                    };

                    let body = self.buffer.split_to(at).freeze();
                    self.buffer.advance(self.delimiter.len() + 2);
                    self.scan_from = 0;
                    let headers = self
                        .current
                        .take()
                        .ok_or_else(|| ParseError::new("missing part headers"))?;
                    self.check_part_size(&headers, body.len())?;

                    self.phase = next_phase;
                    if next_phase == Phase::Finished {
                        self.buffer.clear();
                    }
                    return Ok(Step::Part(RawPart { headers, body }));
                }
                Phase::Finished => {
                    self.buffer.clear();
                    return Ok(Step::Done);
                }
            }
        }
    }

    /// Fails early once the buffered body provably exceeds the part limit.
    fn check_partial_body(&self) -> Result<(), GalleryError> {
        let Some(headers) = self.current.as_ref() else {
            return Ok(());
        };
        let undecided_tail = self.delimiter.len().saturating_sub(1);
        let body_len = self.buffer.len().saturating_sub(undecided_tail);
        self.check_part_size(headers, body_len)
    }

    fn check_part_size(&self, headers: &PartHeaders, len: usize) -> Result<(), GalleryError> {
        match self.limits.max_part_size {
            Some(max) if len as u64 > max => Err(GalleryError::FileSizeLimitExceeded {
                field: headers.field_name.clone(),
                max_file_size: max,
            }),
            _ => Ok(()),
        }
    }

    fn accept_chunk(&mut self, chunk: &[u8]) -> Result<(), GalleryError> {
        let next = self.received.saturating_add(chunk.len() as u64);
        if let Some(max_body_size) = self.limits.max_body_size {
            if next > max_body_size {
                return Err(GalleryError::BodySizeLimitExceeded { max_body_size });
            }
        }
        self.received = next;
        self.buffer.extend_from_slice(chunk);
        Ok(())
    }

    fn fail(&mut self, err: GalleryError) -> Poll<Option<Result<RawPart, GalleryError>>> {
        self.phase = Phase::Finished;
        self.buffer.clear();
        self.scan_from = 0;
        Poll::Ready(Some(Err(err)))
    }
}

impl<S> Stream for MultipartStream<S>
where
    S: Stream<Item = Result<Bytes, GalleryError>> + Unpin,
{
    type Item = Result<RawPart, GalleryError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            match this.step() {
                Ok(Step::Part(part)) => return Poll::Ready(Some(Ok(part))),
                Ok(Step::Done) => return Poll::Ready(None),
                Ok(Step::NeedMore) => {}
                Err(err) => return this.fail(err),
            }

            if this.exhausted {
                let err = if this.phase == Phase::Preamble {
                    ParseError::new("missing opening boundary").into()
                } else {
                    GalleryError::IncompleteStream
                };
                return this.fail(err);
            }

            match Pin::new(&mut this.source).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    if let Err(err) = this.accept_chunk(&chunk) {
                        return this.fail(err);
                    }
                }
                Poll::Ready(Some(Err(err))) => return this.fail(err),
                Poll::Ready(None) => this.exhausted = true,
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

fn is_close(line: &[u8], dash_boundary: &[u8]) -> bool {
    line.len() == dash_boundary.len() + 2
        && line.starts_with(dash_boundary)
        && line.ends_with(b"--")
}

fn trim_trailing_whitespace(line: &[u8]) -> &[u8] {
    let end = line
        .iter()
        .rposition(|b| *b != b' ' && *b != b'\t')
        .map_or(0, |idx| idx + 1);
    &line[..end]
}

/// Finds `needle` in `buffer`, skipping the prefix a previous miss already
/// ruled out. On a miss `scan_from` moves to the first offset where a match
/// could still start once more bytes arrive, so each byte is scanned once.
fn search(buffer: &[u8], scan_from: &mut usize, needle: &[u8]) -> Option<usize> {
    let from = (*scan_from).min(buffer.len());
    match find(&buffer[from..], needle) {
        Some(at) => Some(from + at),
        None => {
            *scan_from = buffer.len().saturating_sub(needle.len().saturating_sub(1));
            None
        }
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

#[cfg(test)]
mod tests {
    use futures::{stream, StreamExt, TryStreamExt};

    use super::*;

    fn chunks(
        body: &'static [u8],
        size: usize,
    ) -> impl Stream<Item = Result<Bytes, GalleryError>> + Unpin {
        stream::iter(
            body.chunks(size)
                .map(|chunk| Ok(Bytes::from_static(chunk)))
                .collect::<Vec<_>>(),
        )
    }

    const BODY: &[u8] = b"preamble text\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"a.gif\"\r\n\
\r\n\
GIF89a\r\n\
--XYZ\r\n\
Content-Disposition: form-data; name=\"note\"\r\n\
\r\n\
hi\r\n\
--XYZ--\r\n\
epilogue";

    #[tokio::test]
    async fn parses_across_every_chunk_size() {
        for size in [1, 2, 3, 7, 16, BODY.len()] {
            let parts: Vec<RawPart> =
                MultipartStream::new("XYZ", chunks(BODY, size), StreamLimits::default())
                    .expect("valid boundary")
                    .try_collect()
                    .await
                    .expect("parse succeeds");
            assert_eq!(parts.len(), 2, "chunk size {size}");
            assert_eq!(parts[0].headers.file_name.as_deref(), Some("a.gif"));
            assert_eq!(parts[0].body, Bytes::from_static(b"GIF89a"));
            assert_eq!(parts[1].headers.field_name, "note");
            assert_eq!(parts[1].body, Bytes::from_static(b"hi"));
        }
    }

    #[test]
    fn body_search_resumes_where_the_last_chunk_ended() {
        let mut parser = MultipartStream::new(
            "XYZ",
            stream::empty::<Result<Bytes, GalleryError>>(),
            StreamLimits::default(),
        )
        .expect("valid boundary");
        parser
            .accept_chunk(b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a\"\r\n\r\n")
            .expect("within limits");
        assert!(matches!(parser.step(), Ok(Step::NeedMore)));
        assert_eq!(parser.phase, Phase::Body);

        let tail = parser.delimiter.len() - 1;
        for _ in 0..64 {
            parser.accept_chunk(&[b'x'; 1024]).expect("within limits");
            assert!(matches!(parser.step(), Ok(Step::NeedMore)));
            assert_eq!(parser.scan_from, parser.buffer.len() - tail);
        }

        parser.accept_chunk(b"\r\n--XYZ--\r\n").expect("within limits");
        let Ok(Step::Part(part)) = parser.step() else {
            panic!("part should complete");
        };
        assert_eq!(part.body.len(), 64 * 1024);
        assert_eq!(parser.scan_from, 0);
    }

    #[tokio::test]
    async fn truncated_body_is_incomplete() {
        let body: &'static [u8] =
            b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a\"\r\n\r\nabc";
        let mut parts = MultipartStream::new("XYZ", chunks(body, 4), StreamLimits::default())
            .expect("valid boundary");
        let err = parts
            .next()
            .await
            .expect("an item")
            .expect_err("must fail");
        assert!(matches!(err, GalleryError::IncompleteStream));
        assert!(parts.next().await.is_none());
    }

    #[tokio::test]
    async fn oversized_part_fails_before_its_end_arrives() {
        let body: &'static [u8] = b"--XYZ\r\nContent-Disposition: form-data; name=\"file\"; filename=\"a\"\r\n\r\n0123456789abcdefghij";
        let limits = StreamLimits {
            max_part_size: Some(8),
            max_body_size: None,
        };
        let mut parts =
            MultipartStream::new("XYZ", chunks(body, 5), limits).expect("valid boundary");
        let err = parts
            .next()
            .await
            .expect("an item")
            .expect_err("must fail");
        assert!(matches!(
            err,
            GalleryError::FileSizeLimitExceeded { max_file_size: 8, .. }
        ));
    }
}
