use http::{header, HeaderMap, HeaderName, HeaderValue};

use crate::ParseError;

/// Headers of one multipart part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartHeaders {
    /// `name` parameter of `Content-Disposition`.
    pub field_name: String,
    /// `filename` (or decoded `filename*`) parameter, when present.
    pub file_name: Option<String>,
    /// Declared part content type. Informational only; never trusted.
    pub content_type: Option<mime::Mime>,
}

impl PartHeaders {
    /// Returns `true` when the part is a file upload.
    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }
}

/// Parses a raw CRLF-separated header block into [`PartHeaders`].
pub fn parse_part_headers(raw: &[u8]) -> Result<PartHeaders, ParseError> {
    let headers = parse_header_block(raw)?;

    let disposition = headers
        .get(header::CONTENT_DISPOSITION)
        .ok_or_else(|| ParseError::new("missing Content-Disposition header"))?;
    let disposition = std::str::from_utf8(disposition.as_bytes())
        .map_err(|_| ParseError::new("Content-Disposition must be UTF-8"))?;
    let (field_name, file_name) = parse_content_disposition(disposition)?;

    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse::<mime::Mime>().ok());

    Ok(PartHeaders {
        field_name,
        file_name,
        content_type,
    })
}

/// Parses a `Content-Disposition: form-data` value into `(name, filename)`.
pub fn parse_content_disposition(value: &str) -> Result<(String, Option<String>), ParseError> {
    let mut params = split_params(value).into_iter();
    let disposition = params.next().unwrap_or_default();
    if !disposition.trim().eq_ignore_ascii_case("form-data") {
        return Err(ParseError::new("Content-Disposition must be form-data"));
    }

    let mut name = None;
    let mut file_name = None;
    let mut extended_file_name = None;
    for param in params {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let raw = raw.trim();
        match key.as_str() {
            "name" => name = Some(unquote(raw)),
            "filename" => file_name = Some(unquote(raw)),
            "filename*" => extended_file_name = decode_extended(raw),
            _ => {}
        }
    }

    let name = name.ok_or_else(|| ParseError::new("Content-Disposition is missing `name`"))?;
    Ok((name, extended_file_name.or(file_name)))
}

fn parse_header_block(raw: &[u8]) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();
    for line in raw.split(|b| *b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            continue;
        }
        let colon = line
            .iter()
            .position(|b| *b == b':')
            .ok_or_else(|| ParseError::new("invalid part header line"))?;
        let name = HeaderName::from_bytes(trim(&line[..colon]))
            .map_err(|_| ParseError::new("invalid part header name"))?;
        let value = HeaderValue::from_bytes(trim(&line[colon + 1..]))
            .map_err(|_| ParseError::new("invalid part header value"))?;
        headers.append(name, value);
    }
    Ok(headers)
}

fn trim(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(start, |idx| idx + 1);
    &bytes[start..end]
}

/// Splits on `;` outside of quoted strings.
fn split_params(value: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (idx, c) in value.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ';' if !quoted => {
                parts.push(&value[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    parts.push(&value[start..]);
    parts
}

fn unquote(raw: &str) -> String {
    let Some(inner) = raw
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
    else {
        return raw.to_owned();
    };

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Decodes an RFC 5987 `charset'lang'percent-encoded` value. Only UTF-8 is supported.
fn decode_extended(raw: &str) -> Option<String> {
    let mut pieces = raw.splitn(3, '\'');
    let charset = pieces.next()?;
    let _language = pieces.next()?;
    let encoded = pieces.next()?;
    if !charset.eq_ignore_ascii_case("utf-8") {
        return None;
    }

    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    while idx < bytes.len() {
        if bytes[idx] == b'%' {
            let hex = encoded.get(idx + 1..idx + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            idx += 3;
        } else {
            out.push(bytes[idx]);
            idx += 1;
        }
    }
    String::from_utf8(out).ok()
}
