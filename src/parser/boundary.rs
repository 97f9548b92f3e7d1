use crate::ParseError;

const MULTIPART_FORM_DATA: &str = "multipart/form-data";
const MAX_BOUNDARY_LEN: usize = 70;

/// Extracts and validates the `boundary` parameter from a `Content-Type` value.
pub fn extract_multipart_boundary(content_type: &str) -> Result<String, ParseError> {
    let mime = content_type
        .parse::<mime::Mime>()
        .map_err(|_| ParseError::new("invalid Content-Type header"))?;

    if mime.essence_str() != MULTIPART_FORM_DATA {
        return Err(ParseError::new("Content-Type must be multipart/form-data"));
    }

    let boundary = mime
        .get_param(mime::BOUNDARY)
        .map(|value| value.as_str())
        .ok_or_else(|| ParseError::new("missing multipart boundary parameter"))?;

    validate_boundary(boundary)?;
    Ok(boundary.to_owned())
}

/// Checks a boundary against the RFC 2046 grammar.
pub fn validate_boundary(boundary: &str) -> Result<(), ParseError> {
    if boundary.is_empty() {
        return Err(ParseError::new("multipart boundary cannot be empty"));
    }

    if boundary.len() > MAX_BOUNDARY_LEN {
        return Err(ParseError::new(
            "multipart boundary cannot exceed 70 characters",
        ));
    }

    if boundary.ends_with(' ') {
        return Err(ParseError::new(
            "multipart boundary cannot end with whitespace",
        ));
    }

    if let Some(bad) = boundary.chars().find(|c| !is_bchar(*c)) {
        return Err(ParseError::new(format!(
            "multipart boundary contains invalid character {bad:?}"
        )));
    }

    Ok(())
}

fn is_bchar(c: char) -> bool {
    c.is_ascii_alphanumeric()
        || matches!(
            c,
            '\'' | '(' | ')' | '+' | '_' | ',' | '-' | '.' | '/' | ':' | '=' | '?' | ' '
        )
}
