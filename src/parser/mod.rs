/// Multipart boundary parsing helpers.
pub mod boundary;
/// Multipart part header parsing helpers.
pub mod headers;
/// Streaming multipart parser state machine.
pub mod stream;

pub use boundary::{extract_multipart_boundary, validate_boundary};
pub use headers::{parse_content_disposition, parse_part_headers, PartHeaders};
pub use stream::{MultipartStream, RawPart, StreamLimits};
