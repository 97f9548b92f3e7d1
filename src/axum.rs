//! Axum integration: routes, CORS and JSON error responses.

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Query, Request, State},
    http::{header, HeaderMap, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::{
    DeleteOutcome, ErrorKind, Gallery, GalleryError, ImageView, IndexError, ListQuery, ParseError,
    Rejection,
};

/// Axum body stream mapped into `imagegear` chunk errors.
pub type AxumBodyStream<S> =
    futures::stream::Map<S, fn(Result<Bytes, axum::Error>) -> Result<Bytes, GalleryError>>;

/// Extracts the raw `Content-Type` header from Axum request headers.
pub fn content_type_from_headers(headers: &HeaderMap) -> Result<&str, GalleryError> {
    let value = headers
        .get(header::CONTENT_TYPE)
        .ok_or_else(|| ParseError::new("missing Content-Type header"))?;
    value
        .to_str()
        .map_err(|_| ParseError::new("Content-Type header must be ASCII").into())
}

/// Reads a declared `Content-Length`, ignoring malformed values.
pub fn content_length_from_headers(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// Maps an Axum body stream into the stream shape expected by `imagegear`.
pub fn map_body_stream<S>(stream: S) -> AxumBodyStream<S>
where
    S: Stream<Item = Result<Bytes, axum::Error>>,
{
    stream.map(axum_item_to_gallery as fn(_) -> _)
}

fn axum_item_to_gallery(item: Result<Bytes, axum::Error>) -> Result<Bytes, GalleryError> {
    item.map_err(|err| ParseError::new(format!("request body stream error: {err}")).into())
}

/// JSON error envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Human readable message.
    pub error: String,
    /// Canonical reason phrase of the status code.
    pub code: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = ErrorBody {
        error: message.into(),
        code: status.canonical_reason().unwrap_or_default().to_owned(),
    };
    (status, Json(body)).into_response()
}

/// Status code used for a gallery error.
pub fn status_for(err: &GalleryError) -> StatusCode {
    match err {
        GalleryError::Index(IndexError::Timeout { .. }) => StatusCode::SERVICE_UNAVAILABLE,
        _ => match err.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Capacity => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Storage | ErrorKind::Index => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

impl IntoResponse for GalleryError {
    fn into_response(self) -> Response {
        let status = status_for(&self);
        let message = if status.is_server_error() {
            error!(error = %self, "request failed");
            match self.kind() {
                ErrorKind::Index => "Database error".to_owned(),
                _ => "Internal server error".to_owned(),
            }
        } else {
            warn!(error = %self, "request rejected");
            self.to_string()
        };
        error_response(status, message)
    }
}

/// Response body of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Status message.
    pub message: String,
    /// Stored images.
    pub accepted: Vec<ImageView>,
    /// Number of files left out.
    pub rejected_count: usize,
    /// Per-file rejection detail.
    pub rejections: Vec<Rejection>,
}

/// Response body of a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ListResponse {
    /// One page of images, newest first.
    pub images: Vec<ImageView>,
}

/// Response body of a delete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteResponse {
    /// Status message.
    pub message: String,
    /// Delete outcome.
    #[serde(flatten)]
    pub outcome: DeleteOutcome,
}

#[derive(Debug, Deserialize)]
struct DeleteQuery {
    filename: Option<String>,
}

#[derive(Debug, Clone)]
struct Cors {
    origin: HeaderValue,
}

/// Builds the HTTP router.
///
/// With `allowed_origin` set, every response carries CORS headers for that
/// origin and `OPTIONS` preflights are answered with `204`.
pub fn router(gallery: Gallery, allowed_origin: Option<HeaderValue>) -> Router {
    let routes = Router::new()
        .route("/images", get(list_images).delete(delete_image))
        .route("/upload", post(upload))
        .route("/uploads/:name", get(serve_image))
        .route("/health", get(health))
        .layer(DefaultBodyLimit::disable())
        .with_state(gallery);

    match allowed_origin {
        Some(origin) => routes.layer(middleware::from_fn_with_state(Cors { origin }, cors)),
        None => routes,
    }
}

async fn cors(State(cors): State<Cors>, request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, cors.origin);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, DELETE, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Content-Type"),
    );
    response
}

async fn health() -> &'static str {
    "ok"
}

async fn upload(
    State(gallery): State<Gallery>,
    request: Request,
) -> Result<Json<UploadResponse>, GalleryError> {
    let (parts, body) = request.into_parts();
    debug!(uri = %parts.uri, "received upload");
    if let Some(len) = content_length_from_headers(&parts.headers) {
        gallery.check_content_length(len)?;
    }
    let content_type = content_type_from_headers(&parts.headers)?;
    let body = map_body_stream(Box::pin(Body::into_data_stream(body)));
    let report = gallery.upload(content_type, body).await?;

    Ok(Json(UploadResponse {
        message: "Files uploaded successfully".to_owned(),
        accepted: report.accepted.iter().map(|record| record.view()).collect(),
        rejected_count: report.rejected_count,
        rejections: report.rejections,
    }))
}

async fn list_images(
    State(gallery): State<Gallery>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, GalleryError> {
    let images = gallery.list(&query).await?;
    Ok(Json(ListResponse { images }))
}

async fn delete_image(
    State(gallery): State<Gallery>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<DeleteResponse>, GalleryError> {
    let filename = query.filename.unwrap_or_default();
    let outcome = gallery.delete(&filename).await?;
    let message = if outcome.file_removed {
        "File deleted"
    } else {
        "File already absent"
    };
    Ok(Json(DeleteResponse {
        message: message.to_owned(),
        outcome,
    }))
}

async fn serve_image(
    State(gallery): State<Gallery>,
    Path(name): Path<String>,
) -> Result<Response, GalleryError> {
    let Some(image) = gallery.open(&name).await? else {
        return Ok(error_response(StatusCode::NOT_FOUND, "Image not found"));
    };
    let content_type = image
        .kind
        .map(|kind| kind.mime().to_string())
        .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, content_type),
            (header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_owned()),
        ],
        image.bytes,
    )
        .into_response())
}
