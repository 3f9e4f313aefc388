//! Request/response payloads for the originals listing and render endpoints.
//!
//! Framework-agnostic: a transport adapter turns its request into a [`RenderRequest`] and writes
//! the returned [`ApiResponse`] back out.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

use crate::assets::originals::OriginalsRepository;
use crate::batch::renderer::{BatchRenderer, BatchReport, CancelToken};
use crate::foundation::config::ReferenceMode;
use crate::foundation::error::{CaptionError, CaptionResult};
use crate::text::shaper::ShaperSource;

/// `{ "images": [...] }`, the body of both endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageList {
    pub images: Vec<String>,
}

/// `prefix/<urlencoded name>`, without doubling the separator.
pub fn public_url(prefix: &str, name: &str) -> String {
    format!(
        "{}/{}",
        prefix.trim_end_matches('/'),
        urlencoding::encode(name)
    )
}

pub fn jpeg_data_url(bytes: &[u8]) -> String {
    format!(
        "data:image/jpeg;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

/// One public URL per captionable original.
pub fn originals_listing<R: OriginalsRepository + ?Sized>(
    originals: &R,
    prefix: &str,
) -> CaptionResult<ImageList> {
    let images = originals
        .list()?
        .iter()
        .map(|name| public_url(prefix, name))
        .collect();
    Ok(ImageList { images })
}

/// References to every image a batch produced, in enumeration order.
///
/// Data URLs embed the bytes the batch itself encoded, so pruning by a later batch never changes
/// them. Public paths name the image only; a publisher serves them through
/// [`OutputStore::resolve`](crate::batch::store::OutputStore::resolve).
pub fn references(report: &BatchReport, mode: ReferenceMode, prefix: &str) -> ImageList {
    let images = report
        .produced()
        .map(|produced| match mode {
            ReferenceMode::PublicPath => public_url(prefix, &produced.name),
            ReferenceMode::DataUrl => jpeg_data_url(&produced.jpeg),
        })
        .collect();
    ImageList { images }
}

/// Transport-neutral view of an incoming render call.
#[derive(Debug, Clone, Default)]
pub struct RenderRequest {
    pub method: String,
    pub body_phrase: Option<String>,
    pub query_phrase: Option<String>,
}

impl RenderRequest {
    pub fn post(phrase: impl Into<String>) -> Self {
        Self {
            method: "POST".to_string(),
            body_phrase: Some(phrase.into()),
            query_phrase: None,
        }
    }

    /// Body first, then query; the first non-blank value wins.
    pub fn phrase(&self) -> Option<&str> {
        [self.body_phrase.as_deref(), self.query_phrase.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .find(|p| !p.is_empty())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

impl ApiResponse {
    fn ok(list: &ImageList) -> Self {
        Self {
            status: 200,
            body: serde_json::to_value(list).unwrap_or_else(|_| serde_json::json!({ "images": [] })),
        }
    }

    fn error(status: u16, message: impl Into<String>) -> Self {
        Self {
            status,
            body: serde_json::json!({ "error": message.into() }),
        }
    }

    fn from_error(e: &CaptionError) -> Self {
        let status = e.http_status();
        // Server-side detail stays in the logs.
        let message = if status == 500 {
            "failed to generate images".to_string()
        } else {
            e.to_string()
        };
        Self::error(status, message)
    }
}

/// Settings the render endpoint needs besides the renderer itself.
#[derive(Debug, Clone)]
pub struct RenderEndpoint {
    pub reference_mode: ReferenceMode,
    pub public_output_prefix: String,
}

impl RenderEndpoint {
    #[tracing::instrument(skip_all, fields(method = %request.method))]
    pub fn handle<S: ShaperSource, R: OriginalsRepository>(
        &self,
        renderer: &BatchRenderer<S, R>,
        request: &RenderRequest,
        cancel: &CancelToken,
    ) -> ApiResponse {
        if !request.method.eq_ignore_ascii_case("POST") {
            return ApiResponse::error(405, "method not allowed");
        }
        let Some(phrase) = request.phrase() else {
            return ApiResponse::error(400, "phrase is required");
        };

        let listed = renderer.render(phrase, cancel).map(|report| {
            references(&report, self.reference_mode, &self.public_output_prefix)
        });
        match listed {
            Ok(list) => ApiResponse::ok(&list),
            Err(e) => {
                tracing::error!(error = %e, "render request failed");
                ApiResponse::from_error(&e)
            }
        }
    }
}
