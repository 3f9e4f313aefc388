use std::io::Cursor;
use std::path::{Path, PathBuf};

use base64::Engine as _;
use captioner::{
    BatchRenderer, BatchThreading, CancelToken, CaptionCompositor, CaptionResult, CaptionShaper,
    CaptionStyle, DirOriginals, OutputStore, ReferenceMode, RenderEndpoint, RenderRequest,
    ShapedLine, ShaperSource,
};

struct FixedAdvance;

impl CaptionShaper for FixedAdvance {
    fn measure_width(&mut self, text: &str) -> f32 {
        text.chars().count() as f32 * 8.0
    }

    fn shape_line(&mut self, text: &str) -> CaptionResult<ShapedLine> {
        Ok(ShapedLine::blank(text, self.measure_width(text)))
    }
}

struct StubFonts;

impl ShaperSource for StubFonts {
    type Shaper = FixedAdvance;

    fn shaper(&self, _style: &CaptionStyle) -> CaptionResult<FixedAdvance> {
        Ok(FixedAdvance)
    }
}

fn gallery(name: &str, files: &[&str]) -> PathBuf {
    let root = PathBuf::from("target").join("render_endpoint").join(name);
    let _ = std::fs::remove_dir_all(&root);
    let originals = root.join("originals");
    std::fs::create_dir_all(&originals).unwrap();
    for file in files {
        let img = image::RgbaImage::from_pixel(20, 20, image::Rgba([0, 120, 0, 255]));
        let mut out = Vec::new();
        image::DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        std::fs::write(originals.join(file), out).unwrap();
    }
    root
}

fn renderer(root: &Path) -> BatchRenderer<StubFonts, DirOriginals> {
    BatchRenderer::new(
        DirOriginals::new(root.join("originals")),
        OutputStore::open(root.join("output"), 2).unwrap(),
        CaptionCompositor::new(CaptionStyle::default()).unwrap(),
        StubFonts,
        BatchThreading::default(),
    )
    .unwrap()
}

fn endpoint(mode: ReferenceMode) -> RenderEndpoint {
    RenderEndpoint {
        reference_mode: mode,
        public_output_prefix: "/images/output".to_string(),
    }
}

#[test]
fn post_returns_public_paths() {
    let root = gallery("public", &["one.png", "my pic.png"]);
    let renderer = renderer(&root);

    let resp = endpoint(ReferenceMode::PublicPath).handle(
        &renderer,
        &RenderRequest::post("Hello World"),
        &CancelToken::new(),
    );
    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.body,
        serde_json::json!({ "images": ["/images/output/my%20pic.png", "/images/output/one.png"] })
    );
}

#[test]
fn public_paths_resolve_through_the_store() {
    let root = gallery("resolve", &["one.png", "my pic.png"]);
    let renderer = renderer(&root);

    let resp = endpoint(ReferenceMode::PublicPath).handle(
        &renderer,
        &RenderRequest::post("served"),
        &CancelToken::new(),
    );
    assert_eq!(resp.status, 200);
    for url in resp.body["images"].as_array().unwrap() {
        let encoded = url.as_str().unwrap().strip_prefix("/images/output/").unwrap();
        let name = urlencoding::decode(encoded).unwrap();
        assert!(!root.join("output").join(name.as_ref()).exists());
        let path = renderer.store().resolve(&name).unwrap().unwrap();
        assert!(path.is_file(), "{} should be served from {}", name, path.display());
    }
}

#[test]
fn data_url_mode_embeds_jpeg_bytes() {
    let root = gallery("data_url", &["one.png"]);
    let renderer = renderer(&root);

    let resp = endpoint(ReferenceMode::DataUrl).handle(
        &renderer,
        &RenderRequest::post("inline"),
        &CancelToken::new(),
    );
    assert_eq!(resp.status, 200);
    let url = resp.body["images"][0].as_str().unwrap();
    let payload = url.strip_prefix("data:image/jpeg;base64,").unwrap();
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .unwrap();
    assert_eq!(
        Some(bytes),
        renderer.store().read_current("one.png").unwrap()
    );
}

#[test]
fn method_and_phrase_are_checked_first() {
    let root = gallery("checks", &["one.png"]);
    let renderer = renderer(&root);
    let endpoint = endpoint(ReferenceMode::PublicPath);

    let get = RenderRequest {
        method: "GET".to_string(),
        body_phrase: Some("hi".to_string()),
        query_phrase: None,
    };
    assert_eq!(
        endpoint.handle(&renderer, &get, &CancelToken::new()).status,
        405
    );

    let blank = RenderRequest {
        method: "POST".to_string(),
        body_phrase: Some(" ".to_string()),
        query_phrase: None,
    };
    assert_eq!(
        endpoint.handle(&renderer, &blank, &CancelToken::new()).status,
        400
    );
    assert_eq!(renderer.store().current_generation().unwrap(), None);

    let from_query = RenderRequest {
        method: "post".to_string(),
        body_phrase: None,
        query_phrase: Some("from the query".to_string()),
    };
    let resp = endpoint.handle(&renderer, &from_query, &CancelToken::new());
    assert_eq!(resp.status, 200);
    assert_eq!(
        resp.body,
        serde_json::json!({ "images": ["/images/output/one.png"] })
    );
}

#[test]
fn batch_fatal_errors_are_500() {
    let root = PathBuf::from("target")
        .join("render_endpoint")
        .join("fatal");
    let _ = std::fs::remove_dir_all(&root);
    let renderer = renderer(&root);

    let resp = endpoint(ReferenceMode::PublicPath).handle(
        &renderer,
        &RenderRequest::post("anything"),
        &CancelToken::new(),
    );
    assert_eq!(resp.status, 500);
    assert!(resp.body["error"].is_string());
}
