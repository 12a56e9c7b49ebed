//! Runs the real client and pipeline against a throw-away local server that
//! answers like the generation API.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::routing::{get, post};
use axum::{Json, Router};
use base64::Engine;
use base64::engine::general_purpose;
use image::{ImageFormat, Rgba, RgbaImage};
use serde_json::{Value, json};
use stickerpack::config::{GenerationParams, PipelineConfig, RetryPolicy};
use stickerpack::fonts::FontBook;
use stickerpack::gemini::GeminiClient;
use stickerpack::model::{AssetRole, ReferenceImage, Theme};
use stickerpack::orchestrator::Orchestrator;
use stickerpack::output::write_batch;
use stickerpack::planner::Planner;
use stickerpack::synth::Synthesizer;
use tokio::net::TcpListener;

const API_KEY: &str = "test-key";
const TEXT_MODEL: &str = "text-test";
const IMAGE_MODEL: &str = "image-test";
const THEME: &str = "上班族的日常";

#[derive(Default)]
struct FakeApi {
    base: OnceLock<String>,
    fail_images: bool,
    text_calls: AtomicUsize,
    image_calls: AtomicUsize,
    references_seen: AtomicUsize,
    bad_keys: AtomicUsize,
    download_carried_key: AtomicBool,
}

fn disc_png() -> Vec<u8> {
    let img = RgbaImage::from_fn(200, 200, |x, y| {
        let (dx, dy) = (x as f32 - 100.0, y as f32 - 100.0);
        if dx * dx + dy * dy < 60.0 * 60.0 {
            Rgba([30, 90, 220, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    });
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode png");
    out.into_inner()
}

fn text_reply(text: &str) -> Value {
    json!({ "candidates": [{ "content": { "parts": [{ "text": text }] } }] })
}

fn sticker_list() -> String {
    // one duplicate caption, so the planner has to top the list up
    r#"```json
[
  {"description": "揉眼睛打卡上班", "text": "早安"},
  {"description": "埋在文件堆裡", "text": "加班中"},
  {"description": "舉起咖啡杯", "text": "早安"},
  {"description": "衝出辦公室", "text": "下班了"}
]
```"#
        .to_string()
}

async fn generate(
    State(api): State<Arc<FakeApi>>,
    Path(call): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    if query.get("key").map(String::as_str) != Some(API_KEY) {
        api.bad_keys.fetch_add(1, Ordering::SeqCst);
        return (
            StatusCode::FORBIDDEN,
            Json(json!({ "error": { "code": 403, "message": "API key not valid" } })),
        );
    }
    let model = call.strip_suffix(":generateContent").unwrap_or_default();
    let parts = &body["contents"][0]["parts"];
    let prompt = parts[0]["text"].as_str().unwrap_or_default();

    if model == TEXT_MODEL {
        let n = api.text_calls.fetch_add(1, Ordering::SeqCst);
        let reply = if prompt.contains("art director") {
            r##"{"style": "thick outlines, pastel", "text_color": "#FFFFFF", "outline_color": "#222222", "bold": true, "placement": "top"}"##.to_string()
        } else if n <= 1 {
            sticker_list()
        } else {
            r#"[{"description": "在會議中打瞌睡", "text": "好睏"}, {"description": "比讚", "text": "收到"}]"#.to_string()
        };
        return (StatusCode::OK, Json(text_reply(&reply)));
    }
    if model != IMAGE_MODEL {
        return (StatusCode::NOT_FOUND, Json(json!({ "error": "unknown model" })));
    }

    let n = api.image_calls.fetch_add(1, Ordering::SeqCst);
    if parts[1]["inlineData"]["data"].as_str().is_some() {
        api.references_seen.fetch_add(1, Ordering::SeqCst);
    }
    if api.fail_images {
        return (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({ "error": { "code": 503, "message": "overloaded" } })),
        );
    }

    let png = general_purpose::STANDARD.encode(disc_png());
    let reply = match n % 3 {
        0 => json!({
            "candidates": [{ "content": { "parts": [
                { "text": "Here is your sticker" },
                { "inlineData": { "mimeType": "image/png", "data": png } }
            ] } }]
        }),
        1 => json!({ "images": [{ "bytesBase64Encoded": png, "mimeType": "image/png" }] }),
        _ => json!({
            "url": format!("{}/files/disc.png", api.base.get().map(String::as_str).unwrap_or_default())
        }),
    };
    (StatusCode::OK, Json(reply))
}

async fn hosted_file(
    State(api): State<Arc<FakeApi>>,
    Query(query): Query<HashMap<String, String>>,
) -> ([(header::HeaderName, &'static str); 1], Vec<u8>) {
    if query.contains_key("key") {
        api.download_carried_key.store(true, Ordering::SeqCst);
    }
    ([(header::CONTENT_TYPE, "image/png")], disc_png())
}

async fn start(api: FakeApi) -> (Arc<FakeApi>, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("local addr"));
    api.base.set(base.clone()).expect("base set once");
    let api = Arc::new(api);
    let app = Router::new()
        .route("/v1beta/models/{call}", post(generate))
        .route("/files/disc.png", get(hosted_file))
        .with_state(api.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("fake api server");
    });
    (api, format!("{base}/v1beta"))
}

fn config(api_base: String, count: usize) -> PipelineConfig {
    PipelineConfig {
        api_base,
        text_model: TEXT_MODEL.to_string(),
        image_model: IMAGE_MODEL.to_string(),
        sticker_count: count,
        retry: RetryPolicy {
            max_attempts: 3,
            attempt_timeout: Duration::from_secs(5),
            total_budget: Duration::from_secs(10),
            backoff: Duration::from_millis(10),
        },
        params: GenerationParams::default(),
        font_path: None,
        offline: false,
    }
}

fn orchestrator(config: &PipelineConfig, key: &str) -> Orchestrator<GeminiClient, GeminiClient> {
    let client = GeminiClient::new(config, key);
    Orchestrator::new(
        Planner::new(client.clone(), config.retry, config.params),
        Synthesizer::new(client, config.retry),
        FontBook::none(),
    )
}

#[tokio::test]
async fn full_run_decodes_every_response_shape() {
    let (api, base) = start(FakeApi::default()).await;
    let config = config(base, 4);
    let theme = Theme {
        reference_image: Some(ReferenceImage {
            mime_type: "image/png".to_string(),
            data: disc_png(),
        }),
        ..Theme::new(THEME).with_character("戴眼鏡的柴犬")
    };

    let batch = orchestrator(&config, API_KEY)
        .run(&theme, 4)
        .await
        .expect("planning succeeds");

    assert_eq!(batch.fallback_count(), 0, "every shape should decode");
    let roles: Vec<AssetRole> = batch.assets.iter().map(|r| r.asset().role).collect();
    assert_eq!(
        roles,
        vec![
            AssetRole::MainImage,
            AssetRole::TabImage,
            AssetRole::GridSticker(1),
            AssetRole::GridSticker(2),
            AssetRole::GridSticker(3),
            AssetRole::GridSticker(4),
        ]
    );
    for result in &batch.assets {
        let asset = result.asset();
        assert_eq!((asset.width(), asset.height()), asset.role.dimensions());
    }

    let texts: Vec<&str> = batch.specs.iter().map(|spec| spec.text.as_str()).collect();
    assert_eq!(texts, vec!["早安", "加班中", "下班了", "好睏"]);
    assert_eq!(batch.style.summary, "thick outlines, pastel");

    assert_eq!(api.image_calls.load(Ordering::SeqCst), 6);
    assert_eq!(api.references_seen.load(Ordering::SeqCst), 6);
    assert_eq!(api.text_calls.load(Ordering::SeqCst), 3);
    assert_eq!(api.bad_keys.load(Ordering::SeqCst), 0);
    assert!(!api.download_carried_key.load(Ordering::SeqCst));

    let dir = tempfile::tempdir().expect("tempdir");
    let paths = write_batch(dir.path(), &batch).expect("write batch");
    assert_eq!(paths.len(), 7);
    assert!(dir.path().join("04.png").exists());
    assert!(dir.path().join("grid.png").exists());
}

#[tokio::test]
async fn image_outage_still_yields_a_full_set() {
    let (api, base) = start(FakeApi {
        fail_images: true,
        ..FakeApi::default()
    })
    .await;
    let config = config(base, 2);

    let batch = orchestrator(&config, API_KEY)
        .run(&Theme::new(THEME), 2)
        .await
        .expect("planning succeeds");

    assert_eq!(batch.assets.len(), 4);
    assert_eq!(batch.fallback_count(), 4);
    for result in &batch.assets {
        let asset = result.asset();
        assert_eq!((asset.width(), asset.height()), asset.role.dimensions());
    }
    assert_eq!(api.image_calls.load(Ordering::SeqCst), 12);
}

#[tokio::test]
async fn rejected_key_fails_planning() {
    let (api, base) = start(FakeApi::default()).await;
    let config = config(base, 2);

    let result = orchestrator(&config, "wrong-key").run(&Theme::new(THEME), 2).await;

    let err = result.expect_err("planning should fail");
    assert!(err.to_string().contains("403"), "{err}");
    assert!(api.bad_keys.load(Ordering::SeqCst) > 0);
    assert_eq!(api.image_calls.load(Ordering::SeqCst), 0);
}
