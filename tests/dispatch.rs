use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderName, HeaderValue, Method, StatusCode};
use segment_router::config::Config;
use segment_router::response::HttpResponse;
use segment_router::{
    middleware, ApiOptions, ConfigError, RequestContext, Response, ResponseBody, ResponseKind,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tempfile::TempDir;

async fn named(ctx: Arc<RequestContext>, name: &str) -> Response {
    Response::json(json!({
        "handler": name,
        "params": ctx.params(),
    }))
    .with_status(StatusCode::OK)
}

fn request(method: Method, uri: &str) -> Request {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

async fn body_bytes(response: HttpResponse) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap()
        .to_vec()
}

async fn body_json(response: HttpResponse) -> Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

async fn body_text(response: HttpResponse) -> String {
    String::from_utf8(body_bytes(response).await).unwrap()
}

fn example_router(config: &Config) -> Router {
    Router::builder(config)
        .routes(|api| {
            api.get(r#"test/${value="\d\d\d"}/abc"#, |ctx: Arc<RequestContext>| named(ctx, "first"))?;
            api.get(
                r#"test/${value1="\d\d"}/${value2}/${value3="[a-z][a-z]"}"#,
                |ctx: Arc<RequestContext>| named(ctx, "second"),
            )?;
            api.any("wild/*", |ctx: Arc<RequestContext>| named(ctx, "wildcard"))?;
            api.get("wild/abc", |ctx: Arc<RequestContext>| named(ctx, "literal"))?;
            api.get("static/page", |ctx: Arc<RequestContext>| named(ctx, "static"))?;
            Ok(())
        })
        .unwrap()
        .build()
        .unwrap()
}

#[tokio::test]
async fn test_capture_examples() {
    let router = example_router(&Config::default());

    let response = router.handle(request(Method::GET, "/test/100/abc")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["handler"], "first");
    assert_eq!(body["params"], json!({"value": "100"}));

    let response = router.handle(request(Method::GET, "/test/10/xy/zz")).await;
    let body = body_json(response).await;
    assert_eq!(body["handler"], "second");
    assert_eq!(
        body["params"],
        json!({"value1": "10", "value2": "xy", "value3": "zz"})
    );
}

#[tokio::test]
async fn test_literal_route_has_no_params() {
    let router = example_router(&Config::default());
    let response = router.handle(request(Method::GET, "/static/page")).await;
    let body = body_json(response).await;
    assert_eq!(body["handler"], "static");
    assert_eq!(body["params"], json!({}));
}

#[tokio::test]
async fn test_wildcard_fallback_and_literal_precedence() {
    let router = example_router(&Config::default());

    let body = body_json(router.handle(request(Method::PUT, "/wild/xyz")).await).await;
    assert_eq!(body["handler"], "wildcard");

    let body = body_json(router.handle(request(Method::GET, "/wild/abc")).await).await;
    assert_eq!(body["handler"], "literal");

    let body = body_json(router.handle(request(Method::GET, "/wild/abc/deeper")).await).await;
    assert_eq!(body["handler"], "wildcard");
}

#[tokio::test]
async fn test_not_found_and_method_not_supported() {
    let router = example_router(&Config::default());

    let response = router.handle(request(Method::GET, "/nothing/here")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/plain");
    assert_eq!(body_text(response).await, "Not Found");

    let response = router.handle(request(Method::POST, "/static/page")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    assert_eq!(body_text(response).await, "Method not supported");

    let response = router.handle(request(Method::GET, "/test/1000/abc")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[test]
fn test_duplicate_registration_fails_build() {
    let result = Router::builder(&Config::default()).routes(|api| {
        api.get("dup", |ctx: Arc<RequestContext>| named(ctx, "a"))?;
        api.get("dup", |ctx: Arc<RequestContext>| named(ctx, "b"))
    });
    assert!(matches!(result, Err(ConfigError::DuplicateHandler { .. })));
}

#[test]
fn test_invalid_capture_regex_fails_build() {
    let result = Router::builder(&Config::default())
        .routes(|api| api.get(r#"x/${id="("}"#, |ctx: Arc<RequestContext>| named(ctx, "bad")));
    assert!(matches!(result, Err(ConfigError::InvalidPattern { .. })));
}

#[tokio::test]
async fn test_guards_run_in_registration_order_and_short_circuit() {
    let trace = |name: &'static str| {
        middleware(move |ctx, _| {
            let mut trace = ctx.get_stored("trace").unwrap_or_else(|| json!([]));
            if let Some(items) = trace.as_array_mut() {
                items.push(json!(name));
            }
            ctx.set("trace", trace);
            true
        })
    };
    let deny = middleware(|ctx, responder| {
        if ctx.header("x-deny").is_some() {
            responder.respond(
                Response::json(json!({"denied": true})).with_status(StatusCode::FORBIDDEN),
            );
            return false;
        }
        true
    });

    let router = Router::builder(&Config::default())
        .routes(|api| {
            api.group("outer", ApiOptions::with_middleware([trace("outer")]), |api| {
                api.group(
                    "inner",
                    ApiOptions::with_middleware([deny, trace("inner")]),
                    |api| {
                        api.get("leaf", |ctx: Arc<RequestContext>| async move {
                            Response::json(ctx.get_stored("trace").unwrap_or_default())
                                .with_status(StatusCode::OK)
                        })
                    },
                )
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/outer/inner/leaf")).await;
    assert_eq!(body_json(response).await, json!(["outer", "inner"]));

    let denied = Request::builder()
        .uri("/outer/inner/leaf")
        .header("x-deny", "1")
        .body(Body::empty())
        .unwrap();
    let response = router.handle(denied).await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await, json!({"denied": true}));
}

#[tokio::test]
async fn test_api_key_guard() {
    let mut config = Config::default();
    config.server.api_keys = Some(segment_router::config::ApiKeyConfig {
        header: "x-api-key".to_string(),
        keys: vec!["secret".to_string()],
    });
    let guard = middleware::require_api_key(config.server.api_keys.clone().unwrap());

    let router = Router::builder(&config)
        .routes(|api| {
            api.group("private", ApiOptions::with_middleware([guard]), |api| {
                api.get("data", |ctx: Arc<RequestContext>| named(ctx, "private"))
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/private/data")).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let authorized = Request::builder()
        .uri("/private/data")
        .header("x-api-key", "secret")
        .body(Body::empty())
        .unwrap();
    let response = router.handle(authorized).await;
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_content_length_vetting() {
    let mut config = Config::default();
    config.server.max_content_length = 8;
    let router = Router::builder(&config)
        .routes(|api| {
            api.post("upload", |ctx: Arc<RequestContext>| async move {
                Response::text(format!("{} bytes", ctx.body_bytes().len()))
                    .with_status(StatusCode::OK)
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let chunked = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::TRANSFER_ENCODING, "chunked")
        .body(Body::from("abc"))
        .unwrap();
    let response = router.handle(chunked).await;
    assert_eq!(response.status(), StatusCode::LENGTH_REQUIRED);
    assert_eq!(body_text(response).await, "content length not specified");

    let too_large = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_LENGTH, "9")
        .body(Body::from("123456789"))
        .unwrap();
    let response = router.handle(too_large).await;
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(body_text(response).await, "content length too large");

    let fits = Request::builder()
        .method(Method::POST)
        .uri("/upload")
        .header(header::CONTENT_LENGTH, "4")
        .body(Body::from("1234"))
        .unwrap();
    let response = router.handle(fits).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "4 bytes");

    // vetting happens before the tree walk
    let unknown = Request::builder()
        .method(Method::POST)
        .uri("/nowhere")
        .header(header::CONTENT_LENGTH, "100")
        .body(Body::empty())
        .unwrap();
    assert_eq!(
        router.handle(unknown).await.status(),
        StatusCode::PAYLOAD_TOO_LARGE
    );
}

#[tokio::test]
async fn test_plain_text_with_structured_body_degrades() {
    let router = Router::builder(&Config::default())
        .routes(|api| {
            api.get("broken", |_ctx: Arc<RequestContext>| async {
                Response::new(ResponseKind::PlainText, ResponseBody::Structured(json!({"a": 1})))
                    .with_status(StatusCode::ACCEPTED)
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/broken")).await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert!(body_bytes(response).await.is_empty());
}

#[tokio::test]
async fn test_default_status_and_base_headers() {
    let mut config = Config::default();
    config.server.default_status_code = 200;
    config
        .server
        .base_response_headers
        .insert("X-Powered-By".to_string(), "segment-router".to_string());
    config
        .server
        .base_response_headers
        .insert("X-Frame-Options".to_string(), "DENY".to_string());

    let router = Router::builder(&config)
        .routes(|api| {
            api.get("page", |_ctx: Arc<RequestContext>| async {
                Response::html("<p>hi</p>").with_header(
                    HeaderName::from_static("x-frame-options"),
                    HeaderValue::from_static("SAMEORIGIN"),
                )
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/page")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-powered-by"], "segment-router");
    assert_eq!(response.headers()["x-frame-options"], "SAMEORIGIN");
    assert_eq!(response.headers()[header::CONTENT_TYPE], "text/html");

    // error responses carry the base headers too
    let response = router.handle(request(Method::GET, "/missing")).await;
    assert_eq!(response.headers()["x-powered-by"], "segment-router");
}

#[tokio::test]
async fn test_method_fallback_handler() {
    let router = Router::builder(&Config::default())
        .routes(|api| api.get("thing", |ctx: Arc<RequestContext>| named(ctx, "thing")))
        .unwrap()
        .method_fallback(Method::OPTIONS, |_ctx: Arc<RequestContext>| async {
            Response::none().with_status(StatusCode::NO_CONTENT)
        })
        .build()
        .unwrap();

    let response = router.handle(request(Method::OPTIONS, "/thing")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router.handle(request(Method::OPTIONS, "/unknown")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = router.handle(request(Method::DELETE, "/thing")).await;
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
}

#[tokio::test]
async fn test_panicking_handler_becomes_internal_error() {
    async fn explode(ctx: Arc<RequestContext>) -> Response {
        if ctx.path() == "/explode" {
            panic!("handler exploded");
        }
        Response::none()
    }

    let router = Router::builder(&Config::default())
        .routes(|api| api.get("explode", explode))
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/explode")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body_text(response).await, "Unexpected Error");

    // the router keeps serving
    let response = router.handle(request(Method::GET, "/explode-not")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_lookup_and_body_view() {
    let router = Router::builder(&Config::default())
        .routes(|api| {
            api.post("items/${id}", |ctx: Arc<RequestContext>| async move {
                ctx.set("source", json!("store"));
                Response::json(json!({
                    "id": ctx.lookup("id").await,
                    "q": ctx.lookup("q").await,
                    "name": ctx.lookup("name").await,
                    "source": ctx.lookup("source").await,
                }))
                .with_status(StatusCode::OK)
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let request = Request::builder()
        .method(Method::POST)
        .uri("/items/7?q=search")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("name=widget&id=ignored"))
        .unwrap();

    let body = body_json(router.handle(request).await).await;
    assert_eq!(
        body,
        json!({"id": "7", "q": "search", "name": "widget", "source": "store"})
    );
}

#[tokio::test]
async fn test_multipart_upload_store_and_cleanup() {
    let storage = TempDir::new().unwrap();
    let mut config = Config::default();
    config.storage.location = storage.path().to_path_buf();

    let router = Router::builder(&config)
        .routes(|api| {
            api.post("upload/${mode}", |ctx: Arc<RequestContext>| async move {
                let body = match ctx.body().await {
                    Ok(body) => body,
                    Err(err) => {
                        return Response::text(err.to_string())
                            .with_status(StatusCode::BAD_REQUEST)
                    }
                };
                let Some(file) = body.file("doc") else {
                    return Response::text("missing file").with_status(StatusCode::BAD_REQUEST);
                };
                if ctx.param("mode") == Some("keep") {
                    if let Err(err) = file.store() {
                        return Response::text(err.to_string())
                            .with_status(StatusCode::INTERNAL_SERVER_ERROR);
                    }
                }
                Response::json(json!({
                    "title": body.field("title"),
                    "file": file.file_name(),
                    "stored": file.is_stored(),
                }))
                .with_status(StatusCode::OK)
            })
        })
        .unwrap()
        .build()
        .unwrap();

    let multipart = |uri: &str| {
        let body = "--BOUNDARY\r\n\
            Content-Disposition: form-data; name=\"title\"\r\n\r\n\
            report\r\n\
            --BOUNDARY\r\n\
            Content-Disposition: form-data; name=\"doc\"; filename=\"notes.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            file contents\r\n\
            --BOUNDARY--\r\n";
        Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::CONTENT_TYPE, "multipart/form-data; boundary=BOUNDARY")
            .body(Body::from(body))
            .unwrap()
    };

    let body = body_json(router.handle(multipart("/upload/discard")).await).await;
    assert_eq!(
        body,
        json!({"title": "report", "file": "notes.txt", "stored": false})
    );
    // the staged copy is gone once the request is finished
    let staged: Vec<_> = std::fs::read_dir(storage.path().join("temp"))
        .unwrap()
        .collect();
    assert!(staged.is_empty());
    assert!(!storage.path().join("notes.txt").exists());

    let body = body_json(router.handle(multipart("/upload/keep")).await).await;
    assert_eq!(body["stored"], true);
    assert_eq!(
        std::fs::read_to_string(storage.path().join("notes.txt")).unwrap(),
        "file contents"
    );
}

#[tokio::test]
async fn test_builtin_handlers_answer_ok_under_default_status() {
    middleware::init_metrics().unwrap();
    let router = Router::builder(&Config::default())
        .routes(|api| {
            api.get("health", segment_router::health::health_check)?;
            api.get("metrics", middleware::metrics_handler)
        })
        .unwrap()
        .build()
        .unwrap();

    let response = router.handle(request(Method::GET, "/metrics")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let response = router.handle(request(Method::GET, "/health")).await;
    assert_eq!(response.status(), StatusCode::OK);
}
