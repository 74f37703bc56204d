use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::http::request::Parts;
use axum::http::{header, HeaderValue, Method, Request};
use axum::routing::{get, post, put};
use axum::Router;
use tower_governor::governor::GovernorConfigBuilder;
use tower_governor::key_extractor::KeyExtractor;
use tower_governor::GovernorLayer;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::{DefaultMakeSpan, DefaultOnFailure, DefaultOnResponse, TraceLayer};
use tracing::Level;

use crate::constants::{
    GLOBAL_RATE_LIMIT_BURST, GLOBAL_RATE_LIMIT_PERIOD_MS, MAX_BODY_BYTES,
};
use crate::handlers;
use crate::state::AppState;
use crate::util::client_ip;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ProxyAwareIpKeyExtractor {
    trust_proxy_headers: bool,
}

impl KeyExtractor for ProxyAwareIpKeyExtractor {
    type Key = std::net::IpAddr;

    fn extract<T>(&self, req: &Request<T>) -> Result<Self::Key, tower_governor::GovernorError> {
        let peer = req
            .extensions()
            .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
            .map(|ci| ci.0);
        client_ip(req.headers(), peer, self.trust_proxy_headers)
            .ok_or(tower_governor::GovernorError::UnableToExtractKey)
    }
}

/// Browser origins allowed to call the API: the configured allowlist plus
/// localhost and private-network development hosts.
pub(crate) fn origin_allowed(origin: &str, allowlist: &[String]) -> bool {
    if allowlist.iter().any(|o| o == origin) {
        return true;
    }
    let Some(rest) = origin.strip_prefix("http://") else {
        return false;
    };
    let host = rest.split(':').next().unwrap_or("");
    if host == "localhost" || host == "127.0.0.1" {
        return true;
    }
    match host.parse::<std::net::Ipv4Addr>() {
        Ok(ip) => ip.is_private(),
        Err(_) => false,
    }
}

fn cors_layer(allowlist: Vec<String>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            move |origin: &HeaderValue, _parts: &Parts| {
                origin
                    .to_str()
                    .map(|o| origin_allowed(o, &allowlist))
                    .unwrap_or(false)
            },
        ))
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

pub(crate) fn build_router(state: AppState) -> Router {
    let key_extractor = ProxyAwareIpKeyExtractor {
        trust_proxy_headers: state.settings.trust_proxy_headers,
    };

    let global_governor = GovernorLayer {
        config: Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(key_extractor)
                .per_millisecond(GLOBAL_RATE_LIMIT_PERIOD_MS)
                .burst_size(GLOBAL_RATE_LIMIT_BURST)
                .finish()
                .expect("governor config must build"),
        ),
    };
    let auth_governor = GovernorLayer {
        config: Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(key_extractor)
                .per_second(2)
                .burst_size(5)
                .finish()
                .expect("governor config must build"),
        ),
    };
    let convert_governor = GovernorLayer {
        config: Arc::new(
            GovernorConfigBuilder::default()
                .key_extractor(key_extractor)
                .per_second(3)
                .burst_size(10)
                .finish()
                .expect("governor config must build"),
        ),
    };

    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login))
        .route_layer(auth_governor)
        .route("/me", get(handlers::auth::me));

    let convert_routes = Router::new()
        .route("/", post(handlers::convert::convert))
        .route("/youtube", post(handlers::convert::youtube))
        .route_layer(convert_governor);

    let contact_routes = Router::new()
        .route("/submit", post(handlers::contact::submit))
        .route("/check-status", get(handlers::contact::check_status))
        .route("/admin", get(handlers::contact::admin_list))
        .route("/admin/stats", get(handlers::contact::admin_stats))
        .route(
            "/admin/:id",
            get(handlers::contact::admin_get).delete(handlers::contact::admin_delete),
        )
        .route(
            "/admin/:id/status",
            put(handlers::contact::admin_update_status),
        )
        .route("/admin/:id/reply", post(handlers::contact::admin_reply));

    let api_routes = Router::new()
        .nest("/auth", auth_routes)
        .nest("/convert", convert_routes)
        .route("/quota", get(handlers::quota::quota))
        .nest("/contact", contact_routes)
        .fallback(handlers::health::api_not_found);

    let mut router = Router::new()
        .route("/", get(handlers::health::healthz))
        .route("/healthz", get(handlers::health::healthz))
        .nest("/api", api_routes)
        .nest_service("/outputs", ServeDir::new(state.outputs.dir()));

    // Everything else is the single-page client, when one is deployed.
    if let Some(dir) = &state.settings.client_build_dir {
        router = router.fallback_service(
            ServeDir::new(dir).not_found_service(ServeFile::new(dir.join("index.html"))),
        );
    }

    let cors = cors_layer(state.settings.allowed_origins.clone());

    router
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
        .layer(global_governor)
        .layer(cors)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
                .on_response(DefaultOnResponse::new().level(Level::INFO))
                .on_failure(DefaultOnFailure::new().level(Level::ERROR)),
        )
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    use axum::body::Body;
    use axum::extract::ConnectInfo;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use serde_json::{json, Value};
    use tempfile::TempDir;
    use time::OffsetDateTime;
    use tower::ServiceExt;

    use super::*;
    use crate::archive::OutputStore;
    use crate::converter::Converters;
    use crate::db::{self, users, visitors};
    use crate::state::Settings;
    use crate::token::{TokenSigner, TokenSubject};

    const GUEST_LIMIT: i64 = 3;
    const BOUNDARY: &str = "XBOUNDARYX";

    fn test_state(dir: &TempDir, pool: sqlx::SqlitePool, batch_script: PathBuf) -> AppState {
        AppState {
            db: pool,
            signer: Arc::new(TokenSigner::new(
                b"test-secret".to_vec(),
                time::Duration::hours(1),
            )),
            converters: Arc::new(Converters {
                python: "sh".to_string(),
                batch_script,
                youtube_script: dir.path().join("youtube.sh"),
                process_timeout: Duration::from_secs(10),
            }),
            outputs: OutputStore::new(dir.path().join("outputs")),
            settings: Arc::new(Settings {
                temp_dir: dir.path().join("temp"),
                guest_daily_limit: GUEST_LIMIT,
                trust_proxy_headers: false,
                allowed_origins: Vec::new(),
                client_build_dir: None,
            }),
        }
    }

    async fn setup() -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let pool = db::connect_in_memory().await;
        let script = dir.path().join("convert.sh");
        let state = test_state(&dir, pool, script);
        (dir, state)
    }

    #[cfg(unix)]
    async fn scripted(batch_body: &str) -> (TempDir, AppState) {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("convert.sh");
        std::fs::write(&script, batch_body).unwrap();
        let state = test_state(&dir, db::connect_in_memory().await, script);
        (dir, state)
    }

    #[cfg(unix)]
    const RENAME_TO_PNG: &str =
        "for f in \"$1\"/*; do b=$(basename \"$f\"); cp \"$f\" \"$2/${b%.*}.png\"; done\n";

    fn published_files(dir: &TempDir) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir.path().join("outputs"))
            .map(|entries| {
                entries
                    .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        names
    }

    async fn guest_count(state: &AppState) -> i64 {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        visitors::window(&state.db, "127.0.0.1", now)
            .await
            .unwrap()
            .count
    }

    fn peer() -> ConnectInfo<SocketAddr> {
        ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000)))
    }

    fn request(method: &str, uri: &str) -> axum::http::request::Builder {
        Request::builder().method(method).uri(uri)
    }

    async fn send(
        state: &AppState,
        builder: axum::http::request::Builder,
        body: Body,
    ) -> (StatusCode, Value) {
        let mut req = builder.body(body).unwrap();
        req.extensions_mut().insert(peer());
        let res = build_router(state.clone()).oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn send_json(
        state: &AppState,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Value,
    ) -> (StatusCode, Value) {
        let mut builder = request(method, uri).header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        send(state, builder, Body::from(body.to_string())).await
    }

    async fn get(state: &AppState, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        let mut builder = request("GET", uri);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        send(state, builder, Body::empty()).await
    }

    fn token_for(state: &AppState, is_admin: bool) -> String {
        state.signer.issue(
            &TokenSubject {
                id: "user-1",
                email: "someone@example.com",
                name: "Someone",
                is_admin,
            },
            OffsetDateTime::now_utc(),
        )
    }

    fn multipart_body(files: &[(&str, &[u8])]) -> Body {
        let mut body = Vec::new();
        for (name, data) in files {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"files\"; filename=\"{name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(data);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Body::from(body)
    }

    fn multipart_request() -> axum::http::request::Builder {
        request("POST", "/api/convert").header(
            "content-type",
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
    }

    #[test]
    fn origins() {
        let allow = vec!["https://convert.example".to_string()];
        assert!(origin_allowed("https://convert.example", &allow));
        assert!(origin_allowed("http://localhost:3000", &allow));
        assert!(origin_allowed("http://192.168.1.20:3000", &allow));
        assert!(origin_allowed("http://10.0.0.5", &allow));
        assert!(!origin_allowed("http://172.50.0.1:3000", &allow));
        assert!(!origin_allowed("https://evil.example", &allow));
        assert!(!origin_allowed("http://localhost.evil.example", &allow));
    }

    #[tokio::test]
    async fn health_and_unknown_api_paths() {
        let (_dir, state) = setup().await;

        let mut req = request("GET", "/healthz").body(Body::empty()).unwrap();
        req.extensions_mut().insert(peer());
        let res = build_router(state.clone()).oneshot(req).await.unwrap();
        assert_eq!(res.status(), StatusCode::OK);
        let bytes = res.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&bytes[..], b"OK");

        let (status, body) = get(&state, "/api/nope", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn register_login_and_me() {
        let (_dir, state) = setup().await;
        let creds = json!({ "name": "Ada", "email": "Ada@Example.com", "password": "secret1" });

        let (status, body) = send_json(&state, "POST", "/api/auth/register", None, creds.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["user"]["email"], "ada@example.com");
        assert_eq!(body["user"]["isAdmin"], false);

        let (status, body) = send_json(&state, "POST", "/api/auth/register", None, creds).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["success"], false);

        let (status, _) = send_json(
            &state,
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "wrong-one" }),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send_json(
            &state,
            "POST",
            "/api/auth/login",
            None,
            json!({ "email": "ada@example.com", "password": "secret1" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let token = body["token"].as_str().unwrap().to_string();

        let (status, body) = get(&state, "/api/auth/me", Some(&token)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user"]["name"], "Ada");

        let (status, _) = get(&state, "/api/auth/me", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn register_rejects_short_password() {
        let (_dir, state) = setup().await;
        let (status, body) = send_json(
            &state,
            "POST",
            "/api/auth/register",
            None,
            json!({ "name": "Bo", "email": "bo@example.com", "password": "123" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Password must be at least 6 characters");
    }

    #[tokio::test]
    async fn quota_for_guests_and_users() {
        let (_dir, state) = setup().await;

        let (status, body) = get(&state, "/api/quota", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "type": "guest", "remaining": 3, "limit": 3 }));

        let token = token_for(&state, false);
        let (_, body) = get(&state, "/api/quota", Some(&token)).await;
        assert_eq!(body, json!({ "type": "user", "remaining": -1, "unlimited": true }));

        let (_, body) = get(&state, "/api/quota", Some("garbage")).await;
        assert_eq!(body["type"], "guest");
    }

    #[tokio::test]
    async fn convert_without_files_is_rejected() {
        let (_dir, state) = setup().await;
        let (status, body) = send(&state, multipart_request(), multipart_body(&[])).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No files uploaded.");
    }

    #[tokio::test]
    async fn convert_rejects_unsupported_types() {
        let (_dir, state) = setup().await;
        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("notes.txt", b"hello")]),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Unsupported file type: notes.txt");
    }

    #[tokio::test]
    async fn exhausted_guest_is_refused() {
        let (_dir, state) = setup().await;
        let now = OffsetDateTime::now_utc().unix_timestamp();
        for _ in 0..GUEST_LIMIT {
            visitors::charge(&state.db, "127.0.0.1", now).await.unwrap();
        }

        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("photo.jpg", b"jpeg")]),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body, json!({ "success": false, "message": "Quota exceeded" }));
    }

    #[tokio::test]
    async fn invalid_token_on_convert_is_unauthorized() {
        let (_dir, state) = setup().await;
        let builder = multipart_request().header("authorization", "Bearer nonsense");
        let (status, _) = send(&state, builder, multipart_body(&[("photo.jpg", b"jpeg")])).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn guest_conversion_publishes_outputs_and_charges_quota() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("convert.sh");
        std::fs::write(
            &script,
            "for f in \"$1\"/*; do b=$(basename \"$f\"); cp \"$f\" \"$2/${b%.*}.png\"; done\n",
        )
        .unwrap();
        let state = test_state(&dir, db::connect_in_memory().await, script);

        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("My Photo.jpg", b"jpeg-bytes")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["fileName"], "My Photo.png");
        assert_eq!(body["fileType"], ".png");

        let zip_url = body["downloadUrl"].as_str().unwrap();
        let direct_url = body["directDownloadUrl"].as_str().unwrap();
        let published = |url: &str| -> PathBuf {
            dir.path()
                .join("outputs")
                .join(url.strip_prefix("/outputs/").unwrap())
        };
        assert!(zip_url.ends_with(".zip"));
        assert!(published(zip_url).is_file());
        assert_eq!(std::fs::read(published(direct_url)).unwrap(), b"jpeg-bytes");

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let window = visitors::window(&state.db, "127.0.0.1", now).await.unwrap();
        assert_eq!(window.count, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_conversion_does_not_charge() {
        let dir = TempDir::new().unwrap();
        let script = dir.path().join("convert.sh");
        std::fs::write(&script, "echo boom >&2\nexit 3\n").unwrap();
        let state = test_state(&dir, db::connect_in_memory().await, script);

        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("photo.jpg", b"jpeg")]),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Conversion failed.");

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let window = visitors::window(&state.db, "127.0.0.1", now).await.unwrap();
        assert_eq!(window.count, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn converter_writing_nothing_is_an_error() {
        let (dir, state) = scripted("exit 0\n").await;
        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("photo.jpg", b"jpeg")]),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "No files converted.");
        assert_eq!(guest_count(&state).await, 0);
        assert!(published_files(&dir).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn multi_file_batch_only_offers_the_zip() {
        let (dir, state) = scripted(RENAME_TO_PNG).await;
        let (status, body) = send(
            &state,
            multipart_request(),
            multipart_body(&[("a.jpg", b"one"), ("b.jpg", b"two")]),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        let body = body.as_object().unwrap();
        assert!(body["downloadUrl"].as_str().unwrap().ends_with(".zip"));
        assert!(!body.contains_key("directDownloadUrl"));
        assert!(!body.contains_key("fileName"));
        assert!(!body.contains_key("fileType"));
        assert_eq!(published_files(&dir).len(), 1);
        assert_eq!(guest_count(&state).await, 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn signed_in_conversion_counts_against_the_user() {
        let (_dir, state) = scripted(RENAME_TO_PNG).await;
        let user = users::create(&state.db, "Eve", "eve@example.com", "x", false)
            .await
            .unwrap()
            .unwrap();
        let token = state.signer.issue(
            &TokenSubject {
                id: &user.id,
                email: &user.email,
                name: &user.name,
                is_admin: false,
            },
            OffsetDateTime::now_utc(),
        );

        let builder = multipart_request().header("authorization", format!("Bearer {token}"));
        let (status, body) = send(&state, builder, multipart_body(&[("p.jpg", b"img")])).await;
        assert_eq!(status, StatusCode::OK, "{body}");

        let user = users::find_by_id(&state.db, &user.id).await.unwrap().unwrap();
        assert_eq!(user.converted_count, 1);
        let visitor_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM visitors")
            .fetch_one(&state.db)
            .await
            .unwrap();
        assert_eq!(visitor_rows, 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn losing_the_last_guest_slot_withdraws_outputs() {
        let dir = TempDir::new().unwrap();
        let started = dir.path().join("started");
        let go = dir.path().join("go");
        let script = dir.path().join("convert.sh");
        std::fs::write(
            &script,
            format!(
                "touch '{}'\nwhile [ ! -f '{}' ]; do sleep 0.05; done\n{RENAME_TO_PNG}",
                started.display(),
                go.display()
            ),
        )
        .unwrap();
        let state = test_state(&dir, db::connect_in_memory().await, script);

        let request_state = state.clone();
        let pending = tokio::spawn(async move {
            send(
                &request_state,
                multipart_request(),
                multipart_body(&[("photo.jpg", b"jpeg")]),
            )
            .await
        });

        // The quota check has passed once the converter is running.
        while !started.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        for _ in 0..GUEST_LIMIT {
            visitors::charge(&state.db, "127.0.0.1", now).await.unwrap();
        }
        std::fs::write(&go, b"").unwrap();

        let (status, body) = pending.await.unwrap();
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["message"], "Quota exceeded");
        assert!(published_files(&dir).is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn youtube_download_publishes_and_charges_guest() {
        let (dir, state) = scripted("exit 1\n").await;
        std::fs::write(
            dir.path().join("youtube.sh"),
            "printf 'audio' > \"$2/Song Title.mp3\"\n",
        )
        .unwrap();

        let (status, body) = send_json(
            &state,
            "POST",
            "/api/convert/youtube",
            Some("not-a-valid-token"),
            json!({ "url": "https://youtu.be/dQw4w9WgXcQ", "quality": "high" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "{body}");
        assert_eq!(body["fileName"], "Song Title.mp3");
        assert_eq!(body["fileType"], ".mp3");
        assert!(body["downloadUrl"].as_str().unwrap().ends_with(".zip"));

        let direct = body["directDownloadUrl"].as_str().unwrap();
        let direct = dir
            .path()
            .join("outputs")
            .join(direct.strip_prefix("/outputs/").unwrap());
        assert_eq!(std::fs::read(direct).unwrap(), b"audio");
        assert_eq!(published_files(&dir).len(), 2);
        assert_eq!(guest_count(&state).await, 1);
    }

    #[tokio::test]
    async fn root_stays_a_health_check_with_client_bundle() {
        let dir = TempDir::new().unwrap();
        let client = dir.path().join("client");
        std::fs::create_dir(&client).unwrap();
        std::fs::write(client.join("index.html"), "<html>app</html>").unwrap();

        let mut state = test_state(&dir, db::connect_in_memory().await, dir.path().join("c.sh"));
        state.settings = Arc::new(Settings {
            temp_dir: dir.path().join("temp"),
            guest_daily_limit: GUEST_LIMIT,
            trust_proxy_headers: false,
            allowed_origins: Vec::new(),
            client_build_dir: Some(client),
        });

        for (uri, expected) in [("/", "OK"), ("/pricing", "<html>app</html>")] {
            let mut req = request("GET", uri).body(Body::empty()).unwrap();
            req.extensions_mut().insert(peer());
            let res = build_router(state.clone()).oneshot(req).await.unwrap();
            assert_eq!(res.status(), StatusCode::OK, "{uri}");
            let bytes = res.into_body().collect().await.unwrap().to_bytes();
            assert_eq!(&bytes[..], expected.as_bytes(), "{uri}");
        }

        let (status, body) = get(&state, "/api/missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({ "error": "Not found" }));
    }

    #[tokio::test]
    async fn youtube_url_is_validated() {
        let (_dir, state) = setup().await;
        let (status, body) =
            send_json(&state, "POST", "/api/convert/youtube", None, json!({})).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "No YouTube URL provided.");

        let (status, body) = send_json(
            &state,
            "POST",
            "/api/convert/youtube",
            None,
            json!({ "url": "https://vimeo.com/123" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid YouTube URL.");
    }

    #[tokio::test]
    async fn contact_submit_and_status() {
        let (_dir, state) = setup().await;

        let (status, _) = send_json(
            &state,
            "POST",
            "/api/contact/submit",
            None,
            json!({ "name": "Cy", "email": "cy@example.com", "subject": "" , "message": "hi" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &state,
            "POST",
            "/api/contact/submit",
            None,
            json!({ "name": "Cy", "email": "cy@example.com", "subject": "Help", "message": "It broke" }),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert!(body["data"]["id"].is_string());

        let (status, body) =
            get(&state, "/api/contact/check-status?email=cy@example.com", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "new");
        assert_eq!(body["data"]["subject"], "Help");

        let (status, _) =
            get(&state, "/api/contact/check-status?email=nobody@example.com", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn contact_admin_routes_require_admin() {
        let (_dir, state) = setup().await;

        let (status, _) = get(&state, "/api/contact/admin", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let user = token_for(&state, false);
        let (status, _) = get(&state, "/api/contact/admin", Some(&user)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let admin = token_for(&state, true);
        let (_, created) = send_json(
            &state,
            "POST",
            "/api/contact/submit",
            None,
            json!({ "name": "Di", "email": "di@example.com", "subject": "Q", "message": "?" }),
        )
        .await;
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (status, body) = get(&state, "/api/contact/admin?page=1&limit=10", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["totalItems"], 1);
        assert_eq!(body["pagination"]["totalPages"], 1);

        let (status, body) = send_json(
            &state,
            "PUT",
            &format!("/api/contact/admin/{id}/status"),
            Some(&admin),
            json!({ "status": "read" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "read");

        let (status, _) = send_json(
            &state,
            "PUT",
            &format!("/api/contact/admin/{id}/status"),
            Some(&admin),
            json!({ "status": "archived" }),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send_json(
            &state,
            "POST",
            &format!("/api/contact/admin/{id}/reply"),
            Some(&admin),
            json!({ "replyMessage": "Fixed now" }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "replied");

        let (status, body) = get(&state, "/api/contact/admin/stats", Some(&admin)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["total"], 1);

        let req = request("DELETE", &format!("/api/contact/admin/{id}"))
            .header("authorization", format!("Bearer {admin}"));
        let (status, _) = send(&state, req, Body::empty()).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _) = get(&state, &format!("/api/contact/admin/{id}"), Some(&admin)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
