use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::http::{HeaderMap, StatusCode};
use axum::routing::{post, put};
use axum::{Json, Router};
use pixrelay::config::{GenerationSettings, RetryPolicy, setup_logging};
use pixrelay::session::TokenSlot;
use pixrelay::upstream::{
    JobReference, JobStatus, OssBucket, PlatformApi, PlatformClient, RequestExecutor,
    UploadPipeline, UpstreamError,
};
use serde_json::{Value, json};
use url::Url;

async fn serve(router: Router) -> Url {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    Url::parse(&format!("http://{addr}/")).unwrap()
}

#[derive(Clone, Default)]
struct Calls {
    t2v_tokens: Arc<Mutex<Vec<String>>>,
    i2v: Arc<AtomicUsize>,
    poll_flaky: Arc<AtomicUsize>,
}

async fn platform(
    calls: Calls,
    registered: Value,
    jobs: Value,
) -> (PlatformClient, tempfile::TempDir) {
    let t2v = calls.clone();
    let i2v = calls.clone();
    let poll = calls.clone();
    let router = Router::new()
        .route(
            "/video/t2v",
            post(move |headers: HeaderMap| {
                let t2v = t2v.clone();
                async move {
                    let token = headers
                        .get("token")
                        .and_then(|value| value.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    t2v.t2v_tokens.lock().unwrap().push(token);
                    Json(json!({"ErrCode": 0, "Resp": {"video_id": "123"}}))
                }
            }),
        )
        .route(
            "/video/i2v",
            post(move || {
                let i2v = i2v.clone();
                async move {
                    i2v.i2v.fetch_add(1, Ordering::SeqCst);
                    Json(json!({"ErrCode": 0, "Resp": {"video_id": 7}}))
                }
            }),
        )
        .route(
            "/video/list/personal",
            post(move || {
                let poll = poll.clone();
                let jobs = jobs.clone();
                async move {
                    // first poll hits a transient failure
                    if poll.poll_flaky.fetch_add(1, Ordering::SeqCst) == 0 {
                        return (StatusCode::SERVICE_UNAVAILABLE, Json(json!({})));
                    }
                    (StatusCode::OK, Json(jobs))
                }
            }),
        )
        .route(
            "/getUploadToken",
            post(|| async {
                Json(json!({"ErrCode": 0, "Resp": {"Ak": "a", "Sk": "s", "Token": "t"}}))
            }),
        )
        .route(
            "/media/batch_upload_media",
            post(move || {
                let registered = registered.clone();
                async move { Json(registered) }
            }),
        );
    let base_url = serve(router).await;
    let store_url = serve(Router::new().route("/{*key}", put(|| async { StatusCode::OK }))).await;

    let slot = Arc::new(TokenSlot::new());
    assert!(slot.offer("session-token"));
    let policy = RetryPolicy {
        delay: std::time::Duration::from_millis(10),
        ..RetryPolicy::default()
    };
    let executor = RequestExecutor::new(policy).unwrap();
    let bucket = OssBucket::with_base_url(executor.client().clone(), "bucket", store_url);
    let api = PlatformApi::new(
        executor,
        base_url,
        Url::parse("https://app.example.org/").unwrap(),
        slot,
    );
    let staging = tempfile::tempdir().unwrap();
    let uploads = UploadPipeline::new(api.clone(), bucket).with_staging_dir(staging.path());
    (
        PlatformClient::new(api, uploads, GenerationSettings::default()),
        staging,
    )
}

#[tokio::test]
async fn test_submit_text_job_replays_the_captured_token() {
    let _ = setup_logging(true);
    let calls = Calls::default();
    let (client, _staging) = platform(calls.clone(), Value::Null, Value::Null).await;

    let job = client.submit_text_job("a cat").await.unwrap();
    assert_eq!(job, JobReference::new("123"));
    assert_eq!(
        calls.t2v_tokens.lock().unwrap().as_slice(),
        ["session-token".to_string()]
    );
}

#[tokio::test]
async fn test_poll_status_recovers_from_a_transient_failure() {
    let calls = Calls::default();
    let jobs = json!({"ErrCode": 0, "Resp": {"data": [
        {"video_id": 123, "video_status": 1, "url": "http://x"},
        {"video_id": 124, "video_status": 8}
    ]}});
    let (client, _staging) = platform(calls.clone(), Value::Null, jobs).await;

    let status = client.poll_status(&JobReference::from(123_i64)).await.unwrap();
    assert_eq!(
        status,
        JobStatus::Ready {
            url: "http://x".to_string()
        }
    );
    let status = client.poll_status(&JobReference::from(124_i64)).await.unwrap();
    assert_eq!(
        status,
        JobStatus::Phase {
            status: "Generation failed".to_string()
        }
    );
    assert_eq!(calls.poll_flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn test_submit_image_job_needs_a_registered_upload() {
    let calls = Calls::default();
    let registered = json!({"ErrCode": 0, "Resp": {"result": []}});
    let (client, staging) = platform(calls.clone(), registered, Value::Null).await;

    let err = client
        .submit_image_job("waves", b"not really a jpeg")
        .await
        .unwrap_err();
    assert!(matches!(err, UpstreamError::MissingField("result")));
    assert_eq!(calls.i2v.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_submit_image_job_uses_the_uploaded_image() {
    let calls = Calls::default();
    let registered = json!({"ErrCode": 0, "Resp": {"result": [
        {"path": "upload/a.jpg", "url": "https://media.example.org/a.jpg"}
    ]}});
    let (client, _staging) = platform(calls.clone(), registered, Value::Null).await;

    let job = client.submit_image_job("waves", b"jpeg").await.unwrap();
    assert_eq!(job.as_str(), "7");
    assert_eq!(calls.i2v.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_error_codes_are_checked_before_payloads_are_read() {
    let refused = || async {
        Json(json!({
            "ErrCode": 10005,
            "ErrMsg": "token expired",
            "Resp": {
                "video_id": "123",
                "Ak": "a", "Sk": "s", "Token": "t",
                "data": [{"video_id": 123, "video_status": 1, "url": "http://x"}]
            }
        }))
    };
    let base_url = serve(
        Router::new()
            .route("/video/t2v", post(refused))
            .route("/getUploadToken", post(refused))
            .route("/video/list/personal", post(refused)),
    )
    .await;
    let stored = Arc::new(AtomicUsize::new(0));
    let store_hits = stored.clone();
    let store_url = serve(Router::new().route(
        "/{*key}",
        put(move || {
            let store_hits = store_hits.clone();
            async move {
                store_hits.fetch_add(1, Ordering::SeqCst);
                StatusCode::OK
            }
        }),
    ))
    .await;

    let slot = Arc::new(TokenSlot::new());
    slot.offer("session-token");
    let executor = RequestExecutor::new(RetryPolicy::default()).unwrap();
    let bucket = OssBucket::with_base_url(executor.client().clone(), "bucket", store_url);
    let api = PlatformApi::new(
        executor,
        base_url,
        Url::parse("https://app.example.org/").unwrap(),
        slot,
    );
    let staging = tempfile::tempdir().unwrap();
    let uploads = UploadPipeline::new(api.clone(), bucket).with_staging_dir(staging.path());
    let client = PlatformClient::new(api, uploads.clone(), GenerationSettings::default());

    let expect_refusal = |err: UpstreamError| match err {
        UpstreamError::Application { code, message } => {
            assert_eq!(code, "10005");
            assert_eq!(message, "token expired");
        }
        other => panic!("expected an application error, got {other:?}"),
    };
    expect_refusal(client.submit_text_job("a cat").await.unwrap_err());
    expect_refusal(uploads.upload_image(b"jpeg").await.unwrap_err());
    expect_refusal(
        client
            .poll_status(&JobReference::from(123_i64))
            .await
            .unwrap_err(),
    );
    assert_eq!(stored.load(Ordering::SeqCst), 0);
}
