//! Minimal Aliyun OSS client for pushing staged images with delegated (STS) credentials.

use std::fmt;
use std::path::Path;
use std::time::SystemTime;

use base64::Engine;
use base64::engine::general_purpose;
use hmac::{Hmac, Mac};
use regex::Regex;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, DATE, ETAG};
use reqwest::{Method, Response};
use serde::Deserialize;
use sha1::Sha1;
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument, warn};
use url::Url;

use super::UpstreamError;
use crate::config::ObjectStoreConfig;
use crate::constants::{MULTIPART_PART_SIZE, MULTIPART_THRESHOLD, PART_UPLOAD_ATTEMPTS};

type HmacSha1 = Hmac<Sha1>;

const SECURITY_TOKEN_HEADER: &str = "x-oss-security-token";
const IMAGE_CONTENT_TYPE: &str = "image/jpeg";
const PART_CONTENT_TYPE: &str = "application/octet-stream";
const XML_CONTENT_TYPE: &str = "application/xml";

/// Short-lived object store credentials handed out by the platform
#[derive(Clone, Deserialize, PartialEq, Eq)]
pub struct StsCredentials {
    /// access key id
    #[serde(rename = "Ak")]
    pub access_key_id: String,
    /// access key secret
    #[serde(rename = "Sk")]
    pub access_key_secret: String,
    /// STS security token
    #[serde(rename = "Token")]
    pub security_token: String,
}

impl fmt::Debug for StsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StsCredentials")
            .field("access_key_id", &self.access_key_id)
            .field("access_key_secret", &"<redacted>")
            .field("security_token", &"<redacted>")
            .finish()
    }
}

/// One bucket on the object store
#[derive(Clone, Debug)]
pub struct OssBucket {
    client: reqwest::Client,
    base_url: Url,
    bucket: String,
    multipart_threshold: u64,
    part_size: u64,
}

impl OssBucket {
    /// Bucket addressed through its virtual-hosted url
    pub fn new(client: reqwest::Client, config: &ObjectStoreConfig) -> Result<Self, UpstreamError> {
        let base_url = config
            .bucket_url()
            .map_err(|err| UpstreamError::ObjectStore(err.to_string()))?;
        Ok(Self::with_base_url(client, &config.bucket, base_url))
    }

    /// Bucket served from an explicit url, eg a local stand-in
    pub fn with_base_url(client: reqwest::Client, bucket: &str, base_url: Url) -> Self {
        Self {
            client,
            base_url,
            bucket: bucket.to_string(),
            multipart_threshold: MULTIPART_THRESHOLD,
            part_size: MULTIPART_PART_SIZE,
        }
    }

    /// Overrides when files get split and how big the pieces are
    pub fn with_part_size(mut self, multipart_threshold: u64, part_size: u64) -> Self {
        self.multipart_threshold = multipart_threshold;
        self.part_size = part_size.max(1);
        self
    }

    /// Uploads the file at `path` to `key`.
    ///
    /// Small files go up in one request. Larger ones go up in parts, and a part
    /// that fails transiently is sent again on its own instead of restarting
    /// the whole transfer.
    #[instrument(level = "debug", skip(self, credentials, path))]
    pub async fn resumable_upload(
        &self,
        credentials: &StsCredentials,
        key: &str,
        path: &Path,
    ) -> Result<(), UpstreamError> {
        let size = tokio::fs::metadata(path).await?.len();
        if size < self.multipart_threshold {
            let body = tokio::fs::read(path).await?;
            self.send(credentials, Method::PUT, key, None, IMAGE_CONTENT_TYPE, body)
                .await?;
            debug!(size, "Uploaded object in one piece");
            return Ok(());
        }

        let upload_id = self.initiate_multipart(credentials, key).await?;
        let mut file = tokio::fs::File::open(path).await?;
        let mut parts = Vec::new();
        let mut offset = 0;
        let mut part_number = 1u32;
        while offset < size {
            let len = self.part_size.min(size - offset);
            let mut chunk = vec![0u8; usize::try_from(len).unwrap_or(usize::MAX)];
            file.read_exact(&mut chunk).await?;
            let etag = self
                .upload_part(credentials, key, &upload_id, part_number, chunk)
                .await?;
            parts.push((part_number, etag));
            offset += len;
            part_number += 1;
        }

        self.complete_multipart(credentials, key, &upload_id, &parts)
            .await?;
        debug!(size, parts = parts.len(), "Uploaded object in parts");
        Ok(())
    }

    async fn initiate_multipart(
        &self,
        credentials: &StsCredentials,
        key: &str,
    ) -> Result<String, UpstreamError> {
        let response = self
            .send(
                credentials,
                Method::POST,
                key,
                Some("uploads"),
                IMAGE_CONTENT_TYPE,
                Vec::new(),
            )
            .await?;
        let body = response.text().await?;
        let pattern = Regex::new(r"<UploadId>([^<]+)</UploadId>")
            .map_err(|err| UpstreamError::ObjectStore(err.to_string()))?;
        pattern
            .captures(&body)
            .and_then(|captures| captures.get(1))
            .map(|upload_id| upload_id.as_str().to_string())
            .ok_or_else(|| UpstreamError::ObjectStore("UploadId missing from response".to_string()))
    }

    async fn upload_part(
        &self,
        credentials: &StsCredentials,
        key: &str,
        upload_id: &str,
        part_number: u32,
        chunk: Vec<u8>,
    ) -> Result<String, UpstreamError> {
        let sub_resource = format!("partNumber={part_number}&uploadId={upload_id}");
        let mut attempt = 1;
        loop {
            let result = self
                .send(
                    credentials,
                    Method::PUT,
                    key,
                    Some(&sub_resource),
                    PART_CONTENT_TYPE,
                    chunk.clone(),
                )
                .await;
            match result {
                Ok(response) => {
                    return response
                        .headers()
                        .get(ETAG)
                        .and_then(|value| value.to_str().ok())
                        .map(str::to_string)
                        .ok_or_else(|| {
                            UpstreamError::ObjectStore(format!(
                                "ETag missing for part {part_number}"
                            ))
                        });
                }
                Err(err) if attempt < PART_UPLOAD_ATTEMPTS && is_transient(&err) => {
                    warn!(part_number, attempt, "Part upload failed, resending: {}", err);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn complete_multipart(
        &self,
        credentials: &StsCredentials,
        key: &str,
        upload_id: &str,
        parts: &[(u32, String)],
    ) -> Result<(), UpstreamError> {
        let mut body = String::from("<CompleteMultipartUpload>");
        for (part_number, etag) in parts {
            body.push_str(&format!(
                "<Part><PartNumber>{part_number}</PartNumber><ETag>{etag}</ETag></Part>"
            ));
        }
        body.push_str("</CompleteMultipartUpload>");

        let sub_resource = format!("uploadId={upload_id}");
        self.send(
            credentials,
            Method::POST,
            key,
            Some(&sub_resource),
            XML_CONTENT_TYPE,
            body.into_bytes(),
        )
        .await?;
        Ok(())
    }

    async fn send(
        &self,
        credentials: &StsCredentials,
        method: Method,
        key: &str,
        sub_resource: Option<&str>,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<Response, UpstreamError> {
        let mut url = self
            .base_url
            .join(key)
            .map_err(|err| UpstreamError::ObjectStore(err.to_string()))?;
        url.set_query(sub_resource);

        let date = httpdate::fmt_http_date(SystemTime::now());
        let authorization = self.authorization(
            credentials,
            &method,
            content_type,
            &date,
            key,
            sub_resource,
        )?;

        let response = self
            .client
            .request(method, url)
            .header(DATE, &date)
            .header(CONTENT_TYPE, content_type)
            .header(SECURITY_TOKEN_HEADER, &credentials.security_token)
            .header(AUTHORIZATION, authorization)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(UpstreamError::Http { status, body });
        }
        Ok(response)
    }

    /// OSS header signature: HMAC-SHA1 over the verb, content headers, date,
    /// `x-oss-*` headers and the canonical resource.
    fn authorization(
        &self,
        credentials: &StsCredentials,
        method: &Method,
        content_type: &str,
        date: &str,
        key: &str,
        sub_resource: Option<&str>,
    ) -> Result<String, UpstreamError> {
        let mut resource = format!("/{}/{}", self.bucket, key);
        if let Some(sub_resource) = sub_resource {
            resource.push('?');
            resource.push_str(sub_resource);
        }
        let string_to_sign = format!(
            "{method}\n\n{content_type}\n{date}\n{SECURITY_TOKEN_HEADER}:{}\n{resource}",
            credentials.security_token
        );

        let mut mac = HmacSha1::new_from_slice(credentials.access_key_secret.as_bytes())
            .map_err(|err| UpstreamError::ObjectStore(err.to_string()))?;
        mac.update(string_to_sign.as_bytes());
        let signature = general_purpose::STANDARD.encode(mac.finalize().into_bytes());
        Ok(format!("OSS {}:{}", credentials.access_key_id, signature))
    }
}

fn is_transient(err: &UpstreamError) -> bool {
    match err {
        UpstreamError::Transport(_) => true,
        UpstreamError::Http { status, .. } => status.is_server_error(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::body::Bytes;
    use axum::extract::{Path as UrlPath, Query, State};
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;

    use super::*;
    use crate::testing::spawn_stub;

    #[derive(Clone, Default)]
    struct Store {
        objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
        parts: Arc<Mutex<Vec<(u32, Vec<u8>)>>>,
        fail_part_once: Arc<Mutex<Option<u32>>>,
        auth_headers: Arc<Mutex<Vec<String>>>,
        completed: Arc<Mutex<Option<String>>>,
    }

    fn record_auth(store: &Store, headers: &HeaderMap) {
        let auth = headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default()
            .to_string();
        assert_eq!(
            headers
                .get(SECURITY_TOKEN_HEADER)
                .and_then(|value| value.to_str().ok()),
            Some("sts-token")
        );
        store.auth_headers.lock().expect("lock").push(auth);
    }

    async fn put_handler(
        State(store): State<Store>,
        UrlPath(key): UrlPath<String>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: Bytes,
    ) -> axum::response::Response {
        record_auth(&store, &headers);
        match query.get("partNumber") {
            Some(part) => {
                let part: u32 = part.parse().expect("part number");
                let mut fail = store.fail_part_once.lock().expect("lock");
                if *fail == Some(part) {
                    *fail = None;
                    return (StatusCode::SERVICE_UNAVAILABLE, "try again").into_response();
                }
                store.parts.lock().expect("lock").push((part, body.to_vec()));
                ([(ETAG, format!("\"etag-{part}\""))], "").into_response()
            }
            None => {
                store
                    .objects
                    .lock()
                    .expect("lock")
                    .insert(key, body.to_vec());
                StatusCode::OK.into_response()
            }
        }
    }

    async fn post_handler(
        State(store): State<Store>,
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
        body: String,
    ) -> axum::response::Response {
        record_auth(&store, &headers);
        if query.contains_key("uploads") {
            return "<InitiateMultipartUploadResult><UploadId>up-1</UploadId></InitiateMultipartUploadResult>"
                .into_response();
        }
        assert_eq!(query.get("uploadId").map(String::as_str), Some("up-1"));
        *store.completed.lock().expect("lock") = Some(body);
        StatusCode::OK.into_response()
    }

    async fn bucket(store: Store) -> OssBucket {
        let router = Router::new()
            .route(
                "/{*key}",
                axum::routing::put(put_handler).post(post_handler),
            )
            .with_state(store);
        let base = spawn_stub(router).await;
        OssBucket::with_base_url(
            reqwest::Client::new(),
            "test-bucket",
            Url::parse(&format!("{base}/")).expect("base url"),
        )
    }

    fn credentials() -> StsCredentials {
        StsCredentials {
            access_key_id: "ak".to_string(),
            access_key_secret: "sk".to_string(),
            security_token: "sts-token".to_string(),
        }
    }

    fn staged(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(bytes).expect("write");
        file.flush().expect("flush");
        file
    }

    #[tokio::test]
    async fn small_files_go_up_in_one_put() {
        let store = Store::default();
        let bucket = bucket(store.clone()).await;
        let file = staged(b"jpeg bytes");

        bucket
            .resumable_upload(&credentials(), "upload/one.jpg", file.path())
            .await
            .expect("upload");

        let objects = store.objects.lock().expect("lock");
        assert_eq!(objects.get("upload/one.jpg").map(Vec::as_slice), Some(&b"jpeg bytes"[..]));
        let auth = store.auth_headers.lock().expect("lock");
        assert_eq!(auth.len(), 1);
        assert!(auth[0].starts_with("OSS ak:"));
    }

    #[tokio::test]
    async fn large_files_resume_from_the_failed_part() {
        let store = Store::default();
        *store.fail_part_once.lock().expect("lock") = Some(2);
        let bucket = bucket(store.clone()).await.with_part_size(8, 4);
        let file = staged(b"0123456789");

        bucket
            .resumable_upload(&credentials(), "upload/big.jpg", file.path())
            .await
            .expect("upload");

        let parts = store.parts.lock().expect("lock").clone();
        assert_eq!(
            parts,
            vec![
                (1, b"0123".to_vec()),
                (2, b"4567".to_vec()),
                (3, b"89".to_vec()),
            ]
        );
        let completed = store.completed.lock().expect("lock").clone().expect("completed");
        assert!(completed.contains("<PartNumber>3</PartNumber><ETag>\"etag-3\"</ETag>"));
    }

    #[tokio::test]
    async fn rejected_upload_is_an_error() {
        let router = Router::new().route(
            "/{*key}",
            axum::routing::put(|| async { (StatusCode::FORBIDDEN, "AccessDenied") }),
        );
        let base = spawn_stub(router).await;
        let bucket = OssBucket::with_base_url(
            reqwest::Client::new(),
            "test-bucket",
            Url::parse(&format!("{base}/")).expect("base url"),
        );
        let file = staged(b"x");

        let err = bucket
            .resumable_upload(&credentials(), "upload/no.jpg", file.path())
            .await
            .expect_err("store refuses");
        assert!(matches!(err, UpstreamError::Http { status, .. } if status == StatusCode::FORBIDDEN));
    }

    #[test]
    fn signature_is_stable_and_base64_sha1() {
        let bucket = OssBucket::with_base_url(
            reqwest::Client::new(),
            "test-bucket",
            Url::parse("http://127.0.0.1/").expect("url"),
        );
        let date = "Wed, 01 Jan 2025 00:00:00 GMT";
        let sign = || {
            bucket
                .authorization(
                    &credentials(),
                    &Method::PUT,
                    IMAGE_CONTENT_TYPE,
                    date,
                    "upload/a.jpg",
                    None,
                )
                .expect("sign")
        };
        let first = sign();
        assert_eq!(first, sign());
        let signature = first.strip_prefix("OSS ak:").expect("prefix");
        assert_eq!(signature.len(), 28);
    }

    #[test]
    fn credentials_debug_hides_secrets() {
        let debug = format!("{:?}", credentials());
        assert!(!debug.contains("sts-token"));
        assert!(!debug.contains("\"sk\""));
    }
}
