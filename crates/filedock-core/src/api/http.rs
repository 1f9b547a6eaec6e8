//! HTTP 传输客户端
//!
//! 基于 reqwest 的 `FileApi` 实现。文件内容以流的形式 PUT 到预签名地址，
//! 每写出一块数据上报一次进度。

use log::{debug, info, warn};

use crate::api::{ApiError, FileApi, ProgressSink};
use crate::config::{ApiSettings, ClientSettings, ConfigError, Endpoints};
use crate::model::{
    DownloadLink, FileRecord, FileSource, NotifyAck, NotifyUploadRequest, UploadDestination,
    UploadFile,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{CONTENT_LENGTH, CONTENT_TYPE};
use reqwest::{RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// 上传时每块数据的大小
const CHUNK_SIZE: usize = 64 * 1024;

/// 后端 HTTP 客户端
#[derive(Debug, Clone)]
pub struct HttpFileClient {
    http: reqwest::Client,
    /// 用于解析相对的预签名地址
    base_url: Url,
    /// 去掉末尾 `/` 的基础地址，用于拼接接口路径
    base: String,
    endpoints: Endpoints,
    timeout: Duration,
}

impl HttpFileClient {
    pub fn new(settings: &ClientSettings) -> Result<Self, ConfigError> {
        Self::with_api(&settings.api, settings.request_timeout())
    }

    pub fn with_api(api: &ApiSettings, timeout: Duration) -> Result<Self, ConfigError> {
        let base = api.base_url.trim_end_matches('/').to_string();
        let base_url = Url::parse(&base).map_err(|source| ConfigError::InvalidBaseUrl {
            url: api.base_url.clone(),
            source,
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::NotABase(api.base_url.clone()));
        }

        Ok(Self {
            http: reqwest::Client::new(),
            base_url,
            base,
            endpoints: api.endpoints.clone(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// 解析后端返回的地址（可能是绝对地址，也可能是相对于后端的路径）
    fn resolve(&self, location: &str) -> Result<Url, ApiError> {
        self.base_url
            .join(location)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {}", redact(location), e)))
    }

    async fn send(&self, request: RequestBuilder, url: &str) -> Result<Response, ApiError> {
        let response = request
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|source| ApiError::Network {
                url: redact(url),
                source,
            })?;
        check_status(response, url)
    }

    async fn send_cancellable(
        &self,
        request: RequestBuilder,
        url: &str,
        cancel: &CancellationToken,
    ) -> Result<Response, ApiError> {
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(ApiError::Cancelled),
            result = request.send() => {
                let response = result.map_err(|source| ApiError::Network {
                    url: redact(url),
                    source,
                })?;
                check_status(response, url)
            }
        }
    }

    async fn stream_to_file(
        &self,
        response: Response,
        path: &Path,
        cancel: &CancellationToken,
    ) -> Result<u64, ApiError> {
        let url = redact(response.url().as_str());
        let mut file = tokio::fs::File::create(path).await?;
        let mut body = response.bytes_stream();
        let mut written: u64 = 0;

        loop {
            let chunk = tokio::select! {
                biased;
                () = cancel.cancelled() => return Err(ApiError::Cancelled),
                chunk = body.next() => chunk,
            };
            match chunk {
                Some(chunk) => {
                    let chunk = chunk.map_err(|source| ApiError::Network {
                        url: url.clone(),
                        source,
                    })?;
                    file.write_all(&chunk).await?;
                    written += chunk.len() as u64;
                }
                None => break,
            }
        }

        file.flush().await?;
        Ok(written)
    }
}

#[async_trait]
impl FileApi for HttpFileClient {
    async fn list_files(&self, query: Option<&str>) -> Result<Vec<FileRecord>, ApiError> {
        let url = self.endpoint(&self.endpoints.files);
        let mut request = self.http.get(&url);
        if let Some(context) = query.filter(|q| !q.is_empty()) {
            request = request.query(&[("context", context)]);
        }

        debug!("Listing files (filter: {:?})", query);
        let response = self.send(request, &url).await?;
        read_json(response, &url).await
    }

    async fn request_upload_destination(&self) -> Result<UploadDestination, ApiError> {
        let url = self.endpoint(&self.endpoints.upload);
        let response = self.send(self.http.get(&url), &url).await?;
        let mut destination: UploadDestination = read_json(response, &url).await?;

        destination.presigned_url = self.resolve(&destination.presigned_url)?.to_string();
        debug!("Upload destination issued for {}", destination.file_id);
        Ok(destination)
    }

    async fn upload_bytes(
        &self,
        destination: &str,
        file: &UploadFile,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        let total = file.size;
        let chunks = body_stream(&file.source).await?;

        // 流被 hyper 消费时统计已写出的字节数
        let (tx, mut rx) = mpsc::unbounded_channel::<u64>();
        let mut sent: u64 = 0;
        let counted = chunks.inspect(move |chunk| {
            if let Ok(bytes) = chunk {
                sent += bytes.len() as u64;
                let _ = tx.send(sent);
            }
        });

        info!(
            "Uploading {} ({} bytes, {}) to {}",
            file.name,
            total,
            file.content_type,
            redact(destination)
        );

        let request = self
            .http
            .put(destination)
            .header(CONTENT_TYPE, file.content_type.as_str())
            .header(CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(counted))
            .send();
        tokio::pin!(request);

        let response = loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    info!("Upload of {} aborted", file.name);
                    return Err(ApiError::Cancelled);
                }
                Some(sent) = rx.recv() => progress.on_progress(sent, Some(total)),
                result = &mut request => {
                    break result.map_err(|source| ApiError::Network {
                        url: redact(destination),
                        source,
                    })?;
                }
            }
        };

        while let Ok(sent) = rx.try_recv() {
            progress.on_progress(sent, Some(total));
        }

        check_status(response, destination)?;
        Ok(())
    }

    async fn notify_upload_complete(
        &self,
        file_id: &str,
        file_name: &str,
    ) -> Result<NotifyAck, ApiError> {
        let url = self.endpoint(&self.endpoints.notify_upload);
        let body = NotifyUploadRequest {
            file_id: file_id.to_string(),
            file_name: file_name.to_string(),
        };

        let response = self.send(self.http.post(&url).json(&body), &url).await?;
        read_json(response, &url).await
    }

    fn download_url(&self, file_id: &str) -> String {
        format!(
            "{}/{}",
            self.endpoint(&self.endpoints.download),
            urlencoding::encode(file_id)
        )
    }

    async fn download_to(
        &self,
        file_id: &str,
        file_name: &str,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError> {
        let url = self.download_url(file_id);
        let mut response = self
            .send_cancellable(self.http.get(&url), &url, cancel)
            .await?;

        // 后端可能返回 {"presigned_url": ...} 而不是文件内容
        if is_json(&response) {
            let link: DownloadLink = read_json(response, &url).await?;
            let target = self.resolve(&link.presigned_url)?;
            debug!("Following download link for {}", file_id);
            response = self
                .send_cancellable(self.http.get(target.clone()), target.as_str(), cancel)
                .await?;
        }

        tokio::fs::create_dir_all(dir).await?;
        let path = dir.join(safe_file_name(file_name, file_id));

        match self.stream_to_file(response, &path, cancel).await {
            Ok(written) => {
                info!("Downloaded {} ({} bytes) to {:?}", file_id, written, path);
                Ok(path)
            }
            Err(e) => {
                if let Err(remove_err) = tokio::fs::remove_file(&path).await {
                    warn!("Failed to remove partial download {:?}: {}", path, remove_err);
                }
                Err(e)
            }
        }
    }
}

fn check_status(response: Response, url: &str) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(ApiError::Status {
            url: redact(url),
            status,
        })
    }
}

async fn read_json<T: DeserializeOwned>(response: Response, url: &str) -> Result<T, ApiError> {
    let body = response.bytes().await.map_err(|source| ApiError::Network {
        url: redact(url),
        source,
    })?;
    serde_json::from_slice(&body).map_err(|source| ApiError::Decode {
        url: redact(url),
        source,
    })
}

fn is_json(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("application/json"))
}

async fn body_stream(
    source: &FileSource,
) -> Result<BoxStream<'static, std::io::Result<Bytes>>, ApiError> {
    match source {
        FileSource::Path(path) => {
            let file = tokio::fs::File::open(path).await?;
            Ok(tokio_util::io::ReaderStream::with_capacity(file, CHUNK_SIZE).boxed())
        }
        FileSource::Memory(data) => {
            let chunks: Vec<std::io::Result<Bytes>> = (0..data.len())
                .step_by(CHUNK_SIZE)
                .map(|start| Ok(data.slice(start..data.len().min(start + CHUNK_SIZE))))
                .collect();
            Ok(stream::iter(chunks).boxed())
        }
    }
}

/// 去掉查询参数，避免把预签名凭据写进日志
fn redact(url: &str) -> String {
    match url.split_once('?') {
        Some((head, _)) => format!("{}?…", head),
        None => url.to_string(),
    }
}

/// 只保留最后一段文件名，防止写到下载目录之外
fn safe_file_name(file_name: &str, fallback: &str) -> String {
    let name = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match name {
        "" | "." | ".." => fallback.to_string(),
        name => name.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(base_url: &str) -> HttpFileClient {
        let api = ApiSettings {
            base_url: base_url.to_string(),
            ..Default::default()
        };
        HttpFileClient::with_api(&api, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_download_url_is_deterministic() {
        let client = client("http://localhost:8000/api/");
        let first = client.download_url("a1b2-c3");
        assert_eq!(first, "http://localhost:8000/api/download/a1b2-c3");
        assert_eq!(client.download_url("a1b2-c3"), first);
    }

    #[test]
    fn test_download_url_encodes_id() {
        let client = client("http://localhost:8000");
        assert_eq!(
            client.download_url("a b/c"),
            "http://localhost:8000/download/a%20b%2Fc"
        );
    }

    #[test]
    fn test_resolve_relative_presigned_url() {
        let client = client("http://localhost:8080/api");
        let url = client.resolve("/minio/files/abc?X-Amz-Signature=1").unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/minio/files/abc?X-Amz-Signature=1"
        );

        let absolute = client.resolve("https://s3.example.com/files/abc").unwrap();
        assert_eq!(absolute.as_str(), "https://s3.example.com/files/abc");
    }

    #[test]
    fn test_invalid_base_url() {
        let api = ApiSettings {
            base_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpFileClient::with_api(&api, Duration::from_secs(1)),
            Err(ConfigError::InvalidBaseUrl { .. })
        ));

        let api = ApiSettings {
            base_url: "mailto:someone@example.com".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            HttpFileClient::with_api(&api, Duration::from_secs(1)),
            Err(ConfigError::NotABase(_))
        ));
    }

    #[test]
    fn test_redact_strips_query() {
        assert_eq!(redact("http://s3/x?sig=secret"), "http://s3/x?…");
        assert_eq!(redact("http://s3/x"), "http://s3/x");
    }

    #[test]
    fn test_safe_file_name() {
        assert_eq!(safe_file_name("report.pdf", "id"), "report.pdf");
        assert_eq!(safe_file_name("../../etc/passwd", "id"), "passwd");
        assert_eq!(safe_file_name("dir\\evil.exe", "id"), "evil.exe");
        assert_eq!(safe_file_name("..", "id"), "id");
        assert_eq!(safe_file_name("", "id"), "id");
    }

    #[tokio::test]
    async fn test_memory_body_is_chunked() {
        let data = Bytes::from(vec![7u8; CHUNK_SIZE * 2 + 10]);
        let chunks: Vec<_> = body_stream(&FileSource::Memory(data))
            .await
            .unwrap()
            .collect()
            .await;
        let sizes: Vec<usize> = chunks.into_iter().map(|c| c.unwrap().len()).collect();
        assert_eq!(sizes, vec![CHUNK_SIZE, CHUNK_SIZE, 10]);
    }
}
