//! 集成测试 - HTTP 传输客户端
//!
//! 使用 wiremock 模拟后端与对象存储，验证请求格式和错误分类。

use std::sync::Mutex;
use std::time::{Duration, Instant};

use filedock_core::{
    ApiError, ApiSettings, CancellationToken, FileApi, HttpFileClient, ProgressSink, UploadFile,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn client_for(server: &MockServer) -> HttpFileClient {
    let api = ApiSettings {
        base_url: server.uri(),
        ..Default::default()
    };
    HttpFileClient::with_api(&api, Duration::from_secs(5)).unwrap()
}

#[derive(Default)]
struct RecordingProgress {
    ticks: Mutex<Vec<(u64, Option<u64>)>>,
}

impl ProgressSink for RecordingProgress {
    fn on_progress(&self, sent: u64, total: Option<u64>) {
        self.ticks.lock().unwrap().push((sent, total));
    }
}

/// 带过滤条件的列表请求原样返回后端结果，保持顺序
#[tokio::test]
async fn test_list_files_with_filter_preserves_order() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("context", "invoice"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"file_id": "b", "original_name": "invoice-feb.pdf", "size": 2048, "upload_date": "2024-02-01T08:00:00"},
            {"file_id": "a", "original_name": "invoice-jan.pdf", "size": 1024, "upload_date": "2024-01-01T08:00:00"}
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let files = client_for(&server)
        .list_files(Some("invoice"))
        .await
        .unwrap();

    let names: Vec<&str> = files.iter().map(|f| f.original_name.as_str()).collect();
    assert_eq!(names, vec!["invoice-feb.pdf", "invoice-jan.pdf"]);
    assert_eq!(files[0].file_id, "b");
    assert_eq!(files[1].size, 1024);
}

/// 空过滤条件不发送 context 参数
#[tokio::test]
async fn test_list_files_without_filter() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let client = client_for(&server);
    assert!(client.list_files(None).await.unwrap().is_empty());
    assert!(client.list_files(Some("")).await.unwrap().is_empty());

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in requests {
        assert_eq!(request.url.query(), None);
    }
}

#[tokio::test]
async fn test_list_files_classifies_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("context", "broken"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("context", "down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let client = client_for(&server);

    let err = client.list_files(Some("broken")).await.unwrap_err();
    assert!(matches!(err, ApiError::Decode { .. }), "got {err:?}");

    let err = client.list_files(Some("down")).await.unwrap_err();
    match err {
        ApiError::Status { status, .. } => assert_eq!(status.as_u16(), 503),
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_network_error_when_backend_unreachable() {
    let api = ApiSettings {
        base_url: "http://127.0.0.1:9".to_string(),
        ..Default::default()
    };
    let client = HttpFileClient::with_api(&api, Duration::from_secs(2)).unwrap();

    let err = client.request_upload_destination().await.unwrap_err();
    assert!(matches!(err, ApiError::Network { .. }), "got {err:?}");
}

/// 相对的预签名地址按后端地址解析
#[tokio::test]
async fn test_upload_destination_resolves_relative_url() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "file_id": "f-1",
            "presigned_url": "/minio/files/f-1?X-Amz-Signature=abc"
        })))
        .mount(&server)
        .await;

    let destination = client_for(&server)
        .request_upload_destination()
        .await
        .unwrap();

    assert_eq!(destination.file_id, "f-1");
    assert_eq!(
        destination.presigned_url,
        format!("{}/minio/files/f-1?X-Amz-Signature=abc", server.uri())
    );
}

/// PUT 原始字节，带 Content-Type，进度最终到达总大小
#[tokio::test]
async fn test_upload_bytes_streams_body_and_reports_progress() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/minio/files/f-1"))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let data: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    let file = UploadFile::from_bytes("notes.txt", data.clone());
    let progress = RecordingProgress::default();
    let destination = format!("{}/minio/files/f-1?sig=1", server.uri());

    client_for(&server)
        .upload_bytes(&destination, &file, &progress, &CancellationToken::new())
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].body, data);
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "text/plain"
    );

    let ticks = progress.ticks.lock().unwrap().clone();
    assert!(!ticks.is_empty());
    assert!(ticks.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(ticks.last().copied(), Some((200_000, Some(200_000))));
}

#[tokio::test]
async fn test_upload_bytes_from_disk() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/bucket/doc"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let file_path = dir.path().join("doc.json");
    tokio::fs::write(&file_path, br#"{"hello":"world"}"#).await.unwrap();
    let file = UploadFile::from_path(&file_path).await.unwrap();

    client_for(&server)
        .upload_bytes(
            &format!("{}/bucket/doc", server.uri()),
            &file,
            &RecordingProgress::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests[0].body, br#"{"hello":"world"}"#.to_vec());
    assert_eq!(
        requests[0].headers.get("content-type").unwrap(),
        "application/json"
    );
}

#[tokio::test]
async fn test_upload_bytes_rejected_by_storage() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let file = UploadFile::from_bytes("a.bin", vec![0u8; 16]);
    let err = client_for(&server)
        .upload_bytes(
            &format!("{}/bucket/a?sig=expired", server.uri()),
            &file,
            &RecordingProgress::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    match err {
        ApiError::Status { status, url } => {
            assert_eq!(status.as_u16(), 403);
            // 预签名参数不会出现在错误信息中
            assert!(!url.contains("expired"), "{url}");
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

/// 取消立即中止传输，不等待服务器响应
#[tokio::test]
async fn test_upload_bytes_cancellation_aborts_quickly() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
        .mount(&server)
        .await;

    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let file = UploadFile::from_bytes("slow.bin", vec![1u8; 1024]);
    let started = Instant::now();
    let err = client_for(&server)
        .upload_bytes(
            &format!("{}/bucket/slow", server.uri()),
            &file,
            &RecordingProgress::default(),
            &cancel,
        )
        .await
        .unwrap_err();

    assert!(err.is_cancelled());
    assert!(started.elapsed() < Duration::from_secs(10));
}

#[tokio::test]
async fn test_notify_upload_complete_posts_json() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/notify-upload"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "success",
            "message": "File processed successfully"
        })))
        .mount(&server)
        .await;

    let ack = client_for(&server)
        .notify_upload_complete("f-1", "report.pdf")
        .await
        .unwrap();
    assert_eq!(ack.status, "success");

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body, json!({"file_id": "f-1", "file_name": "report.pdf"}));
}

/// 下载接口返回跳转链接时跟随链接获取文件内容
#[tokio::test]
async fn test_download_follows_presigned_link() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/f-9"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "presigned_url": "/storage/f-9?sig=1"
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/storage/f-9"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"file contents".to_vec()))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let written = client_for(&server)
        .download_to("f-9", "../report.txt", dir.path(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(written, dir.path().join("report.txt"));
    assert_eq!(tokio::fs::read(&written).await.unwrap(), b"file contents");
}

#[tokio::test]
async fn test_download_streams_binary_directly() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/download/f-2"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(vec![0xde, 0xad, 0xbe, 0xef], "application/octet-stream"),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/missing"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let client = client_for(&server);

    let written = client
        .download_to("f-2", "blob.bin", dir.path(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        tokio::fs::read(&written).await.unwrap(),
        vec![0xde, 0xad, 0xbe, 0xef]
    );

    let err = client
        .download_to("missing", "gone.bin", dir.path(), &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ApiError::Status { .. }));
    assert!(!dir.path().join("gone.bin").exists());
}
