//! 文件传输客户端
//!
//! 包含:
//! - `FileApi`: 协调器与后端之间的接口
//! - `HttpFileClient`: 基于 reqwest 的实现
//!
//! 后端接口:
//!
//! | 操作 | 方法 | 路径 |
//! |---|---|---|
//! | 文件列表 | GET | `/files?context=...` |
//! | 获取上传地址 | GET | `/upload` |
//! | 上传完成通知 | POST | `/notify-upload` |
//! | 下载 | GET | `/download/{file_id}` |
//! | 上传内容 | PUT | 预签名地址 |

pub mod http;

pub use http::HttpFileClient;

use crate::model::{FileRecord, NotifyAck, UploadDestination, UploadFile};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// 传输客户端错误
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Request to {url} failed")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status {
        url: String,
        status: reqwest::StatusCode,
    },

    #[error("Malformed response from {url}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transfer cancelled")]
    Cancelled,
}

impl ApiError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ApiError::Cancelled)
    }
}

/// 传输进度回调
pub trait ProgressSink: Send + Sync {
    /// `total` 未知时为 `None`
    fn on_progress(&self, sent: u64, total: Option<u64>);
}

/// 后端接口
#[async_trait]
pub trait FileApi: Send + Sync {
    /// 获取文件列表，`query` 非空时作为服务端过滤条件
    async fn list_files(&self, query: Option<&str>) -> Result<Vec<FileRecord>, ApiError>;

    /// 申请上传目标（预签名地址 + 文件 ID）
    async fn request_upload_destination(&self) -> Result<UploadDestination, ApiError>;

    /// 把文件内容 PUT 到上传目标
    ///
    /// `cancel` 触发后立即中止请求并返回 `ApiError::Cancelled`。
    async fn upload_bytes(
        &self,
        destination: &str,
        file: &UploadFile,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<(), ApiError>;

    /// 通知后端内容已写入，由后端登记文件记录
    async fn notify_upload_complete(
        &self,
        file_id: &str,
        file_name: &str,
    ) -> Result<NotifyAck, ApiError>;

    /// 构造下载地址，不发起网络请求
    fn download_url(&self, file_id: &str) -> String;

    /// 下载文件到目录，返回写入的路径
    async fn download_to(
        &self,
        file_id: &str,
        file_name: &str,
        dir: &Path,
        cancel: &CancellationToken,
    ) -> Result<PathBuf, ApiError>;
}
