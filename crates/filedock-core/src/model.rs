//! 数据模型
//!
//! 与后端 JSON 格式一一对应的记录类型，以及待上传的本地文件描述。

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 后端保存的文件记录
///
/// 由后端在收到上传完成通知后创建，客户端只读。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_id: String,
    pub original_name: String,
    pub size: u64,
    /// ISO-8601 时间字符串，原样保留
    pub upload_date: String,
}

/// 上传目标（预签名地址）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadDestination {
    pub file_id: String,
    pub presigned_url: String,
}

/// 上传完成通知的请求体
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyUploadRequest {
    pub file_id: String,
    pub file_name: String,
}

/// 后端对上传完成通知的确认
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotifyAck {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: String,
}

/// 下载接口可能返回的跳转链接
#[derive(Debug, Clone, Deserialize)]
pub struct DownloadLink {
    pub presigned_url: String,
}

/// 上传内容来源
#[derive(Debug, Clone)]
pub enum FileSource {
    Path(PathBuf),
    Memory(Bytes),
}

/// 待上传的本地文件
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub source: FileSource,
}

impl UploadFile {
    /// 从磁盘路径构造，读取文件大小并根据扩展名猜测 MIME 类型
    pub async fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let metadata = tokio::fs::metadata(path).await?;
        if !metadata.is_file() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("{} is not a regular file", path.display()),
            ));
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        Ok(Self {
            content_type: guess_content_type(&name),
            name,
            size: metadata.len(),
            source: FileSource::Path(path.to_path_buf()),
        })
    }

    /// 从内存数据构造
    pub fn from_bytes(name: impl Into<String>, data: impl Into<Bytes>) -> Self {
        let name = name.into();
        let data = data.into();
        Self {
            content_type: guess_content_type(&name),
            name,
            size: data.len() as u64,
            source: FileSource::Memory(data),
        }
    }
}

fn guess_content_type(name: &str) -> String {
    mime_guess::from_path(name)
        .first()
        .map(|m| m.to_string())
        .unwrap_or_else(|| "application/octet-stream".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_record_json_shape() {
        let json = r#"{
            "file_id": "3f2a",
            "original_name": "invoice-2024.pdf",
            "size": 48213,
            "upload_date": "2024-05-01T10:15:00"
        }"#;

        let record: FileRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.file_id, "3f2a");
        assert_eq!(record.original_name, "invoice-2024.pdf");
        assert_eq!(record.size, 48213);
        assert_eq!(record.upload_date, "2024-05-01T10:15:00");

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["original_name"], "invoice-2024.pdf");
        assert_eq!(value["size"], 48213);
    }

    #[test]
    fn test_notify_ack_tolerates_missing_fields() {
        let ack: NotifyAck = serde_json::from_str("{}").unwrap();
        assert_eq!(ack, NotifyAck::default());
    }

    #[test]
    fn test_content_type_guess() {
        let file = UploadFile::from_bytes("report.pdf", vec![1u8, 2, 3]);
        assert_eq!(file.content_type, "application/pdf");
        assert_eq!(file.size, 3);

        let file = UploadFile::from_bytes("blob", Vec::<u8>::new());
        assert_eq!(file.content_type, "application/octet-stream");
    }

    #[tokio::test]
    async fn test_from_path_reads_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        tokio::fs::write(&path, b"hello world").await.unwrap();

        let file = UploadFile::from_path(&path).await.unwrap();
        assert_eq!(file.name, "notes.txt");
        assert_eq!(file.size, 11);
        assert_eq!(file.content_type, "text/plain");

        assert!(UploadFile::from_path(dir.path()).await.is_err());
    }
}
