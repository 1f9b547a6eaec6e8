//! Filedock Core Library
//!
//! 文件管理客户端的核心实现：列出后端文件、通过预签名地址上传文件、
//! 生成下载链接。
//!
//! # 模块
//!
//! - **api**: 后端 HTTP 客户端（列表、上传地址、完成通知、下载）
//! - **upload**: 上传协调器，单会话、可取消、带进度
//! - **listing**: 文件列表协调器，搜索防抖
//! - **report**: 错误上报
//! - **config**: 客户端设置
//!
//! # 使用示例
//!
//! ```ignore
//! use filedock_core::{ClientSettings, FileListCoordinator, HttpFileClient, LogReporter,
//!     UploadCoordinator, UploadFile};
//!
//! let settings = ClientSettings::load();
//! let api = Arc::new(HttpFileClient::new(&settings)?);
//! let reporter = Arc::new(LogReporter);
//!
//! // 1. 文件列表（立即拉取，搜索词防抖）
//! let list = FileListCoordinator::spawn(api.clone(), reporter.clone(), settings.search_debounce());
//! list.set_search_term("invoice");
//!
//! // 2. 上传完成后刷新列表
//! let refresh = list.clone();
//! let uploader = UploadCoordinator::new(api, reporter).with_refresh(move || refresh.refresh());
//! uploader.start_upload(UploadFile::from_path("report.pdf").await?).await?;
//! ```

pub mod api;
pub mod config;
pub mod format;
pub mod listing;
pub mod logging;
pub mod model;
pub mod report;
pub mod upload;

pub use api::{ApiError, FileApi, HttpFileClient, ProgressSink};
pub use config::{ApiSettings, ClientSettings, ConfigError, Endpoints};
pub use listing::FileListCoordinator;
pub use logging::{LogEntry, LogLevel};
pub use model::{FileRecord, FileSource, NotifyAck, UploadDestination, UploadFile};
pub use report::{ChannelReporter, ErrorContext, ErrorReporter, LogReporter, Notification};
pub use upload::{UploadCoordinator, UploadError, UploadEvent, UploadOutcome, UploadSession};

pub use tokio_util::sync::CancellationToken;
