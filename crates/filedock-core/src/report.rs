//! 错误上报
//!
//! 把失败映射为面向用户的通知。上报器是无状态的，不允许 panic，
//! 也不允许阻塞调用方。

use log::error;
use std::error::Error;
use std::fmt;
use tokio::sync::mpsc;

/// 失败发生的场景
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorContext {
    Uploading,
    Downloading,
    LoadingFiles,
}

impl ErrorContext {
    /// 面向用户的场景描述
    pub fn label(&self) -> &'static str {
        match self {
            ErrorContext::Uploading => "uploading file",
            ErrorContext::Downloading => "downloading file",
            ErrorContext::LoadingFiles => "loading files",
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 发送给界面的通知
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub context: ErrorContext,
    /// 简短的错误描述（仅最外层错误）
    pub message: String,
}

impl Notification {
    pub fn title(&self) -> String {
        format!("Error in {}", self.context)
    }
}

/// 错误上报接口
pub trait ErrorReporter: Send + Sync {
    fn report(&self, error: &dyn Error, context: ErrorContext);
}

/// 拼接完整的错误链，用于日志
pub fn error_chain(error: &dyn Error) -> String {
    let mut text = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        text.push_str(": ");
        text.push_str(&cause.to_string());
        source = cause.source();
    }
    text
}

/// 只写日志的上报器（命令行使用）
#[derive(Debug, Default, Clone, Copy)]
pub struct LogReporter;

impl ErrorReporter for LogReporter {
    fn report(&self, error: &dyn Error, context: ErrorContext) {
        error!("Error in {}: {}", context, error_chain(error));
    }
}

/// 写日志并通过通道把通知交给界面
#[derive(Debug, Clone)]
pub struct ChannelReporter {
    tx: mpsc::Sender<Notification>,
}

impl ChannelReporter {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Notification>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }
}

impl ErrorReporter for ChannelReporter {
    fn report(&self, error: &dyn Error, context: ErrorContext) {
        error!("Error in {}: {}", context, error_chain(error));

        // 通道已满或界面已退出时丢弃
        let _ = self.tx.try_send(Notification {
            context,
            message: error.to_string(),
        });
    }
}
