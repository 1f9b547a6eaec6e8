//! 应用配置和持久化
//!
//! 提供后端地址、接口路径、搜索防抖时长等设置的存储和读取。

use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// 覆盖后端地址的环境变量
pub const API_URL_ENV: &str = "FILEDOCK_API_URL";

/// 配置错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid API base URL {url:?}: {source}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("API base URL cannot be a base: {0}")]
    NotABase(String),

    #[error("Failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// 后端接口路径
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub files: String,
    pub upload: String,
    pub notify_upload: String,
    pub download: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            files: "/files".to_string(),
            upload: "/upload".to_string(),
            notify_upload: "/notify-upload".to_string(),
            download: "/download".to_string(),
        }
    }
}

/// 后端 API 设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// 后端基础地址，例如 `http://localhost:8000` 或 `https://example.com/api`
    pub base_url: String,
    pub endpoints: Endpoints,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            endpoints: Endpoints::default(),
        }
    }
}

/// 客户端设置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 普通请求超时（秒），不作用于文件传输本身
    pub request_timeout_secs: u64,
    /// 搜索防抖时长（毫秒）
    pub search_debounce_ms: u64,
    /// 下载目录
    pub download_dir: PathBuf,
    /// TOML 中表必须位于普通键之后
    pub api: ApiSettings,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            search_debounce_ms: 500,
            download_dir: dirs::download_dir().unwrap_or_else(|| PathBuf::from(".")),
            api: ApiSettings::default(),
        }
    }
}

impl ClientSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("filedock");
        config_dir.join("settings.toml")
    }

    /// 加载设置（文件不存在或无法解析时使用默认值）
    ///
    /// 设置了 `FILEDOCK_API_URL` 时覆盖文件中的后端地址。
    pub fn load() -> Self {
        let path = Self::config_path();
        let mut settings = Self::default();
        if path.exists() {
            match fs::read_to_string(&path) {
                Ok(content) => match Self::from_toml(&content) {
                    Ok(loaded) => {
                        debug!("Loaded settings from {:?}", path);
                        settings = loaded;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }

        if let Ok(url) = std::env::var(API_URL_ENV) {
            debug!("API base URL overridden by {}: {}", API_URL_ENV, url);
            settings.api.base_url = url;
        }
        settings
    }

    /// 从 TOML 文本解析
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// 保存设置
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(&path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = ClientSettings::default();
        assert_eq!(settings.api.endpoints.files, "/files");
        assert_eq!(settings.api.endpoints.notify_upload, "/notify-upload");
        assert_eq!(settings.search_debounce(), Duration::from_millis(500));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = ClientSettings::from_toml(
            r#"
            search_debounce_ms = 250

            [api]
            base_url = "https://files.example.com/api"

            [api.endpoints]
            download = "/dl"
            "#,
        )
        .unwrap();

        assert_eq!(settings.api.base_url, "https://files.example.com/api");
        assert_eq!(settings.api.endpoints.download, "/dl");
        // 未指定的字段回退到默认值
        assert_eq!(settings.api.endpoints.upload, "/upload");
        assert_eq!(settings.request_timeout_secs, 30);
        assert_eq!(settings.search_debounce_ms, 250);
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            ClientSettings::from_toml("search_debounce_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
