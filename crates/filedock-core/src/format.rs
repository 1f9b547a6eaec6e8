//! 显示格式化

use chrono::{DateTime, Local, NaiveDateTime};

const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// 可读的文件大小，例如 `1.5 KB`
pub fn format_file_size(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{} B", bytes);
    }

    #[allow(clippy::cast_precision_loss)]
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    let text = format!("{:.2}", value);
    let text = text.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", text, UNITS[unit])
}

/// 上传时间的显示格式 `MM/DD/YYYY, hh:mm AM`，按本地时区显示
///
/// 带时区偏移的时间转换到本地时区；无偏移的时间视为本地时间。
/// 无法解析时原样返回。
pub fn format_upload_date(value: &str) -> String {
    const FORMAT: &str = "%m/%d/%Y, %I:%M %p";

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return dt.with_timezone(&Local).format(FORMAT).to_string();
    }
    match NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f") {
        Ok(dt) => dt.format(FORMAT).to_string(),
        Err(_) => value.to_string(),
    }
}
