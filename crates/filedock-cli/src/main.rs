//! Filedock CLI
//!
//! 命令行客户端，直接调用后端接口

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use filedock_core::ClientSettings;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// 默认只输出警告；标准输出留给命令结果
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(name = "filedock", version, about = "文件管理客户端 - 列出、上传、下载后端文件")]
struct Cli {
    /// 后端地址 (覆盖配置文件和 FILEDOCK_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 列出文件
    List {
        /// 按名称或内容过滤
        #[arg(short, long)]
        query: Option<String>,
    },
    /// 上传文件 (Ctrl-C 取消)
    Upload {
        /// 要上传的文件路径
        file: PathBuf,
    },
    /// 打印下载地址
    Url {
        /// 文件 ID
        file_id: String,
    },
    /// 下载文件
    Download {
        /// 文件 ID
        file_id: String,
        /// 保存的文件名 (默认使用列表中的原始名称)
        #[arg(short, long)]
        name: Option<String>,
        /// 保存目录 (默认: 配置中的下载目录)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// 重新发送上传完成通知 (用于内容已上传但后端未登记的文件)
    Notify {
        /// 文件 ID
        file_id: String,
        /// 原始文件名
        file_name: String,
    },
    /// 查看当前配置
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 桥接 log crate（filedock-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();

    let mut settings = ClientSettings::load();
    if let Some(url) = cli.api_url {
        settings.api.base_url = url;
    }

    match cli.command {
        Commands::List { query } => commands::list(&settings, query.as_deref()).await?,
        Commands::Upload { file } => commands::upload(&settings, &file).await?,
        Commands::Url { file_id } => commands::url(&settings, &file_id)?,
        Commands::Download {
            file_id,
            name,
            output,
        } => commands::download(&settings, &file_id, name, output).await?,
        Commands::Notify { file_id, file_name } => {
            commands::notify(&settings, &file_id, &file_name).await?;
        }
        Commands::Config => commands::show_config(&settings)?,
    }

    Ok(())
}
