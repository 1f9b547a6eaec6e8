use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Filedock 开发任务自动化")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 构建 CLI 和 TUI (release)
    Build,
    /// 运行 TUI (开发模式)
    Tui {
        /// 日志级别 (trace, debug, info, warn, error)
        #[arg(short, long, default_value = "info")]
        log_level: String,
        /// 日志输出文件 (默认 /tmp/filedock.log)
        #[arg(short = 'o', long)]
        log_file: Option<String>,
        /// 后端地址 (设置 FILEDOCK_API_URL)
        #[arg(long)]
        api_url: Option<String>,
    },
    /// 运行 clippy 检查
    Lint,
    /// 打包发布 (tar.gz)
    Dist,
    /// 运行测试
    Test,
    /// 运行测试并生成覆盖率报告
    Coverage,
    /// 清理构建产物
    Clean,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // 确保在项目根目录执行
    let project_root = match std::env::var("CARGO_MANIFEST_DIR")
        .ok()
        .and_then(|p| PathBuf::from(p).parent().map(PathBuf::from))
    {
        Some(root) => root,
        None => std::env::current_dir()?,
    };
    sh.change_dir(&project_root);

    match cli.command {
        Commands::Build => build(&sh)?,
        Commands::Tui {
            log_level,
            log_file,
            api_url,
        } => tui(&sh, &log_level, log_file, api_url)?,
        Commands::Lint => lint(&sh)?,
        Commands::Dist => dist(&sh)?,
        Commands::Test => test(&sh)?,
        Commands::Coverage => coverage(&sh)?,
        Commands::Clean => clean(&sh)?,
    }

    Ok(())
}

fn build(sh: &Shell) -> Result<()> {
    println!("🔨 构建所有组件...");
    cmd!(sh, "cargo build --release -p filedock-cli -p filedock-tui").run()?;
    println!("✅ 构建完成");
    Ok(())
}

fn tui(
    sh: &Shell,
    log_level: &str,
    log_file: Option<String>,
    api_url: Option<String>,
) -> Result<()> {
    let log_file = log_file.unwrap_or_else(|| "/tmp/filedock.log".to_string());

    println!("🖥️  启动 TUI 调试模式...");
    println!("   日志级别: {}", log_level);
    println!("   日志文件: {}", log_file);
    println!();
    println!("💡 提示: 在另一个终端运行以下命令查看实时日志:");
    println!("   tail -f {}", log_file);
    println!();

    let rust_log = format!(
        "{level},filedock_core={level},filedock_tui={level},hyper=info,reqwest=info",
        level = log_level
    );
    let _log = sh.push_env("RUST_LOG", rust_log);
    let _api = api_url.map(|url| sh.push_env("FILEDOCK_API_URL", url));

    // 使用 shell 执行以支持重定向
    let command = format!("cargo run -p filedock-tui 2>> '{}'", log_file);
    cmd!(sh, "bash -c {command}").run()?;

    println!();
    println!("📁 日志已保存到: {}", log_file);
    Ok(())
}

fn lint(sh: &Shell) -> Result<()> {
    println!("🔍 运行 clippy...");
    cmd!(sh, "cargo clippy --workspace --all-targets -- -D warnings").run()?;
    println!("✅ 检查通过");
    Ok(())
}

fn dist(sh: &Shell) -> Result<()> {
    println!("📦 打包发布...");

    build(sh)?;

    let version = env!("CARGO_PKG_VERSION");
    let dist_name = format!("filedock-{}-linux-x86_64", version);

    cmd!(sh, "mkdir -p dist/{dist_name}").run()?;
    cmd!(sh, "cp target/release/filedock dist/{dist_name}/").run()?;
    cmd!(sh, "cp target/release/filedock-tui dist/{dist_name}/").run()?;
    if sh.path_exists("README.md") {
        cmd!(sh, "cp README.md dist/{dist_name}/").run()?;
    }

    sh.change_dir("dist");
    cmd!(sh, "tar -czvf {dist_name}.tar.gz {dist_name}").run()?;

    println!("✅ 打包完成: dist/{}.tar.gz", dist_name);
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("🧪 运行测试...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("✅ 测试完成");
    Ok(())
}

fn coverage(sh: &Shell) -> Result<()> {
    println!("📊 运行测试覆盖率分析...");

    // 检查 cargo-tarpaulin 是否安装
    if cmd!(sh, "cargo tarpaulin --version").run().is_err() {
        println!("📦 安装 cargo-tarpaulin...");
        cmd!(sh, "cargo install cargo-tarpaulin").run()?;
    }

    println!("🔍 分析中...");
    cmd!(
        sh,
        "cargo tarpaulin --packages filedock-core --out Html --output-dir target/coverage"
    )
    .run()?;

    println!("✅ 覆盖率报告已生成");
    println!("   HTML 报告: target/coverage/tarpaulin-report.html");
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("🧹 清理构建产物...");
    cmd!(sh, "cargo clean").run()?;
    sh.remove_path("dist")?;
    println!("✅ 清理完成");
    Ok(())
}
