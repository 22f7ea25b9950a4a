use clap::Parser;
use colored::Colorize;
use secchecker_build::{BuildRequest, DockerBuildService, ScanError, ScanPipeline};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "secchecker")]
#[command(version, about = "Goのソースツリーを gosec / govulncheck / safesql でスキャンするイメージをビルド", long_about = None)]
struct Cli {
    /// Goファイルを含むディレクトリのパス
    #[arg(long, env = "SECCHECKER_PATH", default_value = ".")]
    path: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // stdoutはビルドログ専用なので、ログはstderrに出力
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|e| anyhow::anyhow!("ロガーの初期化に失敗しました: {}", e))?;

    match run(cli).await {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            tracing::error!(stage = e.stage(), "{}", e);
            eprintln!("{} {}", "✗".red().bold(), e.user_message());
            Ok(ExitCode::FAILURE)
        }
    }
}

async fn run(cli: Cli) -> Result<(), ScanError> {
    tracing::info!("Scanning {}", cli.path.display());

    let service = DockerBuildService::connect().map_err(ScanError::ClientInit)?;
    let pipeline = ScanPipeline::new(service, BuildRequest::default());

    let mut stdout = tokio::io::stdout();
    let report = pipeline.run(&cli.path, &mut stdout).await?;

    tracing::debug!(
        files = report.included.len(),
        context_bytes = report.context_bytes,
        log_bytes = report.log_bytes,
        "Scan image build finished"
    );
    Ok(())
}
