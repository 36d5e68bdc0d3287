use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::Path;
use std::sync::Mutex;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

const DEFAULT_FILTER: &str = "photo_mirror_core=info,photo_mirror_cli=info";

/// Console output filtered by `RUST_LOG`, plus an append-only file that only
/// ever receives ERROR events.
pub fn init(error_log: &Path) -> Result<()> {
    if let Some(dir) = error_log.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)
            .with_context(|| format!("로그 폴더를 만들 수 없습니다: {}", dir.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(error_log)
        .with_context(|| format!("오류 로그를 열 수 없습니다: {}", error_log.display()))?;

    let console = fmt::layer().with_writer(std::io::stderr).with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
    );
    let error_file = fmt::layer()
        .with_ansi(false)
        .with_target(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::ERROR);

    tracing_subscriber::registry()
        .with(console)
        .with(error_file)
        .try_init()
        .context("로거 초기화에 실패했습니다")?;
    Ok(())
}
