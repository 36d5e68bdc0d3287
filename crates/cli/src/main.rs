mod logging;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use photo_mirror_core::{
    app_paths, compute_new_name, default_converter, load_config, plan_run, save_config,
    spawn_run, AppConfig, FileAction, RunEvent, RunOptions, RunPlan,
};
use std::path::{Path, PathBuf};

#[derive(Debug, Parser)]
#[command(name = "photo-mirror-cli")]
#[command(about = "카메라 사진/영상 파일명을 규칙에 따라 바꿔 result 폴더로 복사합니다")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Process(ProcessArgs),
    Rename(RenameArgs),
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
struct ProcessArgs {
    #[arg(long)]
    source: PathBuf,
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    output: OutputFormat,
    #[arg(long)]
    output_dir_name: Option<String>,
    #[arg(long)]
    jpeg_quality: Option<u8>,
    #[arg(long)]
    error_log: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct RenameArgs {
    #[arg(required = true)]
    names: Vec<String>,
}

#[derive(Debug, Args)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show,
    Init,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => cmd_process(args),
        Commands::Rename(args) => cmd_rename(args),
        Commands::Config(config) => match config.action {
            ConfigAction::Show => cmd_config_show(),
            ConfigAction::Init => cmd_config_init(),
        },
    }
}

fn cmd_process(args: ProcessArgs) -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    let error_log = args
        .error_log
        .clone()
        .unwrap_or_else(|| config.error_log_path(&paths));
    logging::init(&error_log)?;

    let mut options = config.run_options();
    if let Some(name) = args.output_dir_name {
        options.output_dir_name = name;
    }
    if let Some(quality) = args.jpeg_quality {
        options.jpeg_quality = quality;
    }
    options.validate()?;

    if args.dry_run {
        let plan = plan_run(&args.source, &options)?;
        match args.output {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&plan)?),
            OutputFormat::Table => print_plan(&plan),
        }
        let convertible = plan
            .records
            .iter()
            .filter(|record| record.action == FileAction::Convert)
            .count();
        if convertible > 0 && !default_converter(options.jpeg_quality).decodes_heif() {
            eprintln!(
                "경고: HEIC/HIF 파일 {convertible}개가 있지만 이 빌드에는 디코더가 없어 실제 실행이 거부됩니다. heif 기능을 켜고 다시 빌드하세요."
            );
        }
        eprintln!("dry-run 모드: 파일을 만들지 않았습니다. 실제로 처리하려면 --dry-run 없이 실행하세요.");
        return Ok(());
    }

    run_live(args.source, options, &error_log)
}

fn run_live(source: PathBuf, options: RunOptions, error_log: &Path) -> Result<()> {
    let handle = spawn_run(source, options)?;
    for event in handle.events.iter() {
        match event {
            RunEvent::Progress { processed, total } => eprintln!("[{processed}/{total}]"),
            RunEvent::Status(status) => println!("{status}"),
        }
    }

    let summary = handle.join()?;
    if !summary.completed {
        anyhow::bail!("처리를 시작하지 못했습니다: {}", summary.source_root.display());
    }
    if summary.failed > 0 {
        eprintln!(
            "{}개 파일에서 오류가 발생했습니다. 자세한 내용: {}",
            summary.failed,
            error_log.display()
        );
    }
    Ok(())
}

fn cmd_rename(args: RenameArgs) -> Result<()> {
    for name in &args.names {
        println!("{} -> {}", name, compute_new_name(name));
    }
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config = load_config()?;
    let paths = app_paths()?;
    println!("설정 파일: {}", paths.config_path.display());
    println!("오류 로그: {}", config.error_log_path(&paths).display());
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_config_init() -> Result<()> {
    let paths = app_paths()?;
    if paths.config_path.exists() {
        anyhow::bail!("설정 파일이 이미 있습니다: {}", paths.config_path.display());
    }
    let path = save_config(&AppConfig::default())?;
    println!("기본 설정을 저장했습니다: {}", path.display());
    Ok(())
}

fn print_plan(plan: &RunPlan) {
    println!("원본 파일 -> 새 파일 (동작)");
    for record in &plan.records {
        let action = match record.action {
            FileAction::Copy => "copy",
            FileAction::Convert => "convert",
        };
        println!(
            "{} -> {} ({})",
            record.original_path.display(),
            record.target_path.display(),
            action
        );
    }
    for issue in &plan.issues {
        println!("오류: {} - {}", issue.path.display(), issue.message);
    }

    println!(
        "\n집계: total={} planned={} skipped={} issues={} output={}",
        plan.total,
        plan.records.len(),
        plan.skipped.len(),
        plan.issues.len(),
        plan.output_root.display()
    );
}
