use crate::config::{
    validate_jpeg_quality, validate_output_dir_name, DEFAULT_JPEG_QUALITY,
    DEFAULT_OUTPUT_DIR_NAME,
};
use crate::convert::{default_converter, ImageConverter};
use crate::media::{is_allowed, FileAction};
use crate::observer::{ChannelObserver, RunEvent, RunObserver, StatusEvent};
use crate::planner::{
    count_eligible, mirror_dir, output_root_for, parent_of, plan_record, source_entries,
    walk_error_path, FileRecord,
};
use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::thread::{self, JoinHandle};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunOptions {
    pub output_dir_name: String,
    pub jpeg_quality: u8,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            output_dir_name: DEFAULT_OUTPUT_DIR_NAME.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl RunOptions {
    pub fn validate(&self) -> Result<()> {
        validate_output_dir_name(&self.output_dir_name)?;
        validate_jpeg_quality(self.jpeg_quality)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunSummary {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub total: usize,
    pub processed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub completed: bool,
}

/// Copies every allow-listed file under `source_root` into the mirrored
/// output root, renamed by the rule engine.
///
/// Never fails as a whole: a bad source root is reported through the
/// observer and returns an incomplete summary, and per-file failures are
/// logged and counted while the walk carries on.
pub fn run(
    source_root: &Path,
    options: &RunOptions,
    observer: &mut dyn RunObserver,
) -> RunSummary {
    let converter = default_converter(options.jpeg_quality);
    run_with_converter(source_root, options, converter.as_ref(), observer)
}

pub fn run_with_converter(
    source_root: &Path,
    options: &RunOptions,
    converter: &dyn ImageConverter,
    observer: &mut dyn RunObserver,
) -> RunSummary {
    let output_root = output_root_for(source_root, &options.output_dir_name);
    let mut summary = RunSummary {
        source_root: source_root.to_path_buf(),
        output_root: output_root.clone(),
        ..RunSummary::default()
    };

    summary.total = match prepare_output_root(source_root, &output_root, options, converter) {
        Ok(total) => total,
        Err(err) => {
            let reason = format!("{err:#}");
            error!(path = %source_root.display(), "처리를 시작할 수 없습니다: {reason}");
            observer.on_status(&StatusEvent::Aborted {
                path: source_root.to_path_buf(),
                reason,
            });
            return summary;
        }
    };
    info!(
        source = %source_root.display(),
        output = %output_root.display(),
        total = summary.total,
        "run started"
    );
    observer.on_status(&StatusEvent::Started {
        total: summary.total,
    });

    for entry in source_entries(source_root, &output_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = walk_error_path(&err, source_root);
                let err = anyhow::Error::from(err).context("폴더 탐색에 실패했습니다");
                report_failure(observer, &path, &err);
                continue;
            }
        };

        let path = entry.path();
        if path.is_dir() {
            let mirrored = mirror_dir(source_root, &output_root, path);
            if let Err(err) = fs::create_dir_all(&mirrored) {
                let err = anyhow::Error::from(err)
                    .context(format!("출력 폴더를 만들 수 없습니다: {}", mirrored.display()));
                report_failure(observer, path, &err);
            }
            continue;
        }

        if !is_allowed(path) {
            warn!(path = %path.display(), "지원하지 않는 파일 형식 (건너뜀)");
            summary.skipped += 1;
            observer.on_status(&StatusEvent::Skipped {
                path: path.to_path_buf(),
            });
            continue;
        }

        let dest_dir = mirror_dir(source_root, &output_root, parent_of(path));
        match process_file(path, &dest_dir, converter, observer) {
            Ok(record) => {
                debug!(
                    from = %record.original_path.display(),
                    to = %record.target_path.display(),
                    "file written"
                );
                summary.processed += 1;
                observer.on_progress(summary.processed, summary.total);
            }
            Err(err) => {
                summary.failed += 1;
                report_failure(observer, path, &err);
            }
        }
    }

    summary.completed = true;
    info!(
        processed = summary.processed,
        failed = summary.failed,
        skipped = summary.skipped,
        "run finished"
    );
    observer.on_status(&StatusEvent::Finished {
        summary: summary.clone(),
    });
    summary
}

/// Checks everything that would make the run pointless, then creates the
/// output root. Returns the number of eligible files.
fn prepare_output_root(
    source_root: &Path,
    output_root: &Path,
    options: &RunOptions,
    converter: &dyn ImageConverter,
) -> Result<usize> {
    options.validate()?;
    if !source_root.is_dir() {
        bail!("소스 폴더가 존재하지 않거나 폴더가 아닙니다");
    }
    let count = count_eligible(source_root, output_root);
    if count.convertible > 0 && !converter.decodes_heif() {
        bail!(
            "HEIC/HIF 파일 {}개를 변환할 디코더가 없습니다 (heif 기능을 켜고 다시 빌드하세요)",
            count.convertible
        );
    }
    fs::create_dir_all(output_root)
        .with_context(|| format!("출력 폴더를 만들 수 없습니다: {}", output_root.display()))?;
    Ok(count.total)
}

fn process_file(
    source: &Path,
    dest_dir: &Path,
    converter: &dyn ImageConverter,
    observer: &mut dyn RunObserver,
) -> Result<FileRecord> {
    // Live runs resolve against the destination directory only.
    let record = plan_record(source, dest_dir, &HashSet::new())?;
    if !record.renamed {
        observer.on_status(&StatusEvent::NameKept {
            path: source.to_path_buf(),
        });
    }

    let from = record.original_path.clone();
    let to = record.target_path.clone();
    match record.action {
        FileAction::Convert => {
            observer.on_status(&StatusEvent::Converting {
                from: from.clone(),
                to: to.clone(),
            });
            let bytes = converter.convert_to_jpeg(source)?;
            write_new_file(&to, &bytes)?;
            observer.on_status(&StatusEvent::Converted { from, to });
        }
        FileAction::Copy => {
            observer.on_status(&StatusEvent::Copying {
                from: from.clone(),
                to: to.clone(),
            });
            copy_file(source, &to)?;
            observer.on_status(&StatusEvent::Copied { from, to });
        }
    }

    Ok(record)
}

fn report_failure(observer: &mut dyn RunObserver, path: &Path, err: &anyhow::Error) {
    let message = format!("{err:#}");
    error!(path = %path.display(), "파일 처리 중 오류 발생: {message}");
    observer.on_status(&StatusEvent::Failed {
        path: path.to_path_buf(),
        message,
    });
}

fn create_new(target: &Path) -> Result<File> {
    File::options()
        .write(true)
        .create_new(true)
        .open(target)
        .with_context(|| format!("대상 파일을 만들 수 없습니다: {}", target.display()))
}

fn write_new_file(target: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = create_new(target)?;
    if let Err(err) = file.write_all(bytes) {
        drop(file);
        let _ = fs::remove_file(target);
        return Err(anyhow::Error::from(err)
            .context(format!("변환 결과를 쓸 수 없습니다: {}", target.display())));
    }
    Ok(())
}

/// Byte copy that keeps the source permissions and modification time.
fn copy_file(source: &Path, target: &Path) -> Result<()> {
    let mut reader = File::open(source)
        .with_context(|| format!("원본 파일을 열 수 없습니다: {}", source.display()))?;
    let metadata = reader
        .metadata()
        .with_context(|| format!("원본 정보를 읽을 수 없습니다: {}", source.display()))?;

    let mut writer = create_new(target)?;
    if let Err(err) = io::copy(&mut reader, &mut writer) {
        drop(writer);
        let _ = fs::remove_file(target);
        return Err(anyhow::Error::from(err).context(format!(
            "복사에 실패했습니다: {} -> {}",
            source.display(),
            target.display()
        )));
    }

    if let Ok(modified) = metadata.modified() {
        if let Err(err) = writer.set_modified(modified) {
            warn!(path = %target.display(), "수정 시각을 복원하지 못했습니다: {err}");
        }
    }
    if let Err(err) = writer.set_permissions(metadata.permissions()) {
        warn!(path = %target.display(), "권한을 복원하지 못했습니다: {err}");
    }
    Ok(())
}

pub struct RunHandle {
    pub events: Receiver<RunEvent>,
    worker: JoinHandle<RunSummary>,
}

impl RunHandle {
    /// Waits for the worker and returns its summary. The event channel is
    /// unbounded, so this returns once the run ends whether or not `events`
    /// was drained. Undrained events are dropped with the handle.
    pub fn join(self) -> Result<RunSummary> {
        self.worker
            .join()
            .map_err(|_| anyhow!("작업 스레드가 비정상 종료했습니다"))
    }
}

/// Starts a run on its own worker thread so a front-end can keep handling
/// input while progress arrives on `RunHandle::events`.
pub fn spawn_run(source_root: PathBuf, options: RunOptions) -> Result<RunHandle> {
    let (sender, events) = channel();
    let worker = thread::Builder::new()
        .name("photo-mirror-worker".to_string())
        .spawn(move || {
            let mut observer = ChannelObserver::new(sender);
            run(&source_root, &options, &mut observer)
        })
        .context("작업 스레드를 시작할 수 없습니다")?;
    Ok(RunHandle { events, worker })
}
