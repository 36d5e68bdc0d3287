use crate::process::RunSummary;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc::Sender;

/// Checkpoints reported while a run walks the source tree.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StatusEvent {
    Started { total: usize },
    Skipped { path: PathBuf },
    NameKept { path: PathBuf },
    Converting { from: PathBuf, to: PathBuf },
    Converted { from: PathBuf, to: PathBuf },
    Copying { from: PathBuf, to: PathBuf },
    Copied { from: PathBuf, to: PathBuf },
    Failed { path: PathBuf, message: String },
    Finished { summary: RunSummary },
    Aborted { path: PathBuf, reason: String },
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Started { total } => write!(f, "총 {total}개의 파일 처리 예정..."),
            Self::Skipped { path } => {
                write!(f, "건너뜀: {} (지원하지 않는 형식)", file_label(path))
            }
            Self::NameKept { path } => {
                write!(f, "규칙에 맞지 않아 원본 파일명 유지: {}", file_label(path))
            }
            Self::Converting { from, to } => {
                write!(f, "변환 중: {} -> {}", file_label(from), file_label(to))
            }
            Self::Converted { from, to } => {
                write!(f, "변환 완료: {} -> {}", file_label(from), file_label(to))
            }
            Self::Copying { from, to } => {
                write!(f, "복사 중: {} -> {}", file_label(from), file_label(to))
            }
            Self::Copied { from, to } => {
                write!(f, "복사 완료: {} -> {}", file_label(from), file_label(to))
            }
            Self::Failed { path, message } => {
                write!(f, "오류 발생: {} - {}", file_label(path), message)
            }
            Self::Finished { summary } => write!(
                f,
                "모든 파일 처리 완료. (처리 {} / 전체 {}, 실패 {}, 건너뜀 {})",
                summary.processed, summary.total, summary.failed, summary.skipped
            ),
            Self::Aborted { path, reason } => write!(
                f,
                "오류: 처리를 시작할 수 없습니다: {} ({})",
                path.display(),
                reason
            ),
        }
    }
}

fn file_label(path: &std::path::Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

/// Receives progress and status notifications from a run.
pub trait RunObserver {
    fn on_progress(&mut self, _processed: usize, _total: usize) {}

    fn on_status(&mut self, _event: &StatusEvent) {}
}

impl RunObserver for () {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Progress { processed: usize, total: usize },
    Status(StatusEvent),
}

/// Forwards every notification into a channel. A dropped receiver is ignored
/// so the run still completes.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    sender: Sender<RunEvent>,
}

impl ChannelObserver {
    pub fn new(sender: Sender<RunEvent>) -> Self {
        Self { sender }
    }
}

impl RunObserver for ChannelObserver {
    fn on_progress(&mut self, processed: usize, total: usize) {
        let _ = self.sender.send(RunEvent::Progress { processed, total });
    }

    fn on_status(&mut self, event: &StatusEvent) {
        let _ = self.sender.send(RunEvent::Status(event.clone()));
    }
}
