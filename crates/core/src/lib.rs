mod config;
mod convert;
mod media;
mod observer;
mod planner;
mod process;
mod rules;

pub use config::{
    app_paths, load_config, load_config_from, save_config, save_config_to, AppConfig, AppPaths,
    ConfigError, DEFAULT_JPEG_QUALITY, DEFAULT_OUTPUT_DIR_NAME,
};
#[cfg(feature = "heif")]
pub use convert::HeifConverter;
pub use convert::{default_converter, ConvertError, ImageConverter, ImageCrateConverter};
pub use media::{
    is_allowed, FileAction, CONVERTIBLE_EXTENSIONS, CONVERTED_EXTENSION, IMAGE_EXTENSIONS,
    VIDEO_EXTENSIONS,
};
pub use observer::{ChannelObserver, RunEvent, RunObserver, StatusEvent};
pub use planner::{plan_run, FileRecord, PlanIssue, RunPlan};
pub use process::{run, run_with_converter, spawn_run, RunHandle, RunOptions, RunSummary};
pub use rules::{compute_new_name, correction_suffix, split_extension, CORRECTION_MARKER};
