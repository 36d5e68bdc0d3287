use crate::rules::split_extension;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const IMAGE_EXTENSIONS: &[&str] = &["cr3", "jpg", "jpeg", "png", "gif", "heic", "hif", "dng"];
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "wma", "mov"];
pub const CONVERTIBLE_EXTENSIONS: &[&str] = &["heic", "hif"];
pub const CONVERTED_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileAction {
    Copy,
    Convert,
}

/// Lower-cased extension without the dot, or an empty string.
pub fn lowered_extension(path: &Path) -> String {
    path.file_name()
        .map(|name| {
            let name = name.to_string_lossy();
            let (_, ext) = split_extension(&name);
            ext.trim_start_matches('.').to_lowercase()
        })
        .unwrap_or_default()
}

pub fn is_allowed(path: &Path) -> bool {
    let ext = lowered_extension(path);
    IMAGE_EXTENSIONS.contains(&ext.as_str()) || VIDEO_EXTENSIONS.contains(&ext.as_str())
}

pub fn action_for(path: &Path) -> FileAction {
    let ext = lowered_extension(path);
    if CONVERTIBLE_EXTENSIONS.contains(&ext.as_str()) {
        FileAction::Convert
    } else {
        FileAction::Copy
    }
}
