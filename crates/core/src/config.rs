use crate::process::RunOptions;
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_OUTPUT_DIR_NAME: &str = "result";
pub const DEFAULT_JPEG_QUALITY: u8 = 75;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("출력 폴더 이름이 올바르지 않습니다: {0:?}")]
    InvalidOutputDirName(String),
    #[error("JPEG 품질은 1~100 사이여야 합니다: {0}")]
    InvalidJpegQuality(u8),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct AppConfig {
    pub output_dir_name: String,
    pub jpeg_quality: u8,
    pub error_log: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_dir_name: DEFAULT_OUTPUT_DIR_NAME.to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            error_log: None,
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_output_dir_name(&self.output_dir_name)?;
        validate_jpeg_quality(self.jpeg_quality)
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            output_dir_name: self.output_dir_name.clone(),
            jpeg_quality: self.jpeg_quality,
        }
    }

    /// Configured error log, or the default one next to the config file.
    pub fn error_log_path(&self, paths: &AppPaths) -> PathBuf {
        self.error_log
            .clone()
            .unwrap_or_else(|| paths.error_log_path.clone())
    }
}

pub fn validate_output_dir_name(name: &str) -> Result<(), ConfigError> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(ConfigError::InvalidOutputDirName(name.to_string())),
    }
}

pub fn validate_jpeg_quality(quality: u8) -> Result<(), ConfigError> {
    if (1..=100).contains(&quality) {
        Ok(())
    } else {
        Err(ConfigError::InvalidJpegQuality(quality))
    }
}

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_dir: PathBuf,
    pub config_path: PathBuf,
    pub error_log_path: PathBuf,
}

pub fn app_paths() -> Result<AppPaths> {
    let proj = ProjectDirs::from("com", "photo-mirror", "photo-mirror")
        .context("OS 기본 설정 폴더를 찾을 수 없습니다")?;
    let config_dir = proj.config_dir().to_path_buf();
    Ok(AppPaths {
        config_path: config_dir.join("config.toml"),
        error_log_path: config_dir.join("error.log"),
        config_dir,
    })
}

pub fn load_config() -> Result<AppConfig> {
    let paths = app_paths()?;
    load_config_from(&paths.config_path)
}

pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("설정 파일을 읽을 수 없습니다: {}", path.display()))?;
    let config = toml::from_str::<AppConfig>(&raw).context("설정 파일 파싱에 실패했습니다")?;
    config.validate()?;
    Ok(config)
}

pub fn save_config(config: &AppConfig) -> Result<PathBuf> {
    let paths = app_paths()?;
    save_config_to(config, &paths.config_path)?;
    Ok(paths.config_path)
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    config.validate()?;
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("설정 폴더를 만들 수 없습니다: {}", dir.display()))?;
    }
    let body = toml::to_string_pretty(config).context("설정 직렬화에 실패했습니다")?;
    fs::write(path, body)
        .with_context(|| format!("설정 파일을 쓸 수 없습니다: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_config_file_yields_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config_from(&temp.path().join("config.toml")).expect("defaults");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.output_dir_name, "result");
    }

    #[test]
    fn partial_config_fills_remaining_defaults() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "jpeg_quality = 90\n").expect("write config");

        let config = load_config_from(&path).expect("parse");
        assert_eq!(config.jpeg_quality, 90);
        assert_eq!(config.output_dir_name, DEFAULT_OUTPUT_DIR_NAME);
        assert_eq!(config.error_log, None);
    }

    #[test]
    fn save_then_load_keeps_values() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("nested").join("config.toml");
        let config = AppConfig {
            output_dir_name: "renamed".to_string(),
            jpeg_quality: 60,
            error_log: Some(temp.path().join("errors.log")),
        };

        save_config_to(&config, &path).expect("save");
        assert_eq!(load_config_from(&path).expect("load"), config);
    }

    #[test]
    fn output_dir_name_must_be_a_single_component() {
        assert!(validate_output_dir_name("result").is_ok());
        for bad in ["", "a/b", "..", "/abs", "."] {
            assert_eq!(
                validate_output_dir_name(bad),
                Err(ConfigError::InvalidOutputDirName(bad.to_string()))
            );
        }
    }

    #[test]
    fn invalid_quality_is_rejected_on_load() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("config.toml");
        fs::write(&path, "jpeg_quality = 0\n").expect("write config");

        let err = load_config_from(&path).expect_err("must reject");
        assert!(err.to_string().contains("JPEG"));
    }
}
