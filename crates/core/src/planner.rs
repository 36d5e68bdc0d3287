use crate::media::{action_for, is_allowed, lowered_extension, FileAction, CONVERTED_EXTENSION};
use crate::process::RunOptions;
use crate::rules::{compute_new_name, split_extension};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::{DirEntry, WalkDir};

/// Where one source file ends up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FileRecord {
    pub original_path: PathBuf,
    pub new_base_name: String,
    pub extension: String,
    pub final_name: String,
    pub target_path: PathBuf,
    pub action: FileAction,
    pub renamed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlanIssue {
    pub path: PathBuf,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunPlan {
    pub source_root: PathBuf,
    pub output_root: PathBuf,
    pub total: usize,
    pub records: Vec<FileRecord>,
    pub skipped: Vec<PathBuf>,
    pub issues: Vec<PlanIssue>,
}

/// Computes every destination a run would produce without touching the
/// filesystem. Names are reserved as they are planned, so files that collide
/// with each other get distinct counters just like in a live run.
pub fn plan_run(source_root: &Path, options: &RunOptions) -> Result<RunPlan> {
    options.validate()?;
    if !source_root.is_dir() {
        bail!("소스 폴더가 존재하지 않습니다: {}", source_root.display());
    }

    let output_root = output_root_for(source_root, &options.output_dir_name);
    let mut plan = RunPlan {
        source_root: source_root.to_path_buf(),
        output_root: output_root.clone(),
        total: 0,
        records: Vec::new(),
        skipped: Vec::new(),
        issues: Vec::new(),
    };
    let mut reserved = HashSet::<PathBuf>::new();

    for entry in source_entries(source_root, &output_root) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let path = walk_error_path(&err, source_root);
                let err = anyhow::Error::from(err).context("폴더 탐색에 실패했습니다");
                plan.issues.push(PlanIssue {
                    path,
                    message: format!("{err:#}"),
                });
                continue;
            }
        };
        let path = entry.path();
        if path.is_dir() {
            continue;
        }
        if !is_allowed(path) {
            plan.skipped.push(path.to_path_buf());
            continue;
        }

        plan.total += 1;
        let dest_dir = mirror_dir(source_root, &output_root, parent_of(path));
        match plan_record(path, &dest_dir, &reserved) {
            Ok(record) => {
                reserved.insert(record.target_path.clone());
                plan.records.push(record);
            }
            Err(err) => plan.issues.push(PlanIssue {
                path: path.to_path_buf(),
                message: format!("{err:#}"),
            }),
        }
    }

    Ok(plan)
}

pub(crate) fn output_root_for(source_root: &Path, output_dir_name: &str) -> PathBuf {
    source_root.join(output_dir_name)
}

/// Sorted walk of the source tree that never descends into the output root.
pub(crate) fn source_entries(
    source_root: &Path,
    output_root: &Path,
) -> impl Iterator<Item = walkdir::Result<DirEntry>> {
    let output_root = output_root.to_path_buf();
    WalkDir::new(source_root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(move |entry| entry.path() != output_root.as_path())
}

/// Path a walk error refers to, falling back to the root being walked.
pub(crate) fn walk_error_path(err: &walkdir::Error, source_root: &Path) -> PathBuf {
    err.path()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| source_root.to_path_buf())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct EligibleCount {
    pub total: usize,
    pub convertible: usize,
}

pub(crate) fn count_eligible(source_root: &Path, output_root: &Path) -> EligibleCount {
    let mut count = EligibleCount::default();
    for entry in source_entries(source_root, output_root).flatten() {
        let path = entry.path();
        if path.is_dir() || !is_allowed(path) {
            continue;
        }
        count.total += 1;
        if action_for(path) == FileAction::Convert {
            count.convertible += 1;
        }
    }
    count
}

pub(crate) fn mirror_dir(source_root: &Path, output_root: &Path, dir: &Path) -> PathBuf {
    match dir.strip_prefix(source_root) {
        Ok(relative) => output_root.join(relative),
        Err(_) => output_root.to_path_buf(),
    }
}

pub(crate) fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

pub(crate) fn plan_record(
    source: &Path,
    dest_dir: &Path,
    reserved: &HashSet<PathBuf>,
) -> Result<FileRecord> {
    let original_name = source
        .file_name()
        .with_context(|| format!("파일명을 가져올 수 없습니다: {}", source.display()))?;
    let action = action_for(source);

    // Rules only ever match UTF-8 names; anything else keeps its raw name.
    let (base, ext, renamed): (OsString, OsString, bool) = match original_name.to_str() {
        Some(name) => {
            let new_name = compute_new_name(name);
            let (base, ext) = split_extension(&new_name);
            (base.into(), ext.into(), new_name != name)
        }
        None => {
            let (base, ext) = split_os_extension(original_name);
            (base.to_os_string(), ext, false)
        }
    };
    let out_ext = match action {
        FileAction::Convert => OsString::from(format!(".{CONVERTED_EXTENSION}")),
        FileAction::Copy => ext,
    };

    let final_name = resolve_collision(dest_dir, &base, &out_ext, reserved);
    Ok(FileRecord {
        original_path: source.to_path_buf(),
        new_base_name: base.to_string_lossy().into_owned(),
        extension: lowered_extension(source),
        target_path: dest_dir.join(&final_name),
        final_name: final_name.to_string_lossy().into_owned(),
        action,
        renamed,
    })
}

/// `split_extension` for names that are not valid UTF-8. The extension keeps
/// its leading dot.
fn split_os_extension(name: &OsStr) -> (&OsStr, OsString) {
    let path = Path::new(name);
    match (path.file_stem(), path.extension()) {
        (Some(stem), Some(ext)) => {
            let mut dotted = OsString::from(".");
            dotted.push(ext);
            (stem, dotted)
        }
        _ => (name, OsString::new()),
    }
}

/// First free name among `base.ext`, `base1.ext`, `base2.ext`, ...
pub(crate) fn resolve_collision(
    dest_dir: &Path,
    base: &OsStr,
    extension: &OsStr,
    reserved: &HashSet<PathBuf>,
) -> OsString {
    let candidate = |counter: Option<usize>| {
        let mut name = base.to_os_string();
        if let Some(n) = counter {
            name.push(n.to_string());
        }
        name.push(extension);
        name
    };

    let mut name = candidate(None);
    let mut n = 1usize;
    while is_taken(&dest_dir.join(&name), reserved) {
        name = candidate(Some(n));
        n += 1;
    }
    name
}

fn is_taken(candidate: &Path, reserved: &HashSet<PathBuf>) -> bool {
    reserved.contains(candidate) || fs::symlink_metadata(candidate).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("parent dirs must be creatable");
        }
        File::create(path).expect("file must be creatable");
    }

    #[test]
    fn resolve_collision_counts_up_from_one() {
        let temp = tempdir().expect("tempdir");
        let none = HashSet::new();
        assert_eq!(
            resolve_collision(temp.path(), OsStr::new("IMG_0813"), OsStr::new(".jpg"), &none),
            "IMG_0813.jpg"
        );

        touch(&temp.path().join("IMG_0813.jpg"));
        assert_eq!(
            resolve_collision(temp.path(), OsStr::new("IMG_0813"), OsStr::new(".jpg"), &none),
            "IMG_08131.jpg"
        );

        touch(&temp.path().join("IMG_08131.jpg"));
        assert_eq!(
            resolve_collision(temp.path(), OsStr::new("IMG_0813"), OsStr::new(".jpg"), &none),
            "IMG_08132.jpg"
        );
    }

    #[test]
    fn resolve_collision_honours_reserved_names() {
        let temp = tempdir().expect("tempdir");
        let reserved: HashSet<PathBuf> = [temp.path().join("clip.MOV")].into_iter().collect();
        assert_eq!(
            resolve_collision(temp.path(), OsStr::new("clip"), OsStr::new(".MOV"), &reserved),
            "clip1.MOV"
        );
    }

    #[test]
    fn plan_record_forces_jpg_for_heif_sources() {
        let temp = tempdir().expect("tempdir");
        let source = temp.path().join("0R2A0001_보정.HEIC");
        let record =
            plan_record(&source, &temp.path().join("out"), &HashSet::new()).expect("record");

        assert_eq!(record.new_base_name, "IMG_00011");
        assert_eq!(record.extension, "heic");
        assert_eq!(record.final_name, "IMG_00011.jpg");
        assert_eq!(record.action, FileAction::Convert);
        assert!(record.renamed);
    }

    #[test]
    fn plan_record_keeps_unmatched_name_and_case() {
        let temp = tempdir().expect("tempdir");
        let record = plan_record(&temp.path().join("Holiday.MOV"), temp.path(), &HashSet::new())
            .expect("record");
        assert_eq!(record.final_name, "Holiday.MOV");
        assert_eq!(record.extension, "mov");
        assert!(!record.renamed);
    }

    #[test]
    fn plan_run_mirrors_tree_and_resolves_batch_collisions() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        touch(&root.join("0R2A0813.JPG"));
        touch(&root.join("IMGP0813.jpg"));
        touch(&root.join("day2").join("Law_231009_5019_보정1.jpeg"));
        touch(&root.join("readme.txt"));
        touch(&root.join("result").join("stale.jpg"));

        let plan = plan_run(root, &RunOptions::default()).expect("plan");
        let targets: Vec<PathBuf> = plan.records.iter().map(|r| r.target_path.clone()).collect();

        assert_eq!(plan.total, 3);
        assert_eq!(
            targets,
            vec![
                root.join("result").join("IMG_0813.jpg"),
                root.join("result").join("IMG_08131.jpg"),
                root.join("result").join("day2").join("IMG_50192.jpeg"),
            ]
        );
        assert_eq!(plan.skipped, vec![root.join("readme.txt")]);
        assert!(plan.issues.is_empty());
        assert!(!root.join("result").join("day2").exists());
    }

    #[test]
    fn plan_run_rejects_missing_source() {
        let temp = tempdir().expect("tempdir");
        let err = plan_run(&temp.path().join("missing"), &RunOptions::default())
            .expect_err("must fail");
        assert!(err.to_string().contains("소스 폴더가 존재하지 않습니다"));
    }

    #[test]
    fn count_eligible_skips_output_subtree() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        touch(&root.join("a.jpg"));
        touch(&root.join("nested").join("b.MP4"));
        touch(&root.join("nested").join("c.doc"));
        touch(&root.join("result").join("a.jpg"));
        touch(&root.join("result").join("deep").join("b.mp4"));

        touch(&root.join("nested").join("d.HIF"));

        assert_eq!(
            count_eligible(root, &root.join("result")),
            EligibleCount {
                total: 3,
                convertible: 1
            }
        );
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn plan_record_keeps_non_utf8_names_verbatim() {
        use std::os::unix::ffi::OsStrExt;

        let temp = tempdir().expect("tempdir");
        let name = OsStr::from_bytes(b"caf\xe9.JPG");
        touch(&temp.path().join(name));

        let record =
            plan_record(&temp.path().join(name), temp.path(), &HashSet::new()).expect("record");
        let mut expected = OsString::from(OsStr::from_bytes(b"caf\xe9"));
        expected.push("1.JPG");

        assert_eq!(record.target_path, temp.path().join(expected));
        assert_eq!(record.extension, "jpg");
        assert_eq!(record.action, FileAction::Copy);
        assert!(!record.renamed);
    }

    #[test]
    fn split_os_extension_keeps_the_dot() {
        assert_eq!(
            split_os_extension(OsStr::new("clip.MOV")),
            (OsStr::new("clip"), OsString::from(".MOV"))
        );
        assert_eq!(
            split_os_extension(OsStr::new("noext")),
            (OsStr::new("noext"), OsString::new())
        );
    }

    #[cfg(unix)]
    #[test]
    fn plan_run_records_unreadable_directories_and_keeps_going() {
        use std::os::unix::fs::PermissionsExt;

        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        let locked = root.join("locked");
        touch(&locked.join("0R2A0001.JPG"));
        touch(&root.join("0R2A0002.JPG"));
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).expect("lock dir");

        // Privileged users read through the mode bits; nothing to observe then.
        if fs::read_dir(&locked).is_ok() {
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock");
            return;
        }

        let plan = plan_run(root, &RunOptions::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).expect("unlock");
        let plan = plan.expect("walk errors must not abort the plan");

        assert_eq!(plan.issues.len(), 1);
        assert_eq!(plan.issues[0].path, locked);
        assert!(plan.issues[0].message.contains("폴더 탐색에 실패했습니다"));
        assert_eq!(
            plan.records
                .iter()
                .map(|r| r.final_name.as_str())
                .collect::<Vec<_>>(),
            vec!["IMG_0002.jpg"]
        );
    }
}
