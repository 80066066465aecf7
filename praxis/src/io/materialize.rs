//! Write a parsed refiner artifact into a workspace.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::artifact::{FolderEntry, RefinedArtifact};
use crate::core::naming::is_safe_component;

/// What one materialization did. Warnings and per-item failures never abort
/// the walk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MaterializeReport {
    pub project_root: PathBuf,
    pub directories: Vec<PathBuf>,
    pub files: Vec<PathBuf>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

/// Create `<root>/<project>` and walk the declared folder tree beneath it.
///
/// Only failing to create the project root is an error.
pub fn materialize(root: &Path, objective: &str, artifact: &RefinedArtifact) -> Result<MaterializeReport> {
    let project_root = root.join(artifact.project_dir_name(objective));
    fs::create_dir_all(&project_root)
        .with_context(|| format!("create project folder {}", project_root.display()))?;
    info!(path = %project_root.display(), "created project folder");

    let mut report = MaterializeReport {
        project_root: project_root.clone(),
        ..MaterializeReport::default()
    };
    for warning in &artifact.warnings {
        warn!(warning = %warning, "refiner output");
        report.warnings.push(warning.clone());
    }
    walk(&project_root, &artifact.folder_structure, artifact, &mut report);
    Ok(report)
}

fn walk(dir: &Path, entries: &BTreeMap<String, FolderEntry>, artifact: &RefinedArtifact, report: &mut MaterializeReport) {
    for (name, entry) in entries {
        if !is_safe_component(name) {
            let message = format!("skipping unsafe entry name `{name}` under {}", dir.display());
            warn!("{message}");
            report.warnings.push(message);
            continue;
        }
        let path = dir.join(name);
        match entry {
            FolderEntry::Directory(children) => match fs::create_dir_all(&path) {
                Ok(()) => {
                    info!(path = %path.display(), "created folder");
                    report.directories.push(path.clone());
                    walk(&path, children, artifact, report);
                }
                Err(err) => {
                    let message = format!("create folder {}: {err}", path.display());
                    warn!("{message}");
                    report.errors.push(message);
                }
            },
            FolderEntry::File => match artifact.code_for(name) {
                Some(code) => match fs::write(&path, code) {
                    Ok(()) => {
                        info!(path = %path.display(), "created file");
                        report.files.push(path);
                    }
                    Err(err) => {
                        let message = format!("write file {}: {err}", path.display());
                        warn!("{message}");
                        report.errors.push(message);
                    }
                },
                None => {
                    let message = format!("code content not found for file `{name}`");
                    warn!("{message}");
                    report.warnings.push(message);
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::parse_refined_output;

    #[test]
    fn nested_file_lands_under_project() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = parse_refined_output(
            "Project Name: P\n<folder_structure>{\"a\": {\"b.txt\": null}}</folder_structure>\nFilename: b.txt\n```\nhello\n```",
        );
        let report = materialize(temp.path(), "objective", &artifact).expect("materialize");

        let file = temp.path().join("P").join("a").join("b.txt");
        assert_eq!(fs::read_to_string(&file).expect("read"), "hello");
        assert_eq!(report.files, vec![file]);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn malformed_structure_only_creates_project_root() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = parse_refined_output("Project Name: P\n<folder_structure>{oops</folder_structure>");
        let report = materialize(temp.path(), "objective", &artifact).expect("materialize");

        let project = temp.path().join("P");
        assert!(project.is_dir());
        assert_eq!(fs::read_dir(&project).expect("read dir").count(), 0);
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn file_without_code_is_skipped_with_warning() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = parse_refined_output(
            "Project Name: P\n<folder_structure>{\"main.rs\": null, \"lib.rs\": null}</folder_structure>\nFilename: lib.rs\n```rust\npub fn x() {}\n```",
        );
        let report = materialize(temp.path(), "objective", &artifact).expect("materialize");

        assert!(!temp.path().join("P/main.rs").exists());
        assert!(temp.path().join("P/lib.rs").is_file());
        assert_eq!(
            report.warnings,
            vec!["code content not found for file `main.rs`".to_string()]
        );
    }

    #[test]
    fn traversal_keys_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = parse_refined_output(
            "Project Name: P\n<folder_structure>{\"..\": {\"x.txt\": null}, \"ok\": {}}</folder_structure>\nFilename: x.txt\n```\nx\n```",
        );
        let report = materialize(temp.path(), "objective", &artifact).expect("materialize");

        assert!(!temp.path().join("x.txt").exists());
        assert!(temp.path().join("P/ok").is_dir());
        assert_eq!(report.warnings.len(), 1);
        assert!(report.warnings[0].contains("unsafe entry name `..`"));
    }

    #[test]
    fn per_item_failure_does_not_stop_siblings() {
        let temp = tempfile::tempdir().expect("tempdir");
        let project = temp.path().join("P");
        fs::create_dir_all(&project).expect("mkdir");
        // A plain file where a directory is declared blocks that branch only.
        fs::write(project.join("blocked"), "file").expect("write");
        let artifact = parse_refined_output(
            "Project Name: P\n<folder_structure>{\"blocked\": {\"a.txt\": null}, \"z.txt\": null}</folder_structure>\nFilename: a.txt\n```\na\n```\nFilename: z.txt\n```\nz\n```",
        );
        let report = materialize(temp.path(), "objective", &artifact).expect("materialize");

        assert_eq!(report.errors.len(), 1);
        assert_eq!(fs::read_to_string(project.join("z.txt")).expect("read"), "z");
    }

    #[test]
    fn missing_project_name_uses_objective() {
        let temp = tempfile::tempdir().expect("tempdir");
        let artifact = parse_refined_output("plain prose only");
        let report = materialize(temp.path(), "Make a CLI!", &artifact).expect("materialize");
        assert_eq!(report.project_root, temp.path().join("Make_a_CLI_"));
        assert!(report.project_root.is_dir());
    }
}
