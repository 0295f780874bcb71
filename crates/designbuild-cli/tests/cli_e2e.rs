//! Drives the `designbuild` binary against scratch git repositories.

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

fn run_git(repo_dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo_dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// A committed repository with one public design function and no spec.
fn make_design_repo(config: Option<&str>) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    run_git(dir.path(), &["init", "-q", "-b", "main"]);
    run_git(dir.path(), &["config", "user.name", "test-user"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    fs::create_dir_all(dir.path().join("src")).unwrap();
    fs::write(
        dir.path().join("src/area.rs"),
        "/// Area of a square.\npub fn area(side: u32) -> u32 {\n    side * side\n}\n",
    )
    .unwrap();
    if let Some(config) = config {
        fs::write(dir.path().join("designbuild.toml"), config).unwrap();
    }
    run_git(dir.path(), &["add", "-A"]);
    run_git(dir.path(), &["commit", "-q", "-m", "initial"]);
    dir
}

fn designbuild(repo: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_designbuild"))
        .args(args)
        .current_dir(repo)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn build_reports_missing_spec_and_completes() {
    let repo = make_design_repo(None);

    let output = designbuild(repo.path(), &["build", "--steps", "spec_presence"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("no spec found for module: src/area.rs"), "{out}");
    assert!(out.contains("1 nonconformities"), "{out}");
}

#[test]
fn strict_build_exits_with_distinct_code() {
    let repo = make_design_repo(None);

    let output = designbuild(repo.path(), &["build", "--steps", "spec_presence", "--strict"]);

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn fail_fast_build_exits_with_failure() {
    let repo = make_design_repo(None);

    let output = designbuild(
        repo.path(),
        &["build", "--steps", "spec_presence", "--fail-fast"],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stdout(&output).contains("Build aborted"));
}

#[test]
fn metabuild_commits_pending_work_and_builds_in_isolation() {
    let repo = make_design_repo(Some("[build]\nsteps = [\"spec_presence\"]\n"));
    fs::write(
        repo.path().join("src/volume.rs"),
        "/// Volume of a cube.\npub fn volume(side: u32) -> u32 {\n    side * side * side\n}\n",
    )
    .unwrap();

    let output = designbuild(repo.path(), &["metabuild", "-m", "wip"]);

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let out = stdout(&output);
    assert!(out.contains("Pending work committed"), "{out}");
    assert!(out.contains("Total nonconformities: 2"), "{out}");

    assert_eq!(run_git(repo.path(), &["log", "-1", "--format=%s"]), "wip");
    assert_eq!(run_git(repo.path(), &["status", "--porcelain"]), "");
    let isolated: Vec<_> = fs::read_dir(repo.path().join("tmp/isolated"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    assert_eq!(isolated.len(), 1);
    assert!(isolated[0]
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("main-"));
    assert!(isolated[0].join("src/volume.rs").is_file());
    assert!(!run_git(repo.path(), &["for-each-ref", "refs/designbuild/rescue"]).is_empty());
}

#[test]
fn failed_metabuild_rolls_back_and_keeps_pending_edits() {
    let config = "[build]\nsteps = [\"type_check\"]\n\n\
                  [checks.commands]\ntype_check = [\"/nonexistent/designbuild-checker\", \"{path}\"]\n";
    let repo = make_design_repo(Some(config));
    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);
    let edited = "/// Area of a square.\npub fn area(side: u64) -> u64 {\n    side * side\n}\n";
    fs::write(repo.path().join("src/area.rs"), edited).unwrap();

    let output = designbuild(repo.path(), &["metabuild", "-m", "wip"]);

    assert_eq!(output.status.code(), Some(1));
    let err = String::from_utf8_lossy(&output.stderr);
    assert!(err.contains("designbuild-checker"), "{err}");

    assert_eq!(run_git(repo.path(), &["rev-parse", "HEAD"]), head);
    assert_eq!(
        run_git(repo.path(), &["symbolic-ref", "HEAD"]),
        "refs/heads/main"
    );
    assert_eq!(
        fs::read_to_string(repo.path().join("src/area.rs")).unwrap(),
        edited
    );
}

#[test]
fn snapshot_then_rollback_restores_head() {
    let repo = make_design_repo(None);
    let scratch = tempfile::tempdir().unwrap();
    let snapshot = scratch.path().join("snapshot.json");
    let head = run_git(repo.path(), &["rev-parse", "HEAD"]);

    let output = designbuild(
        repo.path(),
        &["snapshot", "--output", snapshot.to_str().unwrap()],
    );
    assert!(output.status.success());

    fs::write(repo.path().join("src/extra.rs"), "fn extra() {}\n").unwrap();
    let output = designbuild(repo.path(), &["auto-commit", "-m", "extra"]);
    assert!(output.status.success());
    assert_ne!(run_git(repo.path(), &["rev-parse", "HEAD"]), head);

    let output = designbuild(
        repo.path(),
        &["rollback", snapshot.to_str().unwrap()],
    );
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    assert_eq!(run_git(repo.path(), &["rev-parse", "HEAD"]), head);
    assert!(!repo.path().join("src/extra.rs").exists());
}

#[test]
fn cms_purge_without_registrations_is_a_noop() {
    let repo = make_design_repo(None);

    let output = designbuild(repo.path(), &["cms", "purge"]);

    assert!(output.status.success());
    assert!(stdout(&output).contains("Purged 0 expired registrations"));
}

#[test]
fn worker_is_hidden_from_help() {
    let repo = make_design_repo(None);

    let output = designbuild(repo.path(), &["--help"]);

    let help = stdout(&output);
    assert!(help.contains("metabuild"));
    assert!(!help.contains("worker"));
}
