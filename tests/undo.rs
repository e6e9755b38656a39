use std::{fs, path::Path, process::Command as StdCommand};

use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn undo_reverses_branch_create() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/oops"])
        .current_dir(repo.path())
        .assert()
        .success();
    run_git(repo.path(), &["checkout", "main"]);

    pk_cmd()
        .args(["undo"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("Reversed"));

    assert!(!branch_exists(repo.path(), "feature/oops"));
    assert!(branch_entry(&read_stacks(repo.path()), "feature/oops").is_none());
}

#[test]
fn redo_reapplies_the_undone_operation() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/back"])
        .current_dir(repo.path())
        .assert()
        .success();
    run_git(repo.path(), &["checkout", "main"]);

    pk_cmd()
        .args(["undo"])
        .current_dir(repo.path())
        .assert()
        .success();
    assert!(!branch_exists(repo.path(), "feature/back"));

    pk_cmd()
        .args(["redo"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("Re-applied"));

    assert!(branch_exists(repo.path(), "feature/back"));
    assert!(branch_entry(&read_stacks(repo.path()), "feature/back").is_some());
}

#[test]
fn undo_restores_a_deleted_branch_with_its_commits() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/precious"])
        .current_dir(repo.path())
        .assert()
        .success();
    write_and_commit(&repo, "precious.txt", "do not lose", "precious commit");
    let head_before = rev_parse(repo.path(), "feature/precious");
    run_git(repo.path(), &["checkout", "main"]);

    pk_cmd()
        .args(["bd", "feature/precious", "--force"])
        .current_dir(repo.path())
        .assert()
        .success();
    assert!(!branch_exists(repo.path(), "feature/precious"));

    pk_cmd()
        .args(["undo"])
        .current_dir(repo.path())
        .assert()
        .success();

    assert!(branch_exists(repo.path(), "feature/precious"));
    assert_eq!(rev_parse(repo.path(), "feature/precious"), head_before);
    assert_eq!(
        branch_entry(&read_stacks(repo.path()), "feature/precious").unwrap()["parent"].as_str(),
        Some("main")
    );
}

#[test]
fn redo_without_undo_fails() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/x"])
        .current_dir(repo.path())
        .assert()
        .success();

    pk_cmd()
        .args(["redo"])
        .current_dir(repo.path())
        .assert()
        .failure()
        .code(2)
        .stderr(contains("nothing to redo"));
}

#[test]
fn undo_with_nothing_committed_fails() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["undo"])
        .current_dir(repo.path())
        .assert()
        .failure()
        .code(2)
        .stderr(contains("nothing to undo"));
}

struct TestRepo {
    dir: TempDir,
}

impl TestRepo {
    fn new(default_branch: &str) -> Self {
        let dir = TempDir::new().expect("temp dir");
        run_git(dir.path(), &["init"]);
        run_git(dir.path(), &["config", "user.name", "Pancake"]);
        run_git(dir.path(), &["config", "user.email", "pancake@example.com"]);
        fs::write(dir.path().join("README.md"), "# Test repo").expect("write readme");
        run_git(dir.path(), &["add", "README.md"]);
        run_git(dir.path(), &["commit", "-m", "init"]);

        if current_branch(dir.path()) != default_branch {
            run_git(dir.path(), &["checkout", "-b", default_branch]);
        }

        Self { dir }
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }
}

fn init_pk(repo: &TestRepo) {
    pk_cmd()
        .arg("init")
        .current_dir(repo.path())
        .assert()
        .success();
}

fn write_and_commit(repo: &TestRepo, filename: &str, contents: &str, message: &str) {
    fs::write(repo.path().join(filename), contents).expect("write file");
    run_git(repo.path(), &["add", filename]);
    run_git(repo.path(), &["commit", "-m", message]);
}

fn read_stacks(dir: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(dir.join(".pancake/stacks.json")).expect("stacks.json");
    serde_json::from_str(&raw).expect("valid stacks.json")
}

fn branch_entry<'a>(stacks: &'a serde_json::Value, name: &str) -> Option<&'a serde_json::Value> {
    stacks["branches"]
        .as_array()?
        .iter()
        .find(|b| b["name"].as_str() == Some(name))
}

fn branch_exists(dir: &Path, name: &str) -> bool {
    StdCommand::new("git")
        .args(["rev-parse", "--verify", &format!("refs/heads/{name}")])
        .current_dir(dir)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn rev_parse(dir: &Path, rev: &str) -> String {
    let output = StdCommand::new("git")
        .args(["rev-parse", rev])
        .current_dir(dir)
        .output()
        .expect("git rev-parse");
    assert!(output.status.success(), "rev-parse failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn current_branch(dir: &Path) -> String {
    let output = StdCommand::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .current_dir(dir)
        .output()
        .expect("git rev-parse");
    assert!(output.status.success(), "failed to query current branch");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn run_git(dir: &Path, args: &[&str]) {
    let status = StdCommand::new("git")
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_NAME", "Pancake")
        .env("GIT_AUTHOR_EMAIL", "pancake@example.com")
        .env("GIT_COMMITTER_NAME", "Pancake")
        .env("GIT_COMMITTER_EMAIL", "pancake@example.com")
        .status()
        .unwrap_or_else(|err| panic!("failed to run git {:?}: {err}", args));

    assert!(status.success(), "git {:?} failed", args);
}

fn pk_cmd() -> assert_cmd::Command {
    #[allow(deprecated)]
    {
        assert_cmd::Command::cargo_bin("pk").expect("pk binary")
    }
}
