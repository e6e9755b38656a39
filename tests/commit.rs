use std::{fs, path::Path, process::Command as StdCommand};

use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn commit_requires_a_message() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/work"])
        .current_dir(repo.path())
        .assert()
        .success();
    fs::write(repo.path().join("work.txt"), "work").expect("write file");
    run_git(repo.path(), &["add", "work.txt"]);

    pk_cmd()
        .args(["commit"])
        .current_dir(repo.path())
        .assert()
        .failure()
        .code(2)
        .stderr(contains("commit message required"));
}

#[test]
fn commit_records_staged_changes() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/work"])
        .current_dir(repo.path())
        .assert()
        .success();
    fs::write(repo.path().join("work.txt"), "work").expect("write file");
    run_git(repo.path(), &["add", "work.txt"]);

    pk_cmd()
        .args(["commit", "-m", "add work"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("Created commit"));

    assert_eq!(last_subject(repo.path()), "add work");
    assert_eq!(commit_count(repo.path(), "main..feature/work"), 1);
}

#[test]
fn commit_all_stages_tracked_changes() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/work"])
        .current_dir(repo.path())
        .assert()
        .success();
    // README.md is tracked; modify without staging.
    fs::write(repo.path().join("README.md"), "# changed").expect("write file");

    pk_cmd()
        .args(["commit", "-a", "-m", "update readme"])
        .current_dir(repo.path())
        .assert()
        .success();

    assert_eq!(last_subject(repo.path()), "update readme");
    assert!(workdir_clean(repo.path()));
}

#[test]
fn commit_amend_rewrites_the_head_commit() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/work"])
        .current_dir(repo.path())
        .assert()
        .success();
    write_and_commit(&repo, "work.txt", "v1", "first version");

    fs::write(repo.path().join("work.txt"), "v2").expect("write file");
    run_git(repo.path(), &["add", "work.txt"]);

    pk_cmd()
        .args(["commit", "--amend", "-m", "final version"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("Amended commit"));

    assert_eq!(last_subject(repo.path()), "final version");
    assert_eq!(commit_count(repo.path(), "main..feature/work"), 1);
}

#[test]
fn amend_warns_about_descendants() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/base"])
        .current_dir(repo.path())
        .assert()
        .success();
    write_and_commit(&repo, "base.txt", "base", "base commit");
    pk_cmd()
        .args(["bc", "feature/top"])
        .current_dir(repo.path())
        .assert()
        .success();

    run_git(repo.path(), &["checkout", "feature/base"]);
    fs::write(repo.path().join("base.txt"), "amended").expect("write file");

    pk_cmd()
        .args(["amend"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("run `pk sync`"));
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

fn last_subject(dir: &Path) -> String {
    let output = StdCommand::new("git")
        .args(["log", "-1", "--pretty=%s"])
        .current_dir(dir)
        .output()
        .expect("git log");
    assert!(output.status.success(), "git log failed");
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn commit_count(dir: &Path, range: &str) -> usize {
    let output = StdCommand::new("git")
        .args(["rev-list", "--count", range])
        .current_dir(dir)
        .output()
        .expect("git rev-list");
    assert!(output.status.success(), "rev-list failed");
    String::from_utf8_lossy(&output.stdout)
        .trim()
        .parse()
        .expect("count")
}

fn workdir_clean(dir: &Path) -> bool {
    let output = StdCommand::new("git")
        .args(["status", "--porcelain"])
        .current_dir(dir)
        .output()
        .expect("git status");
    output.status.success() && output.stdout.is_empty()
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
