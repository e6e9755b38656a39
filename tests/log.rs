use std::{fs, path::Path, process::Command as StdCommand};

use predicates::str::contains;
use tempfile::TempDir;

#[test]
fn log_shows_tracked_tree() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/a"])
        .current_dir(repo.path())
        .assert()
        .success();
    write_and_commit(&repo, "a.txt", "a", "a commit");

    pk_cmd()
        .args(["bc", "feature/b"])
        .current_dir(repo.path())
        .assert()
        .success();

    let assert = pk_cmd()
        .args(["log"])
        .env("PANCAKE_NO_COLOR", "1")
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("main"))
        .stdout(contains("feature/a"))
        .stdout(contains("feature/b"));

    // Parents render above children.
    let stdout = String::from_utf8_lossy(&assert.get_output().stdout).to_string();
    let pos_a = stdout.find("feature/a").expect("feature/a rendered");
    let pos_b = stdout.find("feature/b").expect("feature/b rendered");
    assert!(pos_a < pos_b);
}

#[test]
fn log_marks_branches_needing_restack() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/a"])
        .current_dir(repo.path())
        .assert()
        .success();
    write_and_commit(&repo, "a.txt", "a", "a commit");
    pk_cmd()
        .args(["bc", "feature/b"])
        .current_dir(repo.path())
        .assert()
        .success();

    // Amend the parent; the child now trails it.
    run_git(repo.path(), &["checkout", "feature/a"]);
    fs::write(repo.path().join("a.txt"), "a, amended").expect("write");
    run_git(repo.path(), &["add", "a.txt"]);
    run_git(repo.path(), &["commit", "--amend", "--no-edit"]);

    pk_cmd()
        .args(["log"])
        .env("PANCAKE_NO_COLOR", "1")
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("needs restack"));
}

#[test]
fn log_short_prints_arrow_paths() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["bc", "feature/a"])
        .current_dir(repo.path())
        .assert()
        .success();
    pk_cmd()
        .args(["bc", "feature/b"])
        .current_dir(repo.path())
        .assert()
        .success();

    pk_cmd()
        .args(["log", "--short"])
        .env("PANCAKE_NO_COLOR", "1")
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("main <- feature/a <- feature/b"));
}

#[test]
fn log_with_no_stacks_prints_hint() {
    let repo = TestRepo::new("main");
    init_pk(&repo);

    pk_cmd()
        .args(["log"])
        .current_dir(repo.path())
        .assert()
        .success()
        .stdout(contains("No tracked stacks yet"));
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
