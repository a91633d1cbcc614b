//! Tagging against a real bare remote with the `git` CLI.

use miruken_release_ci::{GitTagger, ProcessRunner, Tagger};
use miruken_release_core::{ReleaseError, TagName, Version};
use std::path::Path;
use std::process::Command;
use std::sync::Arc;
use tempfile::TempDir;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .expect("failed to run git");
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// A bare remote plus a working clone with one commit.
struct Fixture {
    _root: TempDir,
    remote: std::path::PathBuf,
    work: std::path::PathBuf,
}

fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();
    let remote = root.path().join("remote.git");
    let work = root.path().join("work");
    std::fs::create_dir_all(&remote).unwrap();
    std::fs::create_dir_all(&work).unwrap();

    git(&remote, &["init", "--bare", "-q"]);
    git(&work, &["init", "-q"]);
    git(&work, &["config", "user.name", "Release Test"]);
    git(&work, &["config", "user.email", "release-test@example.com"]);
    std::fs::write(work.join("go.mod"), "module example.com/miruken\n").unwrap();
    git(&work, &["add", "."]);
    git(&work, &["commit", "-q", "-m", "initial"]);
    git(
        &work,
        &["remote", "add", "origin", remote.to_str().unwrap()],
    );

    Fixture {
        _root: root,
        remote,
        work,
    }
}

fn tag(version: &str) -> TagName {
    Version::parse_tool_output(version).unwrap().tag_name()
}

fn tagger(work: &Path) -> GitTagger {
    GitTagger::new(Arc::new(ProcessRunner), work)
}

#[tokio::test]
async fn test_tag_is_created_and_pushed() {
    let fx = fixture();

    tagger(&fx.work).tag_and_push(&tag("1.4.2")).await.unwrap();

    let remote_tags = git(&fx.remote, &["tag", "--list"]);
    assert_eq!(remote_tags.trim(), "v1.4.2");

    // Annotated, not lightweight.
    let kind = git(&fx.work, &["cat-file", "-t", "v1.4.2"]);
    assert_eq!(kind.trim(), "tag");
    let message = git(&fx.work, &["tag", "-l", "--format=%(contents)", "v1.4.2"]);
    assert_eq!(message.trim(), "v1.4.2");
}

#[tokio::test]
async fn test_second_release_of_same_version_is_rejected() {
    let fx = fixture();
    let tagger = tagger(&fx.work);

    tagger.tag_and_push(&tag("1.4.2")).await.unwrap();
    let err = tagger.tag_and_push(&tag("1.4.2")).await.unwrap_err();

    assert!(
        matches!(&err, ReleaseError::TagAlreadyExists { tag } if tag == "v1.4.2"),
        "unexpected error: {err}"
    );
}

#[tokio::test]
async fn test_tag_present_only_on_remote_is_rejected() {
    let fx = fixture();

    // Another checkout already published v2.0.0.
    git(&fx.work, &["push", "-q", "origin", "HEAD:refs/heads/main"]);
    let parent = fx.work.parent().unwrap();
    git(
        parent,
        &["clone", "-q", fx.remote.to_str().unwrap(), "other"],
    );
    let other = parent.join("other");
    git(&other, &["tag", "v2.0.0", "origin/main"]);
    git(&other, &["push", "-q", "origin", "refs/tags/v2.0.0"]);

    let err = tagger(&fx.work)
        .tag_and_push(&tag("2.0.0"))
        .await
        .unwrap_err();
    assert!(matches!(err, ReleaseError::TagAlreadyExists { .. }));

    // Nothing was created locally.
    let local_tags = git(&fx.work, &["tag", "--list"]);
    assert!(local_tags.trim().is_empty());
}

#[tokio::test]
async fn test_unreachable_remote_fails_without_creating_tag() {
    let fx = fixture();
    let tagger = tagger(&fx.work).with_remote("missing");

    let err = tagger.tag_and_push(&tag("3.0.0")).await.unwrap_err();
    assert!(
        matches!(err, ReleaseError::PushFailed { .. }),
        "unexpected error: {err}"
    );

    let local_tags = git(&fx.work, &["tag", "--list"]);
    assert!(local_tags.trim().is_empty());
}
