//! Exercises the installed binary end to end: argument validation, exit
//! codes and the pack/unpack/test-unpack surface.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::tempdir;

fn bin() -> Command {
    Command::cargo_bin("dedupack").unwrap()
}

#[test]
fn pack_then_unpack_roundtrip() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "hello").unwrap();
    fs::write(src.path().join("b.txt"), "hello").unwrap();
    fs::create_dir(src.path().join("sub")).unwrap();
    fs::write(src.path().join("sub").join("c.txt"), "world").unwrap();

    let work = tempdir().unwrap();
    let archive = work.path().join("tree.bttf");

    bin()
        .arg("--input")
        .arg(src.path())
        .arg("--output")
        .arg(&archive)
        .assert()
        .success();
    assert!(archive.exists());

    let out = work.path().join("restored");
    bin()
        .arg("-i")
        .arg(&archive)
        .arg("-o")
        .arg(&out)
        .assert()
        .success();
    assert_eq!(fs::read(out.join("a.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(out.join("b.txt")).unwrap(), b"hello");
    assert_eq!(fs::read(out.join("sub").join("c.txt")).unwrap(), b"world");
}

#[test]
fn test_unpack_flag_reports_ok() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "some content").unwrap();
    fs::write(src.path().join("b.txt"), "some content").unwrap();

    let work = tempdir().unwrap();
    let archive = work.path().join("tree.bttf");

    bin()
        .arg("-i")
        .arg(src.path())
        .arg("-o")
        .arg(&archive)
        .arg("-t")
        .arg("-l")
        .arg("3")
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "unpacked and source directories are identical",
        ));
}

#[test]
fn missing_input_fails() {
    bin()
        .args(["-i", "/definitely/not/here", "-o", "/tmp/never-written.bttf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nonexisting"));
}

#[test]
fn empty_input_folder_fails() {
    let src = tempdir().unwrap();
    let work = tempdir().unwrap();
    let archive = work.path().join("tree.bttf");

    bin()
        .arg("-i")
        .arg(src.path())
        .arg("-o")
        .arg(&archive)
        .assert()
        .failure()
        .stderr(predicate::str::contains("nothing to do"));
    assert!(!archive.exists());
}

#[test]
fn rejects_out_of_range_compression_level() {
    let src = tempdir().unwrap();
    fs::write(src.path().join("a.txt"), "x").unwrap();

    bin()
        .arg("-i")
        .arg(src.path())
        .arg("-o")
        .arg(src.path().join("out.bttf"))
        .args(["-l", "10"])
        .assert()
        .failure();
}

#[test]
fn unpacking_garbage_fails() {
    let work = tempdir().unwrap();
    let bogus = work.path().join("bogus.bttf");
    fs::write(&bogus, "this is no archive").unwrap();

    bin()
        .arg("-i")
        .arg(&bogus)
        .arg("-o")
        .arg(work.path().join("out"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a correct archive"));
}
