use bates::{blank_tiff, manifest_path};
use std::{fs, path::Path, process::Command};

fn bates_endorse(args: &[&Path], flags: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_bates-endorse"))
        .args(args)
        .args(flags)
        .env("RUST_LOG", "warn")
        .env_remove("BATES_WORKERS")
        .env_remove("BATES_MODE")
        .output()
        .unwrap()
}

#[test]
fn endorses_both_paths_and_reports_timings() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    let output = dir.path().join("out");
    fs::create_dir_all(input.join("nested")).unwrap();
    fs::write(input.join("a.tif"), blank_tiff(2)).unwrap();
    fs::write(input.join("nested/b.TIF"), blank_tiff(3)).unwrap();
    fs::write(input.join("skip.txt"), b"not an image").unwrap();

    let out = bates_endorse(&[&input, &output], &["--prefix=CASE_", "--workers=2"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("async: 5 pages from 2 of 2 files"), "{stdout}");
    assert!(stdout.contains("sync: 5 pages from 2 of 2 files"), "{stdout}");

    let manifest = fs::read_to_string(manifest_path(&output.join("b.TIF"))).unwrap();
    assert!(manifest.contains("CASE_00000003"), "{manifest}");
    assert!(!manifest_path(&output.join("skip.txt")).exists());
}

#[test]
fn stops_on_first_failure_by_default() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("in");
    fs::create_dir_all(&input).unwrap();
    fs::write(input.join("empty.tif"), b"").unwrap();

    let out = bates_endorse(&[&input, &dir.path().join("out")], &["--mode=sync"]);
    assert!(!out.status.success());

    let out = bates_endorse(
        &[&input, &dir.path().join("out")],
        &["--mode=async", "--continue-on-error"],
    );
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("async: 0 pages from 0 of 1 files"));
}
