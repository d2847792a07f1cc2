//! Drives `cli::run` end to end against local fixtures.

use std::fs;

use tempfile::tempdir;
use test_support::{HttpFixture, patterned_bytes};

fn run(args: &[&str]) -> (i32, String, String) {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut full = vec!["fetchpipe"];
    full.extend_from_slice(args);
    let code = cli::run(full, &mut stdout, &mut stderr);
    (
        code,
        String::from_utf8(stdout).unwrap(),
        String::from_utf8(stderr).unwrap(),
    )
}

#[test]
fn help_lists_usage() {
    let (code, stdout, stderr) = run(&["--help"]);
    assert_eq!(code, 0);
    assert!(stdout.contains("Usage: fetchpipe [OPTIONS] URL DEST"));
    assert!(stdout.contains("--buffer-size"));
    assert!(stderr.is_empty());
}

#[test]
fn version_names_the_program() {
    let (code, stdout, _) = run(&["-V"]);
    assert_eq!(code, 0);
    assert_eq!(stdout, format!("fetchpipe {}\n", env!("CARGO_PKG_VERSION")));
}

#[test]
fn missing_operands_is_a_syntax_error() {
    let (code, stdout, stderr) = run(&[]);
    assert_eq!(code, 1);
    assert!(stdout.is_empty());
    assert!(
        stderr.contains("expected a URL and a destination, got 0 operands"),
        "{stderr}"
    );
    assert!(stderr.contains("(code 1)"));
}

#[test]
fn unknown_option_is_a_syntax_error() {
    let (code, _, stderr) = run(&["--bogus", "u", "d"]);
    assert_eq!(code, 1);
    assert!(stderr.contains("--bogus"), "{stderr}");
}

#[test]
fn downloads_over_http() {
    let body = patterned_bytes(25_000);
    let server = HttpFixture::serve(body.clone()).unwrap();
    let dir = tempdir().unwrap();
    let destination = dir.path().join("out.bin");

    let (code, _, stderr) = run(&[
        "--buffer-size=8K",
        "--poll-interval=1",
        &server.url("/blob"),
        destination.to_str().unwrap(),
    ]);

    assert_eq!(code, 0, "{stderr}");
    assert_eq!(fs::read(&destination).unwrap(), body);
    assert_eq!(server.get_ranges().len(), 4);
}

#[test]
fn verbose_run_prints_summary() {
    let server = HttpFixture::serve(patterned_bytes(3000)).unwrap();
    let dir = tempdir().unwrap();
    let destination = dir.path().join("out.bin");

    let (code, stdout, _) = run(&[
        "-v",
        "-B",
        "1K",
        &server.url("/summary"),
        destination.to_str().unwrap(),
    ]);

    assert_eq!(code, 0);
    assert!(
        stdout.contains("received 3000 bytes in 3 reads and 3 writes"),
        "{stdout}"
    );
}

#[test]
fn progress_is_written_to_stdout() {
    let server = HttpFixture::serve(patterned_bytes(4096)).unwrap();
    let dir = tempdir().unwrap();
    let destination = dir.path().join("out.bin");

    let (code, stdout, _) = run(&[
        "--progress",
        "-B",
        "1K",
        &server.url("/progress"),
        destination.to_str().unwrap(),
    ]);

    assert_eq!(code, 0);
    assert!(stdout.contains("4096 of 4096 bytes 100%"), "{stdout}");
    assert!(stdout.ends_with('\n'));
}

#[test]
fn bad_scheme_exits_with_syntax_error() {
    let dir = tempdir().unwrap();
    let destination = dir.path().join("never.bin");

    let (code, _, stderr) = run(&["gopher://example.com/x", destination.to_str().unwrap()]);
    assert_eq!(code, 1);
    assert!(stderr.contains("unsupported URL scheme"), "{stderr}");
    assert!(!destination.exists());
}

#[test]
fn http_error_status_exits_with_socket_error() {
    let server = HttpFixture::builder(Vec::new())
        .with_status(500)
        .spawn()
        .unwrap();
    let dir = tempdir().unwrap();
    let destination = dir.path().join("out.bin");

    let (code, _, stderr) = run(&[&server.url("/broken"), destination.to_str().unwrap()]);
    assert_eq!(code, 10, "{stderr}");
    assert!(stderr.contains("500"), "{stderr}");
}

#[test]
fn unwritable_destination_exits_with_file_select_error() {
    let server = HttpFixture::serve(patterned_bytes(10)).unwrap();
    let dir = tempdir().unwrap();
    let destination = dir.path().join("missing-dir").join("out.bin");

    let (code, _, stderr) = run(&[&server.url("/x"), destination.to_str().unwrap()]);
    assert_eq!(code, 3, "{stderr}");
    assert!(stderr.contains("preparing the destination"), "{stderr}");
}
