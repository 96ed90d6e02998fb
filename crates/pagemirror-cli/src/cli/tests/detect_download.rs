//! Tests for the detection and download subcommands.

use super::parse;
use crate::cli::CliCommand;

#[test]
fn cli_parse_detect() {
    match parse(&["pagemirror", "detect", "12"]) {
        CliCommand::Detect { context_id } => assert_eq!(context_id, 12),
        _ => panic!("expected Detect"),
    }
}

#[test]
fn cli_parse_detect_rejects_non_numeric_context() {
    use clap::Parser;
    assert!(crate::cli::Cli::try_parse_from(["pagemirror", "detect", "abc"]).is_err());
}

#[test]
fn cli_parse_stop_detect() {
    assert!(matches!(
        parse(&["pagemirror", "stop-detect"]),
        CliCommand::StopDetect
    ));
}

#[test]
fn cli_parse_download() {
    assert!(matches!(
        parse(&["pagemirror", "download"]),
        CliCommand::Download
    ));
}

#[test]
fn cli_parse_stop_download() {
    assert!(matches!(
        parse(&["pagemirror", "stop-download"]),
        CliCommand::StopDownload
    ));
}

#[test]
fn cli_parse_fetch() {
    match parse(&["pagemirror", "fetch", "https://example.com/logo.png"]) {
        CliCommand::Fetch { url } => assert_eq!(url, "https://example.com/logo.png"),
        _ => panic!("expected Fetch"),
    }
}
