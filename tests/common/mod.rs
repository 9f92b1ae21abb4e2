//! Common test helpers and utilities.

#![allow(dead_code)]

pub mod mock_server;

pub use mock_server::MockServer;

use std::path::PathBuf;

/// Helper to get the fixture project path
pub fn fixture_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/mixer")
}

/// Helper to find rust-analyzer for the live integration tests
pub fn find_rust_analyzer() -> String {
    if let Ok(path) = std::env::var("RUST_ANALYZER_PATH") {
        return path;
    }

    let candidates = vec![
        "rust-analyzer",            // In PATH
        "~/.cargo/bin/rust-analyzer", // Home cargo bin
    ];

    for candidate in candidates {
        if let Ok(output) = std::process::Command::new(candidate)
            .arg("--version")
            .output()
            && output.status.success()
        {
            return candidate.to_string();
        }
    }

    // Default fallback
    "rust-analyzer".to_string()
}
