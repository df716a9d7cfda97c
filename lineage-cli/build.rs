// Build script to inject version information from git tags

use std::process::Command;

fn main() {
    // Get version from git describe, fallback to CARGO_PKG_VERSION
    let version = git_version().unwrap_or_else(|| env!("CARGO_PKG_VERSION").to_string());

    println!("cargo:rustc-env=LINEAGE_VERSION={}", version);
    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/tags");
}

fn git_version() -> Option<String> {
    // "v0.1.0", "v0.1.0-5-gabc123", or a bare "abc123-dirty"
    let output = Command::new("git")
        .args(["describe", "--tags", "--always", "--dirty"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let described = String::from_utf8(output.stdout).ok()?;
    let described = described.trim();
    let base_version = env!("CARGO_PKG_VERSION");

    match described.strip_prefix('v') {
        Some(tagged) => Some(
            tagged
                .split_once('-')
                .map(|(version, _)| version)
                .unwrap_or(tagged)
                .to_string(),
        ),
        None => Some(format!("{}-{}", base_version, described)),
    }
}
