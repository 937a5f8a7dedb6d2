use std::process::Command;

/// Stamp the binary with the commit it was built from, shown by `--version`.
fn main() {
    let describe = Command::new("git")
        .args(["describe", "--always", "--dirty"])
        .output()
        .ok()
        .filter(|out| out.status.success())
        .and_then(|out| String::from_utf8(out.stdout).ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    println!(
        "cargo:rustc-env=CONCH_BUILD_REV={}",
        describe.as_deref().unwrap_or("unknown")
    );
    println!("cargo:rerun-if-changed=../../.git/HEAD");
}
