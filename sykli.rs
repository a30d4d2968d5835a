//! Sykli CI pipeline for versiond
//!
//! Run locally: sykli run
//! Or: cargo run --bin sykli --features sykli -- --emit | sykli run -

use sykli::{Condition, Pipeline, Template};

fn main() {
    let mut p = Pipeline::new();

    // === RESOURCES ===
    let src = p.dir(".");
    let cargo_registry = p.cache("cargo-registry");
    let cargo_git = p.cache("cargo-git");
    let target_cache = p.cache("target");

    // === TEMPLATE ===
    let rust = Template::new()
        .container("rust:1.85")
        .mount_dir(&src, "/src")
        .mount_cache(&cargo_registry, "/usr/local/cargo/registry")
        .mount_cache(&cargo_git, "/usr/local/cargo/git")
        .mount_cache(&target_cache, "/src/target")
        .workdir("/src");

    // === TASKS ===
    let _ = p
        .task("test")
        .from(&rust)
        .run("cargo test")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("lint")
        .from(&rust)
        .run("cargo clippy --all-targets -- -D warnings")
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"]);

    let _ = p
        .task("fmt")
        .from(&rust)
        .run("cargo fmt -- --check")
        .inputs(&["**/*.rs"]);

    // Release build with metadata baked in
    let _ = p
        .task("build")
        .from(&rust)
        .run(
            r#"VERSIOND_VERSION=$(grep -m1 '^version' Cargo.toml | cut -d'"' -f2) \
VERSIOND_COMMIT=$(git rev-parse --short HEAD 2>/dev/null || echo none) \
VERSIOND_BUILD_TIME=$(date -u +%Y-%m-%dT%H:%M:%SZ) \
cargo build --release --bin versiond"#,
        )
        .inputs(&["**/*.rs", "Cargo.toml", "Cargo.lock"])
        .output("binary", "target/release/versiond")
        .after(&["test", "lint", "fmt"]);

    // Smoke test: probe both endpoints, then SIGTERM and expect exit 0
    let _ = p
        .task("smoke-test")
        .from(&rust)
        .run(
            r#"#!/bin/bash
set -e

./target/release/versiond > /tmp/versiond-log.txt &
PID=$!

for i in $(seq 1 20); do
  curl -sf http://127.0.0.1:8080/healthz > /dev/null && break
  sleep 0.25
done

HEALTH=$(curl -sf http://127.0.0.1:8080/healthz)
if [ "$HEALTH" != "ok" ]; then
  echo "ERROR: /healthz returned '$HEALTH'"
  cat /tmp/versiond-log.txt
  exit 1
fi

curl -sf http://127.0.0.1:8080/ | grep -q '"build_time"' || {
  echo "ERROR: / did not return version info"
  cat /tmp/versiond-log.txt
  exit 1
}

kill -TERM $PID
wait $PID
STATUS=$?
if [ "$STATUS" != "0" ]; then
  echo "ERROR: expected exit status 0 after SIGTERM, got $STATUS"
  cat /tmp/versiond-log.txt
  exit 1
fi

grep -q '"server stopped"' /tmp/versiond-log.txt
echo "Smoke test passed"
"#,
        )
        .input_from("build", "binary", "/src/target/release/versiond")
        .when_cond(Condition::event("push").or(Condition::negate(Condition::branch("*"))))
        .timeout(300);

    p.emit();
}
