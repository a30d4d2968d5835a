//! Rebuild when build metadata changes
//!
//! `VersionInfo::from_build()` reads these through `option_env!`, so cargo has to
//! know about them or a stale binary keeps the old values.
//!
//! ```bash
//! VERSIOND_VERSION=1.4.0 \
//! VERSIOND_COMMIT=$(git rev-parse --short HEAD) \
//! VERSIOND_BUILD_TIME=$(date -u +%Y-%m-%dT%H:%M:%SZ) \
//!     cargo build --release
//! ```

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=VERSIOND_VERSION");
    println!("cargo:rerun-if-env-changed=VERSIOND_COMMIT");
    println!("cargo:rerun-if-env-changed=VERSIOND_BUILD_TIME");
}
