// SPDX-FileCopyrightText: 2026 Hookwire Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! cloudflared binary discovery and first-run download.
//!
//! Resolution order: the support directory's `bin/`, well-known system
//! paths, then `$PATH`. When nothing is found, the platform artifact is
//! downloaded from the cloudflared release URL into `{support_dir}/bin`
//! and marked executable. Linux ships a bare binary; macOS ships a `.tgz`.

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use hookwire_core::HookwireError;
use tracing::info;

const RELEASE_BASE: &str =
    "https://github.com/cloudflare/cloudflared/releases/latest/download";

const SYSTEM_PATHS: &[&str] = &[
    "/usr/local/bin/cloudflared",
    "/opt/homebrew/bin/cloudflared",
    "/usr/bin/cloudflared",
];

/// Locate an existing cloudflared binary, or download one.
pub async fn locate_or_download(
    support_dir: &Path,
    http: &reqwest::Client,
) -> Result<PathBuf, HookwireError> {
    if let Some(path) = locate(support_dir) {
        return Ok(path);
    }
    download(support_dir, http).await
}

/// Locate an existing cloudflared binary without downloading.
pub fn locate(support_dir: &Path) -> Option<PathBuf> {
    let managed = support_dir.join("bin/cloudflared");
    if managed.is_file() {
        return Some(managed);
    }

    for candidate in SYSTEM_PATHS {
        let path = Path::new(candidate);
        if path.is_file() {
            return Some(path.to_path_buf());
        }
    }

    if let Some(path_var) = std::env::var_os("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join("cloudflared");
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    None
}

/// Release artifact name for the running platform.
fn artifact_name() -> Result<&'static str, HookwireError> {
    match (std::env::consts::OS, std::env::consts::ARCH) {
        ("linux", "x86_64") => Ok("cloudflared-linux-amd64"),
        ("linux", "aarch64") => Ok("cloudflared-linux-arm64"),
        ("macos", "x86_64") => Ok("cloudflared-darwin-amd64.tgz"),
        ("macos", "aarch64") => Ok("cloudflared-darwin-arm64.tgz"),
        (os, arch) => Err(HookwireError::Tunnel {
            message: format!("no cloudflared artifact for {os}/{arch}"),
            source: None,
        }),
    }
}

async fn download(
    support_dir: &Path,
    http: &reqwest::Client,
) -> Result<PathBuf, HookwireError> {
    let artifact = artifact_name()?;
    let url = format!("{RELEASE_BASE}/{artifact}");
    info!(url = url.as_str(), "downloading cloudflared");

    let response = http
        .get(&url)
        .send()
        .await
        .and_then(reqwest::Response::error_for_status)
        .map_err(|e| HookwireError::Tunnel {
            message: format!("cloudflared download failed: {e}"),
            source: Some(Box::new(e)),
        })?;
    let bytes = response.bytes().await.map_err(|e| HookwireError::Tunnel {
        message: format!("cloudflared download interrupted: {e}"),
        source: Some(Box::new(e)),
    })?;

    let bin_dir = support_dir.join("bin");
    let target = bin_dir.join("cloudflared");
    let is_archive = artifact.ends_with(".tgz");

    // Extraction and the chmod are blocking filesystem work.
    let install_target = target.clone();
    tokio::task::spawn_blocking(move || -> Result<(), std::io::Error> {
        std::fs::create_dir_all(&bin_dir)?;
        if is_archive {
            extract_tgz(&bytes, &install_target)?;
        } else {
            std::fs::write(&install_target, &bytes)?;
        }
        std::fs::set_permissions(&install_target, std::fs::Permissions::from_mode(0o755))?;
        Ok(())
    })
    .await
    .map_err(|e| HookwireError::Internal(format!("install task panicked: {e}")))?
    .map_err(|e| HookwireError::Tunnel {
        message: format!("cloudflared install failed: {e}"),
        source: Some(Box::new(e)),
    })?;

    info!(path = %target.display(), "cloudflared installed");
    Ok(target)
}

/// Extract the `cloudflared` member of a gzipped tarball to `target`.
fn extract_tgz(bytes: &[u8], target: &Path) -> Result<(), std::io::Error> {
    let decoder = flate2::read::GzDecoder::new(bytes);
    let mut archive = tar::Archive::new(decoder);
    for entry in archive.entries()? {
        let mut entry = entry?;
        let path = entry.path()?;
        if path.file_name().and_then(|n| n.to_str()) == Some("cloudflared") {
            entry.unpack(target)?;
            return Ok(());
        }
    }
    Err(std::io::Error::other(
        "archive does not contain a cloudflared member",
    ))
}
