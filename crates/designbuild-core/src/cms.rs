//! Content-management retention of build artifacts.
//!
//! Registrations live at `<cms root>/<year>/w<week>/<config name>/<build id>/`.
//! Each owner interested in a registration drops an expiration marker named
//! `<YYYYmmddTHHMMSS><owner>.expiration_date` into it; the registration may be
//! deleted once every marker has passed.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Datelike, NaiveDateTime, Utc};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::domain::error::{BuildError, Result};

/// Suffix of expiration marker files.
pub const MARKER_SUFFIX: &str = ".expiration_date";

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S";
const STAMP_LEN: usize = 15;

/// An expiration marker found in a registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpirationMarker {
    pub expires_at: DateTime<Utc>,
    pub owner: String,
}

/// Registration directory for a build.
pub fn registration_dir(
    cms_root: &Path,
    config_name: &str,
    build_id: &str,
    at: DateTime<Utc>,
) -> PathBuf {
    let week = at.iso_week();
    cms_root
        .join(week.year().to_string())
        .join(format!("w{:02}", week.week()))
        .join(config_name)
        .join(build_id)
}

/// Marker file name for `owner` expiring at `expires_at`.
pub fn marker_name(expires_at: DateTime<Utc>, owner: &str) -> String {
    format!("{}{owner}{MARKER_SUFFIX}", expires_at.format(STAMP_FORMAT))
}

/// Parse a marker file name; `None` if it is not a marker.
pub fn parse_marker_name(name: &str) -> Option<ExpirationMarker> {
    let stem = name.strip_suffix(MARKER_SUFFIX)?;
    if stem.len() < STAMP_LEN || !stem.is_char_boundary(STAMP_LEN) {
        return None;
    }
    let (stamp, owner) = stem.split_at(STAMP_LEN);
    let naive = NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).ok()?;
    Some(ExpirationMarker {
        expires_at: naive.and_utc(),
        owner: owner.to_string(),
    })
}

/// Copy `artifacts` into a fresh registration and mark it.
///
/// Directories are copied recursively; the returned path is the
/// registration directory.
pub fn register(
    cms_root: &Path,
    artifacts: &[PathBuf],
    config_name: &str,
    build_id: &str,
    owner: &str,
    expires_at: DateTime<Utc>,
) -> Result<PathBuf> {
    let dir = registration_dir(cms_root, config_name, build_id, Utc::now());
    fs::create_dir_all(&dir).map_err(|e| BuildError::io(&dir, e))?;

    for artifact in artifacts {
        copy_into(artifact, &dir)?;
    }

    let marker = dir.join(marker_name(expires_at, owner));
    fs::write(&marker, b"").map_err(|e| BuildError::io(&marker, e))?;
    info!(registration = %dir.display(), artifacts = artifacts.len(), "registered build artifacts");
    Ok(dir)
}

fn copy_into(artifact: &Path, dir: &Path) -> Result<()> {
    let Some(base) = artifact.parent() else {
        return Ok(());
    };
    for entry in WalkDir::new(artifact).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            BuildError::io(
                artifact,
                std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
            )
        })?;
        let Ok(rel) = entry.path().strip_prefix(base) else {
            continue;
        };
        let target = dir.join(rel);
        if entry.file_type().is_dir() {
            fs::create_dir_all(&target).map_err(|e| BuildError::io(&target, e))?;
        } else {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;
            }
            fs::copy(entry.path(), &target).map_err(|e| BuildError::io(entry.path(), e))?;
        }
    }
    Ok(())
}

/// Markers present in a registration directory.
pub fn expiration_markers(registration: &Path) -> Result<Vec<ExpirationMarker>> {
    let entries = fs::read_dir(registration).map_err(|e| BuildError::io(registration, e))?;
    let mut markers = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| BuildError::io(registration, e))?;
        if let Some(marker) = entry.file_name().to_str().and_then(parse_marker_name) {
            markers.push(marker);
        }
    }
    Ok(markers)
}

/// A registration is deletable once it has markers and all have passed.
pub fn is_deletable(registration: &Path, now: DateTime<Utc>) -> Result<bool> {
    let markers = expiration_markers(registration)?;
    Ok(!markers.is_empty() && markers.iter().all(|m| m.expires_at <= now))
}

/// Remove every deletable registration under `cms_root`.
pub fn purge_expired(cms_root: &Path, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
    let mut purged = Vec::new();
    if !cms_root.is_dir() {
        return Ok(purged);
    }
    // year / week / config / build
    let registrations: Vec<PathBuf> = WalkDir::new(cms_root)
        .min_depth(4)
        .max_depth(4)
        .sort_by_file_name()
        .into_iter()
        .filter_map(std::result::Result::ok)
        .filter(|e| e.file_type().is_dir())
        .map(|e| e.into_path())
        .collect();

    for registration in registrations {
        if is_deletable(&registration, now)? {
            fs::remove_dir_all(&registration).map_err(|e| BuildError::io(&registration, e))?;
            debug!(registration = %registration.display(), "purged expired registration");
            purged.push(registration);
        }
    }
    info!(purged = purged.len(), "cms purge complete");
    Ok(purged)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_registration_dir_uses_iso_week() {
        let at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap();
        let dir = registration_dir(Path::new("/cms"), "nightly", "b1", at);
        assert_eq!(dir, PathBuf::from("/cms/2026/w01/nightly/b1"));
    }

    #[test]
    fn test_marker_name_round_trip() {
        let at = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();
        let name = marker_name(at, "alice");
        assert_eq!(name, "20260304T050607alice.expiration_date");
        let marker = parse_marker_name(&name).unwrap();
        assert_eq!(marker.expires_at, at);
        assert_eq!(marker.owner, "alice");
        assert!(parse_marker_name("notes.txt").is_none());
        assert!(parse_marker_name("garbage.expiration_date").is_none());
    }

    #[test]
    fn test_deletable_only_when_all_markers_passed() {
        let dir = tempfile::tempdir().unwrap();
        let now = Utc::now();
        let reg = dir.path();
        assert!(!is_deletable(reg, now).unwrap());

        fs::write(reg.join(marker_name(now - Duration::days(1), "a")), b"").unwrap();
        assert!(is_deletable(reg, now).unwrap());

        fs::write(reg.join(marker_name(now + Duration::days(1), "b")), b"").unwrap();
        assert!(!is_deletable(reg, now).unwrap());
    }

    #[test]
    fn test_register_and_purge() {
        let cms = tempfile::tempdir().unwrap();
        let artifacts = tempfile::tempdir().unwrap();
        let report = artifacts.path().join("traceability.json");
        fs::write(&report, "{}").unwrap();

        let now = Utc::now();
        let kept = register(cms.path(), &[report.clone()], "ci", "keep", "bob", now + Duration::days(3))
            .unwrap();
        let gone = register(cms.path(), &[report], "ci", "drop", "bob", now - Duration::days(3))
            .unwrap();
        assert!(kept.join("traceability.json").is_file());

        let purged = purge_expired(cms.path(), now).unwrap();
        assert_eq!(purged, vec![gone.clone()]);
        assert!(!gone.exists());
        assert!(kept.exists());
    }
}
