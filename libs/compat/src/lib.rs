//! Upgrade compatibility decisions.
//!
//! This library decides whether an upgrade from a running host version
//! to a target version is permitted. It is pure: no graph I/O, no
//! clock. The upgrade orchestrator calls [`upgradeable_from`] before it
//! proceeds and aborts on any error.
//!
//! # Invariants
//!
//! - Decisions are deterministic given the same inputs
//! - Pre-release versions sort below their corresponding release
//! - The per-target minimum host version is maintained data, versioned
//!   alongside releases — it is consumed here, never derived
//! - Minor-line distance ignores pre-release labels

use std::cmp::Ordering;

use semver::Version;
use thiserror::Error;

/// Compatibility decision errors.
///
/// These are terminal, user-facing decisions, not bugs; the caller
/// surfaces the message and aborts the upgrade attempt.
#[derive(Debug, Error)]
pub enum CompatError {
    /// The version tag could not be parsed.
    #[error("invalid version {tag}: {reason}")]
    InvalidVersion { tag: String, reason: String },

    /// The target minor release is not in the maintained table.
    ///
    /// Guards against the table lagging newly-cut releases.
    #[error("upgrades to version {target} are not supported")]
    UnsupportedTarget { target: Version },

    /// The host predates the minimum permissible version for the
    /// target release.
    #[error("host version {host} is too old to upgrade to Talos {target}")]
    HostTooOld { host: Version, target: Version },

    /// The host is more than one minor line ahead of the target.
    #[error("host version {host} is too new to downgrade to Talos {target}")]
    HostTooNew { host: Version, target: Version },
}

/// Maintained compatibility table: supported target minor release →
/// minimum permissible host version.
///
/// The downgrade tolerance (one minor line) is an independent knob and
/// is not encoded here.
const COMPAT_TABLE: &[((u64, u64), &str)] = &[
    ((1, 3), "1.0.0-alpha.0"),
    ((1, 4), "1.0.0-alpha.0"),
    ((1, 5), "1.2.0-alpha.0"),
];

/// Parse a version tag in dotted-numeric-plus-optional-prerelease
/// form, e.g. `1.4.0-beta.0`. A leading `v` is tolerated.
pub fn parse_version(tag: &str) -> Result<Version, CompatError> {
    let trimmed = tag.strip_prefix('v').unwrap_or(tag);

    Version::parse(trimmed).map_err(|err| CompatError::InvalidVersion {
        tag: tag.to_string(),
        reason: err.to_string(),
    })
}

fn min_host_for(target: &Version) -> Option<&'static str> {
    COMPAT_TABLE
        .iter()
        .find(|((major, minor), _)| *major == target.major && *minor == target.minor)
        .map(|(_, min_host)| *min_host)
}

/// Decide whether an upgrade from `host` to `target` is permitted.
///
/// Fails if the target minor release is unsupported, the host is below
/// the maintained minimum for that release, or the host is more than
/// one minor line ahead of the target. A downgrade of exactly one
/// minor line is permitted.
pub fn upgradeable_from(host: &Version, target: &Version) -> Result<(), CompatError> {
    let Some(min_host_tag) = min_host_for(target) else {
        return Err(CompatError::UnsupportedTarget {
            target: target.clone(),
        });
    };

    let min_host = parse_version(min_host_tag)?;

    if host.cmp_precedence(&min_host) == Ordering::Less {
        return Err(CompatError::HostTooOld {
            host: host.clone(),
            target: target.clone(),
        });
    }

    // Distance is computed on major.minor only; pre-release labels do
    // not participate.
    let too_new = host.major > target.major
        || (host.major == target.major && host.minor > target.minor + 1);
    if too_new {
        return Err(CompatError::HostTooNew {
            host: host.clone(),
            target: target.clone(),
        });
    }

    Ok(())
}
