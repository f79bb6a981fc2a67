// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site identity resolution.
//!
//! Every deployed project directory carries a small plain-text marker file
//! recording the subdomain it was assigned, so repeated deploys keep landing
//! on the same site without the operator retyping anything.
//!
//! Resolution walks a strict precedence chain, first match wins:
//!
//! 1. explicit subdomain given on the command line,
//! 2. marker file in the current working directory,
//! 3. marker file inside the target directory,
//! 4. nothing, in which case the server assigns a fresh random subdomain.
//!
//! Whatever the input was, the server's deploy response is authoritative:
//! after a successful upload the caller rewrites the working directory marker
//! with the subdomain parsed from the returned URL. The marker is
//! self-healing, it always reflects server truth after the last successful
//! deploy.

use std::{fs, path::Path};
use tracing::debug;

/// Resolve the subdomain a deploy should target.
///
/// `explicit` always wins without touching any marker. Marker files count
/// only when present with non-empty trimmed content.
pub fn resolve(
    explicit: Option<&str>,
    cwd_marker: impl AsRef<Path>,
    dir_marker: impl AsRef<Path>,
) -> Option<String> {
    if let Some(subdomain) = explicit {
        return Some(subdomain.to_string());
    }

    read_marker(cwd_marker).or_else(|| read_marker(dir_marker))
}

/// Read a marker file, yielding its trimmed content when non-empty.
pub fn read_marker(path: impl AsRef<Path>) -> Option<String> {
    let content = fs::read_to_string(path.as_ref()).ok()?;
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return None;
    }

    Some(trimmed.to_string())
}

/// Overwrite a marker file with `subdomain`.
///
/// # Errors
///
/// - Return [`SiteError::WriteMarker`] if the marker cannot be written.
pub fn write_marker(path: impl AsRef<Path>, subdomain: &str) -> Result<()> {
    debug!("recording subdomain {subdomain:?} in {:?}", path.as_ref());
    fs::write(path.as_ref(), format!("{subdomain}\n")).map_err(|err| SiteError::WriteMarker {
        source: err,
        path: path.as_ref().to_path_buf(),
    })
}

/// Extract the subdomain from a deployed site URL.
///
/// The subdomain is the leftmost label of the URL host, e.g.
/// `https://zeta.example.com` yields `zeta`.
///
/// # Errors
///
/// - Return [`SiteError::InvalidUrl`] if `url` cannot be parsed or carries no
///   host.
pub fn subdomain_from_url(url: &str) -> Result<String> {
    let parsed =
        reqwest::Url::parse(url).map_err(|_| SiteError::InvalidUrl(url.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SiteError::InvalidUrl(url.to_string()))?;
    let label = host
        .split('.')
        .next()
        .filter(|label| !label.is_empty())
        .ok_or_else(|| SiteError::InvalidUrl(url.to_string()))?;

    Ok(label.to_string())
}

/// Derive the public URL of `subdomain` hosted by `server`.
///
/// The subdomain becomes a new leftmost host label of the server URL, scheme
/// and port preserved, e.g. `http://localhost:8080` and `zeta` yield
/// `http://zeta.localhost:8080`.
///
/// # Errors
///
/// - Return [`SiteError::InvalidUrl`] if `server` cannot be parsed or carries
///   no host.
pub fn site_url(server: &str, subdomain: &str) -> Result<String> {
    let parsed =
        reqwest::Url::parse(server).map_err(|_| SiteError::InvalidUrl(server.to_string()))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| SiteError::InvalidUrl(server.to_string()))?;
    let port = parsed
        .port()
        .map(|port| format!(":{port}"))
        .unwrap_or_default();

    Ok(format!("{}://{subdomain}.{host}{port}", parsed.scheme()))
}

/// Site identity error types.
#[derive(Debug, thiserror::Error)]
pub enum SiteError {
    /// Failed to write subdomain marker file.
    #[error("cannot write marker file {path:?}")]
    WriteMarker {
        source: std::io::Error,
        path: std::path::PathBuf,
    },

    /// URL unparsable or missing a host to take a subdomain from.
    #[error("cannot determine subdomain from URL {0:?}")]
    InvalidUrl(String),
}

/// Friendly result alias :3
type Result<T, E = SiteError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[sealed_test]
    fn resolve_prefers_cwd_marker_over_directory_marker() -> anyhow::Result<()> {
        std::fs::create_dir("site")?;
        std::fs::write(".buzz", "alpha\n")?;
        std::fs::write("site/.buzz", "beta\n")?;

        assert_eq!(resolve(None, ".buzz", "site/.buzz"), Some("alpha".into()));

        Ok(())
    }

    #[sealed_test]
    fn resolve_explicit_overrides_markers() -> anyhow::Result<()> {
        std::fs::create_dir("site")?;
        std::fs::write(".buzz", "alpha\n")?;
        std::fs::write("site/.buzz", "beta\n")?;

        assert_eq!(
            resolve(Some("gamma"), ".buzz", "site/.buzz"),
            Some("gamma".into())
        );

        Ok(())
    }

    #[sealed_test]
    fn resolve_falls_back_to_directory_marker() -> anyhow::Result<()> {
        std::fs::create_dir("site")?;
        std::fs::write("site/.buzz", "beta\n")?;

        assert_eq!(resolve(None, ".buzz", "site/.buzz"), Some("beta".into()));

        Ok(())
    }

    #[sealed_test]
    fn resolve_ignores_blank_markers() -> anyhow::Result<()> {
        std::fs::create_dir("site")?;
        std::fs::write(".buzz", "  \n")?;

        assert_eq!(resolve(None, ".buzz", "site/.buzz"), None);

        Ok(())
    }

    #[sealed_test]
    fn marker_self_heals_from_deploy_response_url() -> anyhow::Result<()> {
        std::fs::write(".buzz", "old-name\n")?;

        let confirmed = subdomain_from_url("https://zeta.example.com")?;
        write_marker(".buzz", &confirmed)?;

        assert_eq!(std::fs::read_to_string(".buzz")?.trim(), "zeta");

        Ok(())
    }

    #[sealed_test]
    fn write_marker_round_trips_through_read() -> anyhow::Result<()> {
        write_marker(".buzz", "zeta")?;

        assert_eq!(read_marker(".buzz"), Some("zeta".into()));

        Ok(())
    }

    // The fully qualified assert_eq disambiguates against the prelude
    // import inside the test_case expansion.
    #[test_case("https://zeta.example.com", "zeta"; "custom domain")]
    #[test_case("http://cool-site-1234.localhost:8080", "cool-site-1234"; "local domain with port")]
    #[test_case("https://zeta.example.com/index.html", "zeta"; "path ignored")]
    #[test]
    fn subdomain_from_url_takes_leftmost_label(url: &str, expect: &str) -> anyhow::Result<()> {
        pretty_assertions::assert_eq!(subdomain_from_url(url)?, expect);

        Ok(())
    }

    #[test]
    fn subdomain_from_url_rejects_garbage() {
        assert!(subdomain_from_url("not a url").is_err());
    }

    #[test_case("http://localhost:8080", "zeta", "http://zeta.localhost:8080"; "local server")]
    #[test_case("https://buzz.example.com", "zeta", "https://zeta.buzz.example.com"; "hosted server")]
    #[test]
    fn site_url_prefixes_subdomain(server: &str, subdomain: &str, expect: &str) -> anyhow::Result<()> {
        pretty_assertions::assert_eq!(site_url(server, subdomain)?, expect);

        Ok(())
    }
}
