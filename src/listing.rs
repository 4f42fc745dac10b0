//! GitHub listing adapter: turns the paginated repository API into an
//! ordered, deduplicated list of `RepoDescriptor`s.
//!
//! All schema validation happens at this boundary; nothing malformed flows
//! into the sync executor. A listing failure aborts the whole run since
//! there is nothing to synchronize without a trusted repository list.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::types::{RepoDescriptor, RepoKey, Visibility};

const API_ROOT: &str = "https://api.github.com";
const PAGE_SIZE: usize = 100;
const AFFILIATIONS: &str = "owner,collaborator,organization_member";
/// Immediate retries for transient (5xx / transport) failures only.
const TRANSIENT_RETRIES: u32 = 2;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
/// Branch assumed for repositories the API reports without one (empty repos).
const FALLBACK_BRANCH: &str = "main";

/// Errors from the listing service boundary. All of these are fatal to the
/// run: no partial listing is trusted.
#[derive(Error, Debug)]
pub enum ListingError {
    #[error("authentication rejected by GitHub (HTTP {0})")]
    Auth(u16),
    #[error("GitHub API returned HTTP {0}")]
    Status(u16),
    #[error("could not reach GitHub: {0}")]
    Transport(String),
    #[error("malformed listing response: {0}")]
    Malformed(String),
    #[error("interrupted before the listing completed")]
    Interrupted,
}

/// Raw repository record as returned by `GET /user/repos`.
#[derive(Debug, Deserialize)]
struct ApiRepo {
    name: String,
    owner: ApiOwner,
    ssh_url: String,
    #[serde(default)]
    default_branch: Option<String>,
    private: bool,
}

#[derive(Debug, Deserialize)]
struct ApiOwner {
    login: String,
}

/// Client for the GitHub repository listing API.
///
/// The credential is supplied explicitly by the caller; it is sent only as a
/// request header and never logged.
pub struct ListingClient {
    agent: ureq::Agent,
    api_root: String,
    token: String,
    page_size: usize,
}

impl ListingClient {
    pub fn new(token: String) -> Self {
        Self {
            agent: ureq::builder().timeout(REQUEST_TIMEOUT).build(),
            api_root: API_ROOT.to_string(),
            token,
            page_size: PAGE_SIZE,
        }
    }

    #[cfg(test)]
    fn with_api_root(mut self, api_root: impl Into<String>) -> Self {
        self.api_root = api_root.into();
        self
    }

    /// Page through every repository the token can access (owned,
    /// collaborator, organization member) and return validated, deduplicated
    /// descriptors in listing order.
    ///
    /// The cancellation flag is checked before each page so an interrupt
    /// during a long listing aborts instead of paging on.
    pub fn list_accessible(
        &self,
        cancel: &AtomicBool,
    ) -> Result<Vec<RepoDescriptor>, ListingError> {
        let mut raw = Vec::new();
        let mut page = 1u32;

        loop {
            if cancel.load(Ordering::Relaxed) {
                return Err(ListingError::Interrupted);
            }

            let body = self.fetch_page(page)?;
            let batch: Vec<ApiRepo> = serde_json::from_str(&body)
                .map_err(|e| ListingError::Malformed(e.to_string()))?;
            let count = batch.len();
            log::debug!("listing page {}: {} repositories", page, count);
            raw.extend(batch);

            // A short page marks end-of-data.
            if count < self.page_size {
                break;
            }
            page += 1;
        }

        let descriptors = raw
            .into_iter()
            .map(convert_record)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(dedup_descriptors(descriptors))
    }

    fn fetch_page(&self, page: u32) -> Result<String, ListingError> {
        let url = format!("{}/user/repos", self.api_root);
        let mut attempt = 0u32;

        loop {
            let result = self
                .agent
                .get(&url)
                .set("Authorization", &format!("Bearer {}", self.token))
                .set("Accept", "application/vnd.github+json")
                .set("User-Agent", "ghsync")
                .query("affiliation", AFFILIATIONS)
                .query("per_page", &self.page_size.to_string())
                .query("page", &page.to_string())
                .call();

            match result {
                Ok(response) => {
                    return response
                        .into_string()
                        .map_err(|e| ListingError::Transport(e.to_string()));
                }
                Err(ureq::Error::Status(code @ (401 | 403), _)) => {
                    // Auth failure or rate-limit denial: not transient.
                    return Err(ListingError::Auth(code));
                }
                Err(ureq::Error::Status(code @ 500..=599, _)) if attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    log::warn!(
                        "listing page {} got HTTP {}, retry {}/{}",
                        page,
                        code,
                        attempt,
                        TRANSIENT_RETRIES
                    );
                }
                Err(ureq::Error::Status(code, _)) => return Err(ListingError::Status(code)),
                Err(ureq::Error::Transport(e)) if attempt < TRANSIENT_RETRIES => {
                    attempt += 1;
                    log::warn!(
                        "listing page {} transport error ({}), retry {}/{}",
                        page,
                        e,
                        attempt,
                        TRANSIENT_RETRIES
                    );
                }
                Err(ureq::Error::Transport(e)) => {
                    return Err(ListingError::Transport(e.to_string()));
                }
            }
        }
    }
}

/// Validate one raw record into a fixed descriptor. Rejecting here keeps
/// ambiguous shapes out of the executor.
fn convert_record(record: ApiRepo) -> Result<RepoDescriptor, ListingError> {
    let key_str = format!("{}/{}", record.owner.login, record.name);
    let key: RepoKey = key_str
        .parse()
        .map_err(|e| ListingError::Malformed(format!("repository '{}': {}", key_str, e)))?;

    if record.ssh_url.is_empty() {
        return Err(ListingError::Malformed(format!(
            "repository '{}' has no ssh_url",
            key
        )));
    }

    let default_branch = match record.default_branch {
        Some(branch) if !branch.is_empty() => branch,
        _ => {
            log::debug!("{} has no default branch, assuming {}", key, FALLBACK_BRANCH);
            FALLBACK_BRANCH.to_string()
        }
    };

    Ok(RepoDescriptor {
        key,
        clone_url: record.ssh_url,
        default_branch,
        visibility: if record.private {
            Visibility::Private
        } else {
            Visibility::Public
        },
    })
}

/// Deduplicate by repository identity, keeping the first-seen descriptor.
///
/// The same repository can be reachable through multiple access paths (owned
/// and collaborator, say). When duplicates disagree on the clone endpoint the
/// conflict is logged rather than silently resolved.
fn dedup_descriptors(descriptors: Vec<RepoDescriptor>) -> Vec<RepoDescriptor> {
    let mut seen: HashSet<RepoKey> = HashSet::new();
    let mut out: Vec<RepoDescriptor> = Vec::with_capacity(descriptors.len());

    for desc in descriptors {
        if seen.contains(&desc.key) {
            if let Some(kept) = out.iter().find(|d| d.key == desc.key) {
                if kept.clone_url != desc.clone_url {
                    log::warn!(
                        "{} listed with conflicting clone endpoints ({} vs {}), keeping the first",
                        desc.key,
                        kept.clone_url,
                        desc.clone_url
                    );
                }
            }
            continue;
        }
        seen.insert(desc.key.clone());
        out.push(desc);
    }

    out
}
