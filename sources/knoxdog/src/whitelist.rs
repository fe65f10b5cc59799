//! Infers the gateway's dispatch whitelist from the cluster's host inventory.
//!
//! Every fully-qualified host is reduced to its domain suffix, the last two labels of its name.
//! If all hosts agree on one suffix, the whitelist admits any `http`/`https` URL whose host ends in
//! that domain, compared without regard to case. Hosts spanning several domains are refused rather than guessed at.

use crate::error::{self, Result};
use log::{debug, warn};
use regex::Regex;
use snafu::{ensure, ResultExt};
use std::collections::BTreeSet;
use std::fmt;

/// A regular expression, in the syntax Knox reads `gateway.dispatch.whitelist` with, admitting
/// URLs on hosts within one domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelistPattern {
    domain: String,
    pattern: String,
}

impl WhitelistPattern {
    fn for_domain(domain: &str) -> Self {
        // The host part excludes the characters that would let a URL smuggle a different real
        // host past the suffix check, e.g. `a.example.com:1@evil.org`. Host names compare
        // case-insensitively, matching how the domain was folded.
        let pattern = format!(
            r"(?i)^https?://[^/?#@:]+\.{}:[0-9]+(/.*)?$",
            regex::escape(domain)
        );
        Self {
            domain: domain.to_string(),
            pattern,
        }
    }

    /// The common domain the pattern was built from.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn to_regex(&self) -> Result<Regex> {
        Regex::new(&self.pattern).context(error::WhitelistRegexSnafu {
            pattern: &self.pattern,
        })
    }
}

impl fmt::Display for WhitelistPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.pattern)
    }
}

/// Returns the last two labels of `host`, or `None` if `host` has fewer than three labels and so
/// isn't a fully-qualified name.
fn domain_suffix(host: &str) -> Option<String> {
    let labels: Vec<&str> = host.trim().split('.').collect();
    if labels.len() < 3 || labels.iter().any(|label| label.is_empty()) {
        return None;
    }
    Some(labels[labels.len() - 2..].join(".").to_lowercase())
}

/// Infers a whitelist from `hosts`. Fails if no host is fully-qualified, or if the qualifying
/// hosts don't share exactly one domain suffix.
pub fn infer_whitelist<I, S>(hosts: I) -> Result<WhitelistPattern>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut domains = BTreeSet::new();
    for host in hosts {
        let host = host.as_ref();
        match domain_suffix(host) {
            Some(domain) => {
                debug!("Host '{}' is in domain '{}'", host, domain);
                domains.insert(domain);
            }
            None => warn!("Skipping '{}', not a fully-qualified hostname", host),
        }
    }

    ensure!(!domains.is_empty(), error::InsufficientHostsSnafu);
    ensure!(
        domains.len() == 1,
        error::InconsistentDomainSnafu {
            domains: domains.iter().cloned().collect::<Vec<_>>(),
        }
    );

    // Exactly one element, checked above.
    let domain = domains.iter().next().map(String::as_str).unwrap_or_default();
    Ok(WhitelistPattern::for_domain(domain))
}
