use url::Url;

use crate::error::{Result, ScrapeError};

/// Domain suffixes a chamber scraper may fetch from.
///
/// A host matches when it equals a suffix or is a subdomain of it. The lists
/// are compiled in; widening them is a code change.
#[derive(Clone, Copy, Debug)]
pub struct HostAllowList {
    suffixes: &'static [&'static str],
}

/// Lower chamber site plus the HCDN domain that serves its photos.
pub const DIPUTADOS_HOSTS: HostAllowList = HostAllowList::new(&["diputados.gov.ar", "hcdn.gob.ar"]);
pub const SENADO_HOSTS: HostAllowList = HostAllowList::new(&["senado.gob.ar"]);

impl HostAllowList {
    pub const fn new(suffixes: &'static [&'static str]) -> Self {
        Self { suffixes }
    }

    pub fn allows(&self, url: &str) -> bool {
        let Ok(parsed) = Url::parse(url) else {
            return false;
        };
        if !matches!(parsed.scheme(), "http" | "https") {
            return false;
        }
        let Some(host) = parsed.host_str() else {
            return false;
        };
        let host = host.to_ascii_lowercase();
        self.suffixes.iter().any(|allowed| {
            host == *allowed
                || host
                    .strip_suffix(allowed)
                    .is_some_and(|prefix| prefix.ends_with('.'))
        })
    }

    pub fn check(&self, url: &str) -> Result<()> {
        if self.allows(url) {
            Ok(())
        } else {
            Err(ScrapeError::DisallowedHost(url.to_string()))
        }
    }
}
