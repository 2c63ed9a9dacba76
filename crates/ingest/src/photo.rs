use crate::fetcher::PageSource;
use crate::security::HostAllowList;

const SMALL_MARKER: &str = "_small.";
const MEDIUM_MARKER: &str = "_medium.";

/// Thumbnail URL rewritten to its medium-size variant.
pub fn normalize_photo_url(url: &str) -> String {
    url.replace(SMALL_MARKER, MEDIUM_MARKER)
}

/// Candidate photo URLs in preference order, without blanks, duplicates or
/// hosts outside the allow-list.
pub fn photo_candidates(profile_photo: &str, list_photo: &str, allow: &HostAllowList) -> Vec<String> {
    let mut candidates: Vec<String> = Vec::with_capacity(3);
    for candidate in [
        profile_photo.to_string(),
        list_photo.to_string(),
        normalize_photo_url(list_photo),
    ] {
        if candidate.is_empty() || !allow.allows(&candidate) || candidates.contains(&candidate) {
            continue;
        }
        candidates.push(candidate);
    }
    candidates
}

/// First candidate that answers a probe, else the list photo unchanged.
pub async fn resolve_photo_url(
    source: &dyn PageSource,
    profile_photo: &str,
    list_photo: &str,
    allow: &HostAllowList,
) -> String {
    for candidate in photo_candidates(profile_photo, list_photo, allow) {
        if source.probe(&candidate).await {
            return candidate;
        }
        tracing::debug!(url = %candidate, "photo candidate unavailable");
    }
    list_photo.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::DIPUTADOS_HOSTS;
    use crate::testing::StubSource;

    const LIST: &str = "https://www.diputados.gov.ar/img/fotos/jdoe_small.jpg";
    const MEDIUM: &str = "https://www.diputados.gov.ar/img/fotos/jdoe_medium.jpg";
    const PROFILE: &str = "https://www4.hcdn.gob.ar/fotos/jdoe.jpg";

    #[test]
    fn candidates_are_ordered_and_filtered() {
        assert_eq!(
            photo_candidates(PROFILE, LIST, &DIPUTADOS_HOSTS),
            vec![PROFILE.to_string(), LIST.to_string(), MEDIUM.to_string()]
        );
        assert_eq!(
            photo_candidates("https://evil.example.com/x.jpg", MEDIUM, &DIPUTADOS_HOSTS),
            vec![MEDIUM.to_string()]
        );
        assert_eq!(photo_candidates("", LIST, &DIPUTADOS_HOSTS).len(), 2);
    }

    #[tokio::test]
    async fn profile_photo_wins_when_live() {
        let source = StubSource::new().live(PROFILE).live(LIST);
        assert_eq!(resolve_photo_url(&source, PROFILE, LIST, &DIPUTADOS_HOSTS).await, PROFILE);
    }

    #[tokio::test]
    async fn medium_variant_used_when_only_it_answers() {
        let source = StubSource::new().live(MEDIUM);
        assert_eq!(resolve_photo_url(&source, PROFILE, LIST, &DIPUTADOS_HOSTS).await, MEDIUM);
    }

    #[tokio::test]
    async fn falls_back_to_list_photo() {
        let source = StubSource::new();
        assert_eq!(resolve_photo_url(&source, PROFILE, LIST, &DIPUTADOS_HOSTS).await, LIST);
    }
}
