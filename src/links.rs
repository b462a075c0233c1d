use reqwest::Url;
use tracing::{debug, warn};

/// Opens `url` in the system browser or the app registered for it.
pub fn open_external(url: &str) -> bool {
    match open::that(url) {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to open {}: {}", url, err);
            false
        }
    }
}

/// Pulls the auth token out of a sign-in deep link such as
/// `tlivevoice://auth/callback?token=abc`.
pub fn auth_token_from_deep_link(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;

    let is_auth = url.host_str() == Some("auth")
        || url
            .path_segments()
            .map_or(false, |mut segments| segments.any(|segment| segment == "auth"));
    if !is_auth {
        return None;
    }

    let token = url
        .query_pairs()
        .find(|(key, _)| key == "token")
        .map(|(_, value)| value.into_owned())?;

    if token.is_empty() {
        debug!("Deep link carried an empty token");
        return None;
    }

    Some(token)
}
