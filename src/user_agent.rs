//! User-Agent string for segment and playlist requests.
//!
//! Media CDNs commonly refuse non-browser agents, so requests present a
//! browser token first and identify the tool after it.

/// Browser token presented ahead of the tool identifier.
const BROWSER_TOKEN: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Default User-Agent for every fetch.
#[must_use]
pub(crate) fn default_fetch_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{BROWSER_TOKEN} segmerge/{version}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_starts_with_browser_token() {
        let ua = default_fetch_user_agent();
        assert!(ua.starts_with("Mozilla/5.0"), "unexpected UA: {ua}");
    }

    #[test]
    fn test_user_agent_carries_crate_version() {
        let ua = default_fetch_user_agent();
        let version = ua
            .rsplit(' ')
            .next()
            .and_then(|token| token.strip_prefix("segmerge/"));
        assert_eq!(version, Some(env!("CARGO_PKG_VERSION")));
    }
}
