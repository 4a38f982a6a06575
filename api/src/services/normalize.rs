//! URL normalization and validation.
//!
//! Every provider is described by a small table of [`UrlValidationRule`]s:
//! the hosts it accepts, a path pattern whose first capture group is the
//! media id, and the canonical form to rewrite into. Rewriting drops the
//! parts of the path the provider ignores (author handles, tracking query
//! parameters) so the resolver always sees one URL per piece of content.

use regex::Regex;
use std::sync::LazyLock;
use url::Url;

use crate::models::{NormalizedUrl, Provider};
use crate::services::error::PipelineError;

struct UrlValidationRule {
    provider: Provider,
    /// Hosts without a leading `www.`
    hosts: &'static [&'static str],
    /// Matched against the path plus `?query`; group 1 is the media id
    pattern: Regex,
    canonical_host: &'static str,
    /// `{id}` is replaced with the captured media id
    canonical_path: &'static str,
}

impl UrlValidationRule {
    fn new(
        provider: Provider,
        hosts: &'static [&'static str],
        pattern: &str,
        canonical_host: &'static str,
        canonical_path: &'static str,
    ) -> Self {
        Self {
            provider,
            hosts,
            pattern: Regex::new(pattern).expect("static URL pattern must compile"),
            canonical_host,
            canonical_path,
        }
    }

    fn accepts_host(&self, host: &str) -> bool {
        self.hosts.contains(&host)
    }

    fn rewrite(&self, path_and_query: &str) -> Option<(String, String)> {
        let id = self.pattern.captures(path_and_query)?.get(1)?.as_str();
        let path = self.canonical_path.replace("{id}", id);
        Some((format!("https://{}{}", self.canonical_host, path), id.to_string()))
    }
}

const TWITTER_HOSTS: &[&str] = &["twitter.com", "x.com", "mobile.twitter.com", "mobile.x.com"];
const BILIBILI_HOSTS: &[&str] = &["bilibili.com", "m.bilibili.com"];
const YOUTUBE_HOSTS: &[&str] = &["youtube.com", "m.youtube.com", "music.youtube.com"];

static RULES: LazyLock<Vec<UrlValidationRule>> = LazyLock::new(|| {
    vec![
        UrlValidationRule::new(
            Provider::Twitter,
            TWITTER_HOSTS,
            r"^/(?:i/web|\w+)/status(?:es)?/(\d+)(?:[/?].*)?$",
            "twitter.com",
            "/i/status/{id}",
        ),
        UrlValidationRule::new(
            Provider::Bilibili,
            BILIBILI_HOSTS,
            r"^/video/(BV[0-9A-Za-z]{10}|av\d+)(?:[/?].*)?$",
            "www.bilibili.com",
            "/video/{id}",
        ),
        UrlValidationRule::new(
            Provider::Bilibili,
            &["b23.tv"],
            r"^/([0-9A-Za-z]+)/?(?:\?.*)?$",
            "b23.tv",
            "/{id}",
        ),
        UrlValidationRule::new(
            Provider::YouTube,
            YOUTUBE_HOSTS,
            r"^/watch\?(?:.*&)?v=([A-Za-z0-9_-]{11})(?:&.*)?$",
            "www.youtube.com",
            "/watch?v={id}",
        ),
        UrlValidationRule::new(
            Provider::YouTube,
            YOUTUBE_HOSTS,
            r"^/(?:shorts|embed|live)/([A-Za-z0-9_-]{11})(?:[/?].*)?$",
            "www.youtube.com",
            "/watch?v={id}",
        ),
        UrlValidationRule::new(
            Provider::YouTube,
            &["youtu.be"],
            r"^/([A-Za-z0-9_-]{11})(?:[/?].*)?$",
            "www.youtube.com",
            "/watch?v={id}",
        ),
    ]
});

fn has_http_scheme(url: &str) -> bool {
    let lower = url.get(..8).unwrap_or(url).to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// `Url` silently accepts an empty userinfo (`https://@x.com`), so look at the
/// raw authority instead.
fn has_userinfo(url: &str) -> bool {
    let authority = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
    let end = authority.find(['/', '?', '#']).unwrap_or(authority.len());
    authority[..end].contains('@')
}

/// Canonicalize a user-supplied URL for `provider`.
///
/// Fails with [`PipelineError::InvalidUrl`] when the host is not one of the
/// provider's hosts or the path carries no well-formed media id.
pub fn normalize(raw_url: &str, provider: Provider) -> Result<NormalizedUrl, PipelineError> {
    let trimmed = raw_url.trim();
    let trimmed = trimmed.strip_prefix('@').unwrap_or(trimmed).trim_start();
    if trimmed.is_empty() {
        return Err(PipelineError::InvalidUrl("URL is empty".into()));
    }

    let with_scheme = if has_http_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| PipelineError::InvalidUrl(format!("{}: {}", trimmed, e)))?;
    if has_userinfo(&with_scheme) {
        return Err(PipelineError::InvalidUrl(format!(
            "{}: credentials are not allowed",
            trimmed
        )));
    }
    let host = parsed
        .host_str()
        .ok_or_else(|| PipelineError::InvalidUrl(format!("{}: missing host", trimmed)))?
        .to_ascii_lowercase();
    let host = host.strip_prefix("www.").unwrap_or(&host);

    let path_and_query = match parsed.query() {
        Some(query) => format!("{}?{}", parsed.path(), query),
        None => parsed.path().to_string(),
    };

    let mut host_known = false;
    for rule in RULES
        .iter()
        .filter(|rule| rule.provider == provider && rule.accepts_host(host))
    {
        host_known = true;
        if let Some((canonical_url, media_id)) = rule.rewrite(&path_and_query) {
            return Ok(NormalizedUrl {
                provider,
                canonical_url,
                media_id,
            });
        }
    }

    let reason = if host_known {
        format!("{} does not point to a {} video", trimmed, provider)
    } else {
        format!("{} is not a {} host", host, provider)
    };
    Err(PipelineError::InvalidUrl(reason))
}
