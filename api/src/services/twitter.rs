//! Twitter resolution through the public tweet syndication endpoint.
//!
//! The endpoint serves the same JSON the embedded-tweet widget uses, which
//! lists every MP4 rendition with its bitrate. No credentials are needed.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use crate::models::{NormalizedUrl, RawVariant, ResolvedMedia};
use crate::services::resolver::{MediaResolver, ResolveError};

const HLS_CONTENT_TYPE: &str = "application/x-mpegurl";

#[derive(Clone)]
pub struct TwitterSyndicationResolver {
    base_url: String,
    http: Client,
}

impl TwitterSyndicationResolver {
    pub fn new(base_url: &str, http: Client) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        }
    }
}

#[async_trait]
impl MediaResolver for TwitterSyndicationResolver {
    fn name(&self) -> &'static str {
        "twitter syndication"
    }

    async fn resolve(&self, url: &NormalizedUrl) -> Result<ResolvedMedia, ResolveError> {
        let tweet_id: u64 = url
            .media_id
            .parse()
            .map_err(|_| ResolveError::Malformed(format!("not a tweet id: {}", url.media_id)))?;
        let token = syndication_token(tweet_id);

        let resp = self
            .http
            .get(format!("{}/tweet-result", self.base_url))
            .query(&[
                ("id", url.media_id.as_str()),
                ("token", token.as_str()),
                ("lang", "en"),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await?;
            let message = if text.trim().is_empty() {
                "tweet not found or not public".to_string()
            } else {
                text
            };
            return Err(ResolveError::Api { status, message });
        }

        let text = resp.text().await?;
        let tweet: TweetResult =
            serde_json::from_str(&text).map_err(|e| ResolveError::Malformed(e.to_string()))?;
        media_from_tweet(tweet)
    }
}

#[derive(Debug, Deserialize)]
struct TweetResult {
    #[serde(rename = "__typename")]
    typename: Option<String>,
    text: Option<String>,
    #[serde(default, rename = "mediaDetails")]
    media_details: Vec<MediaDetail>,
}

#[derive(Debug, Deserialize)]
struct MediaDetail {
    #[serde(rename = "type")]
    kind: Option<String>,
    video_info: Option<VideoInfo>,
}

#[derive(Debug, Deserialize)]
struct VideoInfo {
    #[serde(default)]
    variants: Vec<RawVariant>,
}

fn media_from_tweet(tweet: TweetResult) -> Result<ResolvedMedia, ResolveError> {
    if tweet.typename.as_deref() == Some("TweetTombstone") {
        return Err(ResolveError::Unavailable(
            "tweet is unavailable (deleted, protected or age-restricted)".into(),
        ));
    }

    // HLS playlists are not a single downloadable file
    let variants = tweet
        .media_details
        .into_iter()
        .filter(|m| matches!(m.kind.as_deref(), Some("video") | Some("animated_gif")))
        .filter_map(|m| m.video_info)
        .flat_map(|info| info.variants)
        .filter(|v| {
            !v.content_type
                .as_deref()
                .is_some_and(|c| c.eq_ignore_ascii_case(HLS_CONTENT_TYPE))
        })
        .collect();

    Ok(ResolvedMedia {
        title: tweet.text,
        variants,
    })
}

/// Token the syndication endpoint expects alongside a tweet id:
/// `(id / 1e15) * PI` written in base 36 with zeros and the point removed.
fn syndication_token(tweet_id: u64) -> String {
    let value = (tweet_id as f64 / 1e15) * std::f64::consts::PI;
    to_radix36(value)
        .chars()
        .filter(|c| *c != '0' && *c != '.')
        .collect()
}

fn to_radix36(value: f64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    const MAX_FRACTION_DIGITS: usize = 16;

    let mut int_part = value.trunc() as u64;
    let mut int_digits = Vec::new();
    loop {
        int_digits.push(DIGITS[(int_part % 36) as usize] as char);
        int_part /= 36;
        if int_part == 0 {
            break;
        }
    }
    let mut out: String = int_digits.into_iter().rev().collect();

    let mut frac = value.fract();
    if frac > 0.0 {
        out.push('.');
        for _ in 0..MAX_FRACTION_DIGITS {
            frac *= 36.0;
            let digit = frac.trunc();
            out.push(DIGITS[digit as usize] as char);
            frac -= digit;
            if frac <= 0.0 {
                break;
            }
        }
    }
    out
}
