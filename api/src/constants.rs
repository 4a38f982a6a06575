//! Application constants

/// Content type used when a variant does not declare one
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Browser-like User-Agent; some media CDNs reject default HTTP clients
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36";

/// Default base URL of the external resolution service
pub const DEFAULT_RESOLVER_BASE_URL: &str = "http://127.0.0.1:8000";

/// Public tweet syndication endpoint used for Twitter resolution
pub const DEFAULT_TWITTER_SYNDICATION_URL: &str = "https://cdn.syndication.twimg.com";

/// Directory name created under the OS temp dir for transient media
pub const TEMP_DIR_NAME: &str = "media-relay";

/// Transient media older than this is swept (30 minutes)
pub const DEFAULT_RETENTION_SECS: u64 = 30 * 60;

pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 120;

/// Largest media body we will buffer (512 MB)
pub const DEFAULT_MAX_MEDIA_BYTES: u64 = 512 * 1024 * 1024;

/// Inbound JSON bodies only carry a URL (16 KB limit)
pub const MAX_REQUEST_BODY_SIZE: usize = 16 * 1024;
