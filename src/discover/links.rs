use std::collections::HashSet;
use std::ops::Range;

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

/// Elements whose class names hint at a player, stream or link.
/// The URL is looked up in the markup around the element.
static PLAYER_CLASS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"class\s*=\s*["']([^"']*play[^"']*|[^"']*stream[^"']*|[^"']*link[^"']*)["'][^>]*>([^<]*)"#)
        .expect("valid regex")
});

static ONCLICK_ARG: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"onclick\s*=\s*["']?[a-zA-Z0-9_]+\s*\(\s*["']([^"']+)["']"#).expect("valid regex")
});

static DATA_ATTR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"data-(?:url|link|stream)\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static STREAM_HREF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"href\s*=\s*["']([^"']+(?:\.m3u8|\.m3u|/live/|/hls/|udp://|rtmp://|rtsp://)[^"']*)["']"#)
        .expect("valid regex")
});

static QUOTED_STREAM_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"["'](https?://[^"']+(?:\.m3u8|\.m3u|/live/|/hls/)[^"']*)["']"#).expect("valid regex")
});

static ANY_HREF: Lazy<Regex> = Lazy::new(|| Regex::new(r#"href\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static ANY_SRC: Lazy<Regex> = Lazy::new(|| Regex::new(r#"src\s*=\s*["']([^"']+)["']"#).expect("valid regex"));

static QUOTED_HTTP_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"["'](https?://[^"'\s]+)["']"#).expect("valid regex"));

/// Bytes searched on each side of a player element.
const CONTEXT_RADIUS: usize = 200;

const SCHEMES: &[&str] = &["http", "udp", "rtmp", "rtsp"];

const STATIC_ASSETS: &[&str] = &[".js", ".css", ".png", ".jpg", ".gif", ".ico", "w3.org", "pagead"];
const WEB_PAGES: &[&str] = &[".html", ".htm", ".php", ".aspx", ".jsp", ".cgi"];
const TRACKERS: &[&str] = &["google", "baidu", "bing", "analytics", "tracking", "stat"];

const STREAM_MARKERS: &[&str] = &[
    ".m3u8", ".m3u", ".ts", ".m4s", "/live/", "/hls/", "udp://", "rtmp://", "rtsp://",
];
const STREAM_WORDS: &[&str] = &[
    "stream", "play", "media", "video", "tv", "channel", "cdn", "live", "iptv", "cam",
];
const PRIVATE_HOSTS: &[&str] = &["192.168.", "10.", "172.16.", "172.31.", "127.0.0.1"];

/// Collect candidate stream URLs from a search result page, in the order
/// the strategies find them. Duplicates are kept, see [`dedup`].
pub fn extract_stream_links(page: &str) -> Vec<String> {
    let mut links = vec![];

    for m in PLAYER_CLASS.find_iter(page) {
        if let Some(url) = url_near(page, m.range()) {
            links.push(url);
        }
    }

    for pattern in [&*ONCLICK_ARG, &*DATA_ATTR, &*STREAM_HREF, &*QUOTED_STREAM_URL] {
        links.extend(
            pattern
                .captures_iter(page)
                .filter_map(|c| c.get(1))
                .map(|m| m.as_str())
                .filter(|url| is_stream_url(url))
                .map(str::to_string),
        );
    }

    links
}

/// First stream URL found around a matched element.
fn url_near(page: &str, element: Range<usize>) -> Option<String> {
    let start = char_boundary_before(page, element.start.saturating_sub(CONTEXT_RADIUS));
    let end = char_boundary_after(page, (element.end + CONTEXT_RADIUS).min(page.len()));
    let context = &page[start..end];

    [&*ONCLICK_ARG, &*DATA_ATTR, &*ANY_HREF, &*ANY_SRC, &*QUOTED_HTTP_URL]
        .into_iter()
        .flat_map(|pattern| pattern.captures_iter(context).filter_map(|c| c.get(1)))
        .map(|m| m.as_str())
        .find(|url| is_stream_url(url))
        .map(str::to_string)
}

fn char_boundary_before(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

fn char_boundary_after(s: &str, mut i: usize) -> usize {
    while !s.is_char_boundary(i) {
        i += 1;
    }
    i
}

/// Heuristic filter for links that could be a stream.
pub fn is_stream_url(url: &str) -> bool {
    if !SCHEMES.iter().any(|s| url.starts_with(s)) {
        return false;
    }

    let lower = url.to_lowercase();
    let contains_any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

    if contains_any(STATIC_ASSETS) || contains_any(WEB_PAGES) || contains_any(TRACKERS) {
        return false;
    }
    if contains_any(STREAM_MARKERS) || contains_any(STREAM_WORDS) {
        return true;
    }
    if lower.contains("://") && contains_any(PRIVATE_HOSTS) {
        return true;
    }

    // plenty of origins serve from a bare host on a non-standard port
    Url::parse(url).is_ok_and(|u| u.port().is_some())
}

/// Drop repeated URLs, keeping the first occurrence.
pub fn dedup(urls: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    urls.into_iter().filter(|url| seen.insert(url.clone())).collect()
}
