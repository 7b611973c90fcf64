//! Decides whether a fetched playlist is a genuine live stream.
//!
//! Classification is a table of named rules evaluated top-down, the first rule
//! that returns a verdict wins. Rules only look at the body, the source URL and
//! the configured thresholds, so the same input always yields the same verdict.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::config::ClassifierConfig;

pub const PLAYLIST_HEADER: &str = "#EXTM3U";
pub const SEGMENT_TAG: &str = "#EXTINF:";
pub const END_LIST_TAG: &str = "#EXT-X-ENDLIST";
pub const VOD_TAG: &str = "#EXT-X-PLAYLIST-TYPE:VOD";

/// Markers of API error payloads, matched as-is.
const API_ERROR_TOKENS: &[&str] = &["\"Ret\"", "\"Reason\"", "无效", "失败", "链接已失效"];

/// Error words matched case-insensitively.
const ERROR_WORDS: &[&str] = &["invalid", "expired", "error", "not exist"];

static EMBEDDED_PLAYLIST: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"https?://[^\s"'<>]+m3u8[^\s"'<>]*"#).expect("valid regex"));

/// Why a playlist was turned down. The `Display` text ends up in the probe result.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Rejection {
    #[error("JSON response instead of playlist")]
    JsonBody,

    #[error("Response too small ({0} bytes), likely an error page")]
    TooSmall(usize),

    #[error("API error response (token invalid or other error)")]
    ErrorToken,

    #[error("HTML redirect page without valid playlist link")]
    HtmlPage,

    #[error("Not a valid playlist (missing #EXTM3U)")]
    MissingHeader,

    #[error("Static test content or sample video, not live stream")]
    StaticContent,

    #[error("VOD (Video On Demand) stream, not live")]
    Vod,

    #[error("Playlist does not contain media segments ({0})")]
    NoSegments(usize),

    #[error("URL indicates test or static content")]
    TestUrl,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Live,
    /// The body is an HTML page pointing at another playlist.
    Embedded(String),
    Rejected(Rejection),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Name of the rule that decided, `"live"` when every rule passed.
    pub rule: &'static str,
    pub verdict: Verdict,
}

/// A playlist body and the URL it was fetched from, with the lowercase copies
/// most rules need.
pub struct PlaylistInput<'a> {
    pub body: &'a str,
    pub url: &'a str,
    lower_body: String,
    lower_url: String,
}

impl<'a> PlaylistInput<'a> {
    pub fn new(body: &'a str, url: &'a str) -> Self {
        Self {
            body,
            url,
            lower_body: body.to_lowercase(),
            lower_url: url.to_lowercase(),
        }
    }
}

pub struct Rule {
    pub name: &'static str,
    check: fn(&PlaylistInput, &ClassifierConfig) -> Option<Verdict>,
}

impl Rule {
    pub fn check(&self, input: &PlaylistInput, config: &ClassifierConfig) -> Option<Verdict> {
        (self.check)(input, config)
    }
}

pub const RULES: &[Rule] = &[
    Rule {
        name: "json-body",
        check: json_body,
    },
    Rule {
        name: "too-small",
        check: too_small,
    },
    Rule {
        name: "error-tokens",
        check: error_tokens,
    },
    Rule {
        name: "html-page",
        check: html_page,
    },
    Rule {
        name: "missing-header",
        check: missing_header,
    },
    Rule {
        name: "static-content",
        check: static_content,
    },
    Rule {
        name: "vod",
        check: vod,
    },
    Rule {
        name: "no-segments",
        check: no_segments,
    },
    Rule {
        name: "url-tokens",
        check: url_tokens,
    },
];

pub fn classify(body: &str, url: &str, config: &ClassifierConfig) -> Classification {
    let input = PlaylistInput::new(body, url);
    RULES
        .iter()
        .find_map(|rule| {
            rule.check(&input, config).map(|verdict| Classification {
                rule: rule.name,
                verdict,
            })
        })
        .unwrap_or(Classification {
            rule: "live",
            verdict: Verdict::Live,
        })
}

fn reject(rejection: Rejection) -> Option<Verdict> {
    Some(Verdict::Rejected(rejection))
}

fn json_body(input: &PlaylistInput, _: &ClassifierConfig) -> Option<Verdict> {
    is_json_body(input.body).then_some(Verdict::Rejected(Rejection::JsonBody))
}

fn too_small(input: &PlaylistInput, config: &ClassifierConfig) -> Option<Verdict> {
    let len = input.body.len();
    if len < config.min_playlist_bytes {
        return reject(Rejection::TooSmall(len));
    }
    None
}

fn error_tokens(input: &PlaylistInput, _: &ClassifierConfig) -> Option<Verdict> {
    let found = contains_api_error(input.body) || ERROR_WORDS.iter().any(|w| input.lower_body.contains(w));
    found.then_some(Verdict::Rejected(Rejection::ErrorToken))
}

fn html_page(input: &PlaylistInput, _: &ClassifierConfig) -> Option<Verdict> {
    if !input.lower_body.contains("<html") {
        return None;
    }
    match embedded_playlist_url(input.body) {
        Some(url) => Some(Verdict::Embedded(url)),
        None => reject(Rejection::HtmlPage),
    }
}

fn missing_header(input: &PlaylistInput, _: &ClassifierConfig) -> Option<Verdict> {
    (!input.body.starts_with(PLAYLIST_HEADER)).then_some(Verdict::Rejected(Rejection::MissingHeader))
}

fn static_content(input: &PlaylistInput, config: &ClassifierConfig) -> Option<Verdict> {
    let keyword = has_static_keyword(&input.lower_body, config);
    let rendered_output = input.lower_body.contains("output")
        && input.body.matches(".ts").count() > config.max_output_ts_refs;
    let closed_and_long = input.body.contains(END_LIST_TAG)
        && segment_count(input.body) > config.max_closed_segments;

    (keyword || rendered_output || closed_and_long).then_some(Verdict::Rejected(Rejection::StaticContent))
}

fn vod(input: &PlaylistInput, _: &ClassifierConfig) -> Option<Verdict> {
    input.body.contains(VOD_TAG).then_some(Verdict::Rejected(Rejection::Vod))
}

fn no_segments(input: &PlaylistInput, config: &ClassifierConfig) -> Option<Verdict> {
    let count = segment_count(input.body);
    if count < config.min_segments.max(1) {
        return reject(Rejection::NoSegments(count));
    }
    None
}

fn url_tokens(input: &PlaylistInput, config: &ClassifierConfig) -> Option<Verdict> {
    has_static_keyword(&input.lower_url, config).then_some(Verdict::Rejected(Rejection::TestUrl))
}

fn has_static_keyword(lower: &str, config: &ClassifierConfig) -> bool {
    config
        .static_keywords
        .iter()
        .any(|k| !k.is_empty() && lower.contains(&k.to_lowercase()))
}

pub fn segment_count(body: &str) -> usize {
    body.matches(SEGMENT_TAG).count()
}

/// A body whose first non-blank character opens a JSON object.
pub fn is_json_body(text: &str) -> bool {
    text.trim_start().starts_with('{')
}

/// Error payload markers that are never part of a healthy stream.
pub fn contains_api_error(text: &str) -> bool {
    API_ERROR_TOKENS.iter().any(|t| text.contains(t))
}

/// API markers plus the generic error words, the latter case-insensitively.
pub fn contains_error_token(text: &str) -> bool {
    if contains_api_error(text) {
        return true;
    }
    let lower = text.to_lowercase();
    ERROR_WORDS.iter().any(|w| lower.contains(w))
}

pub fn is_html(text: &str) -> bool {
    text.to_lowercase().contains("<html")
}

pub fn mentions_playlist(text: &str) -> bool {
    text.contains("m3u8")
}

/// First absolute playlist URL inside an HTML page, if any.
pub fn embedded_playlist_url(html: &str) -> Option<String> {
    EMBEDDED_PLAYLIST.find(html).map(|m| m.as_str().to_string())
}

/// What the first bytes of an HTTP response look like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sniff {
    Playlist,
    /// HTML that mentions a playlist, possibly a meta refresh or player page.
    HtmlWithPlaylist,
    Other,
}

pub fn sniff(prefix: &str) -> Sniff {
    if is_json_body(prefix) {
        return Sniff::Other;
    }
    if prefix.contains(PLAYLIST_HEADER) {
        return Sniff::Playlist;
    }
    if is_html(prefix) && mentions_playlist(prefix) {
        return Sniff::HtmlWithPlaylist;
    }
    Sniff::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "http://cdn.example.com/live/ch1/index.m3u8";

    fn config() -> ClassifierConfig {
        ClassifierConfig::default()
    }

    fn live_body() -> String {
        "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1042\n\
         #EXTINF:6.000,\nseg1042.ts\n#EXTINF:6.000,\nseg1043.ts\n#EXTINF:6.000,\nseg1044.ts\n"
            .to_string()
    }

    fn rejection(c: &Classification) -> &Rejection {
        match &c.verdict {
            Verdict::Rejected(r) => r,
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[test]
    fn accepts_live_playlist() {
        let c = classify(&live_body(), URL, &config());
        assert_eq!(c.verdict, Verdict::Live);
        assert_eq!(c.rule, "live");
    }

    #[test]
    fn json_always_wins() {
        // a JSON body that also carries a playlist header and segments
        let body = format!("  {{\"msg\": \"{}\"}}", live_body().replace('\n', " "));
        let c = classify(&body, URL, &config());
        assert_eq!(c.rule, "json-body");
        assert_eq!(rejection(&c), &Rejection::JsonBody);
    }

    #[test]
    fn rejects_tiny_body() {
        let c = classify("#EXTM3U\n#EXTINF:1,\na.ts\n", URL, &config());
        assert_eq!(c.rule, "too-small");
        assert!(matches!(rejection(&c), Rejection::TooSmall(_)));
    }

    #[test]
    fn rejects_error_tokens() {
        let upper = format!("{}# Token EXPIRED\n", live_body());
        assert_eq!(classify(&upper, URL, &config()).rule, "error-tokens");

        let api = format!("{}\"Ret\": 1\n", live_body());
        assert_eq!(rejection(&classify(&api, URL, &config())), &Rejection::ErrorToken);
    }

    #[test]
    fn html_with_link_is_embedded() {
        let body = r#"<html><head><meta http-equiv="refresh" content="0;url=http://edge.example.com/live/ch1.m3u8?token=abc"></head><body></body></html>"#;
        let c = classify(body, URL, &config());
        assert_eq!(c.rule, "html-page");
        assert_eq!(
            c.verdict,
            Verdict::Embedded("http://edge.example.com/live/ch1.m3u8?token=abc".to_string())
        );
    }

    #[test]
    fn html_without_link_is_rejected() {
        let body = "<HTML><head><title>Welcome</title></head><body>nothing to see here</body></HTML>";
        let c = classify(body, URL, &config());
        assert_eq!(rejection(&c), &Rejection::HtmlPage);
    }

    #[test]
    fn rejects_missing_header() {
        let body = "#EXTINF:6.000,\nseg1.ts\n#EXTINF:6.000,\nseg2.ts\n#EXTINF:6.000,\nseg3.ts\n";
        let c = classify(body, URL, &config());
        assert_eq!(c.rule, "missing-header");
    }

    #[test]
    fn rejects_static_keyword_in_body() {
        let body = live_body().replace("seg1043.ts", "nosignal_loop.ts");
        assert_eq!(rejection(&classify(&body, URL, &config())), &Rejection::StaticContent);
    }

    #[test]
    fn rejects_closed_long_playlist() {
        let mut body = String::from("#EXTM3U\n#EXT-X-TARGETDURATION:10\n");
        for i in 0..25 {
            body.push_str(&format!("#EXTINF:10.0,\nchunk{i}.ts\n"));
        }
        body.push_str("#EXT-X-ENDLIST\n");
        assert_eq!(classify(&body, URL, &config()).rule, "static-content");
    }

    #[test]
    fn short_closed_playlist_is_not_static() {
        let body = format!("{}#EXT-X-ENDLIST\n", live_body());
        assert_eq!(classify(&body, URL, &config()).verdict, Verdict::Live);
    }

    #[test]
    fn rejects_vod_even_with_segments() {
        let body = live_body().replace("#EXT-X-VERSION:3", "#EXT-X-VERSION:3\n#EXT-X-PLAYLIST-TYPE:VOD");
        let c = classify(&body, URL, &config());
        assert_eq!(c.rule, "vod");
        assert_eq!(rejection(&c), &Rejection::Vod);
        assert_eq!(rejection(&c).to_string(), "VOD (Video On Demand) stream, not live");
    }

    #[test]
    fn rejects_playlist_without_segments() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-MEDIA-SEQUENCE:1\n";
        assert_eq!(rejection(&classify(body, URL, &config())), &Rejection::NoSegments(0));
    }

    #[test]
    fn min_segments_is_configurable() {
        let body = "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXTINF:6.000,\nseg1.ts\n";
        assert_eq!(classify(body, URL, &config()).verdict, Verdict::Live);

        let strict = ClassifierConfig {
            min_segments: 2,
            ..config()
        };
        assert_eq!(rejection(&classify(body, URL, &strict)), &Rejection::NoSegments(1));
    }

    #[test]
    fn url_tokens_override_clean_body() {
        let c = classify(&live_body(), "http://cdn.example.com/DEMO/index.m3u8", &config());
        assert_eq!(c.rule, "url-tokens");
        assert_eq!(rejection(&c), &Rejection::TestUrl);
    }

    #[test]
    fn classification_is_deterministic() {
        let body = live_body().replace("#EXT-X-VERSION:3", "#EXT-X-PLAYLIST-TYPE:VOD");
        let first = classify(&body, URL, &config());
        for _ in 0..10 {
            assert_eq!(classify(&body, URL, &config()), first);
        }
    }

    #[test]
    fn rule_order_is_fixed() {
        let names: Vec<_> = RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "json-body",
                "too-small",
                "error-tokens",
                "html-page",
                "missing-header",
                "static-content",
                "vod",
                "no-segments",
                "url-tokens"
            ]
        );
    }

    #[test]
    fn sniff_routes_bodies() {
        assert_eq!(sniff(&live_body()), Sniff::Playlist);
        assert_eq!(sniff("{\"Ret\": 0, \"#EXTM3U\": 1}"), Sniff::Other);
        assert_eq!(
            sniff("<html><script>var src = 'http://a/b.m3u8';</script></html>"),
            Sniff::HtmlWithPlaylist
        );
        assert_eq!(sniff("<html><body>hello</body></html>"), Sniff::Other);
        assert_eq!(sniff("\x47\x40\x00\x10binary"), Sniff::Other);
    }

    #[test]
    fn error_token_helpers() {
        assert!(contains_error_token("Token Invalid"));
        assert!(contains_error_token("链接已失效"));
        assert!(!contains_error_token("#EXTM3U\n#EXTINF:6,\na.ts"));
        assert!(contains_api_error("{\"Reason\":\"\"}"));
        assert!(!contains_api_error("ERROR"));
    }
}
