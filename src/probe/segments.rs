use url::Url;

/// Collect up to `max` media segment URLs from a playlist, in playlist order.
///
/// Directive lines (`#...`) and blank lines are skipped. Absolute references are
/// kept as they are, relative ones are resolved against `playlist_url`. Lines that
/// cannot be resolved are dropped. An empty result is not an error, it tells the
/// caller to fall back to an estimated speed.
pub fn segment_urls(playlist: &str, playlist_url: &str, max: usize) -> Vec<String> {
    let base = Url::parse(playlist_url).ok();

    playlist
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| resolve(base.as_ref(), line))
        .take(max)
        .collect()
}

/// Resolve one segment reference.
pub fn resolve(base: Option<&Url>, reference: &str) -> Option<String> {
    if let Ok(absolute) = Url::parse(reference) {
        if absolute.has_host() {
            return Some(reference.to_string());
        }
    }
    base?.join(reference).ok().map(String::from)
}
