//! Candidate discovery from an IPTV search site.

pub mod links;

use reqwest::{Client, StatusCode};
use url::Url;

pub use links::{dedup, extract_stream_links, is_stream_url};

use crate::error::ProbeError;
use crate::probe::error_chain;

pub const DEFAULT_SEARCH_URL: &str = "http://tonkiang.us/";

/// Build the URL of one result page. The first page carries no page number.
pub fn search_url(base_url: &str, keyword: &str, page: u32) -> Result<Url, ProbeError> {
    let mut url = Url::parse(base_url).map_err(|e| ProbeError::InvalidUrl(format!("{base_url}: {e}")))?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("iptv", keyword);
        if page > 1 {
            query.append_pair("page", &page.to_string());
        }
    }
    Ok(url)
}

/// Fetch one result page and extract the stream links on it.
pub async fn fetch_search_page(
    client: &Client,
    base_url: &str,
    keyword: &str,
    page: u32,
) -> Result<Vec<String>, ProbeError> {
    let url = search_url(base_url, keyword, page)?;
    log::info!("Searching {url}");

    let response = client.get(url).send().await?;
    if response.status() != StatusCode::OK {
        return Err(ProbeError::Status(response.status().as_u16()));
    }
    let body = response.text().await?;

    let links = extract_stream_links(&body);
    log::info!("Page {page}: {} stream links", links.len());
    Ok(links)
}

/// Walk `pages` result pages and return the unique links in first-seen order.
/// A page that fails is logged and skipped.
pub async fn search(client: &Client, base_url: &str, keyword: &str, pages: u32) -> Vec<String> {
    let mut all = vec![];
    for page in 1..=pages {
        match fetch_search_page(client, base_url, keyword, page).await {
            Ok(links) => all.extend(links),
            Err(e) => log::warn!("Search page {page} failed: {}", error_chain(&e)),
        }
    }
    let unique = dedup(all);
    log::info!("Found {} unique stream links for {keyword:?}", unique.len());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Route, TestServer};

    #[test]
    fn first_page_has_no_page_param() {
        let url = search_url(DEFAULT_SEARCH_URL, "五星体育", 1).unwrap();
        assert_eq!(url.query_pairs().count(), 1);
        assert_eq!(
            url.query_pairs().next().map(|(k, v)| (k.into_owned(), v.into_owned())),
            Some(("iptv".to_string(), "五星体育".to_string()))
        );

        let url = search_url(DEFAULT_SEARCH_URL, "cctv5", 3).unwrap();
        assert_eq!(url.as_str(), "http://tonkiang.us/?iptv=cctv5&page=3");
    }

    #[test]
    fn bad_base_url_is_an_error() {
        assert!(matches!(search_url("not a url", "x", 1), Err(ProbeError::InvalidUrl(_))));
    }

    #[tokio::test]
    async fn fetches_links_from_result_page() {
        let page = r#"<div class="result"><a data-url="http://198.51.100.2/live/ch1.m3u8">CH1</a></div>"#;
        let server = TestServer::start(vec![("/", Route::text(page))]).await;

        let links = fetch_search_page(&Client::new(), &server.url("/"), "ch1", 1).await.unwrap();
        // found by the data attribute and again as a quoted URL
        assert_eq!(links.len(), 2);
        assert_eq!(dedup(links), vec!["http://198.51.100.2/live/ch1.m3u8"]);
    }

    #[tokio::test]
    async fn error_status_fails_the_page() {
        let server = TestServer::start(vec![("/", Route::status(503, "busy"))]).await;
        let err = fetch_search_page(&Client::new(), &server.url("/"), "ch1", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Status(503)));
    }

    #[tokio::test]
    async fn search_merges_pages_and_skips_failures() {
        let page = r#"<a href="http://198.51.100.2/live/ch1.m3u8">CH1</a>"#;
        let server = TestServer::start(vec![("/", Route::text(page))]).await;

        // every page serves the same link, it is reported once
        let links = search(&Client::new(), &server.url("/"), "ch1", 3).await;
        assert_eq!(links, vec!["http://198.51.100.2/live/ch1.m3u8"]);
        assert_eq!(server.hits(), 3);

        let missing = search(&Client::new(), "http://127.0.0.1:9/", "ch1", 1).await;
        assert!(missing.is_empty());
    }
}
