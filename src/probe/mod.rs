pub mod classifier;
pub mod connectivity;
pub mod generic;
pub mod result;
pub mod segments;
pub mod socket;
pub mod stream;
pub mod target;
pub mod throughput;

pub mod prelude {
    pub use super::result::{Measurement, ProbeResult};
    pub use super::stream::StreamProbe;
    pub use super::target::Target;
}

use std::fmt::Write;

/// Flatten an error and its sources into one line, e.g.
/// `error sending request: client error (Connect): connection refused`.
pub fn error_chain(mut err: &(dyn std::error::Error + 'static)) -> String {
    let mut s = format!("{}", err);
    while let Some(src) = err.source() {
        let text = src.to_string();
        // reqwest repeats the inner message in some wrappers
        if !s.ends_with(&text) {
            let _ = write!(s, ": {}", text);
        }
        err = src;
    }
    s
}

/// Read at most `limit` bytes of a response body.
/// A transport error ends the read, the bytes received so far are returned with it.
pub(crate) async fn read_bounded(
    response: &mut reqwest::Response,
    limit: usize,
) -> (Vec<u8>, Option<reqwest::Error>) {
    let mut buf = Vec::with_capacity(limit.min(64 * 1024));
    let result = fill(response, &mut buf, limit, limit).await;
    (buf, result.err())
}

/// Append body chunks to `buf` until it holds at least `want` bytes or the body
/// ends. `buf` never grows past `cap`. Returns whether the body is exhausted.
pub(crate) async fn fill(
    response: &mut reqwest::Response,
    buf: &mut Vec<u8>,
    want: usize,
    cap: usize,
) -> Result<bool, reqwest::Error> {
    while buf.len() < want.min(cap) {
        match response.chunk().await? {
            Some(chunk) => {
                let take = (cap - buf.len()).min(chunk.len());
                buf.extend_from_slice(&chunk[..take]);
            }
            None => return Ok(true),
        }
    }
    Ok(false)
}
