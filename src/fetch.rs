//! Opening a download as a stream to extract from

use std::time::Duration;

use log::*;
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FetchError {
    /// The request couldn't be made, or the connection failed.
    #[error("Couldn't request {url}")]
    Request {
        url: String,
        source: reqwest::Error,
    },

    /// The server answered with something other than success.
    #[error("{url} answered {status}")]
    Status { url: String, status: StatusCode },
}

/// How to make the request
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub connect_timeout: Duration,
    pub user_agent: String,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(30),
            user_agent: format!("zipball/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Starts downloading `url`, following redirects.
///
/// The returned response implements [`Read`](std::io::Read),
/// yielding the body as it arrives.
pub fn open(url: &str, options: &FetchOptions) -> Result<Response, FetchError> {
    let request_error = |source| FetchError::Request {
        url: url.to_owned(),
        source,
    };

    let client = Client::builder()
        .user_agent(options.user_agent.as_str())
        .connect_timeout(options.connect_timeout)
        // The body streams for as long as the archive takes to arrive.
        .timeout(None)
        .build()
        .map_err(request_error)?;

    debug!("GET {}", url);
    let response = client.get(url).send().map_err(request_error)?;
    let status = response.status();
    debug!("{} answered {} from {}", url, status, response.url());
    if !status.is_success() {
        return Err(FetchError::Status {
            url: url.to_owned(),
            status,
        });
    }
    if let Some(length) = response.content_length() {
        info!("Downloading {} bytes", length);
    }
    Ok(response)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_options() {
        let options = FetchOptions::default();
        assert_eq!(options.connect_timeout, Duration::from_secs(30));
        assert!(options.user_agent.starts_with("zipball/"));
    }

    #[test]
    fn bad_url() {
        let err = open("not a url", &FetchOptions::default()).unwrap_err();
        match err {
            FetchError::Request { url, .. } => assert_eq!(url, "not a url"),
            other => panic!("Unexpected {:?}", other),
        }
    }
}
