// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Fetching repository files over HTTP. */

use {
    crate::{
        error::{CommandIndexError, Result},
        io::DataResolver,
    },
    async_trait::async_trait,
    futures::{stream::TryStreamExt, AsyncRead},
    log::debug,
    reqwest::{Client, IntoUrl, Url},
    std::pin::Pin,
};

fn transport_error(url: &Url, message: String) -> CommandIndexError {
    CommandIndexError::RepositoryIoPath(
        url.to_string(),
        std::io::Error::new(std::io::ErrorKind::Other, message),
    )
}

/// Reads files of a repository mirror served over HTTP(S).
///
/// The base URL is the directory holding `dists/`. e.g.
/// `https://packages-cf.termux.dev/apt/termux-main`.
#[derive(Debug)]
pub struct HttpRepositoryClient {
    client: Client,
    base_url: Url,
}

impl HttpRepositoryClient {
    /// Construct an instance for a repository base URL.
    pub fn new(url: impl IntoUrl) -> Result<Self> {
        Self::new_client(Client::default(), url)
    }

    /// Construct an instance sharing an existing [Client].
    pub fn new_client(client: Client, url: impl IntoUrl) -> Result<Self> {
        let mut base_url = url.into_url()?;

        // Url::join() replaces the last path segment unless it ends with a slash.
        if !base_url.path().ends_with('/') {
            base_url.set_path(&format!("{}/", base_url.path()));
        }

        Ok(Self { client, base_url })
    }

    /// The base URL of the repository.
    pub fn url(&self) -> &Url {
        &self.base_url
    }

    /// Resolve a repository relative path to a full URL.
    pub fn resolve_url(&self, path: &str) -> Result<Url> {
        Ok(self.base_url.join(path)?)
    }
}

#[async_trait]
impl DataResolver for HttpRepositoryClient {
    async fn get_path(&self, path: &str) -> Result<Pin<Box<dyn AsyncRead + Send>>> {
        let url = self.resolve_url(path)?;
        debug!("fetching {}", url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| transport_error(&url, format!("request failed: {:?}", e)))?
            .error_for_status()
            .map_err(|e| transport_error(&url, format!("unsuccessful response: {:?}", e)))?;

        let body = response
            .bytes_stream()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, format!("{:?}", e)))
            .into_async_read();

        Ok(Box::pin(body))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_url_gains_trailing_slash() -> Result<()> {
        let client = HttpRepositoryClient::new("https://packages-cf.termux.dev/apt/termux-main")?;
        assert_eq!(
            client.url().as_str(),
            "https://packages-cf.termux.dev/apt/termux-main/"
        );
        assert_eq!(
            client.resolve_url("dists/stable/Contents-arm.gz")?.as_str(),
            "https://packages-cf.termux.dev/apt/termux-main/dists/stable/Contents-arm.gz"
        );

        Ok(())
    }

    #[test]
    fn trailing_slash_preserved() -> Result<()> {
        let client = HttpRepositoryClient::new("https://example.com/apt/")?;
        assert_eq!(
            client.resolve_url("dists/x11/Contents-aarch64.gz")?.as_str(),
            "https://example.com/apt/dists/x11/Contents-aarch64.gz"
        );

        Ok(())
    }
}
