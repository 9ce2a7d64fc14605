//! Outgoing prompt construction.

use thiserror::Error;
use url::Url;

/// URL rejected by `GroundingUrls::add`.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("Невірна URL-адреса: {0}")]
pub struct UrlError(pub String);

/// Wire text for a turn.
///
/// With source URLs the literal text is wrapped in an instruction block
/// listing them; otherwise it is sent unchanged.
#[must_use]
pub fn build_prompt_text(text: &str, urls: &[String]) -> String {
    if urls.is_empty() {
        return text.to_string();
    }
    let url_list = urls
        .iter()
        .map(|url| format!("- {url}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Будь ласка, дайте відповідь на запит, базуючись на інформації з наступних URL-адрес:\n{url_list}\n\nЗапит користувача: {text}"
    )
}

/// Ordered, duplicate-free list of user-chosen source URLs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroundingUrls {
    urls: Vec<String>,
}

impl GroundingUrls {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a URL after trimming it.
    ///
    /// Returns `Ok(false)` if it was already listed.
    ///
    /// # Errors
    /// Returns error unless the value is an absolute http(s) URL with a host.
    pub fn add(&mut self, url: &str) -> Result<bool, UrlError> {
        let url = url.trim();
        if !is_web_url(url) {
            return Err(UrlError(url.to_string()));
        }
        if self.urls.iter().any(|u| u == url) {
            return Ok(false);
        }
        self.urls.push(url.to_string());
        Ok(true)
    }

    /// Remove a URL by exact value.
    pub fn remove(&mut self, url: &str) -> bool {
        let before = self.urls.len();
        self.urls.retain(|u| u != url);
        self.urls.len() != before
    }

    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.urls
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.urls.len()
    }
}

fn is_web_url(raw: &str) -> bool {
    Url::parse(raw).is_ok_and(|url| {
        matches!(url.scheme(), "http" | "https") && url.host_str().is_some_and(|h| !h.is_empty())
    })
}
