// 🖼️ Preview Images - Best-effort web image when the reference list has none
// Never errors, never retries: any failure is "no image"

use regex::Regex;
use std::sync::OnceLock;

/// Narrow seam around image scraping so it can be stubbed or removed
pub trait PreviewSource: Send + Sync {
    fn fetch_preview_image(&self, query: &str) -> Option<String>;
}

/// Preview source that never finds anything
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPreview;

impl PreviewSource for NoPreview {
    fn fetch_preview_image(&self, _query: &str) -> Option<String> {
        None
    }
}

fn img_src_regex() -> &'static Regex {
    static IMG_SRC: OnceLock<Regex> = OnceLock::new();
    IMG_SRC.get_or_init(|| {
        Regex::new(r#"(?is)<img\b[^>]*?\bsrc\s*=\s*["']([^"']+)["']"#).expect("img src regex")
    })
}

/// First `<img src>` in an HTML page
///
/// Protocol-relative URLs ("//host/a.png") are upgraded to https.
pub fn first_image_src(html: &str) -> Option<String> {
    let src = img_src_regex()
        .captures_iter(html)
        .map(|caps| caps[1].trim().to_string())
        .find(|src| !src.is_empty())?;

    if src.starts_with("//") {
        Some(format!("https:{}", src))
    } else {
        Some(src)
    }
}

#[cfg(feature = "preview")]
pub use web::WebPreviewSource;

#[cfg(feature = "preview")]
mod web {
    use super::{first_image_src, PreviewSource};
    use anyhow::{Context, Result};
    use std::time::Duration;
    use tracing::debug;

    /// Scrapes the first image from `<search_url><query>`
    pub struct WebPreviewSource {
        client: reqwest::blocking::Client,
        search_url: String,
    }

    impl WebPreviewSource {
        /// Build the blocking client. Must not be called from inside an async runtime.
        pub fn new(search_url: &str, timeout: Duration) -> Result<Self> {
            let client = reqwest::blocking::Client::builder()
                .timeout(timeout)
                .user_agent(concat!("haydon-xref/", env!("CARGO_PKG_VERSION")))
                .build()
                .context("Failed to build preview HTTP client")?;

            Ok(WebPreviewSource {
                client,
                search_url: search_url.to_string(),
            })
        }

        fn page_url(&self, query: &str) -> String {
            format!("{}{}", self.search_url, urlencoding::encode(query.trim()))
        }
    }

    impl PreviewSource for WebPreviewSource {
        fn fetch_preview_image(&self, query: &str) -> Option<String> {
            let url = self.page_url(query);

            let resp = match self.client.get(&url).send() {
                Ok(resp) => resp,
                Err(e) => {
                    debug!(%url, error = %e, "Preview fetch failed");
                    return None;
                }
            };

            if !resp.status().is_success() {
                debug!(%url, status = %resp.status(), "Preview fetch non-success status");
                return None;
            }

            let body = resp.text().ok()?;
            first_image_src(&body)
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_image_src() {
        let html = r#"<html><body>
            <a href="/x"><IMG class="logo" SRC='/static/logo.png'></a>
            <img src="http://x/second.png">
        </body></html>"#;

        assert_eq!(first_image_src(html), Some("/static/logo.png".to_string()));
    }

    #[test]
    fn test_first_image_src_skips_empty_and_upgrades_scheme() {
        let html = r#"<img src=""><img alt="p" src="//cdn.example.com/p.jpg">"#;
        assert_eq!(
            first_image_src(html),
            Some("https://cdn.example.com/p.jpg".to_string())
        );
    }

    #[test]
    fn test_first_image_src_none() {
        assert_eq!(first_image_src("<p>no images</p>"), None);
        assert_eq!(first_image_src("<imgur src=\"x\">"), None);
    }

    #[test]
    fn test_no_preview() {
        assert_eq!(NoPreview.fetch_preview_image("H-132"), None);
    }
}
