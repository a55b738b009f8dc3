//! Source resolution for HTML documents

use crate::error::{Error, Result};
use crate::source::DocumentCache;
use base64::Engine;
use futures_util::StreamExt;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;

/// A resolved HTML document
#[derive(Debug, Clone)]
pub struct ResolvedHtml {
    pub html: Arc<str>,
    /// Display name for logs and responses
    pub source_name: String,
    /// Name the generated PDF is derived from
    pub base_name: String,
}

/// Whether the path carries an `.html` or `.htm` extension
pub fn is_html_path(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.eq_ignore_ascii_case("html") || ext.eq_ignore_ascii_case("htm"))
        .unwrap_or(false)
}

/// Reduce a display name to a file-system safe base name
pub fn sanitize_base_name(name: &str) -> String {
    let stem = Path::new(name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let stem = match stem.rsplit_once('.') {
        Some((head, _)) if !head.is_empty() => head.to_string(),
        _ => stem,
    };

    let cleaned: String = stem
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.trim_matches(|c| c == '.' || c == '_').to_string();

    if cleaned.is_empty() {
        "document".to_string()
    } else {
        cleaned
    }
}

fn check_size(len: usize, max_html_bytes: u64) -> Result<()> {
    if len as u64 > max_html_bytes {
        return Err(Error::HtmlTooLarge {
            size: len as u64,
            max_size: max_html_bytes,
        });
    }
    Ok(())
}

fn decode_html(data: Vec<u8>, max_html_bytes: u64) -> Result<Arc<str>> {
    check_size(data.len(), max_html_bytes)?;
    let html = String::from_utf8(data).map_err(|_| Error::InvalidHtml {
        reason: "document is not valid UTF-8".to_string(),
    })?;
    if html.trim().is_empty() {
        return Err(Error::InvalidHtml {
            reason: "document is empty".to_string(),
        });
    }
    Ok(Arc::from(html))
}

/// Resolve an `.html`/`.htm` file on disk
pub fn resolve_path<P: AsRef<Path>>(path: P, max_html_bytes: u64) -> Result<ResolvedHtml> {
    let path = path.as_ref();

    if !is_html_path(path) {
        return Err(Error::InvalidHtml {
            reason: "only .html files are allowed".to_string(),
        });
    }
    if !path.is_file() {
        return Err(Error::HtmlNotFound {
            path: path.display().to_string(),
        });
    }

    let size = std::fs::metadata(path)?.len();
    if size > max_html_bytes {
        return Err(Error::HtmlTooLarge {
            size,
            max_size: max_html_bytes,
        });
    }

    let data = std::fs::read(path)?;
    let source_name = path.display().to_string();
    Ok(ResolvedHtml {
        html: decode_html(data, max_html_bytes)?,
        base_name: sanitize_base_name(&source_name),
        source_name,
    })
}

/// Resolve markup passed inline
pub fn resolve_inline(html: &str, max_html_bytes: u64) -> Result<ResolvedHtml> {
    Ok(ResolvedHtml {
        html: decode_html(html.as_bytes().to_vec(), max_html_bytes)?,
        source_name: "<inline>".to_string(),
        base_name: "document".to_string(),
    })
}

/// Resolve base64 encoded markup
pub fn resolve_base64(base64_data: &str, max_html_bytes: u64) -> Result<ResolvedHtml> {
    // Reject before decoding when the encoded form alone is over budget.
    check_size(base64_data.len() / 4 * 3, max_html_bytes)?;

    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;

    Ok(ResolvedHtml {
        html: decode_html(data, max_html_bytes)?,
        source_name: "<base64>".to_string(),
        base_name: "document".to_string(),
    })
}

/// Check if an IP address is private/reserved (loopback, link-local, private ranges, etc.)
fn is_private_ip(ip: &IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            let [a, b, ..] = v4.octets();
            v4.is_loopback()
                || v4.is_private()
                || v4.is_link_local()
                || v4.is_broadcast()
                || v4.is_unspecified()
                || (a == 100 && (b & 0xC0) == 64) // CGNAT 100.64/10
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xFE00) == 0xFC00 // unique local
                || (first & 0xFFC0) == 0xFE80 // link-local
        }
    }
}

/// Resolve DNS for the URL host and refuse private addresses
async fn check_ssrf(parsed: &url::Url) -> Result<()> {
    let host = parsed.host_str().ok_or_else(|| Error::SourceResolution {
        reason: "URL has no host".to_string(),
    })?;
    let port = parsed.port_or_known_default().unwrap_or(443);

    let addrs = tokio::net::lookup_host((host, port))
        .await
        .map_err(|e| Error::SourceResolution {
            reason: format!("DNS resolution failed for {}: {}", host, e),
        })?;

    for addr in addrs {
        if is_private_ip(&addr.ip()) {
            return Err(Error::SsrfBlocked {
                url: parsed.to_string(),
            });
        }
    }
    Ok(())
}

/// Redirects followed before a download is abandoned
const MAX_REDIRECTS: usize = 10;

/// Refuse non-HTTP schemes and, unless allowed, private targets
async fn check_url(parsed: &url::Url, allow_private_urls: bool) -> Result<()> {
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(Error::SourceResolution {
            reason: format!("unsupported URL scheme '{}'", parsed.scheme()),
        });
    }
    if !allow_private_urls {
        check_ssrf(parsed).await?;
    }
    Ok(())
}

/// Resolve a `Location` header against the URL that sent it and vet the target
/// the same way as the original URL
async fn redirect_target(
    current: &url::Url,
    location: &str,
    allow_private_urls: bool,
) -> Result<url::Url> {
    let next = current.join(location).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid redirect location: {}", e),
    })?;
    check_url(&next, allow_private_urls).await?;
    Ok(next)
}

/// Download an HTML page with SSRF protection and a size limit.
///
/// Redirects are followed by hand so every hop goes through the same checks.
pub async fn resolve_url(
    url: &str,
    allow_private_urls: bool,
    max_download_bytes: u64,
) -> Result<ResolvedHtml> {
    let mut current = url::Url::parse(url).map_err(|e| Error::SourceResolution {
        reason: format!("Invalid URL: {}", e),
    })?;
    check_url(&current, allow_private_urls).await?;

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(60))
        .redirect(reqwest::redirect::Policy::none())
        .build()?;

    let mut redirects = 0;
    let response = loop {
        let response = client.get(current.clone()).send().await?;
        if !response.status().is_redirection() {
            break response;
        }
        if redirects == MAX_REDIRECTS {
            return Err(Error::SourceResolution {
                reason: format!("more than {} redirects", MAX_REDIRECTS),
            });
        }
        redirects += 1;

        let location = response
            .headers()
            .get(reqwest::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| Error::SourceResolution {
                reason: format!("redirect ({}) without a Location header", response.status()),
            })?;
        current = redirect_target(&current, &location, allow_private_urls).await?;
        tracing::debug!(url = %current, redirects, "following redirect");
    };

    if !response.status().is_success() {
        return Err(Error::SourceResolution {
            reason: format!("HTTP request failed with status: {}", response.status()),
        });
    }

    if let Some(content_length) = response.content_length() {
        if content_length > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: content_length,
                max_size: max_download_bytes,
            });
        }
    }

    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        data.extend_from_slice(&chunk?);
        if data.len() as u64 > max_download_bytes {
            return Err(Error::DownloadTooLarge {
                size: data.len() as u64,
                max_size: max_download_bytes,
            });
        }
    }

    let base_name = current
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty())
        .map(|s| sanitize_base_name(&s))
        .unwrap_or_else(|| "document".to_string());

    Ok(ResolvedHtml {
        html: decode_html(data, max_download_bytes)?,
        source_name: url.to_string(),
        base_name,
    })
}

/// Resolve a cache key to a previously resolved document
pub fn resolve_cache(cache_key: &str, cache: &DocumentCache) -> Result<ResolvedHtml> {
    let html = cache
        .get(cache_key)
        .ok_or_else(|| Error::CacheKeyNotFound {
            key: cache_key.to_string(),
        })?;

    Ok(ResolvedHtml {
        html,
        source_name: format!("<cache:{}>", cache_key),
        base_name: "document".to_string(),
    })
}
