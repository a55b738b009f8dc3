//! HTML source resolution and caching

pub mod cache;
pub mod resolver;

pub use cache::DocumentCache;
pub use resolver::{
    is_html_path, resolve_base64, resolve_cache, resolve_inline, resolve_path, resolve_url,
    sanitize_base_name, ResolvedHtml,
};
