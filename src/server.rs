//! MCP Server implementation using rmcp

use crate::config::ServerConfig;
use crate::convert::{ConvertRequest, Converter};
use crate::fit::FitResult;
use crate::source::{
    is_html_path, resolve_base64, resolve_cache, resolve_inline, resolve_path, resolve_url,
    sanitize_base_name, DocumentCache, ResolvedHtml,
};
use anyhow::Result;
use base64::Engine;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters, model::*,
    schemars::JsonSchema, service::RequestContext, tool, tool_handler, tool_router, RoleServer,
    ServerHandler, ServiceExt,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;

/// Where an HTML document comes from
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
pub enum HtmlSource {
    /// File path to an .html/.htm file
    Path {
        /// Path to the HTML file
        path: String,
    },
    /// Inline HTML markup
    Html {
        /// The HTML document
        html: String,
    },
    /// Base64 encoded HTML
    Base64 {
        /// Base64 encoded HTML content
        base64: String,
    },
    /// URL to download the HTML page from
    Url {
        /// URL of the page
        url: String,
    },
    /// Reference to a cached document
    CacheRef {
        /// Cache key from a previous call
        cache_key: String,
    },
}

const SOURCE_KEYS: [&str; 5] = ["path", "html", "base64", "url", "cache_key"];

impl<'de> serde::Deserialize<'de> for HtmlSource {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;

        let Some(obj) = value.as_object() else {
            return Err(serde::de::Error::custom(format!(
                "Invalid source: expected an object with one of \"path\", \"html\", \"base64\", \"url\", or \"cache_key\", but got {}",
                match &value {
                    serde_json::Value::Array(_) => "an array",
                    serde_json::Value::String(_) => "a string",
                    serde_json::Value::Number(_) => "a number",
                    serde_json::Value::Bool(_) => "a boolean",
                    serde_json::Value::Null => "null",
                    _ => "unknown type",
                }
            )));
        };

        for key in SOURCE_KEYS {
            let Some(v) = obj.get(key) else { continue };
            let Some(s) = v.as_str() else {
                return Err(serde::de::Error::custom(format!(
                    "\"{}\" must be a string",
                    key
                )));
            };
            let s = s.to_string();
            return Ok(match key {
                "path" => HtmlSource::Path { path: s },
                "html" => HtmlSource::Html { html: s },
                "base64" => HtmlSource::Base64 { base64: s },
                "url" => HtmlSource::Url { url: s },
                _ => HtmlSource::CacheRef { cache_key: s },
            });
        }

        let keys: Vec<&String> = obj.keys().collect();
        Err(serde::de::Error::custom(format!(
            "Invalid source: expected an object with one of \"path\", \"html\", \"base64\", \"url\", or \"cache_key\", but got keys: {:?}",
            keys
        )))
    }
}

/// HTML to PDF MCP Server
#[derive(Clone)]
pub struct HtmlFitServer {
    cache: Arc<DocumentCache>,
    converter: Converter,
    tool_router: ToolRouter<Self>,
    /// Server configuration
    config: Arc<ServerConfig>,
}

// ============================================================================
// Request/Response types for convert_html
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ConvertHtmlParams {
    /// HTML document to convert
    pub source: HtmlSource,
    /// Base name for the generated PDF (default: derived from the source)
    #[serde(default)]
    pub name: Option<String>,
    /// Page budget (default: server setting, usually 2)
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Tighten typography and lay text out in columns before fitting
    #[serde(default)]
    pub density_reduction: bool,
    /// Scale content to fit the page budget (default: server setting)
    #[serde(default)]
    pub fit: Option<bool>,
    /// Recompress the generated PDF
    #[serde(default)]
    pub optimize: bool,
    /// Return the PDF as base64 in the response
    #[serde(default)]
    pub include_pdf: bool,
    /// Additional path to write the PDF to
    #[serde(default)]
    pub output_path: Option<String>,
    /// Cache the resolved HTML for reuse via cache_key
    #[serde(default)]
    pub cache: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ConvertHtmlResult {
    pub source: String,
    pub job_id: String,
    /// File name of the stored PDF in the output directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stored_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page_count: Option<u32>,
    pub max_pages: u32,
    pub size_bytes: usize,
    pub density_reduced: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pdf_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConvertHtmlResult {
    fn failed(source: String, error: String) -> Self {
        Self {
            source,
            job_id: String::new(),
            stored_file: None,
            output_path: None,
            page_count: None,
            max_pages: 0,
            size_bytes: 0,
            density_reduced: false,
            fit: None,
            pdf_base64: None,
            cache_key: None,
            error: Some(error),
        }
    }
}

// ============================================================================
// Request/Response types for analyze_fit
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AnalyzeFitParams {
    /// HTML document to analyze
    pub source: HtmlSource,
    /// Page budget (default: server setting, usually 2)
    #[serde(default)]
    pub max_pages: Option<u32>,
    /// Apply density reduction before measuring
    #[serde(default)]
    pub density_reduction: bool,
    /// Cache the resolved HTML for reuse via cache_key
    #[serde(default)]
    pub cache: bool,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct AnalyzeFitResult {
    pub source: String,
    /// Printable height per page used for the estimate
    pub per_page_capacity_px: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit: Option<FitResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Request/Response types for list_html
// ============================================================================

#[derive(Debug, Deserialize, JsonSchema)]
pub struct ListHtmlParams {
    /// Directory to search for HTML files
    pub directory: String,
    /// Search subdirectories recursively (default: false)
    #[serde(default)]
    pub recursive: bool,
    /// Filename pattern to filter (e.g., "resume*.html"). Supports glob patterns.
    #[serde(default)]
    pub pattern: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct HtmlFileInfo {
    /// Full path to the HTML file
    pub path: String,
    /// Filename only
    pub name: String,
    /// File size in bytes
    pub size: u64,
    /// Last modified time (ISO 8601 format)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct ListHtmlResult {
    /// Directory that was searched
    pub directory: String,
    /// HTML files found
    pub files: Vec<HtmlFileInfo>,
    /// Total number of files found
    pub total_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

// ============================================================================
// Tool implementations
// ============================================================================

#[tool_router]
impl HtmlFitServer {
    /// Create a server from configuration
    pub fn with_config(config: ServerConfig) -> crate::error::Result<Self> {
        let converter = Converter::chrome(config.convert.clone())?;
        let cache = DocumentCache::new(config.cache_max_entries, config.cache_max_bytes);
        Ok(Self {
            cache: Arc::new(cache),
            converter,
            tool_router: Self::tool_router(),
            config: Arc::new(config),
        })
    }

    /// Convert an HTML document to PDF, scaling it to fit a page budget
    #[tool(
        description = "Convert an HTML document to a PDF, scaling the content down (never below 25%) so it fits within max_pages pages. Returns the stored file name, the page count and fit metadata (final_scale, estimated_pages, fits). Content that cannot fit is still converted and reported with fits=false.

Source format: one of {\"path\": \"/absolute/path.html\"}, {\"html\": \"<html>...\"}, {\"base64\": \"...\"}, {\"url\": \"https://...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn convert_html(&self, Parameters(params): Parameters<ConvertHtmlParams>) -> String {
        let result = self
            .process_convert_html(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "convert_html failed");
                ConvertHtmlResult::failed(Self::source_name(&params.source), e.client_message())
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// Report how a document would be scaled without producing a PDF
    #[tool(
        description = "Measure an HTML document and report the scale needed to fit it within max_pages pages, without generating a PDF.

Source format: one of {\"path\": \"/absolute/path.html\"}, {\"html\": \"<html>...\"}, {\"base64\": \"...\"}, {\"url\": \"https://...\"}, or {\"cache_key\": \"...\"}"
    )]
    async fn analyze_fit(&self, Parameters(params): Parameters<AnalyzeFitParams>) -> String {
        let result = self
            .process_analyze_fit(&params)
            .await
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "analyze_fit failed");
                AnalyzeFitResult {
                    source: Self::source_name(&params.source),
                    per_page_capacity_px: self.converter.config().per_page_capacity_px(),
                    fit: None,
                    cache_key: None,
                    error: Some(e.client_message()),
                }
            });

        let response = serde_json::json!({ "results": [result] });
        serde_json::to_string_pretty(&response).unwrap_or_default()
    }

    /// List HTML files in a directory
    #[tool(
        description = "List HTML files (.html, .htm) in a directory, optionally recursive and filtered by a glob pattern."
    )]
    async fn list_html(&self, Parameters(params): Parameters<ListHtmlParams>) -> String {
        let result = self.process_list_html(&params).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "list_html failed");
            ListHtmlResult {
                directory: params.directory.clone(),
                files: vec![],
                total_count: 0,
                error: Some(e.client_message()),
            }
        });

        serde_json::to_string_pretty(&result).unwrap_or_default()
    }
}

impl HtmlFitServer {
    fn source_name(source: &HtmlSource) -> String {
        match source {
            HtmlSource::Path { path } => path.clone(),
            HtmlSource::Html { .. } => "<inline>".to_string(),
            HtmlSource::Base64 { .. } => "<base64>".to_string(),
            HtmlSource::Url { url } => url.clone(),
            HtmlSource::CacheRef { cache_key } => format!("<cache:{}>", cache_key),
        }
    }

    async fn resolve_source(&self, source: &HtmlSource) -> crate::error::Result<ResolvedHtml> {
        let max_html_bytes = self.config.max_html_bytes;
        match source {
            HtmlSource::Path { path } => {
                let path = self.validate_path_access(path)?;
                resolve_path(path, max_html_bytes)
            }
            HtmlSource::Html { html } => resolve_inline(html, max_html_bytes),
            HtmlSource::Base64 { base64 } => resolve_base64(base64, max_html_bytes),
            HtmlSource::Url { url } => {
                resolve_url(
                    url,
                    self.config.allow_private_urls,
                    self.config.max_download_bytes.min(max_html_bytes),
                )
                .await
            }
            HtmlSource::CacheRef { cache_key } => resolve_cache(cache_key, &self.cache),
        }
    }

    fn is_within_resource_dirs(&self, canonical: &Path) -> bool {
        self.config.resource_dirs.iter().any(|dir| {
            std::fs::canonicalize(dir)
                .map(|cd| canonical.starts_with(&cd))
                .unwrap_or(false)
        })
    }

    /// Validate that a path is within allowed resource directories.
    /// If no resource_dirs are configured, all paths are allowed.
    fn validate_path_access(&self, path: &str) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let denied = || crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        };
        let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
        if self.is_within_resource_dirs(&canonical) {
            Ok(canonical)
        } else {
            Err(denied())
        }
    }

    /// Validate that an output path is within allowed resource directories.
    /// Canonicalizes the parent directory since the output file may not exist yet.
    fn validate_output_path_access(
        &self,
        path: &str,
    ) -> crate::error::Result<std::path::PathBuf> {
        if self.config.resource_dirs.is_empty() {
            return Ok(std::path::PathBuf::from(path));
        }

        let denied = || crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        };
        let path_obj = Path::new(path);
        let parent = path_obj.parent().unwrap_or(Path::new("."));
        let canonical_parent = std::fs::canonicalize(parent).map_err(|_| denied())?;
        let file_name = path_obj.file_name().ok_or_else(denied)?;
        let canonical_target = canonical_parent.join(file_name);

        if self.is_within_resource_dirs(&canonical_target) {
            Ok(canonical_target)
        } else {
            Err(denied())
        }
    }

    /// Write the PDF to a caller-chosen path, with sandbox validation.
    fn write_output(
        &self,
        output_path: &Option<String>,
        data: &[u8],
    ) -> crate::error::Result<Option<String>> {
        let Some(path_str) = output_path else {
            return Ok(None);
        };
        let path = self.validate_output_path_access(path_str)?;

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        std::fs::write(&path, data)?;
        Ok(Some(path_str.clone()))
    }

    fn cache_if_requested(&self, enabled: bool, resolved: &ResolvedHtml) -> Option<String> {
        if !enabled {
            return None;
        }
        let key = self.cache.insert(Arc::clone(&resolved.html));
        if key.is_none() {
            tracing::debug!(source = %resolved.source_name, "document not cached: over budget");
        }
        key
    }

    pub async fn process_convert_html(
        &self,
        params: &ConvertHtmlParams,
    ) -> crate::error::Result<ConvertHtmlResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let cache_key = self.cache_if_requested(params.cache, &resolved);

        let base_name = params
            .name
            .as_deref()
            .map(sanitize_base_name)
            .unwrap_or_else(|| resolved.base_name.clone());

        let request = ConvertRequest {
            html: Arc::clone(&resolved.html),
            base_name,
            max_pages: params.max_pages,
            density_reduction: params.density_reduction,
            fit: params.fit,
            optimize: params.optimize,
            persist: true,
        };
        let output = self.converter.convert(request).await?;

        let output_path = self.write_output(&params.output_path, &output.pdf)?;
        let stored_file = output
            .stored_path
            .as_ref()
            .and_then(|p| p.file_name())
            .map(|n| n.to_string_lossy().to_string());
        let pdf_base64 = params
            .include_pdf
            .then(|| base64::engine::general_purpose::STANDARD.encode(&output.pdf));

        Ok(ConvertHtmlResult {
            source: resolved.source_name,
            job_id: output.job_id,
            stored_file,
            output_path,
            page_count: output.page_count,
            max_pages: output.max_pages,
            size_bytes: output.pdf.len(),
            density_reduced: output.density_reduced,
            fit: output.fit,
            pdf_base64,
            cache_key,
            error: None,
        })
    }

    pub async fn process_analyze_fit(
        &self,
        params: &AnalyzeFitParams,
    ) -> crate::error::Result<AnalyzeFitResult> {
        let resolved = self.resolve_source(&params.source).await?;
        let cache_key = self.cache_if_requested(params.cache, &resolved);

        let request = ConvertRequest {
            max_pages: params.max_pages,
            density_reduction: params.density_reduction,
            persist: false,
            ..ConvertRequest::new(Arc::clone(&resolved.html), resolved.base_name.clone())
        };
        let fit = self.converter.analyze(request).await?;

        Ok(AnalyzeFitResult {
            source: resolved.source_name,
            per_page_capacity_px: self.converter.config().per_page_capacity_px(),
            fit: Some(fit),
            cache_key,
            error: None,
        })
    }

    pub fn process_list_html(
        &self,
        params: &ListHtmlParams,
    ) -> crate::error::Result<ListHtmlResult> {
        if !self.config.resource_dirs.is_empty() {
            self.validate_path_access(&params.directory)?;
        }

        let dir_path = Path::new(&params.directory);
        if !dir_path.exists() {
            return Err(crate::error::Error::HtmlNotFound {
                path: params.directory.clone(),
            });
        }
        if !dir_path.is_dir() {
            return Err(crate::error::Error::InvalidInput {
                reason: format!("{} is not a directory", params.directory),
            });
        }

        let pattern = params
            .pattern
            .as_ref()
            .and_then(|p| glob::Pattern::new(p).ok());

        let mut files = Vec::new();
        collect_files(
            dir_path,
            params.recursive,
            &is_html_path,
            &pattern,
            &mut files,
        )?;
        files.sort_by(|a, b| a.path.cmp(&b.path));

        let total_count = files.len() as u32;
        Ok(ListHtmlResult {
            directory: params.directory.clone(),
            files,
            total_count,
            error: None,
        })
    }

    /// Generated PDFs in the output directory
    fn generated_pdfs(&self) -> Vec<HtmlFileInfo> {
        let dir = &self.converter.config().output_dir;
        let mut files = Vec::new();
        if dir.is_dir() {
            let is_pdf = |path: &Path| {
                path.extension()
                    .map(|e| e.eq_ignore_ascii_case("pdf"))
                    .unwrap_or(false)
            };
            if let Err(e) = collect_files(dir, false, &is_pdf, &None, &mut files) {
                tracing::warn!(error = %e, "failed to list generated PDFs");
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        files
    }

    /// Read a generated PDF, refusing anything outside the output directory
    fn read_generated_pdf(&self, path: &str) -> crate::error::Result<Vec<u8>> {
        let denied = || crate::error::Error::PathAccessDenied {
            path: path.to_string(),
        };
        let output_dir = std::fs::canonicalize(&self.converter.config().output_dir)
            .map_err(|_| denied())?;
        let canonical = std::fs::canonicalize(path).map_err(|_| denied())?;
        if !canonical.starts_with(&output_dir) {
            return Err(denied());
        }
        Ok(std::fs::read(canonical)?)
    }
}

/// Collect files accepted by `accept`, optionally filtered by a glob on the file name
fn collect_files(
    dir: &Path,
    recursive: bool,
    accept: &dyn Fn(&Path) -> bool,
    pattern: &Option<glob::Pattern>,
    files: &mut Vec<HtmlFileInfo>,
) -> crate::error::Result<()> {
    let entries = std::fs::read_dir(dir)?;

    for entry in entries.flatten() {
        let path = entry.path();

        if path.is_dir() {
            if recursive {
                let _ = collect_files(&path, recursive, accept, pattern, files);
            }
            continue;
        }
        if !path.is_file() || !accept(&path) {
            continue;
        }

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if let Some(pat) = pattern {
            if !pat.matches(&name) {
                continue;
            }
        }

        let metadata = std::fs::metadata(&path).ok();
        let size = metadata.as_ref().map(|m| m.len()).unwrap_or(0);
        let modified = metadata
            .as_ref()
            .and_then(|m| m.modified().ok())
            .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
            .and_then(|d| chrono::DateTime::from_timestamp(d.as_secs() as i64, 0))
            .map(|dt| dt.to_rfc3339());

        files.push(HtmlFileInfo {
            path: path.to_string_lossy().to_string(),
            name,
            size,
            modified,
        });
    }

    Ok(())
}

/// Resource entry for a generated PDF
fn pdf_resource(file: HtmlFileInfo) -> Annotated<RawResource> {
    let absolute = std::fs::canonicalize(&file.path)
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|_| file.path.clone());
    let mut resource = RawResource::new(format!("file://{}", absolute), file.name);
    resource.mime_type = Some("application/pdf".to_string());
    resource.description = Some(format!(
        "Generated PDF ({} bytes){}",
        file.size,
        file.modified
            .as_ref()
            .map(|m| format!(", created: {}", m))
            .unwrap_or_default()
    ));
    // Sizes past u32::MAX are left unreported rather than truncated.
    resource.size = u32::try_from(file.size).ok();
    Annotated {
        raw: resource,
        annotations: None,
    }
}

#[tool_handler]
impl ServerHandler for HtmlFitServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Converts HTML documents to PDF, scaling content so it fits a page budget. \
                 Generated PDFs are exposed as resources."
                    .into(),
            ),
        }
    }

    /// List generated PDFs
    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, ErrorData> {
        let resources = self
            .generated_pdfs()
            .into_iter()
            .map(pdf_resource)
            .collect();

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
            meta: Default::default(),
        })
    }

    /// Return a generated PDF as a base64 blob
    async fn read_resource(
        &self,
        request: ReadResourceRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, ErrorData> {
        let uri = &request.uri;
        let Some(path) = uri.strip_prefix("file://") else {
            return Err(ErrorData::invalid_params(
                "Only file:// URIs are supported",
                None,
            ));
        };

        match self.read_generated_pdf(path) {
            Ok(data) => Ok(ReadResourceResult {
                contents: vec![ResourceContents::BlobResourceContents {
                    uri: uri.clone(),
                    mime_type: Some("application/pdf".to_string()),
                    blob: base64::engine::general_purpose::STANDARD.encode(&data),
                    meta: Default::default(),
                }],
            }),
            Err(e) => {
                tracing::warn!(error = %e, "read_resource failed");
                Err(ErrorData::invalid_params(
                    "Resource not found in output directory",
                    None,
                ))
            }
        }
    }
}

/// Run the MCP server with configuration from the environment
pub async fn run_server() -> Result<()> {
    run_server_with_config(ServerConfig::from_env()?).await
}

/// Run the MCP server with full configuration
pub async fn run_server_with_config(config: ServerConfig) -> Result<()> {
    tracing::info!(
        output_dir = %config.convert.output_dir.display(),
        default_max_pages = config.convert.default_max_pages,
        fit_enabled = config.convert.fit_enabled,
        "HTML fit server configured"
    );
    let server = HtmlFitServer::with_config(config)?;

    tracing::info!("HTML fit server ready, waiting for connections...");

    let service = server.serve(rmcp::transport::io::stdio()).await?;
    service.waiting().await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn server_with(config: ServerConfig) -> HtmlFitServer {
        HtmlFitServer::with_config(config).unwrap()
    }

    fn server_in(dir: &Path) -> HtmlFitServer {
        let mut config = ServerConfig::default();
        config.convert.output_dir = dir.join("generated");
        server_with(config)
    }

    #[test]
    fn test_source_name() {
        assert_eq!(
            HtmlFitServer::source_name(&HtmlSource::Path {
                path: "/cv.html".to_string()
            }),
            "/cv.html"
        );
        assert_eq!(
            HtmlFitServer::source_name(&HtmlSource::Html {
                html: "<p/>".to_string()
            }),
            "<inline>"
        );
        assert_eq!(
            HtmlFitServer::source_name(&HtmlSource::CacheRef {
                cache_key: "abc".to_string()
            }),
            "<cache:abc>"
        );
    }

    #[test]
    fn test_html_source_deserialization() {
        let source: HtmlSource = serde_json::from_str(r#"{"path": "/a.html"}"#).unwrap();
        assert!(matches!(source, HtmlSource::Path { .. }));
        let source: HtmlSource = serde_json::from_str(r#"{"html": "<p/>"}"#).unwrap();
        assert!(matches!(source, HtmlSource::Html { .. }));
        let source: HtmlSource = serde_json::from_str(r#"{"base64": "PHAvPg=="}"#).unwrap();
        assert!(matches!(source, HtmlSource::Base64 { .. }));
        let source: HtmlSource = serde_json::from_str(r#"{"url": "https://x.test/"}"#).unwrap();
        assert!(matches!(source, HtmlSource::Url { .. }));
        let source: HtmlSource = serde_json::from_str(r#"{"cache_key": "k"}"#).unwrap();
        assert!(matches!(source, HtmlSource::CacheRef { .. }));
    }

    #[test]
    fn test_html_source_errors() {
        let err = serde_json::from_str::<HtmlSource>(r#""/a.html""#).unwrap_err();
        assert!(err.to_string().contains("but got a string"));
        let err = serde_json::from_str::<HtmlSource>(r#"{"html": 5}"#).unwrap_err();
        assert!(err.to_string().contains("\"html\" must be a string"));
        let err = serde_json::from_str::<HtmlSource>(r#"{"file": "x"}"#).unwrap_err();
        assert!(err.to_string().contains("but got keys"));
    }

    #[test]
    fn test_convert_params_defaults() {
        let params: ConvertHtmlParams =
            serde_json::from_str(r#"{"source": {"html": "<p>x</p>"}}"#).unwrap();
        assert_eq!(params.max_pages, None);
        assert!(!params.density_reduction);
        assert_eq!(params.fit, None);
        assert!(!params.include_pdf);
        assert!(!params.cache);
    }

    #[tokio::test]
    async fn test_resolve_inline_and_cache() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());

        let resolved = server
            .resolve_source(&HtmlSource::Html {
                html: "<p>cached</p>".to_string(),
            })
            .await
            .unwrap();
        let key = server.cache_if_requested(true, &resolved).unwrap();

        let again = server
            .resolve_source(&HtmlSource::CacheRef { cache_key: key })
            .await
            .unwrap();
        assert_eq!(&*again.html, "<p>cached</p>");
    }

    #[tokio::test]
    async fn test_inline_html_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ServerConfig {
            max_html_bytes: 8,
            ..ServerConfig::default()
        };
        config.convert.output_dir = dir.path().to_path_buf();
        let server = server_with(config);

        let result = server
            .resolve_source(&HtmlSource::Html {
                html: "<p>too long</p>".to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(crate::error::Error::HtmlTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_path_outside_resource_dirs_denied() {
        let allowed = tempfile::tempdir().unwrap();
        let other = tempfile::tempdir().unwrap();
        let file = other.path().join("page.html");
        std::fs::write(&file, "<p>x</p>").unwrap();

        let mut config = ServerConfig {
            resource_dirs: vec![allowed.path().to_string_lossy().to_string()],
            ..ServerConfig::default()
        };
        config.convert.output_dir = allowed.path().join("generated");
        let server = server_with(config);

        let result = server
            .resolve_source(&HtmlSource::Path {
                path: file.to_string_lossy().to_string(),
            })
            .await;
        assert!(matches!(
            result,
            Err(crate::error::Error::PathAccessDenied { .. })
        ));
    }

    #[tokio::test]
    async fn test_convert_rejects_zero_pages_before_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let params: ConvertHtmlParams = serde_json::from_str(
            r#"{"source": {"html": "<p>x</p>"}, "max_pages": 0}"#,
        )
        .unwrap();

        let json = server.convert_html(Parameters(params)).await;
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let error = value["results"][0]["error"].as_str().unwrap();
        assert_eq!(error, "Invalid input: max_pages must be at least 1");
        assert!(!dir.path().join("generated").exists());
    }

    #[tokio::test]
    async fn test_analyze_reports_missing_cache_key() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let params = AnalyzeFitParams {
            source: HtmlSource::CacheRef {
                cache_key: "nope".to_string(),
            },
            max_pages: None,
            density_reduction: false,
            cache: false,
        };

        let json = server.analyze_fit(Parameters(params)).await;
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["results"][0]["error"], "Cache key not found");
        assert_eq!(value["results"][0]["source"], "<cache:nope>");
    }

    #[test]
    fn test_list_html() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.html"), "<p/>").unwrap();
        std::fs::write(dir.path().join("a.HTM"), "<p/>").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub").join("c.html"), "<p/>").unwrap();
        let server = server_in(dir.path());

        let params = ListHtmlParams {
            directory: dir.path().to_string_lossy().to_string(),
            recursive: false,
            pattern: None,
        };
        let result = server.process_list_html(&params).unwrap();
        let names: Vec<&str> = result.files.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["a.HTM", "b.html"]);

        let params = ListHtmlParams {
            recursive: true,
            pattern: Some("c*".to_string()),
            ..params
        };
        let result = server.process_list_html(&params).unwrap();
        assert_eq!(result.total_count, 1);
        assert_eq!(result.files[0].name, "c.html");
    }

    #[test]
    fn test_list_html_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let params = ListHtmlParams {
            directory: dir.path().join("missing").to_string_lossy().to_string(),
            recursive: false,
            pattern: None,
        };
        assert!(server.process_list_html(&params).is_err());
    }

    #[test]
    fn test_generated_pdfs_and_read_guard() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let generated = dir.path().join("generated");
        std::fs::create_dir_all(&generated).unwrap();
        std::fs::write(generated.join("cv-1a2b3c4d.pdf"), b"%PDF-1.7").unwrap();
        std::fs::write(generated.join("ignore.txt"), b"x").unwrap();
        std::fs::write(dir.path().join("outside.pdf"), b"%PDF-1.7").unwrap();

        let files = server.generated_pdfs();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].name, "cv-1a2b3c4d.pdf");

        let data = server
            .read_generated_pdf(&generated.join("cv-1a2b3c4d.pdf").to_string_lossy())
            .unwrap();
        assert_eq!(data, b"%PDF-1.7");

        let outside = dir.path().join("outside.pdf");
        assert!(server
            .read_generated_pdf(&outside.to_string_lossy())
            .is_err());
    }

    #[test]
    fn test_pdf_resource_size() {
        let file = |size: u64| HtmlFileInfo {
            path: "/srv/generated/cv-1a2b3c4d.pdf".to_string(),
            name: "cv-1a2b3c4d.pdf".to_string(),
            size,
            modified: None,
        };

        let small = pdf_resource(file(2048));
        assert_eq!(small.raw.size, Some(2048));
        assert_eq!(small.raw.uri, "file:///srv/generated/cv-1a2b3c4d.pdf");
        assert_eq!(small.raw.mime_type.as_deref(), Some("application/pdf"));

        let huge = pdf_resource(file(5 * 1024 * 1024 * 1024));
        assert_eq!(huge.raw.size, None);
        assert!(huge
            .raw
            .description
            .unwrap()
            .contains("5368709120 bytes"));
    }

    #[test]
    fn test_write_output_creates_parent() {
        let dir = tempfile::tempdir().unwrap();
        let server = server_in(dir.path());
        let target = dir.path().join("nested").join("out.pdf");

        let written = server
            .write_output(&Some(target.to_string_lossy().to_string()), b"%PDF")
            .unwrap();
        assert!(written.is_some());
        assert_eq!(std::fs::read(&target).unwrap(), b"%PDF");
        assert_eq!(server.write_output(&None, b"%PDF").unwrap(), None);
    }
}
