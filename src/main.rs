use std::sync::Arc;
use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

mod apis;
mod citation;
mod config;
mod search;
mod session;

use apis::PaperRecord;
use citation::CitationStyle;
use config::Config;
use search::Aggregator;
use session::SearchSession;

// ── Parameter structs ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize, JsonSchema)]
struct SearchPapersParams {
    #[schemars(description = "Free-text search query")]
    query: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct PaperIndexParams {
    #[schemars(description = "Zero-based position in the results of the latest search")]
    index: usize,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct FormatCitationParams {
    #[schemars(description = "Zero-based position in the results of the latest search")]
    index: usize,
    #[schemars(description = "Citation style: 'plain' (default), 'apa', 'bibtex'")]
    style: Option<String>,
}

// ── Server ──────────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct PaperExplorerServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    aggregator: Arc<Aggregator>,
    session: Arc<SearchSession>,
}

#[tool_router]
impl PaperExplorerServer {
    pub fn create() -> anyhow::Result<Self> {
        let config = Config::from_env();
        let aggregator = config.build_aggregator()?;

        tracing::info!(
            "Initialized {} paper sources, max_results={}, timeout={:?}",
            aggregator.sources().len(),
            config.max_results,
            config.request_timeout
        );

        Ok(Self {
            tool_router: Self::tool_router(),
            config: Arc::new(config),
            aggregator: Arc::new(aggregator),
            session: Arc::new(SearchSession::new()),
        })
    }

    fn displayed_record(&self, index: usize) -> Result<PaperRecord, McpError> {
        self.session.record(index).ok_or_else(|| {
            McpError::invalid_params(
                format!("No paper at index {} in the current results. Run search_papers first.", index),
                None,
            )
        })
    }

    #[tool(description = "List the paper sources and their status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        let statuses = self.config.source_status();
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Search CrossRef and Semantic Scholar. Returns CrossRef results followed by Semantic Scholar results, with a status per source.")]
    async fn search_papers(
        &self,
        Parameters(params): Parameters<SearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let query = Aggregator::validate(&params.query)
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let ticket = self.session.begin();
        let search = self.aggregator.aggregate(query).await
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let summary = search.summary();
        let json = serde_json::to_string_pretty(&search)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;

        if !self.session.publish(ticket, search) {
            return Ok(CallToolResult::success(vec![Content::text(format!(
                "Search for '{}' was superseded by a newer search; its results were discarded.",
                query
            ))]));
        }
        Ok(CallToolResult::success(vec![Content::text(summary), Content::text(json)]))
    }

    #[tool(description = "Get full details of a paper from the latest search results")]
    async fn get_paper(
        &self,
        Parameters(params): Parameters<PaperIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let paper = self.displayed_record(params.index)?;
        let json = serde_json::to_string_pretty(&paper)
            .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Format a citation for a paper from the latest search results. Style: 'plain' (default), 'apa', 'bibtex'")]
    async fn format_citation(
        &self,
        Parameters(params): Parameters<FormatCitationParams>,
    ) -> Result<CallToolResult, McpError> {
        let style: CitationStyle = params.style.as_deref().unwrap_or("plain").parse()
            .map_err(|e: String| McpError::invalid_params(e, None))?;
        let paper = self.displayed_record(params.index)?;
        Ok(CallToolResult::success(vec![Content::text(
            citation::format_citation(&paper, style),
        )]))
    }

    #[tool(description = "Get the link to open a paper from the latest search results (DOI resolver when available)")]
    async fn get_paper_link(
        &self,
        Parameters(params): Parameters<PaperIndexParams>,
    ) -> Result<CallToolResult, McpError> {
        let paper = self.displayed_record(params.index)?;
        let text = paper.link().unwrap_or_else(|| "No link available".to_string());
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[tool_handler]
impl ServerHandler for PaperExplorerServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Search academic papers on CrossRef and Semantic Scholar. \
                 search_papers replaces the current result list; get_paper, \
                 format_citation and get_paper_link refer to it by index."
                    .into(),
            ),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    tracing::info!("Starting paper-explorer MCP server");

    let server = PaperExplorerServer::create()?;
    let service = server.serve(stdio()).await?;
    service.waiting().await?;

    Ok(())
}
