//! Web commands: search, browse, summarise, list links.
//!
//! Plain HTTP GETs through `reqwest`; pages are reduced to text with
//! [`crate::html`]. Summaries are produced chunk by chunk with the helper
//! completion client, and every raw chunk and chunk summary is also written
//! to memory so later cycles can recall what was read.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autolite_core::command::{Command, CommandHandler, CommandKind, CommandOutcome};
use autolite_core::error::ToolError;
use autolite_core::memory::MemoryBackend;
use autolite_core::message::Message;
use autolite_core::provider::{CompletionClient, CompletionRequest};
use reqwest::Url;
use tracing::{debug, warn};

use crate::html::{extract_links, extract_text, inline_text, split_text};

const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";
const SEARCH_RESULTS: usize = 5;
const BROWSE_LINKS: usize = 5;

/// Settings for the web commands.
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub user_agent: String,
    pub timeout: Duration,
    pub chunk_max_length: usize,
    pub summary_max_tokens: u32,
    pub temperature: f32,
    pub search_endpoint: String,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)".into(),
            timeout: Duration::from_secs(30),
            chunk_max_length: 8192,
            summary_max_tokens: 300,
            temperature: 1.0,
            search_endpoint: SEARCH_ENDPOINT.into(),
        }
    }
}

/// Shared HTTP client plus the services summaries need.
pub struct WebClient {
    http: reqwest::Client,
    settings: WebSettings,
    completion: Arc<dyn CompletionClient>,
    memory: Arc<dyn MemoryBackend>,
}

impl WebClient {
    pub fn new(
        settings: WebSettings,
        completion: Arc<dyn CompletionClient>,
        memory: Arc<dyn MemoryBackend>,
    ) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout)
            .build()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "web".into(),
                reason: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            http,
            settings,
            completion,
            memory,
        })
    }

    /// GET a page body. The URL must be http(s) and not point at this machine.
    pub async fn fetch(&self, kind: CommandKind, raw_url: &str) -> Result<(Url, String), ToolError> {
        let url = validate_url(raw_url).map_err(|reason| ToolError::InvalidArguments(reason))?;
        debug!(url = %url, "Fetching page");

        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: kind.name().into(),
            reason,
        };

        let response = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;

        let status = response.status();
        if status.as_u16() >= 400 {
            return Err(failed(format!("HTTP {}", status.as_u16())));
        }

        let body = response.text().await.map_err(|e| failed(e.to_string()))?;
        Ok((url, body))
    }

    async fn complete(&self, content: String) -> Result<String, ToolError> {
        let request = CompletionRequest::new(vec![Message::user(content)])
            .with_max_tokens(self.settings.summary_max_tokens)
            .with_temperature(self.settings.temperature);
        self.completion
            .complete(request)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: "summarize".into(),
                reason: e.to_string(),
            })
    }

    async fn remember(&self, text: String) {
        if let Err(e) = self.memory.add(&text).await {
            warn!(error = %e, "Failed to store page text in memory");
        }
    }

    /// Summarise `text` with respect to `question`, chunk by chunk.
    pub async fn summarize(&self, source: &str, text: &str, question: &str) -> Result<String, ToolError> {
        if text.trim().is_empty() {
            return Ok("No text to summarize".into());
        }

        let chunks = split_text(text, self.settings.chunk_max_length);
        let mut summaries = Vec::with_capacity(chunks.len());

        for (i, chunk) in chunks.iter().enumerate() {
            debug!(source, part = i + 1, of = chunks.len(), "Summarizing chunk");
            self.remember(format!("Source: {source}\nRaw part#{}: {chunk}", i + 1)).await;
            let summary = self.complete(question_prompt(chunk, question)).await?;
            self.remember(format!("Source: {source}\nSummary part#{}: {summary}", i + 1)).await;
            summaries.push(summary);
        }

        if summaries.len() == 1 {
            return Ok(summaries.remove(0));
        }
        self.complete(question_prompt(&summaries.join("\n"), question)).await
    }
}

fn question_prompt(chunk: &str, question: &str) -> String {
    format!("\"\"\"{chunk}\"\"\" Using the above text, answer the following question: \"{question}\" -- if the question cannot be answered using the text, summarize the text.")
}

/// Accept only absolute http(s) URLs with a host that is not this machine.
/// Query string and fragment are dropped.
pub fn validate_url(raw: &str) -> Result<Url, String> {
    let mut url = Url::parse(raw.trim()).map_err(|e| format!("invalid URL '{raw}': {e}"))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported URL scheme '{}'", url.scheme()));
    }

    let host = url.host_str().ok_or_else(|| format!("URL '{raw}' has no host"))?;
    let local = host.eq_ignore_ascii_case("localhost")
        || host
            .trim_matches(|c| c == '[' || c == ']')
            .parse::<std::net::IpAddr>()
            .is_ok_and(|ip| ip.is_loopback() || ip.is_unspecified());
    if local {
        return Err("access to local addresses is restricted".into());
    }

    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

/// `text (url)` lines with relative hrefs resolved against `base`.
pub fn format_links(base: &Url, links: Vec<(String, String)>, limit: usize) -> Vec<String> {
    links
        .into_iter()
        .filter_map(|(text, href)| {
            let resolved = base.join(&href).ok()?;
            matches!(resolved.scheme(), "http" | "https").then(|| format!("{text} ({resolved})"))
        })
        .take(limit)
        .collect()
}

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Parse the DuckDuckGo HTML results page.
pub fn parse_search_results(html: &str, limit: usize) -> Vec<SearchResult> {
    use std::sync::LazyLock;

    use regex_lite::Regex;

    static RESULT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(?is)class="result__a"[^>]*?href="([^"]*)"[^>]*>(.*?)</a>"#).expect("valid regex")
    });
    static SNIPPET: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r#"(?is)class="result__snippet"[^>]*>(.*?)</a>"#).expect("valid regex"));

    let anchors: Vec<_> = RESULT.captures_iter(html).collect();
    anchors
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            // a result's snippet sits between its title link and the next result
            let block_start = caps.get(0)?.end();
            let block_end = anchors
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map_or(html.len(), |m| m.start());
            let snippet = SNIPPET
                .captures(&html[block_start..block_end])
                .and_then(|c| c.get(1))
                .map(|m| inline_text(m.as_str()))
                .unwrap_or_default();

            let href = crate::html::decode_entities(caps.get(1)?.as_str());
            Some(SearchResult {
                title: inline_text(caps.get(2)?.as_str()),
                url: unwrap_redirect(&href),
                snippet,
            })
        })
        .take(limit)
        .collect()
}

/// DuckDuckGo wraps result links as `//duckduckgo.com/l/?uddg=<target>`.
fn unwrap_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    Url::parse(&absolute)
        .ok()
        .and_then(|u| u.query_pairs().find(|(k, _)| k == "uddg").map(|(_, v)| v.into_owned()))
        .unwrap_or(absolute)
}

pub struct WebSearch {
    client: Arc<WebClient>,
}

impl WebSearch {
    pub fn new(client: Arc<WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandHandler for WebSearch {
    fn kind(&self) -> CommandKind {
        CommandKind::WebSearch
    }

    fn label(&self) -> &str {
        "Web Search"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["query"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let query = command.arg("query")?;
        let failed = |reason: String| ToolError::ExecutionFailed {
            tool_name: self.kind().name().into(),
            reason,
        };

        let response = self
            .client
            .http
            .post(&self.client.settings.search_endpoint)
            .form(&[("q", query)])
            .send()
            .await
            .map_err(|e| failed(e.to_string()))?;
        if response.status().as_u16() >= 400 {
            return Err(failed(format!("HTTP {}", response.status().as_u16())));
        }
        let body = response.text().await.map_err(|e| failed(e.to_string()))?;

        let results = parse_search_results(&body, SEARCH_RESULTS);
        if results.is_empty() {
            return Ok(CommandOutcome::Output(format!("No results found for '{query}'.")));
        }

        let text = results
            .iter()
            .enumerate()
            .map(|(i, r)| format!("{}. {}\n   {}\n   {}", i + 1, r.title, r.url, r.snippet))
            .collect::<Vec<_>>()
            .join("\n");
        Ok(CommandOutcome::Output(text))
    }
}

pub struct BrowseWebsite {
    client: Arc<WebClient>,
}

impl BrowseWebsite {
    pub fn new(client: Arc<WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandHandler for BrowseWebsite {
    fn kind(&self) -> CommandKind {
        CommandKind::BrowseWebsite
    }

    fn label(&self) -> &str {
        "Browse Website"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["url", "question"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let url = command.arg("url")?;
        let question = command.arg_opt("question").unwrap_or("What is this page about?");

        let (base, body) = self.client.fetch(self.kind(), url).await?;
        let summary = self.client.summarize(url, &extract_text(&body), question).await?;
        let links = format_links(&base, extract_links(&body), BROWSE_LINKS);

        Ok(CommandOutcome::Output(format!(
            "Website Content Summary: {summary}\n\nLinks: {}",
            links.join("\n")
        )))
    }
}

pub struct GetTextSummary {
    client: Arc<WebClient>,
}

impl GetTextSummary {
    pub fn new(client: Arc<WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandHandler for GetTextSummary {
    fn kind(&self) -> CommandKind {
        CommandKind::GetTextSummary
    }

    fn label(&self) -> &str {
        "Get text summary"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["url", "question"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let url = command.arg("url")?;
        let question = command.arg_opt("question").unwrap_or("What is this page about?");

        let (_, body) = self.client.fetch(self.kind(), url).await?;
        let summary = self.client.summarize(url, &extract_text(&body), question).await?;
        Ok(CommandOutcome::Output(format!("Result: {summary}")))
    }
}

pub struct GetHyperlinks {
    client: Arc<WebClient>,
}

impl GetHyperlinks {
    pub fn new(client: Arc<WebClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CommandHandler for GetHyperlinks {
    fn kind(&self) -> CommandKind {
        CommandKind::GetHyperlinks
    }

    fn label(&self) -> &str {
        "Get hyperlinks"
    }

    fn arg_names(&self) -> &[&'static str] {
        &["url"]
    }

    async fn execute(&self, command: &Command) -> Result<CommandOutcome, ToolError> {
        let url = command.arg("url")?;
        let (base, body) = self.client.fetch(self.kind(), url).await?;
        let links = format_links(&base, extract_links(&body), usize::MAX);
        if links.is_empty() {
            return Ok(CommandOutcome::output("No links found."));
        }
        Ok(CommandOutcome::Output(links.join("\n")))
    }
}
