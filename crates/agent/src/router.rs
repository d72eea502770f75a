//! Prompt routing: pick a specialized prompt file before running the turn.
//!
//! The router instructions live in a file whose sibling files (with the
//! configured extension) are the candidates. The model sees the
//! instructions, the candidate list and the memory-enriched message, and
//! answers with one file name. Anything it answers that matches no
//! candidate falls back to the default route.

use agentkit_config::AppConfig;
use agentkit_core::error::{Error, Result};
use agentkit_core::message::PromptMessage;
use agentkit_core::provider::ProviderRequest;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::orchestrator::{Orchestrator, TurnRequest, bounded, read_prompt};
use crate::trace::RouteTrace;

/// Characters stripped from both ends of the router's answer.
const CHOICE_PUNCTUATION: &[char] = &[
    '.', ',', ';', ':', '!', '?', ')', '(', '\'', '"', '`', '\u{201d}', '\u{2019}', '\u{201c}',
    '\u{2018}',
];

const INVALID_OPTION: &str = "router returned an invalid option";

#[derive(Debug, Clone)]
pub struct RouterSettings {
    /// Candidate used when the answer matches nothing
    pub default_route: String,
    /// Candidate file extension, without the dot
    pub extension: String,
    pub max_output_tokens: u32,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            default_route: "geral.md".into(),
            extension: "md".into(),
            max_output_tokens: 32,
        }
    }
}

impl RouterSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            default_route: config.router.default_route.clone(),
            extension: config.router.extension.clone(),
            max_output_tokens: config.router.max_output_tokens,
        }
    }
}

/// A turn plus the optional router instructions file.
#[derive(Debug, Clone)]
pub struct RouteRequest {
    pub turn: TurnRequest,
    pub router_path: Option<PathBuf>,
}

impl RouteRequest {
    pub fn new(turn: TurnRequest) -> Self {
        Self {
            turn,
            router_path: None,
        }
    }

    pub fn with_router(mut self, path: impl Into<PathBuf>) -> Self {
        self.router_path = Some(path.into());
        self
    }
}

pub struct Router {
    orchestrator: Arc<Orchestrator>,
    settings: RouterSettings,
}

impl Router {
    pub fn new(orchestrator: Arc<Orchestrator>, settings: RouterSettings) -> Self {
        Self {
            orchestrator,
            settings,
        }
    }

    /// Run a possibly routed turn and return its reply. Without a router
    /// file this is exactly [`Orchestrator::respond`].
    pub async fn respond(&self, request: RouteRequest) -> Result<String> {
        let verbose = request.turn.verbose;
        match request.router_path {
            None => self.orchestrator.respond(request.turn).await,
            Some(path) => Ok(self.route(request.turn, &path).await?.render(verbose)),
        }
    }

    /// Choose a specialized prompt with `router_path`, then run the turn with
    /// it appended as the last extra system prompt.
    pub async fn route(&self, turn: TurnRequest, router_path: &Path) -> Result<RouteTrace> {
        let deadline = turn
            .deadline
            .unwrap_or_else(|| Instant::now() + self.orchestrator.settings().turn_timeout);
        let cancel = turn.cancel.clone().unwrap_or_default();

        let (mut trace, special) =
            bounded(deadline, &cancel, self.choose(&turn, router_path, &cancel)).await?;

        info!(
            session = %turn.session_id,
            chosen = %trace.chosen,
            fallback = !trace.router_error.is_empty(),
            "Routed turn"
        );

        let inner = turn
            .with_system_prompt(special)
            .with_deadline(deadline)
            .with_cancellation(cancel);
        trace.turn = self.orchestrator.run(inner).await?;
        Ok(trace)
    }

    /// Pick the candidate and read it. Returns the trace so far and the
    /// specialized prompt text.
    async fn choose(
        &self,
        turn: &TurnRequest,
        router_path: &Path,
        cancel: &CancellationToken,
    ) -> Result<(RouteTrace, String)> {
        let mut trace = RouteTrace {
            router_enabled: true,
            router_path: router_path.display().to_string(),
            base_prompt: turn.prompt_path.display().to_string(),
            user_message: turn.message.clone(),
            ..RouteTrace::default()
        };

        let instructions = read_prompt(router_path).await?;

        let dir = router_dir(router_path);
        let own_name = router_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let candidates = list_candidates(dir, &self.settings.extension, &own_name).await?;
        let fallback = fallback_candidate(&candidates, &self.settings.default_route)
            .ok_or_else(|| Error::Routing(format!("no candidates in {}", dir.display())))?
            .to_string();
        trace.candidates = candidates.clone();

        let retrieved = self
            .orchestrator
            .retriever()
            .retrieve(&turn.session_id, &turn.message, cancel)
            .await;
        let query = routing_query(&retrieved.memory_block(), &turn.message);

        let request = ProviderRequest {
            model: self.orchestrator.settings().model.clone(),
            messages: vec![
                PromptMessage::system(routing_prompt(&instructions, &candidates)),
                PromptMessage::user(query),
            ],
            prompt_cache_key: None,
            max_output_tokens: Some(self.settings.max_output_tokens),
        };

        let matched = match self.orchestrator.provider().complete(request).await {
            Ok(response) => {
                trace.router_raw = response.output_text;
                let hit = match_candidate(&trace.router_raw, &candidates, &self.settings.extension);
                if hit.is_none() {
                    trace.router_error = INVALID_OPTION.into();
                }
                hit.map(str::to_string)
            }
            Err(e) => {
                trace.router_error = e.to_string();
                None
            }
        };

        let mut chosen = match matched {
            Some(candidate) => candidate,
            None => {
                warn!(
                    raw = %trace.router_raw,
                    error = %trace.router_error,
                    fallback = %fallback,
                    "Router answer unusable, falling back"
                );
                fallback.clone()
            }
        };

        let mut special_path = dir.join(&chosen);
        let special = match read_prompt(&special_path).await {
            Ok(text) => text,
            Err(e) => {
                trace.router_error = format!("chosen prompt not found: {e}");
                warn!(chosen = %chosen, fallback = %fallback, "Chosen prompt unreadable");
                chosen = fallback;
                special_path = dir.join(&chosen);
                read_prompt(&special_path).await?
            }
        };

        debug!(chosen = %chosen, raw = %trace.router_raw, "Router decision");
        trace.chosen = chosen;
        trace.special_prompt = special_path.display().to_string();
        Ok((trace, special))
    }
}

fn router_dir(router_path: &Path) -> &Path {
    match router_path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}

/// Whether `name` ends with `.extension`, ignoring case.
fn has_extension(name: &str, extension: &str) -> bool {
    name.to_lowercase()
        .ends_with(&format!(".{}", extension.to_lowercase()))
}

/// `name` without a trailing `.extension` (case-insensitive).
fn stem<'a>(name: &'a str, extension: &str) -> &'a str {
    if has_extension(name, extension) {
        name.get(..name.len() - extension.len() - 1).unwrap_or(name)
    } else {
        name
    }
}

/// Regular files in `dir` with `extension`, except `exclude`, sorted.
pub async fn list_candidates(dir: &Path, extension: &str, exclude: &str) -> Result<Vec<String>> {
    let listing_failed = |e: std::io::Error| {
        Error::Routing(format!("failed to list router dir {}: {e}", dir.display()))
    };

    let mut entries = tokio::fs::read_dir(dir).await.map_err(listing_failed)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(listing_failed)? {
        if entry.file_type().await.map_err(listing_failed)?.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !has_extension(&name, extension) || name.eq_ignore_ascii_case(exclude) {
            continue;
        }
        files.push(name);
    }
    files.sort();
    Ok(files)
}

/// Reduce a free-form answer to one lowercase token: first line, first
/// word, surrounding punctuation and quotes stripped.
pub fn normalize_choice(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    let line = lowered.split(['\n', '\r']).next().unwrap_or_default();
    let token = line.split_whitespace().next().unwrap_or(line);
    token.trim_matches(CHOICE_PUNCTUATION).to_string()
}

/// The candidate the answer names, with or without the extension.
pub fn match_candidate<'a>(raw: &str, candidates: &'a [String], extension: &str) -> Option<&'a str> {
    let choice = normalize_choice(raw);
    let with_ext = if has_extension(&choice, extension) {
        choice
    } else {
        format!("{choice}.{extension}")
    };

    if let Some(hit) = candidates
        .iter()
        .find(|c| c.to_lowercase() == with_ext.to_lowercase())
    {
        return Some(hit);
    }

    let wanted = stem(&with_ext, extension).to_lowercase();
    candidates
        .iter()
        .find(|c| stem(c, extension).to_lowercase() == wanted)
        .map(String::as_str)
}

/// `prefer` if it is a candidate (ignoring case), else the first candidate.
pub fn fallback_candidate<'a>(candidates: &'a [String], prefer: &str) -> Option<&'a str> {
    candidates
        .iter()
        .find(|c| c.to_lowercase() == prefer.to_lowercase())
        .or_else(|| candidates.first())
        .map(String::as_str)
}

/// The router's system message: its instructions plus the closed list of
/// allowed answers.
pub fn routing_prompt(instructions: &str, candidates: &[String]) -> String {
    let example = candidates.first().map_or("geral.md", String::as_str);
    let mut prompt = String::from(instructions);
    prompt.push_str("\n\n== Routing rules ==\n");
    prompt.push_str(
        "Choose exactly ONE of the following prompt files and answer ONLY with the file name.\n",
    );
    prompt.push_str("Allowed options:\n");
    for candidate in candidates {
        prompt.push_str("- ");
        prompt.push_str(candidate);
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nOutput format: only the file name (e.g. {example}). Do not include explanations.\n"
    ));
    prompt
}

/// The routing query: the memory block, then the literal message.
pub fn routing_query(memory_block: &str, message: &str) -> String {
    if memory_block.is_empty() {
        message.to_string()
    } else {
        format!("{memory_block}\nUser now: {message}")
    }
}
