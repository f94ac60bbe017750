//! End-to-end integration tests for the AutoLite agent.
//!
//! These tests exercise the full pipeline from a model reply to recorded
//! command output: context assembly, parsing, dispatch through the real
//! built-in commands, and persistence of the vector memory.

use std::collections::VecDeque;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autolite_agent::{
    AgentLoop, AgentRegistry, CommandParser, ContextAssembler, LoopSettings, PromptBuilder, RetryPolicy,
    ScriptedFeedback, StopReason, register_agent_commands,
};
use autolite_core::command::CommandRegistry;
use autolite_core::error::ProviderError;
use autolite_core::memory::MemoryBackend;
use autolite_core::message::{Message, Role};
use autolite_core::provider::{CompletionClient, CompletionRequest};
use autolite_memory::{HashEmbedder, LocalCache};
use autolite_tools::{ExecPolicy, ToolContext, WebSettings, register_builtin};

// ── Mock Provider ────────────────────────────────────────────────────────

/// A completion client that returns scripted replies in sequence.
struct ScriptedProvider {
    replies: Mutex<VecDeque<String>>,
    requests: Mutex<Vec<CompletionRequest>>,
}

impl ScriptedProvider {
    fn new(replies: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl CompletionClient for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    fn default_model(&self) -> &str {
        "local-model"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, ProviderError> {
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| ProviderError::InvalidResponse("no more scripted replies".into()))
    }
}

fn reply(name: &str, args: serde_json::Value) -> String {
    serde_json::json!({
        "thoughts": {
            "text": format!("I should use {name}"),
            "reasoning": "it moves the task forward",
            "plan": "- act\n- check",
            "criticism": "none yet",
            "speak": "working on it"
        },
        "command": { "name": name, "args": args }
    })
    .to_string()
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    provider: Arc<ScriptedProvider>,
    memory: Arc<LocalCache>,
    agent: AgentLoop,
}

fn open_memory(dir: &Path) -> Arc<LocalCache> {
    Arc::new(LocalCache::new(dir.join("memory.json"), Arc::new(HashEmbedder::new(256))))
}

fn harness(dir: &Path, replies: Vec<String>, settings: LoopSettings) -> Harness {
    let provider = ScriptedProvider::new(replies);
    let memory = open_memory(dir);
    let workspace = dir.join("workspace");
    std::fs::create_dir_all(&workspace).unwrap();

    let mut commands = CommandRegistry::new();
    register_builtin(
        &mut commands,
        ToolContext {
            workspace: workspace.clone(),
            exec: ExecPolicy::new(&workspace).with_enabled(false),
            web: WebSettings::default(),
            memory: memory.clone(),
            completion: provider.clone(),
            fast: provider.clone(),
        },
    )
    .unwrap();
    register_agent_commands(&mut commands, Arc::new(AgentRegistry::new(provider.clone())), None);

    let prompt = PromptBuilder::new("Tester", "an agent under test")
        .with_goals(["Finish the test"])
        .with_commands(&commands)
        .build();
    let assembler = ContextAssembler::new(provider.clone(), memory.clone()).with_retry(RetryPolicy {
        max_attempts: 1,
        backoff: Duration::ZERO,
    });
    let agent = AgentLoop::new(prompt, assembler, CommandParser::new(), Arc::new(commands), memory.clone())
        .with_settings(settings);

    Harness {
        provider,
        memory,
        agent,
    }
}

fn continuous(limit: u32) -> LoopSettings {
    LoopSettings {
        continuous: true,
        continuous_limit: limit,
        ..LoopSettings::default()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn zero_history_cycle_sends_preamble_and_input_once() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![reply("do_nothing", serde_json::json!({}))],
        continuous(1),
    );

    let mut history = Vec::new();
    let summary = h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;

    assert_eq!(summary.stop, StopReason::LimitReached { limit: 1 });
    assert_eq!(h.provider.calls(), 1);

    let sent = &h.provider.requests()[0].messages;
    assert_eq!(sent.len(), 4);
    assert!(sent[..3].iter().all(|m| m.role == Role::System));
    assert_eq!(sent[0].content, h.agent.prompt());
    assert_eq!(sent[2].content, "This reminds you of these events from your past:\n\n\n");
    assert_eq!(sent[3].role, Role::User);

    assert_eq!(history.len(), 3);
    assert_eq!(
        history[2],
        Message::system("Command do_nothing returned: No action performed.")
    );
}

#[tokio::test]
async fn prompt_lists_every_command() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), vec![], continuous(1));
    for name in ["web_search", "start_agent", "write_to_file", "execute_shell", "task_complete"] {
        assert!(h.agent.prompt().contains(&format!("\"{name}\"")), "missing {name}");
    }
}

#[tokio::test]
async fn file_workflow_then_task_complete() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![
            reply("write_to_file", serde_json::json!({"file": "report.md", "text": "# Findings"})),
            reply("read_file", serde_json::json!({"file": "report.md"})),
            reply("task_complete", serde_json::json!({"reason": "report written"})),
        ],
        continuous(10),
    );

    let mut history = Vec::new();
    let summary = h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;

    assert_eq!(summary.cycles, 3);
    assert_eq!(summary.stop, StopReason::TaskComplete { reason: "report written".into() });
    assert_eq!(
        std::fs::read_to_string(dir.path().join("workspace/report.md")).unwrap(),
        "# Findings"
    );

    let stored = h.memory.snapshot().await.texts;
    assert_eq!(
        stored,
        vec![
            "Command write_to_file returned: File written.".to_string(),
            "Command read_file returned: # Findings".to_string(),
        ]
    );

    // the third request saw both earlier command results
    let third = &h.provider.requests()[2];
    assert!(third.messages.iter().any(|m| m.content == "Command read_file returned: # Findings"));
}

#[tokio::test]
async fn workspace_escape_is_reported_not_performed() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![reply("write_to_file", serde_json::json!({"file": "../escape.txt", "text": "x"}))],
        continuous(1),
    );

    let mut history = Vec::new();
    h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;

    assert!(!dir.path().join("escape.txt").exists());
    let last = &history.last().unwrap().content;
    assert!(last.starts_with("Command write_to_file returned: Error:"), "{last}");
}

#[tokio::test]
async fn malformed_reply_is_repaired_locally() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec!["Okay. {command: {name: \"do_nothing\", args: {}}".to_string()],
        continuous(1),
    );

    let mut history = Vec::new();
    h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;
    assert_eq!(
        history.last().unwrap().content,
        "Command do_nothing returned: No action performed."
    );
}

#[tokio::test]
async fn parse_failure_is_not_remembered() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(dir.path(), vec!["I am not sure what to do".to_string()], continuous(1));

    let mut history = Vec::new();
    h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;

    assert!(history.last().unwrap().content.starts_with("Command Error:"));
    assert_eq!(h.memory.stats().await.records, 0);
}

#[tokio::test]
async fn memory_survives_restart_and_is_recalled() {
    let dir = tempfile::tempdir().unwrap();
    {
        let h = harness(
            dir.path(),
            vec![reply("memory_add", serde_json::json!({"string": "the deploy key is in the vault"}))],
            continuous(1),
        );
        let mut history = Vec::new();
        h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;
    }

    let reloaded = open_memory(dir.path());
    let stats = reloaded.stats().await;
    assert_eq!(stats.records, 2);
    assert_eq!(stats.shape, (2, 256));

    let hits = reloaded.get_relevant("the deploy key is in the vault", 1).await.unwrap();
    assert_eq!(hits, vec!["the deploy key is in the vault".to_string()]);

    // a later run with history recalls the note into the preamble
    let h = harness(dir.path(), vec![reply("do_nothing", serde_json::json!({}))], continuous(1));
    let mut history = vec![Message::assistant("where is the deploy key?")];
    h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;
    let sent = &h.provider.requests()[0].messages;
    assert!(sent[2].content.contains("the deploy key is in the vault"));
}

#[tokio::test]
async fn corrupt_snapshot_starts_empty() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("memory.json"), "not json").unwrap();
    let memory = open_memory(dir.path());
    assert_eq!(memory.stats().await.records, 0);
    assert!(memory.get_relevant("anything", 5).await.unwrap().is_empty());
}

#[tokio::test]
async fn sub_agent_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![
            reply(
                "start_agent",
                serde_json::json!({"name": "Helper", "task": "summaries", "prompt": "Summarise Rust"}),
            ),
            "Acknowledged".into(),
            "Rust is a systems language.".into(),
            reply("list_agents", serde_json::json!({})),
            reply("task_complete", serde_json::json!({"reason": "delegated"})),
        ],
        continuous(5),
    );

    let mut history = Vec::new();
    let summary = h.agent.run(&mut history, &mut ScriptedFeedback::default()).await;

    assert_eq!(summary.stop, StopReason::TaskComplete { reason: "delegated".into() });
    let results: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    assert_eq!(
        results,
        vec![
            "Command start_agent returned: Agent Helper created with key 0. First response: Rust is a systems language.",
            "Command list_agents returned: 0: summaries",
        ]
    );
}

#[tokio::test]
async fn human_feedback_steers_the_next_cycle() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness(
        dir.path(),
        vec![
            reply("do_nothing", serde_json::json!({})),
            reply("do_nothing", serde_json::json!({})),
        ],
        LoopSettings::default(),
    );

    let mut feedback = ScriptedFeedback::new(["check the readme first", "exit"]);
    let mut history = Vec::new();
    let summary = h.agent.run(&mut history, &mut feedback).await;

    assert_eq!(summary.stop, StopReason::UserExit);
    let second = &h.provider.requests()[1];
    assert_eq!(second.messages.last().unwrap().content, "check the readme first");
    assert!(
        h.memory
            .snapshot()
            .await
            .texts
            .contains(&"Human feedback: check the readme first".to_string())
    );
}
