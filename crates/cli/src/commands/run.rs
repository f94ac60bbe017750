//! `autolite run`: wire everything together and start the loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autolite_agent::{
    AgentLoop, AgentRegistry, AssemblyConfig, CommandParser, ContextAssembler, FeedbackSource, LoopSettings,
    PromptBuilder, RetryPolicy, StopReason, register_agent_commands,
};
use autolite_config::AppConfig;
use autolite_core::command::CommandRegistry;
use autolite_memory::create_backend;
use autolite_providers::build_from_config;
use autolite_tools::{ExecPolicy, ToolContext, WebSettings, register_builtin};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::info;

use super::load_config;

/// Command-line overrides for `run`.
#[derive(Debug, Default)]
pub struct RunOverrides {
    pub continuous: bool,
    pub continuous_limit: Option<u32>,
    pub goals: Vec<String>,
    pub name: Option<String>,
    pub role: Option<String>,
}

impl RunOverrides {
    fn apply(self, config: &mut AppConfig) {
        if self.continuous {
            config.continuous_mode = true;
        }
        if let Some(limit) = self.continuous_limit {
            config.continuous_limit = limit;
        }
        if !self.goals.is_empty() {
            config.ai_goals = self.goals;
        }
        if let Some(name) = self.name {
            config.ai_name = name;
        }
        if let Some(role) = self.role {
            config.ai_role = role;
        }
    }
}

/// Human feedback read line by line from stdin.
struct StdinFeedback {
    lines: Lines<BufReader<Stdin>>,
}

impl StdinFeedback {
    fn new() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }
}

#[async_trait]
impl FeedbackSource for StdinFeedback {
    async fn next_feedback(&mut self) -> Option<String> {
        let mut stdout = tokio::io::stdout();
        stdout.write_all(b"Human feedback: ").await.ok()?;
        stdout.flush().await.ok()?;
        self.lines.next_line().await.ok().flatten()
    }
}

pub async fn run(config_path: Option<&Path>, overrides: RunOverrides) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(config_path)?;
    overrides.apply(&mut config);
    config.validate()?;

    let workspace = config.workspace();
    std::fs::create_dir_all(&workspace)?;

    let backends = build_from_config(&config)?;
    let memory = create_backend(
        &config.memory.backend,
        config.memory.snapshot_path(),
        backends.embedder.clone(),
    );

    let mut commands = CommandRegistry::new();
    register_builtin(
        &mut commands,
        ToolContext {
            workspace: workspace.clone(),
            exec: ExecPolicy::new(&workspace).with_enabled(config.execute_local_commands),
            web: WebSettings {
                user_agent: config.browsing.user_agent.clone(),
                timeout: Duration::from_secs(config.browsing.timeout_secs),
                chunk_max_length: config.browsing.chunk_max_length,
                summary_max_tokens: config.browsing.summary_max_tokens,
                temperature: config.llm.temperature,
                ..WebSettings::default()
            },
            memory: memory.clone(),
            completion: backends.completion.clone(),
            fast: backends.fast.clone(),
        },
    )?;
    let agents = Arc::new(AgentRegistry::new(backends.fast.clone()).with_temperature(config.llm.temperature));
    register_agent_commands(&mut commands, agents, None);

    let prompt = PromptBuilder::new(&config.ai_name, &config.ai_role)
        .with_goals(config.ai_goals.iter().cloned())
        .with_commands(&commands)
        .build();

    let assembler = ContextAssembler::new(backends.completion.clone(), memory.clone())
        .with_config(AssemblyConfig::from_config(&config))
        .with_retry(RetryPolicy::from_config(&config));
    let parser = CommandParser::new().with_repair_client(backends.completion.clone());

    let agent = AgentLoop::new(prompt, assembler, parser, Arc::new(commands), memory).with_settings(LoopSettings {
        token_limit: config.llm.token_limit,
        continuous: config.continuous_mode,
        continuous_limit: config.continuous_limit,
    });

    println!("Welcome to AutoLite. Using AI: {}", config.ai_name);
    println!("   Workspace: {}", workspace.display());
    if config.continuous_mode {
        println!("   Continuous mode: the agent will not wait for feedback.");
    } else {
        println!("   Type feedback after each step, an empty line to continue, or 'exit' to stop.");
    }
    info!(model = %backends.completion.default_model(), "Agent starting");

    let mut history = Vec::new();
    let summary = agent.run(&mut history, &mut StdinFeedback::new()).await;

    match summary.stop {
        StopReason::TaskComplete { reason } => println!("Task complete after {} cycles: {reason}", summary.cycles),
        StopReason::LimitReached { limit } => println!("Continuous limit reached: {limit}"),
        StopReason::UserExit => println!("Exiting..."),
    }
    Ok(())
}
