//! System prompt construction.

use autolite_core::command::CommandRegistry;

use crate::parser::JSON_SCHEMA;

const DEFAULT_CONSTRAINTS: &[&str] = &[
    "~4000 word limit for short term memory. Your short term memory is short, so immediately save important information to files.",
    "If you are unsure how you previously did something or want to recall past events, thinking about similar events will help you remember.",
    "No user assistance",
    "Exclusively use the commands listed in double quotes e.g. \"command name\"",
];

const DEFAULT_RESOURCES: &[&str] = &[
    "Internet access for searches and information gathering.",
    "Long Term memory management.",
    "Local model powered Agents for delegation of simple tasks.",
    "File output.",
];

const DEFAULT_EVALUATION: &[&str] = &[
    "Continuously review and analyze your actions to ensure you are performing to the best of your abilities.",
    "Constructively self-criticize your big-picture behavior constantly.",
    "Reflect on past decisions and strategies to refine your approach.",
    "Every command has a cost, so be smart and efficient. Aim to complete tasks in the least number of steps.",
];

/// Builds the system prompt that frames every cycle.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    ai_name: String,
    ai_role: String,
    goals: Vec<String>,
    constraints: Vec<String>,
    commands: String,
    resources: Vec<String>,
    evaluation: Vec<String>,
}

impl PromptBuilder {
    pub fn new(ai_name: impl Into<String>, ai_role: impl Into<String>) -> Self {
        let owned = |items: &[&str]| items.iter().map(|s| s.to_string()).collect();
        Self {
            ai_name: ai_name.into(),
            ai_role: ai_role.into(),
            goals: Vec::new(),
            constraints: owned(DEFAULT_CONSTRAINTS),
            commands: String::new(),
            resources: owned(DEFAULT_RESOURCES),
            evaluation: owned(DEFAULT_EVALUATION),
        }
    }

    pub fn with_goals(mut self, goals: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.goals.extend(goals.into_iter().map(Into::into));
        self
    }

    pub fn with_constraint(mut self, constraint: impl Into<String>) -> Self {
        self.constraints.push(constraint.into());
        self
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resources.push(resource.into());
        self
    }

    /// List the registered commands.
    pub fn with_commands(mut self, registry: &CommandRegistry) -> Self {
        self.commands = registry.describe();
        self
    }

    pub fn build(&self) -> String {
        let mut prompt = format!(
            "You are {}, {}\nYour decisions must always be made independently without seeking user assistance. \
             Play to your strengths as an LLM and pursue simple strategies with no legal complications.\n\n",
            self.ai_name, self.ai_role
        );

        if !self.goals.is_empty() {
            prompt.push_str(&format!("GOALS:\n\n{}\n\n", numbered(&self.goals)));
        }

        prompt.push_str(&format!("Constraints:\n{}\n\n", numbered(&self.constraints)));
        prompt.push_str(&format!("Commands:\n{}\n\n", self.commands));
        prompt.push_str(&format!("Resources:\n{}\n\n", numbered(&self.resources)));
        prompt.push_str(&format!("Performance Evaluation:\n{}\n\n", numbered(&self.evaluation)));
        prompt.push_str(&format!(
            "You should only respond in JSON format as described below \nResponse Format: \n{JSON_SCHEMA} \n\
             Ensure the response can be parsed by a JSON parser"
        ));
        prompt
    }
}

fn numbered(items: &[String]) -> String {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| format!("{}. {item}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}
