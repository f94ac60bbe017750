//! Turns a raw model reply into a [`Command`].
//!
//! Local models often wrap their JSON in prose, leave keys unquoted, drop a
//! closing brace or emit stray backslashes. Parsing escalates through
//! cheap local repairs first and only asks the model to fix its own output
//! as a last resort.

use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

use autolite_core::command::Command;
use autolite_core::message::Message;
use autolite_core::provider::{CompletionClient, CompletionRequest};
use regex_lite::Regex;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

/// The response format the model is asked to follow.
pub const JSON_SCHEMA: &str = r#"{
    "thoughts": {
        "text": "thought",
        "reasoning": "reasoning",
        "plan": "- short bulleted\n- list that conveys\n- long-term plan",
        "criticism": "constructive self-criticism",
        "speak": "thoughts summary to say to user"
    },
    "command": {
        "name": "command name",
        "args": {
            "arg name": "value"
        }
    }
}"#;

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("valid regex"));

/// Why a reply could not be turned into a command.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandParseError {
    #[error("Could not parse the reply as JSON: {text}")]
    Unparseable { text: String },

    #[error("Reply has no 'command' object")]
    MissingCommand,

    #[error("Command has no 'name' string")]
    MissingName,

    #[error("Command 'args' must be an object, got: {0}")]
    InvalidArgs(String),
}

impl CommandParseError {
    /// Command name reported for a reply that failed to parse.
    pub fn command_name(&self) -> &'static str {
        "Error:"
    }
}

/// The model's self-reported reasoning. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Thoughts {
    pub text: Option<String>,
    pub reasoning: Option<String>,
    pub plan: Option<String>,
    pub criticism: Option<String>,
    pub speak: Option<String>,
}

impl Thoughts {
    fn from_map(map: &Map<String, Value>) -> Self {
        let field = |key: &str| map.get(key).filter(|v| !v.is_null()).map(value_text);
        Self {
            text: field("text"),
            reasoning: field("reasoning"),
            plan: field("plan"),
            criticism: field("criticism"),
            speak: field("speak"),
        }
    }
}

/// A successfully parsed reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub thoughts: Option<Thoughts>,
    pub command: Command,
}

/// Strings pass through; anything else becomes its JSON text.
fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) if items.iter().all(Value::is_string) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

/// Reply parser with optional model-assisted repair.
#[derive(Default)]
pub struct CommandParser {
    repair: Option<Arc<dyn CompletionClient>>,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask `client` to fix replies that local repair cannot.
    pub fn with_repair_client(mut self, client: Arc<dyn CompletionClient>) -> Self {
        self.repair = Some(client);
        self
    }

    pub async fn parse(&self, reply: &str) -> Result<ParsedReply, CommandParseError> {
        let value = match parse_local(reply) {
            Some(value) => value,
            None => self
                .repair_with_model(reply)
                .await
                .ok_or_else(|| CommandParseError::Unparseable { text: reply.to_string() })?,
        };
        validate(value)
    }

    async fn repair_with_model(&self, reply: &str) -> Option<Value> {
        let client = self.repair.as_ref()?;
        warn!(chars = reply.len(), "Reply is not valid JSON, asking the model to fix it");

        let messages = vec![
            Message::system(
                "You are now the following function:\n```\n\
                 # Fixes the provided JSON string to make it parseable and fully compliant with the provided schema.\n\
                 # If an object or field specified in the schema isn't contained within the correct JSON, it is omitted.\n\
                 def fix_json(json_str: str, schema: str) -> str:\n```\n\
                 Only respond with your `return` value.",
            ),
            Message::user(format!("'''{reply}''', '''{JSON_SCHEMA}'''")),
        ];
        let request = CompletionRequest::new(messages).with_temperature(0.0);

        let fixed = match client.complete(request).await {
            Ok(fixed) => fixed,
            Err(e) => {
                warn!(error = %e, "JSON repair request failed");
                return None;
            }
        };

        let candidate = FENCED
            .captures(&fixed)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .unwrap_or(&fixed)
            .trim();
        match serde_json::from_str(candidate) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "Model-repaired JSON still does not parse");
                None
            }
        }
    }
}

/// Strict parse, then local repair, then brace slicing.
fn parse_local(reply: &str) -> Option<Value> {
    let cleaned = reply.replace('\t', "");

    if let Ok(value) = serde_json::from_str(&cleaned) {
        return Some(value);
    }
    debug!("Strict JSON parse failed, trying local repair");

    if let Ok(value) = serde_json::from_str(&repair(&cleaned)) {
        return Some(value);
    }

    let slice = brace_slice(&cleaned)?;
    serde_json::from_str(slice)
        .or_else(|_| serde_json::from_str(&repair(slice)))
        .ok()
}

/// Quote bare keys, drop invalid escapes, balance braces.
pub fn repair(text: &str) -> String {
    let quoted = quote_bare_keys(text);
    let escaped = fix_escapes(&quoted);
    balance_braces(escaped.trim())
}

/// Quote identifiers that follow `{` or `,` and precede `:`. String
/// literals are copied through untouched.
fn quote_bare_keys(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;
    let mut key_position = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(c);
            i += 1;
            continue;
        }

        if key_position && (c.is_ascii_alphabetic() || c == '_') {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            let next = chars[i..].iter().find(|c| !c.is_whitespace());
            if next == Some(&':') {
                out.push('"');
                out.push_str(&ident);
                out.push('"');
            } else {
                out.push_str(&ident);
            }
            key_position = false;
            continue;
        }

        match c {
            '"' => in_string = true,
            '{' | ',' => {
                key_position = true;
                out.push(c);
                i += 1;
                continue;
            }
            _ => {}
        }
        if !c.is_whitespace() {
            key_position = false;
        }
        out.push(c);
        i += 1;
    }
    out
}

fn fix_escapes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            // invalid escape: keep the escaped character only
            _ => {}
        }
    }
    out
}

fn balance_braces(text: &str) -> String {
    let mut depth: isize = 0;
    let mut in_string = false;
    let mut escaped = false;
    for c in text.chars() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => depth -= 1,
            _ => {}
        }
    }

    let mut out = text.to_string();
    if depth > 0 {
        out.extend(std::iter::repeat_n('}', depth as usize));
    } else {
        while depth < 0 && out.trim_end().ends_with('}') {
            let end = out.trim_end().len();
            out.truncate(end - 1);
            depth += 1;
        }
    }
    out
}

fn brace_slice(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

fn validate(value: Value) -> Result<ParsedReply, CommandParseError> {
    let root = value.as_object().ok_or(CommandParseError::MissingCommand)?;
    let command = root
        .get("command")
        .and_then(Value::as_object)
        .ok_or(CommandParseError::MissingCommand)?;
    let name = command
        .get("name")
        .and_then(Value::as_str)
        .ok_or(CommandParseError::MissingName)?;

    let args: BTreeMap<String, String> = match command.get("args") {
        None | Some(Value::Null) => BTreeMap::new(),
        Some(Value::Object(map)) => map.iter().map(|(k, v)| (k.clone(), value_text(v))).collect(),
        Some(other) => return Err(CommandParseError::InvalidArgs(other.to_string())),
    };

    let thoughts = root.get("thoughts").and_then(Value::as_object).map(Thoughts::from_map);

    Ok(ParsedReply {
        thoughts,
        command: Command {
            name: name.to_string(),
            args,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{ScriptedClient, command_reply};

    async fn parse(reply: &str) -> Result<ParsedReply, CommandParseError> {
        CommandParser::new().parse(reply).await
    }

    #[tokio::test]
    async fn well_formed_reply() {
        let reply = command_reply("read_file", &[("file", "notes.txt")]);
        let parsed = parse(&reply).await.unwrap();
        assert_eq!(parsed.command, Command::new("read_file").with_arg("file", "notes.txt"));
        assert_eq!(parsed.thoughts.unwrap().speak.as_deref(), Some("on it"));
    }

    #[tokio::test]
    async fn unquoted_keys_repaired() {
        let parsed = parse(r#"{command: {name: "do_nothing", args: {}}}"#).await.unwrap();
        assert_eq!(parsed.command.name, "do_nothing");
        assert!(parsed.command.args.is_empty());
        assert!(parsed.thoughts.is_none());
    }

    #[tokio::test]
    async fn key_like_text_inside_values_left_alone() {
        let reply = r#"{command: {name: "write_to_file", args: {file: "a.txt", text: "Note, todo: fix {later: soon}"}}}"#;
        let parsed = parse(reply).await.unwrap();
        assert_eq!(
            parsed.command,
            Command::new("write_to_file")
                .with_arg("file", "a.txt")
                .with_arg("text", "Note, todo: fix {later: soon}")
        );
    }

    #[tokio::test]
    async fn surrounding_prose_sliced_off() {
        let reply = format!(
            "Sure! Here is my answer:\n{}\nLet me know.",
            command_reply("web_search", &[("query", "rust")])
        );
        let parsed = parse(&reply).await.unwrap();
        assert_eq!(parsed.command.arg("query").unwrap(), "rust");
    }

    #[tokio::test]
    async fn missing_closing_braces_appended() {
        let parsed = parse(r#"{"command": {"name": "list_agents", "args": {}"#).await.unwrap();
        assert_eq!(parsed.command.name, "list_agents");
    }

    #[tokio::test]
    async fn surplus_closing_braces_trimmed() {
        let parsed = parse(r#"{"command": {"name": "list_agents"}}}}"#).await.unwrap();
        assert_eq!(parsed.command.name, "list_agents");
    }

    #[tokio::test]
    async fn invalid_escapes_dropped() {
        let parsed = parse(r#"{"command": {"name": "execute_shell", "args": {"command_line": "grep \d+ a.txt\n"}}}"#)
            .await
            .unwrap();
        assert_eq!(parsed.command.arg("command_line").unwrap(), "grep d+ a.txt\n");
    }

    #[tokio::test]
    async fn tabs_removed() {
        let parsed = parse("{\t\"command\":\t{\"name\": \"do_nothing\"}}").await.unwrap();
        assert_eq!(parsed.command.name, "do_nothing");
    }

    #[tokio::test]
    async fn non_string_args_become_text() {
        let parsed = parse(r#"{"command": {"name": "write_tests", "args": {"code": "x", "focus": ["edge", "errors"], "n": 3}}}"#)
            .await
            .unwrap();
        assert_eq!(parsed.command.arg("focus").unwrap(), "edge\nerrors");
        assert_eq!(parsed.command.arg("n").unwrap(), "3");
    }

    #[tokio::test]
    async fn missing_name_is_reported() {
        let err = parse(r#"{"command": {"args": {}}}"#).await.unwrap_err();
        assert_eq!(err, CommandParseError::MissingName);
        assert_eq!(err.command_name(), "Error:");
    }

    #[tokio::test]
    async fn missing_command_is_reported() {
        assert_eq!(
            parse(r#"{"thoughts": {"text": "hmm"}}"#).await.unwrap_err(),
            CommandParseError::MissingCommand
        );
        assert_eq!(parse("[1, 2]").await.unwrap_err(), CommandParseError::MissingCommand);
    }

    #[tokio::test]
    async fn non_object_args_rejected() {
        let err = parse(r#"{"command": {"name": "x", "args": "oops"}}"#).await.unwrap_err();
        assert!(matches!(err, CommandParseError::InvalidArgs(_)));
    }

    #[tokio::test]
    async fn garbage_without_repair_client_is_unparseable() {
        let err = parse("not json").await.unwrap_err();
        assert_eq!(err, CommandParseError::Unparseable { text: "not json".into() });
    }

    #[tokio::test]
    async fn model_repair_accepts_fenced_json() {
        let client = ScriptedClient::replies(&["```json\n{\"command\": {\"name\": \"do_nothing\"}}\n```"]);
        let parser = CommandParser::new().with_repair_client(client.clone());
        let parsed = parser.parse("I think I should wait").await.unwrap();
        assert_eq!(parsed.command.name, "do_nothing");

        let request = &client.requests()[0];
        assert_eq!(request.temperature, 0.0);
        assert!(request.messages[1].content.contains("I think I should wait"));
    }

    #[tokio::test]
    async fn model_repair_that_fails_keeps_original_text() {
        let client = ScriptedClient::replies(&["still not json"]);
        let parser = CommandParser::new().with_repair_client(client);
        let err = parser.parse("???").await.unwrap_err();
        assert_eq!(err, CommandParseError::Unparseable { text: "???".into() });
    }

    #[tokio::test]
    async fn local_repair_skips_model() {
        let client = ScriptedClient::replies(&[]);
        let parser = CommandParser::new().with_repair_client(client.clone());
        parser.parse(r#"{command: {name: "do_nothing"}}"#).await.unwrap();
        assert_eq!(client.calls(), 0);
    }

    #[test]
    fn bare_keys_quoted_outside_strings_only() {
        assert_eq!(
            quote_bare_keys(r#"{a: "x, b: y", c :1, "d": {e_2: [1, f]}}"#),
            r#"{"a": "x, b: y", "c" :1, "d": {"e_2": [1, f]}}"#
        );
        assert_eq!(quote_bare_keys(r#"{"q": "say \"k: v\""}"#), r#"{"q": "say \"k: v\""}"#);
    }

    #[test]
    fn balance_leaves_braces_in_strings_alone() {
        assert_eq!(balance_braces(r#"{"a": "}}"#), r#"{"a": "}}"#.to_string() + "}");
    }
}
