// ABOUTME: Ordered rule table that classifies user input (plus attachments)
//
// Precedence, first match wins:
//   1. attachments present            -> AttachedAssistantMessage
//   2. `/name` with a known name      -> SlashCommand
//   3. dropped image path             -> ImageAttachment
//   4. `$ ...` (`$` then space or end) -> ShellCommand (marker stripped)
//   5. shell-looking text             -> ShellCommand
//   otherwise                         -> NaturalLanguage
//
// Rule 5 is a heuristic: short plain-word phrases ("hello there") are sent to
// the shell. Use `$` or a longer sentence to disambiguate.

use std::collections::HashSet;
use std::path::PathBuf;

use lazy_static::lazy_static;
use regex::Regex;

pub const DEFAULT_ATTACHMENT_PROMPT: &str = "Analyze this";

pub const SLASH_COMMANDS: &[&str] = &[
    "help", "new", "close", "sessions", "switch", "rename", "retry", "remove", "refresh", "clear",
    "quit",
];

const SHELL_METACHARACTERS: &[&str] = &["|", ">", "<", ";", "&&"];

lazy_static! {
    static ref IMAGE_EXTENSION: Regex =
        Regex::new(r"(?i)\.(png|jpe?g|gif|webp|bmp|tiff?|heic|svg)$").unwrap();
    static ref PLAIN_WORD: Regex = Regex::new(r"^[A-Za-z_-]+$").unwrap();
    static ref KNOWN_EXECUTABLES: HashSet<&'static str> = [
        "ls", "cd", "pwd", "cat", "less", "more", "head", "tail", "grep", "rg", "find", "fd",
        "echo", "printf", "touch", "mkdir", "rmdir", "rm", "mv", "cp", "ln", "chmod", "chown",
        "git", "gh", "cargo", "rustc", "rustup", "npm", "npx", "yarn", "pnpm", "node", "deno",
        "bun", "python", "python3", "pip", "pip3", "uv", "go", "make", "cmake", "docker",
        "kubectl", "ssh", "scp", "rsync", "curl", "wget", "tar", "zip", "unzip", "vim", "nvim",
        "nano", "emacs", "code", "open", "top", "htop", "ps", "kill", "killall", "which", "man",
        "env", "export", "source", "sed", "awk", "sort", "uniq", "wc", "diff", "du", "df",
        "tree", "brew", "apt", "sudo", "exit", "history", "jq", "claude",
    ]
    .into_iter()
    .collect();
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedCommand {
    SlashCommand { name: String, argument: String },
    ShellCommand(String),
    ImageAttachment(PathBuf),
    AttachedAssistantMessage { text: String, attachments: Vec<PathBuf> },
    NaturalLanguage(String),
}

/// What the rules look at
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub text: &'a str,
    pub attachments: &'a [PathBuf],
}

pub trait ClassificationRule: Send + Sync {
    fn name(&self) -> &'static str;
    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand>;
}

/// Clean up a path dropped onto the terminal: whitespace, one pair of matching
/// quotes, backslash-escaped spaces, and a leading `~/`.
pub fn clean_dropped_path(text: &str) -> String {
    let trimmed = text.trim();
    let unquoted = ['"', '\'']
        .iter()
        .find_map(|&q| {
            trimmed
                .strip_prefix(q)
                .and_then(|rest| rest.strip_suffix(q))
        })
        .unwrap_or(trimmed);
    let unescaped = unquoted.replace("\\ ", " ");

    match unescaped.strip_prefix("~/") {
        Some(rest) => match dirs::home_dir() {
            Some(home) => home.join(rest).to_string_lossy().into_owned(),
            None => unescaped,
        },
        None => unescaped,
    }
}

pub struct AttachmentRule;

impl ClassificationRule for AttachmentRule {
    fn name(&self) -> &'static str {
        "attachment"
    }

    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand> {
        if input.attachments.is_empty() {
            return None;
        }
        let text = input.text.trim();
        Some(ClassifiedCommand::AttachedAssistantMessage {
            text: if text.is_empty() {
                DEFAULT_ATTACHMENT_PROMPT.to_string()
            } else {
                text.to_string()
            },
            attachments: input.attachments.to_vec(),
        })
    }
}

pub struct SlashCommandRule;

impl ClassificationRule for SlashCommandRule {
    fn name(&self) -> &'static str {
        "slash-command"
    }

    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand> {
        let rest = input.text.trim().strip_prefix('/')?;
        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };

        if name.contains('/') || !SLASH_COMMANDS.contains(&name) {
            return None;
        }
        Some(ClassifiedCommand::SlashCommand {
            name: name.to_string(),
            argument: argument.to_string(),
        })
    }
}

pub struct ImagePathRule;

impl ClassificationRule for ImagePathRule {
    fn name(&self) -> &'static str {
        "image-path"
    }

    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand> {
        let trimmed = input.text.trim();
        let cleaned = clean_dropped_path(trimmed);
        let rooted = cleaned.starts_with('/');
        let home_relative = trimmed.trim_matches(|c| c == '"' || c == '\'').starts_with("~/");

        if (rooted || home_relative) && IMAGE_EXTENSION.is_match(&cleaned) {
            Some(ClassifiedCommand::ImageAttachment(PathBuf::from(cleaned)))
        } else {
            None
        }
    }
}

pub struct ForceShellRule;

impl ClassificationRule for ForceShellRule {
    fn name(&self) -> &'static str {
        "force-shell"
    }

    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand> {
        let command = input.text.trim().strip_prefix('$')?;
        // `$EDITOR foo` is a variable expansion, not the marker
        if !command.is_empty() && !command.starts_with(char::is_whitespace) {
            return None;
        }
        Some(ClassifiedCommand::ShellCommand(command.trim().to_string()))
    }
}

pub struct ShellHeuristicRule {
    extra_executables: HashSet<String>,
}

impl ShellHeuristicRule {
    pub fn new(extra_executables: impl IntoIterator<Item = String>) -> Self {
        Self {
            extra_executables: extra_executables.into_iter().collect(),
        }
    }

    fn is_known_executable(&self, token: &str) -> bool {
        KNOWN_EXECUTABLES.contains(token) || self.extra_executables.contains(token)
    }
}

impl ClassificationRule for ShellHeuristicRule {
    fn name(&self) -> &'static str {
        "shell-heuristic"
    }

    fn classify(&self, input: &ClassifierInput<'_>) -> Option<ClassifiedCommand> {
        let text = input.text.trim();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        let first = tokens.first()?;

        let looks_like_shell = self.is_known_executable(first)
            || first.starts_with('$')
            || SHELL_METACHARACTERS.iter().any(|m| text.contains(m))
            || (tokens.len() <= 3 && PLAIN_WORD.is_match(first));

        looks_like_shell.then(|| ClassifiedCommand::ShellCommand(text.to_string()))
    }
}

pub struct CommandClassifier {
    rules: Vec<Box<dyn ClassificationRule>>,
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl CommandClassifier {
    pub fn new(extra_executables: Vec<String>) -> Self {
        Self::with_rules(vec![
            Box::new(AttachmentRule),
            Box::new(SlashCommandRule),
            Box::new(ImagePathRule),
            Box::new(ForceShellRule),
            Box::new(ShellHeuristicRule::new(extra_executables)),
        ])
    }

    pub fn with_rules(rules: Vec<Box<dyn ClassificationRule>>) -> Self {
        Self { rules }
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    pub fn classify(&self, text: &str, attachments: &[PathBuf]) -> ClassifiedCommand {
        let input = ClassifierInput { text, attachments };
        self.rules
            .iter()
            .find_map(|rule| rule.classify(&input))
            .unwrap_or_else(|| ClassifiedCommand::NaturalLanguage(text.trim().to_string()))
    }
}
