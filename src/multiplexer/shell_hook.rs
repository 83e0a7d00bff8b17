// ABOUTME: Start-up hooks that make interactive shells report their working directory
//
// Each prompt emits OSC 7 (`ESC ] 7 ; file://<host><cwd> BEL`), which the PTY reader
// turns into DirectoryChanged events:
// - bash: PROMPT_COMMAND, chained in front of any existing value
// - zsh:  a ZDOTDIR of wrapper start-up files that source the user's own, then add a precmd hook
// Other shells start unchanged.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;
use tracing::debug;

const BASH_DIRECTORY_REPORT: &str =
    r#"printf '\033]7;file://%s%s\007' "${HOSTNAME:-localhost}" "$PWD""#;

const ZSH_DIRECTORY_HOOK: &str = r#"
termsync_report_directory() { printf '\033]7;file://%s%s\007' "${HOST:-localhost}" "$PWD"; }
typeset -ga precmd_functions
precmd_functions+=(termsync_report_directory)
"#;

/// Where the user's own zsh start-up files live when ZDOTDIR is redirected
const USER_ZDOTDIR_VAR: &str = "TERMSYNC_USER_ZDOTDIR";

const ZSH_STARTUP_FILES: [&str; 4] = [".zshenv", ".zprofile", ".zshrc", ".zlogin"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellKind {
    Bash,
    Zsh,
    Other,
}

impl ShellKind {
    pub fn detect(shell: &Path) -> Self {
        match shell.file_name().and_then(|name| name.to_str()) {
            Some(name) if name.starts_with("bash") => ShellKind::Bash,
            Some(name) if name.starts_with("zsh") => ShellKind::Zsh,
            _ => ShellKind::Other,
        }
    }
}

/// Environment additions that install the directory report hook for `shell`.
///
/// `env` is the session's configured environment; values there win over the
/// process environment when an existing setting has to be chained. Generated
/// start-up files go under `integration_dir`.
pub fn directory_report_env(
    shell: &Path,
    integration_dir: &Path,
    env: &HashMap<String, String>,
) -> io::Result<HashMap<String, String>> {
    let mut hook = HashMap::new();

    match ShellKind::detect(shell) {
        ShellKind::Bash => {
            let prompt_command = match lookup(env, "PROMPT_COMMAND") {
                Some(existing) => format!("{BASH_DIRECTORY_REPORT}; {existing}"),
                None => BASH_DIRECTORY_REPORT.to_string(),
            };
            hook.insert("PROMPT_COMMAND".to_string(), prompt_command);
        }
        ShellKind::Zsh => {
            let zdotdir = integration_dir.join("zsh");
            write_zsh_startup_files(&zdotdir)?;
            if let Some(user_zdotdir) = lookup(env, "ZDOTDIR") {
                hook.insert(USER_ZDOTDIR_VAR.to_string(), user_zdotdir);
            }
            hook.insert("ZDOTDIR".to_string(), zdotdir.to_string_lossy().into_owned());
        }
        ShellKind::Other => {
            debug!(shell = %shell.display(), "No directory report hook for this shell");
        }
    }

    Ok(hook)
}

fn lookup(env: &HashMap<String, String>, key: &str) -> Option<String> {
    env.get(key)
        .cloned()
        .or_else(|| std::env::var(key).ok())
        .filter(|value| !value.trim().is_empty())
}

/// Wrapper that sources the user's file of the same name with their ZDOTDIR in place
fn zsh_wrapper(file: &str) -> String {
    let mut script = format!(
        r#"termsync_zdotdir="$ZDOTDIR"
ZDOTDIR="${{{USER_ZDOTDIR_VAR}:-$HOME}}"
[[ -r "$ZDOTDIR/{file}" ]] && source "$ZDOTDIR/{file}"
ZDOTDIR="$termsync_zdotdir"
unset termsync_zdotdir
"#
    );
    if file == ".zshrc" {
        script.push_str(ZSH_DIRECTORY_HOOK);
    }
    script
}

/// Write the wrappers atomically; concurrent instances may be starting shells from the same directory
fn write_zsh_startup_files(dir: &Path) -> io::Result<()> {
    fs::create_dir_all(dir)?;
    for file in ZSH_STARTUP_FILES {
        let mut temp = tempfile::Builder::new().prefix(".tmp-").tempfile_in(dir)?;
        temp.write_all(zsh_wrapper(file).as_bytes())?;
        temp.persist(dir.join(file)).map_err(|e| e.error)?;
    }
    Ok(())
}
