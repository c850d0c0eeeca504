//! Console sink and interactive prompt capabilities
//!
//! The extraction engine never prints. It emits [`Event`]s to a [`Notifier`]
//! and asks yes/no questions through a [`Prompt`]. The binary wires these to
//! the terminal; tests wire them to recorders and scripted answers.

use crate::types::{Event, RenameCandidate};
use console::{Term, style};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;

/// Line-oriented progress sink
pub trait Notifier: Send + Sync {
    /// Receive one progress event
    fn notify(&self, event: &Event);
}

/// Yes/no question capability, receives the question text without the `[y/n]` hint
pub type Prompt = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Prompt that always answers yes without writing anything (automatic mode)
pub fn auto_prompt() -> Prompt {
    Arc::new(|_| true)
}

/// Prompt that writes the question to stdout and reads the answer from stdin
///
/// Only `y` / `Y` count as yes; anything else, including a read error, is no.
pub fn stdin_prompt() -> Prompt {
    Arc::new(|question| {
        let mut stdout = io::stdout();
        let _ = write!(stdout, "{question} [y/n]");
        let _ = stdout.flush();

        let mut answer = String::new();
        match io::stdin().lock().read_line(&mut answer) {
            Ok(_) => is_yes(&answer),
            Err(_) => false,
        }
    })
}

fn is_yes(answer: &str) -> bool {
    answer.trim().eq_ignore_ascii_case("y")
}

/// Notifier that discards every event
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &Event) {}
}

/// Colored terminal renderer
///
/// Progress lines are indented by recursion depth; the password attempt line
/// is rewritten in place so a long password list does not flood the terminal.
pub struct TerminalNotifier {
    term: Term,
}

impl TerminalNotifier {
    /// Render to stdout
    pub fn stdout() -> Self {
        Self {
            term: Term::stdout(),
        }
    }

    fn write_line(&self, text: &str) {
        let _ = self.term.write_line(text);
    }

    fn overwrite(&self, text: &str) {
        let _ = self.term.clear_line();
        let _ = self.term.write_str(text);
    }
}

fn indent(level: u32) -> String {
    "  ".repeat(level as usize)
}

fn branch(level: u32) -> String {
    format!("{}└──", indent(level))
}

fn file_name(path: &Path) -> String {
    style(path.display()).blue().to_string()
}

/// Render an event to the text shown on the terminal
///
/// Returns the text and whether it replaces the current line instead of
/// starting a new one.
pub fn render(event: &Event) -> (String, bool) {
    match event {
        Event::Extracting {
            archive,
            kind,
            level,
        } => (
            format!(
                "{}▶ Extracting {} , type: {}",
                indent(*level),
                file_name(archive),
                kind
            ),
            false,
        ),
        Event::Skipping {
            archive,
            kind,
            level,
        } => (
            format!(
                "{}▷ Skipping {} , type: {}",
                indent(*level),
                file_name(archive),
                kind
            ),
            false,
        ),
        Event::TryingPassword { level, password } => {
            (format!("{} try passwd {}", branch(*level), password), true)
        }
        Event::Extracted {
            archive,
            output,
            password,
            elapsed,
            level,
        } => (
            format!(
                "{b} passwd {password} matches\n{b} {} {} extracted to {} , time cost: {}s",
                style("Done").green(),
                file_name(archive),
                file_name(output),
                elapsed.as_secs_f64().round(),
                b = branch(*level),
            ),
            true,
        ),
        Event::Failed {
            archive,
            level,
            reason,
        } => (
            format!(
                "{} {} {} {}",
                branch(*level),
                style("Failed").red(),
                file_name(archive),
                reason
            ),
            true,
        ),
        Event::RenameCandidates { candidates } => (render_candidates(candidates), false),
        Event::Renamed { from, to } => (
            format!("rename done: {} -> {}", file_name(from), file_name(to)),
            false,
        ),
        Event::RenameSkipped { path } => (format!("skip rename {}", file_name(path)), false),
        Event::RenameFailed { error } => (format!("{} {}", style("rename failed").red(), error), false),
        Event::Retrying { dirs } => (format!("\nretry extracting in {} directories", dirs.len()), false),
    }
}

fn render_candidates(candidates: &[RenameCandidate]) -> String {
    let mut out = style("\nSome files probably need to be renamed in these directories:")
        .red()
        .to_string();
    for candidate in candidates {
        out.push('\n');
        out.push_str(&file_name(&candidate.dir));
        for name in &candidate.files {
            out.push_str(&format!("\n  {}", style(name).blue()));
        }
    }
    out
}

impl Notifier for TerminalNotifier {
    fn notify(&self, event: &Event) {
        let (text, same_line) = render(event);
        if same_line {
            self.overwrite(&text);
            // Terminal outcomes end the rewritten line
            if !matches!(event, Event::TryingPassword { .. }) {
                self.write_line("");
            }
        } else {
            self.write_line(&text);
        }
    }
}
