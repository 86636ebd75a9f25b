//! Slash-command routing: `/save`, `/view …`, `/filter …`, `/focus …`,
//! `/help`, `/stats`, `/commit`, `exit` go to the
//! appropriate subsystem; anything else is a user message bound for the
//! LLM Engine.

/// One recognized slash-command line. `View`/`Filter`/`Select`/`Focus`/
/// `ClearFilter`/`ClearSelection` are forwarded verbatim to the
/// [`canvas::CanvasController`], which owns their exact argument grammar;
/// the rest are handled by the Session Orchestrator itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlashCommand {
    Canvas(String),
    Save,
    Help,
    Stats,
    Commit,
    Exit,
}

/// Returns `None` for a line that is not a recognized command — the caller
/// treats it as a user turn for the LLM Engine instead.
pub fn parse(line: &str) -> Option<SlashCommand> {
    let trimmed = line.trim();
    if trimmed == "exit" {
        return Some(SlashCommand::Exit);
    }
    let rest = trimmed.strip_prefix('/')?;
    let command = rest.split_whitespace().next().unwrap_or("");
    match command {
        "save" => Some(SlashCommand::Save),
        "help" => Some(SlashCommand::Help),
        "stats" => Some(SlashCommand::Stats),
        "commit" => Some(SlashCommand::Commit),
        "view" | "filter" | "select" | "focus" | "clear-filter" | "clear-selection" => {
            Some(SlashCommand::Canvas(trimmed.to_string()))
        }
        _ => None,
    }
}

pub const HELP_TEXT: &str = "\
Commands:
  /view <hierarchy|allocation|traceability|dependency|fchain|all>
  /filter [type=...] [phase=...] [search=...] [deleted]
  /select <semanticId...>
  /focus <semanticId>
  /clear-filter
  /clear-selection
  /save       persist all dirty nodes/edges and clear the dirty set
  /stats      node/edge counts, version, dirty count
  /commit     alias for /save
  /help       this text
  exit        flush pending persistence and shut down
Anything else is sent to the LLM as a graph-editing request.";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognizes_every_closed_command() {
        assert_eq!(parse("/save"), Some(SlashCommand::Save));
        assert_eq!(parse("/help"), Some(SlashCommand::Help));
        assert_eq!(parse("/stats"), Some(SlashCommand::Stats));
        assert_eq!(parse("/commit"), Some(SlashCommand::Commit));
        assert_eq!(parse("exit"), Some(SlashCommand::Exit));
    }

    #[test]
    fn canvas_commands_forward_the_whole_line() {
        assert_eq!(parse("/view hierarchy"), Some(SlashCommand::Canvas("/view hierarchy".to_string())));
        assert_eq!(parse("/filter type=FUNC,SYS"), Some(SlashCommand::Canvas("/filter type=FUNC,SYS".to_string())));
    }

    #[test]
    fn unrecognized_text_is_not_a_command() {
        assert_eq!(parse("add a checkout flow"), None);
        assert_eq!(parse("/frobnicate"), None);
    }
}
