use std::io::Write;
use std::path::Path;
use std::sync::mpsc::Receiver;

use serde_json::json;
use thiserror::Error;

use crate::config::{ConfigError, ConfigUpdate, Preset};
use crate::engine::StatusSnapshot;
use crate::keylog::LogEntry;

/// A control request from the outside world.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Start { text: String },
    Stop,
    TogglePause,
    Configure(ConfigUpdate),
    Status,
    Log,
}

/// Why a request was refused. Refusals never change engine state.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Rejected {
    #[error("a session is already active")]
    Busy,
    #[error("output sink is not connected")]
    SinkDisconnected,
    #[error("no text provided")]
    EmptyText,
    #[error("nothing left to type after preprocessing")]
    NothingToType,
    #[error("not typing")]
    NotTyping,
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("config request names no field")]
    EmptyConfig,
    #[error("bad command: {0}")]
    BadCommand(String),
}

impl Rejected {
    pub fn status_code(&self) -> u16 {
        match self {
            Rejected::Busy | Rejected::NotTyping => 409,
            Rejected::SinkDisconnected => 503,
            Rejected::EmptyText
            | Rejected::NothingToType
            | Rejected::InvalidConfig(_)
            | Rejected::EmptyConfig
            | Rejected::BadCommand(_) => 400,
        }
    }
}

impl From<ConfigError> for Rejected {
    fn from(err: ConfigError) -> Self {
        Rejected::InvalidConfig(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Started { chars: usize },
    StopRequested,
    Paused,
    Resumed,
    ConfigApplied { changed: bool },
    Status(Box<StatusSnapshot>),
    Log(Vec<LogEntry>),
    Rejected(Rejected),
}

impl Response {
    pub fn status_code(&self) -> u16 {
        match self {
            Response::Rejected(reason) => reason.status_code(),
            _ => 200,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code() == 200
    }

    /// One JSON object per response, shaped for line-oriented consumers.
    pub fn to_json(&self) -> serde_json::Value {
        let status = self.status_code();
        match self {
            Response::Started { chars } => json!({ "status": status, "started": chars }),
            Response::StopRequested => json!({ "status": status, "stopping": true }),
            Response::Paused => json!({ "status": status, "paused": true }),
            Response::Resumed => json!({ "status": status, "paused": false }),
            Response::ConfigApplied { changed } => {
                json!({ "status": status, "changed": changed })
            }
            Response::Status(snapshot) => json!({ "status": status, "snapshot": snapshot }),
            Response::Log(entries) => {
                let lines: Vec<String> = entries.iter().map(ToString::to_string).collect();
                json!({ "status": status, "log": lines })
            }
            Response::Rejected(reason) => json!({ "status": status, "error": reason.to_string() }),
        }
    }
}

/// The external request dispatcher the engine services between waits.
pub trait Dispatcher {
    /// Next queued request, if any. Must not block.
    fn poll(&mut self) -> Option<Request>;
    fn respond(&mut self, response: Response);
}

/// Dispatcher fed by a channel; responses are written as JSON lines.
pub struct ChannelDispatcher<W: Write> {
    requests: Receiver<Request>,
    out: W,
}

impl<W: Write> ChannelDispatcher<W> {
    pub fn new(requests: Receiver<Request>, out: W) -> Self {
        Self { requests, out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> Dispatcher for ChannelDispatcher<W> {
    fn poll(&mut self) -> Option<Request> {
        self.requests.try_recv().ok()
    }

    fn respond(&mut self, response: Response) {
        if let Err(err) = writeln!(self.out, "{}", response.to_json()) {
            tracing::warn!(error = %err, "failed to write response");
        }
    }
}

/// A parsed control line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Request(Request),
    Quit,
}

/// Parse one line of the text control protocol:
/// `start PATH`, `type TEXT`, `stop`, `pause`, `status`, `log`,
/// `config k=v ...`, `preset NAME`, `quit`. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<Command>, Rejected> {
    let line = line.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim_start();
    if trimmed.trim().is_empty() {
        return Ok(None);
    }

    let (word, rest) = match trimmed.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest),
        None => (trimmed, ""),
    };

    let request = match word.to_ascii_lowercase().as_str() {
        "start" => {
            let path = rest.trim();
            if path.is_empty() {
                return Err(Rejected::BadCommand("start needs a file path".to_string()));
            }
            let text = std::fs::read_to_string(Path::new(path))
                .map_err(|err| Rejected::BadCommand(format!("failed to read {path}: {err}")))?;
            Request::Start { text }
        }
        "type" => Request::Start {
            text: rest.replace("\\n", "\n"),
        },
        "stop" => Request::Stop,
        "pause" | "resume" => Request::TogglePause,
        "status" => Request::Status,
        "log" => Request::Log,
        "config" => Request::Configure(ConfigUpdate::parse(rest)?),
        "preset" => Request::Configure(rest.parse::<Preset>()?.update()),
        "quit" | "exit" => return Ok(Some(Command::Quit)),
        other => return Err(Rejected::BadCommand(format!("unknown command `{other}`"))),
    };

    Ok(Some(Command::Request(request)))
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    #[test]
    fn parses_control_words() {
        assert_eq!(
            parse_command("stop\n"),
            Ok(Some(Command::Request(Request::Stop)))
        );
        assert_eq!(
            parse_command("  pause"),
            Ok(Some(Command::Request(Request::TogglePause)))
        );
        assert_eq!(parse_command("quit"), Ok(Some(Command::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn type_keeps_inner_spacing_and_expands_newline_escapes() {
        assert_eq!(
            parse_command("type hi  there\\nok"),
            Ok(Some(Command::Request(Request::Start {
                text: "hi  there\nok".to_string()
            })))
        );
    }

    #[test]
    fn config_and_preset_become_updates() {
        let Ok(Some(Command::Request(Request::Configure(update)))) =
            parse_command("config wpm=80 strict=1")
        else {
            panic!("expected a config request");
        };
        assert_eq!(update.wpm, Some(80));
        assert_eq!(update.strict_pace, Some(true));

        assert_eq!(
            parse_command("preset bot-flat"),
            Ok(Some(Command::Request(Request::Configure(
                Preset::BotFlat.update()
            ))))
        );
    }

    #[test]
    fn bad_lines_are_rejected_with_400() {
        let err = parse_command("config wpm").unwrap_err();
        assert_eq!(err.status_code(), 400);
        assert!(matches!(err, Rejected::InvalidConfig(_)));

        let err = parse_command("dance").unwrap_err();
        assert!(matches!(err, Rejected::BadCommand(_)));

        assert!(parse_command("start").is_err());
    }

    #[test]
    fn status_codes_follow_rejection_cause() {
        assert_eq!(Response::Rejected(Rejected::Busy).status_code(), 409);
        assert_eq!(Response::Rejected(Rejected::SinkDisconnected).status_code(), 503);
        assert_eq!(Response::Rejected(Rejected::EmptyText).status_code(), 400);
        assert_eq!(Response::Rejected(Rejected::NotTyping).status_code(), 409);
        assert_eq!(Response::Started { chars: 3 }.status_code(), 200);
    }

    #[test]
    fn channel_dispatcher_writes_json_lines() {
        let (tx, rx) = mpsc::channel();
        let mut dispatcher = ChannelDispatcher::new(rx, Vec::new());

        assert_eq!(dispatcher.poll(), None);
        tx.send(Request::Status).unwrap();
        assert_eq!(dispatcher.poll(), Some(Request::Status));

        dispatcher.respond(Response::Rejected(Rejected::Busy));
        dispatcher.respond(Response::ConfigApplied { changed: true });

        let out = String::from_utf8(dispatcher.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["status"], 409);
        assert_eq!(lines[0]["error"], "a session is already active");
        assert_eq!(lines[1]["changed"], true);
    }
}
