//! The remote-helper protocol engine.
//!
//! Commands arrive one per line on the input. `fetch` and `push` open a
//! batch that runs until a blank line; every response ends with a blank
//! line and is flushed before the next command is read.

use crate::push::PushCommand;
use crate::session::Session;
use crate::store::ContentStore;
use crate::{Error, Result};
use gitipfs_storage::ObjectId;
use std::io::{BufRead, ErrorKind, Write};

/// Capabilities advertised to git.
pub const CAPABILITIES: [&str; 2] = ["fetch", "push"];

/// One command line, parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `capabilities`
    Capabilities,
    /// `list` or `list for-push`
    List {
        /// Whether git is about to push.
        for_push: bool,
    },
    /// `fetch <hash> <name>`
    FetchBatch(Vec<(ObjectId, String)>),
    /// `push <refspec>`
    PushBatch(Vec<PushCommand>),
    /// A blank line outside a batch.
    Flush,
    /// Anything else.
    Unrecognized(String),
}

impl Command {
    /// Parses a top-level line. Malformed `fetch` or `push` lines are errors.
    pub fn parse(line: &str) -> Result<Self> {
        if line.is_empty() {
            return Ok(Self::Flush);
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        match verb {
            "capabilities" if rest.is_empty() => Ok(Self::Capabilities),
            "list" => Ok(Self::List {
                for_push: rest.split_whitespace().any(|w| w == "for-push"),
            }),
            "fetch" => Ok(Self::FetchBatch(vec![parse_fetch(line)?])),
            "push" => Ok(Self::PushBatch(vec![parse_push(line)?])),
            _ => Ok(Self::Unrecognized(line.to_string())),
        }
    }
}

/// Parses `fetch <hash> <name>`.
pub fn parse_fetch(line: &str) -> Result<(ObjectId, String)> {
    let malformed = || Error::Protocol(format!("malformed fetch line: {line:?}"));
    let rest = line.strip_prefix("fetch ").ok_or_else(malformed)?;
    let (hash, name) = rest.split_once(' ').ok_or_else(malformed)?;
    let id = ObjectId::from_hex(hash).map_err(|_| malformed())?;
    if name.is_empty() {
        return Err(malformed());
    }
    Ok((id, name.to_string()))
}

/// Parses `push <refspec>`.
pub fn parse_push(line: &str) -> Result<PushCommand> {
    line.strip_prefix("push ")
        .ok_or_else(|| Error::Protocol(format!("malformed push line: {line:?}")))?
        .parse()
}

#[derive(Debug)]
enum State {
    Idle,
    InFetchBatch(Vec<(ObjectId, String)>),
    InPushBatch(Vec<PushCommand>),
}

/// Drives a session from git's command stream.
pub struct Engine<'s, S, R, W> {
    session: &'s mut Session<S>,
    input: R,
    output: W,
    state: State,
}

impl<'s, S, R, W> Engine<'s, S, R, W>
where
    S: ContentStore,
    R: BufRead,
    W: Write,
{
    /// Creates an engine reading commands from `input`.
    pub fn new(session: &'s mut Session<S>, input: R, output: W) -> Self {
        Self {
            session,
            input,
            output,
            state: State::Idle,
        }
    }

    /// Serves commands until the input ends.
    ///
    /// A closed output pipe ends the session quietly.
    pub fn run(mut self) -> Result<()> {
        match self.serve() {
            Err(Error::Io(e)) if e.kind() == ErrorKind::BrokenPipe => {
                tracing::debug!("output closed, ending session");
                Ok(())
            }
            other => other,
        }
    }

    fn serve(&mut self) -> Result<()> {
        let mut line = String::new();
        loop {
            if matches!(self.state, State::Idle) && self.session.is_cancelled() {
                return Err(Error::Interrupted);
            }
            line.clear();
            if self.input.read_line(&mut line)? == 0 {
                break;
            }
            let trimmed = line.trim_end_matches(['\n', '\r']);
            tracing::trace!(line = %trimmed, "command");
            self.step(trimmed)?;
        }

        match &self.state {
            State::Idle => Ok(()),
            _ => Err(Error::Protocol("input ended inside a batch".to_string())),
        }
    }

    fn step(&mut self, line: &str) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => self.dispatch(Command::parse(line)?),
            State::InFetchBatch(mut requests) => {
                if line.is_empty() {
                    return self.finish_fetch(&requests);
                }
                requests.push(parse_fetch(line)?);
                self.state = State::InFetchBatch(requests);
                Ok(())
            }
            State::InPushBatch(mut commands) => {
                if line.is_empty() {
                    return self.finish_push(&commands);
                }
                commands.push(parse_push(line)?);
                self.state = State::InPushBatch(commands);
                Ok(())
            }
        }
    }

    fn dispatch(&mut self, command: Command) -> Result<()> {
        match command {
            Command::Capabilities => self.respond(CAPABILITIES.iter().map(|c| c.to_string())),
            Command::List { for_push } => {
                let listing = self.session.list(for_push)?;
                tracing::debug!(refs = listing.refs.len(), for_push, "listing refs");
                self.respond(listing.lines())
            }
            Command::FetchBatch(requests) => {
                self.state = State::InFetchBatch(requests);
                Ok(())
            }
            Command::PushBatch(commands) => {
                self.state = State::InPushBatch(commands);
                Ok(())
            }
            Command::Flush => Ok(()),
            Command::Unrecognized(line) => {
                Err(Error::Protocol(format!("unrecognized command: {line:?}")))
            }
        }
    }

    /// Answers a whole fetch batch with a single blank line. Git stops
    /// reading the reply at the first blank, so one per object would leak
    /// into the next command's response.
    fn finish_fetch(&mut self, requests: &[(ObjectId, String)]) -> Result<()> {
        self.session.fetch(requests)?;
        self.respond(std::iter::empty())
    }

    fn finish_push(&mut self, commands: &[PushCommand]) -> Result<()> {
        let report = self.session.push(commands);
        if report.halted {
            tracing::warn!(
                attempted = report.outcomes.len(),
                requested = commands.len(),
                "push batch stopped early"
            );
        }
        self.respond(report.outcomes.iter().map(|o| o.line()))
    }

    /// Writes `lines` and the terminating blank line, then flushes.
    fn respond(&mut self, lines: impl IntoIterator<Item = String>) -> Result<()> {
        for line in lines {
            writeln!(self.output, "{line}")?;
        }
        writeln!(self.output)?;
        self.output.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "a94a8fe5ccb19ba61c4c0873d391e987982fbbd3";

    #[test]
    fn test_parse_commands() {
        assert_eq!(Command::parse("capabilities").unwrap(), Command::Capabilities);
        assert_eq!(
            Command::parse("list").unwrap(),
            Command::List { for_push: false }
        );
        assert_eq!(
            Command::parse("list for-push").unwrap(),
            Command::List { for_push: true }
        );
        assert_eq!(Command::parse("").unwrap(), Command::Flush);
        assert_eq!(
            Command::parse("option verbosity 1").unwrap(),
            Command::Unrecognized("option verbosity 1".to_string())
        );
    }

    #[test]
    fn test_parse_fetch_line() {
        let command = Command::parse(&format!("fetch {A} refs/heads/main")).unwrap();
        assert_eq!(
            command,
            Command::FetchBatch(vec![(
                ObjectId::from_hex(A).unwrap(),
                "refs/heads/main".to_string()
            )])
        );
        assert!(parse_fetch("fetch nothex refs/heads/main").is_err());
        assert!(parse_fetch(&format!("fetch {A}")).is_err());
        assert!(parse_fetch(&format!("push {A} x")).is_err());
    }

    #[test]
    fn test_parse_push_line() {
        assert_eq!(
            Command::parse("push +refs/heads/a:refs/heads/b").unwrap(),
            Command::PushBatch(vec![PushCommand::Update {
                src: "refs/heads/a".to_string(),
                dst: "refs/heads/b".to_string(),
                force: true,
            }])
        );
        assert!(Command::parse("push refs/heads/a").is_err());
    }
}
