//! Interactive terminal loop for `learnstack chat`.

use std::io::{BufRead, Write};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::debug;

use crate::core::types::Role;
use crate::io::service::ReasoningService;
use crate::render::{render_gate, render_state, render_turn};
use crate::session::{Session, SessionError};

const HELP: &str = "commands: /state  /select <id>  /verify <synthesis>  /dismiss  /export  /quit";

/// One line of user input, classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatCommand<'a> {
    State,
    Select(&'a str),
    Verify(&'a str),
    Dismiss,
    Export,
    Quit,
    Help,
    Message(&'a str),
    Unknown(&'a str),
    Empty,
}

pub fn parse_command(line: &str) -> ChatCommand<'_> {
    let line = line.trim();
    if line.is_empty() {
        return ChatCommand::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return ChatCommand::Message(line);
    };
    let (name, arg) = rest
        .split_once(char::is_whitespace)
        .map(|(name, arg)| (name, arg.trim()))
        .unwrap_or((rest, ""));
    match name {
        "state" => ChatCommand::State,
        "select" if !arg.is_empty() => ChatCommand::Select(arg),
        "verify" if !arg.is_empty() => ChatCommand::Verify(arg),
        "dismiss" => ChatCommand::Dismiss,
        "export" => ChatCommand::Export,
        "quit" | "exit" => ChatCommand::Quit,
        "help" => ChatCommand::Help,
        _ => ChatCommand::Unknown(line),
    }
}

#[derive(Debug, Clone)]
pub struct ChatOptions {
    /// Send the kickoff message before reading input.
    pub kickoff: bool,
    /// Pause between an approved verdict and the pop.
    pub gate_close_delay: Duration,
}

/// Read commands from `input` until EOF or `/quit`, printing new transcript
/// entries to `out` after every step.
pub fn run_chat<S, R, W>(
    session: &mut Session,
    service: &S,
    input: R,
    out: &mut W,
    options: &ChatOptions,
) -> Result<()>
where
    S: ReasoningService + ?Sized,
    R: BufRead,
    W: Write,
{
    let mut printer = TranscriptPrinter::default();
    writeln!(out, "Learning goal: {} ({} protocol)", session.goal(), session.protocol())?;
    writeln!(out, "{HELP}")?;

    if options.kickoff {
        let kickoff = session.kickoff_message();
        report(out, session.send(service, &kickoff, None).map(|_| ()))?;
        printer.flush(session, out)?;
    }

    for line in input.lines() {
        let line = line.context("read input line")?;
        let command = parse_command(&line);
        debug!(?command, "chat command");
        match command {
            ChatCommand::Empty => continue,
            ChatCommand::Quit => break,
            ChatCommand::Help => writeln!(out, "{HELP}")?,
            ChatCommand::Unknown(raw) => writeln!(out, "unknown command: {raw}\n{HELP}")?,
            ChatCommand::State => writeln!(out, "{}", render_state(session.state()))?,
            ChatCommand::Export => writeln!(out, "{}", session.state().export())?,
            ChatCommand::Message(text) => {
                report(out, session.send(service, text, None).map(|_| ()))?;
            }
            ChatCommand::Select(id) => match session.select_node(id) {
                Ok(Some(gate)) => writeln!(out, "{}", render_gate(gate))?,
                Ok(None) => writeln!(
                    out,
                    "\"{id}\" cannot be closed now: pick the node one level above the active topic"
                )?,
                Err(err) => report(out, Err(err))?,
            },
            ChatCommand::Verify(synthesis) => {
                verify(session, service, synthesis, out, options.gate_close_delay)?;
            }
            ChatCommand::Dismiss => {
                report(out, session.dismiss_gate())?;
            }
        }
        printer.flush(session, out)?;
    }
    Ok(())
}

fn verify<S, W>(
    session: &mut Session,
    service: &S,
    synthesis: &str,
    out: &mut W,
    delay: Duration,
) -> Result<()>
where
    S: ReasoningService + ?Sized,
    W: Write,
{
    let verdict = match session.verify(service, synthesis) {
        Ok(verdict) => verdict,
        Err(err) => return report(out, Err(err)),
    };
    if let Some(gate) = session.gate() {
        writeln!(out, "{}", render_gate(gate))?;
    }
    if verdict.approved {
        out.flush()?;
        thread::sleep(delay);
        report(out, session.finish_gate().map(|_| ()))?;
    }
    Ok(())
}

fn report<W: Write>(out: &mut W, result: Result<(), SessionError>) -> Result<()> {
    if let Err(err) = result {
        writeln!(out, "! {err}")?;
    }
    Ok(())
}

/// Tracks how much of the transcript has been printed.
#[derive(Debug, Default)]
struct TranscriptPrinter {
    printed: usize,
}

impl TranscriptPrinter {
    fn flush<W: Write>(&mut self, session: &Session, out: &mut W) -> Result<()> {
        for turn in &session.transcript().turns()[self.printed..] {
            if turn.role == Role::User {
                continue;
            }
            writeln!(out, "{}", render_turn(turn))?;
        }
        self.printed = session.transcript().len();
        out.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Protocol;
    use crate::test_support::ScriptedService;

    fn options(kickoff: bool) -> ChatOptions {
        ChatOptions {
            kickoff,
            gate_close_delay: Duration::ZERO,
        }
    }

    #[test]
    fn parses_commands_and_messages() {
        assert_eq!(parse_command("  "), ChatCommand::Empty);
        assert_eq!(parse_command("/state"), ChatCommand::State);
        assert_eq!(parse_command("/select  n1 "), ChatCommand::Select("n1"));
        assert_eq!(
            parse_command("/verify it stops the loop"),
            ChatCommand::Verify("it stops the loop")
        );
        assert_eq!(parse_command("/verify"), ChatCommand::Unknown("/verify"));
        assert_eq!(parse_command("/exit"), ChatCommand::Quit);
        assert_eq!(parse_command("what next?"), ChatCommand::Message("what next?"));
    }

    #[test]
    fn kickoff_is_sent_and_reply_printed() {
        let mut session = Session::new("Recursion", "key", Protocol::Markdown);
        let service = ScriptedService::replying(&["Welcome!"]);
        let mut out = Vec::new();

        run_chat(&mut session, &service, "".as_bytes(), &mut out, &options(true)).expect("chat");

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("[tutor] Welcome!"));
        assert_eq!(service.requests().len(), 1);
        assert!(service.requests()[0].prompt.contains("I want to learn: Recursion"));
    }

    #[test]
    fn quit_stops_reading() {
        let mut session = Session::new("Recursion", "key", Protocol::Markdown);
        let service = ScriptedService::replying(&["one"]);
        let mut out = Vec::new();
        let input = "hello\n/quit\nnever sent\n";

        run_chat(&mut session, &service, input.as_bytes(), &mut out, &options(false))
            .expect("chat");

        assert_eq!(service.call_count(), 1);
        assert_eq!(session.transcript().len(), 2);
    }

    #[test]
    fn gate_flow_pops_the_stack() {
        let mut session = Session::new("Recursion", "key", Protocol::Json);
        let service = ScriptedService::replying(&[
            "Deeper.\n```json\n{\"action\":\"PUSH\",\"updated_stack\":[{\"id\":\"root\",\"topic\":\"Recursion\",\"level\":0,\"status\":\"Waiting\"},{\"id\":\"n1\",\"topic\":\"Base Case\",\"level\":1,\"status\":\"Active\"}]}\n```",
            r#"{"approved":true,"feedback":"nice"}"#,
        ]);
        let mut out = Vec::new();
        let input = "go\n/select root\n/verify it ends the recursion\n/state\n";

        run_chat(&mut session, &service, input.as_bytes(), &mut out, &options(false))
            .expect("chat");

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("Verdict: approved. nice"));
        assert!(printed.contains("Back to \"Recursion\""));
        assert!(printed.contains("> [root] Recursion (active)"));
    }

    #[test]
    fn errors_are_printed_not_returned() {
        let mut session = Session::new("Recursion", "", Protocol::Markdown);
        let service = ScriptedService::new(vec![]);
        let mut out = Vec::new();

        run_chat(&mut session, &service, "hi\n/dismiss\n".as_bytes(), &mut out, &options(false))
            .expect("chat");

        let printed = String::from_utf8(out).expect("utf8");
        assert!(printed.contains("! missing API key"));
        assert!(printed.contains("! no knowledge gate is open"));
    }
}
