//! Line oriented console driving the controller state
//!
//! Every line is split into chained segments (see [`parser`]). Segments run
//! strictly left to right; button tokens are collected and pushed together
//! once the chain is done, so `left && right && b` presses all three at the
//! same time.

pub mod builtins;
pub mod parser;
pub mod registry;

use std::future::Future;
use std::io::Write;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::{button_push, send_state, Button, SharedState, StateError};
use crate::transport::TransportError;
use parser::{parse_line, TERMINATOR};
use registry::{
    Arity, Builtin, CommandEntry, CommandError, CommandHandler, CommandRegistry, CommandResult,
    RegistryError,
};

/// What the console loop does after one line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOutcome {
    Continue,
    Exit,
    Disconnected,
}

/// Why the console loop returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// `exit` was entered
    Exit,
    /// The transport lost its connection
    Disconnected,
    /// Console input reached end of file
    InputClosed,
}

pub struct ControllerCli<W: Write> {
    state: SharedState,
    registry: CommandRegistry,
    push_hold: Duration,
    out: W,
}

impl<W: Write> ControllerCli<W> {
    pub fn new(state: SharedState, push_hold: Duration, out: W) -> Self {
        Self {
            state,
            registry: CommandRegistry::with_builtins(),
            push_hold,
            out,
        }
    }

    pub fn add_command<F, Fut>(
        &mut self,
        name: &str,
        arity: Arity,
        description: Option<&str>,
        handler: F,
    ) -> Result<(), RegistryError>
    where
        F: Fn(Vec<String>) -> Fut + 'static,
        Fut: Future<Output = CommandResult> + 'static,
    {
        self.registry.register(name, arity, description, handler)?;
        debug!("Registered command {}", name);
        Ok(())
    }

    pub fn writer(&self) -> &W {
        &self.out
    }

    /// Runs one console line
    pub async fn execute_line(&mut self, text: &str) -> LineOutcome {
        let line = parse_line(text);
        if line.is_empty() {
            return LineOutcome::Continue;
        }

        let mut buttons: Vec<Button> = Vec::new();
        for segment in line.iter() {
            if segment.token == TERMINATOR {
                return LineOutcome::Exit;
            }

            if let Some(entry) = self.registry.get(&segment.token).cloned() {
                match self.invoke(&entry, &segment.args).await {
                    Ok(Some(text)) if !text.is_empty() => self.print(&text),
                    Ok(_) => {}
                    Err(e) if e.is_disconnect() => {
                        warn!("Command {} failed: {}", entry.name, e);
                        return LineOutcome::Disconnected;
                    }
                    Err(e) => self.print(&e.to_string()),
                }
                continue;
            }

            let button = self.state.borrow().button_state.available(&segment.token);
            match button {
                Some(button) => buttons.push(button),
                None => self.print(&format!(
                    "command {} not found, call help for help.",
                    segment.token
                )),
            }
        }

        if buttons.is_empty() {
            match send_state(&self.state).await {
                Ok(()) => LineOutcome::Continue,
                Err(TransportError::NotConnected) => LineOutcome::Disconnected,
                Err(e) => {
                    error!("Failed to send state: {}", e);
                    LineOutcome::Continue
                }
            }
        } else {
            match button_push(&self.state, &buttons, self.push_hold).await {
                Ok(()) => LineOutcome::Continue,
                Err(StateError::Transport(TransportError::NotConnected)) => {
                    LineOutcome::Disconnected
                }
                Err(e) => {
                    self.print(&e.to_string());
                    LineOutcome::Continue
                }
            }
        }
    }

    async fn invoke(&self, entry: &CommandEntry, args: &[String]) -> CommandResult {
        if !entry.arity.accepts(args.len()) {
            return Err(CommandError::Arity {
                command: entry.name.clone(),
                expected: entry.arity,
                got: args.len(),
            });
        }

        match &entry.handler {
            CommandHandler::Builtin(Builtin::Help) => {
                Ok(Some(builtins::help(&self.registry, &self.state.borrow())))
            }
            CommandHandler::Builtin(Builtin::Stick) => {
                builtins::stick(&mut self.state.borrow_mut(), args).map(Some)
            }
            CommandHandler::Builtin(Builtin::Hold) => {
                builtins::set_buttons(&mut self.state.borrow_mut(), args, true).map(|_| None)
            }
            CommandHandler::Builtin(Builtin::Release) => {
                builtins::set_buttons(&mut self.state.borrow_mut(), args, false).map(|_| None)
            }
            CommandHandler::Builtin(Builtin::State) => {
                Ok(Some(builtins::show_state(&self.state.borrow())))
            }
            CommandHandler::User(handler) => handler(args.to_vec()).await,
        }
    }

    fn print(&mut self, text: &str) {
        if let Err(e) = writeln!(self.out, "{}", text) {
            error!("Failed to write console output: {}", e);
        }
    }

    /// Reads lines from `input` until `exit`, end of input or a lost connection
    ///
    /// The session token is cancelled when a send reports the connection as
    /// gone; a token cancelled elsewhere (by the dispatcher) ends the loop
    /// while it waits for input.
    pub async fn run<R>(&mut self, input: R, prompt: &str, session: &CancellationToken) -> SessionEnd
    where
        R: AsyncBufRead + Unpin,
    {
        let mut lines = input.lines();
        loop {
            let _ = write!(self.out, "{}", prompt);
            let _ = self.out.flush();

            let line = tokio::select! {
                _ = session.cancelled() => {
                    info!("Session cancelled, leaving console");
                    return SessionEnd::Disconnected;
                }
                line = lines.next_line() => line,
            };

            let line = match line {
                Ok(Some(line)) => line,
                Ok(None) => return SessionEnd::InputClosed,
                Err(e) => {
                    error!("Failed to read console input: {}", e);
                    return SessionEnd::InputClosed;
                }
            };

            match self.execute_line(&line).await {
                LineOutcome::Continue => {}
                LineOutcome::Exit => return SessionEnd::Exit,
                LineOutcome::Disconnected => {
                    warn!("Connection was lost.");
                    session.cancel();
                    return SessionEnd::Disconnected;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::stick::STICK_MAX;
    use crate::state::{ControllerKind, ControllerState};
    use crate::transport::testing::RecordingTransport;
    use std::cell::Cell;
    use std::rc::Rc;

    fn cli() -> (ControllerCli<Vec<u8>>, Rc<RecordingTransport>) {
        let transport = Rc::new(RecordingTransport::default());
        let state =
            ControllerState::new(ControllerKind::ProController, transport.clone()).into_shared();
        (
            ControllerCli::new(state, Duration::from_millis(100), Vec::new()),
            transport,
        )
    }

    fn output(cli: &ControllerCli<Vec<u8>>) -> String {
        String::from_utf8_lossy(cli.writer()).into_owned()
    }

    #[tokio::test(start_paused = true)]
    async fn chained_buttons_are_pushed_together_once() {
        let (mut cli, transport) = cli();
        assert_eq!(
            cli.execute_line("left && right && b").await,
            LineOutcome::Continue
        );

        let reports = transport.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].buttons, vec!["b", "right", "left"]);
        assert!(reports[1].buttons.is_empty());
    }

    #[tokio::test]
    async fn exit_alone_runs_nothing() {
        let (mut cli, transport) = cli();
        assert_eq!(cli.execute_line("exit").await, LineOutcome::Exit);
        assert_eq!(transport.sends(), 0);
        assert!(output(&cli).is_empty());
    }

    #[tokio::test]
    async fn exit_stops_the_chain_after_earlier_segments() {
        let (mut cli, transport) = cli();
        assert_eq!(
            cli.execute_line("stick l up && exit && stick r down").await,
            LineOutcome::Exit
        );
        assert!(output(&cli).contains("Left stick was set to"));
        assert!(!output(&cli).contains("Right stick"));
        assert_eq!(transport.sends(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_token_is_reported_and_chain_continues() {
        let (mut cli, transport) = cli();
        cli.execute_line("zzz && a").await;

        let out = output(&cli);
        assert_eq!(out.matches("not found").count(), 1);
        assert!(out.contains("command zzz not found, call help for help."));
        let reports = transport.reports();
        assert_eq!(reports.len(), 2);
        assert_eq!(reports[0].buttons, vec!["a"]);
    }

    #[tokio::test]
    async fn commands_without_buttons_send_state_once() {
        let (mut cli, transport) = cli();
        cli.execute_line("stick l up && stick r h 10").await;

        let reports = transport.reports();
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].left_stick.v(), STICK_MAX);
        assert_eq!(reports[0].right_stick.h(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn failing_command_does_not_stop_the_chain() {
        let (mut cli, transport) = cli();
        cli.execute_line("stick l sideways && b").await;

        assert!(output(&cli).contains("Unexpected argument \"sideways\""));
        assert_eq!(transport.reports()[0].buttons, vec!["b"]);
    }

    #[tokio::test]
    async fn arity_is_checked_before_the_handler_runs() {
        let (mut cli, _) = cli();
        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        cli.add_command("count", Arity::exactly(1), None, move |_| {
            counter.set(counter.get() + 1);
            async { Ok(None) }
        })
        .unwrap();

        cli.execute_line("count 1 2").await;
        assert_eq!(calls.get(), 0);
        assert!(output(&cli).contains("count expects 1 argument(s), got 2"));

        cli.execute_line("count 1").await;
        assert_eq!(calls.get(), 1);
    }

    #[tokio::test]
    async fn user_command_output_is_printed() {
        let (mut cli, _) = cli();
        cli.add_command("echo", Arity::at_least(0), Some("echo - test"), |args| async move {
            Ok(Some(args.join(" ")))
        })
        .unwrap();
        assert!(cli.add_command("echo", Arity::exactly(0), None, |_| async { Ok(None) }).is_err());

        cli.execute_line("echo hello world").await;
        assert!(output(&cli).contains("hello world"));
    }

    #[tokio::test]
    async fn not_connected_ends_the_line_as_disconnected() {
        let (mut cli, transport) = cli();
        transport.disconnect();
        assert_eq!(cli.execute_line("a").await, LineOutcome::Disconnected);
        assert_eq!(cli.execute_line("state").await, LineOutcome::Disconnected);
    }

    #[tokio::test]
    async fn user_command_losing_the_connection_ends_the_line() {
        let (mut cli, transport) = cli();
        cli.add_command("drop", Arity::exactly(0), None, |_| async {
            Err(CommandError::Transport(TransportError::NotConnected))
        })
        .unwrap();

        assert_eq!(
            cli.execute_line("drop && a").await,
            LineOutcome::Disconnected
        );
        assert_eq!(transport.sends(), 0);
        assert!(!output(&cli).contains("Not connected"));
    }

    #[tokio::test]
    async fn hold_and_release_keep_buttons_between_lines() {
        let (mut cli, transport) = cli();
        cli.execute_line("hold a zl").await;
        assert_eq!(transport.reports()[0].buttons, vec!["a", "zl"]);

        cli.execute_line("release a").await;
        assert_eq!(transport.reports()[1].buttons, vec!["zl"]);

        cli.execute_line("hold a nope").await;
        assert!(output(&cli).contains("Unknown button \"nope\""));
        assert_eq!(transport.reports()[2].buttons, vec!["zl"]);
    }

    #[tokio::test]
    async fn blank_lines_do_nothing() {
        let (mut cli, transport) = cli();
        assert_eq!(cli.execute_line("   ").await, LineOutcome::Continue);
        assert_eq!(cli.execute_line("&&").await, LineOutcome::Continue);
        assert_eq!(transport.sends(), 0);
    }

    #[tokio::test]
    async fn help_lists_registered_commands() {
        let (mut cli, _) = cli();
        cli.add_command("wait", Arity::exactly(1), Some("wait <ms> - Pauses."), |_| async {
            Ok(None)
        })
        .unwrap();
        cli.execute_line("help").await;

        let out = output(&cli);
        assert!(out.contains("Button commands:"));
        assert!(out.contains("wait <ms> - Pauses."));
        assert!(out.contains("Commands can be chained using \"&&\""));
    }

    #[tokio::test(start_paused = true)]
    async fn run_reads_until_exit() {
        let (mut cli, transport) = cli();
        let session = CancellationToken::new();
        let input: &[u8] = b"a\nexit\nb\n";

        assert_eq!(cli.run(input, "cmd >> ", &session).await, SessionEnd::Exit);
        assert_eq!(output(&cli).matches("cmd >> ").count(), 2);
        assert_eq!(transport.sends(), 2);
    }

    #[tokio::test]
    async fn run_ends_on_end_of_input() {
        let (mut cli, _) = cli();
        let input: &[u8] = b"state\n";
        let end = cli.run(input, "> ", &CancellationToken::new()).await;
        assert_eq!(end, SessionEnd::InputClosed);
    }

    #[tokio::test]
    async fn run_cancels_the_session_on_lost_connection() {
        let (mut cli, transport) = cli();
        transport.disconnect();
        let session = CancellationToken::new();
        let input: &[u8] = b"a\nb\n";

        assert_eq!(
            cli.run(input, "> ", &session).await,
            SessionEnd::Disconnected
        );
        assert!(session.is_cancelled());
    }

    #[tokio::test]
    async fn run_returns_when_the_session_is_cancelled_elsewhere() {
        let (mut cli, _) = cli();
        let session = CancellationToken::new();
        session.cancel();
        let (reader, _writer) = tokio::io::duplex(64);
        let input = tokio::io::BufReader::new(reader);

        assert_eq!(
            cli.run(input, "> ", &session).await,
            SessionEnd::Disconnected
        );
    }
}
