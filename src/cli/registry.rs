//! Explicit table of console commands
//!
//! Each entry carries its handler, the accepted argument count and an
//! optional help description. Built-ins are inserted first; user commands
//! go through the same collision check afterwards.

use futures::future::{FutureExt, LocalBoxFuture};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

use super::builtins;
use super::parser::{CHAIN_DELIMITER, TERMINATOR};
use crate::state::StateError;
use crate::transport::TransportError;

pub type CommandResult = Result<Option<String>, CommandError>;
pub type UserHandler = Rc<dyn Fn(Vec<String>) -> LocalBoxFuture<'static, CommandResult>>;

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{command} expects {expected} argument(s), got {got}")]
    Arity {
        command: String,
        expected: Arity,
        got: usize,
    },

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl CommandError {
    /// Whether the command failed because the transport lost its connection
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            CommandError::Transport(TransportError::NotConnected)
                | CommandError::State(StateError::Transport(TransportError::NotConnected))
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Command {0} already registered.")]
    DuplicateCommand(String),

    #[error("{0} is reserved and cannot be registered")]
    Reserved(String),

    #[error("Invalid command name \"{0}\"")]
    InvalidName(String),
}

/// Number of arguments a command accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arity {
    pub min: usize,
    /// `None` for variadic commands
    pub max: Option<usize>,
}

impl Arity {
    pub const fn exactly(n: usize) -> Self {
        Self {
            min: n,
            max: Some(n),
        }
    }

    pub const fn range(min: usize, max: usize) -> Self {
        Self {
            min,
            max: Some(max),
        }
    }

    pub const fn at_least(min: usize) -> Self {
        Self { min, max: None }
    }

    pub fn accepts(&self, count: usize) -> bool {
        count >= self.min && self.max.map_or(true, |max| count <= max)
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) if max == self.min => write!(f, "{}", max),
            Some(max) => write!(f, "{} to {}", self.min, max),
            None => write!(f, "at least {}", self.min),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Builtin {
    Help,
    Stick,
    Hold,
    Release,
    State,
}

#[derive(Clone)]
pub enum CommandHandler {
    Builtin(Builtin),
    User(UserHandler),
}

impl fmt::Debug for CommandHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandHandler::Builtin(builtin) => write!(f, "Builtin({:?})", builtin),
            CommandHandler::User(_) => write!(f, "User(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CommandEntry {
    pub name: String,
    pub arity: Arity,
    pub description: Option<String>,
    pub handler: CommandHandler,
}

impl CommandEntry {
    pub fn is_builtin(&self) -> bool {
        matches!(self.handler, CommandHandler::Builtin(_))
    }
}

#[derive(Debug, Default)]
pub struct CommandRegistry {
    entries: HashMap<String, CommandEntry>,
}

impl CommandRegistry {
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        for entry in builtins::entries() {
            // Built-in names are distinct, nothing to collide with yet
            registry.entries.insert(entry.name.clone(), entry);
        }
        registry
    }

    /// Adds a user command; the table is left untouched on error
    pub fn register<F, Fut>(
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
        if name.is_empty() || name.contains(char::is_whitespace) || name.contains(CHAIN_DELIMITER)
        {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if name == TERMINATOR {
            return Err(RegistryError::Reserved(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::DuplicateCommand(name.to_string()));
        }

        let handler: UserHandler = Rc::new(move |args| handler(args).boxed_local());
        self.entries.insert(
            name.to_string(),
            CommandEntry {
                name: name.to_string(),
                arity,
                description: description.map(str::to_string),
                handler: CommandHandler::User(handler),
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&CommandEntry> {
        self.entries.get(name)
    }

    /// Built-ins first, then user commands, each group by name
    pub fn entries(&self) -> Vec<&CommandEntry> {
        let mut entries: Vec<&CommandEntry> = self.entries.values().collect();
        entries.sort_by(|a, b| {
            b.is_builtin()
                .cmp(&a.is_builtin())
                .then_with(|| a.name.cmp(&b.name))
        });
        entries
    }
}
