//! Collaborators owned by the host application.
//!
//! The rules core never renders, localizes or talks to a user directly. It
//! calls these traits instead; the binary wires in the simple terminal
//! implementations below, a real host adapter supplies its own.

use std::collections::HashMap;
use std::io::{self, BufRead, Write};
use std::path::Path;

use log::{error, info, warn};

use crate::errors::RulesError;

/// Resolves a locale key to display text.
pub trait Localizer {
    fn localize(&self, key: &str) -> String;
}

/// Persistent or transient banners shown to the session user.
pub trait Notifier {
    fn info(&self, message: &str, permanent: bool);
    fn warn(&self, message: &str, permanent: bool);
    fn error(&self, message: &str, permanent: bool);
}

/// One yes/no question put to the user.
pub trait Prompt {
    fn confirm(&self, title: &str, question: &str, default_yes: bool) -> bool;
}

pub trait Session {
    /// Only the game master may run world migrations.
    fn is_gamemaster(&self) -> bool;
}

impl Session for bool {
    fn is_gamemaster(&self) -> bool {
        *self
    }
}

/// Flat `key -> text` catalog, as found in the system's `lang/*.json` files.
#[derive(Debug, Clone, Default)]
pub struct CatalogLocalizer {
    entries: HashMap<String, String>,
}

impl CatalogLocalizer {
    pub fn new(entries: HashMap<String, String>) -> Self {
        Self { entries }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, RulesError> {
        let contents = std::fs::read_to_string(path.as_ref())?;
        let entries: HashMap<String, String> = serde_json::from_str(&contents)?;
        Ok(Self { entries })
    }
}

impl Localizer for CatalogLocalizer {
    /// Missing keys fall back to the key itself.
    fn localize(&self, key: &str) -> String {
        self.entries
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Banners as log lines; permanent banners are also echoed to stderr.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn info(&self, message: &str, permanent: bool) {
        info!("{}", message);
        if permanent {
            eprintln!("{}", message);
        }
    }

    fn warn(&self, message: &str, permanent: bool) {
        warn!("{}", message);
        if permanent {
            eprintln!("WARNING: {}", message);
        }
    }

    fn error(&self, message: &str, permanent: bool) {
        error!("{}", message);
        if permanent {
            eprintln!("ERROR: {}", message);
        }
    }
}

/// Reads a y/n answer from stdin. Empty input takes the default.
pub struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn confirm(&self, title: &str, question: &str, default_yes: bool) -> bool {
        let hint = if default_yes { "[Y/n]" } else { "[y/N]" };
        print!("{}\n{} {} ", title, question, hint);
        let _ = io::stdout().flush();

        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line).is_err() {
            return default_yes;
        }
        match line.trim().to_ascii_lowercase().as_str() {
            "" => default_yes,
            "y" | "yes" => true,
            _ => false,
        }
    }
}

/// Answers every question the same way (non-interactive runs).
pub struct FixedPrompt(pub bool);

impl Prompt for FixedPrompt {
    fn confirm(&self, title: &str, _question: &str, _default_yes: bool) -> bool {
        info!("{}: answering {}", title, if self.0 { "yes" } else { "no" });
        self.0
    }
}
