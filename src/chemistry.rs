//! Chemistry capabilities consumed by the enumeration engine.
//!
//! Computing a product from a reaction template and reactant structures needs
//! a full cheminformatics toolkit. The engine only relies on the narrow
//! [`Reactor`] contract: canonical, deduplicated and deterministic products
//! for identical inputs. [`CommandReactor`] drives a helper process (e.g. an
//! RDKit script), [`MockReactor`] answers from a fixed table.

use std::{
    collections::{BTreeSet, HashMap},
    ffi::OsStr,
    fmt::Display,
    io::{BufRead, BufReader, Write},
    process::{Child, ChildStdin, ChildStdout, Command, Stdio},
    sync::Mutex,
};

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A validated molecular structure in the reactor's canonical text form.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Structure(String);

impl Structure {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Structure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A structural rewrite rule (e.g. reaction SMARTS).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionTemplate(String);

impl ReactionTemplate {
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ReactionTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Failures reported by a [`Reactor`].
#[derive(Debug, thiserror::Error)]
pub enum ReactorError {
    #[error("invalid structure `{0}`")]
    InvalidStructure(String),
    #[error("reactor unavailable: {0}")]
    Unavailable(String),
    #[error("reaction failed: {0}")]
    Failed(String),
    #[error("malformed reactor response: {0}")]
    Protocol(String),
}

/// Applies reaction templates to reactant structures.
pub trait Reactor: Send + Sync {
    /// Apply `template` to `reactants` in the given order and return every
    /// distinct product the template yields.
    fn apply(
        &self,
        template: &ReactionTemplate,
        reactants: &[Structure],
    ) -> Result<BTreeSet<Structure>, ReactorError>;

    /// Turn a raw structure string from the configuration into a
    /// [`Structure`].
    fn parse_structure(&self, raw: &str) -> Result<Structure, ReactorError> {
        let raw = raw.trim();
        if raw.is_empty() {
            Err(ReactorError::InvalidStructure(raw.to_string()))
        } else {
            Ok(Structure::new(raw))
        }
    }
}

#[derive(Serialize)]
struct ApplyRequest<'a> {
    template: &'a str,
    reactants: Vec<&'a str>,
}

#[derive(Deserialize)]
struct ApplyResponse {
    #[serde(default)]
    products: Vec<String>,
    #[serde(default)]
    error: Option<String>,
}

struct Session {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

/// Reactor backed by a long-running helper program.
///
/// Each call writes one JSON request line `{"template": .., "reactants": [..]}`
/// to the helper's stdin and reads one JSON response line
/// `{"products": [..]}` or `{"error": ".."}` from its stdout. Calls are
/// serialized over a single session.
pub struct CommandReactor {
    program: String,
    session: Mutex<Session>,
}

impl CommandReactor {
    /// Spawn `program` with `args` and keep it running for the lifetime of the
    /// reactor.
    pub fn spawn<S: AsRef<OsStr>>(
        program: impl AsRef<OsStr>,
        args: &[S],
    ) -> Result<Self, ReactorError> {
        let program_name = program.as_ref().to_string_lossy().into_owned();
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| ReactorError::Unavailable(format!("{program_name}: {e}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ReactorError::Unavailable(format!("{program_name}: no stdin")))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ReactorError::Unavailable(format!("{program_name}: no stdout")))?;

        debug!(program = %program_name, "spawned reactor");
        Ok(Self {
            program: program_name,
            session: Mutex::new(Session {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }

    fn exchange(&self, request: &str) -> Result<String, ReactorError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| {
                ReactorError::Unavailable(format!("{}: session poisoned", self.program))
            })?;

        let unavailable =
            |e: std::io::Error| ReactorError::Unavailable(format!("{}: {e}", self.program));
        writeln!(session.stdin, "{request}").map_err(unavailable)?;
        session.stdin.flush().map_err(unavailable)?;

        let mut line = String::new();
        if session.stdout.read_line(&mut line).map_err(unavailable)? == 0 {
            return Err(ReactorError::Unavailable(format!(
                "{}: closed its output",
                self.program
            )));
        }
        Ok(line)
    }
}

impl Reactor for CommandReactor {
    fn apply(
        &self,
        template: &ReactionTemplate,
        reactants: &[Structure],
    ) -> Result<BTreeSet<Structure>, ReactorError> {
        let request = ApplyRequest {
            template: template.as_str(),
            reactants: reactants.iter().map(Structure::as_str).collect(),
        };
        let request =
            serde_json::to_string(&request).map_err(|e| ReactorError::Protocol(e.to_string()))?;

        let line = self.exchange(&request)?;
        let response: ApplyResponse = serde_json::from_str(line.trim())
            .map_err(|e| ReactorError::Protocol(format!("{e}: {}", line.trim())))?;

        if let Some(error) = response.error {
            return Err(ReactorError::Failed(error));
        }
        Ok(response.products.into_iter().map(Structure::new).collect())
    }
}

impl Drop for CommandReactor {
    fn drop(&mut self) {
        if let Ok(session) = self.session.get_mut() {
            let _ = session.child.kill();
            let _ = session.child.wait();
        }
    }
}

/// Reactor answering from preconfigured rules, for tests and benchmarks.
///
/// A rule matches a template and an exact, ordered reactant list. Unmatched
/// inputs yield no products, like a template whose pattern does not match.
#[derive(Debug, Clone, Default)]
pub struct MockReactor {
    rules: HashMap<(ReactionTemplate, Vec<Structure>), Result<BTreeSet<Structure>, String>>,
}

impl MockReactor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the products of `template` applied to `reactants`.
    pub fn with_rule(mut self, template: &str, reactants: &[&str], products: &[&str]) -> Self {
        self.rules.insert(
            Self::key(template, reactants),
            Ok(products.iter().map(|p| Structure::new(*p)).collect()),
        );
        self
    }

    /// Register a reactor failure for `template` applied to `reactants`.
    pub fn with_failure(mut self, template: &str, reactants: &[&str], message: &str) -> Self {
        self.rules
            .insert(Self::key(template, reactants), Err(message.to_string()));
        self
    }

    fn key(template: &str, reactants: &[&str]) -> (ReactionTemplate, Vec<Structure>) {
        (
            ReactionTemplate::new(template),
            reactants.iter().map(|r| Structure::new(*r)).collect(),
        )
    }
}

impl Reactor for MockReactor {
    fn apply(
        &self,
        template: &ReactionTemplate,
        reactants: &[Structure],
    ) -> Result<BTreeSet<Structure>, ReactorError> {
        match self.rules.get(&(template.clone(), reactants.to_vec())) {
            Some(Ok(products)) => Ok(products.clone()),
            Some(Err(message)) => Err(ReactorError::Failed(message.clone())),
            None => Ok(BTreeSet::new()),
        }
    }
}
