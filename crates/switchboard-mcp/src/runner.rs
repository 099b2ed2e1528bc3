//! Runner resolution for package-runner commands.
//!
//! Servers are usually launched through a package runner (`npx`, `uvx`).
//! Packaged deployments ship those runners in a bundled directory, so the
//! resolver looks there first and then on the search path. A command that is
//! not a recognized runner is used verbatim.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// A recognized package-runner command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Runner {
    /// Node's `npx`.
    Npx,
    /// Astral's `uvx`.
    Uvx,
}

impl Runner {
    /// Parse a configured command name.
    pub fn parse(command: &str) -> Option<Self> {
        match command {
            "npx" => Some(Self::Npx),
            "uvx" => Some(Self::Uvx),
            _ => None,
        }
    }

    /// The executable name searched for.
    pub fn program(&self) -> &'static str {
        match self {
            Self::Npx => "npx",
            Self::Uvx => "uvx",
        }
    }
}

/// The command that will actually be spawned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedCommand {
    /// Found in the bundled-binaries directory.
    Bundled(PathBuf),
    /// Found on the search path.
    SearchPath(PathBuf),
    /// A runner that could not be located; the bare name is tried anyway.
    Fallback(String),
    /// A custom command, passed through untouched.
    Verbatim(String),
}

impl ResolvedCommand {
    /// Program to hand to the process spawner.
    pub fn program(&self) -> &Path {
        match self {
            Self::Bundled(path) | Self::SearchPath(path) => path,
            Self::Fallback(name) | Self::Verbatim(name) => Path::new(name),
        }
    }

    /// Whether resolution fell back to the bare runner name.
    pub fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

impl std::fmt::Display for ResolvedCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.program().display())
    }
}

/// Locates runner executables.
#[derive(Debug, Clone, Default)]
pub struct RunnerResolver {
    bundled_dir: Option<PathBuf>,
    search_path: Option<OsString>,
}

impl RunnerResolver {
    /// Create a resolver, optionally with a bundled-binaries directory.
    pub fn new(bundled_dir: Option<PathBuf>) -> Self {
        Self {
            bundled_dir,
            search_path: None,
        }
    }

    /// Search this path list instead of the process `PATH`.
    pub fn with_search_path(mut self, path: impl Into<OsString>) -> Self {
        self.search_path = Some(path.into());
        self
    }

    /// The bundled-binaries directory, if any.
    pub fn bundled_dir(&self) -> Option<&Path> {
        self.bundled_dir.as_deref()
    }

    fn find_bundled(&self, program: &str) -> Option<PathBuf> {
        let dir = self.bundled_dir.as_ref()?;
        which::which_in(program, Some(dir), dir).ok()
    }

    fn find_on_path(&self, program: &str) -> Option<PathBuf> {
        match &self.search_path {
            Some(paths) => which::which_in(program, Some(paths), ".").ok(),
            None => which::which(program).ok(),
        }
    }

    /// Absolute path of a runner: bundled directory first, then search path.
    pub fn locate(&self, runner: Runner) -> Option<PathBuf> {
        self.find_bundled(runner.program())
            .or_else(|| self.find_on_path(runner.program()))
    }

    /// Resolve a configured command.
    ///
    /// Never fails: an unlocatable runner falls back to its bare name with a
    /// warning, and the spawn attempt reports the real error.
    pub fn resolve(&self, command: &str) -> ResolvedCommand {
        let Some(runner) = Runner::parse(command) else {
            return ResolvedCommand::Verbatim(command.to_string());
        };

        if let Some(path) = self.find_bundled(runner.program()) {
            tracing::debug!(runner = runner.program(), path = %path.display(), "using bundled runner");
            return ResolvedCommand::Bundled(path);
        }

        if let Some(path) = self.find_on_path(runner.program()) {
            tracing::debug!(runner = runner.program(), path = %path.display(), "found runner on search path");
            return ResolvedCommand::SearchPath(path);
        }

        tracing::warn!(
            runner = runner.program(),
            bundled_dir = ?self.bundled_dir,
            "could not locate runner; servers using it will likely fail to start"
        );
        ResolvedCommand::Fallback(runner.program().to_string())
    }
}
