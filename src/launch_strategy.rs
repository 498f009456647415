use std::path::{Path, PathBuf};

/// How a `RunFromSource` strategy invokes the backend entrypoint: through the
/// managed runner (`uv`) or the plain interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SourceRunner {
    Uv,
    Python,
}

impl SourceRunner {
    pub(crate) fn program(self) -> &'static str {
        match self {
            SourceRunner::Uv => "uv",
            SourceRunner::Python => "python",
        }
    }

    pub(crate) fn args(self) -> &'static [&'static str] {
        match self {
            SourceRunner::Uv => &["run", "python", "app/main.py"],
            SourceRunner::Python => &["app/main.py"],
        }
    }
}

/// A concrete way to start the backend, immutable once chosen for an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ExecutionStrategy {
    /// Spawn a built backend binary directly, no shell interpretation.
    RunExecutable {
        program: PathBuf,
        args: Vec<String>,
        working_dir: PathBuf,
    },
    /// Run the backend entrypoint from its source tree.
    RunFromSource {
        source_dir: PathBuf,
        runner: SourceRunner,
    },
}

impl ExecutionStrategy {
    pub(crate) fn executable(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let working_dir = program
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        ExecutionStrategy::RunExecutable {
            program,
            args: Vec::new(),
            working_dir,
        }
    }

    pub(crate) fn from_source(source_dir: impl Into<PathBuf>, runner: SourceRunner) -> Self {
        ExecutionStrategy::RunFromSource {
            source_dir: source_dir.into(),
            runner,
        }
    }

    /// The same-attempt lateral fallback: a managed-runner source strategy
    /// degrades to the plain interpreter in the same source tree. Executable
    /// strategies and plain-interpreter runs have no lateral step; their
    /// failures go through the ordinary retry ladder.
    pub(crate) fn with_plain_interpreter(&self) -> Option<ExecutionStrategy> {
        match self {
            ExecutionStrategy::RunFromSource {
                source_dir,
                runner: SourceRunner::Uv,
            } => Some(ExecutionStrategy::from_source(
                source_dir.clone(),
                SourceRunner::Python,
            )),
            _ => None,
        }
    }

    pub(crate) fn describe(&self) -> String {
        match self {
            ExecutionStrategy::RunExecutable { program, args, .. } => {
                let mut parts = vec![program.display().to_string()];
                parts.extend(args.iter().cloned());
                parts.join(" ")
            }
            ExecutionStrategy::RunFromSource { source_dir, runner } => format!(
                "{} {} (in {})",
                runner.program(),
                runner.args().join(" "),
                source_dir.display()
            ),
        }
    }
}

/// Ordered strategy candidates for the retry ladder. Dev builds go straight
/// to the source tree; packaged builds probe the installed executable, then a
/// co-located copy, and degrade to source as the universal last resort. The
/// probe only reports existence, it never fails on missing paths.
pub(crate) fn strategy_candidates(
    packaged: bool,
    source_dir: &Path,
    executable_candidates: &[PathBuf],
    probe: impl Fn(&Path) -> bool,
) -> Vec<ExecutionStrategy> {
    let mut strategies = Vec::new();

    if packaged {
        for candidate in executable_candidates {
            if probe(candidate) {
                strategies.push(ExecutionStrategy::executable(candidate.clone()));
            }
        }
    }

    strategies.push(ExecutionStrategy::from_source(source_dir, SourceRunner::Uv));
    strategies
}
