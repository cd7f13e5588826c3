//! `satis build` invocation for an admitted push.
//!
//! Rebuilds the package repository for exactly the repository that was
//! pushed, so one webhook never triggers a full rescan.

use std::{path::PathBuf, time::Duration};

use buildhook_core::RepositoryName;

use crate::{environment::BuildEnvironment, process::ProcessSpec};

/// Flags passed to every build.
pub const SATIS_FLAGS: [&str; 4] = ["--skip-errors", "--no-ansi", "--no-interaction", "--verbose"];

/// How to launch satis for one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SatisBuild {
    /// Satis project root; also the working directory.
    pub project_dir: PathBuf,
    /// Satis executable, relative to `project_dir` unless absolute.
    pub satis_binary: PathBuf,
    /// Satis configuration file passed as the first build argument.
    pub satis_config: String,
    /// Prefix for repository URLs, e.g. `git@bitbucket.org`.
    pub repository_host: String,
    /// Composer home exported as `HOME`, if configured.
    pub composer_home: Option<PathBuf>,
    /// Hard limit on build duration.
    pub timeout: Duration,
}

impl SatisBuild {
    /// Repository URL satis should rescan.
    pub fn repository_url(&self, repository: &RepositoryName) -> String {
        format!("{}/{}.git", self.repository_host.trim_end_matches('/'), repository)
    }

    /// Build arguments, in order.
    pub fn arguments(&self, repository: &RepositoryName) -> Vec<String> {
        let mut args = vec![
            "build".to_string(),
            self.satis_config.clone(),
            format!("--repository-url={}", self.repository_url(repository)),
        ];
        args.extend(SATIS_FLAGS.iter().map(|flag| (*flag).to_string()));
        args
    }

    /// Process specification for rebuilding `repository`.
    ///
    /// `env` is the inherited environment; `HOME` is replaced with the
    /// composer home when one is configured.
    pub fn process_for(&self, repository: &RepositoryName, env: BuildEnvironment) -> ProcessSpec {
        let env = match &self.composer_home {
            Some(home) => env.with("HOME", home.to_string_lossy()),
            None => env,
        };

        ProcessSpec::new(self.project_dir.join(&self.satis_binary))
            .args(self.arguments(repository))
            .current_dir(&self.project_dir)
            .env(env)
            .timeout(self.timeout)
    }
}
