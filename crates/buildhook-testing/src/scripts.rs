//! Throwaway project directories with a scripted build.
//!
//! The script is written as a plain (non-executable) file named `build` and
//! run through `/bin/sh`, so pointing the build launcher at `/bin/sh` turns
//! `sh build <args...>` into a fake `satis build <args...>`. Avoiding a
//! freshly written executable sidesteps `ETXTBSY` when tests spawn in
//! parallel.

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use tempfile::TempDir;

/// Shell used to interpret fake build scripts.
pub const SHELL: &str = "/bin/sh";

/// Temporary project directory containing a `build` script and a
/// `satis.json`.
pub struct FakeProject {
    dir: TempDir,
}

impl FakeProject {
    /// Creates a project whose build runs `script` under `/bin/sh`.
    ///
    /// Positional parameters follow the launcher's argument order: `$1` is
    /// the satis config file, `$2` the `--repository-url=` flag.
    pub fn new(script: &str) -> io::Result<Self> {
        let dir = tempfile::tempdir()?;
        fs::write(dir.path().join("build"), format!("{script}\n"))?;
        fs::write(dir.path().join("satis.json"), "{\"name\": \"test/repository\"}\n")?;
        Ok(Self { dir })
    }

    /// Project that prints two lines and succeeds.
    pub fn succeeding() -> io::Result<Self> {
        Self::new("echo line1\necho line2")
    }

    /// Project root.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path to the build script.
    pub fn script_path(&self) -> PathBuf {
        self.dir.path().join("build")
    }
}
