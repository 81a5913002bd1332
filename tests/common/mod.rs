//! Shared test infrastructure for integration tests.

use serde::Deserialize;
use serde_json::Value;
use std::env;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Test fixture metadata loaded from fixture.json.
#[derive(Debug, Deserialize)]
pub struct FixtureConfig {
    /// Source text file, relative to the fixture directory.
    pub source_file: String,
    #[serde(default)]
    pub depth: Option<String>,
}

/// A fixture plus an isolated working directory for one test.
pub struct TestFixture {
    pub fixture_dir: PathBuf,
    pub config: FixtureConfig,
    pub work_dir: TempDir,
}

/// Captured result of one `cpipe` invocation.
#[derive(Debug)]
pub struct CliOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

fn manifest_dir() -> PathBuf {
    PathBuf::from(env::var("CARGO_MANIFEST_DIR").unwrap_or_else(|_| ".".into()))
}

impl TestFixture {
    /// Load a fixture by name from tests/fixtures/{name}/.
    pub fn load(name: &str) -> anyhow::Result<Self> {
        let fixture_dir = manifest_dir().join("tests/fixtures").join(name);
        let config_path = fixture_dir.join("fixture.json");
        let config: FixtureConfig =
            serde_json::from_str(&std::fs::read_to_string(&config_path).map_err(|e| {
                anyhow::anyhow!("Failed to read {}: {}", config_path.display(), e)
            })?)?;
        Ok(Self {
            fixture_dir: fixture_dir.canonicalize()?,
            config,
            work_dir: TempDir::new()?,
        })
    }

    pub fn source_path(&self) -> PathBuf {
        self.fixture_dir.join(&self.config.source_file)
    }

    pub fn depth(&self) -> &str {
        self.config.depth.as_deref().unwrap_or("medium")
    }

    /// Path inside the test's working directory.
    pub fn work_path(&self, name: &str) -> PathBuf {
        self.work_dir.path().join(name)
    }

    /// Command line for the replaying mock model.
    pub fn lm_command(&self) -> String {
        let mock_script = manifest_dir().join("tests/mock-lm.sh");
        format!(
            "sh '{}' '{}'",
            mock_script.display(),
            self.fixture_dir.display()
        )
    }

    /// Stage keys the mock model was asked for, in call order.
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(self.work_path("calls.txt"))
            .map(|content| content.lines().map(String::from).collect())
            .unwrap_or_default()
    }

    /// The canned response for `stage`, parsed the way cpipe parses it.
    pub fn expected_result(&self, stage: &str) -> Value {
        let path = self
            .fixture_dir
            .join("responses")
            .join(format!("{stage}.txt"));
        let raw = std::fs::read_to_string(&path).expect("read fixture response");
        let cleaned: String = raw
            .lines()
            .filter(|line| !line.trim_start().starts_with("```"))
            .collect::<Vec<_>>()
            .join("\n");
        serde_json::from_str(&cleaned).expect("fixture response is JSON")
    }

    /// Run the built `cpipe` binary inside the working directory, with the
    /// mock model selected and no user config or API keys visible.
    pub fn cpipe(&self, args: &[&str]) -> anyhow::Result<CliOutput> {
        let output = Command::new(env!("CARGO_BIN_EXE_cpipe"))
            .args(args)
            .current_dir(self.work_dir.path())
            .env("CPIPE_LM_COMMAND", self.lm_command())
            .env("CPIPE_MOCK_CALLS", self.work_path("calls.txt"))
            .env("XDG_CONFIG_HOME", self.work_path("xdg"))
            .env_remove("CPIPE_CONFIG")
            .env_remove("CPIPE_API_KEY")
            .env_remove("ANTHROPIC_API_KEY")
            .env_remove("RUST_LOG")
            .output()?;
        Ok(CliOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
