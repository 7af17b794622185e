use std::ffi::OsStr;
use std::io;
use std::process::{Command, ExitStatus, Output};
use std::sync::Arc;

use thiserror::Error;

use crate::settings::{InvokerSettings, SettingsError};

#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("invalid settings: {0}")]
    InvalidSettings(#[from] SettingsError),
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("llama-cli exited with {status}: {stderr}")]
    Exit { status: ExitStatus, stderr: String },
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, program: &OsStr, args: &[String]) -> io::Result<Output>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &OsStr, args: &[String]) -> io::Result<Output> {
        Command::new(program).args(args).output()
    }
}

/// Runs llama-cli once per prompt and hands back what it printed.
pub struct LlamaCli<R: CommandRunner = ProcessCommandRunner> {
    settings: InvokerSettings,
    runner: Arc<R>,
}

impl<R: CommandRunner> Clone for LlamaCli<R> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            runner: Arc::clone(&self.runner),
        }
    }
}

impl LlamaCli<ProcessCommandRunner> {
    pub fn new(settings: InvokerSettings) -> Self {
        Self::with_runner(settings, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> LlamaCli<R> {
    pub fn with_runner(settings: InvokerSettings, runner: R) -> Self {
        Self {
            settings,
            runner: Arc::new(runner),
        }
    }

    pub fn settings(&self) -> &InvokerSettings {
        &self.settings
    }

    /// Same runner, different settings. Used when the settings window applies changes.
    pub fn with_settings(&self, settings: InvokerSettings) -> Self {
        Self {
            settings,
            runner: Arc::clone(&self.runner),
        }
    }

    /// Blocks until the process exits. Returns stdout with surrounding whitespace removed.
    pub fn invoke(&self, prompt: &str) -> Result<String, InvokeError> {
        self.settings.validate()?;

        let program = self.settings.executable.as_os_str();
        let args = self.settings.args(prompt);
        tracing::debug!(command = %self.settings.command_line(prompt), "Running llama-cli");

        let output = self
            .runner
            .run(program, &args)
            .map_err(|source| InvokeError::Spawn {
                program: self.settings.executable.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(stdout = %stdout, "Command output");
        tracing::debug!(stderr = %stderr, "Command error");

        if !output.status.success() {
            return Err(InvokeError::Exit {
                status: output.status,
                stderr: stderr.trim().to_string(),
            });
        }

        Ok(stdout.trim().to_string())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[cfg(unix)]
    pub(crate) fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    #[cfg(windows)]
    pub(crate) fn exit_status(code: i32) -> ExitStatus {
        use std::os::windows::process::ExitStatusExt;
        ExitStatus::from_raw(code as u32)
    }

    /// Answers every call with the same canned output and remembers the argv.
    pub(crate) struct FakeRunner {
        pub code: i32,
        pub stdout: String,
        pub stderr: String,
        pub calls: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl FakeRunner {
        pub(crate) fn replying(stdout: &str) -> Self {
            Self {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl CommandRunner for FakeRunner {
        fn run(&self, program: &OsStr, args: &[String]) -> io::Result<Output> {
            self.calls
                .lock()
                .unwrap()
                .push((program.to_string_lossy().into_owned(), args.to_vec()));
            Ok(Output {
                status: exit_status(self.code),
                stdout: self.stdout.clone().into_bytes(),
                stderr: self.stderr.clone().into_bytes(),
            })
        }
    }

    struct FailingRunner;

    impl CommandRunner for FailingRunner {
        fn run(&self, _program: &OsStr, _args: &[String]) -> io::Result<Output> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such file"))
        }
    }

    #[test]
    fn trims_captured_output() {
        let cli = LlamaCli::with_runner(InvokerSettings::default(), FakeRunner::replying(" X \n"));
        assert_eq!(cli.invoke("anything").unwrap(), "X");
    }

    #[test]
    fn passes_fixed_argv_to_runner() {
        let cli = LlamaCli::with_runner(InvokerSettings::default(), FakeRunner::replying("ok"));
        cli.invoke("Hello").unwrap();

        let calls = cli.runner.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (program, args) = &calls[0];
        assert_eq!(program, "/home/zaine/llama.cpp/build/bin/llama-cli");
        assert_eq!(
            args,
            &vec!["-m", "/home/zaine/llama.cpp/models/llama-7b.gguf", "-p", "Hello", "-t", "4"]
        );
    }

    #[test]
    fn empty_output_is_not_an_error() {
        let cli = LlamaCli::with_runner(InvokerSettings::default(), FakeRunner::replying("  \n"));
        assert_eq!(cli.invoke("hm").unwrap(), "");
    }

    #[test]
    fn spawn_failure_is_reported() {
        let cli = LlamaCli::with_runner(InvokerSettings::default(), FailingRunner);
        let err = cli.invoke("Hello").unwrap_err();
        assert!(matches!(err, InvokeError::Spawn { .. }));
        assert!(err.to_string().contains("llama-cli"));
    }

    #[test]
    fn non_zero_exit_carries_stderr() {
        let runner = FakeRunner {
            code: 1,
            stdout: "partial".to_string(),
            stderr: "error: failed to load model\n".to_string(),
            calls: Mutex::new(Vec::new()),
        };
        let cli = LlamaCli::with_runner(InvokerSettings::default(), runner);
        match cli.invoke("Hello") {
            Err(InvokeError::Exit { status, stderr }) => {
                assert!(!status.success());
                assert_eq!(stderr, "error: failed to load model");
            }
            other => panic!("expected exit error, got {other:?}"),
        }
    }

    #[test]
    fn invalid_settings_never_run_the_process() {
        let settings = InvokerSettings {
            threads: 0,
            ..InvokerSettings::default()
        };
        let cli = LlamaCli::with_runner(settings, FakeRunner::replying("ok"));
        assert!(matches!(
            cli.invoke("Hello"),
            Err(InvokeError::InvalidSettings(SettingsError::ZeroThreads))
        ));
        assert!(cli.runner.calls.lock().unwrap().is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn runs_a_real_process() {
        let settings = InvokerSettings {
            executable: PathBuf::from("echo"),
            model: PathBuf::from("model.gguf"),
            threads: 2,
        };
        let cli = LlamaCli::new(settings);
        assert_eq!(cli.invoke("Hello").unwrap(), "-m model.gguf -p Hello -t 2");
    }

    #[test]
    fn missing_executable_fails_to_spawn() {
        let settings = InvokerSettings {
            executable: PathBuf::from("/definitely/not/here/llama-cli"),
            ..InvokerSettings::default()
        };
        let cli = LlamaCli::new(settings);
        assert!(matches!(cli.invoke("Hello"), Err(InvokeError::Spawn { .. })));
    }
}
