use std::path::PathBuf;

use thiserror::Error;

pub const DEFAULT_EXECUTABLE: &str = "/home/zaine/llama.cpp/build/bin/llama-cli";
pub const DEFAULT_MODEL: &str = "/home/zaine/llama.cpp/models/llama-7b.gguf";
pub const DEFAULT_THREADS: u32 = 4;
pub const DEFAULT_MAX_IN_FLIGHT: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SettingsError {
    #[error("executable path is empty")]
    EmptyExecutable,
    #[error("model path is empty")]
    EmptyModel,
    #[error("thread count must be at least 1")]
    ZeroThreads,
    #[error("at least one reply must be allowed in flight")]
    ZeroInFlight,
}

/// What gets passed to llama-cli for every prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvokerSettings {
    pub executable: PathBuf,
    pub model: PathBuf,
    pub threads: u32,
}

impl Default for InvokerSettings {
    fn default() -> Self {
        Self {
            executable: PathBuf::from(DEFAULT_EXECUTABLE),
            model: PathBuf::from(DEFAULT_MODEL),
            threads: DEFAULT_THREADS,
        }
    }
}

impl InvokerSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.executable.as_os_str().is_empty() {
            return Err(SettingsError::EmptyExecutable);
        }
        if self.model.as_os_str().is_empty() {
            return Err(SettingsError::EmptyModel);
        }
        if self.threads == 0 {
            return Err(SettingsError::ZeroThreads);
        }
        Ok(())
    }

    /// Arguments following the executable: `-m <model> -p <prompt> -t <threads>`.
    pub fn args(&self, prompt: &str) -> Vec<String> {
        vec![
            "-m".to_string(),
            self.model.to_string_lossy().into_owned(),
            "-p".to_string(),
            prompt.to_string(),
            "-t".to_string(),
            self.threads.to_string(),
        ]
    }

    pub fn command_line(&self, prompt: &str) -> String {
        let mut parts = vec![self.executable.to_string_lossy().into_owned()];
        parts.extend(self.args(prompt));
        parts.join(" ")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub max_in_flight: usize,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl DispatchSettings {
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.max_in_flight == 0 {
            return Err(SettingsError::ZeroInFlight);
        }
        Ok(())
    }
}
