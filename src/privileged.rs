//! Elevated command execution through `sudo -S`.
//!
//! The password is asked for once per session through a
//! [`CredentialProvider`] and kept in memory until the elevation tool
//! rejects it. It is never written to disk or logged.

use crate::command::{CommandOutput, CommandRunner};
use crate::error::{ChangerError, Result};
use std::sync::Arc;
use std::time::Duration;

/// Lowercased stderr fragments that mean the password was rejected.
const AUTH_FAILURE_MARKERS: &[&str] = &["incorrect password", "sorry, try again"];

/// Supplies the elevation password when none is cached.
///
/// Implemented by whatever surface talks to the user.
pub trait CredentialProvider: Send {
    /// Asks for the password. `None` means the user cancelled.
    fn request(&mut self) -> Option<String>;
}

/// Prompts on the controlling terminal with echo disabled.
#[derive(Debug, Clone, Default)]
pub struct TerminalPrompt {
    prompt: String,
}

impl TerminalPrompt {
    /// Creates a prompt with the given text.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
        }
    }
}

impl CredentialProvider for TerminalPrompt {
    fn request(&mut self) -> Option<String> {
        let prompt: &str = if self.prompt.is_empty() {
            "[sudo] password: "
        } else {
            &self.prompt
        };
        crate::util::read_secret(prompt).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "Failed to read password");
            None
        })
    }
}

/// Runs commands as root, caching the password between calls.
///
/// | state | event | next |
/// |---|---|---|
/// | no credential | prompt returns a password | cached |
/// | no credential | prompt cancelled | no credential ([`ChangerError::NoCredential`]) |
/// | cached | command fails authentication | no credential ([`ChangerError::WrongCredential`]) |
/// | cached | command succeeds or fails otherwise | cached |
pub struct PrivilegedExecutor {
    runner: Arc<dyn CommandRunner>,
    credentials: Box<dyn CredentialProvider>,
    sudo_program: String,
    timeout: Option<Duration>,
    cached: Option<String>,
}

impl PrivilegedExecutor {
    /// Creates an executor with no cached credential.
    #[must_use]
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        credentials: Box<dyn CredentialProvider>,
        sudo_program: impl Into<String>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            runner,
            credentials,
            sudo_program: sudo_program.into(),
            timeout,
            cached: None,
        }
    }

    /// Runs `argv` under elevation, prompting for the password if needed.
    ///
    /// # Errors
    ///
    /// - [`ChangerError::NoCredential`] if the prompt yields nothing.
    /// - [`ChangerError::WrongCredential`] if the password is rejected; the
    ///   cached password is dropped so the next call prompts again.
    /// - [`ChangerError::Command`] for any other failure, carrying the
    ///   command's stderr. The cached password is kept.
    pub fn run(&mut self, argv: &[&str]) -> Result<CommandOutput> {
        let password = self.credential()?;

        let mut sudo_args = vec!["-S", "-p", ""];
        sudo_args.extend_from_slice(argv);
        let input = format!("{password}\n");

        let output = match self
            .runner
            .run(&self.sudo_program, &sudo_args, Some(input.as_str()), self.timeout)
        {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(
                    program = %self.sudo_program,
                    command = %argv.join(" "),
                    error = %e,
                    "Privileged command did not run"
                );
                return Err(ChangerError::Command {
                    message: format!("{} {}: {e}", self.sudo_program, argv.join(" ")),
                });
            }
        };

        if output.is_success() {
            tracing::debug!(command = %argv.join(" "), "Privileged command succeeded");
            return Ok(output);
        }

        let stderr = output.stderr.to_lowercase();
        if AUTH_FAILURE_MARKERS.iter().any(|m| stderr.contains(m)) {
            tracing::warn!("Elevation password rejected, clearing cached credential");
            self.cached = None;
            return Err(ChangerError::WrongCredential);
        }

        let message = match output.stderr.trim() {
            "" => format!(
                "{} exited with status {}",
                argv.join(" "),
                output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string())
            ),
            stderr => stderr.to_string(),
        };
        tracing::warn!(command = %argv.join(" "), error = %message, "Privileged command failed");
        Err(ChangerError::Command { message })
    }

    /// Returns `true` while a password is cached.
    #[must_use]
    pub const fn has_credential(&self) -> bool {
        self.cached.is_some()
    }

    /// Drops the cached password.
    pub fn forget_credential(&mut self) {
        self.cached = None;
    }

    fn credential(&mut self) -> Result<String> {
        if let Some(password) = &self.cached {
            return Ok(password.clone());
        }
        match self.credentials.request() {
            Some(password) if !password.is_empty() => {
                self.cached = Some(password.clone());
                Ok(password)
            }
            _ => Err(ChangerError::NoCredential),
        }
    }
}

impl std::fmt::Debug for PrivilegedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrivilegedExecutor")
            .field("sudo_program", &self.sudo_program)
            .field("timeout", &self.timeout)
            .field("has_credential", &self.cached.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Scripted {
        replies: Mutex<VecDeque<std::io::Result<CommandOutput>>>,
        calls: Mutex<Vec<(String, Vec<String>, Option<String>)>>,
    }

    impl Scripted {
        fn reply(&self, reply: std::io::Result<CommandOutput>) {
            self.replies.lock().unwrap().push_back(reply);
        }
    }

    impl CommandRunner for Scripted {
        fn run(
            &self,
            program: &str,
            args: &[&str],
            stdin: Option<&str>,
            _timeout: Option<Duration>,
        ) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push((
                program.to_string(),
                args.iter().map(ToString::to_string).collect(),
                stdin.map(ToString::to_string),
            ));
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CommandOutput::success("")))
        }
    }

    struct Counting {
        asked: Arc<AtomicUsize>,
        answer: Option<&'static str>,
    }

    impl CredentialProvider for Counting {
        fn request(&mut self) -> Option<String> {
            self.asked.fetch_add(1, Ordering::SeqCst);
            self.answer.map(ToString::to_string)
        }
    }

    fn executor(answer: Option<&'static str>) -> (PrivilegedExecutor, Arc<Scripted>, Arc<AtomicUsize>) {
        let runner = Arc::new(Scripted::default());
        let asked = Arc::new(AtomicUsize::new(0));
        let exec = PrivilegedExecutor::new(
            runner.clone(),
            Box::new(Counting {
                asked: asked.clone(),
                answer,
            }),
            "sudo",
            None,
        );
        (exec, runner, asked)
    }

    #[test]
    fn prompts_once_and_passes_password_on_stdin() {
        let (mut exec, runner, asked) = executor(Some("hunter2"));

        exec.run(&["cp", "/tmp/a", "/etc/b"]).unwrap();
        exec.run(&["systemctl", "restart", "systemd-resolved"]).unwrap();

        assert_eq!(asked.load(Ordering::SeqCst), 1);
        let calls = runner.calls.lock().unwrap().clone();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].0, "sudo");
        assert_eq!(calls[0].1, ["-S", "-p", "", "cp", "/tmp/a", "/etc/b"]);
        assert_eq!(calls[0].2.as_deref(), Some("hunter2\n"));
        assert!(exec.has_credential());
    }

    #[test]
    fn cancelled_prompt_is_no_credential() {
        let (mut exec, runner, _) = executor(None);
        assert!(matches!(exec.run(&["true"]), Err(ChangerError::NoCredential)));
        assert!(runner.calls.lock().unwrap().is_empty());

        let (mut exec, _, _) = executor(Some(""));
        assert!(matches!(exec.run(&["true"]), Err(ChangerError::NoCredential)));
        assert!(!exec.has_credential());
    }

    #[test]
    fn wrong_password_clears_cache_and_reprompts() {
        let (mut exec, runner, asked) = executor(Some("bad"));
        runner.reply(Ok(CommandOutput::failure(
            1,
            "Sorry, try again.\nsudo: 1 Incorrect Password attempt\n",
        )));

        assert!(matches!(exec.run(&["true"]), Err(ChangerError::WrongCredential)));
        assert!(!exec.has_credential());

        exec.run(&["true"]).unwrap();
        assert_eq!(asked.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn other_failures_keep_cache() {
        let (mut exec, runner, asked) = executor(Some("good"));
        runner.reply(Ok(CommandOutput::failure(
            1,
            "cp: cannot stat '/tmp/a': No such file or directory\n",
        )));

        let err = exec.run(&["cp", "/tmp/a", "/etc/b"]).unwrap_err();
        assert_eq!(err.to_string(), "cp: cannot stat '/tmp/a': No such file or directory");
        assert!(exec.has_credential());

        exec.run(&["true"]).unwrap();
        assert_eq!(asked.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn silent_failure_reports_status() {
        let (mut exec, runner, _) = executor(Some("good"));
        runner.reply(Ok(CommandOutput::failure(5, "")));
        let err = exec.run(&["systemctl", "restart", "x"]).unwrap_err();
        assert_eq!(err.to_string(), "systemctl restart x exited with status 5");
    }

    #[test]
    fn spawn_failure_is_command_error() {
        let (mut exec, runner, _) = executor(Some("good"));
        runner.reply(Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "timed out after 60s")));
        let err = exec.run(&["cp", "a", "b"]).unwrap_err();
        assert!(matches!(err, ChangerError::Command { .. }));
        assert!(err.to_string().contains("timed out"));
        assert!(exec.has_credential());
    }

    #[test]
    fn missing_sudo_is_named_in_error() {
        let (mut exec, runner, _) = executor(Some("good"));
        runner.reply(Err(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "No such file or directory",
        )));
        let err = exec.run(&["cp", "a", "b"]).unwrap_err();
        assert_eq!(err.to_string(), "sudo cp a b: No such file or directory");
    }

    #[test]
    fn debug_never_shows_password() {
        let (mut exec, _, _) = executor(Some("hunter2"));
        exec.run(&["true"]).unwrap();
        assert!(!format!("{exec:?}").contains("hunter2"));
        exec.forget_credential();
        assert!(!exec.has_credential());
    }
}
