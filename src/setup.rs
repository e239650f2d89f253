//! First-run setup prompt.
//!
//! A linear state machine collects either a bot token or an email/password
//! login, then the administrator's user id:
//!
//! ```text
//! AwaitMode ─┬─ "token" ─▶ AwaitToken ─────────────────────┐
//!            └─ "login" ─▶ AwaitEmail ─▶ AwaitPassword ─────┤
//!                                                          ▼
//!                                       AwaitAdminId ─▶ Done
//! ```
//!
//! Invalid input leaves the state unchanged so the same prompt repeats.

use std::fmt;
use std::io::{BufRead, Write};

use thiserror::Error;
use tracing::debug;

use crate::config::{Credentials, Settings};

/// Where the setup prompt currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupState {
    AwaitMode,
    AwaitToken,
    AwaitEmail,
    AwaitPassword,
    AwaitAdminId,
    Done,
}

impl SetupState {
    /// Prompt shown while waiting in this state.
    #[must_use]
    pub fn prompt(self) -> &'static str {
        match self {
            Self::AwaitMode => "Token or Login? [\"token\"/\"login\"]: ",
            Self::AwaitToken => "Enter token: ",
            Self::AwaitEmail => "Enter email: ",
            Self::AwaitPassword => "Enter password: ",
            Self::AwaitAdminId => "Input your user ID: ",
            Self::Done => "",
        }
    }
}

impl fmt::Display for SetupState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AwaitMode => "login mode",
            Self::AwaitToken => "token",
            Self::AwaitEmail => "email",
            Self::AwaitPassword => "password",
            Self::AwaitAdminId => "admin id",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Errors from the setup prompt.
#[derive(Debug, Error)]
pub enum SetupError {
    /// The answer was rejected; the prompt should be repeated.
    #[error("invalid {state}: {reason}")]
    InvalidInput {
        state: SetupState,
        reason: &'static str,
    },

    /// Input ended before setup finished.
    #[error("input ended while waiting for {state}")]
    UnexpectedEof { state: SetupState },

    /// Settings were requested before every answer was collected.
    #[error("setup incomplete, still waiting for {state}")]
    Incomplete { state: SetupState },

    /// Reading answers or writing prompts failed.
    #[error("terminal IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SetupError {
    fn invalid(state: SetupState, reason: &'static str) -> Self {
        Self::InvalidInput { state, reason }
    }
}

/// Collects answers one line at a time.
#[derive(Debug)]
pub struct SetupWizard {
    state: SetupState,
    credentials: Credentials,
    admin_id: String,
}

impl Default for SetupWizard {
    fn default() -> Self {
        Self::new()
    }
}

impl SetupWizard {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: SetupState::AwaitMode,
            credentials: Credentials::default(),
            admin_id: String::new(),
        }
    }

    #[must_use]
    pub fn state(&self) -> SetupState {
        self.state
    }

    /// Feeds one answer and returns the new state.
    ///
    /// # Errors
    ///
    /// [`SetupError::InvalidInput`] when the answer is rejected; the state is
    /// left unchanged.
    pub fn step(&mut self, input: &str) -> Result<SetupState, SetupError> {
        let input = input.trim_end_matches(['\r', '\n']);
        let next = match self.state {
            SetupState::AwaitMode => {
                let mode = input.to_lowercase();
                if mode.contains("token") {
                    SetupState::AwaitToken
                } else if mode.contains("login") {
                    SetupState::AwaitEmail
                } else {
                    return Err(SetupError::invalid(self.state, "answer \"token\" or \"login\""));
                }
            }
            SetupState::AwaitToken => {
                if input.is_empty() {
                    return Err(SetupError::invalid(self.state, "token cannot be empty"));
                }
                self.credentials.token = input.to_string();
                SetupState::AwaitAdminId
            }
            SetupState::AwaitEmail => {
                if !input.contains('@') {
                    return Err(SetupError::invalid(self.state, "email must contain '@'"));
                }
                self.credentials.email = input.to_string();
                SetupState::AwaitPassword
            }
            SetupState::AwaitPassword => {
                if input.is_empty() {
                    return Err(SetupError::invalid(self.state, "password cannot be empty"));
                }
                self.credentials.password = input.to_string();
                SetupState::AwaitAdminId
            }
            SetupState::AwaitAdminId => {
                if input.is_empty() || !input.chars().all(|c| c.is_ascii_digit()) {
                    return Err(SetupError::invalid(self.state, "user id must be numeric"));
                }
                self.admin_id = input.to_string();
                SetupState::Done
            }
            SetupState::Done => SetupState::Done,
        };

        debug!(from = %self.state, to = %next, "setup step");
        self.state = next;
        Ok(next)
    }

    /// Builds starter settings from the collected answers.
    ///
    /// # Errors
    ///
    /// [`SetupError::Incomplete`] if the prompt has not reached
    /// [`SetupState::Done`].
    pub fn finish(self) -> Result<Settings, SetupError> {
        if self.state != SetupState::Done {
            return Err(SetupError::Incomplete { state: self.state });
        }
        Ok(Settings {
            credentials: self.credentials,
            admins: vec![self.admin_id],
            ..Settings::default()
        })
    }
}

/// Runs the prompt over a terminal-like reader and writer.
///
/// # Errors
///
/// Returns [`SetupError::UnexpectedEof`] if input ends early, or
/// [`SetupError::Io`] on read/write failure.
pub fn run<R: BufRead, W: Write>(mut input: R, mut output: W) -> Result<Settings, SetupError> {
    let mut wizard = SetupWizard::new();
    let mut line = String::new();

    while wizard.state() != SetupState::Done {
        write!(output, "{}", wizard.state().prompt())?;
        output.flush()?;

        line.clear();
        if input.read_line(&mut line)? == 0 {
            return Err(SetupError::UnexpectedEof {
                state: wizard.state(),
            });
        }

        match wizard.step(&line) {
            Ok(_) => {}
            Err(SetupError::InvalidInput { reason, .. }) => writeln!(output, "Please retry: {reason}")?,
            Err(e) => return Err(e),
        }
    }

    wizard.finish()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Cursor;

    // ==================== State Machine Tests ====================

    #[test]
    fn test_token_path() {
        let mut wizard = SetupWizard::new();
        assert_eq!(wizard.step("Token").unwrap(), SetupState::AwaitToken);
        assert_eq!(wizard.step("abc.def").unwrap(), SetupState::AwaitAdminId);
        assert_eq!(wizard.step("123456").unwrap(), SetupState::Done);

        let settings = wizard.finish().unwrap();
        assert_eq!(settings.credentials.token, "abc.def");
        assert!(settings.credentials.email.is_empty());
        assert_eq!(settings.admins, vec!["123456".to_string()]);
        assert_eq!(settings.download_retry_max, 3);
    }

    #[test]
    fn test_login_path() {
        let mut wizard = SetupWizard::new();
        assert_eq!(wizard.step("login\n").unwrap(), SetupState::AwaitEmail);
        assert_eq!(wizard.step("me@example.com").unwrap(), SetupState::AwaitPassword);
        assert_eq!(wizard.step("hunter2").unwrap(), SetupState::AwaitAdminId);
        assert_eq!(wizard.step("42").unwrap(), SetupState::Done);

        let settings = wizard.finish().unwrap();
        assert_eq!(settings.credentials.email, "me@example.com");
        assert_eq!(settings.credentials.password, "hunter2");
    }

    #[test]
    fn test_invalid_input_keeps_state() {
        let mut wizard = SetupWizard::new();
        assert!(matches!(
            wizard.step("maybe"),
            Err(SetupError::InvalidInput {
                state: SetupState::AwaitMode,
                ..
            })
        ));
        assert_eq!(wizard.state(), SetupState::AwaitMode);

        wizard.step("login").unwrap();
        assert!(wizard.step("not-an-email").is_err());
        assert_eq!(wizard.state(), SetupState::AwaitEmail);

        wizard.step("a@b").unwrap();
        assert!(wizard.step("").is_err());
        assert_eq!(wizard.state(), SetupState::AwaitPassword);

        wizard.step("pw").unwrap();
        assert!(wizard.step("12ab").is_err());
        assert!(wizard.step("").is_err());
        assert_eq!(wizard.state(), SetupState::AwaitAdminId);
    }

    #[test]
    fn test_empty_token_rejected() {
        let mut wizard = SetupWizard::new();
        wizard.step("token").unwrap();
        assert!(wizard.step("\r\n").is_err());
        assert_eq!(wizard.state(), SetupState::AwaitToken);
    }

    #[test]
    fn test_finish_before_done_is_incomplete() {
        let mut wizard = SetupWizard::new();
        wizard.step("token").unwrap();
        assert!(matches!(
            wizard.finish(),
            Err(SetupError::Incomplete {
                state: SetupState::AwaitToken
            })
        ));
    }

    // ==================== Terminal Tests ====================

    #[test]
    fn test_run_reprompts_after_invalid_answer() {
        let input = Cursor::new("token\n\nsecret\nabc\n99\n");
        let mut output = Vec::new();

        let settings = run(input, &mut output).unwrap();
        assert_eq!(settings.credentials.token, "secret");
        assert_eq!(settings.admins, vec!["99".to_string()]);

        let shown = String::from_utf8(output).unwrap();
        assert_eq!(shown.matches("Enter token: ").count(), 2);
        assert_eq!(shown.matches("Input your user ID: ").count(), 2);
        assert!(shown.contains("Please retry: token cannot be empty"));
    }

    #[test]
    fn test_run_unexpected_eof() {
        let input = Cursor::new("login\nme@example.com\n");
        let err = run(input, Vec::new()).unwrap_err();
        assert!(matches!(
            err,
            SetupError::UnexpectedEof {
                state: SetupState::AwaitPassword
            }
        ));
    }
}
