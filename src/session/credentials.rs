//! Login credentials resolved lazily: explicit value, then environment, then
//! an interactive prompt.

use std::fmt;

use console::Term;

use crate::error::{Error, Result};

pub const USERNAME_VARS: &[&str] = &["QUALER_EMAIL", "QUALER_USERNAME"];
pub const PASSWORD_VARS: &[&str] = &["QUALER_PASSWORD"];

/// Asks the operator for a missing value.
pub trait Prompter: Send + Sync {
    fn prompt(&self, label: &str) -> Result<String>;
    fn prompt_secret(&self, label: &str) -> Result<String>;
}

/// Prompts on the controlling terminal.
pub struct ConsolePrompter;

impl Prompter for ConsolePrompter {
    fn prompt(&self, label: &str) -> Result<String> {
        let term = Term::stderr();
        term.write_str(&format!("{}: ", label))?;
        Ok(term.read_line()?)
    }

    fn prompt_secret(&self, label: &str) -> Result<String> {
        let term = Term::stderr();
        term.write_str(&format!("{}: ", label))?;
        Ok(term.read_secure_line()?)
    }
}

type EnvLookup = Box<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub struct Credentials {
    username: Option<String>,
    password: Option<String>,
    env: EnvLookup,
    prompter: Box<dyn Prompter>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

impl Default for Credentials {
    fn default() -> Self {
        Self::new(None, None)
    }
}

impl Credentials {
    pub fn new(username: Option<String>, password: Option<String>) -> Self {
        Self {
            username,
            password,
            env: Box::new(|key| std::env::var(key).ok()),
            prompter: Box::new(ConsolePrompter),
        }
    }

    pub fn with_prompter(mut self, prompter: impl Prompter + 'static) -> Self {
        self.prompter = Box::new(prompter);
        self
    }

    pub fn with_env(mut self, env: impl Fn(&str) -> Option<String> + Send + Sync + 'static) -> Self {
        self.env = Box::new(env);
        self
    }

    pub fn username(&self) -> Result<String> {
        self.resolve(self.username.as_deref(), USERNAME_VARS, || {
            self.prompter.prompt("Qualer Username")
        })
    }

    pub fn password(&self) -> Result<String> {
        self.resolve(self.password.as_deref(), PASSWORD_VARS, || {
            self.prompter.prompt_secret("Qualer Password")
        })
    }

    fn resolve(
        &self,
        explicit: Option<&str>,
        vars: &[&str],
        prompt: impl FnOnce() -> Result<String>,
    ) -> Result<String> {
        if let Some(value) = explicit.filter(|v| !v.is_empty()) {
            return Ok(value.to_string());
        }
        if let Some(value) = vars
            .iter()
            .find_map(|key| (self.env)(key).filter(|v| !v.is_empty()))
        {
            return Ok(value);
        }
        let value = prompt()?.trim_end_matches(['\r', '\n']).to_string();
        if value.is_empty() {
            return Err(Error::Authentication(format!(
                "no value supplied for {}",
                vars.join(" / ")
            )));
        }
        Ok(value)
    }
}
