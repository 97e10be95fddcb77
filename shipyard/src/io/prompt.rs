//! Operator prompts behind the [`Prompter`] seam.

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result, bail};

pub trait Prompter {
    /// Ask for a line of text. An empty answer takes `default`.
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String>;

    /// Ask a yes/no question. An empty answer takes `default`.
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;

    /// Whether a human is answering (gates attached logins).
    fn is_interactive(&self) -> bool;
}

/// Reads answers from stdin; questions go to stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompter;

impl TerminalPrompter {
    fn read_answer(&self, rendered: &str) -> Result<String> {
        eprint!("{rendered}");
        io::stderr().flush().context("flush prompt")?;
        let mut input = String::new();
        let read = io::stdin()
            .lock()
            .read_line(&mut input)
            .context("read answer from stdin")?;
        if read == 0 {
            bail!("stdin closed while waiting for an answer");
        }
        Ok(input.trim().to_string())
    }
}

impl Prompter for TerminalPrompter {
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        loop {
            let rendered = match default {
                Some(d) => format!("{question} [{d}]: "),
                None => format!("{question}: "),
            };
            let answer = self.read_answer(&rendered)?;
            if !answer.is_empty() {
                return Ok(answer);
            }
            if let Some(d) = default {
                return Ok(d.to_string());
            }
            eprintln!("an answer is required");
        }
    }

    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        let hint = if default { "[Y/n]" } else { "[y/N]" };
        loop {
            let answer = self.read_answer(&format!("{question} {hint} "))?;
            match answer.to_ascii_lowercase().as_str() {
                "" => return Ok(default),
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => eprintln!("please answer y or n"),
            }
        }
    }

    fn is_interactive(&self) -> bool {
        true
    }
}

/// `--auto`: every prompt takes its default.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoPrompter;

impl Prompter for AutoPrompter {
    fn ask(&self, question: &str, default: Option<&str>) -> Result<String> {
        match default {
            Some(d) => Ok(d.to_string()),
            None => bail!("`{question}` has no default and --auto is set"),
        }
    }

    fn confirm(&self, _question: &str, default: bool) -> Result<bool> {
        Ok(default)
    }

    fn is_interactive(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_prompter_takes_defaults() {
        let p = AutoPrompter;
        assert_eq!(p.ask("Commit message", Some("init")).expect("ask"), "init");
        assert!(p.confirm("Run inside docker?", true).expect("confirm"));
        assert!(!p.is_interactive());
    }

    #[test]
    fn auto_prompter_errors_without_default() {
        let err = AutoPrompter
            .ask("Git user.name", None)
            .expect_err("no default");
        assert!(err.to_string().contains("Git user.name"));
    }
}
