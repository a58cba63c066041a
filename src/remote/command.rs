// src/remote/command.rs

//! Command tokens and shell rendering.
//!
//! Remote commands are built as a list of [`Arg`]s. Literal arguments are
//! quoted before they reach the remote shell; raw arguments (`;`, `|`, `&&`,
//! redirections, globs) are passed through untouched so they keep their shell
//! meaning.

use std::fmt;

/// A single token of a remote command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// Quoted before being sent to the remote shell.
    Literal(String),
    /// Emitted verbatim (shell control tokens, glob patterns).
    Raw(String),
}

impl Arg {
    pub fn render(&self) -> String {
        match self {
            Arg::Literal(s) => quote_arg(s),
            Arg::Raw(s) => s.clone(),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Self {
        Arg::Literal(s.to_string())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Self {
        Arg::Literal(s)
    }
}

impl fmt::Display for Arg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Build a list of literal arguments.
pub fn args<I, S>(items: I) -> Vec<Arg>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    items.into_iter().map(|s| Arg::Literal(s.into())).collect()
}

/// A raw (unquoted) argument.
pub fn raw(s: impl Into<String>) -> Arg {
    Arg::Raw(s.into())
}

/// Render a full command line for `sh -c` on the remote side.
pub fn render(args: &[Arg]) -> String {
    args.iter().map(Arg::render).collect::<Vec<_>>().join(" ")
}

/// Quote a single argument for the remote shell.
///
/// Arguments made only of safe characters are left alone, everything else
/// is wrapped in single quotes with embedded quotes escaped.
pub fn quote_arg(arg: &str) -> String {
    if arg.is_empty() {
        return "''".to_string();
    }

    let safe = arg
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || "@%+=:,./-_".contains(c));
    if safe {
        return arg.to_string();
    }

    format!("'{}'", arg.replace('\'', "'\\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literals_are_quoted_and_raw_tokens_are_not() {
        let mut cmd = args(["echo", "hello world", "it's"]);
        cmd.push(raw(";"));
        cmd.extend(args(["ls", "/tmp/x"]));

        assert_eq!(render(&cmd), r"echo 'hello world' 'it'\''s' ; ls /tmp/x");
    }

    #[test]
    fn empty_and_glob_literals_are_quoted() {
        assert_eq!(quote_arg(""), "''");
        assert_eq!(quote_arg("/tmp/mnt.*"), "'/tmp/mnt.*'");
        assert_eq!(raw("/tmp/mnt.*").render(), "/tmp/mnt.*");
    }
}
