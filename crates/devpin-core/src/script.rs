use serde::Serialize;
use std::fmt;

/// One statement of an activation script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Statement {
    Export { name: String, value: String },
    Alias { name: String, command: String },
    /// A literal line from the manifest hook, emitted verbatim.
    Raw { line: String },
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Export { name, value } => write!(f, "export {name}={}", shell_quote(value)),
            Statement::Alias { name, command } => write!(f, "alias {name}={}", shell_quote(command)),
            Statement::Raw { line } => f.write_str(line),
        }
    }
}

/// Ordered statements a POSIX shell runs once when a session starts.
///
/// devpin only renders the script. Evaluating it is left to the shell,
/// e.g. `eval "$(devpin shell)"`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationScript {
    pub statements: Vec<Statement>,
}

impl ActivationScript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn export(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.statements.push(Statement::Export {
            name: name.into(),
            value: value.into(),
        });
    }

    pub fn alias(&mut self, name: impl Into<String>, command: impl Into<String>) {
        self.statements.push(Statement::Alias {
            name: name.into(),
            command: command.into(),
        });
    }

    pub fn raw(&mut self, line: impl Into<String>) {
        self.statements.push(Statement::Raw { line: line.into() });
    }

    pub fn len(&self) -> usize {
        self.statements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Render the script, one statement per line.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for statement in &self.statements {
            out.push_str(&statement.to_string());
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for ActivationScript {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Quote a value for a POSIX shell: wrap in single quotes, and close, escape
/// and reopen around every embedded single quote.
pub fn shell_quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('\'');
    for c in value.chars() {
        if c == '\'' {
            out.push_str("'\\''");
        } else {
            out.push(c);
        }
    }
    out.push('\'');
    out
}
