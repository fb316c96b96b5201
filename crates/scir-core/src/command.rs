//! Builder for submission and control command lines.

use scir_parsers::shell_escape;

/// A bash command line assembled word by word.
///
/// Values are quoted with [`shell_escape`]; raw fragments (site-provided
/// extra arguments, redirections) are inserted verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    words: Vec<String>,
}

impl ShellCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            words: vec![program.into()],
        }
    }

    /// Append a fragment exactly as given.
    pub fn raw(&mut self, fragment: impl Into<String>) -> &mut Self {
        self.words.push(fragment.into());
        self
    }

    /// Append a fragment if there is one.
    pub fn raw_opt(&mut self, fragment: Option<&str>) -> &mut Self {
        if let Some(f) = fragment {
            self.words.push(f.to_string());
        }
        self
    }

    /// Append a quoted value.
    pub fn arg(&mut self, value: &str) -> &mut Self {
        self.words.push(shell_escape(value));
        self
    }

    /// Append `flag 'value'`.
    pub fn opt(&mut self, flag: &str, value: &str) -> &mut Self {
        self.words.push(flag.to_string());
        self.words.push(shell_escape(value));
        self
    }

    /// Append `flag 'value'` if the value is present.
    pub fn opt_if(&mut self, flag: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.opt(flag, v);
        }
        self
    }

    /// Append `--flag='value'`.
    pub fn long(&mut self, flag: &str, value: &str) -> &mut Self {
        self.words.push(format!("{}={}", flag, shell_escape(value)));
        self
    }

    /// Append `--flag='value'` if the value is present.
    pub fn long_if(&mut self, flag: &str, value: Option<&str>) -> &mut Self {
        if let Some(v) = value {
            self.long(flag, v);
        }
        self
    }

    pub fn build(&self) -> String {
        self.words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build() {
        let cmd = ShellCommand::new("qsub")
            .raw("-S /bin/bash")
            .opt("-N", "my job")
            .opt_if("-q", None)
            .long("--output", "it's.log")
            .long_if("--error", Some("e.log"))
            .raw_opt(Some("-A lab"))
            .arg("run.sh")
            .raw("2>&1")
            .build();
        assert_eq!(
            cmd,
            r"qsub -S /bin/bash -N 'my job' --output='it'\''s.log' --error='e.log' -A lab 'run.sh' 2>&1"
        );
    }
}
