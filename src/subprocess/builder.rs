use std::time::Duration;

use crate::subprocess::ProcessCommand;

pub struct ProcessCommandBuilder {
    command: ProcessCommand,
}

impl ProcessCommandBuilder {
    pub fn new(program: &str) -> Self {
        Self {
            command: ProcessCommand {
                program: program.to_string(),
                args: Vec::new(),
                timeout: None,
            },
        }
    }

    pub fn arg(mut self, arg: &str) -> Self {
        self.command.args.push(arg.to_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.command
            .args
            .extend(args.into_iter().map(|s| s.as_ref().to_string()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.command.timeout = Some(timeout);
        self
    }

    pub fn build(self) -> ProcessCommand {
        self.command
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_collects_args_in_order() {
        let command = ProcessCommandBuilder::new("wsl")
            .arg("-d")
            .args(["OpenFortiVPN", "--"])
            .arg("vpn.example.com")
            .build();

        assert_eq!(command.program, "wsl");
        assert_eq!(
            command.args,
            vec!["-d", "OpenFortiVPN", "--", "vpn.example.com"]
        );
        assert!(command.timeout.is_none());
    }

    #[test]
    fn test_builder_timeout() {
        let command = ProcessCommandBuilder::new("powershell")
            .timeout(Duration::from_secs(30))
            .build();
        assert_eq!(command.timeout, Some(Duration::from_secs(30)));
    }
}
