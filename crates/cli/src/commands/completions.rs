//! completions command - Print a shell completion script

use clap::CommandFactory;
use clap_complete::Shell;

use super::Cli;
use crate::exit_code::ExitCode;

/// Arguments for the completions command
#[derive(clap::Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    #[arg(value_enum)]
    pub shell: Shell,
}

fn render(shell: Shell, out: &mut dyn std::io::Write) {
    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();
    clap_complete::generate(shell, &mut cmd, name, out);
}

/// Write the completion script for the requested shell to stdout
pub fn execute(args: CompletionsArgs) -> ExitCode {
    render(args.shell, &mut std::io::stdout());
    ExitCode::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    fn script(shell: Shell) -> String {
        let mut buf = Vec::new();
        render(shell, &mut buf);
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_scripts_name_the_binary_and_commands() {
        for (shell, marker) in [
            (Shell::Bash, "complete"),
            (Shell::Zsh, "compdef"),
            (Shell::Fish, "complete"),
            (Shell::PowerShell, "Register-ArgumentCompleter"),
        ] {
            let output = script(shell);
            assert!(output.contains("s3kv"), "{shell:?}");
            assert!(output.contains(marker), "{shell:?}");
            assert!(output.contains("grep"), "{shell:?}");
        }
    }
}
