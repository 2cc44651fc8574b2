use clap::Parser;
use clap_complete::Shell;

/// Arguments for completions command
#[derive(Parser, Debug)]
#[command(after_help = "EXAMPLES:\n  \
                  groundwork completions bash > ~/.bash_completion.d/groundwork\n  \
                  groundwork completions zsh > ~/.zfunc/_groundwork\n  \
                  groundwork completions fish > ~/.config/fish/completions/groundwork.fish")]
pub struct CompletionsArgs {
    #[arg(value_enum)]
    pub shell: Shell,
}
