use std::io::IsTerminal;

use clap::Parser;
use oxsh::Shell;

#[derive(Parser)]
#[command(name = "oxsh")]
#[command(about = "A POSIX-style shell with Bash extensions")]
#[command(version)]
struct Cli {
    /// Execute this command string and exit with its status
    #[arg(short = 'c', value_name = "COMMAND")]
    command: Option<String>,

    /// Force interactive mode
    #[arg(short = 'i')]
    interactive: bool,

    /// Do not read startup files (accepted for compatibility)
    #[arg(long = "norc")]
    norc: bool,

    /// Script file; remaining arguments become $1, $2, ...
    #[arg(value_name = "SCRIPT", trailing_var_arg = true, allow_hyphen_values = true)]
    args: Vec<String>,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // clap handles --help/--version itself; anything else is a
            // usage error, which exits 2.
            if e.use_stderr() {
                let _ = e.print();
                std::process::exit(2);
            }
            let _ = e.print();
            std::process::exit(0);
        }
    };

    let status = run(cli);
    std::process::exit(status & 0xff);
}

fn run(cli: Cli) -> i32 {
    if let Some(command) = cli.command {
        // oxsh -c 'cmd' [name [args...]]
        let arg0 = cli.args.first().map(String::as_str).unwrap_or("oxsh");
        let mut shell = Shell::new(arg0);
        if cli.args.len() > 1 {
            shell.state.set_positional(cli.args[1..].to_vec());
        }
        if cli.interactive {
            shell.init_interactive();
        }
        let status = shell.run_text(&command);
        shell.run_exit_trap();
        return status;
    }

    if let Some(script) = cli.args.first() {
        let text = match std::fs::read_to_string(script) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("oxsh: {script}: {e}");
                return 127;
            }
        };
        // A leading #! line is a comment when we open the script
        // ourselves; the lexer treats it as one already.
        let mut shell = Shell::new(script);
        shell.state.set_positional(cli.args[1..].to_vec());
        let status = shell.run_text(&text);
        shell.run_exit_trap();
        return status;
    }

    let stdin_tty = std::io::stdin().is_terminal();
    let mut shell = Shell::new("oxsh");
    if cli.interactive || stdin_tty {
        shell.init_interactive();
        let status = shell.run_interactive();
        shell.run_exit_trap();
        return status;
    }

    // Script on stdin: one logical command at a time, no prompts.
    let status = shell.run_stream(&mut || oxsh::interp::builtins::read_line_fd(0));
    shell.run_exit_trap();
    status
}
