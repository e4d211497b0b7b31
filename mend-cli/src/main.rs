use clap::Parser;
use mend_core::cli::Cli;
use std::process;

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            process::exit(if err.use_stderr() {
                mend_cli::EXIT_USAGE
            } else {
                0
            });
        }
    };

    match mend_cli::run(cli) {
        Ok(code) => process::exit(code),
        Err(err) => {
            eprintln!("❌ {:#}", err);
            process::exit(mend_cli::exit_code_for(&err));
        }
    }
}
