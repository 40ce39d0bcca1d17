use std::process::ExitCode;

fn main() -> ExitCode {
    despesas_cli::run()
}
