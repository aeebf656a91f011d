use std::process::ExitCode;

fn main() -> ExitCode {
    sitespend_cli::run()
}
