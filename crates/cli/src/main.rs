use std::process::ExitCode;

fn main() -> ExitCode {
    callsync_cli::run()
}
