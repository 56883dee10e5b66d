use std::process::ExitCode;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    hostline_cli::run()
}
