use std::process::ExitCode;

fn main() -> ExitCode {
    pitchsim_cli::run()
}
