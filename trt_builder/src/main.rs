use std::process::ExitCode;

use trt_builder::cli;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let code = cli::main_with(std::env::args_os(), trt_builder::default_compiler()).await;
    ExitCode::from(code)
}
