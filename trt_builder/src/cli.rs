//! Process driver: argv in, exit code out.

use std::ffi::OsString;

use clap::{CommandFactory, Parser};
use tracing::{error, info};

use crate::engine::{CompiledEngine, Compiler};
use crate::error::{BuildError, Result};
use crate::report;
use crate::request::Args;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;

/// Parse argv. `Err` carries the exit code after clap has printed its output:
/// 0 for `--help`/`--version`, 1 for usage errors.
pub fn parse_args<I, T>(argv: I) -> std::result::Result<Args, u8>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    Args::try_parse_from(argv).map_err(|e| {
        let _ = e.print();
        if e.use_stderr() {
            EXIT_FAILURE
        } else {
            EXIT_SUCCESS
        }
    })
}

/// Run the pipeline as a local task so a panic in it becomes [`BuildError::Unexpected`].
pub async fn run_guarded<C: Compiler + 'static>(args: Args, compiler: C) -> Result<CompiledEngine> {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            tokio::task::spawn_local(async move { crate::run(&args, compiler).await })
                .await
                .unwrap_or_else(|e| Err(BuildError::Unexpected(e.to_string())))
        })
        .await
}

/// Everything `main` does, returning the process exit code.
pub async fn main_with<C, I, T>(argv: I, compiler: C) -> u8
where
    C: Compiler + 'static,
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let args = match parse_args(argv) {
        Ok(args) => args,
        Err(code) => return code,
    };

    report::init_tracing(args.verbose);

    if args.input.is_none() && !args.download {
        let _ = Args::command().print_help();
        return EXIT_FAILURE;
    }

    tokio::select! {
        res = run_guarded(args, compiler) => match res {
            Ok(_) => EXIT_SUCCESS,
            Err(e) => {
                error!("{}", e);
                e.exit_code()
            }
        },
        _ = tokio::signal::ctrl_c() => {
            info!("Build interrupted by user");
            EXIT_FAILURE
        }
    }
}
