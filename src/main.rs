//! m4a2mp3 - batch M4A to MP3 converter
//!
//! Converts every `.m4a` file of a directory to MP3 with ffmpeg, choosing
//! each file's bitrate so the result stays under a size limit (16 MiB by
//! default).

mod audio;
mod cli;
mod conversion;
mod core;
mod error;
mod logging;
mod test_fixtures;
mod tools;
mod ui;

use clap::Parser;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let opts = match cli::Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(cli::usage_exit_status(&e));
        }
    };

    match cli::entry(&opts).await {
        Ok(code) => code,
        Err(e) => {
            log::debug!("Fatal: {:?}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
