mod cli;
mod report;
mod settings;

use std::io;
use std::process::ExitCode;

use anyhow::{Context, Result};
use archive_logging::{archive_error, archive_warn, LogDestination};
use archiver_core::RunStatus;
use archiver_engine::Archiver;
use clap::{CommandFactory, Parser};
use log::LevelFilter;
use tokio_util::sync::CancellationToken;

use crate::cli::{Cli, Command};
use crate::settings::{resolve, FileSettings};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.global.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let destination = if cli.global.log_file.is_some() {
        LogDestination::TerminalAndFile
    } else {
        LogDestination::Terminal
    };
    archive_logging::initialize(level, destination, cli.global.log_file.as_deref());

    match run(cli) {
        Ok(status) => exit_code(status),
        Err(err) => {
            archive_error!("{:#}", err);
            exit_code(RunStatus::Fatal)
        }
    }
}

fn exit_code(status: RunStatus) -> ExitCode {
    ExitCode::from(u8::try_from(status.exit_code()).unwrap_or(1))
}

fn run(cli: Cli) -> Result<RunStatus> {
    if let Command::Completions(args) = &cli.command {
        let mut command = Cli::command();
        clap_complete::generate(args.shell, &mut command, "post-archiver", &mut io::stdout());
        return Ok(RunStatus::Success);
    }

    let file = FileSettings::load_optional(cli.global.config.as_deref())?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start the async runtime")?;

    match cli.command {
        Command::List(args) => {
            let config = resolve(&cli.global, None, file)?;
            let archiver = Archiver::from_config(config)?;
            let posts = runtime.block_on(archiver.list(&args.url))?;
            report::print_posts(&posts);
            Ok(RunStatus::Success)
        }
        Command::Download(args) => {
            let config = resolve(&cli.global, Some(&args), file)?;
            let archiver = Archiver::from_config(config)?;
            let summary = runtime.block_on(async {
                let cancel = CancellationToken::new();
                let watcher = tokio::spawn(cancel_on_ctrl_c(cancel.clone()));
                let result = archiver.download(&args.url, cancel).await;
                watcher.abort();
                result
            })?;
            report::print_summary(&summary);
            Ok(summary.status())
        }
        Command::Audit(args) => {
            let mut config = resolve(&cli.global, None, file)?;
            if let Some(output) = args.output {
                config.output_dir = output;
            }
            let archiver = Archiver::from_config(config)?;
            let report = archiver.audit(args.manifest.as_deref())?;
            report::print_audit(&report);
            Ok(report.status())
        }
        Command::Completions(_) => Ok(RunStatus::Success),
    }
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        archive_warn!("Interrupted: finishing posts in flight, then saving the manifest");
        cancel.cancel();
    }
}
