// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Tinta: Bluetooth receipt printing from the command line.
//
// Entry point. Initialises logging and backend services, then runs one
// command against the print session.

mod services;

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use tinta_core::error::{Result, TintaError};
use tinta_core::human_errors::humanize_error;
use tinta_core::types::{Payload, PrintStatus};

use services::app_services::{AppServices, ServiceOptions};
use services::{image_loader, output};

/// Tinta - print text and images on Bluetooth thermal receipt printers
#[derive(Parser, Debug)]
#[command(name = "tinta")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Use a simulated printer instead of Bluetooth
    #[arg(long, global = true)]
    offline: bool,

    /// Settings file (defaults to the data directory's config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List paired printers
    Devices {
        #[arg(long)]
        json: bool,
    },

    /// Scan for nearby printers
    Scan {
        #[arg(long)]
        json: bool,

        /// Give up on the scan after this many seconds
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,
    },

    /// Print text (reads stdin when no text is given)
    PrintText {
        text: Option<String>,

        /// Printer address, e.g. 00:11:62:AA:BB:CC
        #[arg(long, short)]
        printer: Option<String>,
    },

    /// Print a PNG or JPEG image
    PrintImage {
        path: PathBuf,

        /// Printer address, e.g. 00:11:62:AA:BB:CC
        #[arg(long, short)]
        printer: Option<String>,

        /// Scale images wider than the paper down to fit
        #[arg(long)]
        fit: bool,
    },

    /// Show the bytes a job would send, without printing
    Encode {
        /// Text to encode
        #[arg(long, conflicts_with = "image")]
        text: Option<String>,

        /// Image to encode
        #[arg(long, value_name = "FILE")]
        image: Option<PathBuf>,

        #[arg(long)]
        fit: bool,

        /// Write raw bytes to this file instead of a hex dump
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Write the active settings to the config file
    InitConfig,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::debug!(error = %e, "command failed");
            eprintln!("{}", output::human(&humanize_error(&e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let services = AppServices::init(&ServiceOptions {
        offline: cli.offline,
        config_path: cli.config,
    })?;
    let session = services.session();

    match cli.command {
        Commands::Devices { json } => {
            session.refresh_paired()?;
            let devices = session.devices();
            if json {
                println!("{}", output::json(&devices));
            } else {
                print!("{}", output::device_table(&devices));
            }
        }

        Commands::Scan { json, timeout } => {
            let mut scan = session.start_scan()?;
            let listen = async {
                while let Some(endpoint) = scan.next_device().await {
                    if !json {
                        println!("found {endpoint}");
                    }
                }
            };
            let completed = match timeout {
                Some(secs) => tokio::time::timeout(Duration::from_secs(secs), listen)
                    .await
                    .is_ok(),
                None => {
                    listen.await;
                    true
                }
            };

            let message = if completed {
                scan.finished().await?.message()
            } else {
                session.cancel_scan()?;
                scan.abort();
                format!("Scan stopped after {}s", timeout.unwrap_or_default())
            };
            if json {
                println!("{}", output::json(&session.devices()));
            } else {
                println!("{message}");
                print!("{}", output::device_table(&session.devices()));
            }
        }

        Commands::PrintText { text, printer } => {
            let body = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            services.choose_printer(printer.as_deref())?;
            return Ok(report(session.print_text(&body).await));
        }

        Commands::PrintImage { path, printer, fit } => {
            let pixels = image_loader::load_pixels(&path, &session.config().profile, fit)?;
            services.choose_printer(printer.as_deref())?;
            return Ok(report(session.print_image(pixels).await));
        }

        Commands::Encode {
            text,
            image,
            fit,
            output: out_path,
        } => {
            let payload = match (text, image) {
                (_, Some(path)) => Payload::Image(image_loader::load_pixels(
                    &path,
                    &session.config().profile,
                    fit,
                )?),
                (Some(text), None) => Payload::Text(text),
                (None, None) => Payload::Text(read_stdin()?),
            };
            let bytes = session.encoder().encode(&payload)?;
            match out_path {
                Some(path) => {
                    std::fs::write(&path, &bytes)?;
                    eprintln!("wrote {} bytes to {}", bytes.len(), path.display());
                }
                None => {
                    std::io::stdout().write_all(output::hex_dump(&bytes).as_bytes())?;
                }
            }
        }

        Commands::InitConfig => {
            services.save_config()?;
            println!("{}", services.config_path().display());
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Print the job status and turn it into an exit code.
fn report(status: PrintStatus) -> ExitCode {
    if status.ok {
        println!("{}", status.message);
        ExitCode::SUCCESS
    } else {
        eprintln!("Print failed: {}", status.message);
        ExitCode::FAILURE
    }
}

fn read_stdin() -> Result<String> {
    let mut body = String::new();
    std::io::stdin().read_to_string(&mut body)?;
    if body.trim().is_empty() {
        return Err(TintaError::EmptyText);
    }
    Ok(body)
}
