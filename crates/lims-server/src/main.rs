use anyhow::Context;
use clap::{value_parser, Arg, ArgAction, Command};
use lims_core::SyncReport;
use lims_server::{build_service, load_config, logging, serve};
use std::path::PathBuf;

fn cli() -> Command {
    Command::new("lims")
        .version(lims_core::VERSION)
        .about("Lab case tracker: case folders, QR scans and worker attribution")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("TOML config file (environment variables still override it)"),
        )
        .subcommand(Command::new("serve").about("Run the HTTP server (default)"))
        .subcommand(Command::new("regen-qr").about("Regenerate employee QRs and missing case QRs"))
        .subcommand(
            Command::new("sync")
                .about("Mirror every case folder to Dropbox once")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the per-case report as JSON"),
                ),
        )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();

    let config_path = matches.get_one::<PathBuf>("config").cloned();
    let config = load_config(config_path.as_deref())
        .await
        .context("loading configuration")?;
    logging::init(&config.log_file).context("initializing logging")?;

    let service = build_service(&config).await.context("building service")?;

    match matches.subcommand() {
        Some(("regen-qr", _)) => {
            service.startup(false).await;
            println!("QR images written to {}", config.qr_dir.display());
        }
        Some(("sync", args)) => {
            if !service.mirror().is_enabled() {
                anyhow::bail!("dropbox is not configured (DROPBOX_APP_KEY, DROPBOX_APP_SECRET, DROPBOX_REFRESH_TOKEN)");
            }
            let reports = service.mirror().sync_all(service.store()).await;
            if args.get_flag("json") {
                let rows: Vec<_> = reports
                    .iter()
                    .map(|(case, report)| {
                        serde_json::json!({
                            "case": case,
                            "uploaded": report.uploaded(),
                            "clean": report.is_clean(),
                        })
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                for (case, report) in &reports {
                    match report {
                        SyncReport::Completed { uploaded, failed } => {
                            println!("{case}: {uploaded} uploaded, {failed} failed");
                        }
                        SyncReport::Skipped { reason } => println!("{case}: skipped ({reason})"),
                    }
                }
            }
            if reports.iter().any(|(_, r)| !r.is_clean()) {
                std::process::exit(1);
            }
        }
        _ => serve(&config, service).await.context("serving")?,
    }
    Ok(())
}
