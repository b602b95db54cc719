use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use hcomsync::config::Config;
use hcomsync::deploy::{locate_application, DeployFilter, Deployer};
use hcomsync::logging::*;
use hcomsync::progress::CliProgress;
use hcomsync::protocol::HcomClient;
use hcomsync::transport::Route;

///////////////////////
// Utility functions //
///////////////////////

fn load_config(matches: &ArgMatches) -> Result<Config, Box<dyn Error>> {
	let mut config = match matches.get_one::<PathBuf>("config") {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};
	if let Some(route) = matches.get_one::<String>("route") {
		config.route = Some(route.clone());
	}
	match matches.get_count("verbose") {
		0 => {}
		1 => config.log_level = "debug".to_string(),
		_ => config.log_level = "trace".to_string(),
	}
	config.validate()?;
	Ok(config)
}

fn cancel_on_ctrl_c() -> CancellationToken {
	let cancel = CancellationToken::new();
	let token = cancel.clone();
	tokio::spawn(async move {
		if tokio::signal::ctrl_c().await.is_ok() {
			warn!("Interrupted, cancelling");
			token.cancel();
		}
	});
	cancel
}

fn cli() -> Command {
	Command::new("hcomsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("HCOM device client and CRC-based application deploy")
		.subcommand_required(true)
		.arg(
			Arg::new("route")
				.short('r')
				.long("route")
				.value_name("ROUTE")
				.global(true)
				.help("Device route: serial port, serial://<port> or tcp://host:port"),
		)
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.value_name("FILE")
				.global(true)
				.value_parser(value_parser!(PathBuf))
				.help("Config file (.toml, .json or .json5)"),
		)
		.arg(
			Arg::new("verbose")
				.short('v')
				.long("verbose")
				.global(true)
				.action(ArgAction::Count)
				.help("More logging (-v debug, -vv trace)"),
		)
		.arg(
			Arg::new("json")
				.long("json")
				.global(true)
				.action(ArgAction::SetTrue)
				.help("Print results as JSON"),
		)
		.arg(
			Arg::new("trace")
				.long("show-trace")
				.global(true)
				.action(ArgAction::SetTrue)
				.help("Print device trace output"),
		)
		.subcommand(Command::new("info").about("Show device information"))
		.subcommand(
			Command::new("files").about("List device files").arg(
				Arg::new("crc").long("crc").action(ArgAction::SetTrue).help("Include CRCs"),
			),
		)
		.subcommand(
			Command::new("deploy")
				.about("Deploy an application build")
				.arg(Arg::new("path").required(true).value_parser(value_parser!(PathBuf)))
				.arg(
					Arg::new("postlink")
						.long("postlink")
						.action(ArgAction::SetTrue)
						.help("Prefer post-link output"),
				)
				.arg(
					Arg::new("pdbs")
						.long("include-pdbs")
						.action(ArgAction::SetTrue)
						.help("Deploy debug symbols"),
				)
				.arg(
					Arg::new("additional")
						.long("additional")
						.value_name("DIR")
						.value_parser(value_parser!(PathBuf))
						.help("Folder with extra content files (configs, data)"),
				)
				.arg(
					Arg::new("dependency")
						.long("dep")
						.value_name("FILE")
						.action(ArgAction::Append)
						.value_parser(value_parser!(PathBuf))
						.help("Dependency assembly; binary folder files take precedence"),
				),
		)
		.subcommand(
			Command::new("delete")
				.about("Delete device files")
				.arg(Arg::new("name").required(true).action(ArgAction::Append).num_args(1..)),
		)
		.subcommand(
			Command::new("read")
				.about("Copy a device file to the host")
				.arg(Arg::new("name").required(true))
				.arg(Arg::new("dest").value_parser(value_parser!(PathBuf))),
		)
		.subcommand(Command::new("erase").about("Erase the whole device flash"))
		.subcommand(
			Command::new("runtime").about("Control the on-device runtime").arg(
				Arg::new("action").required(true).value_parser(["enable", "disable", "state"]),
			),
		)
		.subcommand(Command::new("restart").about("Restart the device"))
		.subcommand(
			Command::new("trace-level")
				.about("Set the device trace level")
				.arg(Arg::new("level").required(true).value_parser(value_parser!(u16))),
		)
		.subcommand(Command::new("listen").about("Print device output until interrupted"))
}

async fn run(
	client: &HcomClient,
	config: &Config,
	matches: &ArgMatches,
	progress: Arc<CliProgress>,
	cancel: &CancellationToken,
) -> Result<(), Box<dyn Error>> {
	let json = matches.get_flag("json");
	match matches.subcommand() {
		Some(("info", _)) => {
			let info = client.get_device_info(cancel).await?;
			if json {
				println!("{}", serde_json::to_string_pretty(&info)?);
			} else {
				print!("{}", info);
			}
		}
		Some(("files", sub)) => {
			let files = client.get_file_list(sub.get_flag("crc"), cancel).await?;
			if json {
				println!("{}", serde_json::to_string_pretty(&files)?);
			} else {
				for file in &files {
					println!("{}", file.to_wire_text());
				}
				eprintln!("{} files", files.len());
			}
		}
		Some(("deploy", sub)) => {
			let path = sub.get_one::<PathBuf>("path").ok_or("deploy: path argument required")?;
			let app = locate_application(path, sub.get_flag("postlink") || config.prefer_postlink)?;
			let filter = DeployFilter::from_config(config)?
				.with_pdbs(config.include_pdbs || sub.get_flag("pdbs"));
			let additional = sub
				.get_one::<PathBuf>("additional")
				.map(PathBuf::as_path)
				.or_else(|| (app.binary_dir != app.app_dir).then(|| app.app_dir.as_path()));
			let dependencies: Vec<PathBuf> =
				sub.get_many::<PathBuf>("dependency").map(|d| d.cloned().collect()).unwrap_or_default();

			let deployer = Deployer::from_config(config).with_callback(progress);
			let report = deployer
				.deploy_application(client, &app, additional, &dependencies, &filter, cancel)
				.await?;
			if json {
				println!("{}", serde_json::to_string_pretty(&report)?);
			}
			info!(
				"Deploy finished: {} uploaded, {} unchanged, {} deleted, {} retries",
				report.uploaded.len(),
				report.skipped.len(),
				report.deleted.len(),
				report.retries
			);
			for name in &report.missing {
				warn!("{} disappeared before upload", name);
			}
			if !report.is_success() {
				for (name, reason) in &report.failed {
					error!("{}: {}", name, reason);
				}
				return Err(format!("{} file(s) failed to upload", report.failed.len()).into());
			}
		}
		Some(("delete", sub)) => {
			for name in sub.get_many::<String>("name").ok_or("delete: name argument required")? {
				client.delete_file(name, cancel).await?;
				info!("Deleted {}", name);
			}
		}
		Some(("read", sub)) => {
			let name = sub.get_one::<String>("name").ok_or("read: name argument required")?;
			let dest = sub
				.get_one::<PathBuf>("dest")
				.cloned()
				.unwrap_or_else(|| PathBuf::from(Path::new(name).file_name().unwrap_or(name.as_ref())));
			let size = client.read_file(name, &dest, cancel).await?;
			info!("Read {} ({} bytes) to {}", name, size, dest.display());
		}
		Some(("erase", _)) => {
			info!("Erasing flash, this takes a while");
			client.erase_flash(cancel).await?;
			info!("Flash erased");
		}
		Some(("runtime", sub)) => match sub.get_one::<String>("action").map(String::as_str) {
			Some("enable") => client.runtime_enable(cancel).await?,
			Some("disable") => client.runtime_disable(cancel).await?,
			_ => {
				let enabled = client.is_runtime_enabled(cancel).await?;
				println!("Runtime {}", if enabled { "enabled" } else { "disabled" });
			}
		},
		Some(("restart", _)) => client.restart_device(cancel).await?,
		Some(("trace-level", sub)) => {
			let level = *sub.get_one::<u16>("level").ok_or("trace-level: level argument required")?;
			client.set_trace_level(level, cancel).await?;
		}
		Some(("listen", _)) => {
			client.trace_to_host(true, cancel).await?;
			info!("Listening, Ctrl-C to stop");
			cancel.cancelled().await;
		}
		_ => {}
	}
	Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	let matches = cli().get_matches();
	let config = load_config(&matches)?;
	init_tracing(&config.log_level);

	let route: Route = config.route()?.ok_or("no device route: pass --route or set route in config")?;
	let cancel = cancel_on_ctrl_c();

	let client = HcomClient::connect(&route, &config).await?;
	let show_trace = matches.get_flag("trace") || matches.subcommand_name() == Some("listen");
	let progress = Arc::new(CliProgress::new(show_trace));
	let renderer = progress.clone().spawn_device_renderer(client.subscribe());

	let result = run(&client, &config, &matches, progress, &cancel).await;

	client.disconnect().await;
	renderer.abort();
	result
}

// vim: ts=4
