// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! wg-federation - WireGuard federation configuration control plane
//!
//! Resolves user input, runs the BASELINE, MAIN and LATE controller phases
//! against the state directory and then starts the delayed tasks (apply
//! commands, digest audits) registered during the run.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use wgf_common_config::{
	option, resolve_user_input, ConfigError, EnvSnapshot, InputLayer, LogFormat, LogLevel, UserInput,
	OPTIONS,
};
use wgf_controller::{ControllerPhaseOrchestrator, RunState, WireguardApplySubscriber};
use wgf_jobs::DelayedTaskScheduler;
use wgf_state::WgKeyPair;
use wgf_transform::LockMode;

const EXIT_BASELINE_FAILED: u8 = 1;
const EXIT_INPUT_INVALID: u8 = 2;

/// wg-federation - keep WireGuard interface configuration in step with its sources
#[derive(Parser, Debug)]
#[command(name = "wg-federation", version, about, long_about = None)]
struct Args {
	/// Path to a configuration file, replacing the user-level one
	#[arg(short, long, global = true)]
	config: Option<PathBuf>,

	#[command(flatten)]
	options: OptionArgs,

	#[command(subcommand)]
	command: Command,
}

/// Flags for the option table. Values stay raw here and are checked by the
/// table when the layer is built.
#[derive(clap::Args, Debug, Default)]
struct OptionArgs {
	#[arg(short = 'd', long = "state-dir", global = true, help = option::STATE_DIR.description)]
	state_dir: Option<String>,

	#[arg(short = 's', long = "source-dir", global = true, help = option::SOURCE_DIRS.description)]
	source_dirs: Vec<String>,

	#[arg(long = "source", global = true, help = option::SOURCES.description)]
	sources: Vec<String>,

	#[arg(long = "state-format", global = true, help = option::STATE_FORMAT.description)]
	state_format: Option<String>,

	#[arg(long = "io-timeout", global = true, help = option::IO_TIMEOUT_SECS.description)]
	io_timeout: Option<String>,

	#[arg(short = 'l', long = "log-level", global = true, help = option::LOG_LEVEL.description)]
	log_level: Option<String>,

	#[arg(long = "log-format", global = true, help = option::LOG_FORMAT.description)]
	log_format: Option<String>,

	#[arg(
		long = "private-key-retrieval-method",
		global = true,
		help = option::PRIVATE_KEY_RETRIEVAL_METHOD.description
	)]
	private_key_retrieval_method: Option<String>,

	#[arg(
		long = "root-passphrase-command",
		global = true,
		help = option::ROOT_PASSPHRASE_COMMAND.description
	)]
	root_passphrase_command: Option<String>,

	#[arg(long = "apply-command", global = true, help = option::APPLY_COMMAND.description)]
	apply_command: Option<String>,

	#[arg(long = "audit-interval", global = true, help = option::AUDIT_INTERVAL_SECS.description)]
	audit_interval: Option<String>,
}

impl OptionArgs {
	fn into_layer(self) -> Result<InputLayer, ConfigError> {
		let mut layer = InputLayer::default();

		let scalars = [
			(option::STATE_DIR.name, self.state_dir),
			(option::STATE_FORMAT.name, self.state_format),
			(option::IO_TIMEOUT_SECS.name, self.io_timeout),
			(option::LOG_LEVEL.name, self.log_level),
			(option::LOG_FORMAT.name, self.log_format),
			(
				option::PRIVATE_KEY_RETRIEVAL_METHOD.name,
				self.private_key_retrieval_method,
			),
			(option::ROOT_PASSPHRASE_COMMAND.name, self.root_passphrase_command),
			(option::APPLY_COMMAND.name, self.apply_command),
			(option::AUDIT_INTERVAL_SECS.name, self.audit_interval),
		];
		for (name, value) in scalars {
			if let Some(raw) = value {
				layer.set_raw(name, &raw)?;
			}
		}

		// Repeated flags; each occurrence may itself be a comma separated list.
		if !self.source_dirs.is_empty() {
			layer.set_raw(option::SOURCE_DIRS.name, &self.source_dirs.join(","))?;
		}
		if !self.sources.is_empty() {
			layer.set_raw(option::SOURCES.name, &self.sources.join(","))?;
		}

		Ok(layer)
	}
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run every phase, then the delayed tasks. With periodic tasks, keep
	/// running until Ctrl-C.
	Run,
	/// Validate input, sources and the state directory lock, then exit
	Check,
	/// Print a new WireGuard key pair
	Keygen,
	/// List every option with its flag, environment variable and default
	Options,
}

#[tokio::main]
async fn main() -> ExitCode {
	let args = Args::parse();
	match run(args).await {
		Ok(code) => code,
		Err(e) => {
			error!(error = %e, "wg-federation failed");
			eprintln!("Error: {e:#}");
			ExitCode::FAILURE
		}
	}
}

async fn run(args: Args) -> Result<ExitCode> {
	match args.command {
		Command::Keygen => {
			keygen();
			return Ok(ExitCode::SUCCESS);
		}
		Command::Options => {
			print_options();
			return Ok(ExitCode::SUCCESS);
		}
		Command::Run | Command::Check => {}
	}

	let env = EnvSnapshot::capture();
	let input = match args
		.options
		.into_layer()
		.and_then(|layer| resolve_user_input(env.clone(), args.config, layer))
	{
		Ok(input) => input,
		Err(e) => {
			eprintln!("Error: {e}");
			return Ok(ExitCode::from(EXIT_INPUT_INVALID));
		}
	};

	init_tracing(&input);

	match args.command {
		Command::Check => check(&input, env).await,
		_ => run_phases(&input, env).await,
	}
}

async fn run_phases(input: &UserInput, env: EnvSnapshot) -> Result<ExitCode> {
	let scheduler = Arc::new(DelayedTaskScheduler::new());
	let mut state = RunState::new(input, env, Arc::clone(&scheduler));
	WireguardApplySubscriber::install(input, &mut state);

	let orchestrator = ControllerPhaseOrchestrator::with_defaults(LockMode::Exclusive);
	if let Err(e) = orchestrator.run(input, &mut state).await {
		error!(error = %e, "run aborted before any change was made");
		eprintln!("Error: {e}");
		return Ok(ExitCode::from(EXIT_BASELINE_FAILED));
	}

	let summary = orchestrator
		.start_tasks(&state)
		.context("Failed to start delayed tasks")?;
	for task_id in &summary.failed {
		warn!(task_id = %task_id, "delayed task did not start");
	}
	scheduler.wait().await;

	if scheduler.has_periodic() {
		info!("periodic tasks running, press Ctrl-C to stop");
		tokio::signal::ctrl_c()
			.await
			.context("Failed to listen for Ctrl-C")?;
		scheduler.shutdown().await;
	}

	let report = &state.report;
	info!(
		transitions = report.transitions().len(),
		errors = report.entries().len(),
		conflicts = report.conflicts().len(),
		tasks = scheduler.runs().len(),
		"wg-federation finished"
	);
	Ok(ExitCode::SUCCESS)
}

async fn check(input: &UserInput, env: EnvSnapshot) -> Result<ExitCode> {
	let mut state = RunState::new(input, env, Arc::new(DelayedTaskScheduler::new()));
	let orchestrator = ControllerPhaseOrchestrator::with_defaults(LockMode::Shared);

	let result = orchestrator.run_baseline(input, &mut state).await;
	state.release_lock();
	if let Err(e) = result {
		eprintln!("Error: {e}");
		return Ok(ExitCode::from(EXIT_BASELINE_FAILED));
	}

	println!("state directory: {}", input.state_dir.display());
	println!("sources: {}", state.sources.len());
	for source in &state.sources {
		println!("  {source}");
	}
	Ok(ExitCode::SUCCESS)
}

fn keygen() {
	let pair = WgKeyPair::generate();
	println!("private_key = {}", pair.private.to_base64().expose());
	println!("public_key = {}", pair.public.to_base64());
}

fn print_options() {
	for opt in OPTIONS {
		let short = opt.short_flag.map(|c| format!("-{c}, ")).unwrap_or_default();
		println!("{short}{} ({})", opt.cli_alias, opt.env_var());
		println!("    {}", opt.description);
		if let Some(default) = opt.default {
			println!("    default: {default}");
		}
	}
}

/// Default directives when RUST_LOG is unset: the library crates share the
/// `wgf` prefix, the binary logs under its own crate name.
fn default_filter(level: LogLevel) -> String {
	format!("wgf={0},wg_federation={0}", level.as_filter())
}

fn init_tracing(input: &UserInput) {
	let filter = EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| EnvFilter::new(default_filter(input.log_level)));

	match input.log_format {
		LogFormat::Json => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().json().with_writer(std::io::stderr))
				.init();
		}
		LogFormat::Pretty => {
			tracing_subscriber::registry()
				.with(filter)
				.with(fmt::layer().with_writer(std::io::stderr))
				.init();
		}
	}
}
