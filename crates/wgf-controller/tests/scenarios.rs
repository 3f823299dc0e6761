// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Full runs against a temporary state directory.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::TempDir;
use wgf_common_config::{EnvSnapshot, StateFormat, UserInput};
use wgf_controller::{
	ApplyTask, ControllerPhaseOrchestrator, ReportKind, RunState, WireguardApplySubscriber,
};
use wgf_jobs::{DelayedTaskScheduler, TaskStatus};
use wgf_state::{Event, EventKind, InterfaceState, SubscriberError, WgKeyPair};
use wgf_transform::saver::{JsonFileSaver, TextFileSaver};
use wgf_transform::{
	ConfigMap, ConfigurationSaver, Digester, LockMode, SaveError, SaverRegistry, SigningSaver,
};

type EventLog = Arc<Mutex<Vec<(EventKind, String, u64)>>>;

struct Fixture {
	_root: TempDir,
	sources: PathBuf,
	state: PathBuf,
	public_key: String,
}

impl Fixture {
	fn new() -> Self {
		let root = TempDir::new().unwrap();
		let sources = root.path().join("sources");
		let state = root.path().join("state");
		std::fs::create_dir_all(&sources).unwrap();
		Self {
			_root: root,
			sources,
			state,
			public_key: WgKeyPair::generate().public.to_base64(),
		}
	}

	fn input(&self) -> UserInput {
		let mut input = UserInput::with_state_dir(&self.state);
		input.source_dirs = vec![self.sources.clone()];
		input
	}

	fn write_source(&self, file: &str, interface: &str, port: u16) {
		let body = json!({
			"interface": interface,
			"public_key": self.public_key,
			"listen_port": port,
			"peers": [],
		});
		std::fs::write(self.sources.join(file), body.to_string()).unwrap();
	}

	fn state_file(&self, name: &str) -> PathBuf {
		self.state.join(name)
	}

	async fn run_with(&self, input: &UserInput, setup: impl FnOnce(&mut RunState)) -> (RunState, EventLog) {
		let mut state = RunState::new(input, EnvSnapshot::default(), Arc::new(DelayedTaskScheduler::new()));
		let log: EventLog = Arc::new(Mutex::new(Vec::new()));
		for kind in EventKind::ALL {
			let log = Arc::clone(&log);
			state.dispatcher.subscribe_fn(kind, "recorder", move |event: &Event| {
				log.lock().unwrap().push((
					event.kind(),
					event.interface().to_string(),
					event.configuration().revision,
				));
				Ok(())
			});
		}
		setup(&mut state);

		ControllerPhaseOrchestrator::with_defaults(LockMode::Exclusive)
			.run(input, &mut state)
			.await
			.unwrap();
		(state, log)
	}

	async fn run(&self) -> (RunState, EventLog) {
		self.run_with(&self.input(), |_| {}).await
	}
}

fn kinds(log: &EventLog) -> Vec<EventKind> {
	log.lock().unwrap().iter().map(|(kind, _, _)| *kind).collect()
}

fn read_json(path: &Path) -> Value {
	serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn new_source_creates_interface_at_revision_zero() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);

	let (state, log) = fx.run().await;

	assert_eq!(
		kinds(&log),
		vec![
			EventKind::ConfigurationFileLoaded,
			EventKind::BeforeCreate,
			EventKind::Created
		]
	);
	assert!(log.lock().unwrap().iter().all(|(_, name, rev)| name == "wg0" && *rev == 0));
	assert_eq!(state.table.state("wg0"), InterfaceState::Persisted);
	assert!(state.report.is_clean(), "{:?}", state.report.entries());

	let persisted = read_json(&fx.state_file("wg0.json"));
	assert_eq!(persisted["revision"], 0);
	assert_eq!(persisted["listen_port"], 51820);
	assert!(fx.state_file("wg0.json.digest").is_file());
}

#[tokio::test]
async fn changed_source_updates_interface_to_next_revision() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	fx.write_source("wg0.json", "wg0", 51821);
	let (state, log) = fx.run().await;

	assert_eq!(
		kinds(&log),
		vec![
			EventKind::ConfigurationFileLoaded,
			EventKind::BeforeUpdate,
			EventKind::Updated
		]
	);
	let updated = log.lock().unwrap().last().cloned().unwrap();
	assert_eq!(updated.2, 1);
	assert!(state.report.is_clean(), "{:?}", state.report.entries());

	let persisted = read_json(&fx.state_file("wg0.json"));
	assert_eq!(persisted["revision"], 1);
	assert_eq!(persisted["listen_port"], 51821);

	fx.write_source("wg0.json", "wg0", 51822);
	fx.run().await;
	assert_eq!(read_json(&fx.state_file("wg0.json"))["revision"], 2);
}

#[tokio::test]
async fn removed_source_deletes_interface_and_its_files() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	std::fs::remove_file(fx.sources.join("wg0.json")).unwrap();
	let (state, log) = fx.run().await;

	assert_eq!(kinds(&log), vec![EventKind::BeforeDelete, EventKind::Deleted]);
	assert_eq!(state.table.state("wg0"), InterfaceState::Absent);
	assert!(!fx.state_file("wg0.json").exists());
	assert!(!fx.state_file("wg0.json.digest").exists());
}

#[tokio::test]
async fn conflicting_sources_keep_first_registered() {
	let fx = Fixture::new();
	fx.write_source("a.json", "wg0", 51820);
	fx.write_source("b.json", "wg0", 51999);

	let (state, _) = fx.run().await;

	assert_eq!(state.report.conflicts().len(), 1);
	let conflict = &state.report.conflicts()[0];
	assert_eq!(conflict.interface, "wg0");
	assert!(conflict.kept.ends_with("a.json"));
	assert!(conflict.ignored.ends_with("b.json"));

	let persisted = read_json(&fx.state_file("wg0.json"));
	assert_eq!(persisted["listen_port"], 51820);
	assert_eq!(state.table.state("wg0"), InterfaceState::Persisted);
}

#[tokio::test]
async fn unchanged_sources_emit_nothing_on_rerun() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.write_source("wg1.json", "wg1", 51821);
	fx.run().await;
	let digest_before = std::fs::read(fx.state_file("wg0.json.digest")).unwrap();

	let (state, log) = fx.run().await;

	assert!(kinds(&log).is_empty());
	assert!(state.report.transitions().is_empty());
	assert!(state.report.is_clean(), "{:?}", state.report.entries());
	assert_eq!(read_json(&fx.state_file("wg0.json"))["revision"], 0);
	assert_eq!(std::fs::read(fx.state_file("wg0.json.digest")).unwrap(), digest_before);
}

#[tokio::test]
async fn failing_before_handler_vetoes_transition() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);

	let (state, log) = fx
		.run_with(&fx.input(), |state| {
			state
				.dispatcher
				.subscribe_fn(EventKind::BeforeCreate, "policy", |_: &Event| {
					Err(SubscriberError::new("not yet"))
				});
		})
		.await;

	assert!(!kinds(&log).contains(&EventKind::Created));
	assert_eq!(state.table.state("wg0"), InterfaceState::Loaded);
	assert_eq!(state.report.entries_of(ReportKind::Handler).count(), 1);
	assert!(!fx.state_file("wg0.json").exists());

	let (_, log) = fx.run().await;
	assert!(kinds(&log).contains(&EventKind::Created));
	assert!(fx.state_file("wg0.json").exists());
}

#[tokio::test]
async fn tampered_state_is_quarantined_not_overwritten() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	let tampered = "{\"interface\":\"wg0\",\"listen_port\":1}";
	std::fs::write(fx.state_file("wg0.json"), tampered).unwrap();
	fx.write_source("wg0.json", "wg0", 51821);

	let (state, log) = fx.run().await;

	assert!(kinds(&log).is_empty());
	assert!(state.quarantined.contains("wg0"));
	assert_eq!(state.report.entries_of(ReportKind::Digest).count(), 1);
	assert_eq!(std::fs::read_to_string(fx.state_file("wg0.json")).unwrap(), tampered);
}

#[tokio::test]
async fn unreadable_source_does_not_delete_its_interface() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	std::fs::write(fx.sources.join("wg0.json"), "{ not json").unwrap();
	let (state, log) = fx.run().await;

	assert!(kinds(&log).is_empty());
	assert_eq!(state.report.entries_of(ReportKind::Load).count(), 1);
	assert_eq!(state.table.state("wg0"), InterfaceState::Persisted);
	assert!(fx.state_file("wg0.json").exists());
}

#[tokio::test]
async fn format_change_moves_state_on_next_transition() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	let mut input = fx.input();
	input.state_format = StateFormat::Toml;
	fx.write_source("wg0.json", "wg0", 51821);
	let (state, _) = fx.run_with(&input, |_| {}).await;

	assert!(state.report.is_clean(), "{:?}", state.report.entries());
	assert!(fx.state_file("wg0.toml").is_file());
	assert!(fx.state_file("wg0.toml.digest").is_file());
	assert!(!fx.state_file("wg0.json").exists());
	assert!(!fx.state_file("wg0.json.digest").exists());
}

#[tokio::test]
async fn apply_tasks_start_after_the_run() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.write_source("wg1.json", "wg1", 51821);
	let input = fx.input();

	let (state, _) = fx
		.run_with(&input, |state| WireguardApplySubscriber::install(&input, state))
		.await;

	assert_eq!(
		state.scheduler.task_ids(),
		vec![ApplyTask::id_for("wg0"), ApplyTask::id_for("wg1")]
	);
	assert!(!state.scheduler.is_started());

	let summary = ControllerPhaseOrchestrator::new().start_tasks(&state).unwrap();
	assert_eq!(summary.started.len(), 2);
	state.scheduler.wait().await;

	let runs = state.scheduler.runs();
	assert_eq!(runs.len(), 2);
	assert!(runs.iter().all(|r| r.status == TaskStatus::Succeeded));
}

#[tokio::test]
async fn declared_source_no_loader_reads_is_reported_and_kept() {
	let fx = Fixture::new();
	let declared = fx.sources.parent().unwrap().join("declared");
	std::fs::create_dir_all(&declared).unwrap();
	let json_source = declared.join("wg0.json");
	std::fs::write(
		&json_source,
		json!({ "interface": "wg0", "public_key": fx.public_key, "listen_port": 51820, "peers": [] })
			.to_string(),
	)
	.unwrap();

	let mut input = fx.input();
	input.sources = vec![json_source.display().to_string()];
	fx.run_with(&input, |_| {}).await;
	assert!(fx.state_file("wg0.json").is_file());

	// The declared file is gone and an unreadable format is declared next to it.
	std::fs::remove_file(&json_source).unwrap();
	let ini_source = declared.join("wg0.ini");
	std::fs::write(&ini_source, "[Interface]\nListenPort = 51820\n").unwrap();
	input.sources.push(ini_source.display().to_string());

	let (state, log) = fx.run_with(&input, |_| {}).await;

	assert!(kinds(&log).is_empty());
	assert_eq!(state.report.entries_of(ReportKind::Load).count(), 2);
	assert!(state.failed_sources.contains(&json_source.display().to_string()));
	assert!(state.failed_sources.contains(&ini_source.display().to_string()));
	assert_eq!(state.table.state("wg0"), InterfaceState::Persisted);
	assert!(fx.state_file("wg0.json").is_file());
}

#[tokio::test]
async fn source_path_that_is_not_a_file_is_reported() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	std::fs::remove_file(fx.sources.join("wg0.json")).unwrap();
	std::fs::create_dir(fx.sources.join("wg0.json")).unwrap();
	let mut input = fx.input();
	input.sources = vec![fx.sources.join("wg0.json").display().to_string()];

	let (state, log) = fx.run_with(&input, |_| {}).await;

	assert!(kinds(&log).is_empty());
	assert_eq!(state.report.entries_of(ReportKind::Load).count(), 1);
	assert!(fx.state_file("wg0.json").is_file());
}

#[tokio::test]
async fn failed_save_queues_no_apply_and_emits_no_after_event() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;

	fx.write_source("wg0.json", "wg0", 51821);
	let input = fx.input();
	let digest = fx.state_file("wg0.json.digest");
	let (state, log) = fx
		.run_with(&input, |state| {
			WireguardApplySubscriber::install(&input, state);
			// Make the digest unwritable once the update is under way.
			state
				.dispatcher
				.subscribe_fn(EventKind::BeforeUpdate, "blocker", move |_: &Event| {
					std::fs::remove_file(&digest)
						.and_then(|()| std::fs::create_dir_all(digest.join("held")))
						.map_err(|e| SubscriberError::new(e.to_string()))
				});
		})
		.await;

	assert_eq!(state.report.entries_of(ReportKind::Save).count(), 1);
	assert!(state.scheduler.task_ids().is_empty());
	assert!(!kinds(&log).contains(&EventKind::Updated));
	assert!(state.report.transitions().is_empty());
	assert_eq!(read_json(&fx.state_file("wg0.json"))["listen_port"], 51820);
}

struct SlowJsonSaver {
	delay: Duration,
}

#[async_trait]
impl ConfigurationSaver for SlowJsonSaver {
	fn name(&self) -> &'static str {
		"slow-json"
	}

	fn supports(&self, data: &ConfigMap, destination: &Path) -> bool {
		JsonFileSaver.supports(data, destination)
	}

	async fn save(&self, data: &ConfigMap, destination: &Path) -> Result<(), SaveError> {
		tokio::time::sleep(self.delay).await;
		JsonFileSaver.save(data, destination).await
	}
}

fn slow_savers(digester: &Digester) -> SaverRegistry {
	let mut registry = SaverRegistry::new(Duration::from_millis(20));
	registry.register(Arc::new(TextFileSaver));
	registry.register(Arc::new(SigningSaver::new(
		Arc::new(SlowJsonSaver {
			delay: Duration::from_millis(200),
		}),
		digester.clone(),
	)));
	registry
}

#[tokio::test]
async fn timed_out_save_keeps_state_loadable_for_next_run() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	fx.run().await;
	let state_before = std::fs::read(fx.state_file("wg0.json")).unwrap();
	let digest_before = std::fs::read(fx.state_file("wg0.json.digest")).unwrap();

	fx.write_source("wg0.json", "wg0", 51821);
	let (state, log) = fx
		.run_with(&fx.input(), |state| {
			let savers = slow_savers(&state.digester);
			state.state_savers = savers;
		})
		.await;

	assert_eq!(state.report.entries_of(ReportKind::Save).count(), 1);
	assert!(!kinds(&log).contains(&EventKind::Updated));
	assert_eq!(std::fs::read(fx.state_file("wg0.json")).unwrap(), state_before);
	assert_eq!(std::fs::read(fx.state_file("wg0.json.digest")).unwrap(), digest_before);

	let (state, log) = fx.run().await;
	assert!(state.quarantined.is_empty());
	assert!(kinds(&log).contains(&EventKind::Updated));
	assert_eq!(read_json(&fx.state_file("wg0.json"))["revision"], 1);
}

#[tokio::test]
async fn root_passphrase_seals_state_across_runs() {
	let fx = Fixture::new();
	fx.write_source("wg0.json", "wg0", 51820);
	let mut input = fx.input();
	input.root_passphrase_command = Some("echo correct-horse".to_string());

	let (state, _) = fx.run_with(&input, |_| {}).await;
	assert!(state.report.is_clean(), "{:?}", state.report.entries());
	let sealed = read_json(&fx.state_file("wg0.json"));
	assert!(sealed.get("listen_port").is_none());
	assert!(sealed.get(wgf_transform::encryption::ENVELOPE_KEY).is_some());

	fx.write_source("wg0.json", "wg0", 51821);
	let (state, log) = fx.run_with(&input, |_| {}).await;
	assert!(state.report.is_clean(), "{:?}", state.report.entries());
	assert!(kinds(&log).contains(&EventKind::Updated));

	// Without the passphrase the sealed state cannot be read and is left alone.
	let (state, _) = fx.run().await;
	assert!(state.quarantined.contains("wg0"));
	assert_eq!(state.report.entries_of(ReportKind::Load).count(), 1);
}
