use beamsync::config::Config;
use beamsync::error::SyncError;
use beamsync::logging::{self, error};
use beamsync::signal::{setup_signal_handlers, shutdown_channel};
use beamsync::strategies::{AdapterKind, ComparatorKind, FailurePolicy, GitAuthMethod};
use beamsync::Daemon;
use clap::builder::BoolishValueParser;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;

fn cli() -> Command {
	Command::new("beamsync")
		.version(env!("CARGO_PKG_VERSION"))
		.about("One-way content sync from a revision-controlled source tree")
		.arg(
			Arg::new("config")
				.short('c')
				.long("config")
				.env("BEAMSYNC_CONFIG")
				.value_name("FILE")
				.value_parser(value_parser!(PathBuf))
				.help("Configuration file (.toml, otherwise JSON5)"),
		)
		.arg(
			Arg::new("adapter")
				.long("adapter")
				.env("BEAMSYNC_ADAPTER")
				.value_parser(|s: &str| s.parse::<AdapterKind>())
				.help("Source adapter [git]"),
		)
		.arg(
			Arg::new("comparator")
				.long("comparator")
				.env("BEAMSYNC_COMPARATOR")
				.value_parser(|s: &str| s.parse::<ComparatorKind>())
				.help("File comparator [xxh3, md5, sha256, blake3]"),
		)
		.arg(
			Arg::new("template-extension")
				.long("template-extension")
				.env("BEAMSYNC_TEMPLATE_EXTENSIONS")
				.value_name("EXT")
				.value_delimiter(',')
				.action(ArgAction::Append)
				.help("Extension of files rendered as templates (repeatable)"),
		)
		.arg(
			Arg::new("sync-delete")
				.long("sync-delete")
				.env("BEAMSYNC_SYNC_DELETE")
				.action(ArgAction::SetTrue)
				.help("Delete target files removed upstream"),
		)
		.arg(
			Arg::new("sync-delete-empty-directories")
				.long("sync-delete-empty-directories")
				.env("BEAMSYNC_SYNC_DELETE_EMPTY_DIRECTORIES")
				.value_name("BOOL")
				.value_parser(BoolishValueParser::new())
				.num_args(0..=1)
				.default_missing_value("true")
				.help("Remove directories left empty by a deletion [default: true]"),
		)
		.arg(
			Arg::new("force-sync")
				.long("force-sync")
				.env("BEAMSYNC_FORCE_SYNC")
				.action(ArgAction::SetTrue)
				.help("Run the workflow and deletions even if nothing changed"),
		)
		.arg(
			Arg::new("force-workflow")
				.long("force-workflow")
				.env("BEAMSYNC_FORCE_WORKFLOW")
				.action(ArgAction::SetTrue)
				.help("Run the workflow even if nothing changed"),
		)
		.arg(
			Arg::new("interval")
				.short('i')
				.long("interval")
				.env("BEAMSYNC_INTERVAL")
				.help("Time between runs (e.g. 30s, 5m) [default: 5s]"),
		)
		.arg(
			Arg::new("once")
				.long("once")
				.env("BEAMSYNC_ONCE")
				.action(ArgAction::SetTrue)
				.help("Run once and exit"),
		)
		.arg(
			Arg::new("on-failure")
				.long("on-failure")
				.env("BEAMSYNC_ON_FAILURE")
				.value_parser(|s: &str| s.parse::<FailurePolicy>())
				.help("What to do after a failed run in loop mode [continue, exit]"),
		)
		.arg(Arg::new("ignore-file").long("ignore-file").env("BEAMSYNC_IGNORE_FILE"))
		.arg(Arg::new("lock-file").long("lock-file").env("BEAMSYNC_LOCK_FILE"))
		.arg(Arg::new("state-file").long("state-file").env("BEAMSYNC_STATE_FILE"))
		.arg(
			Arg::new("target-directory")
				.short('t')
				.long("target-directory")
				.env("BEAMSYNC_TARGET_DIRECTORY")
				.value_parser(value_parser!(PathBuf))
				.help("Directory to synchronize into"),
		)
		.arg(
			Arg::new("root-directory")
				.long("root-directory")
				.env("BEAMSYNC_ROOT_DIRECTORY")
				.value_parser(value_parser!(PathBuf))
				.help("Project root inside the source tree [default: /]"),
		)
		.arg(
			Arg::new("working-directory")
				.short('w')
				.long("working-directory")
				.env("BEAMSYNC_WORKING_DIRECTORY")
				.value_parser(value_parser!(PathBuf))
				.help("Where the adapter keeps its working copy [default: /tmp/beamsync]"),
		)
		.arg(
			Arg::new("concurrency")
				.short('j')
				.long("concurrency")
				.env("BEAMSYNC_CONCURRENCY")
				.value_parser(value_parser!(usize))
				.help("Reconciliation workers, 0 = number of CPUs"),
		)
		.arg(
			Arg::new("log-level")
				.long("log-level")
				.env("BEAMSYNC_LOG_LEVEL")
				.help("Log level when RUST_LOG is unset [default: info]"),
		)
		.arg(
			Arg::new("git-repository")
				.long("git-repository")
				.env("BEAMSYNC_GIT_REPOSITORY")
				.help("Repository to clone"),
		)
		.arg(
			Arg::new("git-branch")
				.long("git-branch")
				.env("BEAMSYNC_GIT_BRANCH")
				.help("Branch to follow [default: HEAD]"),
		)
		.arg(
			Arg::new("git-auth-method")
				.long("git-auth-method")
				.env("BEAMSYNC_GIT_AUTH_METHOD")
				.value_parser(|s: &str| s.parse::<GitAuthMethod>())
				.help("Authentication method [none, ssh]"),
		)
		.arg(
			Arg::new("git-ssh-private-key")
				.long("git-ssh-private-key")
				.env("BEAMSYNC_GIT_SSH_PRIVATE_KEY")
				.hide_env_values(true)
				.help("SSH private key file, or the key itself base64-encoded"),
		)
		.arg(
			Arg::new("git-ssh-private-key-password")
				.long("git-ssh-private-key-password")
				.env("BEAMSYNC_GIT_SSH_PRIVATE_KEY_PASSWORD")
				.hide_env_values(true)
				.help("Passphrase of the SSH private key"),
		)
}

/// Defaults, then the config file, then environment and CLI values
fn build_config(matches: &ArgMatches) -> Result<Config, SyncError> {
	let mut config = match matches.get_one::<PathBuf>("config") {
		Some(path) => Config::load(path)?,
		None => Config::default(),
	};

	let string = |name: &str| matches.get_one::<String>(name).cloned();
	let path = |name: &str| matches.get_one::<PathBuf>(name).cloned();

	if let Some(v) = matches.get_one::<AdapterKind>("adapter") {
		config.adapter = *v;
	}
	if let Some(v) = matches.get_one::<ComparatorKind>("comparator") {
		config.comparator = *v;
	}
	if let Some(v) = matches.get_many::<String>("template-extension") {
		config.template_extensions = v.cloned().collect();
	}
	if matches.get_flag("sync-delete") {
		config.sync_delete = true;
	}
	if let Some(v) = matches.get_one::<bool>("sync-delete-empty-directories") {
		config.sync_delete_empty_directories = *v;
	}
	if matches.get_flag("force-sync") {
		config.force_sync = true;
	}
	if matches.get_flag("force-workflow") {
		config.force_workflow = true;
	}
	if let Some(v) = string("interval") {
		config.interval = v;
	}
	if matches.get_flag("once") {
		config.once = true;
	}
	if let Some(v) = matches.get_one::<FailurePolicy>("on-failure") {
		config.on_failure = *v;
	}
	if let Some(v) = string("ignore-file") {
		config.ignore_file = v;
	}
	if let Some(v) = string("lock-file") {
		config.lock_file = v;
	}
	if let Some(v) = string("state-file") {
		config.state_file = v;
	}
	if let Some(v) = path("target-directory") {
		config.target_directory = v;
	}
	if let Some(v) = path("root-directory") {
		config.root_directory = v;
	}
	if let Some(v) = path("working-directory") {
		config.working_directory = v;
	}
	if let Some(v) = matches.get_one::<usize>("concurrency") {
		config.concurrency = *v;
	}
	if let Some(v) = string("log-level") {
		config.log_level = v;
	}
	if let Some(v) = string("git-repository") {
		config.git.repository = v;
	}
	if let Some(v) = string("git-branch") {
		config.git.branch = v;
	}
	if let Some(v) = matches.get_one::<GitAuthMethod>("git-auth-method") {
		config.git.auth_method = *v;
	}
	if let Some(v) = string("git-ssh-private-key") {
		config.git.ssh_private_key = Some(v);
	}
	if let Some(v) = string("git-ssh-private-key-password") {
		config.git.ssh_private_key_password = Some(v);
	}

	Ok(config)
}

#[tokio::main]
async fn main() {
	let matches = cli().get_matches();

	let config = match build_config(&matches) {
		Ok(config) => config,
		Err(e) => {
			eprintln!("{}", e);
			std::process::exit(2);
		}
	};

	logging::init_tracing(&config.log_level);

	let mut daemon = match Daemon::from_config(config) {
		Ok(daemon) => daemon,
		Err(e) => {
			error!("{}", e);
			std::process::exit(2);
		}
	};

	let (shutdown_tx, shutdown_rx) = shutdown_channel();
	setup_signal_handlers(shutdown_tx);

	if let Err(e) = daemon.run(shutdown_rx).await {
		error!("{}", e);
		std::process::exit(1);
	}
}


// vim: ts=4
