//! CLI command definitions and handlers.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, bail};
use tokio_util::sync::CancellationToken;

use crate::config::MountConfig;
use crate::exec::ShellExecutor;
use crate::plan::{MountPlan, MountTarget, PartitionRef};
use crate::report::{ConsoleReporter, Reporter};
use crate::session::TeardownReport;
use crate::step::{GeneratedData, MountImageStep, StepAction};

/// Environment variable holding the mount root for `armount exec`.
pub const ROOT_ENV: &str = "ARMOUNT_ROOT";

/// armount - mount a disk image's partitions in order, with optional overlay
#[derive(Parser)]
#[command(name = "armount")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Mount configuration file (.toml, .yaml or .json)
    #[arg(short, long, global = true, env = "ARMOUNT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Partitions and their declared targets.
#[derive(Args, Debug, Clone)]
pub struct LayoutArgs {
    /// Partition device, in partition-table order (repeatable)
    #[arg(short, long = "partition", value_name = "DEVICE", required = true)]
    pub partitions: Vec<String>,

    /// Absolute target (e.g. /boot) for the partition at the same position;
    /// "" leaves it unmounted. Overrides image_mounts from the config file.
    #[arg(short, long = "mount", value_name = "TARGET")]
    pub mounts: Vec<String>,
}

/// Options for commands that mount.
#[derive(Args, Debug, Clone)]
pub struct SessionArgs {
    /// Partition layout.
    #[command(flatten)]
    pub layout: LayoutArgs,

    /// Mount root [default: fresh temporary directory]
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Compose an overlay and archive its upper layer to PATH.tar.gz on teardown
    #[arg(long, value_name = "PATH")]
    pub overlay: Option<PathBuf>,

    /// Generated-data key holding the mount root
    #[arg(long)]
    pub generated_data_key: Option<String>,

    /// Fail instead of creating missing mountpoint directories
    #[arg(long)]
    pub no_create_mountpoints: bool,
}

/// armount commands.
#[derive(Subcommand)]
pub enum Commands {
    /// Print the order partitions would be mounted in
    Plan {
        /// Partition layout.
        #[command(flatten)]
        layout: LayoutArgs,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Mount the image and hold it until interrupted
    Mount {
        /// Mount options.
        #[command(flatten)]
        session: SessionArgs,
    },

    /// Mount the image, run a command against it, then unmount
    Exec {
        /// Mount options.
        #[command(flatten)]
        session: SessionArgs,

        /// Command to run; the mount root is in $ARMOUNT_ROOT
        #[arg(last = true, required = true, value_name = "COMMAND")]
        command: Vec<String>,
    },
}

impl Cli {
    /// Execute the CLI command.
    pub async fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => MountConfig::from_file(path)?,
            None => MountConfig::default(),
        };

        match self.command {
            Commands::Plan { layout, json } => print_plan(config, &layout, json),
            Commands::Mount { session } => mount(config, session).await,
            Commands::Exec { session, command } => exec(config, session, command).await,
        }
    }
}

impl LayoutArgs {
    fn partition_refs(&self) -> Vec<PartitionRef> {
        self.partitions.iter().map(|p| PartitionRef::new(p.as_str())).collect()
    }

    fn apply(&self, config: &mut MountConfig) {
        if !self.mounts.is_empty() {
            config.image_mounts = self.mounts.iter().map(|m| MountTarget::new(m.as_str())).collect();
        }
    }
}

impl SessionArgs {
    fn apply(&self, mut config: MountConfig) -> MountConfig {
        self.layout.apply(&mut config);
        if let Some(root) = &self.root {
            config.mount_path = Some(root.clone());
        }
        if let Some(overlay) = &self.overlay {
            config.overlay_path = Some(overlay.clone());
        }
        if let Some(key) = &self.generated_data_key {
            config.generated_data_key.clone_from(key);
        }
        if self.no_create_mountpoints {
            config.create_mountpoints = false;
        }
        config
    }
}

fn print_plan(mut config: MountConfig, layout: &LayoutArgs, json: bool) -> Result<()> {
    layout.apply(&mut config);
    config.validate()?;
    let plan = MountPlan::new(&layout.partition_refs(), &config.image_mounts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        for entry in &plan {
            println!("{}\t{}", entry.target, entry.partition);
        }
    }
    Ok(())
}

/// Cancel `cancel` on the first Ctrl-C.
fn cancel_on_interrupt(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Interrupted, unmounting");
                cancel.cancel();
            }
            Err(e) => tracing::warn!(error = %e, "Cannot listen for Ctrl-C"),
        }
    });
}

fn new_step(config: MountConfig) -> MountImageStep {
    MountImageStep::new(config, Arc::new(ShellExecutor), Arc::new(ConsoleReporter))
}

fn summarize(report: &TeardownReport) {
    let reporter = ConsoleReporter;
    for step in report.steps() {
        match &step.outcome {
            Ok(()) => reporter.message(&format!("{}: done", step.action)),
            Err(reason) => reporter.message(&format!("{}: failed ({reason})", step.action)),
        }
    }
    if !report.is_clean() {
        tracing::warn!(
            failures = report.failures().len(),
            "Teardown incomplete; inspect the mount root before reusing it"
        );
    }
}

async fn mount(config: MountConfig, args: SessionArgs) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let partitions = args.layout.partition_refs();
    let mut step = new_step(args.apply(config));
    let mut generated = GeneratedData::new();

    let action = step.run(&partitions, &mut generated, &cancel).await;
    if let (StepAction::Continue, Some(artifact)) = (action, step.artifact()) {
        println!("{}", artifact.root.display());
        ConsoleReporter.say("Mounted; press Ctrl-C to unmount");
        cancel.cancelled().await;
    }

    let report = step.cleanup().await;
    summarize(&report);

    if action == StepAction::Halt {
        bail!("mount step halted");
    }
    Ok(())
}

async fn exec(config: MountConfig, args: SessionArgs, command: Vec<String>) -> Result<()> {
    let cancel = CancellationToken::new();
    cancel_on_interrupt(cancel.clone());

    let partitions = args.layout.partition_refs();
    let mut step = new_step(args.apply(config));
    let mut generated = GeneratedData::new();

    let action = step.run(&partitions, &mut generated, &cancel).await;
    let status = match (action, step.artifact()) {
        (StepAction::Continue, Some(artifact)) => {
            let (program, rest) = command
                .split_first()
                .ok_or_else(|| color_eyre::eyre::eyre!("no command given"))?;
            tracing::info!(command = %command.join(" "), root = %artifact.root.display(), "Running command");

            let mut child = tokio::process::Command::new(program);
            child
                .args(rest)
                .env(ROOT_ENV, &artifact.root)
                .kill_on_drop(true);
            tokio::select! {
                status = child.status() => Some(status),
                () = cancel.cancelled() => None,
            }
        }
        _ => None,
    };

    let report = step.cleanup().await;
    summarize(&report);

    if action == StepAction::Halt {
        bail!("mount step halted");
    }
    match status {
        None => bail!("interrupted"),
        Some(status) => {
            let status = status?;
            if !status.success() {
                bail!("`{}` exited with {status}", command.join(" "));
            }
        }
    }
    Ok(())
}
