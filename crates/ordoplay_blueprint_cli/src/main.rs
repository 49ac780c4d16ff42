// SPDX-License-Identifier: MIT OR Apache-2.0
//! `OrdoPlay` blueprint compiler - command-line front end.
//!
//! Compiles a material graph (JSON) into a WGSL module. Nested graphs are
//! resolved below `--library-root`; settings come from `blueprint.ron` next
//! to the graph unless `--settings` names another file. With `--watch` the
//! graph is recompiled whenever a graph or settings file changes.

mod compile;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use compile::CompileJob;
use ordoplay_blueprint::settings::SETTINGS_FILE_NAME;
use ordoplay_blueprint::{CompilerSettings, ErrorPolicy, LinkPolicy};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;
use watch::{GraphWatcher, WatchConfig};

const DEFAULT_LOG_DIRECTIVES: &str = "ordoplay_blueprint=info,ordoplay_blueprint_cli=info";

/// CLI arguments
#[derive(Parser, Debug)]
#[command(name = "ordoplay_blueprint", version)]
#[command(about = "Compile OrdoPlay material graphs to WGSL")]
pub struct Cli {
    /// Graph description to compile
    pub graph: PathBuf,

    /// Compiler settings file (RON)
    #[arg(short, long, env = "ORDOPLAY_BLUEPRINT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// Directory nested graph paths are resolved against
    #[arg(long, env = "ORDOPLAY_BLUEPRINT_LIBRARY")]
    pub library_root: Option<PathBuf>,

    /// Output file for the WGSL module (stdout when omitted)
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// Reject bad links instead of dropping them
    #[arg(long)]
    pub strict_links: bool,

    /// Report every validation error of a root
    #[arg(long, conflicts_with = "abort_on_first")]
    pub collect_all: bool,

    /// Stop validating a root at its first error
    #[arg(long)]
    pub abort_on_first: bool,

    /// Recompile when graph or settings files change
    #[arg(short, long)]
    pub watch: bool,

    /// Log filter, e.g. `debug` or `ordoplay_blueprint=trace`
    #[arg(long, env = "RUST_LOG")]
    pub log_level: Option<String>,
}

impl Cli {
    fn graph_dir(&self) -> PathBuf {
        self.graph
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// File settings, then flag overrides
    pub fn settings(&self) -> Result<CompilerSettings> {
        let mut settings = match &self.settings {
            Some(path) => CompilerSettings::load(path)
                .with_context(|| format!("Failed to load settings {:?}", path))?,
            None => {
                let beside = self.graph_dir().join(SETTINGS_FILE_NAME);
                if beside.is_file() {
                    CompilerSettings::load(&beside)
                        .with_context(|| format!("Failed to load settings {:?}", beside))?
                } else {
                    CompilerSettings::default()
                }
            }
        };

        if self.strict_links {
            settings.link_policy = LinkPolicy::Strict;
        }
        if self.collect_all {
            settings.error_policy = ErrorPolicy::CollectAll;
        }
        if self.abort_on_first {
            settings.error_policy = ErrorPolicy::AbortOnFirst;
        }
        Ok(settings)
    }

    /// Build the compile pass for the current settings
    pub fn job(&self) -> Result<CompileJob> {
        Ok(CompileJob {
            graph_path: self.graph.clone(),
            library_root: self.library_root.clone().unwrap_or_else(|| self.graph_dir()),
            settings: self.settings()?,
            out: self.out.clone(),
        })
    }
}

fn init_tracing(log_level: Option<&str>) -> Result<()> {
    let env_filter = EnvFilter::try_new(log_level.unwrap_or(DEFAULT_LOG_DIRECTIVES))
        .context("Invalid log filter")?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    Ok(())
}

fn compile_once(runtime: &tokio::runtime::Runtime, cli: &Cli) -> Result<bool> {
    let job = cli.job()?;
    let report = runtime.block_on(job.run())?;
    if job.out.is_none() {
        print!("{}", report.source);
    }
    tracing::info!(
        "Compiled {:?} ({}): {} function(s), {} failed root(s)",
        cli.graph,
        report.hash,
        report.functions.len(),
        report.failures.len()
    );
    Ok(report.is_success())
}

fn watch_loop(runtime: &tokio::runtime::Runtime, cli: &Cli) -> Result<()> {
    let mut watcher = GraphWatcher::new(WatchConfig::default()).context("Failed to start file watcher")?;
    watcher.watch(cli.graph_dir())?;
    if let Some(root) = &cli.library_root {
        watcher.watch(root)?;
    }
    if let Some(settings) = cli.settings.as_ref().and_then(|p| p.parent()) {
        if !settings.as_os_str().is_empty() {
            watcher.watch(settings)?;
        }
    }

    loop {
        let Some(changed) = watcher.wait_for_change(Duration::from_secs(1)) else {
            continue;
        };
        tracing::info!("Change detected in {} file(s), recompiling", changed.len());
        if let Err(e) = compile_once(runtime, cli) {
            tracing::error!("{e:#}");
        }
    }
}

fn run(cli: &Cli) -> Result<bool> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to create tokio runtime")?;

    let success = match compile_once(&runtime, cli) {
        Ok(success) => success,
        Err(e) if cli.watch => {
            tracing::error!("{e:#}");
            false
        }
        Err(e) => return Err(e),
    };

    if cli.watch {
        watch_loop(&runtime, cli)?;
    }
    Ok(success)
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(e) = init_tracing(cli.log_level.as_deref()) {
        eprintln!("{e:#}");
        return ExitCode::FAILURE;
    }

    tracing::debug!("Starting OrdoPlay blueprint compiler v{}", env!("CARGO_PKG_VERSION"));

    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
