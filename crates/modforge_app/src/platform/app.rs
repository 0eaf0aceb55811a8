use std::collections::{HashSet, VecDeque};
use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use forge_logging::{forge_info, forge_warn};
use log::LevelFilter;
use modforge_core::{update, AppState, CatalogState, JobStatus, LocalId, ModFile, Msg, Notice};
use modforge_engine::ReqwestModApi;

use super::cli::Cli;
use super::config::AppConfig;
use super::effects::EffectRunner;
use super::render;

const PUMP_INTERVAL: Duration = Duration::from_millis(200);

/// What the session drives on its own once a job reaches a new state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Automation {
    process: bool,
    download: bool,
}

pub fn run_app() -> Result<ExitCode> {
    let cli = Cli::parse();
    dotenvy::dotenv().ok();
    let loaded = AppConfig::load(cli.config.as_deref())?;
    let config = loaded.config;

    let level = if cli.verbose {
        LevelFilter::Debug
    } else if config.log_file.is_some() {
        LevelFilter::Info
    } else {
        LevelFilter::Warn
    };
    forge_logging::initialize(config.log_destination(), level);
    if let Some(source) = &loaded.source {
        forge_info!("Loaded configuration from {:?}", source);
    }
    for key in &loaded.rejected_env {
        forge_warn!("Ignoring {}: expected a positive integer", key);
    }

    if !cli.has_work() {
        eprintln!("Nothing to do: pass mod files or --history (see --help).");
        return Ok(ExitCode::from(2));
    }

    let api = ReqwestModApi::new(config.api_settings())
        .with_context(|| format!("invalid api url {}", config.api_base_url))?;
    let runner = EffectRunner::new(Arc::new(api), config.poll_settings())
        .context("starting the network engine")?;
    let automation = Automation {
        process: config.auto_process && !cli.no_process,
        download: config.auto_download && !cli.no_download,
    };

    let mut session = Session::new(runner, automation);
    session.dispatch(Msg::Started);
    if let Some(preset) = cli.preset.clone() {
        session.dispatch(Msg::PresetSelected(Some(preset)));
    }
    if let Some(prompt) = cli.prompt.clone() {
        session.dispatch(Msg::PromptChanged(prompt));
    }
    if cli.history {
        session.history_pending = true;
        session.dispatch(Msg::HistoryRequested {
            page: cli.page,
            limit: 0,
            status: cli.status.map(JobStatus::from),
        });
    }
    for server_job_id in &cli.download {
        session.download_from_history(server_job_id);
    }
    let files = collect_files(&cli);
    if !files.is_empty() {
        session.dispatch(Msg::FilesDropped(files));
    }

    while !session.settled() {
        for msg in session.runner.pump(PUMP_INTERVAL) {
            session.dispatch(msg);
        }
    }
    session.dispatch(Msg::ShutdownRequested);

    Ok(session.exit_code())
}

fn collect_files(cli: &Cli) -> Vec<ModFile> {
    cli.files
        .iter()
        .filter_map(|path| match fs::metadata(path) {
            Ok(meta) if meta.is_file() => Some(ModFile::new(path.clone(), meta.len())),
            Ok(_) => {
                eprintln!("! {} is not a file", path.display());
                None
            }
            Err(err) => {
                eprintln!("! {}: {}", path.display(), err);
                None
            }
        })
        .collect()
}

struct Session {
    state: AppState,
    runner: EffectRunner,
    automation: Automation,
    processed: HashSet<LocalId>,
    downloads_requested: HashSet<LocalId>,
    downloads_pending: HashSet<LocalId>,
    history_downloads_pending: HashSet<String>,
    history_download_failures: usize,
    history_pending: bool,
}

impl Session {
    fn new(runner: EffectRunner, automation: Automation) -> Self {
        Self {
            state: AppState::new(),
            runner,
            automation,
            processed: HashSet::new(),
            downloads_requested: HashSet::new(),
            downloads_pending: HashSet::new(),
            history_downloads_pending: HashSet::new(),
            history_download_failures: 0,
            history_pending: false,
        }
    }

    /// Runs `msg` and every follow-up it triggers through `update`.
    fn dispatch(&mut self, msg: Msg) {
        let mut queue = VecDeque::from([msg]);
        while let Some(msg) = queue.pop_front() {
            let state = std::mem::take(&mut self.state);
            let (state, effects) = update(state, msg);
            self.state = state;
            self.runner.run(effects);
            self.report();
            queue.extend(self.follow_ups());
        }
    }

    /// Asks for the result of a server job the session did not upload.
    /// Rejections count as failures right away.
    fn download_from_history(&mut self, server_job_id: &str) {
        match self.state.resolve_history_download(server_job_id) {
            Ok(effect) => {
                self.history_downloads_pending.insert(server_job_id.trim().to_string());
                self.runner.run(vec![effect]);
            }
            Err(err) => {
                self.history_download_failures += 1;
                eprintln!("{}", render::notice_line(&Notice::Rejected(err)));
            }
        }
    }

    fn report(&mut self) {
        for notice in self.state.take_notices() {
            match &notice {
                Notice::DownloadFailed { local_id, .. } => {
                    self.downloads_pending.remove(local_id);
                }
                Notice::HistoryDownloadFailed { server_job_id, .. } => {
                    self.history_downloads_pending.remove(server_job_id);
                    self.history_download_failures += 1;
                }
                Notice::HistoryFailed(_) => self.history_pending = false,
                Notice::Rejected(_) | Notice::CatalogUnavailable(_) => {}
            }
            eprintln!("{}", render::notice_line(&notice));
        }
        for ready in self.state.take_downloads() {
            match ready.local_id {
                Some(local_id) => self.downloads_pending.remove(&local_id),
                None => self.history_downloads_pending.remove(&ready.server_job_id),
            };
            println!("{}", render::download_line(&ready));
        }
        if !self.state.consume_dirty() {
            return;
        }
        let view = self.state.view();
        if self.history_pending {
            if let Some(page) = &view.history {
                self.history_pending = false;
                for line in render::history_lines(page) {
                    println!("{line}");
                }
            }
        }
        if view.job_count > 0 {
            for line in render::render(&view) {
                println!("{line}");
            }
        }
    }

    fn follow_ups(&mut self) -> Vec<Msg> {
        let mut msgs = Vec::new();
        for row in self.state.view().jobs {
            if self.automation.process && row.can_process && self.processed.insert(row.local_id) {
                forge_info!("Auto-processing job_id={}", row.local_id);
                msgs.push(Msg::ProcessClicked {
                    local_id: row.local_id,
                });
            }
            if self.automation.download
                && row.can_download
                && self.downloads_requested.insert(row.local_id)
            {
                self.downloads_pending.insert(row.local_id);
                msgs.push(Msg::DownloadClicked {
                    local_id: row.local_id,
                });
            }
        }
        msgs
    }

    /// True once nothing in flight can still change what gets reported.
    fn settled(&self) -> bool {
        if self.history_pending
            || !self.downloads_pending.is_empty()
            || !self.history_downloads_pending.is_empty()
            || self.state.catalog().state() == CatalogState::Loading
        {
            return false;
        }
        self.state.list_jobs().all(|job| {
            job.status.is_terminal()
                || (job.status == JobStatus::Uploaded
                    && !job.has_active_poll()
                    && (!self.automation.process || self.processed.contains(&job.local_id)))
        })
    }

    fn exit_code(&self) -> ExitCode {
        let failed = self
            .state
            .list_jobs()
            .filter(|job| job.status == JobStatus::Failed)
            .count();
        if failed > 0 || self.history_download_failures > 0 {
            forge_warn!(
                "{} job(s) and {} history download(s) failed",
                failed,
                self.history_download_failures
            );
            ExitCode::FAILURE
        } else {
            ExitCode::SUCCESS
        }
    }
}
