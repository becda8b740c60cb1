use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use reqwest::header::USER_AGENT;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::backend;
use crate::config;
use crate::content;
use crate::control;
use crate::data::{
    BackendClassifyService, BackendRecommendService, BackendRelatedService, RedditContentService,
};
use crate::engine::{Engine, Options as EngineOptions};
use crate::page::Page;
use crate::storage::{self, keys};

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub url: Option<String>,
    pub watch: bool,
    pub config_file: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    init_tracing();

    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file.clone(),
        env_prefix: None,
    })
    .context("load config")?;

    let store =
        Arc::new(storage::Store::open(storage::Options::default()).context("open storage")?);
    let enabled = store.get_bool(keys::BIAS_DETECTION_ENABLED, true)?;

    let content_client = Arc::new(
        content::Client::new(content::ClientConfig {
            user_agent: cfg.backend.user_agent.clone(),
            base_url: Some(cfg.content.base_url.clone()),
            http_client: None,
        })
        .context("build content client")?,
    );
    let backend_client = Arc::new(
        backend::Client::new(backend::ClientConfig {
            user_agent: cfg.backend.user_agent.clone(),
            base_url: Some(cfg.backend.base_url.clone()),
            http_client: None,
        })
        .context("build backend client")?,
    );

    let mut engine = Engine::new(EngineOptions {
        enabled,
        content: Arc::new(RedditContentService::new(content_client)),
        classify: Arc::new(BackendClassifyService::new(backend_client.clone())),
        recommend: Arc::new(BackendRecommendService::new(backend_client.clone())),
        related: Arc::new(BackendRelatedService::new(backend_client)),
        feed_cap: cfg.scan.feed_cap,
        min_content_len: cfg.scan.min_content_len,
        poll_interval: cfg.nav.poll_interval,
        settle_delay: cfg.nav.settle_delay,
        store: Some(store),
    });

    let listener = if cfg.control.enabled {
        match control::Listener::start(cfg.control.port) {
            Ok(listener) => {
                info!(addr = %listener.addr(), "companion listener ready");
                Some(listener)
            }
            Err(err) => {
                warn!(%err, "companion listener unavailable");
                None
            }
        }
    } else {
        None
    };

    let url = options
        .url
        .unwrap_or_else(|| format!("{}/", cfg.content.base_url.trim_end_matches('/')));
    let html = fetch_page(&url, &cfg.backend.user_agent)?;
    let mut page = Page::new(&url, html)?;

    engine.bootstrap(&mut page)?;
    info!(url = %page.href(), enabled = engine.enabled(), "initial pass complete");

    if options.watch {
        watch_loop(&mut engine, &mut page, &cfg, listener.as_ref())?;
    }

    write_output(&page, options.output.as_deref())?;
    Ok(())
}

fn watch_loop(
    engine: &mut Engine,
    page: &mut Page,
    cfg: &config::Config,
    listener: Option<&control::Listener>,
) -> Result<()> {
    info!("watching; interrupt to stop");
    loop {
        std::thread::sleep(engine.poll_interval());
        let now = Instant::now();

        if let Some(listener) = listener {
            while let Ok(command) = listener.commands().try_recv() {
                engine.handle(page, command)?;
            }
        }

        // Refetching the document stands in for the mutation observer:
        // new content triggers another pass, old content is a no-op.
        match fetch_page(page.href(), &cfg.backend.user_agent) {
            Ok(html) => {
                page.set_html(html);
                engine.notify_mutation(page)?;
            }
            Err(err) => warn!(%err, "page refresh failed"),
        }

        engine.tick(page, now)?;
    }
}

fn fetch_page(url: &str, user_agent: &str) -> Result<String> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(20))
        .build()
        .context("build page client")?;
    let resp = client
        .get(url)
        .header(USER_AGENT, user_agent)
        .send()
        .with_context(|| format!("fetch page {url}"))?;
    if !resp.status().is_success() {
        anyhow::bail!("page fetch failed with status {}", resp.status());
    }
    resp.text().context("read page body")
}

fn write_output(page: &Page, output: Option<&std::path::Path>) -> Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, page.html())
                .with_context(|| format!("write {}", path.display()))?;
            info!(path = %path.display(), "annotated page written");
        }
        None => {
            println!("{}", page.html());
        }
    }
    Ok(())
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("echobreak=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
