use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::catalog;
use crate::config;
use crate::controller::Controller;
use crate::logging::debug_log;
use crate::pipeline::{self, Fetch, Pipeline};
use crate::preload::{self, ImageCache, Preloader};
use crate::ui;

#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config_file: Option<PathBuf>,
}

pub fn run(options: RunOptions) -> Result<()> {
    let cfg = config::load(config::LoadOptions {
        config_file: options.config_file,
        env_prefix: None,
    })
    .context("load config")?;
    debug_log(format!(
        "app: catalog {} (size {}), min loading {:?}",
        cfg.catalog.base_url, cfg.catalog.size, cfg.loading.min_duration
    ));

    let client = catalog::Client::new(catalog::ClientConfig {
        base_url: cfg.catalog.base_url.clone(),
        user_agent: cfg.catalog.user_agent.clone(),
        timeout: cfg.catalog.timeout,
        http_client: None,
    })
    .context("build catalog client")?;

    let images = ImageCache::new(preload::Config {
        timeout: cfg.loading.preload_timeout,
        ..preload::Config::default()
    })
    .context("build image cache")?;

    let preloader: Arc<dyn Preloader> = Arc::new(images.clone());
    let fetch: Arc<dyn Fetch> = Arc::new(Pipeline::new(
        Arc::new(client),
        preloader,
        pipeline::Options {
            catalog_size: cfg.catalog.size,
            min_loading: cfg.loading.min_duration,
        },
    ));

    let mut model = ui::Model::new(Controller::new(fetch), images);
    model.run()
}
