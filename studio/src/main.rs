use std::{
    io::{self, BufRead, Write},
    process::ExitCode,
};

use clap::Parser;
use color_eyre::Result;
use flux_engine::{GenerationApi, Model, TaskHandle};
use image_studio::{
    API_KEY_VAR, Config,
    cli::{Cli, Command, Configure, Generate},
    config_path, load_config, load_env_file, render, resolve_api_key, save_config,
};
use log::{debug, info, warn};
use strum::IntoEnumIterator;
use tokio_stream::StreamExt;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    pretty_env_logger::init();
    color_eyre::install()?;

    let cli = Cli::parse();
    let path = match cli.config {
        Some(path) => path,
        None => config_path()?,
    };
    let cfg = load_config(&path)?;
    debug!("Using config {}: {cfg:?}", path.display());

    match cli.command {
        Command::Generate(args) => generate(args, cli.api_key, &cfg).await,
        Command::Status { id } => {
            let handle = TaskHandle::new(id);
            let status = cfg.client(None).fetch_status(&handle).await?;
            println!("{}", render::status(&handle, &status));
            Ok(ExitCode::SUCCESS)
        }
        Command::Configure(args) => {
            configure(args, cfg, &path)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Models => {
            for model in Model::iter() {
                println!("{:<14} {model}", model.endpoint());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// The failure is already on screen when the run doesn't end in `Done`, so that case is
/// only an exit code.
async fn generate(args: Generate, flag_key: Option<String>, cfg: &Config) -> Result<ExitCode> {
    match load_env_file(None) {
        Ok(Some(path)) => debug!("Loaded {}", path.display()),
        Ok(None) => {}
        Err(e) => warn!("{e:#}"),
    }
    let api_key = resolve_api_key(flag_key, std::env::var(API_KEY_VAR).ok(), cfg, prompt_api_key)?;

    let controller = cfg.controller(args.model);
    let mut events = controller.submit(args.to_request(), api_key);

    let mut succeeded = false;
    while let Some(ev) = events.next().await {
        succeeded = render::succeeded(&ev);
        println!("{}", render::event(&ev));
    }

    Ok(if succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn configure(args: Configure, mut cfg: Config, path: &std::path::Path) -> Result<()> {
    let Configure {
        store_key,
        model,
        base_url,
        poll_interval_secs,
        max_polls,
    } = args;

    if let Some(key) = store_key {
        cfg.api_key = Some(key);
    }
    if let Some(model) = model {
        cfg.model = model;
    }
    if let Some(base_url) = base_url {
        cfg.base_url = base_url;
    }
    if let Some(secs) = poll_interval_secs {
        cfg.poll_interval_secs = secs;
    }
    if let Some(max) = max_polls {
        cfg.max_polls = (max > 0).then_some(max);
    }

    save_config(path, &cfg)?;
    info!("Saved config to {}", path.display());
    println!("Saved config to {}", path.display());
    Ok(())
}

fn prompt_api_key() -> Result<String> {
    print!(
        "{}",
        indoc::indoc! {"
            No API key found. Pass --api-key, set API_KEY (a .env file works too),
            or store one with `image-studio configure --store-key <KEY>`.
            Enter your API key: "}
    );
    io::stdout().flush()?;

    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line)
}
