use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;

mod feed;
mod runtime;
mod web_bridge;

use feed::FeedConfig;
use runtime::config::EngineSettings;
use runtime::host::EngineHost;

#[derive(Parser)]
#[command(author, version, about = "Runtime host for the zone visitor counting engine")]
struct Args {
    /// Load engine settings from YAML
    #[arg(long)]
    settings: Option<PathBuf>,
    /// Override the snapshot file location
    #[arg(long)]
    snapshot: Option<PathBuf>,
    /// Run a bounded synthetic feed pass and print a count summary
    #[arg(long, default_value_t = false)]
    offline: bool,
    /// Frames to generate in offline mode
    #[arg(long, default_value_t = 240)]
    frames: u64,
    /// Serve the HTTP bridge for the web collaborator (Ctrl+C to stop)
    #[arg(long, default_value_t = false)]
    serve: bool,
    /// Keep a synthetic feed running while serving
    #[arg(long, default_value_t = false)]
    synthetic: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = if let Some(path) = args.settings {
        EngineSettings::load(path)?
    } else {
        EngineSettings::default()
    };
    if let Some(path) = args.snapshot {
        settings.snapshot_path = path;
    }

    let runtime = TokioBuilder::new_multi_thread()
        .enable_all()
        .build()
        .context("creating engine runtime")?;

    runtime.block_on(async move {
        let host = EngineHost::start(&settings).await?;
        let engine = host.engine();

        if args.offline {
            feed::run(engine.clone(), FeedConfig::default(), args.frames).await?;
            let views = engine.query_all().await;
            println!("Offline run -> {} zones", views.len());
            for view in &views {
                println!(
                    "  {}/{}: in {} out {} occupants {}",
                    view.source_id,
                    view.zone_id,
                    view.in_count,
                    view.out_count,
                    view.occupants.len()
                );
            }
        }

        if args.serve {
            let addr = settings.bind_address()?;
            let _bridge = web_bridge::serve(engine.clone(), addr);
            log::info!("HTTP bridge listening on {} (Ctrl+C to stop)", addr);
            if args.synthetic {
                let _feed = tokio::spawn(feed::run(engine.clone(), FeedConfig::default(), 0));
            }
            signal::ctrl_c().await.context("awaiting Ctrl+C to exit")?;
        }

        host.shutdown().await?;
        Ok::<(), anyhow::Error>(())
    })?;

    Ok(())
}
