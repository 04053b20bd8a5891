//! splat2d-fit: fit 2D Gaussians to a grayscale image
//!
//! Usage:
//!   splat2d-fit --image photo.jpg --width 128 --height 128 --gaussians 200 \
//!     --steps 2000 --out fit.png --params-out fit.json

use anyhow::Context;
use clap::Parser;
use splat2d_rs::io::{encode_png, load_grayscale, load_records, save_records};
use splat2d_rs::{CovarianceMode, LossMetric, Session, SessionConfig, TrainEvent, TrainParams};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Approximate a grayscale image with anisotropic 2D Gaussians"
)]
struct Args {
    /// Image to fit (any format the `image` crate decodes).
    #[arg(long)]
    image: PathBuf,

    /// Target width after resizing.
    #[arg(long, default_value_t = 64)]
    width: u32,

    /// Target height after resizing.
    #[arg(long, default_value_t = 64)]
    height: u32,

    #[arg(long, default_value_t = 100)]
    gaussians: usize,

    #[arg(long, default_value_t = 10_000)]
    steps: u32,

    #[arg(long, default_value_t = 0.01)]
    lr: f32,

    /// Loss metric: mse, l1 or l1_ssim.
    #[arg(long, default_value = "mse")]
    metric: LossMetric,

    /// Report progress every N steps.
    #[arg(long, default_value_t = 100)]
    update_interval: u32,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Disable the covariance cross term (axis-aligned Gaussians).
    #[arg(long)]
    axis_aligned: bool,

    /// JSON list of Gaussian records applied after initialization.
    #[arg(long)]
    params: Option<PathBuf>,

    /// Where to write the final render (PNG).
    #[arg(long, default_value = "fit.png")]
    out: PathBuf,

    /// Where to write the fitted parameters (JSON).
    #[arg(long)]
    params_out: Option<PathBuf>,

    /// Stop training after this many seconds.
    #[arg(long)]
    max_seconds: Option<f64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let session = Session::new(SessionConfig {
        seed: args.seed,
        covariance: if args.axis_aligned {
            CovarianceMode::AxisAligned
        } else {
            CovarianceMode::Full
        },
        ..SessionConfig::default()
    })?;
    log::info!("device: {}", session.device_info().name);

    let target = load_grayscale(&args.image, args.width, args.height)
        .with_context(|| format!("loading {}", args.image.display()))?;
    session.initialize(target, args.gaussians)?;

    if let Some(path) = &args.params {
        let records =
            load_records(path).with_context(|| format!("reading records {}", path.display()))?;
        session.load_explicit_parameters(&records)?;
    }

    let params = TrainParams {
        steps: args.steps,
        lr: args.lr,
        metric: args.metric,
        update_interval: args.update_interval,
        ..TrainParams::default()
    };

    let (tx, mut rx) = session.event_channel();
    let handle = session.start(params, tx)?;

    if let Some(secs) = args.max_seconds {
        let session = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs_f64(secs.max(0.0))).await;
            log::info!("deadline of {secs}s reached, requesting stop");
            session.request_stop();
        });
    }

    while let Some(event) = rx.recv().await {
        match event {
            TrainEvent::Progress {
                step,
                total_steps,
                loss,
                ..
            } => log::info!("step {step:>6}/{total_steps}  loss={loss:.6}"),
            TrainEvent::Log(message) => log::info!("{message}"),
            TrainEvent::Stopped { step, total_steps } => {
                log::info!("stopped at step {step}/{total_steps}")
            }
            TrainEvent::Completed { step, loss, .. } => {
                log::info!("completed {step} steps, final loss {loss:?}")
            }
            TrainEvent::Failed { step, error } => log::error!("failed at step {step}: {error}"),
        }
    }

    let outcome = handle.await?;

    let snapshot = session.snapshot()?;
    std::fs::write(&args.out, encode_png(&snapshot.predicted)?)
        .with_context(|| format!("writing {}", args.out.display()))?;
    log::info!("wrote {}", args.out.display());

    if let Some(path) = &args.params_out {
        save_records(path, &session.records()?)?;
        log::info!("wrote {}", path.display());
    }

    if outcome.status == splat2d_rs::TrainStatus::Failed {
        anyhow::bail!("training failed after {} steps", outcome.step);
    }
    Ok(())
}
