use anyhow::{anyhow, bail, Context};
use std::sync::Arc;
use std::time::Duration;
use vector_overlay::{
    core::projection::Point,
    tiles::{source::XyzSourceOptions, HttpAssetAccessor},
    AsyncSystem, LatLngBounds, LoadState, VectorOverlay, VectorOverlayOptions,
};

const USAGE: &str = "usage: overlay-probe <url-template> <south> <west> <north> <east> [pixels] [options.json]";
const LOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Loads the overlay tile covering a lat/lng box and prints a summary
fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.len() < 5 {
        bail!(USAGE);
    }

    let url = args[0].clone();
    let coord = |i: usize| -> anyhow::Result<f64> {
        args[i]
            .parse::<f64>()
            .with_context(|| format!("argument {} is not a number: {}", i + 1, args[i]))
    };
    let bounds = LatLngBounds::from_coords(coord(1)?, coord(2)?, coord(3)?, coord(4)?);
    let pixels = match args.get(5) {
        Some(p) => p.parse::<f64>().context("pixels must be a number")?,
        None => 512.0,
    };
    let options = match args.get(6) {
        Some(path) => {
            let json = std::fs::read_to_string(path).with_context(|| format!("reading {}", path))?;
            VectorOverlayOptions::from_json(&json)?
        }
        None => VectorOverlayOptions::default(),
    };

    // reqwest needs a tokio reactor; this thread stays free to act as the
    // main thread.
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build()?;
    let system = AsyncSystem::with_tokio(runtime.handle().clone());

    let overlay = VectorOverlay::xyz("probe", url, XyzSourceOptions::default(), options);
    let provider = overlay.create_tile_provider(system.clone(), Arc::new(HttpAssetAccessor::new()), None)?;

    let rectangle = provider.projection().project_rectangle(&bounds);
    let tile = provider
        .get_tile(rectangle, Point::new(pixels, pixels))
        .ok_or_else(|| anyhow!("{:?} is outside the overlay's coverage", bounds))?;

    log::info!("loading overlay tile for {:?} at {} pixels", rectangle, pixels);
    provider.load_tile(&tile);

    let deadline = std::time::Instant::now() + LOAD_TIMEOUT;
    while tile.state() == LoadState::Loading {
        if std::time::Instant::now() >= deadline {
            bail!("timed out waiting for the tile");
        }
        system.dispatch_one_main_thread_task(Duration::from_millis(50));
    }

    println!("state:    {:?}", tile.state());
    println!("rect:     {:?}", tile.rectangle());
    if let Some(model) = tile.model() {
        println!("features: {}", model.feature_count());
        for layer in &model.layers {
            println!("  {:<24} {:>6} features (extent {})", layer.name, layer.features.len(), layer.extent);
        }
    }
    for credit in tile.credits() {
        println!("credit:   {}", credit);
    }
    for warning in tile.warnings() {
        println!("warning:  {}", warning);
    }
    for error in tile.errors() {
        println!("error:    {}", error);
    }
    println!("stats:    {}", serde_json::to_string(&provider.stats())?);

    drop(tile);
    drop(provider);
    runtime.shutdown_timeout(Duration::from_secs(1));
    Ok(())
}
