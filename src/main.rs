use std::process::ExitCode;

use slide_czi_catalog::{Catalog, CatalogConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slide_czi_catalog=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

/// Open the configured catalog and report what it holds
fn run() -> slide_czi_catalog::Result<()> {
    let config = CatalogConfig::from_env()?;
    let catalog = Catalog::open(&config)?;

    let slides = catalog.slides()?;
    tracing::info!(
        slides = slides.len(),
        scenes = catalog.czi_tif_count()?,
        "Catalog ready"
    );

    for slide in &slides {
        let scenes = catalog.czi_tifs_for_slide(slide.id)?;
        let bytes: f64 = scenes.iter().filter_map(|s| s.file_size).sum();
        tracing::info!(
            slide_id = slide.id,
            file_name = %slide.file_name,
            scenes = scenes.len(),
            bytes,
            "Slide"
        );
    }

    Ok(())
}
