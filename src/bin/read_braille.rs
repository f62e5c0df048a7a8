//! Read Braille from an image file without starting the server
//! Run with: cargo run --release --bin read_braille -- <image_path> [annotated_output]

use anyhow::{Context, Result};
use braille_workflow::{BrailleOrchestrator, Config, Metrics};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("braille_workflow=info")
        .with_target(false)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let Some(image_path) = args.get(1) else {
        eprintln!("Usage: read_braille <image_path> [annotated_output]");
        std::process::exit(2);
    };
    let annotated_path = args.get(2);

    if !Path::new(image_path).exists() {
        eprintln!("Image not found: {}", image_path);
        std::process::exit(1);
    }

    let config = Arc::new(Config::new().context("Failed to load configuration")?);
    let orchestrator = BrailleOrchestrator::new(config, Metrics::new())?;

    info!("Loading image: {}", image_path);
    let image = image::open(image_path).with_context(|| format!("Failed to open {}", image_path))?;
    info!("Image dimensions: {}x{}", image.width(), image.height());

    let reading = orchestrator.read_image(image, None).await?;

    println!("\n=== Results ===");
    println!(
        "Dots: {}  Cells: {}  Dot pitch: {}",
        reading.detection.dots.len(),
        reading.detection.cells.len(),
        reading
            .detection
            .dot_spacing
            .map(|s| format!("{:.1}px", s))
            .unwrap_or_else(|| "n/a".to_string())
    );
    println!("Braille: {}", reading.braille);
    println!("Spanish: {}", reading.transliteration.text);
    if reading.transliteration.enhanced {
        println!("Basic:   {}", reading.transliteration.basic);
    }
    for note in &reading.detection.notes {
        println!("  note: {}", note);
    }

    if let Some(out) = annotated_path {
        reading
            .detection
            .annotated
            .save(out)
            .with_context(|| format!("Failed to write {}", out))?;
        println!("Annotated image written to {}", out);
    }

    Ok(())
}
