use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use ferrule::buffer::BufferPoolManager;
use ferrule::common::{FerruleError, PageId};
use ferrule::storage::disk::DiskManager;
use ferrule::Result;

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .map_err(|e| FerruleError::InvalidConfig(format!("Invalid log level: {e}")))?;
    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init()
        .map_err(|_| FerruleError::InvalidConfig("Logging already initialized".into()))
}

fn run(db_path: &str) -> Result<()> {
    let disk_manager = Arc::new(DiskManager::new(db_path)?);
    info!(path = db_path, "created disk manager");

    // Three frames so the later pages push the first ones out
    let bpm = BufferPoolManager::new(3, 2, disk_manager);

    let mut page_ids: Vec<PageId> = Vec::new();
    for i in 0..6u8 {
        let Some(mut guard) = bpm.new_page_guarded()? else {
            info!("every frame is pinned");
            break;
        };
        let text = format!("page number {i}");
        guard.data_mut()[..text.len()].copy_from_slice(text.as_bytes());
        page_ids.push(guard.page_id());
    }

    for &page_id in &page_ids {
        if let Some(guard) = bpm.checked_read_page(page_id)? {
            let end = guard.iter().position(|&b| b == 0).unwrap_or(guard.len());
            info!(%page_id, text = %String::from_utf8_lossy(&guard[..end]), "read back");
        }
    }

    for (page_id, e) in bpm.flush_all_pages() {
        info!(%page_id, error = %e, "flush failed");
    }

    println!("{}", bpm.stats().snapshot());
    Ok(())
}

fn main() {
    if let Err(e) = init_logging("info") {
        eprintln!("{e}");
    }

    let db_path = "demo.db";
    let result = run(db_path);

    std::fs::remove_file(db_path).ok();
    if let Err(e) = result {
        eprintln!("Demo failed: {e}");
        std::process::exit(1);
    }
}
