use parallel_scan::store::{DocumentStore, MemoryStore};
use parallel_scan::worker::{ScanHooks, Worker, WorkerConfig};

use serde_json::json;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut num_workers = 4usize;
    let mut num_units = 8usize;
    let mut num_docs = 1_000usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--workers" => {
                num_workers = args[i + 1].parse()?;
                i += 2;
            }
            "--units" => {
                num_units = args[i + 1].parse()?;
                i += 2;
            }
            "--docs" => {
                num_docs = args[i + 1].parse()?;
                i += 2;
            }
            "--help" => {
                eprintln!(
                    "Usage: {} [--workers N] [--units N] [--docs N]",
                    args[0]
                );
                std::process::exit(0);
            }
            _ => {
                i += 1;
            }
        }
    }

    tracing::info!(
        "demo scan: {} workers over {} documents in {} units",
        num_workers,
        num_docs,
        num_units
    );

    let store = MemoryStore::new();
    for serial in 0..num_docs {
        store
            .insert(
                "data",
                json!({ "_id": serial as i64, "payload": format!("document {serial}") }),
            )
            .await?;
    }

    let processed = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..num_workers {
        let processed = processed.clone();
        let hooks = ScanHooks::new(move |_doc| {
            let processed = processed.clone();
            async move {
                // Stand-in for real per-document work.
                tokio::time::sleep(Duration::from_millis(1)).await;
                processed.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        })
        .on_start_unit(|lb, ub| async move {
            tracing::info!("starting unit {:?} .. {:?}", lb, ub);
        })
        .on_cleanup(|lb, ub| async move {
            tracing::info!("cleaning up unit {:?} .. {:?}", lb, ub);
        })
        .on_finish_processing(|| async {
            tracing::info!("worker out of units");
        });

        let config = WorkerConfig::new("data", num_units);
        handles.push(Worker::spawn(store.clone(), config, hooks).await?);
    }

    for handle in handles {
        let id = handle.id().to_string();
        let outcome = handle.join().await?;
        tracing::info!("worker {} ended with {:?}", id, outcome);
    }

    tracing::info!(
        "scan complete: {} of {} documents processed",
        processed.load(Ordering::SeqCst),
        num_docs
    );
    Ok(())
}
