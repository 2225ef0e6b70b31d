//! Conversion on a background thread.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sv_app::{ConvertOptions, ConvertWorker, TableConverter, WorkerMessage};
use sv_store::RunStore;

fn unique_temp_dir(prefix: &str) -> PathBuf {
    let mut dir = std::env::temp_dir();
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    dir.push(format!("{}_{}", prefix, nanos));
    dir
}

fn table(runs: usize, ticks: usize) -> String {
    let mut out = String::new();
    for line in 0..6 {
        out.push_str(&format!("\"front matter {line}\"\n"));
    }
    let mut header = vec!["[run number]".to_string()];
    header.extend((1..17).map(|i| format!("param-{i}")));
    header.push("[step]".to_string());
    header.push("mean energy".to_string());
    out.push_str(&header.join(","));
    out.push('\n');

    for tick in 0..ticks {
        for run in 1..=runs {
            let mut line = vec![run.to_string()];
            line.extend((1..17).map(|i| i.to_string()));
            line.push(tick.to_string());
            line.push(format!("{}", run as f64 + tick as f64 * 0.5));
            out.push_str(&line.join(","));
            out.push('\n');
        }
    }
    out
}

#[test]
fn polled_worker_ends_with_complete() {
    let dir = unique_temp_dir("sv_app_worker");
    fs::create_dir_all(&dir).unwrap();
    let csv = dir.join("sweep.csv");
    fs::write(&csv, table(4, 25)).unwrap();
    let store_path = dir.join("sweep.svstore");

    let mut worker = ConvertWorker::start(
        TableConverter::default(),
        &csv,
        &store_path,
        ConvertOptions::default(),
    )
    .unwrap();
    assert!(worker.name().starts_with("sv-convert-"));

    let mut last_row = None;
    let summary = loop {
        match worker.poll() {
            Some(WorkerMessage::Progress(p)) => {
                if let Some(previous) = last_row {
                    assert!(p.row > previous);
                }
                last_row = Some(p.row);
            }
            Some(WorkerMessage::Complete(summary)) => break summary,
            Some(WorkerMessage::Failed { message }) => panic!("conversion failed: {message}"),
            None => std::thread::sleep(Duration::from_millis(5)),
        }
    };
    assert!(worker.is_finished());
    assert_eq!(summary.runs, 4);
    assert_eq!(summary.rows, 7 + 100);

    let store = RunStore::open(&store_path).unwrap();
    assert_eq!(store.series_len("3", "mean energy").unwrap(), 25);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn failed_conversion_is_reported_by_wait() {
    let dir = unique_temp_dir("sv_app_worker_fail");
    fs::create_dir_all(&dir).unwrap();
    let csv = dir.join("sweep.csv");
    let mut content = table(2, 3);
    content.push_str("1,a,b\n");
    fs::write(&csv, content).unwrap();
    let store_path = dir.join("sweep.svstore");

    let result = ConvertWorker::start(
        TableConverter::default(),
        &csv,
        &store_path,
        ConvertOptions::default(),
    )
    .unwrap()
    .wait();
    let message = result.unwrap_err().to_string();
    assert!(message.contains("row 13"), "{message}");
    assert!(!store_path.exists());

    let _ = fs::remove_dir_all(&dir);
}
