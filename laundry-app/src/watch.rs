//! Drop-directory watcher.
//!
//! ```text
//! poller thread ── scan DIR/*.wav every interval ──► crossbeam channel
//!                                                         │
//!                                            worker: classify → deliver
//!                                                         │
//!                                   ok ──► move to DIR/processed/
//!                                   err ─► leave in place, retry next scan
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use crossbeam_channel::{bounded, RecvTimeoutError, TrySendError};
use laundry_core::{ClipClassifier, DetectionEvent, ResultSink};
use tracing::{debug, info, warn};

pub const PROCESSED_DIR: &str = "processed";

/// Paths queued between the poller and the worker.
pub const DEFAULT_QUEUE_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WatchSummary {
    pub handled: usize,
    pub failed: usize,
}

pub struct Watcher<K> {
    classifier: ClipClassifier,
    sink: K,
    dir: PathBuf,
    interval: Duration,
    queue_depth: usize,
}

impl<K: ResultSink> Watcher<K> {
    pub fn new(classifier: ClipClassifier, sink: K, dir: impl Into<PathBuf>, interval: Duration) -> Self {
        Self {
            classifier,
            sink,
            dir: dir.into(),
            interval,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }

    pub fn with_queue_depth(mut self, depth: usize) -> Self {
        self.queue_depth = depth.max(1);
        self
    }

    #[cfg(test)]
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Handle everything currently in the directory, then return.
    pub fn run_once(&self) -> Result<WatchSummary> {
        let mut summary = WatchSummary::default();
        for path in scan_pending(&self.dir)? {
            self.record(&path, &mut summary);
        }
        Ok(summary)
    }

    /// Poll until `stop` is set.
    pub fn run(&self, stop: Arc<AtomicBool>) -> Result<WatchSummary> {
        fs::create_dir_all(self.dir.join(PROCESSED_DIR))
            .with_context(|| format!("creating {}", self.dir.join(PROCESSED_DIR).display()))?;

        let (tx, rx) = bounded::<PathBuf>(self.queue_depth);
        let (retry_tx, retry_rx) = bounded::<PathBuf>(self.queue_depth);

        let poller = {
            let dir = self.dir.clone();
            let interval = self.interval;
            let stop = Arc::clone(&stop);
            thread::Builder::new()
                .name("laundry-watch-poll".into())
                .spawn(move || {
                    let mut seen: HashSet<PathBuf> = HashSet::new();
                    while !stop.load(Ordering::Relaxed) {
                        for path in retry_rx.try_iter() {
                            seen.remove(&path);
                        }
                        match scan_pending(&dir) {
                            Ok(pending) => {
                                seen.retain(|p| pending.contains(p));
                                for path in pending {
                                    if !seen.insert(path.clone()) {
                                        continue;
                                    }
                                    // A full queue defers the rest to the next scan.
                                    match tx.try_send(path) {
                                        Ok(()) => {}
                                        Err(TrySendError::Full(path)) => {
                                            seen.remove(&path);
                                            break;
                                        }
                                        Err(TrySendError::Disconnected(_)) => return,
                                    }
                                }
                            }
                            Err(e) => warn!(dir = %dir.display(), error = %e, "scan failed"),
                        }
                        thread::sleep(interval);
                    }
                })
                .context("spawning poller thread")?
        };

        info!(dir = %self.dir.display(), interval_ms = self.interval.as_millis() as u64, "watching for clips");

        let mut summary = WatchSummary::default();
        loop {
            match rx.recv_timeout(self.interval) {
                Ok(path) => {
                    if !self.record(&path, &mut summary) {
                        let _ = retry_tx.send(path);
                    }
                    if stop.load(Ordering::Relaxed) {
                        break;
                    }
                }
                Err(RecvTimeoutError::Timeout) if stop.load(Ordering::Relaxed) => break,
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        drop(rx);
        if poller.join().is_err() {
            warn!("poller thread panicked");
        }
        Ok(summary)
    }

    fn record(&self, path: &Path, summary: &mut WatchSummary) -> bool {
        match self.handle_file(path) {
            Ok(()) => {
                summary.handled += 1;
                true
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "clip not handled; will retry");
                summary.failed += 1;
                false
            }
        }
    }

    /// Classify, deliver and archive one clip.
    pub fn handle_file(&self, path: &Path) -> Result<()> {
        let result = self.classifier.classify_file(path);
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let event = DetectionEvent::new(filename, file_timestamp(path), &result);

        self.sink
            .deliver(&event)
            .with_context(|| format!("delivering {}", event.filename))?;

        let archive = self.dir.join(PROCESSED_DIR);
        fs::create_dir_all(&archive)?;
        let target = archive.join(&event.filename);
        fs::rename(path, &target)
            .with_context(|| format!("moving {} to {}", path.display(), target.display()))?;
        debug!(from = %path.display(), to = %target.display(), "clip archived");
        Ok(())
    }
}

/// `.wav` files directly inside `dir`, oldest name first.
pub fn scan_pending(dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let is_wav = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("wav"));
        if is_wav && entry.file_type()?.is_file() {
            out.push(path);
        }
    }
    out.sort();
    Ok(out)
}

/// File modification time, falling back to now.
fn file_timestamp(path: &Path) -> String {
    let time: DateTime<Utc> = fs::metadata(path)
        .and_then(|m| m.modified())
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now());
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use laundry_core::transport::DeliveryError;
    use laundry_core::MemorySink;

    struct FailingSink;

    impl ResultSink for FailingSink {
        fn deliver(&self, _event: &DetectionEvent) -> std::result::Result<u16, DeliveryError> {
            Err(DeliveryError::Server { status: 503 })
        }
    }

    fn write_silent_wav(path: &Path) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for _ in 0..1_600 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();
    }

    #[test]
    fn scan_only_lists_wav_files() {
        let dir = tempfile::tempdir().unwrap();
        write_silent_wav(&dir.path().join("b.wav"));
        write_silent_wav(&dir.path().join("a.WAV"));
        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::create_dir_all(dir.path().join("processed")).unwrap();

        let names: Vec<_> = scan_pending(dir.path())
            .unwrap()
            .into_iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.WAV", "b.wav"]);
    }

    #[test]
    fn run_once_delivers_and_archives() {
        let dir = tempfile::tempdir().unwrap();
        write_silent_wav(&dir.path().join("clip.wav"));

        let watcher = Watcher::new(ClipClassifier::default(), MemorySink::new(), dir.path(), Duration::from_millis(50));
        let summary = watcher.run_once().unwrap();

        assert_eq!(summary, WatchSummary { handled: 1, failed: 0 });
        assert!(!dir.path().join("clip.wav").exists());
        assert!(dir.path().join("processed/clip.wav").exists());
        let events = watcher.sink().events();
        assert_eq!(events[0].filename, "clip.wav");
        assert!(events[0].result().is_neutral());
    }

    #[test]
    fn failed_delivery_leaves_file_in_place() {
        let dir = tempfile::tempdir().unwrap();
        write_silent_wav(&dir.path().join("clip.wav"));

        let watcher = Watcher::new(ClipClassifier::default(), FailingSink, dir.path(), Duration::from_millis(50));
        let summary = watcher.run_once().unwrap();

        assert_eq!(summary.failed, 1);
        assert!(dir.path().join("clip.wav").exists());
    }

    #[test]
    fn polling_picks_up_new_files_until_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let watcher = Arc::new(Watcher::new(
            ClipClassifier::default(),
            MemorySink::new(),
            dir.path(),
            Duration::from_millis(20),
        ));
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let watcher = Arc::clone(&watcher);
            let stop = Arc::clone(&stop);
            thread::spawn(move || watcher.run(stop))
        };

        // Stage outside the watched extension so the poller never sees a half-written file.
        write_silent_wav(&dir.path().join("late.partial"));
        fs::rename(dir.path().join("late.partial"), dir.path().join("late.wav")).unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !dir.path().join("processed/late.wav").exists() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::Relaxed);

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.handled, 1);
        assert_eq!(watcher.sink().events().len(), 1);
    }

    /// Raises the stop flag as soon as it sees an event.
    struct StoppingSink(Arc<AtomicBool>);

    impl ResultSink for StoppingSink {
        fn deliver(&self, _event: &DetectionEvent) -> std::result::Result<u16, DeliveryError> {
            self.0.store(true, Ordering::Relaxed);
            Ok(200)
        }
    }

    #[test]
    fn stop_is_honoured_between_queued_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["a.wav", "b.wav", "c.wav", "d.wav", "e.wav"] {
            write_silent_wav(&dir.path().join(name));
        }
        let stop = Arc::new(AtomicBool::new(false));
        let watcher = Watcher::new(
            ClipClassifier::default(),
            StoppingSink(Arc::clone(&stop)),
            dir.path(),
            Duration::from_millis(200),
        );

        let summary = watcher.run(stop).unwrap();
        assert_eq!(summary.handled, 1);
        assert_eq!(scan_pending(dir.path()).unwrap().len(), 4);
    }

    #[test]
    fn queue_of_one_still_drains_every_file() {
        let dir = tempfile::tempdir().unwrap();
        let names = ["a.wav", "b.wav", "c.wav", "d.wav", "e.wav", "f.wav"];
        for name in names {
            write_silent_wav(&dir.path().join(name));
        }
        let watcher = Arc::new(
            Watcher::new(ClipClassifier::default(), MemorySink::new(), dir.path(), Duration::from_millis(10))
                .with_queue_depth(1),
        );
        let stop = Arc::new(AtomicBool::new(false));

        let handle = {
            let watcher = Arc::clone(&watcher);
            let stop = Arc::clone(&stop);
            thread::spawn(move || watcher.run(stop))
        };

        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while !scan_pending(dir.path()).unwrap().is_empty() && std::time::Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        stop.store(true, Ordering::Relaxed);

        let summary = handle.join().unwrap().unwrap();
        assert_eq!(summary.handled, names.len());
        assert_eq!(watcher.sink().events().len(), names.len());
        for name in names {
            assert!(dir.path().join(PROCESSED_DIR).join(name).exists());
        }
    }
}
