// Heartbeat - Periodic driver thread for the engine

use super::PerformanceEngine;
use crate::error::EngineResult;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Calls `PerformanceEngine::tick` at a fixed interval on its own thread
pub struct Heartbeat {
    running: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Heartbeat {
    pub fn start(engine: Arc<Mutex<PerformanceEngine>>, interval: Duration) -> EngineResult<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let ticks = Arc::new(AtomicU64::new(0));

        let handle = {
            let running = running.clone();
            let ticks = ticks.clone();
            thread::Builder::new()
                .name("backbeat-heartbeat".to_string())
                .spawn(move || {
                    while running.load(Ordering::Acquire) {
                        {
                            let mut engine = match engine.lock() {
                                Ok(guard) => guard,
                                Err(poisoned) => {
                                    warn!("engine lock poisoned, recovering");
                                    poisoned.into_inner()
                                }
                            };
                            engine.tick();
                        }
                        ticks.fetch_add(1, Ordering::Relaxed);
                        thread::sleep(interval);
                    }
                    debug!("heartbeat thread exiting");
                })?
        };

        info!(interval_ms = interval.as_millis() as u64, "heartbeat started");
        Ok(Self {
            running,
            ticks,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ticks completed so far
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Stop the thread and wait for it; safe to call twice
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("heartbeat thread panicked");
            }
            info!("heartbeat stopped");
        }
    }
}

impl Drop for Heartbeat {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ResolvedConfig;
    use crate::library::InMemoryLibrary;
    use crate::midi::output::RecordingSink;
    use crate::timing::SystemTimeSource;
    use std::time::Instant;

    #[test]
    fn test_heartbeat_drives_engine() {
        let sink = RecordingSink::new();
        let library = Arc::new(InMemoryLibrary::builtin());
        let engine = Arc::new(Mutex::new(PerformanceEngine::new(
            Box::new(sink.clone()),
            Arc::new(SystemTimeSource::new()),
            library.clone(),
            library,
            ResolvedConfig::default(),
        )));

        let mut heartbeat = Heartbeat::start(engine.clone(), Duration::from_millis(2)).unwrap();
        assert!(heartbeat.is_running());

        engine.lock().unwrap().audition_chord("C").unwrap();
        engine.lock().unwrap().set_tempo(240.0);
        engine.lock().unwrap().play("Rock").unwrap();

        // First count-in click is due immediately
        let deadline = Instant::now() + Duration::from_secs(2);
        while sink.scheduled().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!sink.scheduled().is_empty());
        assert!(heartbeat.ticks() > 0);

        heartbeat.stop();
        heartbeat.stop();
        assert!(!heartbeat.is_running());

        engine.lock().unwrap().stop();
        assert_eq!(sink.panic_count(), 1);
    }
}
