//! Tick orchestration: fan out one probe per directory entry, gather every
//! outcome and persist the whole tick as a single batch.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use super::Heartbeat;
use crate::db::{DbError, RawSample, Store};
use crate::directory::ProbeDefinition;
use crate::now_ms;
use crate::probe::{ProbeOutcome, Prober};

/// Tick error types.
#[derive(Error, Debug)]
pub enum TickError {
    #[error("failed to persist tick batch: {0}")]
    Store(#[from] DbError),
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Probes dispatched
    pub probes: usize,
    /// Samples with `ok == true`
    pub ok: usize,
    /// Rows committed to the store
    pub inserted: usize,
    pub elapsed: Duration,
}

/// Runs all enabled probes concurrently and stores the results.
pub struct TickRunner<P> {
    probes: Arc<[ProbeDefinition]>,
    prober: Arc<P>,
    store: Arc<Store>,
    heartbeat: Arc<Heartbeat>,
    timeout: Duration,
}

impl<P> Clone for TickRunner<P> {
    fn clone(&self) -> Self {
        Self {
            probes: self.probes.clone(),
            prober: self.prober.clone(),
            store: self.store.clone(),
            heartbeat: self.heartbeat.clone(),
            timeout: self.timeout,
        }
    }
}

impl<P: Prober> TickRunner<P> {
    pub fn new(
        probes: Vec<ProbeDefinition>,
        prober: Arc<P>,
        store: Arc<Store>,
        heartbeat: Arc<Heartbeat>,
        timeout: Duration,
    ) -> Self {
        Self {
            probes: probes.into(),
            prober,
            store,
            heartbeat,
            timeout,
        }
    }

    /// Execute one tick.
    ///
    /// The heartbeat is updated first, unconditionally. Every probe runs in
    /// its own task and all of them are awaited; the tick takes as long as
    /// its slowest probe. All samples share one timestamp taken after the
    /// fan-out settles.
    pub async fn run_tick(&self) -> Result<TickReport, TickError> {
        let started = Instant::now();
        self.heartbeat.beat();

        let handles: Vec<_> = self
            .probes
            .iter()
            .filter(|p| p.enabled)
            .map(|probe| {
                let prober = self.prober.clone();
                let id = probe.id.clone();
                let url = probe.url.clone();
                let timeout = self.timeout;

                tokio::spawn(async move {
                    let outcome = prober.run(&url, timeout).await;
                    (id, outcome)
                })
            })
            .collect();

        let dispatched = handles.len();
        let mut settled = Vec::with_capacity(dispatched);
        for handle in handles {
            settled.push(handle.await);
        }

        let ts = now_ms();
        let samples: Vec<RawSample> = settled
            .into_iter()
            .map(|result| match result {
                Ok((probe_id, outcome)) => sample_from_outcome(ts, probe_id, outcome),
                Err(e) => {
                    tracing::warn!("Tick: probe task failed: {}", e);
                    RawSample::placeholder(ts, format!("probe task failed: {}", e))
                }
            })
            .collect();

        let ok = samples.iter().filter(|s| s.ok).count();
        let inserted = self.store.insert_batch(&samples)?;

        Ok(TickReport {
            probes: dispatched,
            ok,
            inserted,
            elapsed: started.elapsed(),
        })
    }
}

fn sample_from_outcome(ts: i64, probe_id: String, outcome: ProbeOutcome) -> RawSample {
    RawSample {
        ts,
        probe_id,
        http_code: outcome.http_code,
        ok: outcome.ok,
        latency_ms: outcome.latency_ms,
        error: outcome.error,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::UNKNOWN_PROBE_ID;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::NamedTempFile;
    use tokio_test::{assert_err, assert_ok};

    /// Prober answering from a fixed table, after a fixed delay.
    struct FakeProber {
        outcomes: HashMap<String, ProbeOutcome>,
        delay: Duration,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    impl FakeProber {
        fn new(outcomes: &[(&str, ProbeOutcome)], delay: Duration) -> Self {
            Self {
                outcomes: outcomes
                    .iter()
                    .map(|(url, o)| (url.to_string(), o.clone()))
                    .collect(),
                delay,
                active: AtomicUsize::new(0),
                max_active: AtomicUsize::new(0),
            }
        }
    }

    impl Prober for FakeProber {
        async fn run(&self, url: &str, _timeout: Duration) -> ProbeOutcome {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_active.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            self.active.fetch_sub(1, Ordering::SeqCst);

            match self.outcomes.get(url) {
                Some(outcome) => outcome.clone(),
                None => panic!("no canned outcome for {}", url),
            }
        }
    }

    fn outcome(http_code: Option<u16>, latency_ms: u64, error: Option<&str>) -> ProbeOutcome {
        ProbeOutcome {
            http_code,
            ok: http_code == Some(200),
            latency_ms,
            error: error.map(str::to_string),
        }
    }

    fn runner(
        probes: Vec<ProbeDefinition>,
        prober: FakeProber,
    ) -> (NamedTempFile, TickRunner<FakeProber>, Arc<Store>, Arc<Heartbeat>) {
        let tmp = NamedTempFile::new().unwrap();
        let store = Arc::new(Store::new(tmp.path()).unwrap());
        let heartbeat = Arc::new(Heartbeat::starting_at(0));
        let runner = TickRunner::new(
            probes,
            Arc::new(prober),
            store.clone(),
            heartbeat.clone(),
            Duration::from_secs(5),
        );
        (tmp, runner, store, heartbeat)
    }

    #[tokio::test(start_paused = true)]
    async fn test_tick_persists_one_sample_per_probe() {
        let probes = vec![
            ProbeDefinition::new("api-root", "http://api/"),
            ProbeDefinition::new("docs", "http://docs/"),
            ProbeDefinition::new("web", "http://web/"),
        ];
        let prober = FakeProber::new(
            &[
                ("http://api/", outcome(Some(200), 120, None)),
                ("http://docs/", outcome(Some(503), 300, None)),
                ("http://web/", outcome(None, 5_000, Some("timeout"))),
            ],
            Duration::from_secs(1),
        );
        let (_tmp, runner, store, heartbeat) = runner(probes, prober);

        let report = assert_ok!(runner.run_tick().await);
        assert_eq!(report.probes, 3);
        assert_eq!(report.ok, 1);
        assert_eq!(report.inserted, 3);
        assert!(heartbeat.last_tick_ms() > 0);

        let latest = store.latest_per_probe().unwrap();
        assert_eq!(latest.len(), 3);
        // one timestamp for the whole batch
        assert!(latest.iter().all(|s| s.ts == latest[0].ts));

        let web = latest.iter().find(|s| s.probe_id == "web").unwrap();
        assert_eq!(web.http_code, None);
        assert_eq!(web.error.as_deref(), Some("timeout"));
        assert_eq!(web.latency_ms, 5_000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_probes_run_concurrently() {
        let probes: Vec<_> = (0..5)
            .map(|i| ProbeDefinition::new(format!("p{}", i), "http://same/"))
            .collect();
        let prober = FakeProber::new(
            &[("http://same/", outcome(Some(200), 10, None))],
            Duration::from_secs(2),
        );
        let (_tmp, runner, _store, _hb) = runner(probes, prober);

        let report = assert_ok!(runner.run_tick().await);
        assert_eq!(report.inserted, 5);
        // bounded by the slowest probe, not the sum
        assert!(report.elapsed < Duration::from_secs(4), "{:?}", report.elapsed);
        assert_eq!(runner.prober.max_active.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_disabled_probes_are_skipped() {
        let mut disabled = ProbeDefinition::new("off", "http://off/");
        disabled.enabled = false;
        let probes = vec![ProbeDefinition::new("on", "http://on/"), disabled];
        let prober = FakeProber::new(&[("http://on/", outcome(Some(200), 5, None))], Duration::ZERO);
        let (_tmp, runner, store, _hb) = runner(probes, prober);

        let report = assert_ok!(runner.run_tick().await);
        assert_eq!(report.probes, 1);
        assert!(store.samples_in_range("off", 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_panicking_probe_yields_placeholder() {
        let probes = vec![
            ProbeDefinition::new("good", "http://good/"),
            ProbeDefinition::new("broken", "http://no-canned-outcome/"),
        ];
        let prober = FakeProber::new(&[("http://good/", outcome(Some(200), 5, None))], Duration::ZERO);
        let (_tmp, runner, store, _hb) = runner(probes, prober);

        let report = assert_ok!(runner.run_tick().await);
        assert_eq!(report.inserted, 2);

        let unknown = store.samples_in_range(UNKNOWN_PROBE_ID, 0).unwrap();
        assert_eq!(unknown.len(), 1);
        assert!(!unknown[0].ok);
        assert_eq!(unknown[0].latency_ms, 0);
        assert!(unknown[0].error.as_deref().unwrap().starts_with("probe task failed"));
        assert!(store.samples_in_range("broken", 0).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_surfaces_and_drops_batch() {
        let probes = vec![
            ProbeDefinition::new("fine", "http://fine/"),
            ProbeDefinition::new("absurd", "http://absurd/"),
        ];
        let prober = FakeProber::new(
            &[
                ("http://fine/", outcome(Some(200), 5, None)),
                // cannot be stored as a SQLite integer
                ("http://absurd/", outcome(Some(200), u64::MAX, None)),
            ],
            Duration::ZERO,
        );
        let (_tmp, runner, store, heartbeat) = runner(probes, prober);

        let err = assert_err!(runner.run_tick().await);
        assert!(matches!(err, TickError::Store(_)));
        assert_eq!(store.count().unwrap(), 0);
        // heartbeat moves even when the tick fails
        assert!(heartbeat.last_tick_ms() > 0);
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let prober = FakeProber::new(&[], Duration::ZERO);
        let (_tmp, runner, store, _hb) = runner(vec![], prober);

        let report = assert_ok!(runner.run_tick().await);
        assert_eq!(report.probes, 0);
        assert_eq!(report.inserted, 0);
        assert_eq!(store.count().unwrap(), 0);
    }
}
