//! The refresh coordinator: sole writer of source and zone state.
//!
//! One task owns the source registry and the zone. Feed batches, refresh
//! requests, timers and control commands reach it as queued events and are
//! handled one at a time. Query and transfer handlers only ever see whole
//! published snapshots through a [`ZoneReader`].

mod commands;
pub mod handle;
pub mod tracker;

pub use commands::LookupReport;
pub use handle::{CoordinatorHandle, Published, RefreshRequest, ZoneReader};
pub use tracker::{serial_newer, UpstreamTracker};

use chrono::Utc;
use hickory_proto::rr::Name;
use rpz_core::IntelBatch;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::config::{DataSource, ServerConfig};
use crate::notify::DownstreamNotifier;
use crate::policy::PolicyEngine;
use crate::reaper::{self, ReaperScheduler};
use crate::sources::SourceRegistry;
use crate::state;
use crate::upstream::ZoneFetcher;
use crate::zone::{IncrementalDiff, RpzSynthesizer, ZoneApex, ZoneState};
use crate::SrvError;
use handle::Inbox;

/// Depth of each input queue.
const QUEUE_DEPTH: usize = 256;

/// Resolution of the upstream refresh countdowns.
const TICK: Duration = Duration::from_secs(1);

/// Owns every piece of mutable state; see the module docs.
pub struct Coordinator {
    registry: SourceRegistry,
    synth: RpzSynthesizer,
    reaper: ReaperScheduler,
    zone: ZoneState,
    published: Arc<RwLock<Published>>,
    trackers: Vec<UpstreamTracker>,
    fetcher: Arc<dyn ZoneFetcher>,
    notifier: DownstreamNotifier,
    state_path: Option<PathBuf>,
}

impl fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coordinator")
            .field("serial", &self.zone.serial())
            .field("lists", &self.registry.len())
            .field("trackers", &self.trackers.len())
            .field("downstreams", &self.notifier.len())
            .finish_non_exhaustive()
    }
}

impl Coordinator {
    /// Build the initial zone at `serial` from an already loaded registry.
    pub fn new(
        config: &ServerConfig,
        registry: SourceRegistry,
        serial: u32,
        fetcher: Arc<dyn ZoneFetcher>,
    ) -> crate::Result<Self> {
        let apex = Arc::new(ZoneApex::from_config(&config.zone)?);
        let synth = RpzSynthesizer::new(
            Arc::clone(&apex),
            PolicyEngine::new(config.policy_settings()?),
        );
        let zone = ZoneState::new(
            synth.build_full_snapshot(&registry, serial),
            config.max_diff_chain,
        );
        let trackers = config
            .lists
            .iter()
            .filter(|l| l.datasource == DataSource::Xfr)
            .map(|l| UpstreamTracker::from_config(l, config.max_refresh_secs))
            .collect::<crate::Result<Vec<_>>>()?;

        let mut notifier = DownstreamNotifier::new(apex.origin().clone());
        for target in &config.downstreams {
            notifier.register(*target);
        }

        info!(
            zone = %apex.origin(),
            serial,
            entries = zone.snapshot().len(),
            lists = registry.len(),
            upstreams = trackers.len(),
            "built initial zone"
        );

        Ok(Self {
            published: Arc::new(RwLock::new(Published::from_zone(&zone))),
            registry,
            synth,
            reaper: ReaperScheduler::new(config.reaper_interval_secs),
            zone,
            trackers,
            fetcher,
            notifier,
            state_path: config.state_file(),
        })
    }

    /// Read handle on the published zone.
    pub fn reader(&self) -> ZoneReader {
        ZoneReader::new(
            Arc::clone(&self.published),
            self.trackers.iter().map(|t| t.zone.clone()).collect(),
        )
    }

    pub fn serial(&self) -> u32 {
        self.zone.serial()
    }

    pub const fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn trackers(&self) -> &[UpstreamTracker] {
        &self.trackers
    }

    /// Start the event loop. The task resolves to the final serial.
    pub fn spawn(self) -> (CoordinatorHandle, JoinHandle<u32>) {
        let (handle, inbox) = CoordinatorHandle::channel(QUEUE_DEPTH);
        let task = tokio::spawn(self.run(inbox));
        (handle, task)
    }

    async fn run(mut self, mut inbox: Inbox) -> u32 {
        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Sweeps land on bucket boundaries, not on startup time.
        let first_sweep = Instant::now()
            + reaper::until_next_boundary(Utc::now().timestamp(), self.reaper.interval());
        let mut sweeps = time::interval_at(first_sweep, self.reaper.period());
        sweeps.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(serial = self.zone.serial(), "coordinator running");
        loop {
            tokio::select! {
                changed = inbox.shutdown.changed() => {
                    if changed.is_err() || *inbox.shutdown.borrow() {
                        break;
                    }
                }
                Some(batch) = inbox.intel.recv() => {
                    self.on_batch(&batch, Utc::now().timestamp());
                }
                Some(request) = inbox.refresh.recv() => {
                    self.on_refresh(&request.zone).await;
                }
                Some((request, reply)) = inbox.commands.recv() => {
                    let response = self.on_command(&request, Utc::now().timestamp());
                    if reply.send(response).is_err() {
                        debug!(command = %request.command, "command caller went away");
                    }
                }
                _ = ticker.tick() => self.on_tick().await,
                _ = sweeps.tick() => self.on_sweep(Utc::now().timestamp()),
            }
        }

        self.persist();
        info!(serial = self.zone.serial(), "coordinator stopped");
        self.zone.serial()
    }

    /// Swap the readers' view to the current zone and notify downstreams.
    fn publish(&self, diff: &IncrementalDiff, reason: &'static str) {
        *self
            .published
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Published::from_zone(&self.zone);
        info!(
            from = diff.from_serial,
            to = diff.to_serial,
            removed = diff.removed.len(),
            added = diff.added.len(),
            reason,
            "published zone"
        );
        self.notifier.notify(diff.to_serial);
    }

    /// Apply a feed batch. A rejected batch changes nothing.
    fn on_batch(&mut self, batch: &IntelBatch, now: i64) -> Option<Arc<IncrementalDiff>> {
        let touched = match self.registry.apply_batch(batch, now) {
            Ok(touched) => touched,
            Err(e) => {
                warn!(source = %batch.source, error = %e, "rejected feed batch");
                return None;
            }
        };
        debug!(source = %batch.source, names = touched.len(), "applied feed batch");
        let diff = self
            .synth
            .build_incremental_diff(&self.registry, &mut self.zone, &touched)?;
        self.publish(&diff, "feed");
        Some(diff)
    }

    fn on_sweep(&mut self, now: i64) {
        let reaped = self.reaper.sweep(&mut self.registry, now);
        if reaped.is_empty() {
            return;
        }
        let names = reaped.iter().map(|e| e.name.as_str());
        if let Some(diff) = self
            .synth
            .build_incremental_diff(&self.registry, &mut self.zone, names)
        {
            self.publish(&diff, "reaper");
        }
    }

    async fn on_tick(&mut self) {
        let due: Vec<usize> = self
            .trackers
            .iter_mut()
            .enumerate()
            .filter_map(|(i, t)| t.tick().then_some(i))
            .collect();
        for index in due {
            self.pull(index).await;
        }
    }

    async fn on_refresh(&mut self, zone: &Name) {
        match self.trackers.iter().position(|t| t.matches(zone)) {
            Some(index) => self.pull(index).await,
            None => warn!(zone = %zone, "refresh requested for untracked zone"),
        }
    }

    /// Check one upstream and pull it if it moved. Failures keep the old
    /// data; the countdown restarts either way.
    async fn pull(&mut self, index: usize) {
        if let Err(e) = self.pull_and_compare(index).await {
            if let Some(tracker) = self.trackers.get(index) {
                warn!(
                    zone = %tracker.zone,
                    upstream = %tracker.upstream,
                    error = %e,
                    "upstream refresh failed"
                );
            }
        }
        if let Some(tracker) = self.trackers.get_mut(index) {
            tracker.reset();
        }
    }

    async fn pull_and_compare(&mut self, index: usize) -> crate::Result<()> {
        let tracker = self
            .trackers
            .get(index)
            .ok_or_else(|| SrvError::Source(format!("no upstream tracker #{index}")))?;
        let (zone, upstream) = (tracker.zone.clone(), tracker.upstream);
        let fetcher = Arc::clone(&self.fetcher);

        let upstream_serial = fetcher.soa_serial(&zone, upstream).await?;
        if !tracker.needs_transfer(upstream_serial) {
            debug!(zone = %zone, serial = upstream_serial, "upstream unchanged");
            return Ok(());
        }

        let pulled = fetcher.transfer(&zone, upstream).await?;
        let tracker = self
            .trackers
            .get_mut(index)
            .ok_or_else(|| SrvError::Source(format!("no upstream tracker #{index}")))?;
        let entries = (tracker.parser)(&pulled, &tracker.source, Utc::now().timestamp());
        let names = entries.len();
        let created =
            self.registry
                .replace_list(tracker.list_type, &tracker.source, DataSource::Xfr, entries)?;
        tracker.serial = Some(pulled.serial);
        info!(
            zone = %zone,
            serial = pulled.serial,
            names,
            created,
            "pulled upstream zone"
        );

        if let Some(diff) = self.synth.rebuild(&self.registry, &mut self.zone) {
            self.publish(&diff, "upstream");
        }
        Ok(())
    }

    fn persist(&self) {
        let Some(path) = &self.state_path else {
            return;
        };
        let serial = self.zone.serial();
        match state::save_serial(path, serial) {
            Ok(()) => info!(path = %path.display(), serial, "saved serial"),
            Err(e) => error!(path = %path.display(), error = %e, "failed to save serial"),
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::config::{ListConfig, UpstreamFormat};
    use crate::upstream::UpstreamZone;
    use async_trait::async_trait;
    use hickory_proto::rr::rdata::{CNAME, SOA};
    use hickory_proto::rr::{RData, Record};
    use rpz_core::{ListType, SourceFormat};
    use std::net::SocketAddr;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Mutex;

    pub const UPSTREAM_ZONE: &str = "rpz.upstream.";

    /// Upstream that serves whatever zone the test last set.
    #[derive(Debug, Default)]
    pub struct MockFetcher {
        pub serial: AtomicU32,
        pub names: Mutex<Vec<(String, String)>>,
        pub transfers: AtomicUsize,
        pub fail: AtomicBool,
    }

    impl MockFetcher {
        pub fn set_zone(&self, serial: u32, names: &[(&str, &str)]) {
            self.serial.store(serial, Ordering::SeqCst);
            *self.names.lock().unwrap() = names
                .iter()
                .map(|(n, t)| ((*n).to_string(), (*t).to_string()))
                .collect();
        }
    }

    #[async_trait]
    impl ZoneFetcher for MockFetcher {
        async fn soa_serial(&self, _zone: &Name, upstream: SocketAddr) -> crate::Result<u32> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SrvError::Timeout(upstream.to_string()));
            }
            Ok(self.serial.load(Ordering::SeqCst))
        }

        async fn transfer(&self, zone: &Name, _upstream: SocketAddr) -> crate::Result<UpstreamZone> {
            self.transfers.fetch_add(1, Ordering::SeqCst);
            let serial = self.serial.load(Ordering::SeqCst);
            let soa = Record::from_rdata(
                zone.clone(),
                60,
                RData::SOA(SOA::new(zone.clone(), zone.clone(), serial, 1, 1, 1, 1)),
            );
            let mut records = vec![soa.clone()];
            for (name, target) in self.names.lock().unwrap().iter() {
                let owner = Name::from_ascii(format!("{name}{zone}")).unwrap();
                let target = Name::from_ascii(target).unwrap();
                records.push(Record::from_rdata(owner, 60, RData::CNAME(CNAME(target))));
            }
            records.push(soa);
            Ok(UpstreamZone::from_records(zone.clone(), records))
        }
    }

    pub fn feed_list(name: &str, list_type: ListType) -> ListConfig {
        ListConfig {
            name: name.into(),
            list_type,
            format: SourceFormat::Map,
            datasource: DataSource::Feed,
            description: String::new(),
            path: None,
            zone: None,
            upstream: None,
            zone_format: UpstreamFormat::Rpz,
            refresh_secs: 300,
        }
    }

    pub fn xfr_list(name: &str) -> ListConfig {
        ListConfig {
            datasource: DataSource::Xfr,
            zone: Some(UPSTREAM_ZONE.into()),
            upstream: Some("127.0.0.1:5300".parse().unwrap()),
            refresh_secs: 60,
            ..feed_list(name, ListType::Blacklist)
        }
    }

    /// Zone `rpz.example.`, blacklist `local`, whitelist `allow`, greylists
    /// `tapir` and `manual`, and one upstream blacklist `spamhaus`. A single
    /// greylist hit is enough to block.
    pub fn config() -> ServerConfig {
        let mut config = ServerConfig::default();
        config.zone.name = "rpz.example.".into();
        config.policy.num_sources = 1;
        config.lists = vec![
            feed_list("local", ListType::Blacklist),
            feed_list("allow", ListType::Whitelist),
            feed_list("tapir", ListType::Greylist),
            feed_list("manual", ListType::Greylist),
            xfr_list("spamhaus"),
        ];
        config
    }

    pub fn registry(config: &ServerConfig) -> SourceRegistry {
        crate::sources::loader::build_registry(config, 0).unwrap()
    }

    pub fn coordinator(fetcher: Arc<MockFetcher>) -> Coordinator {
        let config = config();
        let registry = registry(&config);
        Coordinator::new(&config, registry, 10, fetcher).unwrap()
    }
}
