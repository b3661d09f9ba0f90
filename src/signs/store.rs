//! Scan history and the live compiled config
//!
//! Submitted regions replace earlier scans of the same area. After every
//! submission the whole history is recompiled and the result swapped in as a
//! new snapshot; readers holding the previous `Arc` keep a consistent view.

use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::compiler::{compile, CompileReport};
use super::parser::{DefaultSignParser, SignParser};
use super::types::{CompiledSignConfig, RegionKey, ScanRegion};

pub struct SignConfigStore {
    parser: Box<dyn SignParser>,
    regions: Mutex<BTreeMap<RegionKey, ScanRegion>>,
    current: RwLock<Arc<CompiledSignConfig>>,
    last_report: RwLock<Arc<CompileReport>>,
}

impl Default for SignConfigStore {
    fn default() -> Self {
        Self::new(Box::new(DefaultSignParser))
    }
}

impl SignConfigStore {
    pub fn new(parser: Box<dyn SignParser>) -> Self {
        Self {
            parser,
            regions: Mutex::new(BTreeMap::new()),
            current: RwLock::new(Arc::new(CompiledSignConfig::default())),
            last_report: RwLock::new(Arc::new(CompileReport::default())),
        }
    }

    /// Record scanned regions and rebuild the config from the full history
    pub async fn submit_regions(&self, scanned: Vec<ScanRegion>) -> Arc<CompileReport> {
        // Held through the swap so concurrent submissions publish in order
        let mut regions = self.regions.lock().await;
        for region in scanned {
            regions.insert(RegionKey::from(&region), region);
        }

        let (config, report) = compile(regions.values(), self.parser.as_ref());
        if !report.dangling_connections.is_empty() {
            warn!(
                "Dropped {} dangling connections while compiling signs",
                report.dangling_connections.len()
            );
        }

        let report = Arc::new(report);
        *self.current.write().await = Arc::new(config);
        *self.last_report.write().await = report.clone();
        info!("Sign config updated from {} scanned regions", regions.len());

        report
    }

    /// Current snapshot
    pub async fn current(&self) -> Arc<CompiledSignConfig> {
        self.current.read().await.clone()
    }

    pub async fn last_report(&self) -> Arc<CompileReport> {
        self.last_report.read().await.clone()
    }

    pub async fn region_count(&self) -> usize {
        self.regions.lock().await.len()
    }
}
