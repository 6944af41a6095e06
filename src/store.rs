//! Scan persistence seam. The engine writes snapshots through `ScanStore`
//! so results outlive the run; the in-memory store is the default backend.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::Scan;

#[async_trait]
pub trait ScanStore: Send + Sync {
    /// Insert or replace the stored snapshot of a scan.
    async fn save(&self, scan: &Scan) -> Result<()>;

    async fn get(&self, id: Uuid) -> Result<Option<Scan>>;

    /// All stored scans, newest first.
    async fn list(&self) -> Result<Vec<Scan>>;
}

/// Keeps scans in a shared map. Suits one-shot CLI runs and tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryScanStore {
    scans: Arc<RwLock<HashMap<Uuid, Scan>>>,
}

impl MemoryScanStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ScanStore for MemoryScanStore {
    async fn save(&self, scan: &Scan) -> Result<()> {
        self.scans.write().await.insert(scan.id, scan.clone());
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Option<Scan>> {
        Ok(self.scans.read().await.get(&id).cloned())
    }

    async fn list(&self) -> Result<Vec<Scan>> {
        let mut scans: Vec<Scan> = self.scans.read().await.values().cloned().collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(scans)
    }
}
