//! Ordered data-source probes.
//!
//! Resolution walks the probes in order and takes the first document found.
//! A probe that fails is logged and skipped. The canonical probe always comes
//! first, so a canonical record wins over a legacy one unconditionally.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use waggle_types::UserId;

use crate::config::ReconcilerConfig;
use crate::document::SubscriptionDocument;
use crate::error::StoreError;
use crate::snapshot::SnapshotSource;
use crate::store::{DocumentPath, SubscriptionStore};

/// One place a subscription might be found.
#[async_trait]
pub trait SubscriptionProbe: Send + Sync {
    /// Source to attribute a hit to.
    fn source(&self) -> SnapshotSource;

    /// Look for a document.
    async fn probe(&self, user_id: &UserId) -> Result<Option<SubscriptionDocument>, StoreError>;
}

/// Probe reading one document location once.
pub struct DocumentProbe {
    store: Arc<dyn SubscriptionStore>,
    path: DocumentPath,
}

impl DocumentProbe {
    /// Probe `path` in `store`.
    pub fn new(store: Arc<dyn SubscriptionStore>, path: DocumentPath) -> Self {
        Self { store, path }
    }
}

#[async_trait]
impl SubscriptionProbe for DocumentProbe {
    fn source(&self) -> SnapshotSource {
        match self.path {
            DocumentPath::Canonical => SnapshotSource::Canonical,
            DocumentPath::Legacy => SnapshotSource::Legacy,
        }
    }

    async fn probe(&self, user_id: &UserId) -> Result<Option<SubscriptionDocument>, StoreError> {
        match self.store.read(self.path, user_id).await? {
            Some(value) => SubscriptionDocument::from_value(value).map(Some),
            None => Ok(None),
        }
    }
}

/// Ordered list of probes.
pub struct ProbeChain {
    probes: Vec<Box<dyn SubscriptionProbe>>,
}

impl ProbeChain {
    /// Build from explicit probes, highest priority first.
    pub fn new(probes: Vec<Box<dyn SubscriptionProbe>>) -> Self {
        Self { probes }
    }

    /// Canonical document, then the legacy document when enabled.
    pub fn for_store(store: Arc<dyn SubscriptionStore>, config: &ReconcilerConfig) -> Self {
        let mut probes: Vec<Box<dyn SubscriptionProbe>> = vec![Box::new(DocumentProbe::new(
            store.clone(),
            DocumentPath::Canonical,
        ))];
        if config.legacy_fallback_enabled() {
            probes.push(Box::new(DocumentProbe::new(store, DocumentPath::Legacy)));
        }
        Self { probes }
    }

    /// Sources in probe order.
    pub fn sources(&self) -> Vec<SnapshotSource> {
        self.probes.iter().map(|probe| probe.source()).collect()
    }

    /// First document found across all probes.
    pub async fn resolve(&self, user_id: &UserId) -> Option<(SnapshotSource, SubscriptionDocument)> {
        Self::first_hit(&self.probes, user_id).await
    }

    /// First document found among the probes ranked below `source`.
    ///
    /// Used once `source` is already known to be empty or failing.
    pub async fn resolve_after(
        &self,
        source: SnapshotSource,
        user_id: &UserId,
    ) -> Option<(SnapshotSource, SubscriptionDocument)> {
        let start = self
            .probes
            .iter()
            .position(|probe| probe.source() == source)
            .map_or(0, |index| index + 1);
        Self::first_hit(&self.probes[start..], user_id).await
    }

    async fn first_hit(
        probes: &[Box<dyn SubscriptionProbe>],
        user_id: &UserId,
    ) -> Option<(SnapshotSource, SubscriptionDocument)> {
        for probe in probes {
            let source = probe.source();
            match probe.probe(user_id).await {
                Ok(Some(doc)) => {
                    debug!(%user_id, %source, "subscription document found");
                    return Some((source, doc));
                }
                Ok(None) => debug!(%user_id, %source, "no subscription document"),
                Err(err) => warn!(%user_id, %source, error = %err, "subscription probe failed"),
            }
        }
        None
    }
}

impl std::fmt::Debug for ProbeChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbeChain")
            .field("sources", &self.sources())
            .finish()
    }
}
