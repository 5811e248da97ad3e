use crate::{
    layers::{
        marker::{Marker, MarkerOptions},
        spider::{ProxyId, StickId},
    },
    spatial::clustering::ClusterPin,
};
use std::rc::{Rc, Weak};

/// A proxy pin on the overlay together with the marker it stands in for
#[derive(Debug, Clone)]
pub struct SpiderProxy {
    pub id: ProxyId,
    pub cluster: Rc<ClusterPin>,
    pub parent: Weak<Marker>,
    pub stick: StickId,
    pub options: MarkerOptions,
}

impl SpiderProxy {
    /// The original marker, unless it has been dropped by its owner
    pub fn parent(&self) -> Option<Rc<Marker>> {
        self.parent.upgrade()
    }
}

/// Background clicks seen since the spider was expanded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClickCounter {
    /// Nothing is expanded, so background clicks are not counted
    #[default]
    Suppressed,
    Counting(u32),
}

impl ClickCounter {
    /// Counts one more click; returns the new total, `None` while suppressed
    pub fn increment(&mut self) -> Option<u32> {
        match self {
            ClickCounter::Suppressed => None,
            ClickCounter::Counting(n) => {
                *n += 1;
                Some(*n)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SpiderPhase {
    Collapsed,
    Expanded(Rc<ClusterPin>),
}

/// Everything the coordinator remembers between events
#[derive(Debug, Default)]
pub struct ClusterRuntimeState {
    pub current: Option<Rc<ClusterPin>>,
    pub clicks: ClickCounter,
    pub last_zoom: Option<f64>,
    pub proxies: Vec<SpiderProxy>,
}

impl ClusterRuntimeState {
    pub fn phase(&self) -> SpiderPhase {
        match &self.current {
            Some(cluster) => SpiderPhase::Expanded(cluster.clone()),
            None => SpiderPhase::Collapsed,
        }
    }

    pub fn is_expanded(&self) -> bool {
        self.current.is_some()
    }

    /// Whether `cluster` is the one currently expanded
    pub fn is_current(&self, cluster: &ClusterPin) -> bool {
        self.current
            .as_ref()
            .is_some_and(|current| current.id == cluster.id)
    }

    pub fn proxy(&self, id: ProxyId) -> Option<&SpiderProxy> {
        self.proxies.iter().find(|p| p.id == id)
    }
}
