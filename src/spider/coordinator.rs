//! Spider state machine
//!
//! The coordinator sees every map and layer event and decides when the
//! spider expands or collapses. Transitions never call application code
//! directly: they return [`Effect`]s which the caller applies once it has
//! released its own borrows.

use crate::{
    core::{
        config::SpiderClusterOptions,
        constants::ZOOM_EPSILON,
        geo::{LatLng, Point},
    },
    input::{
        events::{EventKind, MapEvent, Primitive},
        handler::Effect,
    },
    layers::{
        marker::Marker,
        spider::{OverlaySurface, ProxyId, SpiderLayer},
    },
    spatial::clustering::ClusterPin,
    spider::{
        renderer::SpiderRenderer,
        state::{ClickCounter, ClusterRuntimeState, SpiderPhase},
    },
    traits::MapView,
};
use std::rc::Rc;

pub struct EventCoordinator<S: OverlaySurface = SpiderLayer> {
    state: ClusterRuntimeState,
    renderer: SpiderRenderer<S>,
    options: SpiderClusterOptions,
}

impl EventCoordinator<SpiderLayer> {
    pub fn new(options: SpiderClusterOptions) -> Self {
        Self::with_renderer(SpiderRenderer::default(), options)
    }
}

impl<S: OverlaySurface> EventCoordinator<S> {
    pub fn with_renderer(renderer: SpiderRenderer<S>, options: SpiderClusterOptions) -> Self {
        Self {
            state: ClusterRuntimeState::default(),
            renderer,
            options,
        }
    }

    pub fn state(&self) -> &ClusterRuntimeState {
        &self.state
    }

    pub fn phase(&self) -> SpiderPhase {
        self.state.phase()
    }

    pub fn renderer(&self) -> &SpiderRenderer<S> {
        &self.renderer
    }

    pub fn options(&self) -> &SpiderClusterOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut SpiderClusterOptions {
        &mut self.options
    }

    /// Records the zoom the view currently has, so the next view-change end
    /// can tell whether the zoom moved
    pub fn observe_zoom(&mut self, zoom: f64) {
        self.state.last_zoom = Some(zoom);
    }

    /// Runs one event through the state machine
    pub fn handle<V: MapView + ?Sized>(&mut self, view: &V, event: &MapEvent) -> Vec<Effect> {
        match event {
            MapEvent::Click { target: None, .. } => self.background_click(),
            MapEvent::Click {
                target: Some(target),
                ..
            } => match target {
                Primitive::ClusterPin(cluster) => self.cluster_click(cluster, view),
                Primitive::SpiderProxy(id) => self.proxy_click(*id, event),
                Primitive::Marker(marker) => self.marker_click(marker),
            },
            MapEvent::MouseOver {
                target: Primitive::SpiderProxy(id),
                location,
                pixel,
            } => self.proxy_hover(*id, *location, *pixel),
            MapEvent::MouseOut {
                target: Primitive::SpiderProxy(id),
                ..
            } => self.proxy_unhover(*id),
            MapEvent::MouseOver { .. } | MapEvent::MouseOut { .. } => Vec::new(),
            MapEvent::ViewChangeStart { .. } => {
                if self.options.collapse_on_map_change && self.state.is_expanded() {
                    log::debug!("view change started, collapsing spider");
                    self.collapse()
                } else {
                    Vec::new()
                }
            }
            MapEvent::ViewChangeEnd { zoom, .. } => self.view_change_end(*zoom),
        }
    }

    /// Expands `cluster`, or collapses it when it is already the expanded one
    pub fn cluster_click<V: MapView + ?Sized>(
        &mut self,
        cluster: &Rc<ClusterPin>,
        view: &V,
    ) -> Vec<Effect> {
        if self.state.is_current(cluster) {
            return self.collapse();
        }
        self.expand(cluster, view)
    }

    /// Replaces whatever is expanded with `cluster`
    pub fn expand<V: MapView + ?Sized>(&mut self, cluster: &Rc<ClusterPin>, view: &V) -> Vec<Effect> {
        let effects = self.collapse();

        if let Some(proxies) = self.renderer.show(cluster, view, &self.options) {
            self.state.current = Some(cluster.clone());
            self.state.proxies = proxies;
            self.state.clicks = ClickCounter::Counting(0);
        }

        effects
    }

    /// Tears the spider down. Only reports `on_marker_unselected` when
    /// something was actually showing.
    pub fn collapse(&mut self) -> Vec<Effect> {
        let was_expanded = self.state.current.take().is_some();
        let cleared = self.renderer.hide();
        self.state.proxies.clear();
        self.state.clicks = ClickCounter::Suppressed;

        if !(was_expanded || cleared) {
            return Vec::new();
        }

        log::debug!("spider collapsed");
        self.options
            .on_marker_unselected
            .clone()
            .map(|callback| Effect::MarkerUnselected { callback })
            .into_iter()
            .collect()
    }

    fn background_click(&mut self) -> Vec<Effect> {
        let threshold = self.options.collapse_on_nth_click;
        match self.state.clicks.increment() {
            Some(clicks) if threshold > 0 && clicks >= threshold => {
                log::debug!("background click {clicks} of {threshold}, collapsing spider");
                self.collapse()
            }
            _ => Vec::new(),
        }
    }

    fn view_change_end(&mut self, zoom: f64) -> Vec<Effect> {
        let zoom_changed = self
            .state
            .last_zoom
            .is_some_and(|last| (last - zoom).abs() > ZOOM_EPSILON);
        self.state.last_zoom = Some(zoom);

        if zoom_changed {
            self.collapse()
        } else {
            Vec::new()
        }
    }

    fn proxy_click(&mut self, id: ProxyId, event: &MapEvent) -> Vec<Effect> {
        let Some(proxy) = self.state.proxy(id) else {
            log::debug!("click on unknown spider proxy {id:?}");
            return Vec::new();
        };
        let Some(parent) = proxy.parent() else {
            log::warn!("spider proxy {id:?} outlived its marker, click dropped");
            return Vec::new();
        };
        let cluster = proxy.cluster.clone();

        let mut effects: Vec<Effect> = self.selected(&parent, Some(cluster)).into_iter().collect();
        effects.push(Effect::Forward {
            marker: parent,
            kind: EventKind::Click,
            event: event.clone(),
        });
        effects
    }

    /// An ordinary pin only reports a selection while a spider is open
    fn marker_click(&self, marker: &Rc<Marker>) -> Vec<Effect> {
        if !self.state.is_expanded() {
            return Vec::new();
        }
        self.selected(marker, None).into_iter().collect()
    }

    fn proxy_hover(&mut self, id: ProxyId, location: LatLng, pixel: Point) -> Vec<Effect> {
        let Some(proxy) = self.state.proxy(id) else {
            return Vec::new();
        };
        let (stick, parent) = (proxy.stick, proxy.parent());
        self.renderer
            .set_stick_style(stick, &self.options.stick_hover_style);

        if !self.options.invoke_click_on_hover {
            return Vec::new();
        }
        match parent {
            Some(parent) => vec![Effect::Forward {
                marker: parent.clone(),
                kind: EventKind::Click,
                event: MapEvent::Click {
                    target: Some(Primitive::Marker(parent)),
                    location,
                    pixel,
                },
            }],
            None => {
                log::warn!("spider proxy {id:?} outlived its marker, hover click dropped");
                Vec::new()
            }
        }
    }

    fn proxy_unhover(&mut self, id: ProxyId) -> Vec<Effect> {
        if let Some(stick) = self.state.proxy(id).map(|proxy| proxy.stick) {
            self.renderer.set_stick_style(stick, &self.options.stick_style);
        }
        Vec::new()
    }

    fn selected(&self, marker: &Rc<Marker>, cluster: Option<Rc<ClusterPin>>) -> Option<Effect> {
        self.options
            .on_marker_selected
            .clone()
            .map(|callback| Effect::MarkerSelected {
                callback,
                marker: marker.clone(),
                cluster,
            })
    }
}

impl<S: OverlaySurface> std::fmt::Debug for EventCoordinator<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventCoordinator")
            .field("state", &self.state)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}
