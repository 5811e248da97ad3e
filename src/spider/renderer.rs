use crate::{
    core::config::{SpiderClusterOptions, StickStyle},
    layers::spider::{OverlaySurface, SpiderLayer, StickId},
    spatial::clustering::ClusterPin,
    spider::{layout::compute_positions, state::SpiderProxy},
    traits::MapView,
};
use std::rc::Rc;

/// Draws and tears down the spider on a dedicated overlay
pub struct SpiderRenderer<S: OverlaySurface = SpiderLayer> {
    surface: S,
    showing: bool,
}

impl<S: OverlaySurface> SpiderRenderer<S> {
    pub fn new(surface: S) -> Self {
        Self {
            surface,
            showing: false,
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn is_showing(&self) -> bool {
        self.showing
    }

    /// Lays out the cluster's members around its center and puts one stick
    /// and one proxy pin per member on the overlay.
    ///
    /// Members whose position has no on-screen location are left out.
    /// Returns `None`, drawing nothing, when the cluster center itself is off
    /// screen.
    pub fn show<V: MapView + ?Sized>(
        &mut self,
        cluster: &Rc<ClusterPin>,
        view: &V,
        options: &SpiderClusterOptions,
    ) -> Option<Vec<SpiderProxy>> {
        let Some(center) = view.location_to_pixel(&cluster.location) else {
            log::debug!("cluster {} has no screen position, not expanding", cluster.id);
            return None;
        };

        let members = cluster.members();
        let positions = compute_positions(center, members.len(), options);
        let mut proxies = Vec::with_capacity(members.len());

        for (member, position) in members.iter().zip(positions) {
            let Some(location) = view.pixel_to_location(&position) else {
                log::debug!(
                    "skipping spider proxy for {}: ({:.1}, {:.1}) is off screen",
                    member.id(),
                    position.x,
                    position.y
                );
                continue;
            };

            let stick = self
                .surface
                .insert_line(cluster.location, location, &options.stick_style);
            let visual = member.options();
            let id = self.surface.insert_pin(location, &visual);

            proxies.push(SpiderProxy {
                id,
                cluster: cluster.clone(),
                parent: Rc::downgrade(member),
                stick,
                options: visual,
            });
        }

        self.showing = true;
        log::debug!(
            "expanded cluster {} into {} of {} proxies",
            cluster.id,
            proxies.len(),
            members.len()
        );
        Some(proxies)
    }

    /// Clears the overlay; returns false when nothing was showing
    pub fn hide(&mut self) -> bool {
        if !self.showing {
            return false;
        }
        self.surface.clear();
        self.showing = false;
        true
    }

    pub fn set_stick_style(&mut self, stick: StickId, style: &StickStyle) {
        self.surface.set_line_style(stick, style);
    }
}

impl Default for SpiderRenderer<SpiderLayer> {
    fn default() -> Self {
        Self::new(SpiderLayer::new("spider-overlay".to_string()))
    }
}
