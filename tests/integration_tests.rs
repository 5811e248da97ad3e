use spidercluster::prelude::*;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

/// Integration tests driving a cluster layer through the in-process map,
/// the way a user clicks, hovers, pans and zooms
#[cfg(test)]
mod integration_tests {
    use super::*;

    const CENTER: (f64, f64) = (47.6, -122.3);
    /// About 200 px east of the center at zoom 12
    const EAST_LNG: f64 = -122.23;

    fn init_logging() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    fn create_test_map() -> Rc<Map> {
        Rc::new(Map::new(Viewport::new(
            LatLng::new(CENTER.0, CENTER.1),
            12.0,
            Point::new(800.0, 600.0),
        )))
    }

    async fn spider_layer(
        map: &Rc<Map>,
        spider: SpiderClusterOptions,
    ) -> anyhow::Result<ClusterLayer> {
        let control: Rc<dyn MapControl> = map.clone();
        let options = ClusterLayerOptions::default()
            .with_click_action(ClusterClickAction::Spider)
            .with_spider(spider);
        Ok(ClusterLayer::create(&control, options).await?)
    }

    fn marker(id: &str, lng: f64) -> Rc<Marker> {
        Rc::new(Marker::new(
            id,
            LatLng::new(CENTER.0, lng),
            MarkerOptions::default().with_label(id),
        ))
    }

    /// Cluster A: three markers at the center. Cluster B: two markers east of it.
    fn seed(layer: &ClusterLayer) -> (Rc<ClusterPin>, Rc<ClusterPin>) {
        layer.set_entities(vec![
            marker("a0", CENTER.1),
            marker("a1", CENTER.1),
            marker("a2", CENTER.1),
            marker("b0", EAST_LNG),
            marker("b1", EAST_LNG),
        ]);
        let pins = layer.cluster_pins();
        assert_eq!(pins.len(), 2);

        let a = pins.iter().find(|p| p.len() == 3).cloned().unwrap();
        let b = pins.iter().find(|p| p.len() == 2).cloned().unwrap();
        (a, b)
    }

    fn counting_unselected() -> (SpiderClusterOptions, Rc<Cell<u32>>) {
        let count = Rc::new(Cell::new(0));
        let counter = count.clone();
        let options = SpiderClusterOptions::default()
            .with_marker_unselected(move || counter.set(counter.get() + 1));
        (options, count)
    }

    fn click_pin(map: &Map, pin: &Rc<ClusterPin>) {
        map.click(
            Some(Primitive::ClusterPin(pin.clone())),
            Point::new(400.0, 300.0),
        );
    }

    /// Opening a second cluster closes the first before drawing
    #[tokio::test]
    async fn test_single_expansion() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let (options, unselected) = counting_unselected();
        let layer = spider_layer(&map, options).await?;
        let (a, b) = seed(&layer);

        click_pin(&map, &a);
        assert_eq!(layer.expanded_cluster().map(|c| c.id.clone()), Some(a.id.clone()));
        assert_eq!(layer.spider_pins().len(), 3);

        click_pin(&map, &b);
        assert_eq!(layer.expanded_cluster().map(|c| c.id.clone()), Some(b.id.clone()));
        assert_eq!(layer.spider_pins().len(), 2);
        assert_eq!(layer.spider_sticks().len(), 2);
        assert_eq!(unselected.get(), 1);

        // every stick starts at the open cluster's center
        for stick in layer.spider_sticks() {
            assert_eq!(stick.from, b.location);
        }
        Ok(())
    }

    /// Clicking the open cluster again closes it
    #[tokio::test]
    async fn test_reclick_collapses() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let layer = spider_layer(&map, SpiderClusterOptions::default()).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        click_pin(&map, &a);

        assert_eq!(layer.spider_phase(), SpiderPhase::Collapsed);
        assert!(layer.spider_pins().is_empty());
        Ok(())
    }

    /// Collapsing with nothing open is silent, and collapsing twice notifies once
    #[tokio::test]
    async fn test_collapse_idempotence() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let (options, unselected) = counting_unselected();
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        layer.collapse_spider();
        layer.collapse_spider();
        assert_eq!(unselected.get(), 0);

        click_pin(&map, &a);
        layer.collapse_spider();
        layer.collapse_spider();
        assert_eq!(unselected.get(), 1);
        Ok(())
    }

    /// A proxy click reaches the original marker's click listeners exactly once
    #[tokio::test]
    async fn test_proxy_click_forwards_once() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let selected = Rc::new(RefCell::new(Vec::new()));
        let sink = selected.clone();
        let options = SpiderClusterOptions::default().with_marker_selected(move |marker, cluster| {
            sink.borrow_mut()
                .push((marker.id().to_string(), cluster.map(|c| c.id.clone())));
        });
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        let received = Rc::new(RefCell::new(Vec::new()));
        for id in ["a0", "a1", "a2"] {
            let sink = received.clone();
            layer
                .entity(id)
                .unwrap()
                .add_listener(EventKind::Click, move |event| {
                    sink.borrow_mut().push((id, event.clone()))
                });
        }

        click_pin(&map, &a);
        let proxy = layer.spider_pins()[1].clone();
        map.click(Some(Primitive::SpiderProxy(proxy.id)), Point::new(460.0, 300.0));

        let received = received.borrow();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, "a1");
        assert_eq!(received[0].1.target(), Some(&Primitive::SpiderProxy(proxy.id)));
        assert_eq!(
            *selected.borrow(),
            vec![("a1".to_string(), Some(a.id.clone()))]
        );
        assert_eq!(proxy.options.label.as_deref(), Some("a1"));
        // a proxy click does not close the spider
        assert!(layer.expanded_cluster().is_some());
        Ok(())
    }

    /// Zooming closes the spider; panning at the same zoom does not
    #[tokio::test]
    async fn test_zoom_change_collapses() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let (options, unselected) = counting_unselected();
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        map.pan_to(LatLng::new(47.601, -122.3));
        assert!(layer.expanded_cluster().is_some());

        map.set_zoom(13.0);
        assert_eq!(layer.spider_phase(), SpiderPhase::Collapsed);
        assert_eq!(unselected.get(), 1);

        // the next zoom with nothing open stays silent
        map.set_zoom(14.0);
        assert_eq!(unselected.get(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_collapse_on_map_change() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let options = SpiderClusterOptions::default().with_collapse_on_map_change(true);
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        map.pan_to(LatLng::new(47.601, -122.3));

        assert_eq!(layer.spider_phase(), SpiderPhase::Collapsed);
        Ok(())
    }

    /// With N = 3 the spider survives two background clicks and closes on the third
    #[tokio::test]
    async fn test_nth_background_click() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let options = SpiderClusterOptions::default().with_collapse_on_nth_click(3);
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        // clicks before anything is open are not counted
        map.click(None, Point::new(10.0, 10.0));
        click_pin(&map, &a);

        map.click(None, Point::new(10.0, 10.0));
        map.click(None, Point::new(10.0, 10.0));
        assert!(layer.expanded_cluster().is_some());

        map.click(None, Point::new(10.0, 10.0));
        assert!(layer.expanded_cluster().is_none());
        Ok(())
    }

    /// The default closes on the first background click
    #[tokio::test]
    async fn test_default_background_click() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let layer = spider_layer(&map, SpiderClusterOptions::default()).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        map.click(None, Point::new(10.0, 10.0));

        assert!(layer.expanded_cluster().is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_hover_restyles_stick() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let options = SpiderClusterOptions::default().with_invoke_click_on_hover(false);
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        let clicks = Rc::new(Cell::new(0));
        let counter = clicks.clone();
        layer
            .entity("a0")
            .unwrap()
            .add_listener(EventKind::Click, move |_| counter.set(counter.get() + 1));

        click_pin(&map, &a);
        let proxy = layer.spider_pins()[0].id;
        map.mouse_over(Primitive::SpiderProxy(proxy), Point::new(460.0, 300.0));

        let hovered: Vec<StickStyle> = layer.spider_sticks().into_iter().map(|s| s.style).collect();
        assert_eq!(hovered.iter().filter(|s| **s == StickStyle::hover()).count(), 1);
        assert_eq!(clicks.get(), 0);

        map.mouse_out(Primitive::SpiderProxy(proxy), Point::new(460.0, 300.0));
        assert!(layer
            .spider_sticks()
            .iter()
            .all(|s| s.style == StickStyle::default()));
        Ok(())
    }

    #[tokio::test]
    async fn test_hover_invokes_click() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let layer = spider_layer(&map, SpiderClusterOptions::default()).await?;
        let (a, _) = seed(&layer);

        let clicks = Rc::new(Cell::new(0));
        let counter = clicks.clone();
        let a0 = layer.entity("a0").unwrap();
        a0.add_listener(EventKind::Click, move |_| counter.set(counter.get() + 1));

        click_pin(&map, &a);
        let proxy = layer.spider_pins()[0].id;
        map.mouse_over(Primitive::SpiderProxy(proxy), Point::new(460.0, 300.0));

        assert_eq!(clicks.get(), 1);
        Ok(())
    }

    /// Additions between the first and last marker of a batch reach the
    /// clusterer in one update
    #[tokio::test]
    async fn test_batch_suppression() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let layer = spider_layer(&map, SpiderClusterOptions::default()).await?;
        let before = layer.native_revision();

        let location = LatLng::new(CENTER.0, CENTER.1);
        layer.add_entity(Rc::new(
            Marker::new("first", location, MarkerOptions::default()).first_of_batch(),
        ));
        for i in 0..10 {
            layer.add_entity(marker(&format!("mid{i}"), CENTER.1));
        }
        assert_eq!(layer.native_revision(), before);

        layer.add_entity(Rc::new(
            Marker::new("last", location, MarkerOptions::default()).last_of_batch(),
        ));
        assert_eq!(layer.native_revision(), before + 1);
        assert_eq!(layer.cluster_pins()[0].len(), 12);
        Ok(())
    }

    /// A large cluster opens as a spiral
    #[tokio::test]
    async fn test_spiral_expansion() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let layer = spider_layer(&map, SpiderClusterOptions::default()).await?;
        layer.set_entities(
            (0..20)
                .map(|i| marker(&format!("m{i:02}"), CENTER.1))
                .collect(),
        );
        let pin = layer.cluster_pins()[0].clone();

        click_pin(&map, &pin);

        let pins = layer.spider_pins();
        assert_eq!(pins.len(), 20);
        let center = map.viewport().lat_lng_to_pixel(&pin.location);
        let radii: Vec<f64> = pins
            .iter()
            .map(|p| map.viewport().lat_lng_to_pixel(&p.location).distance_to(&center))
            .collect();
        assert!(radii.windows(2).all(|w| w[1] >= w[0] - 1e-6));
        Ok(())
    }

    /// Callbacks may drive the map while the layer reacts to the event
    #[tokio::test]
    async fn test_callbacks_can_reenter_the_map() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let weak = Rc::downgrade(&map);
        let options = SpiderClusterOptions::default().with_marker_selected(move |_, _| {
            if let Some(map) = weak.upgrade() {
                map.set_zoom(14.0);
            }
        });
        let layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        let proxy = layer.spider_pins()[0].id;
        map.click(Some(Primitive::SpiderProxy(proxy)), Point::new(460.0, 300.0));

        assert_eq!(map.zoom(), 14.0);
        assert_eq!(layer.spider_phase(), SpiderPhase::Collapsed);
        Ok(())
    }

    /// Layer creation waits for the map and subscribes only afterwards
    #[tokio::test]
    async fn test_create_waits_for_ready_map() -> anyhow::Result<()> {
        init_logging();
        let map = Rc::new(Map::loading(Viewport::new(
            LatLng::new(CENTER.0, CENTER.1),
            12.0,
            Point::new(800.0, 600.0),
        )));
        let control: Rc<dyn MapControl> = map.clone();

        let pending = ClusterLayer::create(&control, ClusterLayerOptions::default());
        futures::pin_mut!(pending);
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert_eq!(map.subscription_count(), 0);

        map.mark_ready();
        let layer = pending.await?;
        assert!(map.subscription_count() > 0);
        drop(layer);
        assert_eq!(map.subscription_count(), 0);
        Ok(())
    }

    /// Deleting a layer clears its spider without reporting a collapse
    #[tokio::test]
    async fn test_delete_clears_expanded_spider() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let (options, unselected) = counting_unselected();
        let mut layer = spider_layer(&map, options).await?;
        let (a, _) = seed(&layer);

        click_pin(&map, &a);
        assert_eq!(layer.spider_pins().len(), 3);

        layer.delete();
        assert!(layer.spider_pins().is_empty());
        assert!(layer.spider_sticks().is_empty());
        assert_eq!(unselected.get(), 0);
        assert_eq!(map.subscription_count(), 0);
        Ok(())
    }

    /// Spider support goes only onto cluster layers
    #[tokio::test]
    async fn test_initialize_spider_support() -> anyhow::Result<()> {
        init_logging();
        let map = create_test_map();
        let control: Rc<dyn MapControl> = map.clone();
        let mut layer = ClusterLayer::create(&control, ClusterLayerOptions::default()).await?;
        let (a, _) = seed(&layer);

        // without spidering a cluster click zooms in
        assert_eq!(layer.click_action(), ClusterClickAction::ZoomIntoCluster);
        assert!(initialize_spider_support(&mut layer, None)?);
        assert!(!initialize_spider_support(&mut layer, None)?);

        click_pin(&map, &a);
        assert!(layer.expanded_cluster().is_some());

        let mut overlay = SpiderLayer::new("overlay".to_string());
        assert!(matches!(
            initialize_spider_support(&mut overlay, None),
            Err(MapError::Layer(_))
        ));
        Ok(())
    }
}
