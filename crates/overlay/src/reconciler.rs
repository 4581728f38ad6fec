use std::rc::Rc;

use foundation::ids::FeatureId;
use layers::query::QueryOptions;
use runtime::{EventKind, MapEvent, Metrics, Subscriptions};
use tracing::{debug, warn};

use crate::engine::MapEngine;
use crate::marker::{OverlayFactory, RenderError};
use crate::retained::{OverlayMap, RetainedOverlays};

/// Summary of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReconcileOutcome {
    /// A new mapping was published.
    pub changed: bool,
    /// Features returned by the query, duplicates included.
    pub queried: usize,
    pub created: usize,
    pub reused: usize,
    pub dropped: usize,
    /// Features the factory could not render; they are tried again next pass.
    pub rejected: Vec<(FeatureId, RenderError)>,
    /// Query positions of features that carried no id and were left out.
    pub unkeyed: Vec<usize>,
}

/// Keeps one overlay element per feature of a source that the engine
/// currently materializes under `options`.
///
/// Passes run on "source loaded" data events and on camera moves, never on
/// render frames. Every pass runs synchronously inside
/// [`Reconciler::handle_event`], so the published map is current by the time
/// the host draws the next frame.
pub struct Reconciler<E, F: OverlayFactory> {
    source_id: String,
    options: QueryOptions,
    factory: F,
    engine: Option<Rc<E>>,
    subscriptions: Option<Subscriptions>,
    overlays: RetainedOverlays<F::Element>,
    metrics: Metrics,
}

impl<E: MapEngine, F: OverlayFactory> Reconciler<E, F> {
    pub fn new(source_id: impl Into<String>, options: QueryOptions, factory: F) -> Self {
        Self {
            source_id: source_id.into(),
            options,
            factory,
            engine: None,
            subscriptions: None,
            overlays: RetainedOverlays::new(),
            metrics: Metrics::new(),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    /// Starts listening for data events from `engine`.
    ///
    /// Move listeners are added once the source reports loaded. If it
    /// already is, they are added right away and a first pass runs.
    pub fn attach(&mut self, engine: Rc<E>) -> Option<ReconcileOutcome> {
        self.detach();
        let mut subs = Subscriptions::new(&engine.event_bus());
        subs.add(EventKind::Data);
        let loaded = engine.is_source_loaded(&self.source_id);
        self.subscriptions = Some(subs);
        self.engine = Some(engine);

        if loaded {
            self.listen_for_moves();
            return Some(self.reconcile());
        }
        None
    }

    /// Releases every listener and forgets the engine and its overlays.
    pub fn detach(&mut self) {
        self.subscriptions = None;
        self.engine = None;
        self.overlays.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.engine.is_some()
    }

    pub fn is_listening(&self, kind: EventKind) -> bool {
        self.subscriptions
            .as_ref()
            .is_some_and(|subs| subs.contains(kind))
    }

    /// Returns `None` when the event is not a trigger for this reconciler.
    pub fn handle_event(&mut self, event: &MapEvent) -> Option<ReconcileOutcome> {
        if !self.is_listening(event.kind()) {
            return None;
        }
        match event {
            MapEvent::Data(data) => {
                if data.source_id != self.source_id || !data.is_source_loaded {
                    return None;
                }
                self.listen_for_moves();
                Some(self.reconcile())
            }
            MapEvent::Move | MapEvent::MoveEnd => Some(self.reconcile()),
            MapEvent::MoveStart | MapEvent::Render => None,
        }
    }

    fn listen_for_moves(&mut self) {
        if let Some(subs) = self.subscriptions.as_mut() {
            subs.add(EventKind::Move);
            subs.add(EventKind::MoveEnd);
        }
    }

    /// Queries the engine and carries the overlay map over to the result.
    ///
    /// Without an engine this is a no-op pass. Features without an id cannot
    /// be keyed; they are reported in [`ReconcileOutcome::unkeyed`] and the
    /// rest of the query is reconciled as usual.
    pub fn reconcile(&mut self) -> ReconcileOutcome {
        let Some(engine) = &self.engine else {
            return ReconcileOutcome::default();
        };
        let features = engine.query_source_features(&self.source_id, &self.options);
        self.metrics.inc_counter("reconcile.passes", 1);
        self.metrics
            .record_histogram("reconcile.features", features.len() as u64);

        let mut keyed = Vec::with_capacity(features.len());
        let mut unkeyed = Vec::new();
        for (index, feature) in features.iter().enumerate() {
            match &feature.id {
                Some(id) => keyed.push((id.clone(), feature)),
                None => {
                    warn!(source = %self.source_id, index, "feature without id left out");
                    unkeyed.push(index);
                }
            }
        }

        let factory = &mut self.factory;
        let step = self
            .overlays
            .carry_over(keyed, |feature| factory.render(feature));

        for (id, err) in &step.rejected {
            warn!(source = %self.source_id, %id, "overlay not created: {err}");
        }
        self.metrics.inc_counter("overlay.created", step.created as u64);
        self.metrics.inc_counter("overlay.reused", step.reused as u64);
        self.metrics.inc_counter("overlay.dropped", step.dropped as u64);
        self.metrics
            .inc_counter("overlay.rejected", step.rejected.len() as u64);
        self.metrics
            .inc_counter("overlay.unkeyed", unkeyed.len() as u64);
        debug!(
            source = %self.source_id,
            queried = features.len(),
            created = step.created,
            reused = step.reused,
            dropped = step.dropped,
            changed = step.changed,
            "reconciled"
        );

        ReconcileOutcome {
            changed: step.changed,
            queried: features.len(),
            created: step.created,
            reused: step.reused,
            dropped: step.dropped,
            rejected: step.rejected,
            unkeyed,
        }
    }

    /// The published identity -> element map.
    pub fn overlays(&self) -> &Rc<OverlayMap<F::Element>> {
        self.overlays.published()
    }

    /// Elements in identity order, ready to be drawn.
    pub fn elements(&self) -> impl Iterator<Item = &Rc<F::Element>> {
        self.overlays.published().values()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::Reconciler;
    use crate::engine::{MapEngine, MemoryEngine};
    use crate::marker::{ClusterMarkerFactory, FromFn, RenderError, from_fn};
    use foundation::bounds::ViewState;
    use foundation::feature::{Feature, Properties};
    use foundation::ids::FeatureId;
    use layers::query::QueryOptions;
    use layers::scene::cluster_filter;
    use layers::symbology::Classification;
    use runtime::{EventKind, MapEvent};
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    const SOURCE: &str = "earthquakes";

    type Labeler = FromFn<fn(&Feature) -> Result<String, RenderError>>;

    fn label(f: &Feature) -> Result<String, RenderError> {
        Ok(format!("marker-{}", f.id.as_ref().map(|id| id.to_string()).unwrap_or_default()))
    }

    fn cluster(id: u64, lng: f64, counts: [f64; 5]) -> Feature {
        let mut props = Properties::new().with("cluster", true);
        for (i, c) in counts.iter().enumerate() {
            props.insert(format!("mag{}", i + 1), *c);
        }
        Feature::point(id, lng, 0.0, props)
    }

    fn single(id: u64, lng: f64, mag: f64) -> Feature {
        Feature::point(id, lng, 0.0, Properties::new().with("mag", mag))
    }

    fn setup() -> (Rc<MemoryEngine>, Reconciler<MemoryEngine, Labeler>) {
        let engine = Rc::new(MemoryEngine::new(ViewState::new(0.0, 20.0, 2.0)));
        let reconciler = Reconciler::new(
            SOURCE,
            QueryOptions::filtered(cluster_filter()),
            from_fn(label as fn(&Feature) -> Result<String, RenderError>),
        );
        (engine, reconciler)
    }

    fn pump<F: crate::marker::OverlayFactory>(
        engine: &MemoryEngine,
        reconciler: &mut Reconciler<MemoryEngine, F>,
    ) -> usize {
        let mut passes = 0;
        while let Some(event) = engine.poll_event() {
            if reconciler.handle_event(&event).is_some() {
                passes += 1;
            }
        }
        passes
    }

    fn id(n: u64) -> FeatureId {
        FeatureId::from(n)
    }

    #[test]
    fn nothing_happens_before_attach() {
        let (engine, mut r) = setup();
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5])]);
        assert_eq!(pump(&engine, &mut r), 0);
        assert!(r.overlays().is_empty());
        assert_eq!(r.reconcile().queried, 0);
        assert_eq!(engine.query_count(), 0);
    }

    #[test]
    fn first_pass_runs_when_source_loads() {
        let (engine, mut r) = setup();
        engine.add_source(SOURCE);
        assert_eq!(r.attach(Rc::clone(&engine)), None);
        assert!(r.is_listening(EventKind::Data));
        assert!(!r.is_listening(EventKind::Move));

        engine.set_source_data(
            SOURCE,
            vec![cluster(1, 0.0, [1.0; 5]), single(2, 1.0, 3.2), cluster(3, 2.0, [2.0; 5])],
        );
        assert_eq!(pump(&engine, &mut r), 1);
        assert!(r.is_listening(EventKind::Move));
        assert!(r.is_listening(EventKind::MoveEnd));
        let ids: Vec<_> = r.overlays().keys().cloned().collect();
        assert_eq!(ids, vec![id(1), id(3)]);
    }

    #[test]
    fn attach_to_loaded_source_reconciles_immediately() {
        let (engine, mut r) = setup();
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5])]);
        let outcome = r.attach(Rc::clone(&engine));
        assert_eq!(outcome.unwrap().created, 1);
        assert!(r.is_listening(EventKind::MoveEnd));
    }

    #[test]
    fn ignores_other_sources_unloaded_data_and_render_frames() {
        let (engine, mut r) = setup();
        r.attach(Rc::clone(&engine));
        engine.set_source_data("volcanoes", vec![cluster(1, 0.0, [1.0; 5])]);
        engine.begin_loading(SOURCE);
        engine.render_frame();
        engine.move_to(ViewState::new(5.0, 20.0, 3.0), None);
        assert_eq!(pump(&engine, &mut r), 0);
        assert_eq!(engine.query_count(), 0);
    }

    #[test]
    fn surviving_features_keep_their_element() {
        let (engine, mut r) = setup();
        r.attach(Rc::clone(&engine));
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5]), cluster(2, 1.0, [1.0; 5])]);
        pump(&engine, &mut r);
        let kept = Rc::clone(&r.overlays()[&id(2)]);

        engine.set_source_data(SOURCE, vec![cluster(2, 1.0, [1.0; 5]), cluster(4, 3.0, [1.0; 5])]);
        pump(&engine, &mut r);
        assert!(Rc::ptr_eq(&kept, &r.overlays()[&id(2)]));
        assert!(!r.overlays().contains_key(&id(1)));
        assert_eq!(r.overlays()[&id(4)].as_str(), "marker-4");
    }

    #[test]
    fn continuous_moves_keep_published_map_when_nothing_changes() {
        let (engine, mut r) = setup();
        r.attach(Rc::clone(&engine));
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5]), cluster(2, 1.0, [1.0; 5])]);
        pump(&engine, &mut r);
        let published = Rc::clone(r.overlays());

        engine.move_through(
            (1..=10).map(|i| ViewState::new(f64::from(i) * 0.1, 20.0, 2.0)),
            None,
        );
        // ten moves plus the move end; the start is not a trigger
        assert_eq!(pump(&engine, &mut r), 11);
        assert!(Rc::ptr_eq(&published, r.overlays()));
        assert_eq!(r.metrics().counter("overlay.created"), 2);
        assert_eq!(r.metrics().counter("overlay.reused"), 22);
    }

    #[test]
    fn panned_away_feature_is_removed() {
        use foundation::bounds::LngLatBounds;

        let (engine, mut r) = setup();
        r.attach(Rc::clone(&engine));
        engine.set_source_data(SOURCE, vec![cluster(1, -100.0, [1.0; 5]), cluster(2, 100.0, [1.0; 5])]);
        pump(&engine, &mut r);
        assert_eq!(r.overlays().len(), 2);

        engine.move_to(
            ViewState::new(100.0, 0.0, 4.0),
            Some(LngLatBounds::new(80.0, -20.0, 120.0, 20.0)),
        );
        pump(&engine, &mut r);
        let ids: Vec<_> = r.overlays().keys().cloned().collect();
        assert_eq!(ids, vec![id(2)]);
    }

    #[test]
    fn feature_without_id_is_left_out_of_the_pass() {
        let (engine, mut r) = setup();
        r.attach(Rc::clone(&engine));
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5])]);
        pump(&engine, &mut r);

        let mut anonymous = cluster(9, 0.0, [1.0; 5]);
        anonymous.id = None;
        engine.set_source_data(SOURCE, vec![cluster(2, 0.0, [1.0; 5]), anonymous]);
        let event = engine.poll_event().unwrap();
        let outcome = r.handle_event(&event).unwrap();
        assert_eq!(outcome.unkeyed, vec![1]);
        assert_eq!((outcome.created, outcome.dropped), (1, 1));
        let ids: Vec<_> = r.overlays().keys().cloned().collect();
        assert_eq!(ids, vec![id(2)]);

        // later moves keep reconciling while the anonymous feature stays in view
        engine.move_through([ViewState::new(1.0, 20.0, 2.0), ViewState::new(2.0, 20.0, 2.0)], None);
        assert_eq!(pump(&engine, &mut r), 3);
        assert_eq!(r.overlays().len(), 1);
        assert_eq!(r.metrics().counter("overlay.unkeyed"), 4);
    }

    #[test]
    fn detach_releases_all_listeners() {
        let (engine, mut r) = setup();
        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [1.0; 5])]);
        r.attach(Rc::clone(&engine));
        assert_eq!(engine.event_bus().borrow().len(), 3);

        r.detach();
        assert!(engine.event_bus().borrow().is_empty());
        assert!(r.overlays().is_empty());
        assert_eq!(r.handle_event(&MapEvent::MoveEnd), None);
    }

    #[test]
    fn dropping_reconciler_releases_listeners() {
        let (engine, mut r) = setup();
        engine.set_source_data(SOURCE, Vec::new());
        r.attach(Rc::clone(&engine));
        assert!(!engine.event_bus().borrow().is_empty());
        drop(r);
        assert!(engine.event_bus().borrow().is_empty());
    }

    #[test]
    fn cluster_markers_with_bad_counts_are_retried() {
        let engine = Rc::new(MemoryEngine::new(ViewState::new(0.0, 20.0, 2.0)));
        let mut r = Reconciler::new(
            SOURCE,
            QueryOptions::filtered(cluster_filter()),
            ClusterMarkerFactory::new(Classification::earthquakes()),
        );
        r.attach(Rc::clone(&engine));

        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [0.0; 5]), cluster(2, 5.0, [3.0, 0.0, 0.0, 0.0, 0.0])]);
        let event = engine.poll_event().unwrap();
        let outcome = r.handle_event(&event).unwrap();
        assert_eq!(outcome.created, 1);
        assert_eq!(outcome.rejected.len(), 1);
        assert_eq!(outcome.rejected[0].0, id(1));

        let glyph = &r.overlays()[&id(2)].element;
        assert_eq!(glyph.label, "3");
        assert_eq!(glyph.segments.len(), 1);

        engine.set_source_data(SOURCE, vec![cluster(1, 0.0, [0.0, 1.0, 0.0, 0.0, 0.0]), cluster(2, 5.0, [3.0, 0.0, 0.0, 0.0, 0.0])]);
        pump(&engine, &mut r);
        assert_eq!(r.overlays().len(), 2);
        assert_eq!(r.metrics().counter("overlay.rejected"), 1);
    }
}
