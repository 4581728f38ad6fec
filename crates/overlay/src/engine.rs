use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};

use foundation::bounds::{LngLatBounds, ViewState};
use foundation::feature::Feature;
use layers::query::{QueryOptions, filter_features};
use runtime::{EventBus, MapEvent, SharedEventBus};

/// The rendering engine, as seen by overlays.
///
/// Clustering, tiling and projection all live behind this trait; overlays
/// only subscribe to its events and ask which features are materialized.
pub trait MapEngine {
    fn event_bus(&self) -> SharedEventBus;

    fn is_source_loaded(&self, source_id: &str) -> bool;

    /// Features of `source_id` currently materialized by the engine.
    ///
    /// The same feature may be reported more than once when it spans
    /// several loaded tiles.
    fn query_source_features(&self, source_id: &str, options: &QueryOptions) -> Vec<Feature>;
}

#[derive(Debug, Default)]
struct SourceState {
    loaded: bool,
    features: Vec<Feature>,
}

/// In-process engine holding pre-clustered feature sets.
///
/// Mutations queue the events a real engine would fire; the host drains
/// them with [`MemoryEngine::poll_event`] and forwards each to its overlays.
#[derive(Debug)]
pub struct MemoryEngine {
    bus: SharedEventBus,
    sources: RefCell<BTreeMap<String, SourceState>>,
    pending: RefCell<VecDeque<MapEvent>>,
    view: Cell<ViewState>,
    visible: Cell<Option<LngLatBounds>>,
    queries: Cell<u64>,
}

impl MemoryEngine {
    pub fn new(view: ViewState) -> Self {
        Self {
            bus: EventBus::shared(),
            sources: RefCell::new(BTreeMap::new()),
            pending: RefCell::new(VecDeque::new()),
            view: Cell::new(view),
            visible: Cell::new(None),
            queries: Cell::new(0),
        }
    }

    fn push(&self, event: MapEvent) {
        self.pending.borrow_mut().push_back(event);
    }

    /// Registers a source that has started loading.
    pub fn add_source(&self, source_id: &str) {
        self.begin_loading(source_id);
    }

    pub fn begin_loading(&self, source_id: &str) {
        self.sources
            .borrow_mut()
            .entry(source_id.to_string())
            .or_default()
            .loaded = false;
        self.push(MapEvent::source_data(source_id, false));
    }

    /// Replaces the materialized features of a source and reports it loaded.
    pub fn set_source_data(&self, source_id: &str, features: Vec<Feature>) {
        {
            let mut sources = self.sources.borrow_mut();
            let state = sources.entry(source_id.to_string()).or_default();
            state.loaded = true;
            state.features = features;
        }
        self.push(MapEvent::source_data(source_id, true));
    }

    /// A complete camera move: one `MoveStart`, `Move` per step, one `MoveEnd`.
    ///
    /// `visible` limits which point features queries return afterwards.
    pub fn move_through(
        &self,
        steps: impl IntoIterator<Item = ViewState>,
        visible: Option<LngLatBounds>,
    ) {
        self.push(MapEvent::MoveStart);
        for view in steps {
            self.view.set(view);
            self.push(MapEvent::Move);
        }
        self.visible.set(visible);
        self.push(MapEvent::MoveEnd);
    }

    pub fn move_to(&self, view: ViewState, visible: Option<LngLatBounds>) {
        self.move_through([view], visible);
    }

    pub fn render_frame(&self) {
        self.push(MapEvent::Render);
    }

    pub fn poll_event(&self) -> Option<MapEvent> {
        self.pending.borrow_mut().pop_front()
    }

    pub fn view(&self) -> ViewState {
        self.view.get()
    }

    /// Number of `query_source_features` calls served so far.
    pub fn query_count(&self) -> u64 {
        self.queries.get()
    }
}

impl MapEngine for MemoryEngine {
    fn event_bus(&self) -> SharedEventBus {
        self.bus.clone()
    }

    fn is_source_loaded(&self, source_id: &str) -> bool {
        self.sources
            .borrow()
            .get(source_id)
            .is_some_and(|s| s.loaded)
    }

    fn query_source_features(&self, source_id: &str, options: &QueryOptions) -> Vec<Feature> {
        self.queries.set(self.queries.get() + 1);
        let sources = self.sources.borrow();
        let Some(state) = sources.get(source_id) else {
            return Vec::new();
        };
        let visible = self.visible.get();
        let in_view = state.features.iter().filter(|f| match (visible, f.geometry.point()) {
            (Some(bounds), Some(p)) => bounds.contains(p),
            _ => true,
        });
        filter_features(in_view, options)
    }
}
