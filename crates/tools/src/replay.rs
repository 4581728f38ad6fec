use std::rc::Rc;

use foundation::feature::Feature;
use foundation::ids::FeatureId;
use layers::query::QueryOptions;
use overlay::{ClusterMarkerFactory, MemoryEngine, Reconciler};
use runtime::MetricsSnapshot;
use tracing::info;

use crate::config::AppConfig;

/// What the overlay looked like after one frame was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    pub markers: Vec<FeatureId>,
    pub created: usize,
    pub reused: usize,
    pub dropped: usize,
    pub rejected: Vec<(FeatureId, String)>,
    /// Positions of features without an id, per pass that saw them.
    pub unkeyed: Vec<usize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayReport {
    pub frames: Vec<FrameReport>,
    pub metrics: MetricsSnapshot,
}

/// Feeds each frame (the features the engine materializes at that moment)
/// through a fresh engine and cluster reconciler.
pub fn replay_frames(
    config: &AppConfig,
    options: QueryOptions,
    frames: Vec<Vec<Feature>>,
) -> ReplayReport {
    let settings = config.scene_settings();
    let engine = Rc::new(MemoryEngine::new(config.effective_view()));
    engine.add_source(&config.source.id);

    let mut reconciler = Reconciler::new(
        config.source.id.clone(),
        options,
        ClusterMarkerFactory::new(settings.classification),
    );
    reconciler.attach(Rc::clone(&engine));

    let mut reports = Vec::with_capacity(frames.len());
    for (index, features) in frames.into_iter().enumerate() {
        engine.set_source_data(&config.source.id, features);

        let mut report = FrameReport {
            markers: Vec::new(),
            created: 0,
            reused: 0,
            dropped: 0,
            rejected: Vec::new(),
            unkeyed: Vec::new(),
        };
        while let Some(event) = engine.poll_event() {
            let Some(outcome) = reconciler.handle_event(&event) else {
                continue;
            };
            report.created += outcome.created;
            report.reused += outcome.reused;
            report.dropped += outcome.dropped;
            report
                .rejected
                .extend(outcome.rejected.into_iter().map(|(id, e)| (id, e.to_string())));
            report.unkeyed.extend(outcome.unkeyed);
        }
        report.markers = reconciler.overlays().keys().cloned().collect();
        info!(
            frame = index,
            markers = report.markers.len(),
            created = report.created,
            dropped = report.dropped,
            "frame applied"
        );
        reports.push(report);
    }

    ReplayReport {
        frames: reports,
        metrics: reconciler.metrics().snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use super::replay_frames;
    use crate::config::AppConfig;
    use foundation::feature::{Feature, Properties};
    use foundation::ids::FeatureId;
    use layers::query::QueryOptions;
    use layers::scene::cluster_filter;
    use pretty_assertions::assert_eq;

    fn cluster(id: u64, counts: [f64; 5]) -> Feature {
        let mut props = Properties::new()
            .with("cluster", true)
            .with("point_count", counts.iter().sum::<f64>());
        for (i, c) in counts.iter().enumerate() {
            props.insert(format!("mag{}", i + 1), *c);
        }
        Feature::point(id, 10.0, 10.0, props)
    }

    #[test]
    fn tracks_markers_across_frames() {
        let frames = vec![
            vec![cluster(1, [1.0; 5]), cluster(2, [0.0, 4.0, 0.0, 0.0, 0.0])],
            vec![cluster(2, [0.0, 4.0, 0.0, 0.0, 0.0]), cluster(3, [2.0; 5])],
            vec![cluster(2, [0.0, 4.0, 0.0, 0.0, 0.0]), cluster(3, [2.0; 5])],
        ];
        let report = replay_frames(
            &AppConfig::default(),
            QueryOptions::filtered(cluster_filter()),
            frames,
        );

        let ids: Vec<Vec<FeatureId>> = report.frames.iter().map(|f| f.markers.clone()).collect();
        assert_eq!(
            ids,
            vec![
                vec![FeatureId::from(1u64), FeatureId::from(2u64)],
                vec![FeatureId::from(2u64), FeatureId::from(3u64)],
                vec![FeatureId::from(2u64), FeatureId::from(3u64)],
            ]
        );
        assert_eq!(report.frames[1].created, 1);
        assert_eq!(report.frames[1].dropped, 1);
        assert_eq!(report.frames[2].created, 0);
        assert!(
            report
                .metrics
                .counters
                .contains(&("reconcile.passes", 3))
        );
    }

    #[test]
    fn empty_cluster_is_reported_not_fatal() {
        let report = replay_frames(
            &AppConfig::default(),
            QueryOptions::filtered(cluster_filter()),
            vec![vec![cluster(7, [0.0; 5])]],
        );
        assert!(report.frames[0].markers.is_empty());
        assert_eq!(report.frames[0].rejected.len(), 1);
        assert_eq!(report.frames[0].rejected[0].0, FeatureId::from(7u64));
    }

    #[test]
    fn anonymous_feature_is_skipped_and_replay_continues() {
        let mut anonymous = cluster(1, [1.0; 5]);
        anonymous.id = None;
        let frames = vec![
            vec![anonymous.clone(), cluster(2, [1.0; 5])],
            vec![anonymous, cluster(3, [1.0; 5])],
        ];
        let report = replay_frames(&AppConfig::default(), QueryOptions::default(), frames);
        assert_eq!(report.frames[0].unkeyed, vec![0]);
        assert_eq!(report.frames[0].markers, vec![FeatureId::from(2u64)]);
        assert_eq!(report.frames[1].markers, vec![FeatureId::from(3u64)]);
        assert_eq!(report.frames[1].dropped, 1);
    }

    #[test]
    fn decoded_frames_accept_any_numeric_id() {
        let text = r#"[[
            {"type": "Feature", "id": -3,
             "geometry": {"type": "Point", "coordinates": [10, 10]},
             "properties": {"cluster": true, "mag1": 1, "mag2": 0, "mag3": 0, "mag4": 0, "mag5": 2}},
            {"type": "Feature", "id": 4.5,
             "geometry": {"type": "Point", "coordinates": [11, 10]},
             "properties": {"cluster": true, "mag1": 0, "mag2": 1, "mag3": 0, "mag4": 0, "mag5": 0}}
        ]]"#;
        let frames: Vec<Vec<Feature>> = serde_json::from_str(text).unwrap();
        let report = replay_frames(
            &AppConfig::default(),
            QueryOptions::filtered(cluster_filter()),
            frames,
        );
        let shown: Vec<String> = report.frames[0].markers.iter().map(|id| id.to_string()).collect();
        assert_eq!(shown, vec!["-3", "4.5"]);
    }
}
