//! Track lifecycle: gated greedy association, birth, confirmation, coasting,
//! pruning.
//!
//! # Policy
//! - **Associate**: Euclidean distances between predicted track positions
//!   and measurements, assigned greedily in ascending-cost order inside the
//!   gate. Each track and each measurement appears in at most one pair.
//! - **Birth**: unmatched measurements at or above the SNR gate spawn a
//!   tentative track with zero initial velocity.
//! - **Confirm**: a track is confirmed after 3 associated updates.
//! - **Coast/Prune**: unmatched tracks advance by prediction alone and are
//!   removed after 60 consecutive misses (1 s at 60 Hz).

use crate::tracking::kalman::{KalmanConfig, KalmanState};
use crate::tracking::track::Track;
use sensor_hal::types::PointCloud;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Tracker policy constants.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Association gate (meters)
    pub match_threshold: f32,
    /// Consecutive misses before a track is pruned
    pub max_missed: i32,
    /// Associated updates required for confirmation
    pub confirm_hits: u32,
    /// Minimum measurement SNR to spawn a track
    pub birth_snr: f32,
    /// Confidence EMA weight for new measurements
    pub confidence_alpha: f32,
    /// Per-miss confidence decay while coasting
    pub coast_decay: f32,
    #[serde(default)]
    pub kalman: KalmanConfig,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            match_threshold: 5.0, // 5 meters
            max_missed: 60,       // 1 second of coasting at 60 Hz
            confirm_hits: 3,
            birth_snr: 10.0,
            confidence_alpha: 0.3,
            coast_decay: 0.98,
            kalman: KalmanConfig::default(),
        }
    }
}

/// Manages the pool of active tracks.
pub struct TrackManager {
    config: TrackerConfig,
    tracks: Vec<Track>,
    next_id: u32,
}

impl TrackManager {
    pub fn new(config: TrackerConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    /// Run one full tracking cycle over a scan.
    pub fn process_scan(&mut self, cloud: &PointCloud) {
        // 1. Predict every track to the scan timestamp.
        for track in &mut self.tracks {
            track.filter.predict(cloud.timestamp);
        }

        // 2. Greedy gated association. Candidate pairs are sorted by
        //    (cost, track id, measurement index) so the assignment is a
        //    deterministic function of the values alone.
        let mut pairs: Vec<(usize, usize, f32)> = Vec::new();
        for (ti, track) in self.tracks.iter().enumerate() {
            for (mi, meas) in cloud.points.iter().enumerate() {
                let d = track.filter.distance_to(meas.x, meas.y, meas.z);
                if d <= self.config.match_threshold {
                    pairs.push((ti, mi, d));
                }
            }
        }
        pairs.sort_by(|a, b| {
            a.2.total_cmp(&b.2)
                .then_with(|| self.tracks[a.0].id.cmp(&self.tracks[b.0].id))
                .then_with(|| a.1.cmp(&b.1))
        });

        let mut track_used = vec![false; self.tracks.len()];
        let mut meas_used = vec![false; cloud.points.len()];

        // 3. Update matched tracks.
        for (ti, mi, _) in pairs {
            if track_used[ti] || meas_used[mi] {
                continue;
            }
            track_used[ti] = true;
            meas_used[mi] = true;

            let meas = &cloud.points[mi];
            let track = &mut self.tracks[ti];
            track.filter.update(meas.x, meas.y, meas.z);
            track.missed_frames = 0;
            track.hits += 1;
            if track.hits >= self.config.confirm_hits && !track.confirmed {
                track.confirmed = true;
                debug!(id = track.id, "track confirmed");
            }
            let strength = (meas.snr / 100.0).clamp(0.0, 1.0);
            track.confidence += self.config.confidence_alpha * (strength - track.confidence);
        }

        // 4. Coast unmatched tracks.
        for (ti, used) in track_used.iter().enumerate() {
            if !used {
                let track = &mut self.tracks[ti];
                track.missed_frames += 1;
                track.confidence *= self.config.coast_decay;
            }
        }

        // 5. Birth tracks from unmatched measurements past the SNR gate.
        for (mi, meas) in cloud.points.iter().enumerate() {
            if meas_used[mi] || meas.snr < self.config.birth_snr {
                continue;
            }
            let filter = KalmanState::new(
                meas.x,
                meas.y,
                meas.z,
                cloud.timestamp,
                self.config.kalman,
            );
            let confidence = (meas.snr / 100.0).clamp(0.0, 1.0);
            let id = self.next_id;
            self.next_id += 1;
            self.tracks.push(Track::new(id, filter, confidence));
        }

        // 6. Prune tracks that coasted past the limit.
        let max_missed = self.config.max_missed;
        self.tracks.retain(|t| t.missed_frames <= max_missed);
    }

    /// Active tracks ordered by descending confidence, then ascending id.
    /// The guidance loop's primary target is the first confirmed entry.
    pub fn get_tracks(&self) -> Vec<Track> {
        let mut tracks = self.tracks.clone();
        tracks.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.id.cmp(&b.id))
        });
        tracks
    }

    /// Count of confirmed tracks.
    pub fn confirmed_count(&self) -> usize {
        self.tracks.iter().filter(|t| t.confirmed).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sensor_hal::types::RadarPoint;

    fn cloud(t: f64, points: &[(f32, f32, f32, f32)]) -> PointCloud {
        PointCloud {
            timestamp: t,
            points: points
                .iter()
                .map(|&(x, y, z, snr)| RadarPoint {
                    x,
                    y,
                    z,
                    velocity: 0.0,
                    snr,
                    track_id: 0,
                })
                .collect(),
        }
    }

    #[test]
    fn birth_assigns_monotonic_positive_ids() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0), (50.0, 0.0, 100.0, 30.0)]));
        let tracks = mgr.get_tracks();
        assert_eq!(tracks.len(), 2);
        assert!(tracks.iter().all(|t| t.id > 0));
        let mut ids: Vec<u32> = tracks.iter().map(|t| t.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn weak_measurements_do_not_birth() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 5.0)]));
        assert!(mgr.get_tracks().is_empty());
    }

    #[test]
    fn track_confirms_after_three_hits() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0)]));
        assert!(!mgr.get_tracks()[0].confirmed);
        mgr.process_scan(&cloud(1.0 / 60.0, &[(0.0, 0.0, 99.9, 30.0)]));
        assert!(!mgr.get_tracks()[0].confirmed);
        mgr.process_scan(&cloud(2.0 / 60.0, &[(0.0, 0.0, 99.8, 30.0)]));
        assert!(mgr.get_tracks()[0].confirmed);
    }

    #[test]
    fn association_respects_the_gate() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0)]));
        // 8 m away: outside the 5 m gate, births a second track instead of
        // dragging the first one over.
        mgr.process_scan(&cloud(0.1, &[(8.0, 0.0, 100.0, 30.0)]));
        assert_eq!(mgr.get_tracks().len(), 2);
    }

    #[test]
    fn greedy_assignment_is_deterministic() {
        let run = || {
            let mut mgr = TrackManager::new(TrackerConfig::default());
            mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0), (3.0, 0.0, 100.0, 30.0)]));
            mgr.process_scan(&cloud(
                0.1,
                &[(1.5, 0.0, 100.0, 30.0), (2.0, 0.0, 100.0, 30.0)],
            ));
            let mut out: Vec<(u32, [f32; 3])> = mgr
                .get_tracks()
                .iter()
                .map(|t| (t.id, t.position()))
                .collect();
            out.sort_by_key(|(id, _)| *id);
            out
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn each_measurement_updates_at_most_one_track() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        // Two tracks 4 m apart, one measurement between them.
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0), (4.0, 0.0, 100.0, 30.0)]));
        mgr.process_scan(&cloud(0.1, &[(1.0, 0.0, 100.0, 30.0)]));
        let tracks = mgr.get_tracks();
        // One track took the hit, the other coasted.
        let missed: Vec<i32> = tracks.iter().map(|t| t.missed_frames).collect();
        assert!(missed.contains(&0));
        assert!(missed.contains(&1));
    }

    #[test]
    fn coasting_track_is_pruned_past_the_limit() {
        let cfg = TrackerConfig::default();
        let mut mgr = TrackManager::new(cfg);
        mgr.process_scan(&cloud(0.0, &[(0.0, 0.0, 100.0, 30.0)]));

        // 60 empty scans: still alive (missed == max_missed is kept).
        for i in 1..=60 {
            mgr.process_scan(&cloud(i as f64 / 60.0, &[]));
        }
        assert_eq!(mgr.get_tracks().len(), 1);
        assert_eq!(mgr.get_tracks()[0].missed_frames, 60);

        // The 61st miss crosses the limit.
        mgr.process_scan(&cloud(61.0 / 60.0, &[]));
        assert!(mgr.get_tracks().is_empty());
    }

    #[test]
    fn output_is_ordered_by_confidence_then_id() {
        let mut mgr = TrackManager::new(TrackerConfig::default());
        mgr.process_scan(&cloud(
            0.0,
            &[(0.0, 0.0, 100.0, 90.0), (50.0, 0.0, 100.0, 40.0), (100.0, 0.0, 100.0, 90.0)],
        ));
        let tracks = mgr.get_tracks();
        assert_eq!(tracks.len(), 3);
        assert!(tracks[0].confidence >= tracks[1].confidence);
        assert!(tracks[1].confidence >= tracks[2].confidence);
        // Equal confidence breaks ties by ascending id.
        assert!(tracks[0].id < tracks[1].id || tracks[0].confidence > tracks[1].confidence);
    }
}
