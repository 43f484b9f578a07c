//! Key State Tracker
//!
//! Holds the set of virtual keys this process currently keeps pressed and
//! turns each snapshot into the minimal press/release sequence. Applying the
//! same snapshot twice emits nothing the second time.

use crate::controller::report::ControllerSnapshot;
use crate::mapping::sink::KeyEventSink;
use crate::mapping::{KeyboardConfig, VirtualKey};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

pub struct KeyStateTracker {
    sink: Box<dyn KeyEventSink>,
    config: KeyboardConfig,
    held: BTreeSet<VirtualKey>,
}

impl KeyStateTracker {
    pub fn new(config: KeyboardConfig, sink: Box<dyn KeyEventSink>) -> Self {
        info!(
            "Key state tracker using layout '{}' and sink '{}'",
            config.name(),
            sink.name()
        );
        Self {
            sink,
            config,
            held: BTreeSet::new(),
        }
    }

    /// Brings the held set in line with `snapshot`. Returns the number of
    /// emitted events.
    ///
    /// The held set follows the snapshot even when the sink fails, so a key
    /// whose press failed is still released later.
    pub fn apply(&mut self, snapshot: &ControllerSnapshot) -> usize {
        let mut emitted = 0;

        for (key, desired) in self.config.desired_keys(snapshot) {
            let held = self.held.contains(&key);
            if desired && !held {
                self.held.insert(key);
                emitted += 1;
                debug!("press {}", key);
                if let Err(e) = self.sink.press(key) {
                    warn!("{}", e);
                }
            } else if !desired && held {
                self.held.remove(&key);
                emitted += 1;
                debug!("release {}", key);
                if let Err(e) = self.sink.release(key) {
                    warn!("{}", e);
                }
            }
        }

        emitted
    }

    /// Releases every held key and clears the set. A failing release does not
    /// stop the remaining ones.
    pub fn release_all(&mut self) -> usize {
        let held = std::mem::take(&mut self.held);
        if !held.is_empty() {
            info!("Releasing {} held keys", held.len());
        }

        for key in &held {
            if let Err(e) = self.sink.release(*key) {
                warn!("{}", e);
            }
        }

        held.len()
    }

    pub fn held(&self) -> &BTreeSet<VirtualKey> {
        &self.held
    }

    #[cfg(test)]
    pub fn is_held(&self, key: VirtualKey) -> bool {
        self.held.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::report::{decode, ButtonType, StickPosition};
    use crate::mapping::sink::testing::{KeyAction, RecordingSink};
    use std::collections::HashSet;

    const NEUTRAL: [u8; 6] = [0x00, 0x08, 0x80, 0x00, 0x08, 0x80];

    fn tracker() -> (KeyStateTracker, RecordingSink) {
        let sink = RecordingSink::default();
        let tracker = KeyStateTracker::new(KeyboardConfig::default_config(), Box::new(sink.clone()));
        (tracker, sink)
    }

    fn report(b2: u8, b3: u8, sticks: [u8; 6]) -> Vec<u8> {
        let mut bytes = vec![0, 0, b2, b3, 0];
        bytes.extend_from_slice(&sticks);
        bytes
    }

    fn assert_invariant(tracker: &KeyStateTracker, snapshot: &ControllerSnapshot) {
        for (key, desired) in tracker.config.desired_keys(snapshot) {
            assert_eq!(tracker.is_held(key), desired, "{key}");
        }
    }

    #[test]
    fn a_press_emits_z_only() {
        let (mut tracker, sink) = tracker();
        let snapshot = decode(&report(0x02, 0x00, NEUTRAL)).unwrap();
        assert_eq!(tracker.apply(&snapshot), 1);
        assert_eq!(sink.take(), vec![KeyAction::Press(VirtualKey::Z)]);
    }

    #[test]
    fn press_then_release() {
        let (mut tracker, sink) = tracker();
        tracker.apply(&decode(&report(0x02, 0x00, NEUTRAL)).unwrap());
        tracker.apply(&decode(&report(0x00, 0x00, NEUTRAL)).unwrap());
        assert_eq!(
            sink.take(),
            vec![
                KeyAction::Press(VirtualKey::Z),
                KeyAction::Release(VirtualKey::Z)
            ]
        );
        assert!(tracker.held().is_empty());
    }

    #[test]
    fn same_snapshot_twice_is_silent() {
        let (mut tracker, sink) = tracker();
        let snapshot = decode(&report(0xFF, 0xFF, [0x00, 0xF0, 0xFF, 0xFF, 0x0F, 0x00])).unwrap();
        assert!(tracker.apply(&snapshot) > 0);
        sink.take();
        assert_eq!(tracker.apply(&snapshot), 0);
        assert!(sink.take().is_empty());
        assert_invariant(&tracker, &snapshot);
    }

    #[test]
    fn left_stick_up_presses_w() {
        let (mut tracker, sink) = tracker();
        // ly = 0xC80 -> 0.5625
        tracker.apply(&decode(&report(0, 0, [0x00, 0x08, 0xC8, 0x00, 0x08, 0x80])).unwrap());
        assert_eq!(sink.take(), vec![KeyAction::Press(VirtualKey::W)]);

        tracker.apply(&decode(&report(0, 0, NEUTRAL)).unwrap());
        assert_eq!(sink.take(), vec![KeyAction::Release(VirtualKey::W)]);
    }

    #[test]
    fn short_report_leaves_state_untouched() {
        let (mut tracker, sink) = tracker();
        tracker.apply(&decode(&report(0x02, 0x00, NEUTRAL)).unwrap());
        sink.take();
        let before = tracker.held().clone();

        if let Some(snapshot) = decode(&[0x00; 10]) {
            tracker.apply(&snapshot);
        }
        assert_eq!(tracker.held(), &before);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn invariant_holds_over_a_sequence() {
        let (mut tracker, _sink) = tracker();
        let snapshots = [
            ControllerSnapshot {
                pressed: HashSet::from([ButtonType::A, ButtonType::ZR]),
                left_stick: StickPosition { x: -0.9, y: 0.9 },
                ..Default::default()
            },
            ControllerSnapshot {
                pressed: HashSet::from([ButtonType::ZR, ButtonType::DPadUp]),
                right_stick: StickPosition { x: 0.6, y: -0.7 },
                ..Default::default()
            },
            ControllerSnapshot::default(),
        ];
        for snapshot in &snapshots {
            tracker.apply(snapshot);
            assert_invariant(&tracker, snapshot);
        }
    }

    #[test]
    fn release_all_survives_failures() {
        let (mut tracker, sink) = tracker();
        let snapshot = ControllerSnapshot {
            pressed: HashSet::from([ButtonType::A, ButtonType::B, ButtonType::X]),
            ..Default::default()
        };
        tracker.apply(&snapshot);
        sink.take();
        sink.fail_on(VirtualKey::X);

        assert_eq!(tracker.release_all(), 3);
        let released: HashSet<KeyAction> = sink.take().into_iter().collect();
        assert_eq!(
            released,
            HashSet::from([
                KeyAction::Release(VirtualKey::Z),
                KeyAction::Release(VirtualKey::X),
                KeyAction::Release(VirtualKey::C),
            ])
        );
        assert!(tracker.held().is_empty());

        assert_eq!(tracker.release_all(), 0);
        assert!(sink.take().is_empty());
    }

    #[test]
    fn failed_press_is_still_tracked() {
        let (mut tracker, sink) = tracker();
        sink.fail_on(VirtualKey::Z);
        tracker.apply(&decode(&report(0x02, 0x00, NEUTRAL)).unwrap());
        assert!(tracker.is_held(VirtualKey::Z));
        tracker.release_all();
        assert_eq!(
            sink.take(),
            vec![
                KeyAction::Press(VirtualKey::Z),
                KeyAction::Release(VirtualKey::Z)
            ]
        );
    }
}
