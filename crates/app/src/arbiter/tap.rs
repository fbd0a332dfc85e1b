//! Double-tap detection across multiple keyboard devices.
//!
//! Mirrored devices (a laptop keyboard exposed twice, KVM bridges) deliver
//! the same physical tap more than once, so candidate taps are deduped on
//! a short global window per side before the double-tap logic sees them.
//! A tap is only valid when the modifier was held briefly and alone; any
//! other key going down turns the hold into a chord and invalidates
//! pending taps everywhere.

use std::collections::HashMap;
use std::time::{Duration, Instant};

pub const KEY_LEFTCTRL: u16 = 29;
pub const KEY_RIGHTCTRL: u16 = 97;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn from_code(code: u16) -> Option<Self> {
        match code {
            KEY_LEFTCTRL => Some(Side::Left),
            KEY_RIGHTCTRL => Some(Side::Right),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TapConfig {
    pub double_tap_window: Duration,
    pub max_tap_hold: Duration,
    pub trigger_cooldown: Duration,
    pub tap_dedup_window: Duration,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            double_tap_window: Duration::from_millis(450),
            max_tap_hold: Duration::from_millis(300),
            trigger_cooldown: Duration::from_millis(1_300),
            tap_dedup_window: Duration::from_millis(70),
        }
    }
}

#[derive(Debug, Default)]
struct HeldState {
    down: bool,
    down_at: Option<Instant>,
    saw_other_key: bool,
}

#[derive(Debug, Default)]
struct SideTimeline {
    last_tap_up: Option<Instant>,
    last_raw_tap: Option<Instant>,
    last_trigger: Option<Instant>,
}

pub struct TapTracker {
    config: TapConfig,
    devices: HashMap<String, [HeldState; 2]>,
    sides: [SideTimeline; 2],
}

impl TapTracker {
    pub fn new(config: TapConfig) -> Self {
        Self {
            config,
            devices: HashMap::new(),
            sides: Default::default(),
        }
    }

    pub fn remove_device(&mut self, device: &str) {
        self.devices.remove(device);
    }

    /// Feed one key event (`value`: 1 = down, 0 = up, 2 = repeat).
    /// Returns the side whose double-tap just completed, if any.
    pub fn on_key(&mut self, device: &str, code: u16, value: i32, now: Instant) -> Option<Side> {
        let states = self.devices.entry(device.to_string()).or_default();

        let Some(side) = Side::from_code(code) else {
            if value == 1 {
                // A chord: mark any held modifier on this device and
                // invalidate pending taps on both sides globally.
                for held in states.iter_mut() {
                    if held.down {
                        held.saw_other_key = true;
                    }
                }
                for timeline in self.sides.iter_mut() {
                    timeline.last_tap_up = None;
                }
            }
            return None;
        };

        let held = &mut states[side.index()];
        match value {
            1 => {
                if !held.down {
                    held.down = true;
                    held.down_at = Some(now);
                    held.saw_other_key = false;
                }
                None
            }
            0 => {
                if !held.down {
                    return None;
                }
                let hold = held.down_at.map(|t| now.duration_since(t));
                let valid_tap = !held.saw_other_key
                    && hold.is_some_and(|h| h <= self.config.max_tap_hold);
                held.down = false;
                held.down_at = None;
                held.saw_other_key = false;

                let timeline = &mut self.sides[side.index()];
                if !valid_tap {
                    timeline.last_tap_up = None;
                    return None;
                }

                // Mirrored-device echo.
                if timeline
                    .last_raw_tap
                    .is_some_and(|t| now.duration_since(t) < self.config.tap_dedup_window)
                {
                    return None;
                }
                timeline.last_raw_tap = Some(now);

                let in_window = timeline
                    .last_tap_up
                    .is_some_and(|t| now.duration_since(t) <= self.config.double_tap_window);
                let cooled_down = timeline
                    .last_trigger
                    .map_or(true, |t| now.duration_since(t) >= self.config.trigger_cooldown);

                if in_window && cooled_down {
                    timeline.last_trigger = Some(now);
                    timeline.last_tap_up = None;
                    Some(side)
                } else {
                    timeline.last_tap_up = Some(now);
                    None
                }
            }
            _ => None, // autorepeat
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY_A: u16 = 30;

    fn at(base: Instant, ms: u64) -> Instant {
        base + Duration::from_millis(ms)
    }

    /// Press and release, returning the release result.
    fn tap(
        tracker: &mut TapTracker,
        device: &str,
        code: u16,
        base: Instant,
        down_ms: u64,
        up_ms: u64,
    ) -> Option<Side> {
        tracker.on_key(device, code, 1, at(base, down_ms));
        tracker.on_key(device, code, 0, at(base, up_ms))
    }

    #[test]
    fn clean_double_tap_fires_once() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100), None);
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 300, 350),
            Some(Side::Left)
        );
    }

    #[test]
    fn cooldown_swallows_an_immediate_second_double_tap() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100);
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 300, 350),
            Some(Side::Left)
        );

        // Within the 1.3 s cooldown of the trigger at 350 ms: ignored.
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 1000, 1050), None);
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 1200, 1250), None);

        // Well past the cooldown a new pair fires again.
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 2000, 2050), None);
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 2200, 2250),
            Some(Side::Left)
        );
    }

    #[test]
    fn slow_second_tap_does_not_fire() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100);
        // 600 ms after the first tap-up: outside the 450 ms window.
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 700, 750), None);
        // But it seeds a new window of its own.
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 900, 950),
            Some(Side::Left)
        );
    }

    #[test]
    fn long_hold_is_not_a_tap() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100);
        // Held 400 ms > 300 ms: invalid, and it clears the pending tap.
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 200, 600), None);
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 700, 750), None);
    }

    #[test]
    fn chords_invalidate_the_tap_and_pending_state() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100);

        // Ctrl+A: the hold sees another key, so its release is no tap.
        tracker.on_key("kbd", KEY_LEFTCTRL, 1, at(base, 200));
        tracker.on_key("kbd", KEY_A, 1, at(base, 250));
        tracker.on_key("kbd", KEY_A, 0, at(base, 280));
        assert_eq!(tracker.on_key("kbd", KEY_LEFTCTRL, 0, at(base, 290)), None);

        // The earlier pending tap was invalidated too.
        assert_eq!(tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 350, 400), None);
    }

    #[test]
    fn mirrored_devices_dedup_to_one_logical_tap() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        // The same physical tap arrives from two devices 20 ms apart.
        tracker.on_key("kbd-a", KEY_LEFTCTRL, 1, at(base, 0));
        tracker.on_key("kbd-b", KEY_LEFTCTRL, 1, at(base, 0));
        assert_eq!(tracker.on_key("kbd-a", KEY_LEFTCTRL, 0, at(base, 100)), None);
        assert_eq!(tracker.on_key("kbd-b", KEY_LEFTCTRL, 0, at(base, 120)), None);

        // One more real tap completes exactly one double-tap.
        assert_eq!(
            tap(&mut tracker, "kbd-a", KEY_LEFTCTRL, base, 300, 380),
            Some(Side::Left)
        );
    }

    #[test]
    fn sides_are_tracked_independently() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 0, 100);
        // A right tap does not complete a left double-tap.
        assert_eq!(tap(&mut tracker, "kbd", KEY_RIGHTCTRL, base, 200, 250), None);
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_RIGHTCTRL, base, 400, 450),
            Some(Side::Right)
        );
    }

    #[test]
    fn autorepeat_is_ignored() {
        let mut tracker = TapTracker::new(TapConfig::default());
        let base = Instant::now();

        tracker.on_key("kbd", KEY_LEFTCTRL, 1, at(base, 0));
        tracker.on_key("kbd", KEY_LEFTCTRL, 2, at(base, 50));
        tracker.on_key("kbd", KEY_LEFTCTRL, 2, at(base, 90));
        assert_eq!(tracker.on_key("kbd", KEY_LEFTCTRL, 0, at(base, 150)), None);
        assert_eq!(
            tap(&mut tracker, "kbd", KEY_LEFTCTRL, base, 300, 380),
            Some(Side::Left)
        );
    }
}
