//! Gesture detection
//!
//! Turns a press/release stream into press, release, long press, double press
//! and double release events. The detector is a plain state machine: it never
//! reads a clock. It asks for timers through [`GestureAction::Schedule`] and
//! is told when they expire through [`GestureDetector::timeout`].

use std::time::Duration;

use crate::scheduler::TimerKey;

pub const DEFAULT_LONG_PRESS: Duration = Duration::from_millis(350);
pub const DEFAULT_DOUBLE_PRESS: Duration = Duration::from_millis(350);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gesture {
    Press,
    Release,
    LongPress,
    DoublePress,
    DoubleRelease,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureTimer {
    LongPress,
    DoublePress,
    DoubleRelease,
}

impl GestureTimer {
    pub fn key(self) -> TimerKey {
        match self {
            GestureTimer::LongPress => "long-press",
            GestureTimer::DoublePress => "double-press",
            GestureTimer::DoubleRelease => "double-release",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "long-press" => Some(GestureTimer::LongPress),
            "double-press" => Some(GestureTimer::DoublePress),
            "double-release" => Some(GestureTimer::DoubleRelease),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GestureAction {
    Emit(Gesture),
    Schedule(GestureTimer, Duration),
    Cancel(GestureTimer),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GestureConfig {
    pub long_press: Duration,
    /// Window for both double press and double release
    pub double_press: Duration,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            long_press: DEFAULT_LONG_PRESS,
            double_press: DEFAULT_DOUBLE_PRESS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// Held after a single press; `double_window` while a second press would
    /// still count as a double press
    Pressed { double_window: bool },
    /// Released after a single press, double press window still open
    AwaitingDoublePress { release_window: bool },
    /// Held after a double press; `release_window` while releasing counts as
    /// a double release
    AwaitingDoubleRelease { release_window: bool },
}

#[derive(Debug, Clone)]
pub struct GestureDetector {
    phase: Phase,
    config: GestureConfig,
}

impl GestureDetector {
    pub fn new(config: GestureConfig) -> Self {
        Self {
            phase: Phase::Idle,
            config,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Non-zero values press, zero releases
    pub fn input(&mut self, value: i32) -> Vec<GestureAction> {
        if value > 0 {
            self.press()
        } else {
            self.release()
        }
    }

    pub fn press(&mut self) -> Vec<GestureAction> {
        use GestureAction::*;

        match self.phase {
            Phase::Idle => {
                self.phase = Phase::Pressed {
                    double_window: true,
                };
                vec![
                    Emit(Gesture::Press),
                    Schedule(GestureTimer::LongPress, self.config.long_press),
                    Schedule(GestureTimer::DoublePress, self.config.double_press),
                ]
            }
            Phase::AwaitingDoublePress { release_window } => {
                self.phase = Phase::AwaitingDoubleRelease { release_window };
                vec![
                    Cancel(GestureTimer::DoublePress),
                    Emit(Gesture::DoublePress),
                ]
            }
            // Repeated press while held
            Phase::Pressed { .. } | Phase::AwaitingDoubleRelease { .. } => Vec::new(),
        }
    }

    pub fn release(&mut self) -> Vec<GestureAction> {
        use GestureAction::*;

        match self.phase {
            Phase::Pressed { double_window } => {
                let mut actions = vec![Cancel(GestureTimer::LongPress), Emit(Gesture::Release)];
                if double_window {
                    actions.push(Schedule(
                        GestureTimer::DoubleRelease,
                        self.config.double_press,
                    ));
                    self.phase = Phase::AwaitingDoublePress {
                        release_window: true,
                    };
                } else {
                    self.phase = Phase::Idle;
                }
                actions
            }
            Phase::AwaitingDoubleRelease { release_window } => {
                self.phase = Phase::Idle;
                if release_window {
                    vec![
                        Cancel(GestureTimer::DoubleRelease),
                        Emit(Gesture::DoubleRelease),
                    ]
                } else {
                    vec![Emit(Gesture::Release)]
                }
            }
            // Release without a press
            Phase::Idle | Phase::AwaitingDoublePress { .. } => Vec::new(),
        }
    }

    pub fn timeout(&mut self, timer: GestureTimer) -> Vec<GestureAction> {
        match (self.phase, timer) {
            (Phase::Pressed { .. }, GestureTimer::LongPress) => {
                vec![GestureAction::Emit(Gesture::LongPress)]
            }
            (Phase::Pressed { .. }, GestureTimer::DoublePress) => {
                self.phase = Phase::Pressed {
                    double_window: false,
                };
                Vec::new()
            }
            (Phase::AwaitingDoublePress { release_window }, GestureTimer::DoublePress) => {
                self.phase = Phase::Idle;
                if release_window {
                    vec![GestureAction::Cancel(GestureTimer::DoubleRelease)]
                } else {
                    Vec::new()
                }
            }
            (Phase::AwaitingDoublePress { .. }, GestureTimer::DoubleRelease) => {
                self.phase = Phase::AwaitingDoublePress {
                    release_window: false,
                };
                Vec::new()
            }
            (Phase::AwaitingDoubleRelease { .. }, GestureTimer::DoubleRelease) => {
                self.phase = Phase::AwaitingDoubleRelease {
                    release_window: false,
                };
                Vec::new()
            }
            _ => Vec::new(),
        }
    }
}

impl Default for GestureDetector {
    fn default() -> Self {
        Self::new(GestureConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emitted(actions: &[GestureAction]) -> Vec<Gesture> {
        actions
            .iter()
            .filter_map(|a| match a {
                GestureAction::Emit(g) => Some(*g),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_single_press_release() {
        let mut d = GestureDetector::default();

        let actions = d.press();
        assert_eq!(emitted(&actions), vec![Gesture::Press]);
        assert!(actions.contains(&GestureAction::Schedule(
            GestureTimer::LongPress,
            DEFAULT_LONG_PRESS
        )));

        let actions = d.release();
        assert_eq!(emitted(&actions), vec![Gesture::Release]);
        assert!(actions.contains(&GestureAction::Cancel(GestureTimer::LongPress)));

        d.timeout(GestureTimer::DoublePress);
        assert_eq!(d.phase(), Phase::Idle);
    }

    #[test]
    fn test_long_press_then_release() {
        let mut d = GestureDetector::default();

        d.press();
        assert_eq!(emitted(&d.timeout(GestureTimer::LongPress)), vec![Gesture::LongPress]);
        d.timeout(GestureTimer::DoublePress);
        assert_eq!(emitted(&d.release()), vec![Gesture::Release]);
        assert_eq!(d.phase(), Phase::Idle);
    }

    #[test]
    fn test_double_press_and_release() {
        let mut d = GestureDetector::default();

        d.press();
        d.release();
        let actions = d.press();
        assert_eq!(emitted(&actions), vec![Gesture::DoublePress]);
        assert!(!actions.iter().any(|a| matches!(a, GestureAction::Schedule(GestureTimer::LongPress, _))));

        assert_eq!(emitted(&d.release()), vec![Gesture::DoubleRelease]);
        assert_eq!(d.phase(), Phase::Idle);
    }

    #[test]
    fn test_second_press_after_window_is_single() {
        let mut d = GestureDetector::default();

        d.press();
        d.release();
        d.timeout(GestureTimer::DoublePress);
        assert_eq!(emitted(&d.press()), vec![Gesture::Press]);
    }

    #[test]
    fn test_slow_second_release_is_single() {
        let mut d = GestureDetector::default();

        d.press();
        d.release();
        d.press();
        d.timeout(GestureTimer::DoubleRelease);
        assert_eq!(emitted(&d.release()), vec![Gesture::Release]);
    }

    #[test]
    fn test_held_past_double_window_does_not_wait_for_double() {
        let mut d = GestureDetector::default();

        d.press();
        d.timeout(GestureTimer::DoublePress);
        let actions = d.release();
        assert!(!actions.iter().any(|a| matches!(a, GestureAction::Schedule(..))));
        assert_eq!(emitted(&d.press()), vec![Gesture::Press]);
    }

    #[test]
    fn test_ignores_spurious_input() {
        let mut d = GestureDetector::default();
        assert!(d.release().is_empty());
        d.press();
        assert!(d.press().is_empty());
        assert!(d.timeout(GestureTimer::DoubleRelease).is_empty());
    }

    #[test]
    fn test_timer_keys() {
        for timer in [
            GestureTimer::LongPress,
            GestureTimer::DoublePress,
            GestureTimer::DoubleRelease,
        ] {
            assert_eq!(GestureTimer::from_key(timer.key()), Some(timer));
        }
        assert_eq!(GestureTimer::from_key("input"), None);
    }
}
