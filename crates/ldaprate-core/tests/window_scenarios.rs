//! Statistics window driven by a simulated clock.

use std::time::Duration;

use ldaprate_core::{
    Clock, ManualClock, ResponseTimeCategorizer, StatTracker, StatisticsWindowController,
    TrackerLifecycle, WindowConfig, WindowState,
};

struct Single(ResponseTimeCategorizer);

impl TrackerLifecycle for Single {
    fn start_trackers(&mut self) {
        self.0.start();
    }

    fn stop_trackers(&mut self) {
        self.0.stop();
    }
}

#[test]
fn test_warm_up_excludes_first_hundred_iterations() {
    let clock = ManualClock::shared(1_700_000_000_000);
    let mut trackers = Single(ResponseTimeCategorizer::new("c", "t", 60, clock.clone()));
    let config = WindowConfig {
        warm_up: Some(Duration::from_millis(100)),
        cool_down: None,
    };
    let mut window =
        StatisticsWindowController::begin(config, None, clock.epoch_millis(), &mut trackers);

    let mut recorded = 0;
    for _ in 0..1_000 {
        window.evaluate(clock.epoch_millis(), &mut trackers);
        if window.is_collecting() {
            trackers.0.categorize_elapsed(Duration::from_micros(500));
            recorded += 1;
        }
        clock.advance(Duration::from_millis(1));
    }
    window.finish(&mut trackers);

    assert_eq!(recorded, 900);
    assert_eq!(trackers.0.counter().total(), 900);
    assert!(!trackers.0.is_running());
}

#[test]
fn test_cool_down_stops_counting_for_good() {
    let start = 1_700_000_000_000;
    let clock = ManualClock::shared(start);
    let mut trackers = Single(ResponseTimeCategorizer::new("c", "t", 60, clock.clone()));
    let config = WindowConfig {
        warm_up: None,
        cool_down: Some(Duration::from_millis(200)),
    };
    let mut window = StatisticsWindowController::begin(
        config,
        Some(start + 1_000),
        clock.epoch_millis(),
        &mut trackers,
    );

    for _ in 0..1_000 {
        window.evaluate(clock.epoch_millis(), &mut trackers);
        trackers.0.categorize_elapsed(Duration::from_micros(500));
        clock.advance(Duration::from_millis(1));
    }
    assert_eq!(trackers.0.counter().total(), 800);

    // Step the wall clock back into the collecting range.
    clock.set_epoch_millis(start + 10);
    window.evaluate(clock.epoch_millis(), &mut trackers);
    trackers.0.categorize_elapsed(Duration::from_micros(500));

    assert_eq!(window.state(), WindowState::CooledDown);
    assert_eq!(trackers.0.counter().total(), 800);
}
