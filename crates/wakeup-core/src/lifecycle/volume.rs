use crate::alarm::{SnoozeMode, SnoozeSettings};

/// Playback volume for a firing, 0..=100.
///
/// With `VolumeRampUp` every snooze already taken raises the volume by an
/// equal step so the last repeat plays at full volume. Other modes, and a
/// ramp with no repeats, play at the base volume.
pub fn effective_volume(base: u8, snooze: &SnoozeSettings, remaining_repeats: u32) -> u8 {
    let base = base.min(100);
    if snooze.mode != SnoozeMode::VolumeRampUp || snooze.max_repeats == 0 {
        return base;
    }
    let max = f64::from(snooze.max_repeats);
    let taken = f64::from(snooze.max_repeats.saturating_sub(remaining_repeats));
    let scale = (100.0 - f64::from(base)) / max;
    (f64::from(base) + scale * taken).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(max_repeats: u32) -> SnoozeSettings {
        SnoozeSettings {
            mode: SnoozeMode::VolumeRampUp,
            length_minutes: 10,
            max_repeats,
        }
    }

    #[test]
    fn ramp_is_monotonic_and_ends_at_full_volume() {
        let snooze = ramp(5);
        let volumes: Vec<u8> = (0..=5)
            .rev()
            .map(|remaining| effective_volume(50, &snooze, remaining))
            .collect();
        assert_eq!(volumes, vec![50, 60, 70, 80, 90, 100]);
        assert!(volumes.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn ramp_rounds_uneven_steps() {
        let snooze = ramp(3);
        assert_eq!(effective_volume(0, &snooze, 2), 33);
        assert_eq!(effective_volume(0, &snooze, 1), 67);
        assert_eq!(effective_volume(0, &snooze, 0), 100);
    }

    #[test]
    fn other_modes_use_base_volume() {
        let mut snooze = ramp(5);
        snooze.mode = SnoozeMode::On;
        assert_eq!(effective_volume(40, &snooze, 0), 40);
        snooze.mode = SnoozeMode::Off;
        assert_eq!(effective_volume(40, &snooze, 0), 40);
    }

    #[test]
    fn zero_repeats_does_not_divide() {
        assert_eq!(effective_volume(30, &ramp(0), 0), 30);
    }

    #[test]
    fn remaining_above_max_and_loud_base_stay_in_range() {
        assert_eq!(effective_volume(50, &ramp(5), 9), 50);
        assert_eq!(effective_volume(200, &ramp(5), 0), 100);
    }
}
