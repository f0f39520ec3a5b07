#![deny(unsafe_code)]
#![deny(warnings)]
//! Presence sampler
//!
//! Infrared rangers are noisy near object edges. Rather than filter, take a
//! short burst and keep the value that occurs most often; a transient
//! outlier never wins the vote.

use embedded_hal_async::delay::DelayNs;
use hal_abstractions::{RangeSensor, TextDisplay};
use heapless::FnvIndexMap;

/// Readings per measurement
pub const SAMPLE_COUNT: usize = 5;

/// Pause between readings
pub const SETTLE_DELAY_MS: u32 = 50;

/// Most distinct values a single burst can vote over
pub const MODE_CAPACITY: usize = 16;

const _: () = assert!(SAMPLE_COUNT <= MODE_CAPACITY);

/// A range reading in millimetres
///
/// Failed reads and "no target" zeroes are carried as [`Distance::FAILED`]
/// and vote like any other value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Distance(pub i32);

impl Distance {
    /// Sentinel for a failed reading
    pub const FAILED: Distance = Distance(-1);

    /// Raw millimetres
    pub const fn millimeters(self) -> i32 {
        self.0
    }

    /// Convert a driver result; zero means the ranger saw nothing
    pub fn from_reading<E>(reading: Result<u16, E>) -> Self {
        match reading {
            Ok(0) | Err(_) => Distance::FAILED,
            Ok(mm) => Distance(i32::from(mm)),
        }
    }
}

/// Most frequent value in `samples`; ties go to the earliest first occurrence
///
/// Only the first `MODE_CAPACITY` samples are considered. Returns `None` for
/// an empty slice.
pub fn mode_of(samples: &[Distance]) -> Option<Distance> {
    // Insertion-ordered, so iteration visits values by first occurrence
    let mut counts: FnvIndexMap<Distance, u8, MODE_CAPACITY> = FnvIndexMap::new();

    for sample in samples.iter().take(MODE_CAPACITY) {
        if let Some(count) = counts.get_mut(sample) {
            *count = count.saturating_add(1);
        } else if counts.insert(*sample, 1).is_err() {
            break;
        }
    }

    let mut best: Option<(Distance, u8)> = None;
    for (value, count) in counts.iter() {
        match best {
            Some((_, best_count)) if *count <= best_count => {}
            _ => best = Some((*value, *count)),
        }
    }
    best.map(|(value, _)| value)
}

/// Take a burst of readings and return their mode
///
/// `progress` gets one tick per reading when the display is enabled.
pub async fn sample<S, D, V>(
    sensor: &mut S,
    delay: &mut D,
    mut progress: Option<&mut V>,
    verbose: bool,
) -> Distance
where
    S: RangeSensor,
    D: DelayNs,
    V: TextDisplay,
{
    let mut samples = [Distance::FAILED; SAMPLE_COUNT];

    for (i, slot) in samples.iter_mut().enumerate() {
        if let Some(display) = progress.as_deref_mut() {
            if let Err(e) = display.show_progress(i) {
                warn!("Display progress failed: {:?}", e);
            }
        }

        let reading = sensor.read_mm();
        if let Err(e) = &reading {
            warn!("Ranging failed: {:?}", e);
        }
        *slot = Distance::from_reading(reading);
        if verbose {
            info!("Inst. distance: {} mm", slot.millimeters());
        }

        delay.delay_ms(SETTLE_DELAY_MS).await;
    }

    mode_of(&samples).unwrap_or(Distance::FAILED)
}
