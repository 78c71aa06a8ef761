//! Carrier burst synthesis
//!
//! A mark is rendered as a run of on/off pulse pairs at the carrier
//! frequency. Each cycle's end is aimed at the rounded *cumulative* time
//! `round((c + 1) * period)`, so per-cycle integer rounding never adds up:
//! the burst stays within one period of the requested length however long
//! it is.
//!
//! Rounding is half-to-even throughout, which keeps pulse widths identical
//! to the ones produced by the pigpio tooling this transmitter replaced.

use crate::timing::{CarrierParams, PulseBurst};

/// Number of whole carrier cycles that best fit `duration_us`
pub fn cycle_count(params: &CarrierParams, duration_us: u32) -> u64 {
    (duration_us as f64 / params.period_micros()).round_ties_even() as u64
}

/// Render a carrier burst of roughly `duration_us` on the configured line
///
/// Returns two pulses per cycle (line high, then line low). A duration too
/// short for a single cycle yields no pulses.
pub fn synthesize(params: &CarrierParams, duration_us: u32) -> Vec<PulseBurst> {
    let period = params.period_micros();
    let mask = params.gpio_mask();
    let cycles = cycle_count(params, duration_us);
    let on = (period * params.duty_cycle()).round_ties_even() as i64;

    let mut pulses = Vec::with_capacity(cycles as usize * 2);
    let mut so_far: i64 = 0;

    for c in 0..cycles {
        let target = ((c + 1) as f64 * period).round_ties_even() as i64;
        so_far += on;
        let off = (target - so_far).max(0);
        so_far += off;

        pulses.push(PulseBurst::on(mask, on as u32));
        pulses.push(PulseBurst::off(mask, off as u32));
    }

    pulses
}

/// Total time covered by a pulse list
pub fn burst_micros(pulses: &[PulseBurst]) -> u64 {
    pulses.iter().map(|p| p.duration_us as u64).sum()
}
