use log::info;
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

use crate::constants::{DISK_ID_COLUMN, LABEL_COLUMN, SMART_FEATURES, STATIC_FEATURES, STEP_COLUMN};

const CAPACITIES_TB: [f64; 4] = [4.0, 8.0, 12.0, 16.0];

/// Shape of a generated fleet
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticConfig {
    pub n_disks: usize,
    pub min_steps: usize,
    pub max_steps: usize,
    pub failure_rate: f64,
    pub seed: u64,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            n_disks: 200,
            min_steps: 10,
            max_steps: 40,
            failure_rate: 0.2,
            seed: 42,
        }
    }
}

/// Number of failing disks for a fleet; both classes are present whenever possible
fn failing_disk_count(n_disks: usize, failure_rate: f64) -> usize {
    let count = (n_disks as f64 * failure_rate).round() as usize;
    if n_disks >= 2 && failure_rate > 0.0 && failure_rate < 1.0 {
        count.clamp(1, n_disks - 1)
    } else {
        count.min(n_disks)
    }
}

/// Generate a SMART-like daily history for a fleet of disks
///
/// Each disk gets between `min_steps` and `max_steps` rows. Failing disks show
/// growing sector and error counters over their last days and carry
/// `failure = 1` on their final row only.
pub fn generate_disk_dataframe(config: &SyntheticConfig) -> PolarsResult<DataFrame> {
    if config.min_steps == 0 || config.min_steps > config.max_steps {
        return Err(PolarsError::ComputeError(
            format!("Invalid step range {}..={}", config.min_steps, config.max_steps).into(),
        ));
    }
    if !(0.0..=1.0).contains(&config.failure_rate) {
        return Err(PolarsError::ComputeError(
            format!("Failure rate must be in [0, 1], got {}", config.failure_rate).into(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);

    let mut failing = vec![false; config.n_disks];
    let n_failing = failing_disk_count(config.n_disks, config.failure_rate);
    let mut order: Vec<usize> = (0..config.n_disks).collect();
    order.shuffle(&mut rng);
    for &disk in &order[..n_failing] {
        failing[disk] = true;
    }

    let mut disk_ids = Vec::new();
    let mut steps = Vec::new();
    let mut reallocated = Vec::new();
    let mut power_on_hours = Vec::new();
    let mut uncorrectable = Vec::new();
    let mut temperature = Vec::new();
    let mut pending = Vec::new();
    let mut capacity = Vec::new();
    let mut labels = Vec::new();

    for (disk, &fails) in failing.iter().enumerate() {
        let n_steps = rng.random_range(config.min_steps..=config.max_steps);
        let onset = n_steps.saturating_sub(rng.random_range(3..=8usize));
        let disk_capacity = CAPACITIES_TB[rng.random_range(0..CAPACITIES_TB.len())];
        let base_temp = rng.random_range(28.0..42.0);
        let mut hours = rng.random_range(1_000.0..40_000.0);
        let mut sectors = 0.0;
        let mut errors = 0.0;
        let mut pending_sectors = 0.0;

        for step in 0..n_steps {
            hours += 24.0;
            if fails && step >= onset {
                sectors += rng.random_range(1.0..20.0);
                errors += rng.random_range(0.0..3.0f64).floor();
                pending_sectors += rng.random_range(0.0..8.0f64).floor();
            } else if rng.random_bool(0.02) {
                sectors += 1.0;
            }
            let heat = if fails && step >= onset { 4.0 } else { 0.0 };

            disk_ids.push(format!("disk_{:05}", disk));
            steps.push(step as i64);
            reallocated.push(sectors);
            power_on_hours.push(hours);
            uncorrectable.push(errors);
            temperature.push(base_temp + heat + rng.random_range(-1.5..1.5));
            pending.push(pending_sectors);
            capacity.push(disk_capacity);
            labels.push(i64::from(fails && step + 1 == n_steps));
        }
    }

    let df = df!(
        DISK_ID_COLUMN => disk_ids,
        STEP_COLUMN => steps,
        SMART_FEATURES[0] => reallocated,
        SMART_FEATURES[1] => power_on_hours,
        SMART_FEATURES[2] => uncorrectable,
        SMART_FEATURES[3] => temperature,
        SMART_FEATURES[4] => pending,
        STATIC_FEATURES[0] => capacity,
        LABEL_COLUMN => labels
    )?;

    info!(
        "Generated {} rows for {} disks ({} failing)",
        df.height(),
        config.n_disks,
        n_failing
    );
    Ok(df)
}
