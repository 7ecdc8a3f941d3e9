//! Remaining-time estimation for status polling
//!
//! Estimates are rough by nature. They only use what the queue already
//! knows: the job's own progress and the processing time of recently
//! completed jobs.

use crate::job::{JobRecord, JobState};

/// Window used for throughput figures
pub const THROUGHPUT_WINDOW_MS: i64 = 60_000;

/// Mean processing time of the given jobs, ignoring unfinished ones
pub fn average_duration_ms(jobs: &[JobRecord]) -> Option<u64> {
    let durations: Vec<u64> = jobs.iter().filter_map(JobRecord::duration_ms).collect();
    if durations.is_empty() {
        return None;
    }
    Some(durations.iter().sum::<u64>() / durations.len() as u64)
}

/// Jobs that finished within the last minute
pub fn throughput_per_min(jobs: &[JobRecord], now: i64) -> usize {
    let since = now.saturating_sub(THROUGHPUT_WINDOW_MS);
    jobs.iter()
        .filter(|job| job.finished_at.is_some_and(|at| at >= since))
        .count()
}

/// Estimate how long until `job` finishes
///
/// - active, progress `p > 0`: `elapsed * (100 - p) / p`
/// - active, no progress yet: average duration minus elapsed, floored at 0
/// - waiting: `ceil(position / concurrency)` average durations
/// - delayed: time until it becomes runnable plus one average duration
/// - finished: 0
///
/// Returns `None` when the estimate needs history that does not exist.
pub fn estimate_remaining_ms(
    job: &JobRecord,
    now: i64,
    position: Option<usize>,
    average_ms: Option<u64>,
    concurrency: usize,
) -> Option<u64> {
    match job.state {
        JobState::Completed | JobState::Failed => Some(0),
        JobState::Active => {
            let elapsed = job
                .processed_at
                .map(|start| now.saturating_sub(start).max(0) as u64)
                .unwrap_or(0);
            let progress = u64::from(job.progress.min(100));
            if progress > 0 {
                Some(elapsed.saturating_mul(100 - progress) / progress)
            } else {
                average_ms.map(|avg| avg.saturating_sub(elapsed))
            }
        }
        JobState::Waiting => {
            let avg = average_ms?;
            let position = position? as u64;
            let concurrency = concurrency.max(1) as u64;
            let rounds = position.div_ceil(concurrency).max(1);
            Some(rounds.saturating_mul(avg))
        }
        JobState::Delayed => {
            let avg = average_ms?;
            let until_runnable = job
                .run_at
                .map(|at| at.saturating_sub(now).max(0) as u64)
                .unwrap_or(0);
            Some(until_runnable.saturating_add(avg))
        }
    }
}
