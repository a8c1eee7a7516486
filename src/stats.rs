//! Small numeric helpers shared by the engine, snapshot and grading code.
//!
//! All inputs are latency samples in milliseconds, in the order they were
//! recorded.

/// Round to two decimal places for reporting.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Arithmetic mean, or `None` for an empty input.
pub fn mean_f64<'a>(samples: impl IntoIterator<Item = &'a f64>) -> Option<f64> {
    let (sum, count) = samples
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, count), &sample| (sum + sample, count + 1));

    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}

/// Minimum and maximum of the samples, or `None` for an empty input.
pub fn min_max_f64<'a>(
    samples: impl IntoIterator<Item = &'a f64>,
) -> Option<(f64, f64)> {
    samples.into_iter().fold(None, |acc, &sample| match acc {
        None => Some((sample, sample)),
        Some((min, max)) => Some((min.min(sample), max.max(sample))),
    })
}

/// Mean absolute difference between consecutive samples.
///
/// Samples are taken in the order given; they are not re-sorted. Fewer
/// than two samples yields `0.0`.
pub fn jitter_f64<'a>(samples: impl IntoIterator<Item = &'a f64>) -> f64 {
    let mut previous: Option<f64> = None;
    let mut total = 0.0f64;
    let mut pairs = 0usize;

    for &sample in samples {
        if let Some(prev) = previous {
            total += (sample - prev).abs();
            pairs += 1;
        }
        previous = Some(sample);
    }

    if pairs == 0 {
        0.0
    } else {
        total / pairs as f64
    }
}

/// Percentage of lost probes, `0.0` when nothing has been sent.
pub fn loss_percent(packets_sent: u64, packets_lost: u64) -> f64 {
    if packets_sent == 0 {
        return 0.0;
    }

    100.0 * packets_lost as f64 / packets_sent as f64
}
