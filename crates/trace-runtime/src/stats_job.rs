//! Per-channel statistics on the blocking pool.

use std::collections::BTreeMap;
use std::io;

use tokio::task::JoinSet;
use trace_core::error::{Result, StatsError};
use trace_core::stats::{running_mean, running_stdev, StatsRequest, StatsResponse};
use tracing::debug;

type ChannelStats = (String, Vec<f64>, Vec<f64>);

/// Same result as [`trace_core::stats::compute_stats`], with each channel
/// computed as its own blocking task.
///
/// The first failing channel aborts the remaining tasks and its error is
/// returned.
pub async fn compute_stats_concurrent(request: StatsRequest) -> Result<StatsResponse> {
    let StatsRequest {
        avg_period,
        stdev_period,
        traces,
    } = request;

    let mut jobs: JoinSet<std::result::Result<ChannelStats, StatsError>> = JoinSet::new();
    for (channel, trace) in traces {
        jobs.spawn_blocking(move || {
            let avgs = running_mean(&trace, avg_period)?;
            let stdevs = running_stdev(&trace, stdev_period)?;
            Ok((channel, avgs, stdevs))
        });
    }

    let mut avgs = BTreeMap::new();
    let mut stdevs = BTreeMap::new();
    while let Some(joined) = jobs.join_next().await {
        let (channel, channel_avgs, channel_stdevs) = joined.map_err(io::Error::from)??;
        debug!("Channel {}: {} points", channel, channel_avgs.len());
        avgs.insert(channel.clone(), channel_avgs);
        stdevs.insert(channel, channel_stdevs);
    }

    Ok(StatsResponse { avgs, stdevs })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use trace_core::error::TraceError;
    use trace_core::stats::compute_stats;

    fn request(avg_period: i64, stdev_period: i64) -> StatsRequest {
        let mut traces = BTreeMap::new();
        traces.insert("x".to_string(), vec![1.0, 2.0, 3.0, 4.0, 5.0]);
        traces.insert(
            "y".to_string(),
            (0..500).map(|i| ((i * 37) % 11) as f64 - 5.0).collect(),
        );
        traces.insert("empty".to_string(), Vec::new());
        StatsRequest {
            avg_period,
            stdev_period,
            traces,
        }
    }

    #[tokio::test]
    async fn test_concurrent_matches_sequential() {
        let req = request(3, 7);
        let expected = compute_stats(&req).unwrap();
        let actual = compute_stats_concurrent(req).await.unwrap();
        assert_eq!(actual, expected);
        assert_eq!(actual.avgs["x"], vec![1.0, 1.5, 2.0, 3.0, 4.0]);
        assert!(actual.avgs["empty"].is_empty());
        assert!(actual.stdevs["empty"].is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_rejects_bad_period() {
        let err = compute_stats_concurrent(request(0, 3)).await.unwrap_err();
        assert!(matches!(
            err,
            TraceError::Stats(StatsError::InvalidPeriod(0))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_rejects_non_finite() {
        let mut req = request(2, 2);
        req.traces.insert("bad".to_string(), vec![1.0, f64::NAN]);
        let err = compute_stats_concurrent(req).await.unwrap_err();
        assert!(matches!(
            err,
            TraceError::Stats(StatsError::NonFinite { index: 1 })
        ));
    }
}
