//! Server-Sent-Events publisher for live voltage readings.
//!
//! One acquisition cycle per tick, persisted and republished as a timestamped
//! event. Backoff policy: ~1s between steady ticks, ~10s after a
//! hardware-unavailable tick (retried indefinitely), ~5s after any other
//! failure. Client disconnection drops the stream, which cancels the pending
//! tick at its next await point; no further cycles run and nothing is raised.

use crate::acquisition::data::{ErrorPayload, VoltageSnapshot};
use crate::web::router::AppState;
use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use std::convert::Infallible;
use std::time::Duration;
use tracing::{error, info};

/// Delay before retrying after the hardware interface was found missing.
const HARDWARE_BACKOFF: Duration = Duration::from_secs(10);

/// Delay before retrying after a transient tick failure.
const TRANSIENT_BACKOFF: Duration = Duration::from_secs(5);

/// `GET /api/voltage/stream` — live readings, one event per poll tick.
pub async fn voltage_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    info!("Starting SSE voltage stream.");
    Sse::new(voltage_events(state)).keep_alive(KeepAlive::default())
}

/// The event stream behind the SSE response.
///
/// Built with `unfold` so each step carries the backoff chosen by the
/// previous tick; the first tick fires immediately.
pub fn voltage_events(state: AppState) -> impl Stream<Item = Result<Event, Infallible>> {
    stream::unfold((state, Duration::ZERO), |(state, delay)| async move {
        tokio::time::sleep(delay).await;
        let (payload, next_delay) = next_tick(&state).await;
        Some((Ok(json_event(&payload)), (state, next_delay)))
    })
}

/// Run one stream tick: acquire, persist, and choose the next backoff.
async fn next_tick(state: &AppState) -> (serde_json::Value, Duration) {
    let result = {
        let mut sampler = state.sampler.lock().await;
        sampler.sample_all().await
    };

    match result {
        Ok(readings) => {
            for reading in &readings {
                // Storage failures are logged inside the sink; the stream
                // continues regardless.
                state.store.record(reading.cell, reading.voltage);
            }
            let snapshot = VoltageSnapshot::success(readings);
            (
                serde_json::to_value(snapshot).unwrap_or_default(),
                state.poll_interval,
            )
        }
        Err(e) if e.is_hardware_unavailable() => {
            error!("Hardware interface error in SSE voltage stream: {e}");
            let payload = ErrorPayload::new(e.to_string(), "BSE_STREAM_NO_HW_INTERFACE");
            (
                serde_json::to_value(payload).unwrap_or_default(),
                HARDWARE_BACKOFF,
            )
        }
        Err(e) => {
            error!("Error in SSE voltage stream: {e}");
            let payload = ErrorPayload::new(e.to_string(), "BSE_STREAM_ERROR");
            (
                serde_json::to_value(payload).unwrap_or_default(),
                TRANSIENT_BACKOFF,
            )
        }
    }
}

/// Wrap a payload in an SSE event.
///
/// If serialization of an error payload itself fails, the failure is logged
/// and a bare comment event is emitted instead; it is never escalated.
fn json_event(payload: &serde_json::Value) -> Event {
    match Event::default().json_data(payload) {
        Ok(event) => event,
        Err(e) => {
            error!("Failed to serialize SSE payload: {e}");
            Event::default().comment("payload serialization failed")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::bus::mock::MockBus;
    use crate::acquisition::{CellSampler, SamplerConfig};
    use crate::storage::VoltageStore;
    use futures_util::StreamExt;

    fn state_with(sampler: CellSampler) -> AppState {
        AppState::new(
            sampler,
            VoltageStore::open_in_memory().unwrap(),
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn test_tick_success_persists_and_keeps_interval() {
        // Two cells, both readable: 2 reads per channel.
        let sampler = CellSampler::new(
            Some(Box::new(MockBus::with_reads(vec![0, 200, 0, 200]))),
            SamplerConfig::default().with_cells(2),
        );
        let state = state_with(sampler);

        let (payload, delay) = next_tick(&state).await;
        assert_eq!(payload["status"], "success");
        assert_eq!(payload["readings"].as_array().unwrap().len(), 2);
        assert_eq!(delay, state.poll_interval);

        // Both readings were persisted.
        assert_eq!(state.store.history(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_tick_hardware_absent_backs_off_long() {
        let state = state_with(CellSampler::new(None, SamplerConfig::default()));

        let (payload, delay) = next_tick(&state).await;
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_code"], "BSE_STREAM_NO_HW_INTERFACE");
        assert_eq!(delay, HARDWARE_BACKOFF);

        // Nothing persisted on an error tick.
        assert!(state.store.history(10).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_stream_emits_error_events_without_terminating() {
        let state = state_with(CellSampler::new(None, SamplerConfig::default()));
        let mut events = Box::pin(voltage_events(state));

        // The first tick fires immediately even when hardware is absent; the
        // stream stays open for the retry rather than ending.
        let first = events.next().await;
        assert!(first.is_some());
    }

    #[tokio::test]
    async fn test_null_readings_reach_the_event_but_not_the_store() {
        // Channel 0 reads, channel 1 faults mid-sequence.
        let sampler = CellSampler::new(
            Some(Box::new(MockBus::with_reads(vec![0, 200]))),
            SamplerConfig::default().with_cells(2),
        );
        let state = state_with(sampler);

        let (payload, _) = next_tick(&state).await;
        let readings = payload["readings"].as_array().unwrap();
        assert_eq!(readings.len(), 2);
        assert!(readings[1]["voltage"].is_null());
        assert_eq!(state.store.history(10).unwrap().len(), 1);
    }
}
