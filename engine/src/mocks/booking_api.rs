//! Scripted booking API double.

use super::lock;
use crate::providers::BookingApi;
use ekonsulat_client::{
    CancelToken, CheckSlotsResult, ClientError, Country, ReservationResult, Result,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Recorded arguments of one `check_slots` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckSlotsCall {
    /// Location polled.
    pub location_id: String,
    /// Party size sent.
    pub party_size: u32,
    /// Token sent.
    pub token: String,
}

/// Recorded arguments of one `create_reservation` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReservationCall {
    /// Date attempted.
    pub date: String,
    /// Location sent.
    pub location_id: String,
    /// Token sent.
    pub token: String,
    /// Party size sent.
    pub party_size: u32,
    /// Children-only flag sent.
    pub only_children: bool,
}

/// In-memory [`BookingApi`] with per-endpoint response queues.
///
/// - `check_slots` pops its queue; once drained it keeps repeating the last
///   popped response (slots stay available until someone takes them), or the
///   empty "nothing yet" answer if nothing was ever queued.
/// - Empty reservation queue → [`ClientError::NoTicket`].
/// - Optional per-call latency honours cancellation, so cancel/timeout paths
///   are testable.
#[derive(Debug, Clone, Default)]
pub struct MockBookingApi {
    check_slots_queue: Arc<Mutex<VecDeque<Result<CheckSlotsResult>>>>,
    last_check_slots: Arc<Mutex<Option<Result<CheckSlotsResult>>>>,
    reservation_queue: Arc<Mutex<VecDeque<Result<ReservationResult>>>>,
    countries: Arc<Mutex<Vec<Country>>>,
    check_slots_calls: Arc<Mutex<Vec<CheckSlotsCall>>>,
    reservation_calls: Arc<Mutex<Vec<ReservationCall>>>,
    latency: Duration,
}

impl MockBookingApi {
    /// Create a double with empty queues.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add per-call latency (cancellable).
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue the next `check_slots` response.
    pub fn queue_check_slots(&self, response: Result<CheckSlotsResult>) {
        lock(&self.check_slots_queue).push_back(response);
    }

    /// Queue the next `create_reservation` response.
    pub fn queue_reservation(&self, response: Result<ReservationResult>) {
        lock(&self.reservation_queue).push_back(response);
    }

    /// Set the countries listing.
    pub fn set_countries(&self, countries: Vec<Country>) {
        *lock(&self.countries) = countries;
    }

    /// All recorded `check_slots` calls, in order.
    #[must_use]
    pub fn check_slots_calls(&self) -> Vec<CheckSlotsCall> {
        lock(&self.check_slots_calls).clone()
    }

    /// All recorded `create_reservation` calls, in order.
    #[must_use]
    pub fn reservation_calls(&self) -> Vec<ReservationCall> {
        lock(&self.reservation_calls).clone()
    }

    async fn simulate_latency(&self, cancel: &CancelToken) -> Result<()> {
        if !self.latency.is_zero() && cancel.sleep(self.latency).await {
            return Err(ClientError::Cancelled);
        }
        Ok(())
    }
}

impl BookingApi for MockBookingApi {
    async fn check_slots(
        &self,
        location_id: &str,
        party_size: u32,
        token: &str,
        cancel: &CancelToken,
    ) -> Result<CheckSlotsResult> {
        lock(&self.check_slots_calls).push(CheckSlotsCall {
            location_id: location_id.to_string(),
            party_size,
            token: token.to_string(),
        });
        self.simulate_latency(cancel).await?;

        if let Some(response) = lock(&self.check_slots_queue).pop_front() {
            *lock(&self.last_check_slots) = Some(response.clone());
            return response;
        }
        lock(&self.last_check_slots).clone().unwrap_or_else(|| {
            Ok(CheckSlotsResult {
                slots: Vec::new(),
                token: None,
                consulate_id: None,
                service_type: None,
                location_id: location_id.to_string(),
            })
        })
    }

    async fn create_reservation(
        &self,
        date: &str,
        location_id: &str,
        token: &str,
        party_size: u32,
        only_children: bool,
        cancel: &CancelToken,
    ) -> Result<ReservationResult> {
        lock(&self.reservation_calls).push(ReservationCall {
            date: date.to_string(),
            location_id: location_id.to_string(),
            token: token.to_string(),
            party_size,
            only_children,
        });
        self.simulate_latency(cancel).await?;

        lock(&self.reservation_queue)
            .pop_front()
            .unwrap_or(Err(ClientError::NoTicket))
    }

    async fn list_countries(&self, cancel: &CancelToken) -> Result<Vec<Country>> {
        self.simulate_latency(cancel).await?;
        Ok(lock(&self.countries).clone())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::mocks::slots_result;

    #[tokio::test]
    async fn test_queue_pops_then_repeats_last_response() {
        let api = MockBookingApi::new();
        let cancel = CancelToken::new();
        api.queue_check_slots(Ok(slots_result(&["2026-01-12"], Some("T1"), "191")));

        let first = api.check_slots("191", 1, "C1", &cancel).await.unwrap();
        assert_eq!(first.slots.len(), 1);

        let second = api.check_slots("191", 1, "C2", &cancel).await.unwrap();
        assert_eq!(second, first, "drained queue repeats the last response");

        let calls = api.check_slots_calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].token, "C1");
        assert_eq!(calls[1].token, "C2");
    }

    #[tokio::test]
    async fn test_empty_history_yields_no_slots() {
        let api = MockBookingApi::new();
        let cancel = CancelToken::new();
        let result = api.check_slots("191", 1, "C1", &cancel).await.unwrap();
        assert!(result.slots.is_empty());
        assert!(result.token.is_none());
    }

    #[tokio::test]
    async fn test_reservation_default_is_no_ticket() {
        let api = MockBookingApi::new();
        let cancel = CancelToken::new();
        let result = api
            .create_reservation("2026-01-12", "191", "T1", 1, false, &cancel)
            .await;
        assert_eq!(result, Err(ClientError::NoTicket));
    }

    #[tokio::test]
    async fn test_latency_honours_cancellation() {
        let api = MockBookingApi::new().with_latency(Duration::from_secs(30));
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = api.check_slots("191", 1, "T1", &cancel).await;
        assert_eq!(result, Err(ClientError::Cancelled));
    }
}
