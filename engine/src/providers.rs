//! Provider traits the engine loops consume.
//!
//! The loops never talk to concrete HTTP types: the API surface, the CAPTCHA
//! pipeline, and the clock are injected behind these traits so tests run the
//! real loops against scripted doubles at memory speed.

use chrono::{DateTime, Utc};
use ekonsulat_client::{
    CancelToken, CaptchaPipeline, CaptchaSolver, CheckSlotsResult, Country, EkonsulatClient,
    ReservationResult, Result, VerifiedCaptcha,
};

/// The slot-search and reservation surface of the upstream API.
pub trait BookingApi: Send + Sync {
    /// Poll available slots for a location.
    fn check_slots(
        &self,
        location_id: &str,
        party_size: u32,
        token: &str,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = Result<CheckSlotsResult>> + Send;

    /// Attempt to reserve a slot.
    fn create_reservation(
        &self,
        date: &str,
        location_id: &str,
        token: &str,
        party_size: u32,
        only_children: bool,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = Result<ReservationResult>> + Send;

    /// List countries and consulates (display details).
    fn list_countries(
        &self,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = Result<Vec<Country>>> + Send;
}

impl BookingApi for EkonsulatClient {
    async fn check_slots(
        &self,
        location_id: &str,
        party_size: u32,
        token: &str,
        cancel: &CancelToken,
    ) -> Result<CheckSlotsResult> {
        EkonsulatClient::check_slots(self, location_id, party_size, token, cancel).await
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
        EkonsulatClient::create_reservation(
            self,
            date,
            location_id,
            token,
            party_size,
            only_children,
            cancel,
        )
        .await
    }

    async fn list_countries(&self, cancel: &CancelToken) -> Result<Vec<Country>> {
        EkonsulatClient::list_countries(self, cancel).await
    }
}

/// Source of fresh verified CAPTCHA tokens.
pub trait CaptchaProvider: Send + Sync {
    /// Run one full fetch-solve-verify round trip.
    fn solve_verified(
        &self,
        cancel: &CancelToken,
    ) -> impl std::future::Future<Output = Result<VerifiedCaptcha>> + Send;
}

impl<S: CaptchaSolver> CaptchaProvider for CaptchaPipeline<S> {
    async fn solve_verified(&self, cancel: &CancelToken) -> Result<VerifiedCaptcha> {
        CaptchaPipeline::solve_verified(self, cancel).await
    }
}

/// Abstracted time source, for deterministic tests.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Production clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
