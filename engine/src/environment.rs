//! Engine environment: the injected dependency bundle.

use crate::providers::{BookingApi, CaptchaProvider, Clock};
use std::sync::Arc;

/// External dependencies of the engine loops.
///
/// # Type Parameters
///
/// - `A`: booking API surface
/// - `P`: CAPTCHA provider
/// - `C`: clock
pub struct EngineEnvironment<A, P, C>
where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    /// The upstream API. Shared read-only; safe for concurrent calls.
    pub api: Arc<A>,
    /// The CAPTCHA pipeline.
    pub captcha: Arc<P>,
    /// Time source.
    pub clock: Arc<C>,
}

impl<A, P, C> EngineEnvironment<A, P, C>
where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    /// Bundle the dependencies.
    #[must_use]
    pub fn new(api: Arc<A>, captcha: Arc<P>, clock: Arc<C>) -> Self {
        Self { api, captcha, clock }
    }
}

impl<A, P, C> Clone for EngineEnvironment<A, P, C>
where
    A: BookingApi,
    P: CaptchaProvider,
    C: Clock,
{
    fn clone(&self) -> Self {
        Self {
            api: Arc::clone(&self.api),
            captcha: Arc::clone(&self.captcha),
            clock: Arc::clone(&self.clock),
        }
    }
}
