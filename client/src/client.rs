//! Typed HTTP client for the e-konsulat booking API.
//!
//! Thin, stateless wrappers over the five upstream endpoints. The client is
//! `Clone` and safe for concurrent calls (it shares one `reqwest::Client`);
//! every operation takes a [`CancelToken`] and runs under a per-request
//! deadline. Cancellation aborts the in-flight call.

use crate::cancel::CancelToken;
use crate::error::{ClientError, Endpoint, Result};
use crate::types::{
    CaptchaChallenge, CheckSlotsRequest, CheckSlotsResponse, CheckSlotsResult, Country, CountryDto,
    CreateReservationRequest, CreateReservationResponse, GenerateCaptchaRequest,
    GenerateCaptchaResponse, ReservationResult, ReservationTicket, Slot, VerifyCaptchaRequest,
    VerifyOutcome,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use reqwest::header::{HeaderMap, HeaderValue, ORIGIN, REFERER, USER_AGENT};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

/// Consular web host the API sits behind. The server rejects requests whose
/// `Origin`/`Referer` do not point here.
const DEFAULT_BASE_URL: &str = "https://secure.e-konsulat.gov.pl";

/// Conventional browser user agent; the upstream rejects obvious bots.
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Language version id used across the visa-reservation endpoints.
const LANGUAGE_VERSION_ID: u32 = 2;

/// Dimensions requested for CAPTCHA images.
const CAPTCHA_IMAGE_WIDTH: u32 = 400;
const CAPTCHA_IMAGE_HEIGHT: u32 = 100;

/// Default per-request deadline.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the e-konsulat booking API.
///
/// # Example
///
/// ```no_run
/// use ekonsulat_client::{cancel::CancelToken, client::EkonsulatClient};
///
/// # async fn example() -> ekonsulat_client::error::Result<()> {
/// let client = EkonsulatClient::new()?;
/// let cancel = CancelToken::new();
/// let countries = client.list_countries(&cancel).await?;
/// println!("{} countries", countries.len());
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct EkonsulatClient {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl EkonsulatClient {
    /// Create a client against the production host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn new() -> Result<Self> {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    /// Create a client against a custom host (tests, proxies).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Network`] if the underlying HTTP client cannot
    /// be constructed.
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into();

        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        let origin = HeaderValue::from_str(&base_url)
            .map_err(|e| ClientError::InvalidArgument(format!("base url: {e}")))?;
        headers.insert(ORIGIN, origin);
        let referer = HeaderValue::from_str(&format!("{base_url}/"))
            .map_err(|e| ClientError::InvalidArgument(format!("base url: {e}")))?;
        headers.insert(REFERER, referer);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| ClientError::Network(format!("failed to build http client: {e}")))?;

        Ok(Self { http, base_url, timeout: DEFAULT_TIMEOUT })
    }

    /// Override the per-request deadline (default 30 s).
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Request a fresh CAPTCHA image.
    ///
    /// # Errors
    ///
    /// Propagates transport, deadline, and upstream errors; base64 failures
    /// surface as [`ClientError::Decode`].
    pub async fn generate_captcha(&self, cancel: &CancelToken) -> Result<CaptchaChallenge> {
        let body = GenerateCaptchaRequest {
            image_width: CAPTCHA_IMAGE_WIDTH,
            image_height: CAPTCHA_IMAGE_HEIGHT,
        };
        let resp: GenerateCaptchaResponse = self
            .post_json(Endpoint::CaptchaGenerate, "/api/u-captcha/generuj", &body, cancel)
            .await?;

        let image = decode_captcha_image(&resp.image)?;
        tracing::debug!(
            expected_len = resp.ilosc_znakow,
            image_bytes = image.len(),
            "captcha image fetched"
        );

        Ok(CaptchaChallenge {
            image_token: resp.id,
            expected_len: resp.ilosc_znakow,
            image,
        })
    }

    /// Submit a CAPTCHA solution for verification.
    ///
    /// Returns the raw outcome; interpreting `ok: false` is left to the
    /// pipeline so the rejection is visible alongside its context.
    ///
    /// # Errors
    ///
    /// Propagates transport, deadline, and upstream errors. A 403 here is a
    /// verification throttle and is classified as a soft rate limit.
    pub async fn verify_captcha(
        &self,
        code: &str,
        image_token: &str,
        cancel: &CancelToken,
    ) -> Result<VerifyOutcome> {
        let body = VerifyCaptchaRequest {
            kod: code.to_string(),
            token: image_token.to_string(),
        };
        self.post_json(Endpoint::CaptchaVerify, "/api/u-captcha/sprawdz", &body, cancel)
            .await
    }

    /// List countries and their consulates.
    ///
    /// # Errors
    ///
    /// Propagates transport, deadline, and upstream errors.
    pub async fn list_countries(&self, cancel: &CancelToken) -> Result<Vec<Country>> {
        let path = format!("/api/konfiguracja/placowki/placowki-w-krajach/{LANGUAGE_VERSION_ID}");
        let dtos: Vec<CountryDto> = self.get_json(Endpoint::Countries, &path, cancel).await?;
        Ok(dtos.into_iter().map(Country::from).collect())
    }

    /// Poll available slots for a location.
    ///
    /// # Errors
    ///
    /// Fails with [`ClientError::InvalidArgument`] on an empty location id,
    /// non-positive party size, or empty token; otherwise propagates
    /// transport, deadline, and upstream errors (with the upstream reason
    /// code preserved when the body carries one).
    pub async fn check_slots(
        &self,
        location_id: &str,
        party_size: u32,
        token: &str,
        cancel: &CancelToken,
    ) -> Result<CheckSlotsResult> {
        if location_id.is_empty() {
            return Err(ClientError::InvalidArgument("location id is empty".into()));
        }
        if party_size == 0 {
            return Err(ClientError::InvalidArgument("party size must be positive".into()));
        }
        if token.is_empty() {
            return Err(ClientError::InvalidArgument("search token is empty".into()));
        }

        let path = format!("/api/rezerwacja-wizyt-wizowych/terminy/{location_id}/{party_size}");
        let body = CheckSlotsRequest { captcha_token: token.to_string() };
        let resp: CheckSlotsResponse = self.post_json(Endpoint::Slots, &path, &body, cancel).await?;

        let result = CheckSlotsResult {
            slots: resp.tabela_dni.into_iter().map(Slot::new).collect(),
            token: resp.token.filter(|t| !t.is_empty()),
            consulate_id: resp.id_placowki.map(crate::types::OpaqueId::into_string),
            service_type: resp.rodzaj_uslugi.map(crate::types::OpaqueId::into_string),
            location_id: location_id.to_string(),
        };
        tracing::debug!(
            location_id = %location_id,
            slot_count = result.slots.len(),
            has_token = result.token.is_some(),
            "slots polled"
        );
        metrics::counter!("client.check_slots.total").increment(1);
        Ok(result)
    }

    /// Attempt to reserve a slot.
    ///
    /// # Errors
    ///
    /// - [`ClientError::InvalidArgument`] on malformed date, empty location
    ///   id / token, or non-positive party size.
    /// - [`ClientError::NoTicket`] when the upstream answers 2xx without a
    ///   ticket (the slot was taken).
    /// - Transport, deadline, and upstream errors otherwise.
    pub async fn create_reservation(
        &self,
        date: &str,
        location_id: &str,
        token: &str,
        party_size: u32,
        only_children: bool,
        cancel: &CancelToken,
    ) -> Result<ReservationResult> {
        if !is_valid_date(date) {
            return Err(ClientError::InvalidArgument(format!(
                "date must be YYYY-MM-DD, got {date:?}"
            )));
        }
        if location_id.is_empty() {
            return Err(ClientError::InvalidArgument("location id is empty".into()));
        }
        if token.is_empty() {
            return Err(ClientError::InvalidArgument("search token is empty".into()));
        }
        if party_size == 0 {
            return Err(ClientError::InvalidArgument("party size must be positive".into()));
        }

        let body = CreateReservationRequest {
            data: date.to_string(),
            id_lokalizacji: location_id.to_string(),
            id_wersji_jezykowej: LANGUAGE_VERSION_ID,
            token: token.to_string(),
            liczba_osob: party_size,
            tylko_dzieci: only_children,
        };
        let resp: CreateReservationResponse = self
            .post_json(Endpoint::Reservation, "/api/rezerwacja-wizyt-wizowych/rezerwacje", &body, cancel)
            .await?;

        into_reservation_result(resp, date)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        path: &str,
        body: &B,
        cancel: &CancelToken,
    ) -> Result<T> {
        let request = self.http.post(format!("{}{path}", self.base_url)).json(body);
        self.execute(endpoint, request, cancel).await
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        path: &str,
        cancel: &CancelToken,
    ) -> Result<T> {
        let request = self.http.get(format!("{}{path}", self.base_url));
        self.execute(endpoint, request, cancel).await
    }

    /// Send a request racing the deadline and the cancellation token.
    ///
    /// Dropping the in-flight future aborts the underlying connection, so a
    /// fired token stops the call promptly rather than after the deadline.
    async fn execute<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        request: reqwest::RequestBuilder,
        cancel: &CancelToken,
    ) -> Result<T> {
        let call = async {
            let response = request.send().await.map_err(map_transport_error)?;
            let status = response.status().as_u16();

            if (200..300).contains(&status) {
                response
                    .json::<T>()
                    .await
                    .map_err(|e| ClientError::Decode(e.to_string()))
            } else {
                let body = response.text().await.unwrap_or_default();
                let (reason, message) = extract_upstream_reason(&body);
                tracing::debug!(
                    endpoint = %endpoint,
                    status = status,
                    reason = reason.as_deref().unwrap_or(""),
                    "upstream error response"
                );
                metrics::counter!("client.api_errors.total", "endpoint" => endpoint.name())
                    .increment(1);
                Err(ClientError::Api { endpoint, status, reason, message })
            }
        };

        tokio::select! {
            () = cancel.cancelled() => Err(ClientError::Cancelled),
            outcome = tokio::time::timeout(self.timeout, call) => match outcome {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout),
            },
        }
    }
}

/// `^\d{4}-\d{2}-\d{2}$`
fn is_valid_date(date: &str) -> bool {
    let bytes = date.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| matches!(i, 4 | 7) || b.is_ascii_digit())
}

fn map_transport_error(error: reqwest::Error) -> ClientError {
    if error.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Network(error.to_string())
    }
}

/// Pull the upstream reason code out of an error body.
///
/// Error bodies are JSON of the shape `{"reason": "...", "message": "..."}`,
/// but the upstream is not consistent about it; fall back to the raw body.
fn extract_upstream_reason(body: &str) -> (Option<String>, String) {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        let reason = value
            .get("reason")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);
        let message = value
            .get("message")
            .and_then(serde_json::Value::as_str)
            .map_or_else(|| body.to_string(), str::to_string);
        (reason, message)
    } else {
        (None, body.to_string())
    }
}

/// Some deployments wrap the image in a data URI; accept both.
fn decode_captcha_image(payload: &str) -> Result<Vec<u8>> {
    let raw = payload
        .split_once("base64,")
        .map_or(payload, |(_, data)| data);
    STANDARD
        .decode(raw.trim())
        .map_err(|e| ClientError::Decode(format!("captcha image: {e}")))
}

fn into_reservation_result(
    resp: CreateReservationResponse,
    requested_date: &str,
) -> Result<ReservationResult> {
    let primary = resp
        .bilet
        .filter(|t| t.ticket_id.as_deref().is_some_and(|id| !id.is_empty()))
        .ok_or(ClientError::NoTicket)?;

    let to_ticket = |dto: crate::types::TicketDto| -> Option<ReservationTicket> {
        let ticket_id = dto.ticket_id.filter(|id| !id.is_empty())?;
        Some(ReservationTicket {
            ticket_id,
            date: dto.date.unwrap_or_else(|| requested_date.to_string()),
            time: dto.time.filter(|t| !t.is_empty()),
            is_child_application: dto.is_child_application,
        })
    };

    let is_child_application = primary.is_child_application;
    // Checked non-empty above.
    let primary_ticket = to_ticket(primary).ok_or(ClientError::NoTicket)?;

    let mut tickets: Vec<ReservationTicket> =
        resp.lista_biletow.into_iter().filter_map(to_ticket).collect();
    if tickets.is_empty() {
        tickets.push(primary_ticket.clone());
    }

    metrics::counter!("client.reservations.created").increment(1);
    Ok(ReservationResult { primary_ticket, tickets, is_child_application })
}
