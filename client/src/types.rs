//! Wire and domain types for the e-konsulat booking API.
//!
//! The upstream speaks JSON with Polish field names; the `*Dto` types mirror
//! that wire format via serde renames, and the public value records expose
//! the same data under stable English names. Domain records are immutable
//! values: the engine clones them into state snapshots freely.

use serde::{Deserialize, Serialize};

// ═══════════════════════════════════════════════════════════════════════
// CAPTCHA endpoints
// ═══════════════════════════════════════════════════════════════════════

/// Body of POST `/api/u-captcha/generuj`.
#[derive(Debug, Serialize)]
pub(crate) struct GenerateCaptchaRequest {
    #[serde(rename = "imageWidth")]
    pub image_width: u32,
    #[serde(rename = "imageHeight")]
    pub image_height: u32,
}

/// Response of POST `/api/u-captcha/generuj`.
#[derive(Debug, Deserialize)]
pub(crate) struct GenerateCaptchaResponse {
    /// Opaque image token, echoed back on verify.
    pub id: String,
    /// Number of characters the solution must have.
    #[serde(rename = "iloscZnakow")]
    pub ilosc_znakow: usize,
    /// Base64-encoded image bytes.
    pub image: String,
}

/// A fetched CAPTCHA challenge, image already decoded.
#[derive(Debug, Clone)]
pub struct CaptchaChallenge {
    /// Opaque token identifying this image on the verify endpoint.
    pub image_token: String,
    /// Expected solution length in characters.
    pub expected_len: usize,
    /// Raw image bytes.
    pub image: Vec<u8>,
}

/// Body of POST `/api/u-captcha/sprawdz`.
#[derive(Debug, Serialize)]
pub(crate) struct VerifyCaptchaRequest {
    /// The solved code.
    pub kod: String,
    /// The image token from [`CaptchaChallenge`].
    pub token: String,
}

/// Response of POST `/api/u-captcha/sprawdz`.
#[derive(Debug, Clone, Deserialize)]
pub struct VerifyOutcome {
    /// Whether the solution was accepted.
    pub ok: bool,
    /// Verified search token, present when `ok` is `true`.
    #[serde(default)]
    pub token: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════
// Configuration endpoint
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub(crate) struct CountryDto {
    pub id: i64,
    pub nazwa: String,
    #[serde(default)]
    pub placowki: Vec<ConsulateDto>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ConsulateDto {
    pub id: i64,
    pub nazwa: String,
}

/// A country and its consulates, from the configuration endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    /// Upstream country id.
    pub id: i64,
    /// Display name.
    pub name: String,
    /// Consulates in this country.
    pub consulates: Vec<Consulate>,
}

/// A single consulate entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Consulate {
    /// Upstream consulate id.
    pub id: i64,
    /// Display name.
    pub name: String,
}

impl From<CountryDto> for Country {
    fn from(dto: CountryDto) -> Self {
        Self {
            id: dto.id,
            name: dto.nazwa,
            consulates: dto
                .placowki
                .into_iter()
                .map(|c| Consulate { id: c.id, name: c.nazwa })
                .collect(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Slot search
// ═══════════════════════════════════════════════════════════════════════

/// Body of POST `/api/rezerwacja-wizyt-wizowych/terminy/{location}/{amount}`.
#[derive(Debug, Serialize)]
pub(crate) struct CheckSlotsRequest {
    #[serde(rename = "captchaToken")]
    pub captcha_token: String,
}

/// Response of the slot-search endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct CheckSlotsResponse {
    /// Available dates, `YYYY-MM-DD`.
    #[serde(rename = "tabelaDni", default)]
    pub tabela_dni: Vec<String>,
    /// Fresh search token. Sometimes empty; callers fall back to the token
    /// they sent.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(rename = "idPlacowki", default)]
    pub id_placowki: Option<OpaqueId>,
    #[serde(rename = "rodzajUslugi", default)]
    pub rodzaj_uslugi: Option<OpaqueId>,
}

/// Upstream ids arrive as numbers or strings depending on the endpoint
/// version; the engine carries them opaquely either way.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OpaqueId {
    Num(i64),
    Str(String),
}

impl OpaqueId {
    pub(crate) fn into_string(self) -> String {
        match self {
            Self::Num(n) => n.to_string(),
            Self::Str(s) => s,
        }
    }
}

/// A candidate appointment slot.
///
/// The upstream returns dates only; time-of-day is cosmetic and typically
/// empty. Booking requires only the date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Slot {
    /// Date in `YYYY-MM-DD`.
    pub date: String,
    /// Optional time-of-day, usually absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl Slot {
    /// Slot for a bare date.
    #[must_use]
    pub fn new(date: impl Into<String>) -> Self {
        Self { date: date.into(), time: None }
    }
}

/// Full record returned by the slot-search endpoint.
///
/// `consulate_id` and `service_type` are carried opaquely for collaborators
/// that build the confirmation form URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckSlotsResult {
    /// Available slots, in upstream order.
    pub slots: Vec<Slot>,
    /// Search token from the response, `None` when the upstream omitted it.
    pub token: Option<String>,
    /// Consulate id echoed by the upstream.
    pub consulate_id: Option<String>,
    /// Service type echoed by the upstream.
    pub service_type: Option<String>,
    /// Location the search ran against.
    pub location_id: String,
}

// ═══════════════════════════════════════════════════════════════════════
// Reservation
// ═══════════════════════════════════════════════════════════════════════

/// Body of POST `/api/rezerwacja-wizyt-wizowych/rezerwacje`.
#[derive(Debug, Serialize)]
pub(crate) struct CreateReservationRequest {
    /// Slot date, `YYYY-MM-DD`.
    pub data: String,
    pub id_lokalizacji: String,
    pub id_wersji_jezykowej: u32,
    pub token: String,
    pub liczba_osob: u32,
    pub tylko_dzieci: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreateReservationResponse {
    #[serde(default)]
    pub bilet: Option<TicketDto>,
    #[serde(rename = "listaBiletow", default)]
    pub lista_biletow: Vec<TicketDto>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TicketDto {
    #[serde(rename = "ticketId", default)]
    pub ticket_id: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub time: Option<String>,
    #[serde(rename = "isChildApplication", default)]
    pub is_child_application: bool,
}

/// A confirmed reservation ticket.
///
/// Presence of a non-empty `ticket_id` in the upstream response is the only
/// success indicator the API offers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationTicket {
    /// Opaque server-issued ticket id.
    pub ticket_id: String,
    /// Reserved date.
    pub date: String,
    /// Reserved time, when the upstream assigns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    /// Whether this ticket is a child application.
    pub is_child_application: bool,
}

/// Outcome of a successful reservation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationResult {
    /// The primary ticket.
    pub primary_ticket: ReservationTicket,
    /// All tickets issued by the call (party size > 1 yields several).
    pub tickets: Vec<ReservationTicket>,
    /// Whether the application was flagged children-only.
    pub is_child_application: bool,
}
