//! Closed vocabularies of the workflow: request types, states, roles.
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, TimeZone, Utc};

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum RequestType {
    #[n(0)]
    Leave,
    #[n(1)]
    Permission,
    #[n(2)]
    Training,
    #[n(3)]
    DocumentRequest,
}

#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum WorkflowState {
    #[n(0)]
    Draft,
    #[n(1)]
    Submitted,
    #[n(2)]
    ValidationLevel1,
    #[n(3)]
    ValidationLevel2,
    #[n(4)]
    ValidationHR,
    #[n(5)]
    SignatureAuthority1,
    #[n(6)]
    SignatureAuthority2,
    #[n(7)]
    Archived,
    #[n(8)]
    Rejected,
}

/// Who is expected to act on an edge. The same role resolves to different
/// people depending on where the requester sits in the organisation.
#[derive(
    minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
pub enum Role {
    #[n(0)]
    Requester,
    #[n(1)]
    N1,
    #[n(2)]
    N2,
    #[n(3)]
    HumanResources,
    #[n(4)]
    GeneralDirector,
    #[n(5)]
    FinanceDirector,
    // acting role of privileged tooling, never carried by an edge
    #[n(6)]
    Administrator,
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
#[error("unknown {kind}: {value:?}")]
pub struct ParseError {
    kind: &'static str,
    value: String,
}

impl RequestType {
    pub const ALL: [RequestType; 4] = [
        RequestType::Leave,
        RequestType::Permission,
        RequestType::Training,
        RequestType::DocumentRequest,
    ];

    /// Single byte used in catalogue keys.
    pub fn code(self) -> u8 {
        match self {
            RequestType::Leave => 0,
            RequestType::Permission => 1,
            RequestType::Training => 2,
            RequestType::DocumentRequest => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RequestType::Leave => "Leave",
            RequestType::Permission => "Permission",
            RequestType::Training => "Training",
            RequestType::DocumentRequest => "DocumentRequest",
        }
    }
}

impl WorkflowState {
    pub const ALL: [WorkflowState; 9] = [
        WorkflowState::Draft,
        WorkflowState::Submitted,
        WorkflowState::ValidationLevel1,
        WorkflowState::ValidationLevel2,
        WorkflowState::ValidationHR,
        WorkflowState::SignatureAuthority1,
        WorkflowState::SignatureAuthority2,
        WorkflowState::Archived,
        WorkflowState::Rejected,
    ];

    pub fn code(self) -> u8 {
        match self {
            WorkflowState::Draft => 0,
            WorkflowState::Submitted => 1,
            WorkflowState::ValidationLevel1 => 2,
            WorkflowState::ValidationLevel2 => 3,
            WorkflowState::ValidationHR => 4,
            WorkflowState::SignatureAuthority1 => 5,
            WorkflowState::SignatureAuthority2 => 6,
            WorkflowState::Archived => 7,
            WorkflowState::Rejected => 8,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, WorkflowState::Archived | WorkflowState::Rejected)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            WorkflowState::Draft => "Draft",
            WorkflowState::Submitted => "Submitted",
            WorkflowState::ValidationLevel1 => "ValidationLevel1",
            WorkflowState::ValidationLevel2 => "ValidationLevel2",
            WorkflowState::ValidationHR => "ValidationHR",
            WorkflowState::SignatureAuthority1 => "SignatureAuthority1",
            WorkflowState::SignatureAuthority2 => "SignatureAuthority2",
            WorkflowState::Archived => "Archived",
            WorkflowState::Rejected => "Rejected",
        }
    }
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Requester => "Requester",
            Role::N1 => "N1",
            Role::N2 => "N2",
            Role::HumanResources => "HR",
            Role::GeneralDirector => "DG",
            Role::FinanceDirector => "DAF",
            Role::Administrator => "Administrator",
        }
    }
}

impl fmt::Display for RequestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RequestType::ALL
            .into_iter()
            .find(|t| t.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError {
                kind: "request type",
                value: s.to_string(),
            })
    }
}

impl FromStr for WorkflowState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WorkflowState::ALL
            .into_iter()
            .find(|st| st.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError {
                kind: "workflow state",
                value: s.to_string(),
            })
    }
}

impl FromStr for Role {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let role = match s.to_ascii_uppercase().as_str() {
            "REQUESTER" | "AGENT" => Role::Requester,
            "N1" => Role::N1,
            "N2" => Role::N2,
            "HR" | "DRH" => Role::HumanResources,
            "DG" => Role::GeneralDirector,
            "DAF" => Role::FinanceDirector,
            "ADMINISTRATOR" | "ADMIN" => Role::Administrator,
            _ => {
                return Err(ParseError {
                    kind: "role",
                    value: s.to_string(),
                });
            }
        };
        Ok(role)
    }
}

#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TimeStamp<T: TimeZone>(DateTime<T>);

impl PartialOrd for TimeStamp<Utc> {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeStamp<Utc> {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl TimeStamp<Utc> {
    pub fn new() -> Self {
        Self(Utc::now())
    }
    pub fn new_with(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
            .single()
            .unwrap_or_default()
            .into()
    }
    pub fn to_datetime_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

impl Default for TimeStamp<Utc> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: TimeZone> From<DateTime<T>> for TimeStamp<T> {
    fn from(value: DateTime<T>) -> Self {
        TimeStamp(value)
    }
}

impl fmt::Display for TimeStamp<Utc> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

impl<C> minicbor::Encode<C> for TimeStamp<Utc> {
    fn encode<W: minicbor::encode::Write>(
        &self,
        e: &mut minicbor::Encoder<W>,
        _: &mut C,
    ) -> Result<(), minicbor::encode::Error<W::Error>> {
        if let Some(nsec) = self.0.timestamp_nanos_opt() {
            return e.i64(nsec)?.ok();
        }

        Err(minicbor::encode::Error::message(
            "failed to encode timestamp. timestamp_nanos_opt returned None",
        ))
    }
}

impl<'b, C> minicbor::Decode<'b, C> for TimeStamp<Utc> {
    fn decode(d: &mut minicbor::Decoder<'b>, _: &mut C) -> Result<Self, minicbor::decode::Error> {
        let nsecs = d.i64()?;

        Ok(TimeStamp(DateTime::from_timestamp_nanos(nsecs)))
    }
}
