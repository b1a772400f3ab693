//! Time-ordered identifiers rendered as bech32m strings.
use std::fmt;
use std::str::FromStr;

use bech32::{Bech32m, Hrp};
use uuid7::{Uuid, uuid7};

#[derive(thiserror::Error, Debug)]
pub enum IdError {
    #[error("invalid bech32 identifier: {0}")]
    Bech32(#[from] bech32::DecodeError),
    #[error("expected prefix '{expected}', found '{found}'")]
    Prefix { expected: &'static str, found: String },
    #[error("identifier payload must be 16 bytes, found {0}")]
    Length(usize),
}

macro_rules! bech32_id {
    ($(#[$meta:meta])* $name:ident, $hrp:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Uuid);

        impl $name {
            pub const PREFIX: &'static str = $hrp;

            pub fn new() -> Self {
                Self(uuid7())
            }

            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }

            pub fn from_bytes(bytes: [u8; 16]) -> Self {
                Self(Uuid::from(bytes))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let hrp = Hrp::parse($hrp).map_err(|_| fmt::Error)?;
                let encoded =
                    bech32::encode::<Bech32m>(hrp, self.0.as_bytes()).map_err(|_| fmt::Error)?;
                f.write_str(&encoded)
            }
        }

        impl FromStr for $name {
            type Err = IdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let (hrp, data) = bech32::decode(s)?;
                if hrp.as_str() != $hrp {
                    return Err(IdError::Prefix {
                        expected: $hrp,
                        found: hrp.to_string(),
                    });
                }
                let bytes: [u8; 16] = data
                    .as_slice()
                    .try_into()
                    .map_err(|_| IdError::Length(data.len()))?;
                Ok(Self::from_bytes(bytes))
            }
        }

        impl<C> minicbor::Encode<C> for $name {
            fn encode<W: minicbor::encode::Write>(
                &self,
                e: &mut minicbor::Encoder<W>,
                _: &mut C,
            ) -> Result<(), minicbor::encode::Error<W::Error>> {
                e.bytes(self.0.as_bytes())?.ok()
            }
        }

        impl<'b, C> minicbor::Decode<'b, C> for $name {
            fn decode(
                d: &mut minicbor::Decoder<'b>,
                _: &mut C,
            ) -> Result<Self, minicbor::decode::Error> {
                let bytes: [u8; 16] = d
                    .bytes()?
                    .try_into()
                    .map_err(|_| minicbor::decode::Error::message("identifier must be 16 bytes"))?;
                Ok(Self::from_bytes(bytes))
            }
        }
    };
}

bech32_id!(
    /// Identifies an administrative request.
    RequestId,
    "req"
);
bech32_id!(
    /// Identifies a person, as known to the organisational directory.
    UserId,
    "user"
);
bech32_id!(AuditId, "audit");
