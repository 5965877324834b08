//! # Invoice Links
//!
//! A payable invoice is fully determined by a URL query-parameter set —
//! no server round trip beyond the ledger mapping lookup:
//!
//! ```text
//! https://pay.veil.cash/i?merchant=veil1…&amount=1000000&salt=…field
//!     [&token=wusd][&type=multi][&memo=…]
//! ```
//!
//! `merchant` and `salt` are required. `amount` defaults to zero (open
//! donations), `token` to the primary asset, `type` to a standard
//! invoice. Unknown parameters are ignored for forward compatibility;
//! known parameters with bad values are hard errors.

use ark_bn254::Fr;
use thiserror::Error;
use url::Url;

use crate::crypto::hash::{field_from_literal, field_to_literal, FieldCodecError};
use crate::invoice::types::{validate_address, AssetKind, InvoiceKind, InvoiceStateError};

/// Default link host+path used when the merchant does not supply one.
pub const DEFAULT_LINK_BASE: &str = "https://pay.veil.cash/i";

/// Errors from parsing or building an invoice link.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The link is not a parseable URL.
    #[error("invalid link URL: {0}")]
    Url(#[from] url::ParseError),

    /// A required query parameter is absent.
    #[error("link is missing required parameter {0:?}")]
    MissingParam(String),

    /// The amount parameter is not a decimal u64.
    #[error("invalid amount parameter {0:?}")]
    InvalidAmount(String),

    /// The salt parameter is not a field literal.
    #[error("invalid salt parameter: {0}")]
    Salt(#[from] FieldCodecError),

    /// The merchant address or a token failed validation.
    #[error(transparent)]
    Invalid(#[from] InvoiceStateError),
}

/// The decoded parameter set of an invoice link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvoiceLink {
    /// Merchant's ledger address.
    pub merchant: String,
    /// Requested amount in smallest units; zero for open donations.
    pub amount: u64,
    /// Invoice salt.
    pub salt: Fr,
    /// Asset the invoice denominates.
    pub asset: AssetKind,
    /// Invoice kind.
    pub kind: InvoiceKind,
    /// Display memo.
    pub memo: Option<String>,
}

impl InvoiceLink {
    /// Parse an invoice link from its URL form.
    pub fn parse(link: &str) -> Result<Self, LinkError> {
        let url = Url::parse(link)?;

        let mut merchant: Option<String> = None;
        let mut amount: u64 = 0;
        let mut salt: Option<Fr> = None;
        let mut asset = AssetKind::Primary;
        let mut kind = InvoiceKind::Standard;
        let mut memo: Option<String> = None;

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "merchant" => {
                    validate_address(&value)?;
                    merchant = Some(value.into_owned());
                }
                "amount" => {
                    amount = value
                        .parse::<u64>()
                        .map_err(|_| LinkError::InvalidAmount(value.clone().into_owned()))?;
                }
                "salt" => salt = Some(field_from_literal(&value)?),
                "token" => asset = AssetKind::from_wire_token(&value)?,
                "type" => kind = InvoiceKind::from_wire_token(&value)?,
                "memo" => {
                    if !value.is_empty() {
                        memo = Some(value.into_owned());
                    }
                }
                // Forward compatibility: unknown params pass through.
                _ => {}
            }
        }

        Ok(Self {
            merchant: merchant.ok_or_else(|| LinkError::MissingParam("merchant".into()))?,
            amount,
            salt: salt.ok_or_else(|| LinkError::MissingParam("salt".into()))?,
            asset,
            kind,
            memo,
        })
    }

    /// Render the link onto a base URL. Defaulted parameters are omitted
    /// so the link stays short; [`parse`](Self::parse) restores them.
    pub fn to_url(&self, base: &str) -> Result<String, LinkError> {
        let mut url = Url::parse(base)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("merchant", &self.merchant);
            pairs.append_pair("amount", &self.amount.to_string());
            pairs.append_pair("salt", &field_to_literal(&self.salt));
            if self.asset != AssetKind::Primary {
                pairs.append_pair("token", self.asset.wire_token());
            }
            if self.kind != InvoiceKind::Standard {
                pairs.append_pair("type", self.kind.wire_token());
            }
            if let Some(memo) = &self.memo {
                pairs.append_pair("memo", memo);
            }
        }
        Ok(url.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bech32::{Bech32, Hrp};

    fn test_address(seed: u8) -> String {
        let hrp = Hrp::parse(crate::config::ADDRESS_HRP).unwrap();
        bech32::encode::<Bech32>(hrp, &[seed; 32]).unwrap()
    }

    fn sample_link() -> InvoiceLink {
        InvoiceLink {
            merchant: test_address(1),
            amount: 1_000_000,
            salt: Fr::from(42u64),
            asset: AssetKind::WrappedStable,
            kind: InvoiceKind::MultiPay,
            memo: Some("table 4 — two espressos".into()),
        }
    }

    #[test]
    fn round_trip_preserves_every_parameter() {
        let link = sample_link();
        let url = link.to_url(DEFAULT_LINK_BASE).unwrap();
        assert_eq!(InvoiceLink::parse(&url).unwrap(), link);
    }

    #[test]
    fn defaults_are_omitted_and_restored() {
        let link = InvoiceLink {
            merchant: test_address(2),
            amount: 500,
            salt: Fr::from(7u64),
            asset: AssetKind::Primary,
            kind: InvoiceKind::Standard,
            memo: None,
        };
        let url = link.to_url(DEFAULT_LINK_BASE).unwrap();
        assert!(!url.contains("token="));
        assert!(!url.contains("type="));
        assert!(!url.contains("memo="));

        let parsed = InvoiceLink::parse(&url).unwrap();
        assert_eq!(parsed, link);
    }

    #[test]
    fn memo_survives_percent_encoding() {
        let link = sample_link();
        let url = link.to_url(DEFAULT_LINK_BASE).unwrap();
        let parsed = InvoiceLink::parse(&url).unwrap();
        assert_eq!(parsed.memo.as_deref(), Some("table 4 — two espressos"));
    }

    #[test]
    fn missing_merchant_rejected() {
        let salt = field_to_literal(&Fr::from(1u64));
        let url = format!("{DEFAULT_LINK_BASE}?amount=5&salt={salt}");
        assert!(matches!(
            InvoiceLink::parse(&url),
            Err(LinkError::MissingParam(p)) if p == "merchant"
        ));
    }

    #[test]
    fn missing_salt_rejected() {
        let url = format!("{DEFAULT_LINK_BASE}?merchant={}&amount=5", test_address(3));
        assert!(matches!(
            InvoiceLink::parse(&url),
            Err(LinkError::MissingParam(p)) if p == "salt"
        ));
    }

    #[test]
    fn bad_amount_rejected() {
        let url = format!(
            "{DEFAULT_LINK_BASE}?merchant={}&amount=lots&salt={}",
            test_address(3),
            field_to_literal(&Fr::from(1u64))
        );
        assert!(matches!(InvoiceLink::parse(&url), Err(LinkError::InvalidAmount(_))));
    }

    #[test]
    fn invalid_merchant_address_rejected() {
        let url = format!(
            "{DEFAULT_LINK_BASE}?merchant=veil1bogus&amount=5&salt={}",
            field_to_literal(&Fr::from(1u64))
        );
        assert!(matches!(InvoiceLink::parse(&url), Err(LinkError::Invalid(_))));
    }

    #[test]
    fn unknown_parameters_are_ignored() {
        let link = sample_link();
        let url = format!("{}&utm_source=receipt", link.to_url(DEFAULT_LINK_BASE).unwrap());
        assert_eq!(InvoiceLink::parse(&url).unwrap(), link);
    }
}
