use chrono::{DateTime, Utc};

use crate::{errors::ConversionError, id::BusinessId};

/// A tenant. All ERP data (employees, customers, invoices, ...) is scoped to
/// exactly one business.
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct Business {
    pub id: BusinessId,
    pub name: BusinessName,
    #[serde(rename = "type")]
    pub kind: BusinessKind,
    pub address: Option<BusinessAddress>,
    pub currency: CurrencyCode,
    pub created_at: DateTime<Utc>,
}

/// Fields the user supplies to create a business, the backend assigns the rest
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone)]
pub struct BusinessDraft {
    pub name: BusinessName,
    #[serde(rename = "type")]
    pub kind: BusinessKind,
    pub address: Option<BusinessAddress>,
    pub currency: CurrencyCode,
}

#[derive(
    Debug,
    serde::Serialize,
    serde::Deserialize,
    Clone,
    Copy,
    PartialEq,
    Eq,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BusinessKind {
    Physical,
    Digital,
    Hybrid,
}

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct BusinessName(String);

#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct BusinessAddress(String);

/// ISO 4217 style code, eg. "USD"
#[derive(Debug, serde::Serialize, serde::Deserialize, Clone, PartialEq, Eq)]
pub struct CurrencyCode(String);

impl BusinessName {
    pub const MAX_LENGTH: usize = 60;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for BusinessName {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            return Err(ConversionError::Empty);
        }
        if value.len() > Self::MAX_LENGTH {
            return Err(ConversionError::MaxExceeded {
                max: Self::MAX_LENGTH,
                actual: value.len(),
            });
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for BusinessName {
    type Error = ConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.to_string().try_into()
    }
}

impl From<BusinessName> for String {
    fn from(value: BusinessName) -> Self {
        value.0
    }
}

impl std::fmt::Display for BusinessName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl BusinessAddress {
    pub const MAX_LENGTH: usize = 200;
}

impl TryFrom<String> for BusinessAddress {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() > Self::MAX_LENGTH {
            return Err(ConversionError::MaxExceeded {
                max: Self::MAX_LENGTH,
                actual: value.len(),
            });
        }
        Ok(Self(value))
    }
}

impl From<BusinessAddress> for String {
    fn from(value: BusinessAddress) -> Self {
        value.0
    }
}

impl CurrencyCode {
    pub const LENGTH: usize = 3;

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for CurrencyCode {
    type Error = ConversionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.len() != Self::LENGTH || !value.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(ConversionError::Invalid(format!(
                "expected {} uppercase ascii letters but got {value:?}",
                Self::LENGTH
            )));
        }
        Ok(Self(value))
    }
}

impl TryFrom<&str> for CurrencyCode {
    type Error = ConversionError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.to_string().try_into()
    }
}

impl From<CurrencyCode> for String {
    fn from(value: CurrencyCode) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case::empty("", ConversionError::Empty)]
    #[case::too_long("b".repeat(61), ConversionError::MaxExceeded{max:60, actual:61})]
    fn illegal_business_name(#[case] name: String, #[case] expect: ConversionError) {
        // Act
        let actual: Result<BusinessName, ConversionError> = name.try_into();

        // Assert
        assert_eq!(actual.unwrap_err(), expect);
    }

    #[rstest]
    #[case::too_long("b".repeat(201), ConversionError::MaxExceeded{max:200, actual:201})]
    fn illegal_business_address(#[case] address: String, #[case] expect: ConversionError) {
        // Act
        let actual: Result<BusinessAddress, ConversionError> = address.try_into();

        // Assert
        assert_eq!(actual.unwrap_err(), expect);
    }

    #[rstest]
    #[case::lowercase("usd")]
    #[case::too_short("US")]
    #[case::too_long("USDT")]
    #[case::empty("")]
    fn illegal_currency_code(#[case] code: &str) {
        let actual: Result<CurrencyCode, ConversionError> = code.try_into();
        assert!(actual.is_err(), "{code:?} should have been rejected");
    }

    #[test]
    fn business_kind_wire_format_is_snake_case() {
        assert_eq!(
            serde_json::to_string(&BusinessKind::Physical).unwrap(),
            "\"physical\""
        );
        assert_eq!(BusinessKind::Hybrid.to_string(), "hybrid");
    }
}
