//! Shared types exchanged between the e-Boekhouden client crate and the
//! sync engine.
//!
//! Everything here is plain data: upstream records are read-only once
//! fetched, and amounts are integer cents (see [`money::MoneyCents`]).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub use money::MoneyCents;
pub use mutation::{Mutation, MutationKind, MutationLine};

pub mod money {
    use std::{
        fmt,
        iter::Sum,
        ops::{Add, AddAssign, Neg, Sub, SubAssign},
        str::FromStr,
    };

    use serde::{Deserialize, Deserializer, Serialize, Serializer, de};

    /// Signed money amount represented as **integer cents**.
    ///
    /// Use this type for **all** monetary values to avoid floating-point
    /// drift. Upstream JSON carries decimal amounts; they are rounded to
    /// the nearest cent on ingestion, matching what the bookkeeping
    /// service itself stores.
    ///
    /// The value is signed:
    /// - positive = money in / debit-increasing
    /// - negative = money out / credit-increasing
    ///
    /// # Examples
    ///
    /// ```rust
    /// use api_types::MoneyCents;
    ///
    /// let amount = MoneyCents::new(12_34);
    /// assert_eq!(amount.cents(), 1234);
    /// assert_eq!(amount.to_string(), "12.34€");
    /// ```
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
    #[repr(transparent)]
    pub struct MoneyCents(i64);

    impl MoneyCents {
        pub const ZERO: MoneyCents = MoneyCents(0);

        /// Creates a new amount from integer cents.
        #[must_use]
        pub const fn new(cents: i64) -> Self {
            Self(cents)
        }

        /// Converts a decimal major-unit value (e.g. `123.45`) to cents,
        /// rounding to the nearest cent.
        ///
        /// Returns `None` for non-finite values or values outside the
        /// `i64` cent range.
        #[must_use]
        pub fn from_major_f64(value: f64) -> Option<Self> {
            if !value.is_finite() {
                return None;
            }
            let cents = (value * 100.0).round();
            if cents < i64::MIN as f64 || cents > i64::MAX as f64 {
                return None;
            }
            Some(Self(cents as i64))
        }

        /// Returns the raw value in cents.
        #[must_use]
        pub const fn cents(self) -> i64 {
            self.0
        }

        /// Returns the value in major units for display/wire purposes.
        #[must_use]
        pub fn to_major_f64(self) -> f64 {
            self.0 as f64 / 100.0
        }

        /// Returns `true` if the amount is 0.
        #[must_use]
        pub const fn is_zero(self) -> bool {
            self.0 == 0
        }

        /// Returns `true` if the amount is positive.
        #[must_use]
        pub const fn is_positive(self) -> bool {
            self.0 > 0
        }

        /// Returns `true` if the amount is negative.
        #[must_use]
        pub const fn is_negative(self) -> bool {
            self.0 < 0
        }

        /// Absolute value.
        #[must_use]
        pub const fn abs(self) -> Self {
            Self(self.0.abs())
        }

        /// Checked addition (returns `None` on overflow).
        #[must_use]
        pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
            self.0.checked_add(rhs.0).map(MoneyCents)
        }

        /// Checked subtraction (returns `None` on overflow).
        #[must_use]
        pub fn checked_sub(self, rhs: MoneyCents) -> Option<MoneyCents> {
            self.0.checked_sub(rhs.0).map(MoneyCents)
        }
    }

    impl fmt::Display for MoneyCents {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let sign = if self.0 < 0 { "-" } else { "" };
            let abs = self.0.unsigned_abs();
            let euros = abs / 100;
            let cents = abs % 100;
            write!(f, "{sign}{euros}.{cents:02}€")
        }
    }

    impl From<i64> for MoneyCents {
        fn from(value: i64) -> Self {
            Self(value)
        }
    }

    impl From<MoneyCents> for i64 {
        fn from(value: MoneyCents) -> Self {
            value.0
        }
    }

    impl Add for MoneyCents {
        type Output = MoneyCents;

        fn add(self, rhs: MoneyCents) -> Self::Output {
            MoneyCents(self.0 + rhs.0)
        }
    }

    impl AddAssign for MoneyCents {
        fn add_assign(&mut self, rhs: MoneyCents) {
            self.0 += rhs.0;
        }
    }

    impl Sub for MoneyCents {
        type Output = MoneyCents;

        fn sub(self, rhs: MoneyCents) -> Self::Output {
            MoneyCents(self.0 - rhs.0)
        }
    }

    impl SubAssign for MoneyCents {
        fn sub_assign(&mut self, rhs: MoneyCents) {
            self.0 -= rhs.0;
        }
    }

    impl Neg for MoneyCents {
        type Output = MoneyCents;

        fn neg(self) -> Self::Output {
            MoneyCents(-self.0)
        }
    }

    impl Sum for MoneyCents {
        fn sum<I: Iterator<Item = MoneyCents>>(iter: I) -> Self {
            MoneyCents(iter.map(|m| m.0).sum())
        }
    }

    /// On the wire amounts are decimal major units; internally they are
    /// integer cents.
    impl Serialize for MoneyCents {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            serializer.serialize_f64(self.to_major_f64())
        }
    }

    impl<'de> Deserialize<'de> for MoneyCents {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            struct Visitor;

            impl de::Visitor<'_> for Visitor {
                type Value = MoneyCents;

                fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str("a decimal amount")
                }

                fn visit_i64<E: de::Error>(self, v: i64) -> Result<MoneyCents, E> {
                    v.checked_mul(100)
                        .map(MoneyCents)
                        .ok_or_else(|| E::custom("amount too large"))
                }

                fn visit_u64<E: de::Error>(self, v: u64) -> Result<MoneyCents, E> {
                    i64::try_from(v)
                        .ok()
                        .and_then(|v| v.checked_mul(100))
                        .map(MoneyCents)
                        .ok_or_else(|| E::custom("amount too large"))
                }

                fn visit_f64<E: de::Error>(self, v: f64) -> Result<MoneyCents, E> {
                    MoneyCents::from_major_f64(v).ok_or_else(|| E::custom("invalid amount"))
                }
            }

            deserializer.deserialize_any(Visitor)
        }
    }

    impl FromStr for MoneyCents {
        type Err = ParseAmountError;

        /// Parses a decimal string into cents.
        ///
        /// Accepts `.` or `,` as decimal separator and an optional leading
        /// `+`/`-`. Rejects more than 2 fractional digits.
        fn from_str(s: &str) -> Result<Self, Self::Err> {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                return Err(ParseAmountError::Empty);
            }

            let (sign, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
                (-1i64, stripped)
            } else if let Some(stripped) = trimmed.strip_prefix('+') {
                (1i64, stripped)
            } else {
                (1i64, trimmed)
            };

            let rest = rest.trim();
            if rest.is_empty() {
                return Err(ParseAmountError::Empty);
            }

            let rest = rest.replace(',', ".");
            let mut parts = rest.split('.');
            let euros_str = parts.next().ok_or(ParseAmountError::Invalid)?;
            let cents_str = parts.next();

            if parts.next().is_some() {
                return Err(ParseAmountError::Invalid);
            }

            if euros_str.is_empty() || !euros_str.chars().all(|c| c.is_ascii_digit()) {
                return Err(ParseAmountError::Invalid);
            }

            let euros: i64 = euros_str.parse().map_err(|_| ParseAmountError::Invalid)?;

            let cents: i64 = match cents_str {
                None | Some("") => 0,
                Some(frac) => {
                    if !frac.chars().all(|c| c.is_ascii_digit()) {
                        return Err(ParseAmountError::Invalid);
                    }
                    match frac.len() {
                        1 => frac.parse::<i64>().map_err(|_| ParseAmountError::Invalid)? * 10,
                        2 => frac.parse::<i64>().map_err(|_| ParseAmountError::Invalid)?,
                        _ => return Err(ParseAmountError::TooManyDecimals),
                    }
                }
            };

            let total = euros
                .checked_mul(100)
                .and_then(|v| v.checked_add(cents))
                .ok_or(ParseAmountError::Overflow)?;

            let signed = if sign < 0 {
                total.checked_neg().ok_or(ParseAmountError::Overflow)?
            } else {
                total
            };

            Ok(MoneyCents(signed))
        }
    }

    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub enum ParseAmountError {
        Empty,
        Invalid,
        TooManyDecimals,
        Overflow,
    }

    impl fmt::Display for ParseAmountError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            let msg = match self {
                Self::Empty => "empty amount",
                Self::Invalid => "invalid amount",
                Self::TooManyDecimals => "too many decimals",
                Self::Overflow => "amount too large",
            };
            f.write_str(msg)
        }
    }

    impl std::error::Error for ParseAmountError {}

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn display_formats_eur() {
            assert_eq!(MoneyCents::new(0).to_string(), "0.00€");
            assert_eq!(MoneyCents::new(1).to_string(), "0.01€");
            assert_eq!(MoneyCents::new(1050).to_string(), "10.50€");
            assert_eq!(MoneyCents::new(-1050).to_string(), "-10.50€");
        }

        #[test]
        fn parse_accepts_dot_or_comma() {
            assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
            assert_eq!("10.5".parse::<MoneyCents>().unwrap().cents(), 1050);
            assert_eq!("10,50".parse::<MoneyCents>().unwrap().cents(), 1050);
            assert_eq!("-0.01".parse::<MoneyCents>().unwrap().cents(), -1);
        }

        #[test]
        fn parse_rejects_more_than_two_decimals() {
            assert!("12.345".parse::<MoneyCents>().is_err());
        }

        #[test]
        fn from_major_rounds_to_nearest_cent() {
            assert_eq!(MoneyCents::from_major_f64(123.45).unwrap().cents(), 12345);
            assert_eq!(MoneyCents::from_major_f64(-0.005).unwrap().cents(), 0);
            assert!(MoneyCents::from_major_f64(f64::NAN).is_none());
        }

        #[test]
        fn deserializes_from_json_number() {
            let m: MoneyCents = serde_json::from_str("123.45").unwrap();
            assert_eq!(m.cents(), 12345);
            let m: MoneyCents = serde_json::from_str("7").unwrap();
            assert_eq!(m.cents(), 700);
        }
    }
}

pub mod mutation {
    use super::*;

    /// Upstream mutation type codes.
    ///
    /// The bookkeeping service tags every mutation with a small integer;
    /// the engine dispatches processors on this code.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
    #[serde(rename_all = "snake_case")]
    pub enum MutationKind {
        OpeningBalance,
        PurchaseInvoice,
        SalesInvoice,
        CustomerPayment,
        SupplierPayment,
        MoneyReceived,
        MoneySpent,
        Memorial,
    }

    impl MutationKind {
        /// Maps an upstream type code onto a kind. Unknown codes yield
        /// `None`; callers treat that as a validation failure, not a panic.
        #[must_use]
        pub fn from_code(code: i32) -> Option<Self> {
            match code {
                0 => Some(Self::OpeningBalance),
                1 => Some(Self::PurchaseInvoice),
                2 => Some(Self::SalesInvoice),
                3 => Some(Self::CustomerPayment),
                4 => Some(Self::SupplierPayment),
                5 => Some(Self::MoneyReceived),
                6 => Some(Self::MoneySpent),
                7 => Some(Self::Memorial),
                _ => None,
            }
        }

        #[must_use]
        pub fn code(self) -> i32 {
            match self {
                Self::OpeningBalance => 0,
                Self::PurchaseInvoice => 1,
                Self::SalesInvoice => 2,
                Self::CustomerPayment => 3,
                Self::SupplierPayment => 4,
                Self::MoneyReceived => 5,
                Self::MoneySpent => 6,
                Self::Memorial => 7,
            }
        }

        pub fn as_str(self) -> &'static str {
            match self {
                Self::OpeningBalance => "opening_balance",
                Self::PurchaseInvoice => "purchase_invoice",
                Self::SalesInvoice => "sales_invoice",
                Self::CustomerPayment => "customer_payment",
                Self::SupplierPayment => "supplier_payment",
                Self::MoneyReceived => "money_received",
                Self::MoneySpent => "money_spent",
                Self::Memorial => "memorial",
            }
        }

        /// `true` for the kinds where money flows towards us (customer
        /// side); `false` for the supplier side. Only meaningful for
        /// invoice/payment kinds.
        #[must_use]
        pub fn is_money_in(self) -> bool {
            matches!(
                self,
                Self::SalesInvoice | Self::CustomerPayment | Self::MoneyReceived
            )
        }
    }

    /// One ledger line of a mutation.
    ///
    /// The modern protocol references ledgers by numeric id, the legacy
    /// protocol by account code; a line carries whichever the protocol
    /// supplied.
    #[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
    pub struct MutationLine {
        #[serde(rename = "ledgerId", default)]
        pub ledger_id: Option<i64>,
        #[serde(rename = "ledgerCode", default)]
        pub ledger_code: Option<String>,
        #[serde(default)]
        pub amount: MoneyCents,
        #[serde(default)]
        pub description: Option<String>,
    }

    /// One external transaction record. Read-only once fetched.
    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    pub struct Mutation {
        pub id: i64,
        /// Raw upstream type code; see [`MutationKind::from_code`].
        #[serde(rename = "type", default)]
        pub type_code: i32,
        #[serde(default, deserialize_with = "de_opt_date")]
        pub date: Option<NaiveDate>,
        #[serde(default)]
        pub amount: MoneyCents,
        /// Opening-balance mutations carry the balance separately.
        #[serde(default)]
        pub balance: Option<MoneyCents>,
        #[serde(default)]
        pub description: Option<String>,
        #[serde(rename = "invoiceNumber", default)]
        pub invoice_number: Option<String>,
        #[serde(rename = "relationId", default, deserialize_with = "de_opt_code")]
        pub relation_code: Option<String>,
        #[serde(rename = "ledgerId", default)]
        pub ledger_id: Option<i64>,
        #[serde(rename = "ledgerCode", default)]
        pub ledger_code: Option<String>,
        #[serde(default)]
        pub rows: Vec<MutationLine>,
    }

    impl Mutation {
        #[must_use]
        pub fn kind(&self) -> Option<MutationKind> {
            MutationKind::from_code(self.type_code)
        }
    }

    /// Dates arrive as `YYYY-MM-DD` or as a full timestamp; only the day
    /// part matters for posting.
    fn de_opt_date<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.is_empty() => Ok(None),
            Some(s) => {
                let day = if s.len() > 10 { &s[..10] } else { s.as_str() };
                NaiveDate::parse_from_str(day, "%Y-%m-%d")
                    .map(Some)
                    .map_err(serde::de::Error::custom)
            }
        }
    }

    /// Relation codes are numbers on the modern protocol and strings on
    /// the legacy one; normalize to a string key.
    fn de_opt_code<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: Option<serde_json::Value> = Option::deserialize(deserializer)?;
        Ok(match raw {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            Some(serde_json::Value::String(s)) if s.is_empty() => None,
            Some(serde_json::Value::String(s)) => Some(s),
            Some(other) => Some(other.to_string()),
        })
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn parses_rest_mutation_json() {
            let raw = r#"{
                "id": 1234,
                "type": 2,
                "date": "2023-05-17",
                "amount": 121.00,
                "description": "Contributie mei",
                "invoiceNumber": "2023-051",
                "relationId": 40012,
                "ledgerId": 9,
                "rows": [{"ledgerId": 45, "amount": 100.00, "description": "Contributie"},
                         {"ledgerId": 46, "amount": 21.00, "description": "BTW"}]
            }"#;
            let m: Mutation = serde_json::from_str(raw).unwrap();
            assert_eq!(m.id, 1234);
            assert_eq!(m.kind(), Some(MutationKind::SalesInvoice));
            assert_eq!(m.amount.cents(), 12100);
            assert_eq!(m.relation_code.as_deref(), Some("40012"));
            assert_eq!(m.rows.len(), 2);
            assert_eq!(m.rows[0].amount.cents(), 10000);
        }

        #[test]
        fn unknown_type_code_has_no_kind() {
            let m = Mutation {
                id: 1,
                type_code: 42,
                date: None,
                amount: MoneyCents::ZERO,
                balance: None,
                description: None,
                invoice_number: None,
                relation_code: None,
                ledger_id: None,
                ledger_code: None,
                rows: Vec::new(),
            };
            assert!(m.kind().is_none());
        }

        #[test]
        fn timestamp_dates_truncate_to_day() {
            let raw = r#"{"id": 1, "type": 7, "date": "2024-02-29T00:00:00"}"#;
            let m: Mutation = serde_json::from_str(raw).unwrap();
            assert_eq!(m.date, Some(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()));
        }
    }
}

pub mod ledger {
    use super::*;

    /// One row of the upstream chart of accounts.
    #[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
    pub struct LedgerAccount {
        pub id: i64,
        pub code: String,
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub category: Option<String>,
        #[serde(default)]
        pub group: Option<String>,
    }
}

pub mod relation {
    use super::*;

    /// An upstream counterparty record (customer or supplier side is
    /// decided per mutation, not per relation).
    #[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct Relation {
        #[serde(deserialize_with = "de_code", default)]
        pub id: String,
        #[serde(default)]
        pub name: Option<String>,
        #[serde(rename = "companyName", default)]
        pub company_name: Option<String>,
        #[serde(rename = "contactName", default)]
        pub contact_name: Option<String>,
        #[serde(default)]
        pub email: Option<String>,
        #[serde(default)]
        pub city: Option<String>,
    }

    impl Relation {
        /// Best display name available, in upstream preference order.
        /// Returns `None` when the record carries no usable name at all.
        #[must_use]
        pub fn display_name(&self) -> Option<&str> {
            [&self.company_name, &self.name, &self.contact_name]
                .into_iter()
                .flatten()
                .map(String::as_str)
                .find(|s| !s.trim().is_empty())
        }
    }

    fn de_code<'de, D>(deserializer: D) -> Result<String, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw: serde_json::Value = serde::Deserialize::deserialize(deserializer)?;
        match raw {
            serde_json::Value::Number(n) => Ok(n.to_string()),
            serde_json::Value::String(s) => Ok(s),
            other => Err(serde::de::Error::custom(format!(
                "invalid relation id: {other}"
            ))),
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn display_name_prefers_company() {
            let r = Relation {
                id: "1".into(),
                name: Some("J. Jansen".into()),
                company_name: Some("Jansen BV".into()),
                ..Relation::default()
            };
            assert_eq!(r.display_name(), Some("Jansen BV"));
        }

        #[test]
        fn display_name_none_when_blank() {
            let r = Relation {
                id: "1".into(),
                name: Some("  ".into()),
                ..Relation::default()
            };
            assert_eq!(r.display_name(), None);
        }
    }
}

/// Inclusive date-range filter forwarded to the modern protocol.
///
/// An omitted bound means "unbounded" (all history).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    #[must_use]
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.is_none_or(|from| date >= from) && self.to.is_none_or(|to| date <= to)
    }
}

/// One page of an upstream collection.
///
/// `truncated` is set by the legacy protocol when the server-side record
/// cap was hit; callers must warn instead of assuming completeness.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    #[serde(default)]
    pub truncated: bool,
}

impl<T> Page<T> {
    #[must_use]
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            truncated: false,
        }
    }

    #[must_use]
    pub fn truncated(items: Vec<T>) -> Self {
        Self {
            items,
            truncated: true,
        }
    }
}
