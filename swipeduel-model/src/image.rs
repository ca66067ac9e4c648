use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::{
    error::{ModelError, Result},
    gender::Gender,
    ids::{ImageId, UserId},
};

/// Ordered batch of records fetched and preloaded as one unit.
pub type Block = Vec<ImageRecord>;

/// Win/loss counters accumulated by the backend for one image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct BattleStats {
    pub battles: u32,
    pub wins: u32,
    pub losses: u32,
    pub draws: u32,
}

impl BattleStats {
    /// Fraction of battles won, `None` before the first battle.
    pub fn win_rate(&self) -> Option<f64> {
        (self.battles > 0).then(|| f64::from(self.wins) / f64::from(self.battles))
    }
}

/// Glicko-2 rating snapshot as reported by the backend.
///
/// The client never recomputes these values; they are carried for display.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default, rename_all = "camelCase"))]
pub struct RatingState {
    pub rating: f64,
    pub rd: f64,
    pub volatility: f64,
    pub mu: f64,
    pub phi: f64,
    pub version: u32,
    pub last_update: Option<DateTime<Utc>>,
}

impl Default for RatingState {
    fn default() -> Self {
        Self {
            rating: 1500.0,
            rd: 350.0,
            volatility: 0.06,
            mu: 0.0,
            phi: 350.0 / 173.7178,
            version: 0,
            last_update: None,
        }
    }
}

/// Moderation lifecycle reported alongside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum ImageStatus {
    Active,
    Pending,
    Rejected,
    Removed,
    #[cfg_attr(feature = "serde", serde(other))]
    Unknown,
}

/// Immutable backend snapshot of a rateable image.
///
/// Records are replaced wholesale on refetch and never mutated client-side.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "camelCase"))]
pub struct ImageRecord {
    #[cfg_attr(feature = "serde", serde(alias = "_id"))]
    pub id: ImageId,
    #[cfg_attr(feature = "serde", serde(rename = "userId"))]
    pub owner_id: UserId,
    pub url: String,
    pub gender: Gender,
    #[cfg_attr(
        feature = "serde",
        serde(default, with = "flexible_date")
    )]
    pub birth_date: Option<NaiveDate>,
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub stats: BattleStats,
    #[cfg_attr(feature = "serde", serde(default, rename = "glicko"))]
    pub rating: RatingState,
    #[cfg_attr(feature = "serde", serde(default))]
    pub in_pool: bool,
    #[cfg_attr(
        feature = "serde",
        serde(default, skip_serializing_if = "Option::is_none")
    )]
    pub status: Option<ImageStatus>,
}

impl ImageRecord {
    /// Minimal record with default statistics, mostly useful for fixtures.
    pub fn new(
        id: impl Into<String>,
        owner_id: impl Into<String>,
        url: impl Into<String>,
        gender: Gender,
    ) -> Self {
        Self {
            id: ImageId::new(id),
            owner_id: UserId::new(owner_id),
            url: url.into(),
            gender,
            birth_date: None,
            stats: BattleStats::default(),
            rating: RatingState::default(),
            in_pool: true,
            status: None,
        }
    }

    /// Whole years elapsed between the birth date and `today`.
    pub fn age_on(&self, today: NaiveDate) -> Option<u32> {
        let born = self.birth_date?;
        let mut years = today.year() - born.year();
        if (today.month(), today.day()) < (born.month(), born.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }
}

/// Two records shown together for one comparison.
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePair {
    pub first: ImageRecord,
    pub second: ImageRecord,
}

impl ImagePair {
    pub fn new(first: ImageRecord, second: ImageRecord) -> Self {
        Self { first, second }
    }

    /// Build a pair from the two records starting at `index`.
    pub fn from_slice(records: &[ImageRecord], index: usize) -> Option<Self> {
        let first = records.get(index)?;
        let second = records.get(index + 1)?;
        Some(Self::new(first.clone(), second.clone()))
    }

    pub fn urls(&self) -> [&str; 2] {
        [self.first.url.as_str(), self.second.url.as_str()]
    }

    pub fn ids(&self) -> [&ImageId; 2] {
        [&self.first.id, &self.second.id]
    }
}

/// Parse either a calendar date (`1994-03-02`) or an RFC 3339 timestamp.
pub fn parse_flexible_date(raw: &str) -> Result<NaiveDate> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date);
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.date_naive())
        .map_err(|_| ModelError::InvalidDate(raw.to_string()))
}

#[cfg(feature = "serde")]
mod flexible_date {
    use chrono::NaiveDate;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &Option<NaiveDate>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(date) => serializer
                .serialize_str(&date.format("%Y-%m-%d").to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<NaiveDate>, D::Error> {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        raw.filter(|s| !s.trim().is_empty())
            .map(|s| {
                super::parse_flexible_date(&s)
                    .map_err(serde::de::Error::custom)
            })
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn age_accounts_for_birthday_not_yet_reached() {
        let mut record = ImageRecord::new("a", "u", "https://x/a.jpg", Gender::Male);
        record.birth_date = NaiveDate::from_ymd_opt(2000, 6, 15);

        let before = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let after = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(record.age_on(before), Some(23));
        assert_eq!(record.age_on(after), Some(24));
    }

    #[test]
    fn flexible_date_accepts_date_and_timestamp() {
        let expected = NaiveDate::from_ymd_opt(1994, 3, 2).unwrap();
        assert_eq!(parse_flexible_date("1994-03-02"), Ok(expected));
        assert_eq!(
            parse_flexible_date("1994-03-02T00:00:00.000Z"),
            Ok(expected)
        );
        assert!(parse_flexible_date("yesterday").is_err());
    }

    #[test]
    fn pair_from_slice_requires_two_records() {
        let records = vec![
            ImageRecord::new("a", "u1", "https://x/a.jpg", Gender::Female),
            ImageRecord::new("b", "u2", "https://x/b.jpg", Gender::Female),
            ImageRecord::new("c", "u3", "https://x/c.jpg", Gender::Female),
        ];
        let pair = ImagePair::from_slice(&records, 0).unwrap();
        assert_eq!(pair.urls(), ["https://x/a.jpg", "https://x/b.jpg"]);
        assert_eq!(pair.ids().map(ImageId::as_str), ["a", "b"]);
        assert!(ImagePair::from_slice(&records, 2).is_none());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_decodes_backend_payload() {
        let raw = r#"{
            "_id": "img-1",
            "userId": "user-9",
            "url": "https://cdn.example/img-1.jpg",
            "gender": "female",
            "birthDate": "1999-01-31T00:00:00.000Z",
            "battles": 12,
            "wins": 7,
            "losses": 4,
            "draws": 1,
            "glicko": {
                "rating": 1612.5,
                "rd": 80.1,
                "volatility": 0.059,
                "mu": 0.64,
                "phi": 0.46,
                "version": 3,
                "lastUpdate": "2024-05-01T10:00:00Z"
            },
            "inPool": true,
            "status": "flagged"
        }"#;

        let record: ImageRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.id.as_str(), "img-1");
        assert_eq!(record.owner_id.as_str(), "user-9");
        assert_eq!(record.gender, Gender::Female);
        assert_eq!(record.birth_date, NaiveDate::from_ymd_opt(1999, 1, 31));
        assert_eq!(record.stats.wins, 7);
        assert_eq!(record.rating.version, 3);
        assert!(record.in_pool);
        assert_eq!(record.status, Some(ImageStatus::Unknown));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn record_tolerates_missing_optional_fields() {
        let raw = r#"{"id":"x","userId":"u","url":"https://cdn/x.jpg","gender":"male"}"#;
        let record: ImageRecord = serde_json::from_str(raw).unwrap();
        assert_eq!(record.stats, BattleStats::default());
        assert_eq!(record.rating, RatingState::default());
        assert!(!record.in_pool);
        assert!(record.birth_date.is_none());
        assert_eq!(record.stats.win_rate(), None);
    }
}
