use chrono::{NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use super::row::{Candidate, CandidateId, ElectionId, ElectionSummary, Tally};

/// An admin's request to start a new election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionSpec {
    pub id: ElectionId,
    #[serde(with = "time_of_day")]
    pub start_time: NaiveTime,
    #[serde(with = "time_of_day")]
    pub end_time: NaiveTime,
    pub candidates: Vec<CandidateSpec>,
}

/// One candidate entry of an [`ElectionSpec`]. Entries with a blank name or
/// symbol are skipped rather than rejecting the whole election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub id: CandidateId,
    #[serde(default)]
    pub symbol: Option<String>,
}

impl CandidateSpec {
    /// Turn this entry into a candidate row, if it is complete.
    pub fn accept(&self, election_id: ElectionId) -> Option<Candidate> {
        let name = self.name.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        let symbol = self.symbol.as_deref().map(str::trim).filter(|s| !s.is_empty())?;
        Some(Candidate {
            election_id,
            name: name.to_string(),
            cand_id: self.id,
            symbol: symbol.to_string(),
        })
    }
}

/// Result of starting an election.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElectionStart {
    /// Every election, newest first, including the one just started.
    pub elections: Vec<ElectionSummary>,
    /// How many candidate entries were dropped for lacking a name or symbol.
    pub skipped_candidates: usize,
}

/// Outcome of asking for an election's results to be made visible.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityOutcome {
    /// Results are now visible.
    Success,
    /// The election is still ongoing; nothing was changed.
    Skipped,
}

/// Tally fields submitted by the external tallying tool.
pub type TallySpec = Tally;

/// Times of day as an HTML form submits them: `HH:MM`, `HH:MM:SS`, or a full
/// `datetime-local` value whose date part is ignored.
pub mod time_of_day {
    use super::*;

    use serde::{de::Error, Deserializer, Serializer};

    const DATETIME_LOCAL: &str = "%Y-%m-%dT%H:%M";

    pub fn parse(value: &str) -> Option<NaiveTime> {
        let value = value.trim();
        NaiveTime::parse_from_str(value, "%H:%M:%S")
            .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, DATETIME_LOCAL)
                    .ok()
                    .map(|dt| dt.time())
            })
    }

    pub fn serialize<S: Serializer>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&time.format("%H:%M:%S"))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid time of day: {raw:?}")))
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    use rocket::serde::json::{from_str, json};

    #[test]
    fn accepts_form_time_formats() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        assert_eq!(time_of_day::parse("09:00"), Some(nine));
        assert_eq!(time_of_day::parse("09:00:00"), Some(nine));
        assert_eq!(time_of_day::parse("2024-02-08T09:00"), Some(nine));
        assert_eq!(time_of_day::parse("nine o'clock"), None);
    }

    #[test]
    fn incomplete_candidates_are_not_accepted() {
        let complete = CandidateSpec::example("A", 1, "x");
        assert_eq!(
            complete.accept(7),
            Some(Candidate {
                election_id: 7,
                name: "A".to_string(),
                cand_id: 1,
                symbol: "x".to_string(),
            })
        );

        let blank_name = CandidateSpec::example("  ", 2, "y");
        assert_eq!(blank_name.accept(7), None);

        let no_symbol = CandidateSpec {
            symbol: None,
            ..CandidateSpec::example("C", 3, "z")
        };
        assert_eq!(no_symbol.accept(7), None);
    }

    #[test]
    fn deserialises_from_form_json() {
        let raw = json!({
            "id": 12,
            "start_time": "2024-02-08T09:00",
            "end_time": "17:30",
            "candidates": [
                {"name": "A", "id": 1, "symbol": "x"},
                {"id": 2, "symbol": "y"},
            ],
        })
        .to_string();
        let spec: ElectionSpec = from_str(&raw).unwrap();
        assert_eq!(spec.id, 12);
        assert_eq!(spec.end_time, NaiveTime::from_hms_opt(17, 30, 0).unwrap());
        assert_eq!(spec.candidates[1].name, None);
    }
}
