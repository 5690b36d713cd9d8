use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Structured metadata inferred from a judgment's text.
///
/// All named fields are optional; validity is judged on the group (see the
/// metadata quality gate), never on individual fields. Unknown keys from the
/// inference service are preserved in `extra` so older records survive
/// schema growth.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JudgmentMetadata {
    #[serde(default, alias = "Case Name")]
    pub case_name: Option<String>,
    #[serde(default, alias = "Case Number")]
    pub case_number: Option<String>,
    #[serde(default, alias = "Citation")]
    pub citation: Option<String>,
    #[serde(default, alias = "Date of Judgment")]
    pub date_of_judgment: Option<String>,
    #[serde(default, alias = "Bench")]
    pub bench: Option<String>,
    #[serde(default, alias = "Court")]
    pub court: Option<String>,
    #[serde(default, alias = "Subject Matter")]
    pub subject_matter: Option<String>,
    #[serde(default, alias = "Summary")]
    pub summary: Option<String>,
    #[serde(
        default,
        alias = "Keywords",
        deserialize_with = "string_or_list::deserialize"
    )]
    pub keywords: Vec<String>,
    #[serde(
        default,
        alias = "Petitioner Advocates",
        deserialize_with = "string_or_list::deserialize"
    )]
    pub petitioner_advocates: Vec<String>,
    #[serde(
        default,
        alias = "Respondent Advocates",
        deserialize_with = "string_or_list::deserialize"
    )]
    pub respondent_advocates: Vec<String>,
    #[serde(default, flatten)]
    pub extra: Map<String, Value>,
}

impl JudgmentMetadata {
    /// At least one of case name / case number is present and non-blank.
    pub fn has_case_reference(&self) -> bool {
        non_blank(self.case_name.as_deref()) || non_blank(self.case_number.as_deref())
    }

    pub fn has_court(&self) -> bool {
        non_blank(self.court.as_deref())
    }

    /// Judgment dates are exchanged as `YYYY-MM-DD`.
    pub fn judgment_date(&self) -> Option<NaiveDate> {
        parse_judgment_date(self.date_of_judgment.as_deref()?)
    }
}

pub fn parse_judgment_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

fn non_blank(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.trim().is_empty())
}

/// The inference service sometimes returns a single string where a list is
/// expected; accept either shape, and treat null as empty.
mod string_or_list {
    use serde::de::{self, Deserializer, SeqAccess, Visitor};
    use std::fmt;

    struct StringOrListVisitor;

    impl<'de> Visitor<'de> for StringOrListVisitor {
        type Value = Vec<String>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string, a list of strings, or null")
        }

        fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if value.trim().is_empty() {
                return Ok(Vec::new());
            }
            Ok(value
                .split(',')
                .map(|part| part.trim().to_string())
                .filter(|part| !part.is_empty())
                .collect())
        }

        fn visit_seq<A>(self, mut seq: A) -> Result<Self::Value, A::Error>
        where
            A: SeqAccess<'de>,
        {
            let mut values = Vec::new();
            while let Some(value) = seq.next_element::<String>()? {
                values.push(value);
            }
            Ok(values)
        }

        fn visit_unit<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }

        fn visit_none<E>(self) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Vec::new())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(StringOrListVisitor)
    }
}
