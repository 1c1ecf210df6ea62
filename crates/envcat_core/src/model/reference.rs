//! Flat lookup entities shared across entries.
//!
//! Units, variables, licenses and persons are reference data: entries point
//! at them by id and never own them.

use crate::model::identity::GlobalId;
use crate::model::keyword::KeywordId;
use serde::{Deserialize, Serialize};

pub type UnitId = i64;
pub type VariableId = i64;
pub type LicenseId = i64;
pub type PersonId = i64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: UnitId,
    pub name: String,
    pub symbol: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub name: String,
    pub symbol: String,
}

/// Observed quantity, e.g. air temperature in degree Celsius.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variable {
    pub id: VariableId,
    pub name: String,
    pub symbol: String,
    pub unit_id: UnitId,
    /// Optional controlled-vocabulary term describing the variable.
    pub keyword_id: Option<KeywordId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewVariable {
    pub name: String,
    pub symbol: String,
    pub unit_id: UnitId,
    pub keyword_id: Option<KeywordId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct License {
    pub id: LicenseId,
    /// Unique short name, e.g. `CC BY 4.0`.
    pub short_title: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub by_attribution: Option<bool>,
    pub share_alike: Option<bool>,
    pub commercial_use: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLicense {
    pub short_title: String,
    pub title: String,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub by_attribution: Option<bool>,
    pub share_alike: Option<bool>,
    pub commercial_use: Option<bool>,
}

/// Natural or organisational actor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: PersonId,
    pub uuid: GlobalId,
    pub is_organisation: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation_name: Option<String>,
    pub affiliation: Option<String>,
}

impl Person {
    /// Display name: `first last` for people, organisation name otherwise.
    pub fn full_name(&self) -> String {
        if self.is_organisation {
            return self.organisation_name.clone().unwrap_or_default();
        }
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (None, Some(last)) => last.clone(),
            (Some(first), None) => first.clone(),
            (None, None) => self.organisation_name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPerson {
    pub is_organisation: bool,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organisation_name: Option<String>,
    pub affiliation: Option<String>,
}

impl NewPerson {
    pub fn natural(first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        Self {
            first_name: Some(first_name.into()),
            last_name: Some(last_name.into()),
            ..Self::default()
        }
    }

    pub fn organisation(name: impl Into<String>) -> Self {
        Self {
            is_organisation: true,
            organisation_name: Some(name.into()),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Person;
    use crate::model::identity::new_global_id;

    #[test]
    fn full_name_prefers_organisation_for_organisations() {
        let mut person = Person {
            id: 1,
            uuid: new_global_id(),
            is_organisation: false,
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            organisation_name: Some("KIT".to_string()),
            affiliation: None,
        };
        assert_eq!(person.full_name(), "Ada Lovelace");
        person.is_organisation = true;
        assert_eq!(person.full_name(), "KIT");
    }
}
