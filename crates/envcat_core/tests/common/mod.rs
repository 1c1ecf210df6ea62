#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use envcat_core::model::reference::{LicenseId, PersonId, VariableId};
use envcat_core::{
    EntryDraft, NewLicense, NewPerson, NewUnit, NewVariable, Point, ReferenceRepository,
    SqliteReferenceRepository,
};
use rusqlite::Connection;

/// Reference rows every entry needs.
pub struct Seed {
    pub author: PersonId,
    pub variable: VariableId,
    pub license: LicenseId,
}

pub fn seed_reference_data(conn: &Connection) -> Seed {
    let repo = SqliteReferenceRepository::try_new(conn).unwrap();
    let unit = repo
        .create_unit(&NewUnit {
            name: "degree Celsius".to_string(),
            symbol: "C".to_string(),
        })
        .unwrap();
    let variable = repo
        .create_variable(&NewVariable {
            name: "air temperature".to_string(),
            symbol: "T".to_string(),
            unit_id: unit.id,
            keyword_id: None,
        })
        .unwrap();
    let license = repo
        .create_license(&NewLicense {
            short_title: "CC BY 4.0".to_string(),
            title: "Creative Commons Attribution 4.0 International".to_string(),
            by_attribution: Some(true),
            ..NewLicense::default()
        })
        .unwrap();
    let author = repo
        .create_person(&NewPerson::natural("Ada", "Lovelace"))
        .unwrap();

    Seed {
        author: author.id,
        variable: variable.id,
        license: license.id,
    }
}

/// Draft with every mandatory field set.
pub fn draft(seed: &Seed, title: &str) -> EntryDraft {
    EntryDraft {
        author: Some(seed.author),
        title: Some(title.to_string()),
        abstract_text: Some(format!("Abstract of {title}")),
        variable: Some(seed.variable),
        license: Some(seed.license),
        location: Some(Point::new(8.4, 49.0)),
        ..EntryDraft::default()
    }
}

pub fn utc(year: i32, month: u32, day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
}
