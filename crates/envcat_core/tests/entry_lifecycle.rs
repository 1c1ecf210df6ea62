mod common;

use chrono::Duration;
use common::{draft, seed_reference_data, utc};
use envcat_core::db::open_db_in_memory;
use envcat_core::{
    BoundingBox, CatalogConfig, CatalogError, DataSourceKind, EntryChanges, EntryDraft,
    EntryQuery, EntryService, KeywordRepository, NewDataSource, NewPerson, NewThesaurus,
    PersonRole, Point, ReferenceRepository, SpatialScale, SqliteEntryRepository,
    SqliteKeywordRepository, SqliteReferenceRepository, TemporalExtent, TemporalScale,
    VersionSelector,
};
use rusqlite::Connection;
use serde_json::json;

type Service<'conn> = EntryService<SqliteEntryRepository<'conn>>;

#[test]
fn embargo_defaults_to_two_calendar_years_after_publication() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());

    let entry = service
        .create(EntryDraft {
            embargo: true,
            publication: Some(utc(2020, 5, 15)),
            ..draft(&seed, "Embargoed soil moisture")
        })
        .unwrap();

    assert_eq!(entry.embargo_end, Some(utc(2022, 5, 15)));
    assert!(service.is_embargoed(&entry, utc(2021, 1, 1)));
    assert!(!service.is_embargoed(&entry, utc(2023, 1, 1)));
    assert!(!service.is_embargoed(&entry, utc(2022, 5, 15)));
}

#[test]
fn embargo_period_comes_from_config_and_explicit_end_wins() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let config = CatalogConfig {
        embargo_period_years: 3,
        ..CatalogConfig::default()
    };
    let service = entry_service(&conn, config);

    let defaulted = service
        .create(EntryDraft {
            embargo: true,
            publication: Some(utc(2020, 5, 15)),
            ..draft(&seed, "Three year embargo")
        })
        .unwrap();
    assert_eq!(defaulted.embargo_end, Some(utc(2023, 5, 15)));

    let explicit = service
        .create(EntryDraft {
            embargo: true,
            embargo_end: Some(utc(2020, 12, 31)),
            publication: Some(utc(2020, 5, 15)),
            ..draft(&seed, "Short embargo")
        })
        .unwrap();
    assert_eq!(explicit.embargo_end, Some(utc(2020, 12, 31)));

    let open = service.create(draft(&seed, "Open data")).unwrap();
    assert!(!open.embargo);
    assert_eq!(open.embargo_end, None);
    assert!(!service.is_embargoed(&open, utc(2000, 1, 1)));
}

#[test]
fn create_assigns_identity_version_and_timestamps() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());

    let entry = service.create(draft(&seed, "Air temperature")).unwrap();
    assert_eq!(entry.version, 1);
    assert_eq!(entry.latest_version_id, entry.id);
    assert!(entry.is_latest_version());
    assert_eq!(entry.publication, entry.last_update);
    assert_eq!(entry.author_id, seed.author);
    assert_eq!(
        service.get_by_uuid(entry.uuid).unwrap().as_ref(),
        Some(&entry)
    );

    let persons = service.list_persons(entry.id).unwrap();
    assert_eq!(persons.len(), 1);
    assert_eq!(persons[0].role, PersonRole::Author);
    assert_eq!(persons[0].person.id, seed.author);
}

#[test]
fn create_requires_every_mandatory_field_and_stores_nothing_otherwise() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());

    let cases: Vec<(&str, EntryDraft)> = vec![
        ("author", EntryDraft { author: None, ..draft(&seed, "x") }),
        ("title", EntryDraft { title: Some("  ".to_string()), ..draft(&seed, "x") }),
        ("abstract", EntryDraft { abstract_text: None, ..draft(&seed, "x") }),
        ("variable", EntryDraft { variable: None, ..draft(&seed, "x") }),
        ("license", EntryDraft { license: None, ..draft(&seed, "x") }),
        ("location", EntryDraft { location: None, ..draft(&seed, "x") }),
    ];
    for (field, case) in cases {
        match service.create(case) {
            Err(CatalogError::MissingRequiredField(missing)) => assert_eq!(missing, field),
            other => panic!("expected missing `{field}`, got {other:?}"),
        }
    }
    assert_eq!(entry_count(&conn), 0);

    let geometry_only = service
        .create(EntryDraft {
            location: None,
            geometry: Some("POLYGON ((8 49, 9 49, 9 50, 8 49))".to_string()),
            ..draft(&seed, "Catchment outline")
        })
        .unwrap();
    assert_eq!(geometry_only.location, None);
}

#[test]
fn create_with_unknown_reference_rolls_back() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());

    let err = service
        .create(EntryDraft {
            keywords: vec![999],
            datasource: Some(NewDataSource::new(DataSourceKind::Csv, "/data/a.csv")),
            ..draft(&seed, "Dangling keyword")
        })
        .unwrap_err();
    assert!(matches!(err, CatalogError::NotFound { kind: "keyword", .. }));
    assert_eq!(entry_count(&conn), 0);
    assert_eq!(table_count(&conn, "datasources"), 0);
}

#[test]
fn edit_updates_in_place_without_touching_identity() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let entry = service.create(draft(&seed, "Draft title")).unwrap();

    let edited = service
        .edit(
            entry.id,
            &EntryChanges {
                title: Some("Final title".to_string()),
                citation: Some(Some("Doe (2024)".to_string())),
                ..EntryChanges::default()
            },
        )
        .unwrap();
    assert_eq!(edited.id, entry.id);
    assert_eq!(edited.uuid, entry.uuid);
    assert_eq!(edited.version, 1);
    assert_eq!(edited.title, "Final title");
    assert_eq!(edited.citation.as_deref(), Some("Doe (2024)"));
    assert_eq!(edited.abstract_text, entry.abstract_text);
    assert!(edited.last_update >= entry.last_update);

    let err = service
        .edit(
            entry.id,
            &EntryChanges {
                location: Some(None),
                ..EntryChanges::default()
            },
        )
        .unwrap_err();
    assert!(matches!(err, CatalogError::MissingRequiredField("location")));
    assert_eq!(service.get(entry.id).unwrap(), edited);
}

#[test]
fn two_new_versions_form_a_chain_pointing_at_version_three() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());

    let v1 = service.create(draft(&seed, "Runoff v1")).unwrap();
    let v2 = service
        .new_version(
            v1.id,
            &EntryChanges {
                title: Some("Runoff v2".to_string()),
                ..EntryChanges::default()
            },
        )
        .unwrap();
    let v3 = service.new_version(v2.id, &EntryChanges::default()).unwrap();

    assert_eq!(v3.version, 3);
    assert_eq!(v3.latest_version_id, v3.id);
    assert_eq!(v3.title, "Runoff v2");
    assert_eq!(v3.publication, v1.publication);
    assert_ne!(v3.uuid, v1.uuid);

    let chain = service.version_chain(v1.id).unwrap();
    let versions: Vec<u32> = chain.iter().map(|entry| entry.version).collect();
    assert_eq!(versions, vec![1, 2, 3]);
    for row in &chain {
        assert_eq!(row.latest_version_id, v3.id);
    }
    assert_eq!(chain.iter().filter(|row| row.is_latest_version()).count(), 1);
    assert_eq!(service.current_version(v1.id).unwrap().id, v3.id);
    assert_eq!(service.get(v1.id).unwrap().title, "Runoff v1");

    let persons = service.list_persons(v3.id).unwrap();
    assert_eq!(persons[0].person.id, seed.author);
}

#[test]
fn history_rows_cannot_be_edited_or_branched() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let v1 = service.create(draft(&seed, "Precipitation")).unwrap();
    service.new_version(v1.id, &EntryChanges::default()).unwrap();

    assert!(matches!(
        service.new_version(v1.id, &EntryChanges::default()),
        Err(CatalogError::ConstraintViolation(_))
    ));
    assert!(matches!(
        service.edit(
            v1.id,
            &EntryChanges {
                title: Some("rewrite".to_string()),
                ..EntryChanges::default()
            }
        ),
        Err(CatalogError::ConstraintViolation(_))
    ));
    assert_eq!(service.version_chain(v1.id).unwrap().len(), 2);
}

#[test]
fn deleting_the_current_row_repoints_the_chain() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let v1 = service
        .create(EntryDraft {
            datasource: Some(NewDataSource::new(DataSourceKind::NetCdf, "/data/runoff.nc")),
            ..draft(&seed, "Runoff")
        })
        .unwrap();
    let v2 = service.new_version(v1.id, &EntryChanges::default()).unwrap();
    let v3 = service.new_version(v2.id, &EntryChanges::default()).unwrap();
    assert_eq!(table_count(&conn, "datasources"), 3);

    service.delete(v3.id).unwrap();

    assert!(matches!(
        service.get(v3.id),
        Err(CatalogError::NotFound { kind: "entry", .. })
    ));
    let chain = service.version_chain(v1.id).unwrap();
    assert_eq!(chain.len(), 2);
    for row in &chain {
        assert_eq!(row.latest_version_id, v2.id);
    }
    assert_eq!(table_count(&conn, "datasources"), 2);

    let author = SqliteReferenceRepository::try_new(&conn)
        .unwrap()
        .get_person(seed.author)
        .unwrap();
    assert_eq!(author.id, seed.author);
}

#[test]
fn person_associations_are_role_qualified_and_single_author() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let references = SqliteReferenceRepository::try_new(&conn).unwrap();
    let service = entry_service(&conn, CatalogConfig::default());
    let entry = service.create(draft(&seed, "Evapotranspiration")).unwrap();

    let second = references
        .create_person(&NewPerson::natural("Grace", "Hopper"))
        .unwrap();
    let institute = references
        .create_person(&NewPerson::organisation("Example Institute"))
        .unwrap();

    assert!(matches!(
        service.add_person(entry.id, second.id, PersonRole::Author, 2),
        Err(CatalogError::ConstraintViolation(_))
    ));
    service
        .add_person(entry.id, institute.id, PersonRole::Publisher, 1)
        .unwrap();
    service
        .add_person(entry.id, second.id, PersonRole::CoAuthor, 1)
        .unwrap();

    let roles: Vec<PersonRole> = service
        .list_persons(entry.id)
        .unwrap()
        .into_iter()
        .map(|association| association.role)
        .collect();
    assert_eq!(
        roles,
        vec![PersonRole::Author, PersonRole::CoAuthor, PersonRole::Publisher]
    );
}

#[test]
fn details_are_keyed_by_normalized_stem() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let entry = service.create(draft(&seed, "Wind speed")).unwrap();

    let first = service
        .set_detail(entry.id, "Sensor Height", &json!(2.5), Some("meters"))
        .unwrap();
    assert_eq!(first.stem, "sensor_height");

    service
        .set_detail(entry.id, "sensor-height", &json!({"value": 3, "unit": "m"}), None)
        .unwrap();
    let details = service.details(entry.id).unwrap();
    assert_eq!(details.len(), 1);
    assert_eq!(details[0].key, "sensor-height");
    assert_eq!(details[0].value, json!({"value": 3, "unit": "m"}));
    assert_eq!(details[0].description, None);

    assert!(matches!(
        service.set_detail(entry.id, " -- ", &json!(1), None),
        Err(CatalogError::MissingRequiredField("key"))
    ));
}

#[test]
fn scale_triplets_are_replaced_wholesale() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let entry = service
        .create(EntryDraft {
            datasource: Some(NewDataSource::new(DataSourceKind::Csv, "/data/wind.csv")),
            ..draft(&seed, "Wind")
        })
        .unwrap();

    let temporal = TemporalScale::new(
        Duration::minutes(10),
        TemporalExtent {
            start: utc(2019, 1, 1),
            end: utc(2020, 1, 1),
        },
        None,
    )
    .unwrap();
    let datasource = service
        .replace_scales(entry.id, Some(temporal.clone()), None)
        .unwrap();
    assert_eq!(datasource.temporal_scale, Some(temporal));
    assert_eq!(datasource.encoding, "utf-8");

    let sub_second = TemporalScale::new(
        Duration::milliseconds(1500),
        TemporalExtent {
            start: utc(2019, 6, 1),
            end: utc(2019, 6, 2),
        },
        Some(0.5),
    )
    .unwrap();
    let datasource = service
        .replace_scales(entry.id, Some(sub_second.clone()), None)
        .unwrap();
    assert_eq!(datasource.temporal_scale, Some(sub_second));
    assert_eq!(
        service.get(entry.id).unwrap().datasource.unwrap().temporal_scale.unwrap().resolution(),
        Duration::milliseconds(1500)
    );

    let spatial = SpatialScale::new(
        250.0,
        BoundingBox {
            min_x: 8.0,
            min_y: 48.5,
            max_x: 9.0,
            max_y: 49.5,
        },
        Some(0.5),
    )
    .unwrap();
    let datasource = service
        .replace_scales(entry.id, None, Some(spatial.clone()))
        .unwrap();
    assert_eq!(datasource.temporal_scale, None);
    assert_eq!(datasource.spatial_scale, Some(spatial));
    assert_eq!(table_count(&conn, "temporal_scales"), 0);

    let bare = service.create(draft(&seed, "No data source")).unwrap();
    assert!(matches!(
        service.replace_scales(bare.id, None, None),
        Err(CatalogError::InvalidArgument(_))
    ));
}

#[test]
fn find_entries_filters_by_version_embargo_title_and_keyword_subtree() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let service = entry_service(&conn, CatalogConfig::default());
    let keywords = SqliteKeywordRepository::try_new(&conn).unwrap();
    let thesaurus = keywords
        .create_thesaurus(&NewThesaurus {
            name: "GCMD".to_string(),
            title: "GCMD".to_string(),
            organisation: "NASA".to_string(),
            url: "https://gcmd.earthdata.nasa.gov/kms".to_string(),
            description: None,
        })
        .unwrap();
    let chain = keywords
        .ensure_path(thesaurus.id, "EARTH SCIENCE > TERRESTRIAL HYDROSPHERE > SURFACE WATER")
        .unwrap();

    let river = service
        .create(EntryDraft {
            keywords: vec![chain[2].id],
            ..draft(&seed, "River discharge")
        })
        .unwrap();
    let river_v2 = service.new_version(river.id, &EntryChanges::default()).unwrap();
    let hidden = service
        .create(EntryDraft {
            embargo: true,
            ..draft(&seed, "River temperature")
        })
        .unwrap();
    let old_embargo = service
        .create(EntryDraft {
            embargo: true,
            publication: Some(utc(2015, 1, 1)),
            ..draft(&seed, "Lake level")
        })
        .unwrap();

    let ids = |query: &EntryQuery| -> Vec<i64> {
        service
            .find(query)
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    };

    assert_eq!(ids(&EntryQuery::default()), vec![river_v2.id, old_embargo.id]);
    assert_eq!(
        ids(&EntryQuery {
            include_embargoed: true,
            ..EntryQuery::default()
        }),
        vec![river_v2.id, hidden.id, old_embargo.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            title: Some("river".to_string()),
            version: VersionSelector::All,
            include_embargoed: true,
            ..EntryQuery::default()
        }),
        vec![river.id, river_v2.id, hidden.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            keyword: Some(chain[0].id),
            ..EntryQuery::default()
        }),
        vec![river_v2.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            version: VersionSelector::Exact(1),
            at: Some(utc(2016, 1, 1)),
            ..EntryQuery::default()
        }),
        vec![river.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            author: Some(seed.author),
            limit: Some(1),
            offset: 1,
            ..EntryQuery::default()
        }),
        vec![old_embargo.id]
    );

    let tags = service.keywords(river_v2.id).unwrap();
    assert_eq!(tags.len(), 1);
    assert_eq!(
        tags[0].full_path,
        "EARTH SCIENCE > TERRESTRIAL HYDROSPHERE > SURFACE WATER"
    );
}

#[test]
fn find_entries_filters_by_abstract_external_id_coauthor_details_and_area() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let references = SqliteReferenceRepository::try_new(&conn).unwrap();
    let service = entry_service(&conn, CatalogConfig::default());
    let coauthor = references
        .create_person(&NewPerson::natural("Grace", "Hopper"))
        .unwrap();

    let karlsruhe = service
        .create(EntryDraft {
            abstract_text: Some("Eddy covariance tower above a beech forest".to_string()),
            external_id: Some("DE-Hai".to_string()),
            location: Some(Point::new(8.4, 49.0)),
            ..draft(&seed, "Latent heat flux")
        })
        .unwrap();
    let freiburg = service
        .create(EntryDraft {
            abstract_text: Some("Streamflow gauge below the beech stand".to_string()),
            external_id: Some("DE-Fre".to_string()),
            location: Some(Point::new(7.85, 48.0)),
            ..draft(&seed, "Discharge")
        })
        .unwrap();
    let outline_only = service
        .create(EntryDraft {
            location: None,
            geometry: Some("POLYGON ((8 48, 9 48, 9 49, 8 49, 8 48))".to_string()),
            ..draft(&seed, "Catchment outline")
        })
        .unwrap();

    service
        .add_person(freiburg.id, coauthor.id, PersonRole::CoAuthor, 1)
        .unwrap();
    service
        .add_person(karlsruhe.id, coauthor.id, PersonRole::Contributor, 1)
        .unwrap();
    service
        .set_detail(karlsruhe.id, "Sensor Height", &json!(2.5), None)
        .unwrap();
    service
        .set_detail(karlsruhe.id, "station", &json!({"code": "HAI", "active": true}), None)
        .unwrap();
    service
        .set_detail(freiburg.id, "sensor_height", &json!(1.0), None)
        .unwrap();

    let ids = |query: &EntryQuery| -> Vec<i64> {
        service
            .find(query)
            .unwrap()
            .into_iter()
            .map(|entry| entry.id)
            .collect()
    };

    assert_eq!(
        ids(&EntryQuery {
            abstract_text: Some("BEECH".to_string()),
            ..EntryQuery::default()
        }),
        vec![karlsruhe.id, freiburg.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            external_id: Some("DE-Fre".to_string()),
            ..EntryQuery::default()
        }),
        vec![freiburg.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            coauthor: Some(coauthor.id),
            ..EntryQuery::default()
        }),
        vec![freiburg.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            coauthor: Some(seed.author),
            ..EntryQuery::default()
        }),
        vec![karlsruhe.id, freiburg.id, outline_only.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            details: vec![
                ("sensor-height".to_string(), json!(2.5)),
                ("Station".to_string(), json!({"active": true, "code": "HAI"})),
            ],
            ..EntryQuery::default()
        }),
        vec![karlsruhe.id]
    );
    assert!(ids(&EntryQuery {
        details: vec![("sensor height".to_string(), json!(3.0))],
        ..EntryQuery::default()
    })
    .is_empty());
    assert_eq!(
        ids(&EntryQuery {
            within: Some(BoundingBox {
                min_x: 8.0,
                min_y: 48.5,
                max_x: 9.0,
                max_y: 49.5,
            }),
            ..EntryQuery::default()
        }),
        vec![karlsruhe.id]
    );
    assert_eq!(
        ids(&EntryQuery {
            within: Some(BoundingBox {
                min_x: 7.85,
                min_y: 48.0,
                max_x: 8.4,
                max_y: 49.0,
            }),
            ..EntryQuery::default()
        }),
        vec![karlsruhe.id, freiburg.id]
    );

    assert!(matches!(
        service.find(&EntryQuery {
            within: Some(BoundingBox {
                min_x: 9.0,
                min_y: 48.0,
                max_x: 8.0,
                max_y: 49.0,
            }),
            ..EntryQuery::default()
        }),
        Err(CatalogError::InvalidArgument(_))
    ));
    assert!(matches!(
        service.find(&EntryQuery {
            details: vec![(" -- ".to_string(), json!(1))],
            ..EntryQuery::default()
        }),
        Err(CatalogError::MissingRequiredField("key"))
    ));
}

fn entry_service(conn: &Connection, config: CatalogConfig) -> Service<'_> {
    EntryService::new(SqliteEntryRepository::try_new(conn).unwrap(), config)
}

fn entry_count(conn: &Connection) -> i64 {
    table_count(conn, "entries")
}

fn table_count(conn: &Connection, table: &str) -> i64 {
    conn.query_row(&format!("SELECT COUNT(*) FROM {table};"), [], |row| {
        row.get(0)
    })
    .unwrap()
}
