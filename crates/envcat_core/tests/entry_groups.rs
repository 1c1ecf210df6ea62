mod common;

use common::{draft, seed_reference_data, utc, Seed};
use envcat_core::db::open_db_in_memory;
use envcat_core::repo::identity_repo::claimed_kind;
use envcat_core::{
    CatalogConfig, CatalogError, Entry, EntryChanges, EntryDraft, EntryGroup, EntryService,
    GroupService, GroupType, IdentityRegistry, NewEntryGroup, SqliteEntryGroupRepository,
    SqliteEntryRepository,
};
use rusqlite::Connection;

type Groups<'conn> = GroupService<SqliteEntryGroupRepository<'conn>, SqliteEntryRepository<'conn>>;
type Entries<'conn> = EntryService<SqliteEntryRepository<'conn>>;

#[test]
fn entry_cannot_join_a_second_split_group() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Fragment 2010-2014");
    let e2 = create(&entries, &seed, "Fragment 2015-2019");

    let g1 = new_group(&groups, GroupType::Split, vec![e1.id]);
    let g2 = new_group(&groups, GroupType::Split, vec![e2.id]);

    let err = groups.add_member(g2.id, e1.id).unwrap_err();
    assert!(matches!(err, CatalogError::ConstraintViolation(_)));
    assert_eq!(groups.get_group(g2.id).unwrap().members, vec![e2.id]);

    let grown = groups.add_member(g1.id, e2.id);
    assert!(matches!(grown, Err(CatalogError::ConstraintViolation(_))));

    let again = groups.add_member(g1.id, e1.id).unwrap();
    assert_eq!(again.members, vec![e1.id]);
}

#[test]
fn split_membership_does_not_limit_other_group_types() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Discharge");

    new_group(&groups, GroupType::Split, vec![e1.id]);
    new_group(&groups, GroupType::Label, vec![e1.id]);
    new_group(&groups, GroupType::Project, vec![e1.id]);
    new_group(&groups, GroupType::Composite, vec![e1.id]);

    let types: Vec<GroupType> = groups
        .groups_of(e1.id)
        .unwrap()
        .into_iter()
        .map(|group| group.group_type)
        .collect();
    assert_eq!(
        types,
        vec![
            GroupType::Split,
            GroupType::Label,
            GroupType::Project,
            GroupType::Composite
        ]
    );
}

#[test]
fn export_set_bundles_composite_members_but_not_label_members() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Wind direction");
    let e2 = create(&entries, &seed, "Wind speed");

    let composite = new_group(&groups, GroupType::Composite, vec![e1.id, e2.id]);
    assert_eq!(ids(&groups.export_set(composite.id, e1.id).unwrap()), vec![e1.id, e2.id]);

    let label = new_group(&groups, GroupType::Label, vec![e1.id, e2.id]);
    assert_eq!(ids(&groups.export_set(label.id, e1.id).unwrap()), vec![e1.id]);

    let split = new_group(&groups, GroupType::Split, vec![e2.id]);
    assert_eq!(ids(&groups.export_set(split.id, e2.id).unwrap()), vec![e2.id]);

    assert!(matches!(
        groups.export_set(split.id, e1.id),
        Err(CatalogError::InvalidArgument(_))
    ));
}

#[test]
fn custom_group_types_are_descriptive() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Groundwater head");
    let e2 = create(&entries, &seed, "Groundwater temperature");

    let catchment = groups
        .register_group_type("Catchment", "Datasets of one catchment")
        .unwrap();
    assert!(groups.list_group_types().unwrap().contains(&catchment));
    let group = new_group(&groups, catchment, vec![e1.id, e2.id]);
    assert_eq!(ids(&groups.export_set(group.id, e2.id).unwrap()), vec![e2.id]);

    assert!(matches!(
        groups.create_group(&NewEntryGroup {
            group_type: GroupType::Custom("Unregistered".to_string()),
            title: None,
            description: None,
            members: vec![e1.id],
        }),
        Err(CatalogError::NotFound { kind: "group type", .. })
    ));
}

#[test]
fn removing_the_last_member_deletes_the_group() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Radiation");
    let e2 = create(&entries, &seed, "Albedo");
    let group = new_group(&groups, GroupType::Composite, vec![e1.id, e2.id]);

    let remaining = groups.remove_member(group.id, e1.id).unwrap().unwrap();
    assert_eq!(remaining.members, vec![e2.id]);
    assert!(matches!(
        groups.remove_member(group.id, e1.id),
        Err(CatalogError::NotFound { kind: "group member", .. })
    ));

    assert!(groups.remove_member(group.id, e2.id).unwrap().is_none());
    assert!(matches!(
        groups.get_group(group.id),
        Err(CatalogError::NotFound { kind: "entry group", .. })
    ));
    assert_eq!(claimed_kind(&conn, group.uuid).unwrap(), None);
    assert_eq!(entries.get(e2.id).unwrap(), e2);
}

#[test]
fn deleting_an_entry_drops_its_memberships_and_empty_groups() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Humidity");
    let e2 = create(&entries, &seed, "Pressure");
    let shared = new_group(&groups, GroupType::Label, vec![e1.id, e2.id]);
    let solo = new_group(&groups, GroupType::Split, vec![e1.id]);

    entries.delete(e1.id).unwrap();

    assert_eq!(groups.get_group(shared.id).unwrap().members, vec![e2.id]);
    assert!(matches!(
        groups.get_group(solo.id),
        Err(CatalogError::NotFound { .. })
    ));
    let split_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM entrygroup_members WHERE is_split = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(split_rows, 0);
}

#[test]
fn new_version_takes_over_group_memberships() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Soil temperature");
    let e2 = create(&entries, &seed, "Soil moisture");
    let group = new_group(&groups, GroupType::Composite, vec![e1.id, e2.id]);

    let v2 = entries.new_version(e1.id, &EntryChanges::default()).unwrap();
    assert_eq!(groups.get_group(group.id).unwrap().members, vec![v2.id, e2.id]);
    assert!(groups.groups_of(e1.id).unwrap().is_empty());

    let exported = groups.export_set(group.id, e2.id).unwrap();
    assert_eq!(ids(&exported), vec![v2.id, e2.id]);
    assert!(exported.iter().all(Entry::is_latest_version));
    assert!(matches!(
        groups.export_set(group.id, e1.id),
        Err(CatalogError::InvalidArgument(_))
    ));
}

#[test]
fn split_group_never_holds_two_versions_of_one_dataset() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Precipitation 2000-2009");
    let e2 = create(&entries, &seed, "Precipitation 2010-2019");
    let split = new_group(&groups, GroupType::Split, vec![e1.id, e2.id]);

    let v2 = entries.new_version(e1.id, &EntryChanges::default()).unwrap();
    let v3 = entries.new_version(v2.id, &EntryChanges::default()).unwrap();

    assert_eq!(ids(&groups.export_set(split.id, e2.id).unwrap()), vec![v3.id, e2.id]);
    assert!(matches!(
        groups.add_member(split.id, v2.id),
        Err(CatalogError::ConstraintViolation(_))
    ));
    let split_rows: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM entrygroup_members WHERE is_split = 1;",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(split_rows, 2);

    entries.delete(v3.id).unwrap();
    assert_eq!(groups.get_group(split.id).unwrap().members, vec![v2.id, e2.id]);
    let view = groups.result_set_for_entry(e2.id).unwrap();
    assert_eq!(view.uuids(), vec![v2.uuid, e2.uuid]);
}

#[test]
fn result_set_prefers_composite_then_split_base_group() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create_published(&entries, &seed, "Flux 2010", utc(2012, 3, 1));
    let e2 = create_published(&entries, &seed, "Flux 2011", utc(2013, 3, 1));
    let e3 = create_published(&entries, &seed, "Flux gap-filled", utc(2014, 3, 1));

    let split = new_group(&groups, GroupType::Split, vec![e1.id, e2.id]);
    let split_view = groups.result_set_for_entry(e1.id).unwrap();
    assert_eq!(split_view.group().map(|group| group.id), Some(split.id));
    assert_eq!(split_view.uuids(), vec![e1.uuid, e2.uuid]);
    assert!(split_view.contains_uuid(e2.uuid));
    assert!(!split_view.contains_uuid(e3.uuid));
    assert_eq!(
        split_view.publication_range(),
        Some((utc(2012, 3, 1), utc(2013, 3, 1)))
    );
    assert_eq!(
        split_view.distinct(|entry| entry.variable_id),
        vec![seed.variable]
    );
    assert_eq!(split_view.distinct(|entry| entry.title.clone()).len(), 2);

    let composite = new_group(&groups, GroupType::Composite, vec![e3.id, e1.id]);
    let composite_view = groups.result_set_for_entry(e1.id).unwrap();
    assert_eq!(
        composite_view.group().map(|group| group.id),
        Some(composite.id)
    );
    assert_eq!(ids(composite_view.members()), vec![e3.id, e1.id]);

    new_group(&groups, GroupType::Label, vec![e2.id]);
    let lonely = create(&entries, &seed, "Ungrouped");
    let single = groups.result_set_for_entry(lonely.id).unwrap();
    assert!(single.group().is_none());
    assert_eq!(single.len(), 1);
    assert!(!single.is_empty());
}

#[test]
fn result_set_from_resolved_identifier() {
    let conn = open_db_in_memory().unwrap();
    let seed = seed_reference_data(&conn);
    let (entries, groups) = services(&conn);
    let e1 = create(&entries, &seed, "Sap flow");
    let e2 = create(&entries, &seed, "Leaf area");
    let group = new_group(&groups, GroupType::Composite, vec![e1.id, e2.id]);

    let registry = IdentityRegistry::for_connection(&conn).unwrap();
    let by_group = groups
        .result_set_for(&registry.resolve(&group.uuid.to_string()).unwrap())
        .unwrap();
    let by_entry = groups
        .result_set_for(&registry.resolve(&e2.uuid.to_string()).unwrap())
        .unwrap();
    assert_eq!(by_group, by_entry);
    assert_eq!(by_group.len(), 2);
}

fn services(conn: &Connection) -> (Entries<'_>, Groups<'_>) {
    let entries = EntryService::new(
        SqliteEntryRepository::try_new(conn).unwrap(),
        CatalogConfig::default(),
    );
    let groups = GroupService::new(
        SqliteEntryGroupRepository::try_new(conn).unwrap(),
        SqliteEntryRepository::try_new(conn).unwrap(),
    );
    (entries, groups)
}

fn create(entries: &Entries<'_>, seed: &Seed, title: &str) -> Entry {
    entries.create(draft(seed, title)).unwrap()
}

fn create_published(
    entries: &Entries<'_>,
    seed: &Seed,
    title: &str,
    publication: chrono::DateTime<chrono::Utc>,
) -> Entry {
    entries
        .create(EntryDraft {
            publication: Some(publication),
            ..draft(seed, title)
        })
        .unwrap()
}

fn new_group(groups: &Groups<'_>, group_type: GroupType, members: Vec<i64>) -> EntryGroup {
    groups
        .create_group(&NewEntryGroup {
            group_type,
            title: None,
            description: None,
            members,
        })
        .unwrap()
}

fn ids(entries: &[Entry]) -> Vec<i64> {
    entries.iter().map(|entry| entry.id).collect()
}
