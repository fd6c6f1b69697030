use std::sync::Arc;
use std::thread;

use chrono::DateTime;
use veneer::clause::VariableNameClause;
use veneer::datatype::{Timestamps, Value, ValueType, Variable, VariableEntity};
use veneer::error::ErrorKind;
use veneer::join::JoinTable;
use veneer::support::{StaticDatasource, StaticValueTable};
use veneer::table::{TableSpec, ValueTable};
use veneer::view::View;

fn subject(id: &str) -> VariableEntity {
    VariableEntity::new("Participant", id)
}

fn at(seconds: i64) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap()
}

fn setup() -> (Arc<StaticValueTable>, Arc<StaticValueTable>, JoinTable) {
    let source = StaticDatasource::new("study");
    let a = source
        .add_table(StaticValueTable::new("a", "Participant"))
        .unwrap();
    a.add_variable(Variable::new("x", ValueType::Text, "Participant").with_attribute("origin", "a"))
        .unwrap();
    a.add_variable(Variable::new("y", ValueType::Integer, "Participant"))
        .unwrap();
    a.set_value("e1", "x", Value::text("a1")).unwrap();
    a.set_value("e2", "x", Value::text("a2")).unwrap();
    a.set_value("e2", "y", Value::integer(2)).unwrap();

    let b = source
        .add_table(StaticValueTable::new("b", "Participant"))
        .unwrap();
    b.add_variable(Variable::new("x", ValueType::Text, "Participant").with_attribute("origin", "b"))
        .unwrap();
    b.add_variable(
        Variable::new("z", ValueType::Integer, "Participant").with_repeatable(true),
    )
    .unwrap();
    b.set_value("e2", "x", Value::text("b2")).unwrap();
    b.set_value("e3", "x", Value::text("b3")).unwrap();

    let join = JoinTable::new(vec![
        Arc::clone(&a) as Arc<dyn ValueTable>,
        Arc::clone(&b) as Arc<dyn ValueTable>,
    ])
    .unwrap();
    (a, b, join)
}

#[test]
fn entities_are_the_union_of_members() {
    let (_, _, join) = setup();
    assert_eq!(
        join.variable_entities().unwrap(),
        vec![subject("e1"), subject("e2"), subject("e3")]
    );
    for id in ["e1", "e2", "e3"] {
        assert!(join.has_value_set(&subject(id)).unwrap());
    }
    assert!(!join.has_value_set(&subject("e4")).unwrap());
    assert!(join.value_set(&subject("e4")).unwrap_err().is_not_found());
}

#[test]
fn first_member_owns_a_shared_variable() {
    let (_, _, join) = setup();
    let names: Vec<String> = join
        .variables()
        .unwrap()
        .iter()
        .map(|v| v.name().to_string())
        .collect();
    assert_eq!(names, vec!["x", "y", "z"]);

    let x = join.variable("x").unwrap();
    assert_eq!(x.attribute("origin"), Some("a"));
    assert_eq!(join.owner_of("x").unwrap().name(), "a");
    assert_eq!(join.owner_of("z").unwrap().name(), "b");

    let e2 = join.value_set(&subject("e2")).unwrap();
    assert_eq!(join.value(&x, &e2).unwrap(), Value::text("a2"));
    // e3 only exists in b, but x still belongs to a
    let e3 = join.value_set(&subject("e3")).unwrap();
    assert!(join.value(&x, &e3).unwrap().is_null());
}

#[test]
fn missing_member_rows_read_as_null_of_the_right_shape() {
    let (_, _, join) = setup();
    let y = join.variable("y").unwrap();
    let z = join.variable("z").unwrap();
    let e1 = join.value_set(&subject("e1")).unwrap();
    let e3 = join.value_set(&subject("e3")).unwrap();

    let scalar = join.value(&y, &e3).unwrap();
    assert!(scalar.is_null());
    assert!(!scalar.is_sequence());
    assert_eq!(scalar.value_type(), ValueType::Integer);

    let sequence = join.value(&z, &e1).unwrap();
    assert!(sequence.is_null());
    assert!(sequence.is_sequence());
}

#[test]
fn member_rows_are_fetched_once_on_demand() {
    let (_, _, join) = setup();
    let y = join.variable("y").unwrap();
    let x = join.variable("x").unwrap();
    let z = join.variable("z").unwrap();
    let e2 = join.value_set(&subject("e2")).unwrap();
    let joined = e2.as_joined().unwrap();
    assert_eq!(joined.variable_entity(), &subject("e2"));
    assert_eq!(joined.fetched(), 0);

    assert_eq!(join.value(&y, &e2).unwrap(), Value::integer(2));
    assert_eq!(join.value(&x, &e2).unwrap(), Value::text("a2"));
    assert_eq!(joined.fetched(), 1);
    assert!(join.value(&z, &e2).unwrap().is_null());
    assert_eq!(joined.fetched(), 2);
    assert!(joined.member_value_set(2).is_err());
}

#[test]
fn row_timestamps_aggregate_over_members_with_a_row() {
    let (a, b, join) = setup();
    a.set_value_set_timestamps("e2", Timestamps::new(at(10), at(20)))
        .unwrap();
    b.set_value_set_timestamps("e2", Timestamps::new(at(5), at(15)))
        .unwrap();
    let ts = join.value_set_timestamps(&subject("e2")).unwrap().unwrap();
    assert_eq!(ts.created, Some(at(5)));
    assert_eq!(ts.last_update, Some(at(20)));

    // only a knows e1, and a has no timestamps for it
    assert_eq!(join.value_set_timestamps(&subject("e1")).unwrap(), None);

    b.set_value_set_timestamps("e3", Timestamps::new(at(7), at(8)))
        .unwrap();
    let e3 = join.value_set_timestamps(&subject("e3")).unwrap().unwrap();
    assert_eq!(e3, Timestamps::new(at(7), at(8)));
}

#[test]
fn unknown_member_timestamps_are_absent() {
    let (a, b, join) = setup();
    a.set_value_set_timestamps("e2", Timestamps::default()).unwrap();
    b.set_value_set_timestamps("e2", Timestamps::default()).unwrap();
    assert_eq!(join.value_set_timestamps(&subject("e2")).unwrap(), None);

    b.set_value_set_timestamps("e2", Timestamps::new(at(3), at(4)))
        .unwrap();
    assert_eq!(
        join.value_set_timestamps(&subject("e2")).unwrap(),
        Some(Timestamps::new(at(3), at(4)))
    );
}

#[test]
fn table_timestamps_aggregate_over_members() {
    let (a, b, join) = setup();
    a.set_timestamps(Timestamps::new(at(100), at(300))).unwrap();
    b.set_timestamps(Timestamps {
        created: Some(at(50)),
        last_update: None,
    })
    .unwrap();
    let ts = join.timestamps();
    assert_eq!(ts.created, Some(at(50)));
    assert_eq!(ts.last_update, Some(at(300)));
}

#[test]
fn construction_needs_two_tables_of_one_entity_type() {
    let (a, _, _) = setup();
    let alone = JoinTable::new(vec![Arc::clone(&a) as Arc<dyn ValueTable>]).unwrap_err();
    assert_eq!(alone.kind(), ErrorKind::InvalidArgument);

    let samples = Arc::new(StaticValueTable::new("samples", "Sample"));
    let mixed = JoinTable::new(vec![a as Arc<dyn ValueTable>, samples as Arc<dyn ValueTable>]).unwrap_err();
    assert_eq!(mixed.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn name_and_reference_follow_member_order() {
    let (a, b, join) = setup();
    assert_eq!(join.name(), "a-b");
    assert_eq!(join.entity_type(), "Participant");
    assert_eq!(join.datasource_name(), None);
    assert_eq!(
        join.reference(),
        Some(TableSpec::Join {
            tables: vec![
                TableSpec::Table {
                    reference: "study.a".to_string()
                },
                TableSpec::Table {
                    reference: "study.b".to_string()
                },
            ]
        })
    );
    let reversed = JoinTable::new(vec![b as Arc<dyn ValueTable>, a as Arc<dyn ValueTable>]).unwrap();
    assert_eq!(reversed.name(), "b-a");
    assert_eq!(reversed.variable("x").unwrap().attribute("origin"), Some("b"));
}

#[test]
fn concurrent_first_access_agrees() {
    let (_, _, join) = setup();
    let seen: Vec<Vec<String>> = thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let join = join.clone();
                scope.spawn(move || {
                    join.variables()
                        .unwrap()
                        .iter()
                        .map(|v| v.name().to_string())
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    for names in &seen {
        assert_eq!(names, &seen[0]);
    }
}

#[test]
fn views_can_wrap_a_join() {
    let (_, _, join) = setup();
    let view = View::builder("xs", Arc::new(join))
        .select(Arc::new(VariableNameClause::new(["x"])))
        .build()
        .unwrap();
    assert_eq!(view.variables().unwrap().len(), 1);
    let x = view.variable("x").unwrap();
    let e3 = view.value_set(&subject("e3")).unwrap();
    assert!(view.value(&x, &e3).unwrap().is_null());
    let e1 = view.value_set(&subject("e1")).unwrap();
    assert_eq!(view.value(&x, &e1).unwrap(), Value::text("a1"));
}
