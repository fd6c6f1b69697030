use std::sync::Arc;

use veneer::clause::{
    DerivedValueSource, EntityClause, WhereClause, SelectFn, StaticListClause, VariableNameClause,
    VariablePatternClause, WhereFn,
};
use veneer::datatype::{Value, ValueType, Variable, VariableEntity};
use veneer::error::ErrorKind;
use veneer::support::{StaticDatasource, StaticValueTable};
use veneer::table::{ValueSet, ValueTable, VariableValueSource};
use veneer::view::{View, ViewState};
use veneer::wrap::Bijection;

fn participant(id: &str) -> VariableEntity {
    VariableEntity::new("Participant", id)
}

fn setup() -> (Arc<StaticDatasource>, Arc<StaticValueTable>) {
    let source = Arc::new(StaticDatasource::new("clinic"));
    let patients = source
        .add_table(StaticValueTable::new("patients", "Participant"))
        .unwrap();
    patients
        .add_variable(Variable::new("age", ValueType::Integer, "Participant"))
        .unwrap();
    patients
        .add_variable(Variable::new("name", ValueType::Text, "Participant"))
        .unwrap();
    for (id, age, name) in [("p1", 42, "Ann"), ("p2", 17, "Bob"), ("p3", 65, "Cid")] {
        patients.set_value(id, "age", Value::integer(age)).unwrap();
        patients.set_value(id, "name", Value::text(name)).unwrap();
    }
    (source, patients)
}

fn adults(patients: &Arc<StaticValueTable>) -> Arc<dyn WhereClause> {
    let patients = Arc::clone(patients);
    Arc::new(WhereFn::new(move |value_set: &ValueSet, _view: &dyn ValueTable| {
        let age = patients.variable("age")?;
        Ok(patients.value(&age, value_set)? >= Value::integer(18))
    }))
}

#[test]
fn identity_round_trip() {
    let (_, patients) = setup();
    let view = View::builder("everyone", patients).build().unwrap();
    let entities = view.variable_entities().unwrap();
    assert_eq!(entities.len(), 3);
    for entity in &entities {
        assert_eq!(view.value_set(entity).unwrap().variable_entity(), entity);
    }
    assert_eq!(view.state(), ViewState::Initialised);
    assert!(view.is_view());
}

#[test]
fn select_hides_variables_without_touching_rows() {
    let (_, patients) = setup();
    let view = View::builder("ages", patients)
        .select(Arc::new(VariableNameClause::new(["age"])))
        .build()
        .unwrap();
    let names: Vec<String> = view
        .variables()
        .unwrap()
        .iter()
        .map(|v| v.name().to_string())
        .collect();
    assert_eq!(names, vec!["age"]);
    assert!(view.has_variable("age"));
    let hidden = view.variable("name").unwrap_err();
    assert_eq!(hidden.kind(), ErrorKind::NotFound);
    assert_eq!(view.variable_entities().unwrap().len(), 3);
}

#[test]
fn where_filters_rows_as_if_absent() {
    let (_, patients) = setup();
    let view = View::builder("adults", Arc::clone(&patients) as Arc<dyn ValueTable>)
        .where_clause(adults(&patients))
        .build()
        .unwrap();
    assert!(view.has_value_set(&participant("p1")).unwrap());
    assert!(!view.has_value_set(&participant("p2")).unwrap());
    assert!(!view.has_value_set(&participant("nobody")).unwrap());

    let filtered = view.value_set(&participant("p2")).unwrap_err();
    let missing = view.value_set(&participant("nobody")).unwrap_err();
    assert!(filtered.is_not_found());
    assert_eq!(filtered.kind(), missing.kind());

    assert_eq!(
        view.variable_entities().unwrap(),
        vec![participant("p1"), participant("p3")]
    );
    let rows: Vec<VariableEntity> = view
        .value_sets()
        .unwrap()
        .iter()
        .map(|vs| vs.variable_entity().clone())
        .collect();
    assert_eq!(rows, vec![participant("p1"), participant("p3")]);
    for row in view.value_sets().unwrap() {
        assert_eq!(row.table_name(), "adults");
    }
}

#[test]
fn select_and_where_are_independent() {
    let (_, patients) = setup();
    // the filter reads a column the projection hides
    let view = View::builder("adult_names", Arc::clone(&patients) as Arc<dyn ValueTable>)
        .select(Arc::new(VariableNameClause::new(["name"])))
        .where_clause(adults(&patients))
        .build()
        .unwrap();
    assert!(view.variable("age").is_err());
    assert!(view.variable("name").is_ok());
    assert_eq!(view.variable_entities().unwrap().len(), 2);
    let name = view.variable("name").unwrap();
    let row = view.value_set(&participant("p3")).unwrap();
    assert_eq!(view.value(&name, &row).unwrap(), Value::text("Cid"));
}

#[test]
fn stale_value_set_cannot_read_a_filtered_row() {
    let (_, patients) = setup();
    let view = View::builder("adults", Arc::clone(&patients) as Arc<dyn ValueTable>)
        .where_clause(adults(&patients))
        .build()
        .unwrap();
    let name = view.variable("name").unwrap();
    let row = view.value_set(&participant("p1")).unwrap();
    assert_eq!(view.value(&name, &row).unwrap(), Value::text("Ann"));

    patients.set_value("p1", "age", Value::integer(12)).unwrap();
    let stale = view.value(&name, &row).unwrap_err();
    assert!(stale.is_not_found());
}

#[test]
fn pattern_and_function_select_clauses() {
    let (_, patients) = setup();
    let pattern = View::builder("a_columns", Arc::clone(&patients) as Arc<dyn ValueTable>)
        .select(Arc::new(VariablePatternClause::new("^a").unwrap()))
        .build()
        .unwrap();
    assert_eq!(pattern.variables().unwrap().len(), 1);
    assert!(pattern.has_variable("age"));

    let texts = View::builder("texts", patients)
        .select(Arc::new(SelectFn::new(|v: &Variable| v.value_type() == ValueType::Text)))
        .build()
        .unwrap();
    assert!(texts.has_variable("name"));
    assert!(!texts.has_variable("age"));

    let bad = VariablePatternClause::new("(").unwrap_err();
    assert_eq!(bad.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn entity_clause_keeps_listed_rows() {
    let (_, patients) = setup();
    let view = View::builder("some", patients)
        .where_clause(Arc::new(EntityClause::new(["p2", "p3", "p9"])))
        .build()
        .unwrap();
    assert_eq!(
        view.variable_entities().unwrap(),
        vec![participant("p2"), participant("p3")]
    );
}

#[test]
fn list_clause_replaces_variables() {
    let (_, patients) = setup();
    let age = patients.variable("age").unwrap();
    let reader = Arc::clone(&patients);
    let adult: Arc<dyn VariableValueSource> = Arc::new(DerivedValueSource::new(
        Variable::new("adult", ValueType::Boolean, "Participant"),
        move |row: &ValueSet| Ok(Value::boolean(reader.value(&age, row)? >= Value::integer(18))),
    ));
    let view = View::builder("derived", patients)
        .list(Arc::new(StaticListClause::new(vec![adult])))
        .build()
        .unwrap();

    let names: Vec<String> = view
        .variables()
        .unwrap()
        .iter()
        .map(|v| v.name().to_string())
        .collect();
    assert_eq!(names, vec!["adult"]);
    assert!(view.variable("age").is_err());

    let adult = view.variable("adult").unwrap();
    let p2 = view.value_set(&participant("p2")).unwrap();
    let p3 = view.value_set(&participant("p3")).unwrap();
    assert_eq!(view.value(&adult, &p2).unwrap(), Value::boolean(false));
    assert_eq!(view.value(&adult, &p3).unwrap(), Value::boolean(true));
}

#[test]
fn list_clause_variables_must_share_the_entity_type() {
    let (_, patients) = setup();
    let stray: Arc<dyn VariableValueSource> = Arc::new(DerivedValueSource::new(
        Variable::new("barcode", ValueType::Text, "Sample"),
        |_row: &ValueSet| Ok(Value::null(ValueType::Text)),
    ));
    let err = View::builder("mixed", patients)
        .list(Arc::new(StaticListClause::new(vec![stray])))
        .build()
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IncompatibleEntityType);
}

#[test]
fn empty_view_name_is_rejected() {
    let (_, patients) = setup();
    let err = View::builder("", patients).build().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn entity_mapping_renames_and_excludes() {
    let (_, patients) = setup();
    let mapping = Bijection::from_pairs([
        (participant("p1"), participant("A1")),
        (participant("p2"), participant("A2")),
    ])
    .unwrap();
    let view = View::builder("aliased", patients)
        .entity_mapping(mapping)
        .build()
        .unwrap();

    // p3 has no outer counterpart and silently drops out
    assert_eq!(
        view.variable_entities().unwrap(),
        vec![participant("A1"), participant("A2")]
    );
    assert!(!view.has_value_set(&participant("p1")).unwrap());
    assert!(view.value_set(&participant("p1")).unwrap_err().is_not_found());

    let age = view.variable("age").unwrap();
    let row = view.value_set(&participant("A1")).unwrap();
    assert_eq!(row.variable_entity(), &participant("A1"));
    assert_eq!(row.inner().unwrap().variable_entity(), &participant("p1"));
    assert_eq!(view.value(&age, &row).unwrap(), Value::integer(42));
}

#[test]
fn bijection_rejects_conflicting_pairs() {
    let err = Bijection::from_pairs([
        (participant("p1"), participant("A")),
        (participant("p2"), participant("A")),
    ])
    .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    let identity = Bijection::identity();
    assert_eq!(identity.forward(&participant("x")), Some(participant("x")));
    assert_eq!(identity.backward(&participant("x")), Some(participant("x")));
}

#[test]
fn views_nest() {
    let (_, patients) = setup();
    let adults_view = View::builder("adults", Arc::clone(&patients) as Arc<dyn ValueTable>)
        .where_clause(adults(&patients))
        .build()
        .unwrap();
    let names = View::builder("adult_names", Arc::new(adults_view))
        .select(Arc::new(VariableNameClause::new(["name"])))
        .where_clause(Arc::new(EntityClause::new(["p1", "p2"])))
        .build()
        .unwrap();
    assert_eq!(names.variable_entities().unwrap(), vec![participant("p1")]);
    let name = names.variable("name").unwrap();
    let row = names.value_set(&participant("p1")).unwrap();
    assert_eq!(names.value(&name, &row).unwrap(), Value::text("Ann"));
}
