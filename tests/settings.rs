use std::fs;
use std::sync::Arc;

use veneer::clause::VariableNameClause;
use veneer::datatype::{ValueType, Variable};
use veneer::manager::ViewManager;
use veneer::persist::PersistenceMode;
use veneer::registry::DatasourceRegistry;
use veneer::settings::{init_tracing, Settings, StoreKind};
use veneer::support::{StaticDatasource, StaticValueTable};
use veneer::table::ValueTable;
use veneer::view::View;

fn setup() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}

#[test]
fn defaults_keep_views_in_memory() {
    let settings = Settings::load(None).unwrap();
    assert_eq!(settings.persistence.mode, StoreKind::Memory);
    assert_eq!(settings.log.filter, "info");
    assert_eq!(settings.persistence_mode(), None);
}

#[test]
fn missing_file_falls_back_to_defaults() {
    let dir = setup();
    let file = dir.path().join("absent.toml");
    let settings = Settings::load(Some(file.to_str().unwrap())).unwrap();
    assert_eq!(settings.persistence.mode, StoreKind::Memory);
}

#[test]
fn file_selects_sqlite() {
    let dir = setup();
    let store = dir.path().join("views.db");
    let file = dir.path().join("veneer.toml");
    fs::write(
        &file,
        format!(
            "[persistence]\nmode = \"sqlite\"\npath = \"{}\"\n\n[log]\nfilter = \"veneer=debug\"\n",
            store.display()
        ),
    )
    .unwrap();

    let settings = Settings::load(Some(file.to_str().unwrap())).unwrap();
    assert_eq!(settings.persistence.mode, StoreKind::Sqlite);
    assert_eq!(settings.log.filter, "veneer=debug");
    assert_eq!(
        settings.persistence_mode(),
        Some(PersistenceMode::File(store.display().to_string()))
    );

    let registry = Arc::new(DatasourceRegistry::new());
    let persistence = settings.persistence(&registry).unwrap();
    let source = Arc::new(StaticDatasource::new("lab"));
    let samples = source
        .add_table(StaticValueTable::new("samples", "Sample"))
        .unwrap();
    samples
        .add_variable(Variable::new("volume", ValueType::Decimal, "Sample"))
        .unwrap();
    let manager = ViewManager::new(Arc::clone(&registry), persistence);
    manager.decorate(source).unwrap();
    let view = View::builder("volumes", samples as Arc<dyn ValueTable>)
        .select(Arc::new(VariableNameClause::new(["volume"])))
        .build()
        .unwrap();
    manager.add_view("lab", view).unwrap();
    assert!(store.exists());
}

#[test]
fn sqlite_without_a_path_is_in_memory() {
    let dir = setup();
    let file = dir.path().join("veneer.toml");
    fs::write(&file, "[persistence]\nmode = \"sqlite\"\n").unwrap();
    let settings = Settings::load(Some(file.to_str().unwrap())).unwrap();
    assert_eq!(settings.persistence_mode(), Some(PersistenceMode::InMemory));
}

#[test]
fn unknown_store_kind_is_a_config_error() {
    let dir = setup();
    let file = dir.path().join("veneer.toml");
    fs::write(&file, "[persistence]\nmode = \"tape\"\n").unwrap();
    let err = Settings::load(Some(file.to_str().unwrap())).unwrap_err();
    assert_eq!(err.kind(), veneer::error::ErrorKind::Config);
}

#[test]
fn tracing_can_be_initialised_twice() {
    init_tracing("warn");
    init_tracing("debug");
    tracing::info!(test = "settings", "still logging");
}
