//! Registration of views on data sources.
//!
//! A [`ViewAwareDatasource`] decorates one physical data source with a set
//! of named views, and a [`ViewManager`] hands out exactly one decoration
//! per data-source name. Every change to a view set is applied in memory,
//! written through the persistence strategy, and undone in memory again if
//! the write fails, so the two never disagree.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::{Arc, Mutex, RwLock};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::cache::NameHasher;
use crate::error::{Result, VeneerError};
use crate::persist::ViewPersistenceStrategy;
use crate::registry::DatasourceRegistry;
use crate::table::{Datasource, ValueTable, ValueTableWriter};
use crate::view::{View, ViewState};

type ViewMap = BTreeMap<String, View>;

// ------------- ViewAwareDatasource -------------
pub struct ViewAwareDatasource {
    wrapped: Arc<dyn Datasource>,
    persistence: Arc<dyn ViewPersistenceStrategy>,
    views: RwLock<ViewMap>,
    // serializes mutate, persist, rollback
    registration: Mutex<()>,
}

impl fmt::Debug for ViewAwareDatasource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ViewAwareDatasource")
            .field("wrapped", &self.wrapped.name())
            .finish_non_exhaustive()
    }
}

impl ViewAwareDatasource {
    /// Decorates `wrapped` with views already read from persistence.
    pub fn new(
        wrapped: Arc<dyn Datasource>,
        persistence: Arc<dyn ViewPersistenceStrategy>,
        views: Vec<View>,
    ) -> Result<Self> {
        let mut map = ViewMap::new();
        for view in views {
            view.attach(wrapped.name())?;
            map.insert(view.name().to_string(), view);
        }
        Ok(Self {
            wrapped,
            persistence,
            views: RwLock::new(map),
            registration: Mutex::new(()),
        })
    }

    pub fn wrapped_datasource(&self) -> &Arc<dyn Datasource> {
        &self.wrapped
    }
    pub fn has_view(&self, name: &str) -> bool {
        self.views
            .read()
            .map(|views| views.contains_key(name))
            .unwrap_or(false)
    }
    pub fn view(&self, name: &str) -> Result<View> {
        self.views
            .read()?
            .get(name)
            .cloned()
            .ok_or_else(|| self.no_such_view(name))
    }
    /// Registered views, ordered by name.
    pub fn views(&self) -> Result<Vec<View>> {
        Ok(self.views.read()?.values().cloned().collect())
    }

    pub fn add_view(&self, view: View) -> Result<()> {
        self.add_views(vec![view])
    }

    /// Adds or replaces views. Either all of them end up registered and
    /// persisted, or none of them do.
    pub fn add_views(&self, views: Vec<View>) -> Result<()> {
        let _registration = self.registration.lock()?;
        let mut names = BTreeSet::new();
        for view in &views {
            self.validate(view)?;
            if !names.insert(view.name()) {
                return Err(VeneerError::InvalidArgument(format!(
                    "view {} appears twice",
                    view.name()
                )));
            }
        }
        let previous = self.views.read()?.clone();
        let restamps = views
            .iter()
            .map(|view| view.view_timestamps())
            .collect::<Vec<_>>();

        let now = Utc::now();
        {
            let mut current = self.views.write()?;
            for view in &views {
                let created = previous
                    .get(view.name())
                    .and_then(|replaced| replaced.view_timestamps().created)
                    .unwrap_or(now);
                view.stamp(created, now)?;
                view.attach(self.wrapped.name())?;
                current.insert(view.name().to_string(), view.clone());
            }
        }

        if let Err(e) = self.persist() {
            warn!(datasource = %self.name(), error = %e, "persisting added views failed, rolling back");
            *self.views.write()? = previous.clone();
            for (view, timestamps) in views.iter().zip(restamps) {
                view.restore_timestamps(timestamps)?;
                if !previous.values().any(|kept| kept.same_as(view)) {
                    view.detach()?;
                }
            }
            return Err(e);
        }

        for view in &views {
            if let Some(replaced) = previous.get(view.name()) {
                if !replaced.same_as(view) {
                    replaced.dispose()?;
                }
            }
            info!(datasource = %self.name(), view = %view.name(), "view added");
        }
        Ok(())
    }

    pub fn remove_view(&self, name: &str) -> Result<()> {
        let _registration = self.registration.lock()?;
        let removed = self
            .views
            .write()?
            .remove(name)
            .ok_or_else(|| self.no_such_view(name))?;
        if let Err(e) = self.persist() {
            warn!(datasource = %self.name(), view = %name, error = %e, "persisting view removal failed, rolling back");
            self.views.write()?.insert(name.to_string(), removed);
            return Err(e);
        }
        removed.dispose()?;
        info!(datasource = %self.name(), view = %name, "view removed");
        Ok(())
    }

    pub fn remove_all_views(&self) -> Result<()> {
        let _registration = self.registration.lock()?;
        let removed = std::mem::take(&mut *self.views.write()?);
        if removed.is_empty() {
            return Ok(());
        }
        if let Err(e) = self.persist() {
            warn!(datasource = %self.name(), error = %e, "persisting view removal failed, rolling back");
            *self.views.write()? = removed;
            return Err(e);
        }
        for view in removed.values() {
            view.dispose()?;
        }
        info!(datasource = %self.name(), views = removed.len(), "all views removed");
        Ok(())
    }

    /// Disposes every view. The persisted set is left alone.
    pub fn dispose(&self) -> Result<()> {
        let _registration = self.registration.lock()?;
        for view in std::mem::take(&mut *self.views.write()?).into_values() {
            view.dispose()?;
        }
        debug!(datasource = %self.name(), "view-aware datasource disposed");
        Ok(())
    }

    fn validate(&self, view: &View) -> Result<()> {
        if view.name().is_empty() {
            return Err(VeneerError::InvalidArgument(
                "view name cannot be empty".to_string(),
            ));
        }
        if let ViewState::Attached { datasource } = view.state() {
            if datasource != self.name() {
                return Err(VeneerError::InvalidArgument(format!(
                    "view {} is attached to {}",
                    view.name(),
                    datasource
                )));
            }
        }
        if self.wrapped.has_value_table(view.name()) {
            return Err(VeneerError::InvalidArgument(format!(
                "{} already has a table named {}",
                self.name(),
                view.name()
            )));
        }
        if view.state() == ViewState::Disposed {
            return Err(VeneerError::InvalidArgument(format!(
                "view {} is disposed",
                view.name()
            )));
        }
        view.check_entity_types()
    }
    fn persist(&self) -> Result<()> {
        let views = self.views()?;
        self.persistence.write_views(self.name(), &views)
    }
    fn no_such_view(&self, name: &str) -> VeneerError {
        VeneerError::NoSuchValueTable {
            datasource: self.name().to_string(),
            table: name.to_string(),
        }
    }
}

impl Datasource for ViewAwareDatasource {
    fn name(&self) -> &str {
        self.wrapped.name()
    }
    fn has_value_table(&self, name: &str) -> bool {
        self.has_view(name) || self.wrapped.has_value_table(name)
    }
    fn value_table(&self, name: &str) -> Result<Arc<dyn ValueTable>> {
        if let Some(view) = self.views.read()?.get(name) {
            return Ok(Arc::new(view.clone()));
        }
        self.wrapped.value_table(name)
    }
    /// Views first, then the physical tables.
    fn value_tables(&self) -> Vec<Arc<dyn ValueTable>> {
        let mut tables: Vec<Arc<dyn ValueTable>> = self
            .views()
            .unwrap_or_default()
            .into_iter()
            .map(|view| Arc::new(view) as Arc<dyn ValueTable>)
            .collect();
        tables.extend(self.wrapped.value_tables());
        tables
    }
    fn can_drop_table(&self, name: &str) -> bool {
        self.has_view(name) || self.wrapped.can_drop_table(name)
    }
    fn drop_table(&self, name: &str) -> Result<()> {
        if self.has_view(name) {
            return self.remove_view(name);
        }
        self.wrapped.drop_table(name)
    }
    fn create_writer(&self, table: &str, entity_type: &str) -> Result<Box<dyn ValueTableWriter + '_>> {
        if self.has_view(table) {
            return Err(VeneerError::Unsupported(format!(
                "{}.{} is a view and cannot be written to",
                self.name(),
                table
            )));
        }
        self.wrapped.create_writer(table, entity_type)
    }
}

// ------------- ViewManager -------------
/// Decorates data sources with views and routes view changes to them.
pub struct ViewManager {
    registry: Arc<DatasourceRegistry>,
    persistence: Arc<dyn ViewPersistenceStrategy>,
    decorated: Mutex<HashMap<String, Arc<ViewAwareDatasource>, NameHasher>>,
}

impl ViewManager {
    pub fn new(registry: Arc<DatasourceRegistry>, persistence: Arc<dyn ViewPersistenceStrategy>) -> Self {
        Self {
            registry,
            persistence,
            decorated: Mutex::new(HashMap::default()),
        }
    }
    pub fn registry(&self) -> &Arc<DatasourceRegistry> {
        &self.registry
    }

    /// The one view-aware wrapper for this data source's name. The first
    /// call loads the persisted views and installs the wrapper in the
    /// registry; later calls return that same wrapper.
    pub fn decorate(&self, datasource: Arc<dyn Datasource>) -> Result<Arc<ViewAwareDatasource>> {
        let mut decorated = self.decorated.lock()?;
        if let Some(existing) = decorated.get(datasource.name()) {
            debug!(datasource = %datasource.name(), "already decorated");
            return Ok(Arc::clone(existing));
        }
        // stored views may reference tables of the data source itself
        let registered = !self.registry.has_datasource(datasource.name());
        if registered {
            self.registry.register(Arc::clone(&datasource))?;
        }
        let name = datasource.name().to_string();
        let wrapper = self
            .persistence
            .read_views(&name)
            .and_then(|views| {
                ViewAwareDatasource::new(datasource, Arc::clone(&self.persistence), views)
            });
        let wrapper = match wrapper {
            Ok(wrapper) => Arc::new(wrapper),
            Err(err) => {
                if registered {
                    self.registry.unregister(&name)?;
                }
                warn!(datasource = %name, error = %err, "stored views failed to load");
                return Err(err);
            }
        };
        let loaded = wrapper.views()?.len();
        self.registry
            .register_or_replace(Arc::clone(&wrapper) as Arc<dyn Datasource>)?;
        info!(datasource = %wrapper.name(), views = loaded, "datasource decorated");
        decorated.insert(wrapper.name().to_string(), Arc::clone(&wrapper));
        Ok(wrapper)
    }

    /// Disposes the wrapper and its views and puts the physical data
    /// source back in the registry.
    pub fn release(&self, datasource: &str) -> Result<()> {
        let wrapper = self
            .decorated
            .lock()?
            .remove(datasource)
            .ok_or_else(|| VeneerError::NoSuchDatasource(datasource.to_string()))?;
        wrapper.dispose()?;
        self.registry
            .register_or_replace(Arc::clone(wrapper.wrapped_datasource()))?;
        info!(datasource = %datasource, "datasource released");
        Ok(())
    }

    pub fn decorated(&self, datasource: &str) -> Result<Arc<ViewAwareDatasource>> {
        self.decorated
            .lock()?
            .get(datasource)
            .cloned()
            .ok_or_else(|| VeneerError::NoSuchDatasource(datasource.to_string()))
    }

    pub fn add_view(&self, datasource: &str, view: View) -> Result<()> {
        self.decorated(datasource)?.add_view(view)
    }
    pub fn add_views(&self, datasource: &str, views: Vec<View>) -> Result<()> {
        self.decorated(datasource)?.add_views(views)
    }
    pub fn remove_view(&self, datasource: &str, view: &str) -> Result<()> {
        self.decorated(datasource)?.remove_view(view)
    }
    pub fn remove_all_views(&self, datasource: &str) -> Result<()> {
        self.decorated(datasource)?.remove_all_views()
    }
    pub fn has_view(&self, datasource: &str, view: &str) -> bool {
        self.decorated(datasource)
            .map(|wrapper| wrapper.has_view(view))
            .unwrap_or(false)
    }
    pub fn view(&self, datasource: &str, view: &str) -> Result<View> {
        self.decorated(datasource)?.view(view)
    }
    pub fn views(&self, datasource: &str) -> Result<Vec<View>> {
        self.decorated(datasource)?.views()
    }
}
