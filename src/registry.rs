//! Component registry and configuration dispatch.
//!
//! Components opt in by registering an `Arc`-held [`Configurable`]; the
//! registry keeps only a weak reference, so registration never extends a
//! component's lifetime. Dispatch walks the live entries in registration
//! order (an explicit contract of this registry), resolves each component's
//! section key, and invokes its configuration hook with the matching section
//! of the document, or `None` when the document has no such section.

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError, Weak};

use tracing::{debug, warn};

use crate::document::ConfigDocument;
use crate::error::{ConfigError, ConfigResult};
use crate::key::SectionKey;
use crate::tree::ConfigTree;

/// A component that can receive a section of a configuration document.
///
/// All methods have defaults except none: the hook itself defaults to
/// "remember the section" via [`section_cell`](Self::section_cell), so a
/// component with no custom logic only needs to expose a [`SectionCell`].
pub trait Configurable: Send + Sync {
    /// Instance-level name used for key derivation. Consulted on every
    /// dispatch, so late-bound names take effect without re-registration.
    /// Falls back to the component's type name when `None`.
    fn config_name(&self) -> Option<String> {
        None
    }

    /// Storage used by the default [`configure`](Self::configure) hook.
    fn section_cell(&self) -> Option<&SectionCell> {
        None
    }

    /// Configuration hook, invoked once per dispatch with this component's
    /// section (or `None` when the document has no matching section).
    ///
    /// The default stores the section verbatim into the component's
    /// [`SectionCell`], if it exposes one, for later inspection.
    fn configure(&self, section: Option<ConfigTree>) -> anyhow::Result<()> {
        if let Some(cell) = self.section_cell() {
            cell.store(section);
        }
        Ok(())
    }
}

/// Retained-section storage for components without a custom hook.
#[derive(Debug, Default)]
pub struct SectionCell {
    slot: Mutex<Option<ConfigTree>>,
}

impl SectionCell {
    /// An empty cell.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the retained section.
    pub fn store(&self, section: Option<ConfigTree>) {
        *self.lock() = section;
    }

    /// A handle to the retained section, if any.
    pub fn get(&self) -> Option<ConfigTree> {
        self.lock().clone()
    }

    /// True when a section is currently retained.
    pub fn is_configured(&self) -> bool {
        self.lock().is_some()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ConfigTree>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
struct Entry {
    component: Weak<dyn Configurable>,
    type_label: &'static str,
    explicit: Option<SectionKey>,
}

/// Registry of weakly-held configurable components.
///
/// The process-wide instance lives behind [`Registry::global`] and starts
/// empty; separate instances can be constructed for tests or embedding.
/// Entries whose component has been dropped are pruned silently at the next
/// dispatch.
#[derive(Debug, Default)]
pub struct Registry {
    entries: Mutex<Vec<Entry>>,
}

static GLOBAL: OnceLock<Registry> = OnceLock::new();

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by
    /// [`configure_all`] and [`ConfigDocument::install`].
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(Self::new)
    }

    /// Register a component, optionally with an explicit section key.
    ///
    /// The explicit key is validated and then used verbatim at every
    /// dispatch; without one, the key is re-derived on each dispatch from
    /// the component's [`config_name`](Configurable::config_name) or, failing
    /// that, from its type name captured here. Re-registering a component
    /// replaces its entry.
    pub fn register<C>(&self, component: &Arc<C>, explicit_key: Option<&str>) -> ConfigResult<()>
    where
        C: Configurable + 'static,
    {
        let explicit = explicit_key.map(SectionKey::new).transpose()?;
        let object: Arc<dyn Configurable> = Arc::clone(component) as Arc<dyn Configurable>;
        let ptr = Arc::as_ptr(component).cast::<()>();

        let mut entries = self.lock();
        entries.retain(|entry| entry.component.as_ptr().cast::<()>() != ptr);
        entries.push(Entry {
            component: Arc::downgrade(&object),
            type_label: std::any::type_name::<C>(),
            explicit,
        });
        debug!(component = std::any::type_name::<C>(), "registered configurable");
        Ok(())
    }

    /// Remove a component's entry, if present. Identity is the `Arc`
    /// allocation, not value equality.
    pub fn unregister<C>(&self, component: &Arc<C>)
    where
        C: Configurable + 'static,
    {
        let ptr = Arc::as_ptr(component).cast::<()>();
        self.lock()
            .retain(|entry| entry.component.as_ptr().cast::<()>() != ptr);
    }

    /// Number of entries, dead ones included until the next dispatch prunes
    /// them.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Deliver `document` to every live registered component.
    ///
    /// Dead entries are pruned first. Hooks run outside the registry lock,
    /// so a hook may re-enter the registry to register or unregister. The
    /// first hook failure aborts the remaining walk (fail-fast) and is
    /// returned as [`ConfigError::Dispatch`]; components configured before
    /// the failure keep their applied state.
    pub fn dispatch(&self, document: &ConfigDocument) -> ConfigResult<()> {
        let live: Vec<(Arc<dyn Configurable>, &'static str, Option<SectionKey>)> = {
            let mut entries = self.lock();
            let before = entries.len();
            entries.retain(|entry| entry.component.strong_count() > 0);
            let pruned = before - entries.len();
            if pruned > 0 {
                warn!(pruned, "pruned dead registry entries");
            }
            entries
                .iter()
                .filter_map(|entry| {
                    entry
                        .component
                        .upgrade()
                        .map(|component| (component, entry.type_label, entry.explicit.clone()))
                })
                .collect()
        };

        let root = document.root();
        for (component, type_label, explicit) in live {
            // Without an explicit key, re-derive every dispatch so
            // late-bound instance names hold.
            let key = explicit.unwrap_or_else(|| match component.config_name() {
                Some(name) => SectionKey::derive(&name),
                None => SectionKey::derive(type_label),
            });
            let section = root.get(key.as_str());
            debug!(key = %key, present = section.is_some(), "dispatching configuration section");
            component
                .configure(section)
                .map_err(|source| ConfigError::Dispatch { key, source })?;
        }
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Register a component with the process-wide registry.
pub fn register_configurable<C>(component: &Arc<C>, key: Option<&str>) -> ConfigResult<()>
where
    C: Configurable + 'static,
{
    Registry::global().register(component, key)
}

/// Remove a component from the process-wide registry.
pub fn unregister_configurable<C>(component: &Arc<C>)
where
    C: Configurable + 'static,
{
    Registry::global().unregister(component);
}

/// Deliver `document` to every component in the process-wide registry.
pub fn configure_all(document: &ConfigDocument) -> ConfigResult<()> {
    Registry::global().dispatch(document)
}
