//! The hierarchical parameter registry.
//!
//! [`ParameterRegistry`] is a tree: every key maps either to an opaque
//! [`Parameter`] value or to a nested registry. Nested registries can carry
//! tags, which patterns use to filter lookups.
//!
//! # Snapshots
//!
//! [`ParameterRegistry::snapshot`] builds a new, fully independent registry
//! holding deep copies of only the requested entries. Background hooks receive
//! such snapshots, so nothing they do can reach the live registry.

use hashbrown::HashSet;
use indexmap::IndexMap;

use crate::error::RegistryError;
use crate::parameter::Parameter;
use crate::path::{self, PathPattern, Segment};

/// A single registry slot.
#[derive(Debug)]
pub enum Entry {
    /// An opaque value.
    Value(Box<dyn Parameter>),
    /// A nested registry.
    Nested(ParameterRegistry),
}

impl Entry {
    /// Returns the value if this entry holds one.
    #[must_use]
    pub fn as_value(&self) -> Option<&dyn Parameter> {
        match self {
            Entry::Value(value) => Some(&**value),
            Entry::Nested(_) => None,
        }
    }

    /// Returns the nested registry if this entry holds one.
    #[must_use]
    pub fn as_nested(&self) -> Option<&ParameterRegistry> {
        match self {
            Entry::Value(_) => None,
            Entry::Nested(registry) => Some(registry),
        }
    }

    /// Returns `true` if this entry is a nested registry carrying any of `tags`.
    fn has_any_tag(&self, tags: &[String]) -> bool {
        self.as_nested()
            .is_some_and(|registry| tags.iter().any(|tag| registry.has_tag(tag)))
    }
}

impl Clone for Entry {
    fn clone(&self) -> Self {
        match self {
            Entry::Value(value) => Entry::Value((**value).clone_parameter()),
            Entry::Nested(registry) => Entry::Nested(registry.clone()),
        }
    }
}

/// Hierarchical key/value store for training state.
///
/// Keys keep insertion order, so pattern resolution is deterministic.
/// Cloning a registry deep-copies every value.
///
/// # Example
///
/// ```
/// use cadence_registry::ParameterRegistry;
///
/// let mut registry = ParameterRegistry::new();
/// registry.set("epoch_loss", 0.42_f64).unwrap();
///
/// *registry.get_mut::<f64>("epoch_loss").unwrap() *= 0.5;
/// assert_eq!(*registry.get::<f64>("epoch_loss").unwrap(), 0.21);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ParameterRegistry {
    entries: IndexMap<String, Entry>,
    tags: HashSet<String>,
}

impl ParameterRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Writes
    // ─────────────────────────────────────────────────────────────────────────

    /// Stores `value` at `path`, creating intermediate nested registries.
    ///
    /// Returns the entry previously stored at that path, if any.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPath`] if `path` is malformed
    /// - [`RegistryError::NotARegistry`] if an intermediate key holds a value
    pub fn set<T: Parameter>(&mut self, path: &str, value: T) -> Result<Option<Entry>, RegistryError> {
        self.set_entry(path, Entry::Value(Box::new(value)))
    }

    /// Stores an already boxed value at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_boxed(
        &mut self,
        path: &str,
        value: Box<dyn Parameter>,
    ) -> Result<Option<Entry>, RegistryError> {
        self.set_entry(path, Entry::Value(value))
    }

    /// Stores an arbitrary entry (value or nested registry) at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`set`](Self::set).
    pub fn set_entry(&mut self, path: &str, entry: Entry) -> Result<Option<Entry>, RegistryError> {
        let keys = path::split_path(path)?;
        let (last, parents) = keys
            .split_last()
            .ok_or_else(|| RegistryError::MissingEntry(path.to_string()))?;

        let parent = self.ensure_keys(parents)?;
        Ok(parent.entries.insert((*last).to_string(), entry))
    }

    /// Returns the nested registry at `path`, creating it (and any parents)
    /// if missing.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPath`] if `path` is malformed
    /// - [`RegistryError::NotARegistry`] if any key on the way holds a value
    pub fn ensure_nested(&mut self, path: &str) -> Result<&mut ParameterRegistry, RegistryError> {
        let keys = path::split_path(path)?;
        self.ensure_keys(&keys)
    }

    fn ensure_keys(&mut self, keys: &[&str]) -> Result<&mut ParameterRegistry, RegistryError> {
        let mut current = self;
        let mut walked = String::new();
        for key in keys {
            walked = path::join(&walked, key);
            let entry = current
                .entries
                .entry((*key).to_string())
                .or_insert_with(|| Entry::Nested(ParameterRegistry::new()));
            current = match entry {
                Entry::Nested(nested) => nested,
                Entry::Value(_) => return Err(RegistryError::NotARegistry(walked)),
            };
        }
        Ok(current)
    }

    /// Removes and returns the entry at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        let keys = path::split_path(path).ok()?;
        let (last, parents) = keys.split_last()?;

        let mut current = self;
        for key in parents {
            current = match current.entries.get_mut(*key)? {
                Entry::Nested(nested) => nested,
                Entry::Value(_) => return None,
            };
        }
        current.entries.shift_remove(*last)
    }

    /// Removes every entry and tag.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.tags.clear();
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Reads
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the entry at a concrete `path`.
    #[must_use]
    pub fn get_entry(&self, path: &str) -> Option<&Entry> {
        let keys = path::split_path(path).ok()?;
        let (last, parents) = keys.split_last()?;

        let mut current = self;
        for key in parents {
            current = current.entries.get(*key)?.as_nested()?;
        }
        current.entries.get(*last)
    }

    fn get_entry_mut(&mut self, path: &str) -> Option<&mut Entry> {
        let keys = path::split_path(path).ok()?;
        let (last, parents) = keys.split_last()?;

        let mut current = self;
        for key in parents {
            current = match current.entries.get_mut(*key)? {
                Entry::Nested(nested) => nested,
                Entry::Value(_) => return None,
            };
        }
        current.entries.get_mut(*last)
    }

    /// Returns the opaque value stored at `path`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MissingEntry`] if nothing is stored at `path`
    /// - [`RegistryError::NotAValue`] if `path` holds a nested registry
    pub fn get_parameter(&self, path: &str) -> Result<&dyn Parameter, RegistryError> {
        match self.get_entry(path) {
            Some(Entry::Value(value)) => Ok(&**value),
            Some(Entry::Nested(_)) => Err(RegistryError::NotAValue(path.to_string())),
            None => Err(RegistryError::MissingEntry(path.to_string())),
        }
    }

    /// Returns a typed reference to the value at `path`.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::MissingEntry`] if nothing is stored at `path`
    /// - [`RegistryError::NotAValue`] if `path` holds a nested registry
    /// - [`RegistryError::TypeMismatch`] if the stored value is not a `T`
    pub fn get<T: Parameter>(&self, path: &str) -> Result<&T, RegistryError> {
        let value = self.get_parameter(path)?;
        value
            .downcast_ref::<T>()
            .ok_or_else(|| RegistryError::TypeMismatch {
                path: path.to_string(),
                expected: core::any::type_name::<T>(),
                found: value.parameter_type_name(),
            })
    }

    /// Returns a typed mutable reference to the value at `path`.
    ///
    /// # Errors
    ///
    /// Same as [`get`](Self::get).
    pub fn get_mut<T: Parameter>(&mut self, path: &str) -> Result<&mut T, RegistryError> {
        match self.get_entry_mut(path) {
            Some(Entry::Value(value)) => {
                let found = value.parameter_type_name();
                value
                    .downcast_mut::<T>()
                    .ok_or_else(|| RegistryError::TypeMismatch {
                        path: path.to_string(),
                        expected: core::any::type_name::<T>(),
                        found,
                    })
            }
            Some(Entry::Nested(_)) => Err(RegistryError::NotAValue(path.to_string())),
            None => Err(RegistryError::MissingEntry(path.to_string())),
        }
    }

    /// Returns `true` if an entry (value or nested) exists at `path`.
    #[must_use]
    pub fn contains(&self, path: &str) -> bool {
        self.get_entry(path).is_some()
    }

    /// Returns the nested registry at `path`, if present.
    #[must_use]
    pub fn nested(&self, path: &str) -> Option<&ParameterRegistry> {
        self.get_entry(path)?.as_nested()
    }

    /// Returns the nested registry at `path` mutably, if present.
    pub fn nested_mut(&mut self, path: &str) -> Option<&mut ParameterRegistry> {
        match self.get_entry_mut(path)? {
            Entry::Nested(nested) => Some(nested),
            Entry::Value(_) => None,
        }
    }

    /// Returns the top-level keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// Returns the number of top-level entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the registry has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tags
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a tag to this registry. Returns `&mut Self` for chaining.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> &mut Self {
        self.tags.insert(tag.into());
        self
    }

    /// Removes a tag, returning whether it was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    /// Returns `true` if this registry carries `tag`.
    #[must_use]
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Returns this registry's tags (unordered).
    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.tags.iter().map(String::as_str)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Resolves a pattern to every matching entry, in insertion order.
    ///
    /// A tag filter on the final segment matches only nested registries that
    /// carry one of the tags.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPath`] if the pattern cannot be parsed.
    /// An unmatched pattern is not an error; the result is empty.
    ///
    /// # Example
    ///
    /// ```
    /// use cadence_registry::ParameterRegistry;
    ///
    /// let mut registry = ParameterRegistry::new();
    /// registry.set("layers.a.weights", 1_u8).unwrap();
    /// registry.set("layers.b.weights", 2_u8).unwrap();
    /// registry.set("layers.b.bias", 3_u8).unwrap();
    ///
    /// let found = registry.resolve("layers.*.weights").unwrap();
    /// let paths: Vec<_> = found.iter().map(|(path, _)| path.as_str()).collect();
    /// assert_eq!(paths, ["layers.a.weights", "layers.b.weights"]);
    /// ```
    pub fn resolve(&self, pattern: &str) -> Result<Vec<(String, &Entry)>, RegistryError> {
        let pattern = PathPattern::parse(pattern)?;
        Ok(self.resolve_pattern(&pattern))
    }

    /// Resolves an already parsed pattern.
    #[must_use]
    pub fn resolve_pattern(&self, pattern: &PathPattern) -> Vec<(String, &Entry)> {
        let mut found = Vec::new();
        self.collect_matches(pattern.segments(), "", &mut found);
        found
    }

    fn collect_matches<'a>(
        &'a self,
        segments: &[Segment],
        prefix: &str,
        found: &mut Vec<(String, &'a Entry)>,
    ) {
        let Some((segment, rest)) = segments.split_first() else {
            return;
        };

        for (key, entry) in &self.entries {
            if !segment.matches_key(key) {
                continue;
            }
            if segment.has_tag_filter() && !entry.has_any_tag(&segment.tags) {
                continue;
            }

            let entry_path = path::join(prefix, key);
            if rest.is_empty() {
                found.push((entry_path, entry));
            } else if let Entry::Nested(nested) = entry {
                nested.collect_matches(rest, &entry_path, found);
            }
        }
    }

    /// Resolves a pattern to matching values only, skipping nested registries.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPath`] if the pattern cannot be parsed.
    pub fn resolve_values(&self, pattern: &str) -> Result<Vec<(String, &dyn Parameter)>, RegistryError> {
        Ok(self
            .resolve(pattern)?
            .into_iter()
            .filter_map(|(path, entry)| entry.as_value().map(|value| (path, value)))
            .collect())
    }

    /// Resolves a pattern to the concrete paths it matches.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::InvalidPath`] if the pattern cannot be parsed.
    pub fn resolve_paths(&self, pattern: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .resolve(pattern)?
            .into_iter()
            .map(|(path, _)| path)
            .collect())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Snapshots
    // ─────────────────────────────────────────────────────────────────────────

    /// Builds an independent registry holding deep copies of every entry
    /// matched by `patterns`.
    ///
    /// Tags of the nested registries on the way to each copied entry are
    /// carried over, so tag-filtered lookups behave the same on the snapshot.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::InvalidPath`] if a pattern cannot be parsed
    /// - [`RegistryError::MissingEntry`] if a pattern matches nothing
    pub fn snapshot<I, S>(&self, patterns: I) -> Result<ParameterRegistry, RegistryError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut snapshot = ParameterRegistry::new();
        snapshot.tags.clone_from(&self.tags);

        for pattern in patterns {
            let pattern = pattern.as_ref();
            let matches = self.resolve(pattern)?;
            if matches.is_empty() {
                return Err(RegistryError::MissingEntry(pattern.to_string()));
            }
            for (entry_path, entry) in matches {
                self.copy_into(&entry_path, entry, &mut snapshot)?;
            }
        }

        Ok(snapshot)
    }

    fn copy_into(
        &self,
        entry_path: &str,
        entry: &Entry,
        target: &mut ParameterRegistry,
    ) -> Result<(), RegistryError> {
        let keys = path::split_path(entry_path)?;
        let Some((last, parents)) = keys.split_last() else {
            return Ok(());
        };

        let mut source = self;
        let mut destination = target;
        for key in parents {
            source = source
                .entries
                .get(*key)
                .and_then(Entry::as_nested)
                .ok_or_else(|| RegistryError::MissingEntry(entry_path.to_string()))?;
            destination = destination.ensure_keys(&[*key])?;
            destination.tags.extend(source.tags.iter().cloned());
        }

        destination
            .entries
            .insert((*last).to_string(), entry.clone());
        Ok(())
    }
}
