//! Plugin registry.
//!
//! Owns every registered [`PluginDescriptor`] and, through them, their
//! classes. Classes are addressed by [`ClassId`]; a parent link is a plain id,
//! so the class graph stays a tree that can only point upwards.

use crate::class::{
    ClassDescriptor, ClassId, MethodCallback, MethodDescriptor, MethodKind, PluginId,
};
use crate::error::{AbiError, AbiResult};
use crate::value::ObjectRef;
use tracing::debug;

/// Maximum number of plugins a registry accepts.
pub const MAX_PLUGINS: usize = 1024;

/// A registered plugin and the classes it defines.
#[derive(Debug, Clone)]
pub struct PluginDescriptor {
    name: String,
    version: String,
    classes: Vec<ClassDescriptor>,
}

impl PluginDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn classes(&self) -> &[ClassDescriptor] {
        &self.classes
    }
}

/// Registry of plugins and their classes.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginDescriptor>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin. The collection only grows, up to [`MAX_PLUGINS`].
    pub fn register_plugin(
        &mut self,
        name: impl Into<String>,
        version: impl Into<String>,
    ) -> AbiResult<PluginId> {
        if self.plugins.len() >= MAX_PLUGINS {
            return Err(AbiError::CapacityExceeded {
                what: "plugin registry",
                max: MAX_PLUGINS,
            });
        }

        let plugin = PluginDescriptor {
            name: name.into(),
            version: version.into(),
            classes: Vec::new(),
        };
        debug!("Plugin {} ({}) registered.", plugin.name, plugin.version);

        self.plugins.push(plugin);
        Ok(PluginId(self.plugins.len() - 1))
    }

    /// Get the number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn plugin(&self, id: PluginId) -> Option<&PluginDescriptor> {
        self.plugins.get(id.0)
    }

    pub fn plugins(&self) -> impl Iterator<Item = (PluginId, &PluginDescriptor)> {
        self.plugins
            .iter()
            .enumerate()
            .map(|(i, p)| (PluginId(i), p))
    }

    /// Define a class owned by `plugin`, optionally deriving from `parent`.
    ///
    /// The class starts with empty method tables and no instances.
    pub fn define_class(
        &mut self,
        plugin: PluginId,
        name: impl Into<String>,
        parent: Option<ClassId>,
    ) -> AbiResult<ClassId> {
        if let Some(parent) = parent {
            self.class(parent)
                .ok_or_else(|| AbiError::NotFound(format!("parent class {:?}", parent)))?;
        }

        let descriptor = self
            .plugins
            .get_mut(plugin.0)
            .ok_or_else(|| AbiError::NotFound(format!("plugin {:?}", plugin)))?;

        let class = ClassDescriptor::new(name, parent);
        debug!(
            "Defining class {} for plugin {}",
            class.name(),
            descriptor.name
        );

        descriptor.classes.push(class);
        Ok(ClassId {
            plugin,
            index: descriptor.classes.len() - 1,
        })
    }

    pub fn class(&self, id: ClassId) -> Option<&ClassDescriptor> {
        self.plugins.get(id.plugin.0)?.classes.get(id.index)
    }

    fn class_mut(&mut self, id: ClassId) -> AbiResult<&mut ClassDescriptor> {
        self.plugins
            .get_mut(id.plugin.0)
            .and_then(|p| p.classes.get_mut(id.index))
            .ok_or_else(|| AbiError::NotFound(format!("class {:?}", id)))
    }

    /// Find a class of `plugin` by name.
    pub fn find_class(&self, plugin: PluginId, name: &str) -> Option<ClassId> {
        self.plugin(plugin)?
            .classes
            .iter()
            .position(|c| c.name() == name)
            .map(|index| ClassId { plugin, index })
    }

    /// Register a class method.
    pub fn define_class_method(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        arity: usize,
        callback: MethodCallback,
    ) -> AbiResult<&MethodDescriptor> {
        self.define_method(class, MethodKind::Class, name.into(), arity, callback)
    }

    /// Register an instance method.
    pub fn define_instance_method(
        &mut self,
        class: ClassId,
        name: impl Into<String>,
        arity: usize,
        callback: MethodCallback,
    ) -> AbiResult<&MethodDescriptor> {
        self.define_method(class, MethodKind::Instance, name.into(), arity, callback)
    }

    fn define_method(
        &mut self,
        class: ClassId,
        kind: MethodKind,
        name: String,
        arity: usize,
        callback: MethodCallback,
    ) -> AbiResult<&MethodDescriptor> {
        let descriptor = self.class_mut(class)?;
        let table = match kind {
            MethodKind::Class => &mut descriptor.class_methods,
            MethodKind::Instance => &mut descriptor.instance_methods,
        };

        debug!("Defining {:?} method {} ({} params)", kind, name, arity);

        let method = MethodDescriptor::new(name.clone(), arity, kind, callback);
        table.insert(name.clone(), method);
        Ok(&table[&name])
    }

    /// Record an instance of `class`.
    pub fn add_instance(&mut self, class: ClassId, object: ObjectRef) -> AbiResult<()> {
        self.class_mut(class)?.instances.push(object);
        Ok(())
    }

    /// Iterate over `class` and its ancestors, nearest first.
    pub fn ancestors(&self, class: ClassId) -> Ancestors<'_> {
        Ancestors {
            registry: self,
            next: Some(class),
        }
    }

    /// Resolve an instance method along the parent chain.
    pub fn find_instance_method(&self, class: ClassId, name: &str) -> Option<&MethodDescriptor> {
        self.ancestors(class)
            .find_map(|(_, c)| c.instance_method(name))
    }

    /// Resolve a class method along the parent chain.
    pub fn find_class_method(&self, class: ClassId, name: &str) -> Option<&MethodDescriptor> {
        self.ancestors(class).find_map(|(_, c)| c.class_method(name))
    }
}

/// Iterator over a class and its ancestors.
pub struct Ancestors<'a> {
    registry: &'a PluginRegistry,
    next: Option<ClassId>,
}

impl<'a> Iterator for Ancestors<'a> {
    type Item = (ClassId, &'a ClassDescriptor);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let class = self.registry.class(id)?;
        self.next = class.parent();
        Some((id, class))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::ParameterRecord;
    use crate::status::Status;
    use crate::value::Value;
    use std::sync::Arc;

    fn returns(value: i32) -> MethodCallback {
        Arc::new(move |record: &mut ParameterRecord| {
            match record.write_return(Value::Integer(value)) {
                Ok(()) => Status::OK,
                Err(_) => Status::FAILED,
            }
        })
    }

    #[test]
    fn test_register_plugin() {
        let mut registry = PluginRegistry::new();
        let id = registry.register_plugin("math", "1.0").unwrap();

        let plugin = registry.plugin(id).unwrap();
        assert_eq!(plugin.name(), "math");
        assert_eq!(plugin.version(), "1.0");
        assert!(plugin.classes().is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_plugin_limit() {
        let mut registry = PluginRegistry::new();
        for i in 0..MAX_PLUGINS {
            registry.register_plugin(format!("p{}", i), "1").unwrap();
        }
        assert!(matches!(
            registry.register_plugin("overflow", "1"),
            Err(AbiError::CapacityExceeded { .. })
        ));
        assert_eq!(registry.len(), MAX_PLUGINS);
    }

    #[test]
    fn test_define_class_starts_empty() {
        let mut registry = PluginRegistry::new();
        let plugin = registry.register_plugin("p", "1").unwrap();
        let class = registry.define_class(plugin, "Vector", None).unwrap();

        let descriptor = registry.class(class).unwrap();
        assert_eq!(descriptor.name(), "Vector");
        assert!(descriptor.parent().is_none());
        assert_eq!(descriptor.instance_methods().count(), 0);
        assert_eq!(descriptor.class_methods().count(), 0);
        assert!(descriptor.instances().is_empty());
        assert_eq!(registry.find_class(plugin, "Vector"), Some(class));
    }

    #[test]
    fn test_unknown_parent() {
        let mut registry = PluginRegistry::new();
        let plugin = registry.register_plugin("p", "1").unwrap();
        let bogus = ClassId { plugin, index: 9 };
        assert!(matches!(
            registry.define_class(plugin, "Child", Some(bogus)),
            Err(AbiError::NotFound(_))
        ));
    }

    #[test]
    fn test_method_resolution_along_parent_chain() {
        let mut registry = PluginRegistry::new();
        let plugin = registry.register_plugin("p", "1").unwrap();
        let base = registry.define_class(plugin, "Base", None).unwrap();
        let child = registry.define_class(plugin, "Child", Some(base)).unwrap();

        registry
            .define_instance_method(base, "id", 0, returns(1))
            .unwrap();
        registry
            .define_instance_method(base, "kind", 0, returns(10))
            .unwrap();
        registry
            .define_instance_method(child, "kind", 0, returns(20))
            .unwrap();
        registry
            .define_class_method(base, "create", 0, returns(99))
            .unwrap();

        let names: Vec<&str> = registry.ancestors(child).map(|(_, c)| c.name()).collect();
        assert_eq!(names, vec!["Child", "Base"]);

        let kind = registry.find_instance_method(child, "kind").unwrap();
        assert_eq!(kind.invoke(vec![]).unwrap(), Value::Integer(20));

        let id = registry.find_instance_method(child, "id").unwrap();
        assert_eq!(id.invoke(vec![]).unwrap(), Value::Integer(1));

        let create = registry.find_class_method(child, "create").unwrap();
        assert_eq!(create.kind(), MethodKind::Class);
        assert!(registry.find_instance_method(child, "create").is_none());
    }

    #[test]
    fn test_add_instance() {
        let mut registry = PluginRegistry::new();
        let plugin = registry.register_plugin("p", "1").unwrap();
        let class = registry.define_class(plugin, "Thing", None).unwrap();

        let object = ObjectRef::new(0x40 as *mut _);
        registry.add_instance(class, object).unwrap();
        assert_eq!(registry.class(class).unwrap().instances(), &[object]);
    }
}
