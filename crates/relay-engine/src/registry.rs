use std::collections::HashMap;

use relay_core::tools::ToolDescriptor;

#[derive(Clone, Debug, thiserror::Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("duplicate tool: {0}")]
    DuplicateTool(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

/// Process-wide roster of callable tools. Populated once at startup and
/// shared read-only across all sessions; `list()` preserves registration
/// order for presentation to the model.
pub struct ToolRegistry {
    tools: Vec<ToolDescriptor>,
    index: HashMap<String, usize>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn register(&mut self, descriptor: ToolDescriptor) -> Result<(), RegistryError> {
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateTool(descriptor.name));
        }
        self.index
            .insert(descriptor.name.clone(), self.tools.len());
        self.tools.push(descriptor);
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&ToolDescriptor, RegistryError> {
        self.index
            .get(name)
            .map(|&i| &self.tools[i])
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// All descriptors in registration order.
    pub fn list(&self) -> &[ToolDescriptor] {
        &self.tools
    }

    pub fn count(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::tools::ParamKind;

    fn descriptor(name: &str) -> ToolDescriptor {
        ToolDescriptor::new(name, "test tool").with_param("arg", ParamKind::String, true)
    }

    #[test]
    fn register_and_lookup() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("weather")).unwrap();

        assert!(registry.contains("weather"));
        assert!(!registry.contains("calendar"));
        assert_eq!(registry.count(), 1);
        assert_eq!(registry.lookup("weather").unwrap().name, "weather");
    }

    #[test]
    fn duplicate_rejected() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("weather")).unwrap();
        let err = registry.register(descriptor("weather")).unwrap_err();
        assert_eq!(err, RegistryError::DuplicateTool("weather".into()));
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn unknown_lookup_fails() {
        let registry = ToolRegistry::new();
        let err = registry.lookup("weather").unwrap_err();
        assert_eq!(err, RegistryError::UnknownTool("weather".into()));
    }

    #[test]
    fn list_preserves_registration_order() {
        let mut registry = ToolRegistry::new();
        registry.register(descriptor("weather")).unwrap();
        registry.register(descriptor("calendar")).unwrap();
        registry.register(descriptor("alarm")).unwrap();

        let names: Vec<&str> = registry.list().iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["weather", "calendar", "alarm"]);
    }
}
