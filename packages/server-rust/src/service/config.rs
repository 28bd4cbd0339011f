use osapi_core::CollectionDefaults;

/// Registry-level configuration.
///
/// Controls paging defaults handed to every request item and whether the
/// built-in `system` service is registered.
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Page size used when a request omits `count`.
    pub default_count: u32,
    /// Offset used when a request omits `startIndex`.
    pub default_start_index: u32,
    /// Upper bound for `count`. Zero disables the clamp.
    pub max_count: u32,
    /// Register `system.listMethods` alongside the user services.
    pub expose_system_service: bool,
}

impl RegistryConfig {
    #[must_use]
    pub fn collection_defaults(&self) -> CollectionDefaults {
        CollectionDefaults {
            start_index: self.default_start_index,
            count: self.default_count,
            max_count: self.max_count,
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_count: 20,
            default_start_index: 0,
            max_count: 0,
            expose_system_service: true,
        }
    }
}
