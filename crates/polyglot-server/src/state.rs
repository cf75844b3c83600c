use polyglot_core::{GlobalConfig, TranslationService};

/// Global application state: the dispatcher over the loaded configuration.
///
/// The adapter cache lives inside the service's registry; everything here is
/// shared immutably across request handlers.
pub struct AppState {
    pub service: TranslationService,
}

impl AppState {
    pub fn new(config: GlobalConfig) -> polyglot_core::Result<Self> {
        Ok(Self {
            service: TranslationService::new(config)?,
        })
    }
}
