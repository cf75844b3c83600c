use async_trait::async_trait;

use super::{AdapterContext, TranslationAdapter};
use crate::error::Result;
use crate::params::Params;

const DEFAULT_RESPONSE: &str = "OK: dummy translation";

/// Adapter that returns a fixed configured string regardless of input.
///
/// Used for health checks and wiring tests: it exercises the whole
/// config -> registry -> dispatcher path without touching any model.
#[derive(Debug)]
pub struct DummyAdapter {
    fixed_response: String,
}

impl DummyAdapter {
    pub fn new(ctx: &AdapterContext) -> Self {
        let fixed_response = ctx
            .params
            .get_str("fixed_response")
            .unwrap_or(DEFAULT_RESPONSE)
            .to_string();
        Self { fixed_response }
    }
}

#[async_trait]
impl TranslationAdapter for DummyAdapter {
    fn kind(&self) -> &'static str {
        super::DUMMY_KIND
    }

    async fn setup(&mut self) -> Result<()> {
        Ok(())
    }

    async fn translate(&self, _text: &str, params: &Params) -> Result<String> {
        // A request-level override wins, mirroring every other parameter.
        let fixed = params
            .get_str("fixed_response")
            .unwrap_or(&self.fixed_response);
        Ok(fixed.to_string())
    }
}
