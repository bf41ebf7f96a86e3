//! One request, one linear pipeline: validate, render, generate, parse.

use crate::config::SamplingLimits;
use crate::error::Result;
use crate::llm::{Generator, SamplingOverrides, SamplingParams};
use crate::prompt::{self, GenerationResult, Request};
use std::sync::Arc;
use tracing::{debug, info};

pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    limits: SamplingLimits,
}

impl Orchestrator {
    pub fn new(generator: Arc<dyn Generator>, limits: SamplingLimits) -> Self {
        Self { generator, limits }
    }

    pub fn generator(&self) -> &dyn Generator {
        self.generator.as_ref()
    }

    /// Runs the full pipeline. Invalid input or parameters fail before the
    /// generator is called; the generator is called at most once.
    pub async fn run(
        &self,
        request: &Request,
        overrides: SamplingOverrides,
    ) -> Result<GenerationResult> {
        request.validate()?;
        let params = SamplingParams::resolve(overrides, &self.limits)?;
        let prompt = prompt::render(request)?;

        info!(
            mode = %request.mode(),
            turns = request.conversation().len(),
            temperature = params.temperature,
            max_tokens = params.max_tokens,
            "generating"
        );
        debug!(prompt_bytes = prompt.len(), "rendered prompt");

        let raw = self.generator.generate(&prompt, &params).await?;
        debug!(completion = %raw, "raw completion");

        prompt::parse(request, &raw)
    }
}
