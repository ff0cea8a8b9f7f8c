//! Mutable step registrations collected while an endpoint is configured.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use super::behavior::{StageContext, Terminal, TerminalSlot};
use super::errors::PipelineConfigurationError;
use super::step::{RegisterStep, ReplaceStep};
use super::Stage;

#[derive(Default)]
pub struct PipelineSettings {
    steps: Vec<RegisterStep>,
    replacements: Vec<ReplaceStep>,
    terminals: HashMap<Stage, Arc<dyn Any + Send + Sync>>,
}

impl PipelineSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a step; ids are unique across every stage
    pub fn register(&mut self, step: RegisterStep) -> Result<&mut Self, PipelineConfigurationError> {
        validate_registration(&step)?;
        if self.contains(step.step_id()) {
            return Err(PipelineConfigurationError::duplicate_step(step.step_id()));
        }

        crate::log_pipeline!(
            debug,
            "STEP_REGISTERED",
            step_id: step.step_id(),
            stage: step.stage(),
            behavior_type: step.behavior_type()
        );
        self.steps.push(step);
        Ok(self)
    }

    /// Replace the behavior of a registered step
    ///
    /// The target is checked at assembly, so replacements may be declared
    /// before the step they replace. A later replacement of the same id wins.
    pub fn replace(&mut self, replacement: ReplaceStep) -> Result<&mut Self, PipelineConfigurationError> {
        if replacement.replace_id().trim().is_empty() {
            return Err(PipelineConfigurationError::invalid_step(
                replacement.replace_id(),
                "replacement step id must not be empty",
            ));
        }
        self.replacements.push(replacement);
        Ok(self)
    }

    /// Set what runs after the last behavior of the stage owning `C`
    pub fn set_terminal<C, T>(&mut self, terminal: T) -> &mut Self
    where
        C: StageContext,
        T: Terminal<C>,
    {
        let slot = TerminalSlot::<C> {
            terminal: Arc::new(terminal),
        };
        self.terminals.insert(C::STAGE, Arc::new(slot));
        self
    }

    pub fn contains(&self, step_id: &str) -> bool {
        self.steps.iter().any(|step| step.step_id() == step_id)
    }

    pub fn steps(&self) -> &[RegisterStep] {
        &self.steps
    }

    pub fn replacements(&self) -> &[ReplaceStep] {
        &self.replacements
    }

    pub(crate) fn terminal_for<C: StageContext>(&self) -> Option<Arc<dyn Terminal<C>>> {
        self.terminals
            .get(&C::STAGE)?
            .downcast_ref::<TerminalSlot<C>>()
            .map(|slot| Arc::clone(&slot.terminal))
    }
}

impl std::fmt::Debug for PipelineSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineSettings")
            .field("steps", &self.steps)
            .field("replacements", &self.replacements)
            .field("terminal_stages", &self.terminals.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn validate_registration(step: &RegisterStep) -> Result<(), PipelineConfigurationError> {
    if step.step_id().trim().is_empty() {
        return Err(PipelineConfigurationError::invalid_step(
            step.step_id(),
            "step id must not be empty",
        ));
    }
    if step.description().trim().is_empty() {
        return Err(PipelineConfigurationError::invalid_step(
            step.step_id(),
            "step description must not be empty",
        ));
    }
    if let Some(dependency) = step
        .befores()
        .iter()
        .chain(step.afters())
        .find(|dependency| dependency.target.trim().is_empty())
    {
        return Err(PipelineConfigurationError::invalid_step(
            step.step_id(),
            format!("{} constraint must name a step", dependency.direction),
        ));
    }
    Ok(())
}
