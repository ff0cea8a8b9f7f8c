//! # Pipeline Assembler
//!
//! Turns the step registrations of [`PipelineSettings`] into one [`Chain`] per
//! stage. Assembly runs once per endpoint start and does not modify the
//! settings, so assembling twice from the same settings yields the same chains.
//!
//! For every stage the assembler:
//! 1. keeps the registered steps whose enable predicate holds,
//! 2. applies replacements, keeping each replaced step's id and constraints,
//! 3. allows at most one terminating step (connector or terminator) and places
//!    every other step of the stage before it,
//! 4. resolves the before/after constraints into an order,
//! 5. builds each behavior through its factory.

use std::sync::Arc;

use super::behavior::{BehaviorSlot, CompletedTerminal, StageContext, Terminal};
use super::chain::{BehaviorInstance, Chain, Pipelines};
use super::errors::PipelineConfigurationError;
use super::graph::resolve_order;
use super::settings::PipelineSettings;
use super::step::RegisterStep;
use crate::endpoint::EndpointComponents;

pub struct PipelineAssembler<'a> {
    settings: &'a PipelineSettings,
    components: &'a EndpointComponents,
}

impl<'a> PipelineAssembler<'a> {
    pub fn new(settings: &'a PipelineSettings, components: &'a EndpointComponents) -> Self {
        Self {
            settings,
            components,
        }
    }

    pub fn assemble(&self) -> Result<Pipelines, PipelineConfigurationError> {
        let steps = self.effective_steps()?;

        let pipelines = Pipelines {
            transport_receive: self.build_chain(&steps)?,
            incoming_physical: self.build_chain(&steps)?,
            incoming_logical: self.build_chain(&steps)?,
            invoke_handler: self.build_chain(&steps)?,
            outgoing_logical: self.build_chain(&steps)?,
            outgoing_physical: self.build_chain(&steps)?,
            dispatch: self.build_chain(&steps)?,
        };

        crate::log_pipeline!(info, "PIPELINES_ASSEMBLED", steps: steps.len());
        Ok(pipelines)
    }

    /// Enabled registrations with replacements applied
    fn effective_steps(&self) -> Result<Vec<RegisterStep>, PipelineConfigurationError> {
        let config = self.components.config.as_ref();
        let registered = self.settings.steps();

        for replacement in self.settings.replacements() {
            let target = registered
                .iter()
                .find(|step| step.step_id() == replacement.replace_id())
                .ok_or_else(|| PipelineConfigurationError::UnknownReplaceTarget {
                    step_id: replacement.replace_id().to_string(),
                })?;
            if target.stage() != replacement.stage() {
                return Err(PipelineConfigurationError::ReplaceStageMismatch {
                    step_id: replacement.replace_id().to_string(),
                    registered: target.stage(),
                    replacement: replacement.stage(),
                });
            }
        }

        let mut steps: Vec<RegisterStep> = registered
            .iter()
            .filter(|step| step.is_enabled(config))
            .cloned()
            .collect();

        for replacement in self.settings.replacements() {
            if let Some(step) = steps
                .iter_mut()
                .find(|step| step.step_id() == replacement.replace_id())
            {
                step.apply_replacement(replacement);
            }
        }

        Ok(steps)
    }

    fn build_chain<C: StageContext>(
        &self,
        steps: &[RegisterStep],
    ) -> Result<Chain<C>, PipelineConfigurationError> {
        let mut stage_steps: Vec<RegisterStep> = steps
            .iter()
            .filter(|step| step.stage() == C::STAGE)
            .cloned()
            .collect();

        let terminating: Vec<usize> = stage_steps
            .iter()
            .enumerate()
            .filter(|(_, step)| step.kind().is_terminating())
            .map(|(index, _)| index)
            .collect();

        match terminating.as_slice() {
            [] => {}
            [index] => {
                let terminator_id = stage_steps[*index].step_id().to_string();
                for (position, step) in stage_steps.iter_mut().enumerate() {
                    if position != *index {
                        step.push_before(terminator_id.clone(), false);
                    }
                }
            }
            _ => {
                return Err(PipelineConfigurationError::MultipleTerminatingSteps {
                    stage: C::STAGE,
                    step_ids: terminating
                        .iter()
                        .map(|index| stage_steps[*index].step_id().to_string())
                        .collect(),
                });
            }
        }

        let order = resolve_order(C::STAGE, &stage_steps)?;

        let mut behaviors = Vec::with_capacity(order.len());
        for index in order {
            let step = &stage_steps[index];
            let slot = step
                .instantiate(self.components)
                .downcast::<BehaviorSlot<C>>()
                .map_err(|_| PipelineConfigurationError::StageMismatch {
                    step_id: step.step_id().to_string(),
                    expected: C::STAGE,
                    actual: step.behavior_type().to_string(),
                })?;
            behaviors.push(BehaviorInstance::new(
                step.step_id().to_string(),
                step.kind(),
                slot.behavior,
            ));
        }

        let terminal: Arc<dyn Terminal<C>> = self
            .settings
            .terminal_for::<C>()
            .unwrap_or_else(|| Arc::new(CompletedTerminal));

        let chain = Chain::new(behaviors, terminal);
        crate::log_pipeline!(
            debug,
            "CHAIN_ASSEMBLED",
            stage: C::STAGE,
            steps: chain.step_ids()
        );
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CourierConfig;
    use crate::context::{IncomingLogicalContext, IncomingPhysicalContext};
    use crate::pipeline::{
        Behavior, Next, ProcessingResult, ReplaceStep, Stage, StageConnector, StageInvoker,
    };
    use crate::transport::InMemoryTransport;
    use async_trait::async_trait;

    #[derive(Default)]
    struct Passthrough;

    #[async_trait]
    impl Behavior<IncomingPhysicalContext> for Passthrough {
        async fn invoke(
            &self,
            context: &mut IncomingPhysicalContext,
            next: Next<'_, IncomingPhysicalContext>,
        ) -> ProcessingResult<()> {
            next.run(context).await
        }
    }

    #[derive(Default)]
    struct Other;

    #[async_trait]
    impl Behavior<IncomingPhysicalContext> for Other {
        async fn invoke(
            &self,
            context: &mut IncomingPhysicalContext,
            next: Next<'_, IncomingPhysicalContext>,
        ) -> ProcessingResult<()> {
            next.run(context).await
        }
    }

    struct ToLogical;

    #[async_trait]
    impl StageConnector<IncomingPhysicalContext, IncomingLogicalContext> for ToLogical {
        async fn invoke(
            &self,
            _context: &mut IncomingPhysicalContext,
            _stage: StageInvoker<'_, IncomingLogicalContext>,
        ) -> ProcessingResult<()> {
            Ok(())
        }
    }

    fn components(config: CourierConfig) -> EndpointComponents {
        EndpointComponents::new(config, Arc::new(InMemoryTransport::new("test")))
    }

    fn step(id: &str) -> RegisterStep {
        RegisterStep::of_type::<IncomingPhysicalContext, Passthrough>(id, "passes through")
    }

    fn connector(id: &str) -> RegisterStep {
        RegisterStep::connector::<IncomingPhysicalContext, IncomingLogicalContext, _, _>(
            id,
            "connects",
            |_| ToLogical,
        )
    }

    #[test]
    fn test_connector_is_placed_last_regardless_of_registration_order() {
        let mut settings = PipelineSettings::new();
        settings
            .register(connector("Connect"))
            .unwrap()
            .register(step("A"))
            .unwrap()
            .register(step("B").insert_before("A"))
            .unwrap();

        let components = components(CourierConfig::default());
        let pipelines = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap();
        assert_eq!(
            pipelines.step_ids(Stage::IncomingPhysical),
            vec!["B", "A", "Connect"]
        );
        assert!(pipelines.step_ids(Stage::Dispatch).is_empty());
    }

    #[test]
    fn test_two_connectors_in_one_stage_are_rejected() {
        let mut settings = PipelineSettings::new();
        settings
            .register(connector("First"))
            .unwrap()
            .register(connector("Second"))
            .unwrap();

        let components = components(CourierConfig::default());
        let err = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineConfigurationError::MultipleTerminatingSteps {
                stage: Stage::IncomingPhysical,
                step_ids: vec!["First".to_string(), "Second".to_string()],
            }
        );
    }

    #[test]
    fn test_disabled_step_is_excluded_and_soft_edges_dropped() {
        let mut settings = PipelineSettings::new();
        settings
            .register(step("Audit").enabled_when(|config| config.audit_enabled()))
            .unwrap()
            .register(step("Mutate").insert_before_if_exists("Audit"))
            .unwrap();

        let components = components(CourierConfig::default());
        let pipelines = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap();
        assert_eq!(pipelines.step_ids(Stage::IncomingPhysical), vec!["Mutate"]);
    }

    #[test]
    fn test_replacement_keeps_id_and_position() {
        let mut settings = PipelineSettings::new();
        settings
            .register(step("A"))
            .unwrap()
            .register(step("B").insert_before("A"))
            .unwrap()
            .replace(ReplaceStep::new(RegisterStep::of_type::<
                IncomingPhysicalContext,
                Other,
            >("B", "replaced")))
            .unwrap();

        let components = components(CourierConfig::default());
        let pipelines = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap();
        assert_eq!(pipelines.step_ids(Stage::IncomingPhysical), vec!["B", "A"]);
    }

    #[test]
    fn test_unknown_replacement_target_is_rejected() {
        let mut settings = PipelineSettings::new();
        settings.replace(ReplaceStep::new(step("Ghost"))).unwrap();

        let components = components(CourierConfig::default());
        let err = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap_err();
        assert_eq!(
            err,
            PipelineConfigurationError::UnknownReplaceTarget {
                step_id: "Ghost".to_string()
            }
        );
    }

    #[test]
    fn test_assembly_is_repeatable() {
        let mut settings = PipelineSettings::new();
        settings
            .register(step("A"))
            .unwrap()
            .register(step("B").insert_before("A"))
            .unwrap();

        let components = components(CourierConfig::default());
        let assembler = PipelineAssembler::new(&settings, &components);
        let first = assembler.assemble().unwrap();
        let second = assembler.assemble().unwrap();
        assert_eq!(
            first.step_ids(Stage::IncomingPhysical),
            second.step_ids(Stage::IncomingPhysical)
        );
    }

    #[test]
    fn test_replacement_predicate_does_not_override_registered_one() {
        let mut settings = PipelineSettings::new();
        settings.register(step("A")).unwrap();
        settings
            .replace(ReplaceStep::new(
                RegisterStep::of_type::<IncomingPhysicalContext, Other>("A", "other")
                    .enabled_when(|_| false),
            ))
            .unwrap();

        let components = components(CourierConfig::default());
        let pipelines = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap();
        assert_eq!(pipelines.step_ids(Stage::IncomingPhysical), vec!["A"]);
    }

    /// Context type that claims a stage owned by another context type
    struct Impostor {
        base: crate::context::BehaviorContext,
    }

    impl StageContext for Impostor {
        const STAGE: Stage = Stage::IncomingPhysical;

        fn behavior_context(&self) -> &crate::context::BehaviorContext {
            &self.base
        }

        fn chain(_pipelines: &Pipelines) -> &Chain<Self> {
            unreachable!("impostor contexts are never connected to")
        }
    }

    #[derive(Default)]
    struct ImpostorBehavior;

    #[async_trait]
    impl Behavior<Impostor> for ImpostorBehavior {
        async fn invoke(&self, context: &mut Impostor, next: Next<'_, Impostor>) -> ProcessingResult<()> {
            next.run(context).await
        }
    }

    #[test]
    fn test_behavior_built_for_another_context_type_is_a_stage_mismatch() {
        let mut settings = PipelineSettings::new();
        settings
            .register(step("A"))
            .unwrap()
            .register(RegisterStep::of_type::<Impostor, ImpostorBehavior>(
                "Impostor",
                "claims the incoming physical stage",
            ))
            .unwrap();

        let components = components(CourierConfig::default());
        let err = PipelineAssembler::new(&settings, &components)
            .assemble()
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineConfigurationError::StageMismatch { ref step_id, expected: Stage::IncomingPhysical, .. }
                if step_id == "Impostor"
        ));
    }
}
