//! # Step Declarations
//!
//! A [`RegisterStep`] names a behavior, the stage whose chain it joins, and the
//! before/after constraints that position it relative to other steps. The
//! behavior itself is built later, once per assembly, by the step's factory.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::behavior::{Behavior, BehaviorSlot, ConnectorBehavior, StageConnector, StageContext};
use super::Stage;
use crate::config::CourierConfig;
use crate::endpoint::EndpointComponents;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DependencyDirection {
    Before,
    After,
}

impl fmt::Display for DependencyDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyDirection::Before => f.write_str("before"),
            DependencyDirection::After => f.write_str("after"),
        }
    }
}

/// One positioning constraint declared by a step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Dependency {
    /// Step declaring the constraint
    pub dependant: String,
    /// Step the constraint refers to
    pub target: String,
    pub direction: DependencyDirection,
    /// Required constraints fail assembly when the target is missing; soft ones are dropped
    pub enforce: bool,
}

impl Dependency {
    pub fn new(
        dependant: impl Into<String>,
        target: impl Into<String>,
        direction: DependencyDirection,
        enforce: bool,
    ) -> Self {
        Self {
            dependant: dependant.into(),
            target: target.into(),
            direction,
            enforce,
        }
    }
}

/// How a step ends, or does not end, its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    /// Ordinary behavior that usually calls its continuation
    Behavior,
    /// Re-enters the chain of another stage instead of continuing
    Connector { next: Stage },
    /// Ends the chain without a continuation
    Terminator,
}

impl StepKind {
    pub fn is_terminating(&self) -> bool {
        !matches!(self, StepKind::Behavior)
    }
}

pub(crate) type StepFactory =
    Arc<dyn Fn(&EndpointComponents) -> Box<dyn Any + Send + Sync> + Send + Sync>;

pub type EnabledPredicate = Arc<dyn Fn(&CourierConfig) -> bool + Send + Sync>;

/// Declaration of one pipeline step
#[derive(Clone)]
pub struct RegisterStep {
    step_id: String,
    description: String,
    stage: Stage,
    kind: StepKind,
    behavior_type: &'static str,
    befores: Vec<Dependency>,
    afters: Vec<Dependency>,
    factory: StepFactory,
    enabled: Option<EnabledPredicate>,
}

impl RegisterStep {
    /// Step whose behavior is built by `factory` for every assembly
    pub fn behavior<C, B, F>(
        step_id: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) -> Self
    where
        C: StageContext,
        B: Behavior<C>,
        F: Fn(&EndpointComponents) -> B + Send + Sync + 'static,
    {
        Self::from_factory::<C>(
            step_id.into(),
            description.into(),
            StepKind::Behavior,
            std::any::type_name::<B>(),
            Arc::new(move |components| {
                Box::new(BehaviorSlot::<C>::new(Arc::new(factory(components))))
                    as Box<dyn Any + Send + Sync>
            }),
        )
    }

    /// Step whose behavior is constructed from its `Default` implementation
    pub fn of_type<C, B>(step_id: impl Into<String>, description: impl Into<String>) -> Self
    where
        C: StageContext,
        B: Behavior<C> + Default,
    {
        Self::behavior::<C, B, _>(step_id, description, |_| B::default())
    }

    /// Step sharing one pre-built behavior instance across assemblies
    pub fn instance<C, B>(
        step_id: impl Into<String>,
        description: impl Into<String>,
        behavior: B,
    ) -> Self
    where
        C: StageContext,
        B: Behavior<C>,
    {
        let shared: Arc<dyn Behavior<C>> = Arc::new(behavior);
        Self::from_factory::<C>(
            step_id.into(),
            description.into(),
            StepKind::Behavior,
            std::any::type_name::<B>(),
            Arc::new(move |_| {
                Box::new(BehaviorSlot::<C>::new(Arc::clone(&shared))) as Box<dyn Any + Send + Sync>
            }),
        )
    }

    /// Terminating step that bridges stage `A` into the chain of stage `B`
    pub fn connector<A, B, T, F>(
        step_id: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) -> Self
    where
        A: StageContext,
        B: StageContext,
        T: StageConnector<A, B>,
        F: Fn(&EndpointComponents) -> T + Send + Sync + 'static,
    {
        Self::from_factory::<A>(
            step_id.into(),
            description.into(),
            StepKind::Connector { next: B::STAGE },
            std::any::type_name::<T>(),
            Arc::new(move |components| {
                let behavior = ConnectorBehavior::<A, B, T>::new(factory(components));
                Box::new(BehaviorSlot::<A>::new(Arc::new(behavior))) as Box<dyn Any + Send + Sync>
            }),
        )
    }

    /// Terminating step that never invokes its continuation
    pub fn terminator<C, B, F>(
        step_id: impl Into<String>,
        description: impl Into<String>,
        factory: F,
    ) -> Self
    where
        C: StageContext,
        B: Behavior<C>,
        F: Fn(&EndpointComponents) -> B + Send + Sync + 'static,
    {
        let mut step = Self::behavior::<C, B, F>(step_id, description, factory);
        step.kind = StepKind::Terminator;
        step
    }

    fn from_factory<C: StageContext>(
        step_id: String,
        description: String,
        kind: StepKind,
        behavior_type: &'static str,
        factory: StepFactory,
    ) -> Self {
        Self {
            step_id,
            description,
            stage: C::STAGE,
            kind,
            behavior_type,
            befores: Vec::new(),
            afters: Vec::new(),
            factory,
            enabled: None,
        }
    }

    /// Must run before `id`; assembly fails if `id` is not registered
    pub fn insert_before(mut self, id: impl Into<String>) -> Self {
        self.push_before(id.into(), true);
        self
    }

    /// Runs before `id` when `id` is registered
    pub fn insert_before_if_exists(mut self, id: impl Into<String>) -> Self {
        self.push_before(id.into(), false);
        self
    }

    /// Must run after `id`; assembly fails if `id` is not registered
    pub fn insert_after(mut self, id: impl Into<String>) -> Self {
        self.push_after(id.into(), true);
        self
    }

    /// Runs after `id` when `id` is registered
    pub fn insert_after_if_exists(mut self, id: impl Into<String>) -> Self {
        self.push_after(id.into(), false);
        self
    }

    /// Only include this step when `predicate` holds for the endpoint configuration
    pub fn enabled_when<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&CourierConfig) -> bool + Send + Sync + 'static,
    {
        self.enabled = Some(Arc::new(predicate));
        self
    }

    pub(crate) fn push_before(&mut self, target: String, enforce: bool) {
        let dependency = Dependency::new(
            self.step_id.clone(),
            target,
            DependencyDirection::Before,
            enforce,
        );
        self.befores.push(dependency);
    }

    fn push_after(&mut self, target: String, enforce: bool) {
        let dependency = Dependency::new(
            self.step_id.clone(),
            target,
            DependencyDirection::After,
            enforce,
        );
        self.afters.push(dependency);
    }

    pub fn step_id(&self) -> &str {
        &self.step_id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn kind(&self) -> StepKind {
        self.kind
    }

    pub fn behavior_type(&self) -> &'static str {
        self.behavior_type
    }

    pub fn befores(&self) -> &[Dependency] {
        &self.befores
    }

    pub fn afters(&self) -> &[Dependency] {
        &self.afters
    }

    pub fn is_enabled(&self, config: &CourierConfig) -> bool {
        self.enabled
            .as_ref()
            .map_or(true, |predicate| predicate(config))
    }

    pub(crate) fn instantiate(&self, components: &EndpointComponents) -> Box<dyn Any + Send + Sync> {
        (self.factory)(components)
    }

    /// Swap in the behavior of `replacement`, keeping this step's id and constraints
    ///
    /// The enable predicate also stays with the registered step; one declared on
    /// the replacement is ignored.
    pub(crate) fn apply_replacement(&mut self, replacement: &ReplaceStep) {
        let with = &replacement.with;
        self.factory = Arc::clone(&with.factory);
        self.kind = with.kind;
        self.behavior_type = with.behavior_type;
        if let Some(description) = &replacement.description {
            self.description = description.clone();
        }
    }
}

impl fmt::Debug for RegisterStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) [{}] - {}",
            self.step_id, self.behavior_type, self.stage, self.description
        )
    }
}

/// Replacement of the behavior behind an already registered step id
#[derive(Clone)]
pub struct ReplaceStep {
    with: RegisterStep,
    description: Option<String>,
}

impl ReplaceStep {
    /// Replace the step whose id matches `with.step_id()`
    ///
    /// Constraints and the enable predicate declared on `with` are ignored; the
    /// registered step keeps its own.
    pub fn new(with: RegisterStep) -> Self {
        Self {
            with,
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn replace_id(&self) -> &str {
        self.with.step_id()
    }

    pub fn stage(&self) -> Stage {
        self.with.stage()
    }
}

impl fmt::Debug for ReplaceStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplaceStep")
            .field("replace_id", &self.with.step_id)
            .field("behavior_type", &self.with.behavior_type)
            .finish()
    }
}
