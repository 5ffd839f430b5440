//! Workflow step ordering, prerequisite gating, and navigation.
//!
//! Each step's unlock condition is a pure function of the project's
//! [`ArtifactSet`]; no step ever inspects job state. Navigation returns
//! an explicit [`NavOutcome`] so callers and tests can assert on a
//! rejected move instead of inferring it from the absence of a side
//! effect.

use serde::{Deserialize, Serialize};

use crate::artifacts::ArtifactSet;
use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Minimum number of screenplay variants required before the user can
/// enter the selection step.
pub const MIN_SCREENPLAY_VARIANTS: usize = 2;

// ---------------------------------------------------------------------------
// WorkflowStep
// ---------------------------------------------------------------------------

/// One step of the fixed production workflow, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowStep {
    Brief,
    Concept,
    Screenplays,
    Select,
    Storyboard,
    Production,
    Export,
}

/// All workflow steps in their fixed order.
pub const ALL_STEPS: &[WorkflowStep] = &[
    WorkflowStep::Brief,
    WorkflowStep::Concept,
    WorkflowStep::Screenplays,
    WorkflowStep::Select,
    WorkflowStep::Storyboard,
    WorkflowStep::Production,
    WorkflowStep::Export,
];

impl WorkflowStep {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Brief => "brief",
            Self::Concept => "concept",
            Self::Screenplays => "screenplays",
            Self::Select => "select",
            Self::Storyboard => "storyboard",
            Self::Production => "production",
            Self::Export => "export",
        }
    }

    /// Parse from the lowercase string used on the wire and in URLs.
    pub fn from_str_value(s: &str) -> Result<Self, CoreError> {
        match s {
            "brief" => Ok(Self::Brief),
            "concept" => Ok(Self::Concept),
            "screenplays" => Ok(Self::Screenplays),
            "select" => Ok(Self::Select),
            "storyboard" => Ok(Self::Storyboard),
            "production" => Ok(Self::Production),
            "export" => Ok(Self::Export),
            _ => Err(CoreError::Validation(format!(
                "Invalid workflow step '{s}'. Must be one of: {}",
                ALL_STEPS
                    .iter()
                    .map(|step| step.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ))),
        }
    }

    /// Whether this step is produced by a pipeline generation job.
    ///
    /// Brief is user input, select is a human decision, and export is a
    /// download — none of them submit jobs.
    pub fn is_generable(self) -> bool {
        matches!(
            self,
            Self::Concept | Self::Screenplays | Self::Storyboard | Self::Production
        )
    }
}

impl std::fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Gating
// ---------------------------------------------------------------------------

/// Whether a step is locked given the artifacts accumulated so far.
///
/// | Step        | Unlocked when                                    |
/// |-------------|--------------------------------------------------|
/// | brief       | always                                           |
/// | concept     | brief present                                    |
/// | screenplays | concept present                                  |
/// | select      | at least [`MIN_SCREENPLAY_VARIANTS`] screenplays |
/// | storyboard  | a screenplay has been selected (HITL gate)       |
/// | production  | storyboard present                               |
/// | export      | production pack present                          |
pub fn is_step_locked(artifacts: &ArtifactSet, step: WorkflowStep) -> bool {
    match step {
        WorkflowStep::Brief => false,
        WorkflowStep::Concept => artifacts.brief.is_none(),
        WorkflowStep::Screenplays => artifacts.concept.is_none(),
        WorkflowStep::Select => artifacts.screenplays.len() < MIN_SCREENPLAY_VARIANTS,
        WorkflowStep::Storyboard => artifacts.selected_screenplay.is_none(),
        WorkflowStep::Production => artifacts.storyboard.is_none(),
        WorkflowStep::Export => artifacts.production_pack.is_none(),
    }
}

/// All currently unlocked steps, in workflow order.
pub fn unlocked_steps(artifacts: &ArtifactSet) -> Vec<WorkflowStep> {
    ALL_STEPS
        .iter()
        .copied()
        .filter(|&step| !is_step_locked(artifacts, step))
        .collect()
}

// ---------------------------------------------------------------------------
// Navigation
// ---------------------------------------------------------------------------

/// Result of a navigation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavOutcome {
    /// Navigation succeeded; `current` now points at the step.
    Moved(WorkflowStep),
    /// The step is locked; `current` is unchanged.
    Locked(WorkflowStep),
}

/// Tracks which step the session is currently viewing and mediates
/// navigation requests against the gate.
#[derive(Debug, Clone)]
pub struct WorkflowNav {
    current: WorkflowStep,
}

impl WorkflowNav {
    /// Start at the brief step (always unlocked).
    pub fn new() -> Self {
        Self {
            current: WorkflowStep::Brief,
        }
    }

    pub fn current(&self) -> WorkflowStep {
        self.current
    }

    /// Attempt to navigate to a step, honoring the gate.
    pub fn navigate_to(&mut self, artifacts: &ArtifactSet, step: WorkflowStep) -> NavOutcome {
        if is_step_locked(artifacts, step) {
            return NavOutcome::Locked(step);
        }
        self.current = step;
        NavOutcome::Moved(step)
    }
}

impl Default for WorkflowNav {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Brief, Concept, ProductionPack, Screenplay, Storyboard};

    fn brief() -> Brief {
        Brief {
            platform: "instagram".into(),
            duration_secs: 30,
            budget: 50_000.0,
            location: "Lisbon".into(),
            constraints: vec![],
            creative_direction: "Fast cuts, warm light".into(),
            brand_mandatories: vec!["logo in last 2s".into()],
            target_audience: "18-34 urban".into(),
        }
    }

    fn concept() -> Concept {
        Concept {
            id: "c1".into(),
            title: "Neon Nights".into(),
            tagline: None,
            summary: "The city wakes up at dusk.".into(),
        }
    }

    fn screenplay(id: &str) -> Screenplay {
        Screenplay {
            id: id.into(),
            variant_name: format!("Variant {id}"),
            content: "FADE IN ...".into(),
            scenes: vec![],
        }
    }

    // -- Step parsing --------------------------------------------------------

    #[test]
    fn step_round_trips_through_strings() {
        for &step in ALL_STEPS {
            assert_eq!(WorkflowStep::from_str_value(step.as_str()).unwrap(), step);
        }
    }

    #[test]
    fn invalid_step_string_is_rejected() {
        assert!(WorkflowStep::from_str_value("casting").is_err());
    }

    #[test]
    fn generable_steps() {
        assert!(WorkflowStep::Concept.is_generable());
        assert!(WorkflowStep::Screenplays.is_generable());
        assert!(WorkflowStep::Storyboard.is_generable());
        assert!(WorkflowStep::Production.is_generable());
        assert!(!WorkflowStep::Brief.is_generable());
        assert!(!WorkflowStep::Select.is_generable());
        assert!(!WorkflowStep::Export.is_generable());
    }

    // -- Gating --------------------------------------------------------------

    #[test]
    fn brief_is_never_locked() {
        assert!(!is_step_locked(&ArtifactSet::default(), WorkflowStep::Brief));
    }

    #[test]
    fn everything_after_brief_is_locked_on_empty_project() {
        let set = ArtifactSet::default();
        for &step in &ALL_STEPS[1..] {
            assert!(is_step_locked(&set, step), "{step} should be locked");
        }
    }

    #[test]
    fn screenplays_locked_without_concept() {
        let set = ArtifactSet {
            brief: Some(brief()),
            ..Default::default()
        };
        assert!(is_step_locked(&set, WorkflowStep::Screenplays));
    }

    #[test]
    fn screenplays_unlocked_by_concept_regardless_of_other_fields() {
        let set = ArtifactSet {
            concept: Some(concept()),
            ..Default::default()
        };
        assert!(!is_step_locked(&set, WorkflowStep::Screenplays));
    }

    #[test]
    fn select_requires_at_least_two_variants() {
        let mut set = ArtifactSet {
            screenplays: vec![screenplay("a")],
            ..Default::default()
        };
        assert!(is_step_locked(&set, WorkflowStep::Select));

        set.screenplays.push(screenplay("b"));
        assert!(!is_step_locked(&set, WorkflowStep::Select));
    }

    #[test]
    fn storyboard_gated_on_human_selection_not_variant_count() {
        // Variants exist but none is selected: still locked.
        let mut set = ArtifactSet {
            screenplays: vec![screenplay("a"), screenplay("b")],
            ..Default::default()
        };
        assert!(is_step_locked(&set, WorkflowStep::Storyboard));

        set.selected_screenplay = Some("a".into());
        assert!(!is_step_locked(&set, WorkflowStep::Storyboard));
    }

    #[test]
    fn production_unlocked_by_storyboard() {
        let set = ArtifactSet {
            storyboard: Some(Storyboard {
                id: "sb1".into(),
                frames: vec![],
            }),
            ..Default::default()
        };
        assert!(!is_step_locked(&set, WorkflowStep::Production));
    }

    #[test]
    fn export_unlocked_by_production_pack() {
        let set = ArtifactSet {
            production_pack: Some(ProductionPack { documents: vec![] }),
            ..Default::default()
        };
        assert!(!is_step_locked(&set, WorkflowStep::Export));
    }

    #[test]
    fn unlocked_steps_on_empty_project() {
        assert_eq!(
            unlocked_steps(&ArtifactSet::default()),
            vec![WorkflowStep::Brief]
        );
    }

    // -- Navigation ----------------------------------------------------------

    #[test]
    fn navigate_to_locked_step_leaves_current_unchanged() {
        // Brief and concept only: storyboard is locked.
        let set = ArtifactSet {
            brief: Some(brief()),
            concept: Some(concept()),
            ..Default::default()
        };
        let mut nav = WorkflowNav::new();

        let outcome = nav.navigate_to(&set, WorkflowStep::Storyboard);
        assert_eq!(outcome, NavOutcome::Locked(WorkflowStep::Storyboard));
        assert_eq!(nav.current(), WorkflowStep::Brief);
    }

    #[test]
    fn navigate_to_unlocked_step_moves() {
        let set = ArtifactSet {
            brief: Some(brief()),
            ..Default::default()
        };
        let mut nav = WorkflowNav::new();

        let outcome = nav.navigate_to(&set, WorkflowStep::Concept);
        assert_eq!(outcome, NavOutcome::Moved(WorkflowStep::Concept));
        assert_eq!(nav.current(), WorkflowStep::Concept);
    }
}
