//! Project artifact types and the accumulated artifact set.
//!
//! Artifacts are the creative outputs a project collects as it moves
//! through the workflow (brief, concept, screenplay variants, storyboard,
//! production pack). The gating logic in [`crate::workflow`] reads only
//! their presence; callers own all mutation.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Brief
// ---------------------------------------------------------------------------

/// The client brief a project starts from.
///
/// Submitted by the user, never generated. Its presence unlocks concept
/// generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Brief {
    /// Target platform, e.g. `"instagram"` or `"tv"`.
    pub platform: String,
    /// Desired spot length in seconds.
    pub duration_secs: u32,
    /// Total budget in currency units.
    pub budget: f64,
    /// Shooting location or market.
    pub location: String,
    /// Hard constraints the creative must respect.
    #[serde(default)]
    pub constraints: Vec<String>,
    /// Free-form creative direction from the client.
    pub creative_direction: String,
    /// Brand elements that must appear.
    #[serde(default)]
    pub brand_mandatories: Vec<String>,
    pub target_audience: String,
}

// ---------------------------------------------------------------------------
// Generated artifacts
// ---------------------------------------------------------------------------

/// A generated creative concept.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Concept {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub tagline: Option<String>,
    pub summary: String,
}

/// One scene within a screenplay variant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_number: u32,
    pub description: String,
    #[serde(default)]
    pub duration_secs: Option<f64>,
}

/// A generated screenplay variant.
///
/// The pipeline produces several variants per concept; the user selects
/// one before storyboarding (the human-in-the-loop gate).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screenplay {
    pub id: String,
    /// Display name of the variant, e.g. `"Variant A"`.
    pub variant_name: String,
    /// Full screenplay text.
    pub content: String,
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

/// One frame of a storyboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryboardFrame {
    pub scene_number: u32,
    pub shot_description: String,
    #[serde(default)]
    pub image_prompt: Option<String>,
}

/// A generated storyboard for the selected screenplay.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Storyboard {
    pub id: String,
    #[serde(default)]
    pub frames: Vec<StoryboardFrame>,
}

/// A single production document (schedule, budget, locations, crew &
/// gear, risk register, legal clearance).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionDocument {
    pub name: String,
    pub content: String,
}

/// The full set of production documents for a project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductionPack {
    pub documents: Vec<ProductionDocument>,
}

// ---------------------------------------------------------------------------
// Partial artifacts (streamed mid-generation)
// ---------------------------------------------------------------------------

/// A partial result streamed while a job is still running.
///
/// The wire shape is `{"type": "<kind>", "data": {...}}`; deserialization
/// validates the payload against the declared kind at the boundary, so
/// downstream code never handles untyped JSON. Later partials replace
/// earlier ones wholesale — each payload is authoritative, not a delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum PartialArtifact {
    Concept(Concept),
    Screenplay(Screenplay),
    Scene(Scene),
    Document(ProductionDocument),
}

impl PartialArtifact {
    /// The declared kind string, matching the wire `type` field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Concept(_) => "concept",
            Self::Screenplay(_) => "screenplay",
            Self::Scene(_) => "scene",
            Self::Document(_) => "document",
        }
    }
}

// ---------------------------------------------------------------------------
// Artifact set
// ---------------------------------------------------------------------------

/// Everything a project has accumulated so far.
///
/// Field presence is the sole input to workflow gating. The tracking
/// subsystem only reads this; the caller merges completed results in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtifactSet {
    pub brief: Option<Brief>,
    pub concept: Option<Concept>,
    #[serde(default)]
    pub screenplays: Vec<Screenplay>,
    /// ID of the screenplay variant the user picked.
    pub selected_screenplay: Option<String>,
    pub storyboard: Option<Storyboard>,
    pub production_pack: Option<ProductionPack>,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
