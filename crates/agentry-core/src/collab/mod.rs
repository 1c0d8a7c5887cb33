//! Multi-agent collaboration patterns

pub mod expert;
pub mod plan;
pub mod society;

pub use expert::{
    CollaborationResult, DebateResult, DebateRound, ExpertOpinion, ExpertTeam, PanelMode,
    CONTINUE_TOPIC,
};
pub use plan::{Plan, PlanStep};
pub use society::{Society, SocietyMode};
