//! One projection per event family. Each struct is registered once per
//! event type with the matching op.

mod challenge;
mod club;
mod run;
mod template;
mod user;

pub use challenge::{ChallengeOp, ChallengeProjection};
pub use club::{ClubOp, ClubProjection};
pub use run::{RunOp, RunProjection};
pub use template::{TemplateOp, TemplateProjection};
pub use user::{UserOp, UserProjection};
