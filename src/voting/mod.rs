pub mod caster;
pub mod feed;
pub mod guard;
pub mod tally;

pub use caster::{CastStrategy, VoteCaster};
pub use feed::CandidateFeed;
pub use guard::VoteGuard;
pub use tally::{build_report, Finding, Standing, TallyReport};
