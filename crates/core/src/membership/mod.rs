pub mod engine;
pub mod states;

pub use engine::MembershipMachine;
pub use states::{
    MembershipAction, MembershipContext, MembershipEvent, MembershipState, TransitionOutcome,
};
