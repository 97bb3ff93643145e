//! Sanctioned buyer lines.
//!
//! Every line here is safe to emit in any state: none classifies as an objection, none
//! uses coverage vocabulary, none opens with rep-style phrasing and none ends on a
//! deferral filler. The tests below hold that against the built-in rule book.

use pitchsim_core::domain::Vertical;
use pitchsim_core::rules::normalize;
use rand::seq::SliceRandom;
use rand::Rng;

/// Returned before the rep has said anything.
pub const WAITING_LINE: &str = "Whenever you're ready, I'm listening.";
/// Used when the generator is unavailable or its draft was emptied.
pub const CLARIFICATION_LINE: &str = "Could you say that one more way?";
/// Used when the request body could not be read at all.
pub const RESTATE_LINE: &str = "Sorry, could you restate that?";
pub const ACCESS_TRANSITION_LINE: &str =
    "Access sounds workable from what you've said. What I'd want to understand next is impact and logistics.";
pub const ACCESS_ACKNOWLEDGED_LINE: &str =
    "Got it on access. Let's shift to which patient types you'd start first.";
pub const BUYER_ROLE_LINE: &str =
    "I'm the buyer here. Help me understand what I'll actually notice first.";
pub const REDIRECT_LINE: &str =
    "Let's skip the insurance talk. What I care about is whether this would actually work for me.";

const MOVE_ON: [&str; 3] = [
    "Alright, I'm satisfied on that point. What would you suggest as a first step?",
    "Okay, that helps. Let's talk about getting started.",
    "Got it. Why don't we move toward a small start and go from there?",
];

const CONCRETENESS: [&str; 3] = [
    "Makes sense, no need to rehash that. What would kickoff actually look like?",
    "I follow. What does the first step look like in practice?",
    "Fair enough. So how do we try this without a heavy lift?",
];

const COOPERATIVE_PHARMA: [&str; 3] = [
    "Okay, that gives me enough to try it with a couple of new patients.",
    "Good enough for me to begin with a patient or two and regroup after.",
    "That's fine. I'll try it with a patient this week and we can compare notes.",
];

const COOPERATIVE_GENERAL: [&str; 3] = [
    "Alright, that's enough for me. Let's get a small kickoff on the books.",
    "Okay, I'm good to start. What do you need from me for a light kickoff?",
    "Let's put the first step on the calendar and go from there.",
];

const ACCEPTANCE_PHARMA: [&str; 3] = [
    "Alright, I can start a couple of suitable patients this week.",
    "Okay, I'll start one or two new patients and see how they respond.",
    "Fine by me. I'm comfortable starting a couple of new patients on it.",
];

const ACCEPTANCE_GENERAL: [&str; 3] = [
    "Alright, let's put a small kickoff on the books.",
    "Okay, I'm in for a small first step. Send the paperwork over.",
    "Let's do a small first round and go from there.",
];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Rotation {
    /// Closes out a topic the buyer has already pushed on twice.
    MoveOn,
    /// Replaces a line that would repeat the previous buyer turn.
    Concreteness,
    /// Cooperation once the objection cap is spent.
    Cooperative(Vertical),
    /// Accepts the rep's close.
    Acceptance(Vertical),
}

impl Rotation {
    pub fn lines(&self) -> &'static [&'static str] {
        match self {
            Self::MoveOn => &MOVE_ON,
            Self::Concreteness => &CONCRETENESS,
            Self::Cooperative(Vertical::Pharma) => &COOPERATIVE_PHARMA,
            Self::Cooperative(_) => &COOPERATIVE_GENERAL,
            Self::Acceptance(Vertical::Pharma) => &ACCEPTANCE_PHARMA,
            Self::Acceptance(_) => &ACCEPTANCE_GENERAL,
        }
    }

    /// Picks a line at random, skipping any that matches `avoid` after normalization.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R, avoid: Option<&str>) -> &'static str {
        let lines = self.lines();
        let avoid = avoid.map(normalize);
        let candidates = lines
            .iter()
            .copied()
            .filter(|line| avoid.as_deref() != Some(normalize(line).as_str()))
            .collect::<Vec<_>>();
        let pool: &[&'static str] = if candidates.is_empty() { lines } else { &candidates };
        pool.choose(rng).copied().unwrap_or(lines[0])
    }
}

/// Deterministic acceptance used when no usable acceptance draft exists.
pub fn acceptance_line(vertical: Vertical) -> &'static str {
    Rotation::Acceptance(vertical).lines()[0]
}

/// Every rotation, for exhaustive checks.
pub fn all_rotations() -> Vec<Rotation> {
    let mut rotations = vec![Rotation::MoveOn, Rotation::Concreteness];
    for vertical in Vertical::ALL {
        rotations.push(Rotation::Cooperative(vertical));
        rotations.push(Rotation::Acceptance(vertical));
    }
    rotations
}

/// Every fixed line plus every rotation line.
pub fn sanctioned_lines() -> Vec<&'static str> {
    let mut lines = vec![
        WAITING_LINE,
        CLARIFICATION_LINE,
        RESTATE_LINE,
        ACCESS_TRANSITION_LINE,
        ACCESS_ACKNOWLEDGED_LINE,
        BUYER_ROLE_LINE,
        REDIRECT_LINE,
    ];
    for rotation in all_rotations() {
        for line in rotation.lines().iter().copied() {
            if !lines.contains(&line) {
                lines.push(line);
            }
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use pitchsim_core::classifier::classify;
    use pitchsim_core::domain::Vertical;
    use pitchsim_core::rules::{normalize, RuleBook};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::{acceptance_line, all_rotations, sanctioned_lines, Rotation};

    #[test]
    fn sanctioned_lines_are_never_objections_or_restricted() {
        let rules = RuleBook::builtin().expect("built-in rules");
        for line in sanctioned_lines() {
            let classification = classify(&rules, line);
            assert!(!classification.is_objection, "objection: {line}");
            assert!(!classification.mentions_restricted_topic, "restricted: {line}");
            assert!(!rules.is_role_leak(&normalize(line)), "role leak: {line}");
            assert_eq!(rules.strip_trailing_deferrals(line), line, "deferral: {line}");
            assert_eq!(rules.scrub_robotic_filler(line), line, "filler: {line}");
        }
    }

    #[test]
    fn pick_never_returns_the_avoided_line() {
        let mut rng = StdRng::seed_from_u64(7);
        for rotation in all_rotations() {
            for avoided in rotation.lines() {
                for _ in 0..20 {
                    let picked = rotation.pick(&mut rng, Some(avoided.to_uppercase().as_str()));
                    assert_ne!(picked, *avoided);
                    assert!(rotation.lines().contains(&picked));
                }
            }
        }
    }

    #[test]
    fn pick_reaches_every_line_of_a_rotation() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            seen.insert(Rotation::MoveOn.pick(&mut rng, None));
        }
        assert_eq!(seen.len(), Rotation::MoveOn.lines().len());
    }

    #[test]
    fn acceptance_lines_follow_vertical() {
        assert!(acceptance_line(Vertical::Pharma).contains("patients"));
        for vertical in [Vertical::B2b, Vertical::DoorToDoor, Vertical::Tech] {
            assert!(acceptance_line(vertical).contains("kickoff"));
        }
    }
}
