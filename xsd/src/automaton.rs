//! Content-model execution. Every particle compiles to an ε-NFA
//! (after <https://www.cogsci.ed.ac.uk/~ht/XML_Europe_2003.html>);
//! validation tracks the set of reachable states, so determinism is never
//! required. Unique Particle Attribution is diagnosed by a bounded subset
//! walk at compile time and reported as a warning, not an error. The `all`
//! compositor gets a dedicated permutation matcher instead of an
//! exponential automaton.

use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use crate::error::{RefKind, SchemaError};
use crate::particle::{MaxOccurs, NamespaceConstraint, Particle, ProcessContents};
use crate::xstypes::QName;

/// What the automaton needs from the surrounding grammar set: group
/// dereferencing while compiling, substitution-group membership while
/// matching.
pub trait ParticleContext {
    fn group(&self, name: &QName) -> Option<&Particle>;
    fn substitutes(&self, candidate: &QName, head: &QName) -> bool;
}

#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    Element(QName),
    Wildcard(NamespaceConstraint, ProcessContents),
}

#[derive(Debug, Default)]
pub struct Nfa {
    start: u32,
    ends: BTreeSet<u32>,
    /// Outgoing edges per state; `None` labels an ε-transition.
    transitions: Vec<Vec<(u32, Option<Transition>)>>,
}

impl Nfa {
    fn create_state(&mut self) -> u32 {
        let state = self.transitions.len() as u32;
        self.transitions.push(Vec::new());
        state
    }

    fn add_epsilon(&mut self, from: u32, to: u32) {
        self.transitions[from as usize].push((to, None));
    }

    fn add_transition(&mut self, from: u32, to: u32, label: Transition) {
        self.transitions[from as usize].push((to, Some(label)));
    }

    /// ε-closure of a state set.
    fn closure(&self, mut states: BTreeSet<u32>) -> BTreeSet<u32> {
        let mut queue: Vec<u32> = states.iter().copied().collect();
        while let Some(state) = queue.pop() {
            for (to, label) in &self.transitions[state as usize] {
                if label.is_none() && states.insert(*to) {
                    queue.push(*to);
                }
            }
        }
        states
    }

    fn initial(&self) -> BTreeSet<u32> {
        self.closure(BTreeSet::from([self.start]))
    }

    fn is_accepting(&self, states: &BTreeSet<u32>) -> bool {
        states.iter().any(|state| self.ends.contains(state))
    }
}

/// Compiles a particle into an NFA. Group references are dereferenced
/// through `ctx`; a reference cycle or an unresolved group is a load
/// error.
pub fn compile(particle: &Particle, ctx: &dyn ParticleContext) -> Result<Nfa, SchemaError> {
    let mut nfa = Nfa::default();
    let start = nfa.create_state();
    nfa.start = start;
    let mut group_stack = Vec::new();
    let end = build_particle(particle, &mut nfa, start, ctx, &mut group_stack)?;
    nfa.ends.insert(end);
    Ok(nfa)
}

fn build_particle(
    particle: &Particle,
    nfa: &mut Nfa,
    from: u32,
    ctx: &dyn ParticleContext,
    group_stack: &mut Vec<QName>,
) -> Result<u32, SchemaError> {
    let occurs = particle.occurs();
    match occurs.max {
        MaxOccurs::Bounded(max) => {
            let exit = nfa.create_state();
            if occurs.min == 0 {
                nfa.add_epsilon(from, exit);
            }
            let mut current = from;
            for done in 1..=max {
                current = build_term(particle, nfa, current, ctx, group_stack)?;
                if done >= occurs.min {
                    nfa.add_epsilon(current, exit);
                }
            }
            Ok(exit)
        }
        MaxOccurs::Unbounded => {
            let mut current = from;
            for _ in 0..occurs.min {
                current = build_term(particle, nfa, current, ctx, group_stack)?;
            }
            let exit = nfa.create_state();
            nfa.add_epsilon(current, exit);
            let again = build_term(particle, nfa, current, ctx, group_stack)?;
            nfa.add_epsilon(again, current);
            Ok(exit)
        }
    }
}

/// One occurrence of the particle's term.
fn build_term(
    particle: &Particle,
    nfa: &mut Nfa,
    from: u32,
    ctx: &dyn ParticleContext,
    group_stack: &mut Vec<QName>,
) -> Result<u32, SchemaError> {
    match particle {
        Particle::Element { name, .. } => {
            let to = nfa.create_state();
            nfa.add_transition(from, to, Transition::Element(name.clone()));
            Ok(to)
        }
        Particle::Any {
            namespace,
            process_contents,
            ..
        } => {
            let to = nfa.create_state();
            nfa.add_transition(
                from,
                to,
                Transition::Wildcard(namespace.clone(), *process_contents),
            );
            Ok(to)
        }
        Particle::Sequence { particles, .. } => {
            let mut current = from;
            for child in particles {
                current = build_particle(child, nfa, current, ctx, group_stack)?;
            }
            Ok(current)
        }
        Particle::Choice { particles, .. } => {
            let to = nfa.create_state();
            for child in particles {
                let branch_end = build_particle(child, nfa, from, ctx, group_stack)?;
                nfa.add_epsilon(branch_end, to);
            }
            Ok(to)
        }
        Particle::All { .. } => Err(SchemaError::InvalidParticle(
            "an all group cannot be nested in a compiled content model".into(),
        )),
        Particle::Group { reference, .. } => {
            if group_stack.contains(reference) {
                return Err(SchemaError::InvalidParticle(format!(
                    "circular group reference through {reference}"
                )));
            }
            let resolved = ctx
                .group(reference)
                .ok_or_else(|| SchemaError::UnresolvedReference {
                    kind: RefKind::Group,
                    name: reference.clone(),
                })?
                .clone();
            group_stack.push(reference.clone());
            let end = build_particle(&resolved, nfa, from, ctx, group_stack)?;
            group_stack.pop();
            Ok(end)
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum StepOutcome {
    Matched,
    /// Matched only through a wildcard; the caller decides how deep to
    /// validate the subtree.
    Wildcard(ProcessContents),
    Rejected,
}

/// Executes one compiled content model against a child-element sequence.
#[derive(Clone, Debug)]
pub enum ContentMatcher {
    Nfa(NfaMatcher),
    All(AllMatcher),
}

impl ContentMatcher {
    /// Builds the matcher for a content-model particle. The `all`
    /// compositor goes to the permutation matcher, everything else through
    /// the NFA.
    pub fn for_particle(
        particle: &Particle,
        ctx: &dyn ParticleContext,
    ) -> Result<Self, SchemaError> {
        match particle {
            Particle::All { particles, min } => Ok(Self::All(AllMatcher::new(particles, *min))),
            other => {
                let nfa = compile(other, ctx)?;
                Ok(Self::Nfa(NfaMatcher::new(Rc::new(nfa))))
            }
        }
    }

    pub fn step(&mut self, name: &QName, ctx: &dyn ParticleContext) -> StepOutcome {
        match self {
            Self::Nfa(matcher) => matcher.step(name, ctx),
            Self::All(matcher) => matcher.step(name, ctx),
        }
    }

    pub fn accepts(&self) -> bool {
        match self {
            Self::Nfa(matcher) => matcher.accepts(),
            Self::All(matcher) => matcher.accepts(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NfaMatcher {
    nfa: Rc<Nfa>,
    current: BTreeSet<u32>,
}

impl NfaMatcher {
    pub fn new(nfa: Rc<Nfa>) -> Self {
        let current = nfa.initial();
        Self { nfa, current }
    }

    pub fn step(&mut self, name: &QName, ctx: &dyn ParticleContext) -> StepOutcome {
        let mut by_element = BTreeSet::new();
        let mut by_wildcard = BTreeSet::new();
        let mut process_contents = None;
        for &state in &self.current {
            for (to, label) in &self.nfa.transitions[state as usize] {
                match label {
                    Some(Transition::Element(expected)) => {
                        if expected == name || ctx.substitutes(name, expected) {
                            by_element.insert(*to);
                        }
                    }
                    Some(Transition::Wildcard(constraint, pc)) => {
                        if constraint.allows(name.namespace()) {
                            by_wildcard.insert(*to);
                            process_contents.get_or_insert(*pc);
                        }
                    }
                    None => {}
                }
            }
        }

        // An element declaration beats a wildcard for attribution.
        if !by_element.is_empty() {
            self.current = self.nfa.closure(by_element);
            StepOutcome::Matched
        } else if let Some(pc) = process_contents {
            self.current = self.nfa.closure(by_wildcard);
            StepOutcome::Wildcard(pc)
        } else {
            StepOutcome::Rejected
        }
    }

    pub fn accepts(&self) -> bool {
        self.nfa.is_accepting(&self.current)
    }
}

/// Admits any permutation of the `all` group's children, each at most
/// once.
#[derive(Clone, Debug)]
pub struct AllMatcher {
    items: Vec<AllItem>,
    group_optional: bool,
}

#[derive(Clone, Debug)]
struct AllItem {
    name: QName,
    required: bool,
    seen: bool,
}

impl AllMatcher {
    fn new(particles: &[Particle], min: u32) -> Self {
        let items = particles
            .iter()
            .filter_map(|particle| match particle {
                Particle::Element { name, occurs } => Some(AllItem {
                    name: name.clone(),
                    required: occurs.min > 0,
                    seen: false,
                }),
                _ => None,
            })
            .collect();
        Self {
            items,
            group_optional: min == 0,
        }
    }

    fn step(&mut self, name: &QName, ctx: &dyn ParticleContext) -> StepOutcome {
        for item in &mut self.items {
            if item.name == *name || ctx.substitutes(name, &item.name) {
                if item.seen {
                    return StepOutcome::Rejected;
                }
                item.seen = true;
                return StepOutcome::Matched;
            }
        }
        StepOutcome::Rejected
    }

    fn accepts(&self) -> bool {
        if self.group_optional && self.items.iter().all(|item| !item.seen) {
            return true;
        }
        self.items.iter().all(|item| item.seen || !item.required)
    }
}

/// Load-time UPA diagnosis of one content model; the permutation matcher
/// of an `all` group is unambiguous by construction.
pub fn particle_upa_ok(particle: &Particle, ctx: &dyn ParticleContext) -> bool {
    match particle {
        Particle::All { .. } => true,
        other => compile(other, ctx)
            .map(|nfa| upa_satisfied(&nfa))
            .unwrap_or(true),
    }
}

const UPA_WALK_LIMIT: usize = 4096;

/// Diagnoses Unique Particle Attribution conflicts with a subset walk:
/// a reachable macro-state with two identically-named element edges, or an
/// element edge whose namespace a sibling wildcard edge also covers, is
/// ambiguous. Never an error; the caller logs one warning per model.
pub fn upa_satisfied(nfa: &Nfa) -> bool {
    let mut seen: BTreeSet<BTreeSet<u32>> = BTreeSet::new();
    let mut queue = vec![nfa.initial()];

    while let Some(states) = queue.pop() {
        if seen.contains(&states) || seen.len() >= UPA_WALK_LIMIT {
            continue;
        }

        let mut element_edges: HashMap<&QName, Vec<u32>> = HashMap::new();
        let mut wildcard_edges: Vec<(&NamespaceConstraint, BTreeSet<u32>)> = Vec::new();
        for &state in &states {
            for (to, label) in &nfa.transitions[state as usize] {
                match label {
                    Some(Transition::Element(name)) => {
                        element_edges.entry(name).or_default().push(*to);
                    }
                    Some(Transition::Wildcard(constraint, _)) => {
                        match wildcard_edges.iter_mut().find(|(c, _)| *c == constraint) {
                            Some((_, targets)) => {
                                targets.insert(*to);
                            }
                            None => wildcard_edges.push((constraint, BTreeSet::from([*to]))),
                        }
                    }
                    None => {}
                }
            }
        }

        for (name, targets) in &element_edges {
            if targets.len() > 1 {
                return false;
            }
            if wildcard_edges
                .iter()
                .any(|(constraint, _)| constraint.allows(name.namespace()))
            {
                return false;
            }
        }

        for targets in element_edges.into_values() {
            queue.push(nfa.closure(targets.into_iter().collect()));
        }
        for (_, targets) in wildcard_edges {
            queue.push(nfa.closure(targets));
        }
        seen.insert(states);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::particle::Occurs;

    struct NoContext;

    impl ParticleContext for NoContext {
        fn group(&self, _name: &QName) -> Option<&Particle> {
            None
        }
        fn substitutes(&self, _candidate: &QName, _head: &QName) -> bool {
            false
        }
    }

    fn element(local: &str) -> Particle {
        Particle::Element {
            name: QName::unqualified(local),
            occurs: Occurs::ONE,
        }
    }

    fn element_occurs(local: &str, min: u32, max: MaxOccurs) -> Particle {
        Particle::Element {
            name: QName::unqualified(local),
            occurs: Occurs { min, max },
        }
    }

    fn run(matcher: &mut ContentMatcher, names: &[&str]) -> bool {
        for name in names {
            if matcher.step(&QName::unqualified(*name), &NoContext) != StepOutcome::Matched {
                return false;
            }
        }
        matcher.accepts()
    }

    #[test]
    fn sequence_requires_order() {
        let model = Particle::Sequence {
            particles: vec![element("a"), element("b")],
            occurs: Occurs::ONE,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(run(&mut matcher.clone(), &["a", "b"]));
        assert!(!run(&mut matcher.clone(), &["b", "a"]));
        assert!(!run(&mut matcher.clone(), &["a"]));
    }

    #[test]
    fn choice_accepts_either_branch() {
        let model = Particle::Choice {
            particles: vec![element("a"), element("b")],
            occurs: Occurs::ONE,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(run(&mut matcher.clone(), &["a"]));
        assert!(run(&mut matcher.clone(), &["b"]));
        assert!(!run(&mut matcher.clone(), &["a", "b"]));
    }

    #[test]
    fn bounded_repetition() {
        let model = Particle::Sequence {
            particles: vec![element_occurs("a", 1, MaxOccurs::Bounded(3))],
            occurs: Occurs::ONE,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(!run(&mut matcher.clone(), &[]));
        assert!(run(&mut matcher.clone(), &["a"]));
        assert!(run(&mut matcher.clone(), &["a", "a", "a"]));
        assert!(!run(&mut matcher.clone(), &["a", "a", "a", "a"]));
    }

    #[test]
    fn unbounded_repetition() {
        let model = Particle::Sequence {
            particles: vec![element_occurs("a", 2, MaxOccurs::Unbounded)],
            occurs: Occurs::ONE,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(!run(&mut matcher.clone(), &["a"]));
        assert!(run(&mut matcher.clone(), &["a", "a"]));
        assert!(run(&mut matcher.clone(), &["a", "a", "a", "a", "a"]));
    }

    #[test]
    fn optional_particle_may_be_absent() {
        let model = Particle::Sequence {
            particles: vec![element_occurs("a", 0, MaxOccurs::Bounded(1)), element("b")],
            occurs: Occurs::ONE,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(run(&mut matcher.clone(), &["b"]));
        assert!(run(&mut matcher.clone(), &["a", "b"]));
        assert!(!run(&mut matcher.clone(), &["a", "a", "b"]));
    }

    #[test]
    fn all_group_accepts_permutations() {
        let model = Particle::All {
            particles: vec![element("a"), element("b"), element_occurs("c", 0, MaxOccurs::Bounded(1))],
            min: 1,
        };
        let matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert!(run(&mut matcher.clone(), &["b", "a"]));
        assert!(run(&mut matcher.clone(), &["a", "c", "b"]));
        assert!(!run(&mut matcher.clone(), &["a"]));
        // Each child at most once.
        assert!(!run(&mut matcher.clone(), &["a", "a", "b"]));
    }

    #[test]
    fn wildcard_steps_report_process_contents() {
        let model = Particle::Sequence {
            particles: vec![Particle::Any {
                namespace: NamespaceConstraint::Any,
                process_contents: ProcessContents::Lax,
                occurs: Occurs::ONE,
            }],
            occurs: Occurs::ONE,
        };
        let mut matcher = ContentMatcher::for_particle(&model, &NoContext).unwrap();
        assert_eq!(
            matcher.step(&QName::with_namespace("http://x", "anything"), &NoContext),
            StepOutcome::Wildcard(ProcessContents::Lax)
        );
        assert!(matcher.accepts());
    }

    #[test]
    fn upa_detects_competing_particles() {
        // (a | a) is ambiguous.
        let ambiguous = compile(
            &Particle::Choice {
                particles: vec![element("a"), element("a")],
                occurs: Occurs::ONE,
            },
            &NoContext,
        )
        .unwrap();
        assert!(!upa_satisfied(&ambiguous));

        let fine = compile(
            &Particle::Sequence {
                particles: vec![element("a"), element("a")],
                occurs: Occurs::ONE,
            },
            &NoContext,
        )
        .unwrap();
        assert!(upa_satisfied(&fine));
    }
}
