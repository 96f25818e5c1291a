//! Context signal (spec §4.10: weight 0.15, rule-based) — maps a
//! `(subject_type, object_type)` pair to a likely verb type with a
//! built-in prior, e.g. `Person → Organization ⇒ employed_by` prior 0.75.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::types::{NounType, VerbType};

static PRIORS: Lazy<HashMap<(NounType, NounType), (VerbType, f32)>> = Lazy::new(|| {
    use NounType::*;
    HashMap::from([
        ((Person, Organization), (VerbType::EmployedBy, 0.75)),
        ((Organization, Person), (VerbType::Employs, 0.75)),
        ((Person, Person), (VerbType::AssociatedWith, 0.55)),
        ((Organization, Organization), (VerbType::PartnersWith, 0.55)),
        ((Organization, Location), (VerbType::LocatedIn, 0.70)),
        ((Person, Location), (VerbType::LocatedIn, 0.60)),
        ((Document, Person), (VerbType::AuthoredBy, 0.65)),
        ((Person, Document), (VerbType::Creates, 0.60)),
        ((Document, Document), (VerbType::References, 0.55)),
        ((Project, Person), (VerbType::ManagedBy, 0.60)),
        ((Person, Project), (VerbType::Manages, 0.60)),
        ((Asset, Organization), (VerbType::OwnedBy, 0.70)),
        ((Organization, Asset), (VerbType::Owns, 0.70)),
        ((Account, Person), (VerbType::HeldBy, 0.70)),
        ((Person, Account), (VerbType::Holds, 0.70)),
        ((Transaction, Account), (VerbType::ResultsIn, 0.45)),
        ((Event, Event), (VerbType::Precedes, 0.45)),
        ((Risk, Control), (VerbType::MustComplyWith, 0.50)),
        ((Claim, Evidence), (VerbType::References, 0.55)),
        ((Model, Dataset), (VerbType::Depends, 0.55)),
        ((Service, System), (VerbType::ComponentOf, 0.55)),
        ((Device, Sensor), (VerbType::Contains, 0.50)),
        ((Topic, Category), (VerbType::ClassifiedAs, 0.55)),
        ((Message, Conversation), (VerbType::PartOf, 0.65)),
        ((Email, Person), (VerbType::AuthoredBy, 0.55)),
        ((Meeting, Person), (VerbType::References, 0.40)),
        ((Decision, Risk), (VerbType::CausedBy, 0.40)),
        ((Policy, Regulation), (VerbType::MustComplyWith, 0.60)),
        ((Instrument, Currency), (VerbType::References, 0.40)),
    ])
});

/// Looks up the built-in prior for an ordered `(subject_type, object_type)`
/// pair. Returns `None` when no prior is registered for that pair, rather
/// than a weak default guess — the ensemble treats that as a null vote.
pub fn classify(subject_type: NounType, object_type: NounType) -> Option<(VerbType, f32)> {
    PRIORS.get(&(subject_type, object_type)).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_to_organization_prior_matches_spec_example() {
        let (verb_type, confidence) = classify(NounType::Person, NounType::Organization).unwrap();
        assert_eq!(verb_type, VerbType::EmployedBy);
        assert_eq!(confidence, 0.75);
    }

    #[test]
    fn unregistered_pair_returns_none() {
        assert_eq!(classify(NounType::Currency, NounType::Sensor), None);
    }
}
