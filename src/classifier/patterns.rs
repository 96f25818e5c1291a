//! Pattern signal (spec §4.10: weight 0.30, deterministic) — ~60 compiled
//! regex rules grouped into the 13 verb-type families, each carrying a
//! built-in confidence. The first family (in listed order) with a match at
//! or above the ensemble's `min_confidence` wins within this signal.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::VerbType;

pub struct PatternRule {
    pub regex: Regex,
    pub verb_type: VerbType,
    pub confidence: f32,
}

struct Family {
    rules: Vec<PatternRule>,
}

fn rule(pattern: &str, verb_type: VerbType, confidence: f32) -> PatternRule {
    PatternRule {
        regex: Regex::new(pattern).unwrap_or_else(|e| panic!("invalid pattern {pattern:?}: {e}")),
        verb_type,
        confidence,
    }
}

static FAMILIES: Lazy<Vec<Family>> = Lazy::new(|| {
    vec![
        // creation
        Family {
            rules: vec![
                rule(r"(?i)\bcreated\s+by\b", VerbType::CreatedBy, 0.90),
                rule(r"(?i)\b(created|authored|wrote)\b", VerbType::Creates, 0.85),
                rule(r"(?i)\bauthored\s+by\b", VerbType::AuthoredBy, 0.90),
                rule(r"(?i)\bproduced\s+by\b", VerbType::ProducedBy, 0.85),
                rule(r"(?i)\b(produces|manufactures)\b", VerbType::Produces, 0.80),
                rule(r"(?i)\bgenerated\s+by\b", VerbType::GeneratedBy, 0.85),
                rule(r"(?i)\b(originates\s+from|originated\s+from)\b", VerbType::Originates, 0.75),
            ],
        },
        // ownership
        Family {
            rules: vec![
                rule(r"(?i)\bowned\s+by\b", VerbType::OwnedBy, 0.90),
                rule(r"(?i)\bowns\b", VerbType::Owns, 0.88),
                rule(r"(?i)\bcontrolled\s+by\b", VerbType::ControlledBy, 0.85),
                rule(r"(?i)\bcontrols\b", VerbType::Controls, 0.82),
                rule(r"(?i)\bheld\s+by\b", VerbType::HeldBy, 0.80),
                rule(r"(?i)\bmanages\b", VerbType::Manages, 0.78),
                rule(r"(?i)\binvests?\s+in\b", VerbType::InvestsIn, 0.80),
            ],
        },
        // part-whole
        Family {
            rules: vec![
                rule(r"(?i)\bpart\s+of\b", VerbType::PartOf, 0.90),
                rule(r"(?i)\bbelongs?\s+to\b", VerbType::BelongsTo, 0.85),
                rule(r"(?i)\bcontains\b", VerbType::Contains, 0.80),
                rule(r"(?i)\bmember\s+of\b", VerbType::MemberOf, 0.88),
                rule(r"(?i)\bsubsidiary\s+of\b", VerbType::SubsidiaryOf, 0.92),
                rule(r"(?i)\bparent\s+(company\s+)?of\b", VerbType::ParentOf, 0.85),
                rule(r"(?i)\bcomponent\s+of\b", VerbType::ComponentOf, 0.78),
            ],
        },
        // location
        Family {
            rules: vec![
                rule(r"(?i)\blocated\s+(at|in)\b", VerbType::LocatedIn, 0.88),
                rule(r"(?i)\bheadquartered\s+in\b", VerbType::LocatedIn, 0.88),
                rule(r"(?i)\bhosted\s+by\b", VerbType::HostedBy, 0.82),
                rule(r"(?i)\bhosts\b", VerbType::Hosts, 0.75),
                rule(r"(?i)\bborders\b", VerbType::Borders, 0.80),
                rule(r"(?i)\bnear(by|\s+to)?\b", VerbType::NearTo, 0.65),
                rule(r"(?i)\bwithin\s+the\s+region\s+of\b", VerbType::WithinRegion, 0.78),
            ],
        },
        // organizational
        Family {
            rules: vec![
                rule(r"(?i)\bemployed\s+by\b", VerbType::EmployedBy, 0.90),
                rule(r"(?i)\bworks?\s+(for|at)\b", VerbType::EmployedBy, 0.80),
                rule(r"(?i)\breports?\s+to\b", VerbType::ReportsTo, 0.88),
                rule(r"(?i)\bsupervises\b", VerbType::Supervises, 0.82),
                rule(r"(?i)\bpartners?\s+with\b", VerbType::PartnersWith, 0.80),
                rule(r"(?i)\bcollaborates?\s+with\b", VerbType::CollaboratesWith, 0.78),
                rule(r"(?i)\bcompetes?\s+with\b", VerbType::CompetesWith, 0.80),
                rule(r"(?i)\bacquir(ed|es)\b", VerbType::Acquires, 0.85),
            ],
        },
        // social
        Family {
            rules: vec![
                rule(r"(?i)\bfriends?\s+with\b", VerbType::FriendOf, 0.82),
                rule(r"(?i)\bmarried\s+to\b", VerbType::MarriedTo, 0.92),
                rule(r"(?i)\bmentor\s+(of|to)\b", VerbType::MentorOf, 0.82),
                rule(r"(?i)\bassociated\s+with\b", VerbType::AssociatedWith, 0.65),
                rule(r"(?i)\bintroduced\b", VerbType::Introduces, 0.70),
                rule(r"(?i)\btrusts\b", VerbType::Trusts, 0.68),
            ],
        },
        // reference
        Family {
            rules: vec![
                rule(r"(?i)\breferences?\b", VerbType::References, 0.75),
                rule(r"(?i)\bcites?\b", VerbType::Cites, 0.85),
                rule(r"(?i)\bcited\s+by\b", VerbType::CitedBy, 0.85),
                rule(r"(?i)\bmentions?\b", VerbType::Mentions, 0.70),
                rule(r"(?i)\blinks?\s+to\b", VerbType::LinksTo, 0.78),
                rule(r"(?i)\bannotates\b", VerbType::Annotates, 0.72),
            ],
        },
        // temporal
        Family {
            rules: vec![
                rule(r"(?i)\bprecedes\b", VerbType::Precedes, 0.85),
                rule(r"(?i)\bfollows\b", VerbType::Follows, 0.80),
                rule(r"(?i)\boccurs?\s+during\b", VerbType::OccursDuring, 0.80),
                rule(r"(?i)\bstarts?\s+at\b", VerbType::StartsAt, 0.82),
                rule(r"(?i)\bends?\s+at\b", VerbType::EndsAt, 0.82),
                rule(r"(?i)\boverlaps?\s+with\b", VerbType::OverlapsWith, 0.78),
                rule(r"(?i)\bscheduled\s+for\b", VerbType::ScheduledFor, 0.80),
            ],
        },
        // causal
        Family {
            rules: vec![
                rule(r"(?i)\bcaused\s+by\b", VerbType::CausedBy, 0.88),
                rule(r"(?i)\bcauses?\b", VerbType::Causes, 0.85),
                rule(r"(?i)\benables?\b", VerbType::Enables, 0.78),
                rule(r"(?i)\bprevents?\b", VerbType::Prevents, 0.80),
                rule(r"(?i)\btriggers?\b", VerbType::Triggers, 0.82),
                rule(r"(?i)\bresults?\s+in\b", VerbType::ResultsIn, 0.80),
                rule(r"(?i)\bresulted\s+from\b", VerbType::ResultedFrom, 0.80),
            ],
        },
        // transformation
        Family {
            rules: vec![
                rule(r"(?i)\btransforms?\s+into\b", VerbType::TransformsInto, 0.85),
                rule(r"(?i)\btransformed\s+from\b", VerbType::TransformedFrom, 0.85),
                rule(r"(?i)\bconverts?\b", VerbType::Converts, 0.78),
                rule(r"(?i)\bupgrades?\b", VerbType::Upgrades, 0.80),
                rule(r"(?i)\breplaces?\b", VerbType::Replaces, 0.82),
                rule(r"(?i)\breplaced\s+by\b", VerbType::ReplacedBy, 0.82),
                rule(r"(?i)\bmerges?\s+with\b", VerbType::MergedWith, 0.80),
            ],
        },
        // classification
        Family {
            rules: vec![
                rule(r"(?i)\bclassified\s+as\b", VerbType::ClassifiedAs, 0.90),
                rule(r"(?i)\bcategorizes?\b", VerbType::Categorizes, 0.80),
                rule(r"(?i)\btype\s+of\b", VerbType::TypeOf, 0.85),
                rule(r"(?i)\bsubtype\s+of\b", VerbType::SubtypeOf, 0.85),
                rule(r"(?i)\binstance\s+of\b", VerbType::InstanceOf, 0.88),
                rule(r"(?i)\btagged\s+with\b", VerbType::TaggedWith, 0.75),
                rule(r"(?i)\bsimilar\s+to\b", VerbType::SimilarTo, 0.65),
            ],
        },
        // implementation
        Family {
            rules: vec![
                rule(r"(?i)\bimplements?\b", VerbType::Implements, 0.85),
                rule(r"(?i)\bimplemented\s+by\b", VerbType::ImplementedBy, 0.85),
                rule(r"(?i)\bextends?\b", VerbType::Extends, 0.80),
                rule(r"(?i)\binherits?\s+from\b", VerbType::Inherits, 0.82),
                rule(r"(?i)\boverrides?\b", VerbType::Overrides, 0.80),
                rule(r"(?i)\bdepends?\s+on\b", VerbType::Depends, 0.80),
            ],
        },
        // interaction
        Family {
            rules: vec![
                rule(r"(?i)\binteracts?\s+with\b", VerbType::InteractsWith, 0.72),
                rule(r"(?i)\bcommunicates?\s+with\b", VerbType::CommunicatesWith, 0.75),
                rule(r"(?i)\bnegotiates?\s+with\b", VerbType::Negotiates, 0.78),
                rule(r"(?i)\bresponds?\s+to\b", VerbType::RespondsTo, 0.75),
                rule(r"(?i)\brequests?\b", VerbType::Requests, 0.70),
                rule(r"(?i)\binvokes?\b", VerbType::Invokes, 0.78),
                rule(r"(?i)\bnotifies\b", VerbType::Notifies, 0.75),
            ],
        },
    ]
});

/// Returns the winning `(verb_type, confidence)` from the first family (in
/// listed order) whose best-matching rule meets `min_confidence`.
pub fn classify(context: &str, min_confidence: f32) -> Option<(VerbType, f32)> {
    for family in FAMILIES.iter() {
        let best = family
            .rules
            .iter()
            .filter(|r| r.regex.is_match(context))
            .max_by(|a, b| a.confidence.partial_cmp(&b.confidence).unwrap_or(std::cmp::Ordering::Equal));
        if let Some(rule) = best {
            if rule.confidence >= min_confidence {
                return Some((rule.verb_type, rule.confidence));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ownership_sentence_matches_owned_by() {
        let result = classify("Acme Corp is owned by Global Holdings.", 0.60);
        assert_eq!(result, Some((VerbType::OwnedBy, 0.90)));
    }

    #[test]
    fn creation_family_outranks_weaker_context_matches() {
        let result = classify("The report was authored by Jane Smith.", 0.60);
        assert_eq!(result, Some((VerbType::AuthoredBy, 0.90)));
    }

    #[test]
    fn no_match_below_min_confidence_returns_none() {
        let result = classify("The two entities are somehow connected.", 0.60);
        assert_eq!(result, None);
    }

    #[test]
    fn family_order_is_respected_when_two_families_could_match() {
        // "part of" (part-whole family, listed 3rd) should win over a weaker
        // "associated with" phrase (social family, listed 6th) even though
        // both appear in the sentence.
        let result = classify("The division is part of and associated with the parent.", 0.60);
        assert_eq!(result, Some((VerbType::PartOf, 0.90)));
    }
}
