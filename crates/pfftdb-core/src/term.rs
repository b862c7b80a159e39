//! Terms, triples and triple patterns.
//!
//! A [`Term`] is a tagged variant so that literal kinds survive a round trip
//! through the store unchanged: an identifier is never confused with a string
//! literal of the same text, and numbers keep their numeric kind.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::error::{Error, Result};

/// Well-known vocabulary used by the builtin inference rules.
pub mod vocab {
    pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";
    pub const OWL_SYMMETRIC_PROPERTY: &str = "http://www.w3.org/2002/07/owl#SymmetricProperty";
    pub const OWL_TRANSITIVE_PROPERTY: &str = "http://www.w3.org/2002/07/owl#TransitiveProperty";
    pub const RDFS_SUBCLASS_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subClassOf";
    pub const RDFS_SUBPROPERTY_OF: &str = "http://www.w3.org/2000/01/rdf-schema#subPropertyOf";
}

/// Blank node syntax marker.
pub const BLANK_PREFIX: &str = "_:";

// ============================================================================
// Numeric literals
// ============================================================================

/// A finite numeric literal.
///
/// Floats with an integral value that fits in `i64` are canonicalised to
/// `Int`, so `1` and `1.0` denote the same literal.
#[derive(Debug, Clone, Copy)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Numeric {
    /// Build a numeric from a float. Returns `None` for NaN and infinities.
    pub fn from_f64(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        // `i64::MAX as f64` rounds up to 2^63, hence the exclusive bound.
        if value.fract() == 0.0 && value >= i64::MIN as f64 && value < i64::MAX as f64 {
            return Some(Numeric::Int(value as i64));
        }
        Some(Numeric::Float(value))
    }

    /// Canonical form used for equality and hashing.
    pub fn canonical(self) -> Self {
        match self {
            Numeric::Float(f) => Numeric::from_f64(f).unwrap_or(self),
            int => int,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Numeric::Int(i) => i as f64,
            Numeric::Float(f) => f,
        }
    }

    pub fn cmp_value(self, other: Numeric) -> Ordering {
        match (self, other) {
            (Numeric::Int(a), Numeric::Int(b)) => a.cmp(&b),
            (a, b) => a.as_f64().total_cmp(&b.as_f64()),
        }
    }
}

impl From<i64> for Numeric {
    fn from(value: i64) -> Self {
        Numeric::Int(value)
    }
}

impl PartialEq for Numeric {
    fn eq(&self, other: &Self) -> bool {
        match (self.canonical(), other.canonical()) {
            (Numeric::Int(a), Numeric::Int(b)) => a == b,
            (Numeric::Float(a), Numeric::Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for Numeric {}

impl Hash for Numeric {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self.canonical() {
            Numeric::Int(i) => {
                0u8.hash(state);
                i.hash(state);
            }
            Numeric::Float(f) => {
                1u8.hash(state);
                f.to_bits().hash(state);
            }
        }
    }
}

impl fmt::Display for Numeric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Numeric::Int(i) => write!(f, "{i}"),
            Numeric::Float(x) => write!(f, "{x}"),
        }
    }
}

// ============================================================================
// Terms
// ============================================================================

/// One field of a triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// An identifier. Prefixed names are expanded before they get here.
    Iri(String),
    /// A graph-local anonymous node, stored without the `_:` marker.
    BlankNode(String),
    /// A string literal.
    Str(String),
    /// A numeric literal.
    Number(Numeric),
    /// A boolean literal.
    Bool(bool),
}

impl Term {
    pub fn iri(value: impl Into<String>) -> Self {
        Term::Iri(value.into())
    }

    pub fn blank(name: impl Into<String>) -> Self {
        Term::BlankNode(name.into())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Term::Str(value.into())
    }

    pub fn int(value: i64) -> Self {
        Term::Number(Numeric::Int(value))
    }

    /// Float literal. Non-finite values are a validation error.
    pub fn float(value: f64) -> Result<Self> {
        Numeric::from_f64(value)
            .map(Term::Number)
            .ok_or_else(|| Error::validation("number", format!("{value} is not finite")))
    }

    /// Parse identifier syntax: `_:name` is a blank node, anything else an IRI.
    pub fn identifier(text: &str) -> Result<Self> {
        if text.is_empty() {
            return Err(Error::validation("identifier", "empty identifier"));
        }
        match text.strip_prefix(BLANK_PREFIX) {
            Some("") => Err(Error::validation("blank node", "missing name after `_:`")),
            Some(name) => Ok(Term::BlankNode(name.to_string())),
            None => Ok(Term::Iri(text.to_string())),
        }
    }

    /// Identifiers (IRIs and blank nodes) can appear as graph nodes.
    pub fn is_node(&self) -> bool {
        matches!(self, Term::Iri(_) | Term::BlankNode(_))
    }

    /// Human-readable text for identifiers and string literals.
    pub fn text(&self) -> Option<&str> {
        match self {
            Term::Iri(s) | Term::Str(s) => Some(s),
            _ => None,
        }
    }

    fn kind_rank(&self) -> u8 {
        match self {
            Term::Number(_) => 0,
            Term::Str(_) | Term::Iri(_) | Term::BlankNode(_) => 1,
            Term::Bool(_) => 2,
        }
    }

    fn sort_text(&self) -> Option<String> {
        match self {
            Term::Iri(s) | Term::Str(s) => Some(s.clone()),
            Term::BlankNode(s) => Some(format!("{BLANK_PREFIX}{s}")),
            _ => None,
        }
    }

    /// Total order used by `order_by`: numbers numerically, text
    /// case-insensitively, then kinds by a fixed rank.
    pub fn sort_cmp(&self, other: &Term) -> Ordering {
        match (self, other) {
            (Term::Number(a), Term::Number(b)) => a.cmp_value(*b),
            (Term::Bool(a), Term::Bool(b)) => a.cmp(b),
            _ => match (self.sort_text(), other.sort_text()) {
                (Some(a), Some(b)) => a
                    .to_lowercase()
                    .cmp(&b.to_lowercase())
                    .then_with(|| a.cmp(&b)),
                _ => self.kind_rank().cmp(&other.kind_rank()),
            },
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(s) => write!(f, "{s}"),
            Term::BlankNode(s) => write!(f, "{BLANK_PREFIX}{s}"),
            Term::Str(s) => write!(f, "{s:?}"),
            Term::Number(n) => write!(f, "{n}"),
            Term::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<Numeric> for Term {
    fn from(value: Numeric) -> Self {
        Term::Number(value)
    }
}

impl From<bool> for Term {
    fn from(value: bool) -> Self {
        Term::Bool(value)
    }
}

// ============================================================================
// Triples and patterns
// ============================================================================

/// An asserted `(subject, predicate, object)` statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Triple {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
}

impl Triple {
    pub fn new(subject: Term, predicate: Term, object: Term) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// Convenience constructor for identifier-only triples.
    pub fn iris(subject: &str, predicate: &str, object: &str) -> Self {
        Self::new(Term::iri(subject), Term::iri(predicate), Term::iri(object))
    }

    pub fn terms(&self) -> [&Term; 3] {
        [&self.subject, &self.predicate, &self.object]
    }

    /// Literal subjects/predicates are accepted by the store, but a predicate
    /// must at least not be a boolean or numeric literal.
    pub fn validate(&self) -> Result<()> {
        if matches!(self.predicate, Term::Number(_) | Term::Bool(_)) {
            return Err(Error::validation(
                "triple",
                format!("predicate must be textual, got {}", self.predicate),
            ));
        }
        for term in self.terms() {
            if let Some("") = term.text() {
                return Err(Error::validation("triple", "empty field in assertion"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} {} {})", self.subject, self.predicate, self.object)
    }
}

/// A lookup template: `None` matches anything in that position.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TriplePattern {
    pub subject: Option<Term>,
    pub predicate: Option<Term>,
    pub object: Option<Term>,
}

impl TriplePattern {
    pub fn new(subject: Option<Term>, predicate: Option<Term>, object: Option<Term>) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    /// The all-wildcard pattern.
    pub fn any() -> Self {
        Self::default()
    }

    pub fn is_wildcard(&self) -> bool {
        self.subject.is_none() && self.predicate.is_none() && self.object.is_none()
    }

    pub fn matches(&self, triple: &Triple) -> bool {
        fn field(p: &Option<Term>, t: &Term) -> bool {
            p.as_ref().map_or(true, |p| p == t)
        }
        field(&self.subject, &triple.subject)
            && field(&self.predicate, &triple.predicate)
            && field(&self.object, &triple.object)
    }
}

impl From<&Triple> for TriplePattern {
    fn from(t: &Triple) -> Self {
        Self::new(
            Some(t.subject.clone()),
            Some(t.predicate.clone()),
            Some(t.object.clone()),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integral_floats_collapse_to_ints() {
        assert_eq!(Term::float(1.0).unwrap(), Term::int(1));
        assert_eq!(Term::float(-0.0).unwrap(), Term::int(0));
        assert_ne!(Term::float(1.5).unwrap(), Term::int(1));
        assert!(Term::float(f64::NAN).is_err());
        assert!(Term::float(f64::INFINITY).is_err());
    }

    #[test]
    fn identifier_syntax() {
        assert_eq!(Term::identifier("_:b1").unwrap(), Term::blank("b1"));
        assert_eq!(Term::identifier("/en/paul").unwrap(), Term::iri("/en/paul"));
        assert!(Term::identifier("").is_err());
        assert!(Term::identifier("_:").is_err());
    }

    #[test]
    fn kinds_do_not_coerce() {
        assert_ne!(Term::iri("Ann"), Term::string("Ann"));
        assert_ne!(Term::string("1"), Term::int(1));
        assert_ne!(Term::string("true"), Term::Bool(true));
    }

    #[test]
    fn sort_order_is_numeric_then_case_insensitive() {
        let mut terms = vec![
            Term::string("beta"),
            Term::int(10),
            Term::float(2.5).unwrap(),
            Term::string("Alpha"),
            Term::Bool(false),
        ];
        terms.sort_by(|a, b| a.sort_cmp(b));
        assert_eq!(
            terms,
            vec![
                Term::float(2.5).unwrap(),
                Term::int(10),
                Term::string("Alpha"),
                Term::string("beta"),
                Term::Bool(false),
            ]
        );
    }

    #[test]
    fn validate_rejects_empty_and_numeric_predicates() {
        assert!(Triple::iris("a", "p", "o").validate().is_ok());
        assert!(Triple::new(Term::iri("a"), Term::int(1), Term::iri("o"))
            .validate()
            .is_err());
        assert!(Triple::new(Term::iri("a"), Term::iri("p"), Term::string(""))
            .validate()
            .is_err());
    }
}
