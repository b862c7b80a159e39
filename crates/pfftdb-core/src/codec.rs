//! JSON wire form of terms.
//!
//! | JSON | Term |
//! |---|---|
//! | `"text"` | identifier (`_:name` is a blank node) |
//! | `{"@id": "text"}` | identifier, explicit form |
//! | `{"@value": "text"}` | string literal |
//! | number | numeric literal |
//! | `true` / `false` | boolean literal |
//!
//! Identifiers go through the prefix table on the way in; the lexical form of
//! a string literal never does. Serialisation emits the same shapes, so every
//! term survives a round trip.

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::prefix::{PrefixPolicy, PrefixTable};
use crate::query::{PatternTerm, QueryPattern};
use crate::term::{Numeric, Term, Triple, TriplePattern};

const ID_KEY: &str = "@id";
const VALUE_KEY: &str = "@value";

/// Decodes wire values, expanding prefixes on the way.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    prefixes: &'a PrefixTable,
    policy: PrefixPolicy,
}

impl<'a> Resolver<'a> {
    pub fn new(prefixes: &'a PrefixTable, policy: PrefixPolicy) -> Self {
        Self { prefixes, policy }
    }

    fn identifier(&self, text: &str) -> Result<Term> {
        let expanded = self.prefixes.resolve_with(text, self.policy)?;
        Term::identifier(&expanded)
    }

    /// A concrete term. Empty identifiers are rejected.
    pub fn term(&self, value: &Value) -> Result<Term> {
        match value {
            Value::String(s) => self.identifier(s),
            Value::Bool(b) => Ok(Term::Bool(*b)),
            Value::Number(n) => number(n),
            Value::Object(map) => self.tagged(map),
            Value::Null | Value::Array(_) => Err(Error::validation(
                "term",
                format!("expected string, number, boolean or object, got {value}"),
            )),
        }
    }

    fn tagged(&self, map: &Map<String, Value>) -> Result<Term> {
        if map.len() != 1 {
            return Err(Error::validation(
                "term",
                "tagged term must have exactly one of `@id` or `@value`",
            ));
        }
        match (map.get(ID_KEY), map.get(VALUE_KEY)) {
            (Some(Value::String(id)), None) => self.identifier(id),
            (None, Some(Value::String(text))) => Ok(Term::string(text.as_str())),
            _ => Err(Error::validation(
                "term",
                "`@id` and `@value` must hold a string",
            )),
        }
    }

    /// A lookup field: `""` or `null` is a wildcard.
    pub fn pattern_field(&self, value: &Value) -> Result<Option<Term>> {
        match value {
            Value::Null => Ok(None),
            Value::String(s) if s.is_empty() => Ok(None),
            other => self.term(other).map(Some),
        }
    }

    /// A query field: additionally, `"?name"` is a variable.
    pub fn query_field(&self, value: &Value) -> Result<PatternTerm> {
        match value {
            Value::String(s) if s.starts_with('?') => Ok(PatternTerm::var(s)),
            other => Ok(match self.pattern_field(other)? {
                Some(term) => PatternTerm::Value(term),
                None => PatternTerm::Any,
            }),
        }
    }

    pub fn triple(&self, value: &Value) -> Result<Triple> {
        let [s, p, o] = fields(value)?;
        Ok(Triple::new(self.term(s)?, self.term(p)?, self.term(o)?))
    }

    pub fn triple_pattern(&self, value: &Value) -> Result<TriplePattern> {
        let [s, p, o] = fields(value)?;
        Ok(TriplePattern::new(
            self.pattern_field(s)?,
            self.pattern_field(p)?,
            self.pattern_field(o)?,
        ))
    }

    pub fn query_pattern(&self, value: &Value) -> Result<QueryPattern> {
        let [s, p, o] = fields(value)?;
        Ok(QueryPattern::new(
            self.query_field(s)?,
            self.query_field(p)?,
            self.query_field(o)?,
        ))
    }
}

fn fields(value: &Value) -> Result<[&Value; 3]> {
    match value.as_array().map(Vec::as_slice) {
        Some([s, p, o]) => Ok([s, p, o]),
        _ => Err(Error::validation(
            "triple",
            format!("expected a 3-element array, got {value}"),
        )),
    }
}

fn number(n: &serde_json::Number) -> Result<Term> {
    if let Some(i) = n.as_i64() {
        return Ok(Term::int(i));
    }
    match n.as_f64() {
        Some(f) => Term::float(f),
        None => Err(Error::validation("number", format!("{n} is not representable"))),
    }
}

// ============================================================================
// Encoding
// ============================================================================

/// Serialises a [`Term`] in wire form.
#[derive(Debug, Clone, Copy)]
pub struct WireTerm<'a>(pub &'a Term);

impl Serialize for WireTerm<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match self.0 {
            Term::Iri(iri) => serializer.serialize_str(iri),
            Term::BlankNode(_) => serializer.collect_str(self.0),
            Term::Str(text) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(VALUE_KEY, text)?;
                map.end()
            }
            Term::Number(Numeric::Int(i)) => serializer.serialize_i64(*i),
            Term::Number(Numeric::Float(f)) => serializer.serialize_f64(*f),
            Term::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

/// Serialises a [`Triple`] as a 3-element array.
#[derive(Debug, Clone, Copy)]
pub struct WireTriple<'a>(pub &'a Triple);

impl Serialize for WireTriple<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(3))?;
        for term in self.0.terms() {
            seq.serialize_element(&WireTerm(term))?;
        }
        seq.end()
    }
}

pub fn term_to_json(term: &Term) -> Value {
    serde_json::to_value(WireTerm(term)).unwrap_or(Value::Null)
}

pub fn triple_to_json(triple: &Triple) -> Value {
    Value::Array(triple.terms().into_iter().map(term_to_json).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn plain() -> PrefixTable {
        PrefixTable::new().with("foaf", "http://xmlns.com/foaf/0.1/")
    }

    #[test]
    fn decodes_every_term_kind() {
        let table = plain();
        let r = Resolver::new(&table, PrefixPolicy::PassThrough);
        assert_eq!(r.term(&json!("foaf:name")).unwrap(), Term::iri("http://xmlns.com/foaf/0.1/name"));
        assert_eq!(r.term(&json!("_:b0")).unwrap(), Term::blank("b0"));
        assert_eq!(r.term(&json!({"@value": "foaf:name"})).unwrap(), Term::string("foaf:name"));
        assert_eq!(r.term(&json!({"@id": "foaf:x"})).unwrap(), Term::iri("http://xmlns.com/foaf/0.1/x"));
        assert_eq!(r.term(&json!(7)).unwrap(), Term::int(7));
        assert_eq!(r.term(&json!(2.0)).unwrap(), Term::int(2));
        assert_eq!(r.term(&json!(false)).unwrap(), Term::Bool(false));
        assert!(r.term(&json!("")).is_err());
        assert!(r.term(&json!(null)).is_err());
        assert!(r.term(&json!({"@id": "a", "@value": "b"})).is_err());
    }

    #[test]
    fn empty_fields_are_wildcards_only_in_patterns() {
        let table = PrefixTable::new();
        let r = Resolver::new(&table, PrefixPolicy::PassThrough);
        assert!(r.triple_pattern(&json!(["", "", ""])).unwrap().is_wildcard());
        assert!(r.triple(&json!(["a", "p", ""])).is_err());
        assert!(r.triple(&json!(["a", "p"])).is_err());
    }

    #[test]
    fn query_fields_recognise_variables() {
        let table = PrefixTable::new();
        let r = Resolver::new(&table, PrefixPolicy::PassThrough);
        let p = r.query_pattern(&json!(["?x", "", {"@id": "?lit"}])).unwrap();
        assert_eq!(p.subject, PatternTerm::Var("x".into()));
        assert_eq!(p.predicate, PatternTerm::Any);
        assert_eq!(p.object, PatternTerm::Value(Term::iri("?lit")));
    }

    #[test]
    fn strict_policy_rejects_unknown_prefixes() {
        let table = plain();
        let r = Resolver::new(&table, PrefixPolicy::Reject);
        assert!(matches!(r.term(&json!("zzz:1")), Err(Error::UnknownPrefix { .. })));
        assert!(r.term(&json!({"@value": "zzz:1"})).is_ok());
    }

    #[test]
    fn encodes_to_the_same_shapes() {
        let t = Triple::new(Term::blank("b"), Term::iri("p"), Term::string("x"));
        assert_eq!(triple_to_json(&t), json!(["_:b", "p", {"@value": "x"}]));
        assert_eq!(term_to_json(&Term::float(0.5).unwrap()), json!(0.5));
    }
}
