//! pfftdb: a named-graph triple store.
//!
//! The engine keeps one indexed [`TripleStore`] per named graph and offers
//! four kinds of work over it:
//!
//! 1. **Mutation**: set-semantics `add`/`remove` with wildcard patterns
//! 2. **Pattern queries**: conjunctive patterns joined by shared variables
//! 3. **Inference**: named rules (symmetric, transitive, geocoding) run to a fixpoint
//! 4. **Path search**: breadth-first shortest paths between labelled nodes
//!
//! ## Layout
//!
//! - `term`: the tagged term model and triple patterns
//! - `prefix`: compact identifier expansion
//! - `store`: interned terms and Roaring-bitmap indexes for one graph
//! - `graph`: the [`Database`] registry and per-graph locking
//! - `query`, `inference`, `path`: the three read/derive engines
//! - `codec`: the JSON wire form used by the HTTP server
//!
//! ```
//! use pfftdb_core::{Cancellation, Database, Term, Triple};
//! use pfftdb_core::query::{PatternTerm, Query, QueryPattern};
//!
//! let db = Database::default();
//! let g = db.graph("people").unwrap();
//! g.add(&Triple::iris("alice", "knows", "bob")).unwrap();
//! g.add(&Triple::new(Term::iri("alice"), Term::iri("name"), Term::string("Alice"))).unwrap();
//!
//! let query = Query::new(vec![
//!     QueryPattern::new(PatternTerm::var("?x"), Term::iri("knows"), Term::iri("bob")),
//!     QueryPattern::new(PatternTerm::var("?x"), Term::iri("name"), PatternTerm::var("?n")),
//! ]);
//! let rows = g.query(&query, &Cancellation::new()).unwrap();
//! assert_eq!(rows[0].get("n"), Some(&Term::string("Alice")));
//! ```

pub mod cancel;
pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod inference;
mod interner;
pub mod path;
pub mod prefix;
pub mod query;
pub mod store;
pub mod term;

pub use cancel::Cancellation;
pub use config::EngineConfig;
pub use error::{Error, ErrorKind, Result};
pub use graph::{Database, Graph};
pub use inference::{Coordinates, GeocodeError, GeocodeRule, Geocoder, InferenceReport, Rule};
pub use path::{Path, PathRequest, PathStep};
pub use prefix::{PrefixPolicy, PrefixTable};
pub use query::{Query, QueryOptions, QueryPattern, Solution};
pub use store::{BulkReport, TripleOptions, TripleStore};
pub use term::{Numeric, Term, Triple, TriplePattern};
