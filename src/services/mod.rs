mod web_search;

pub use web_search::{ContextLookup, Lookup, SearchHit, WebSearch};
