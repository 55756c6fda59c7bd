//! Retrieval and signing primitives for the folio portfolio backend.
//!
//! Two independent pieces live here: a small TF-IDF retrieval index over the
//! portfolio's project write-ups ([`build`], [`persist`], [`search`],
//! [`prompt`]) and a stateless HMAC token signer ([`token`]).

pub mod build;
pub mod corpus;
pub mod index;
pub mod normalize;
pub mod persist;
pub mod prompt;
pub mod search;
pub mod token;
pub mod tokenizer;
pub mod vectorizer;

pub use index::{Document, SourceDocument};
pub use persist::{IndexError, IndexPaths};
pub use search::{SearchHit, SearchOptions, Searcher};
pub use token::{TokenError, TokenSigner};
pub use vectorizer::{Vectorizer, VectorizerConfig};
