//! dtpfix core model
//!
//! Shared vocabulary for the fix and revert engine:
//!
//! ```text
//! ┌──────────────┐   fetch / page    ┌──────────────┐
//! │  GraphClient │──────────────────►│  NodeRecord  │  (snapshot: fields + links)
//! │  (remote or  │                   └──────┬───────┘
//! │   in-memory) │◄──────────────┐          │ rules
//! └──────────────┘   issue       │   ┌──────▼───────┐
//!                                └───│   Mutation   │  (self-inverting change)
//!                                    └──────────────┘
//! ```
//!
//! - [`NodeRef`] is the IRI of a node. Replacing it is a mutation of its own
//!   ([`MutationKind::IriReplace`]), never a rename in place.
//! - [`Mutation::inverse`] is what makes every journaled change reversible.
//! - [`GraphClient`] is the only boundary to the remote store; [`MemoryGraph`]
//!   implements it in-process.

pub mod client;
pub mod memory;
pub mod mutation;
pub mod node;

pub use client::{GraphClient, GraphError, LinkOp, NodePage};
pub use memory::MemoryGraph;
pub use mutation::{Mutation, MutationKind, PreconditionError, IRI_KEY};
pub use node::{
    Enumerable, FieldValue, Link, NodeRecord, NodeRef, NodeType, OntologyLevel, ParseEnumError,
    Target,
};
