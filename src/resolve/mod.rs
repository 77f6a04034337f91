//! Reference Resolution
//!
//! Turns template references into models:
//!
//! ```text
//! "items[0].name" ── normalise ── classify ─┬─ ~/…   → root.join
//!                                           ├─ ./ ../ → first context, walk up
//!                                           └─ bare  → search ContextStack
//!                                                        ├─ hit  → Model
//!                                                        └─ miss → Unresolved
//! ```

mod context_stack;
mod resolve_ref;

pub use context_stack::ContextStack;
pub use resolve_ref::{resolve_ref, Reference};
