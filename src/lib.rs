//! # xform-rs
//!
//! Lazy sequence-transformation pipelines compiled into fused op-code plans.
//!
//! A pipeline is described once, as an immutable chain of steps over a
//! source, and compiled into a plan each time it is folded. Compilation
//! pushes `drop` and `take` as close to the source as they can go, so that
//! an indexed source can skip elements by index arithmetic and a forward
//! sequence can stop reading as soon as enough elements were produced.
//!
//! ## Overview
//!
//! - **Description**: an [`Xform`] value. Every combinator returns a new
//!   description and leaves the receiver untouched.
//! - **Origin**: where elements come from. Indexed (random access), array,
//!   or sequential (forward-only iteration).
//! - **Segment**: one source cursor plus the op-codes that apply to it.
//!   `concat` starts a new segment.
//! - **Plan**: the compiled segment chain, consumed by exactly one fold.
//!
//! ## Example
//!
//! ```
//! use xform_rs::Xform;
//!
//! let pipeline = Xform::from_indexed(vec![1, 2, 3, 4, 5, 6])
//!     .filter(|x| x % 2 == 0)
//!     .map(|x| x * 10)
//!     .take(2);
//!
//! assert_eq!(pipeline.to_vec(), vec![20, 40]);
//! // Descriptions are reusable.
//! assert_eq!(pipeline.fold(0, |acc, x| acc + x), 60);
//! ```

pub mod compiler;
pub(crate) mod cursor;
pub mod desc;
pub mod dsl;
pub(crate) mod engine;
pub mod error;
pub mod explain;
pub mod op;
pub mod origin;

pub use compiler::{CompileOptions, Plan};
pub use desc::Xform;
pub use dsl::{
    Command, execute_files, execute_pipeline, execute_pipeline_with, explain_pipeline,
    parse_commands,
};
pub use error::{Result, XformError};
pub use explain::{PlanSummary, SegmentSummary, SourceWindow};
pub use op::{OpKind, Step, Strategy};
pub use origin::{Origin, OriginTier, RandomAccess};
