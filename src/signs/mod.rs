//! Sign scans compiled into the route graph and storage layout

pub mod compiler;
pub mod parser;
pub mod store;
pub mod types;

pub use compiler::{compile, CompileReport, DanglingReference, DuplicateDeclaration, RejectedSign};
pub use parser::{DefaultSignParser, SignDeclaration, SignParseError, SignParser};
pub use store::SignConfigStore;
pub use types::{CompiledSignConfig, PathfindingNode, RegionKey, ScanRegion, Sign, StorageComplex};
