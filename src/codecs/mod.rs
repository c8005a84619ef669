//! Concrete `FileHandler` implementations (spec.md §6). Format codecs
//! themselves are out of scope beyond the `FileHandler` interface; these
//! two are minimal reference implementations sufficient to drive the
//! end-to-end scenarios and exercise the sharded-scanner contract against
//! real bytes.

pub mod mem;
pub mod tsv;
